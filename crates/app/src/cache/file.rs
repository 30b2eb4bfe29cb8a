//! File-backed Cache

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use super::{CacheError, PersistentCache};

const EXTENSION: &str = "json";

/// Cache storing one file per key under a directory.
///
/// Keys map to file names by replacing `:` with `.`, so keys must not
/// themselves contain `.` or path separators.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
    quota: u64,
}

impl FileCache {
    /// Open (creating if needed) a cache directory limited to `quota` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>, quota: u64) -> Result<Self, CacheError> {
        let dir = dir.into();

        fs::create_dir_all(&dir)?;

        Ok(Self { dir, quota })
    }

    /// Directory holding the entries.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{EXTENSION}", key.replace(':', ".")))
    }

    fn used_bytes_except(&self, skip: &Path) -> Result<u64, CacheError> {
        let mut used = 0;

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();

            if path == skip || path.extension().is_none_or(|ext| ext != EXTENSION) {
                continue;
            }

            used += entry.metadata()?.len();
        }

        Ok(used)
    }
}

impl PersistentCache for FileCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let path = self.path(key);
        let size = u64::try_from(value.len()).unwrap_or(u64::MAX);

        if self.used_bytes_except(&path)?.saturating_add(size) > self.quota {
            return Err(CacheError::QuotaExceeded);
        }

        let staging = path.with_extension("tmp");

        fs::write(&staging, value)?;
        fs::rename(&staging, &path)?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}
