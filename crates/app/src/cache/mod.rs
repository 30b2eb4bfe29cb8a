//! Persistent Cache
//!
//! A small synchronous key/value store that survives restarts. Carts and
//! checkout drafts are written through it as JSON after every mutation, so
//! quota exhaustion is surfaced as its own error rather than a generic
//! storage failure.

use std::io;

use mockall::automock;
use serde::{Serialize, de::DeserializeOwned};
use storefront::ids::UserId;
use thiserror::Error;

mod file;
mod memory;

pub use file::FileCache;
pub use memory::MemoryCache;

/// Errors raised by cache reads and writes.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The write would exceed the storage quota.
    #[error("storage quota exceeded")]
    QuotaExceeded,

    /// The underlying storage failed.
    #[error("cache storage error")]
    Io(#[source] io::Error),

    /// A value could not be encoded.
    #[error("failed to encode cache entry")]
    Encode(#[source] serde_json::Error),

    /// A stored value could not be decoded.
    #[error("failed to decode cache entry {key}")]
    Decode {
        /// Key of the unreadable entry.
        key: String,

        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
}

impl From<io::Error> for CacheError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::StorageFull | io::ErrorKind::QuotaExceeded => Self::QuotaExceeded,
            _ => Self::Io(error),
        }
    }
}

/// Durable string key/value storage.
#[automock]
pub trait PersistentCache: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error when the storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::QuotaExceeded`] when the write does not fit.
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error when the storage cannot be written.
    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// Read and decode a JSON value.
///
/// # Errors
///
/// Returns [`CacheError::Decode`] when the stored value is not valid JSON for `T`.
pub fn read_json<T: DeserializeOwned>(
    cache: &dyn PersistentCache,
    key: &str,
) -> Result<Option<T>, CacheError> {
    let Some(raw) = cache.get(key)? else {
        return Ok(None);
    };

    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| CacheError::Decode {
            key: key.to_string(),
            source,
        })
}

/// Encode and store a JSON value.
///
/// # Errors
///
/// Returns an error when encoding fails or the cache rejects the write.
pub fn write_json<T: Serialize>(
    cache: &dyn PersistentCache,
    key: &str,
    value: &T,
) -> Result<(), CacheError> {
    let raw = serde_json::to_string(value).map_err(CacheError::Encode)?;

    cache.set(key, &raw)
}

/// Cache key of the cart owned by `user`, or the guest cart.
pub fn cart_key(user: Option<UserId>) -> String {
    match user {
        Some(user) => format!("cart:{user}"),
        None => "cart:guest".to_string(),
    }
}

/// Cache key of the checkout draft staged by `user`.
pub fn pending_order_key(user: UserId) -> String {
    format!("pending_order:{user}")
}
