//! Persistent Cache Config

use std::path::PathBuf;

use clap::Args;

/// Persistent cache location and quota.
#[derive(Debug, Clone, Args)]
pub struct CacheConfig {
    /// Directory holding cached carts and checkout drafts
    #[arg(long, env = "CACHE_DIR", default_value = ".storefront-cache")]
    pub cache_dir: PathBuf,

    /// Maximum bytes the cache may hold
    #[arg(long, env = "CACHE_QUOTA_BYTES", default_value_t = 5 * 1024 * 1024)]
    pub cache_quota_bytes: u64,
}
