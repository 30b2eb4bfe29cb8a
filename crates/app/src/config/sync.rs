//! Cart Sync Config

use std::time::Duration;

use clap::Args;

/// Debounce windows for remote cart sync.
#[derive(Debug, Clone, Copy, Args)]
pub struct SyncConfig {
    /// Delay before a scheduled cart load runs, in milliseconds
    #[arg(long, env = "SYNC_LOAD_DEBOUNCE_MS", default_value_t = 100)]
    pub sync_load_debounce_ms: u64,

    /// Delay before a scheduled cart save runs, in milliseconds
    #[arg(long, env = "SYNC_SAVE_DEBOUNCE_MS", default_value_t = 400)]
    pub sync_save_debounce_ms: u64,
}

impl SyncConfig {
    /// Load debounce window.
    pub const fn load_debounce(&self) -> Duration {
        Duration::from_millis(self.sync_load_debounce_ms)
    }

    /// Save debounce window.
    pub const fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.sync_save_debounce_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_load_debounce_ms: 100,
            sync_save_debounce_ms: 400,
        }
    }
}
