//! Application configuration

use clap::Args;

use crate::config::{
    cache::CacheConfig, db::DatabaseConfig, fulfillment::FulfillmentConfig,
    observability::LoggingConfig, sync::SyncConfig,
};

pub mod cache;
pub mod db;
pub mod fulfillment;
pub mod observability;
pub mod sync;

pub use observability::LogFormat;

/// Storefront configuration, read from CLI arguments with environment fallbacks.
#[derive(Debug, Clone, Args)]
pub struct AppConfig {
    /// Cart sync debounce settings.
    #[command(flatten)]
    pub sync: SyncConfig,

    /// Persistent cache settings.
    #[command(flatten)]
    pub cache: CacheConfig,

    /// Fulfillment API settings.
    #[command(flatten)]
    pub fulfillment: FulfillmentConfig,

    /// Remote store database settings.
    #[command(flatten)]
    pub database: DatabaseConfig,

    /// Logging output settings.
    #[command(flatten)]
    pub logging: LoggingConfig,
}
