//! Fulfillment API Config

use std::time::Duration;

use clap::Args;

use crate::fulfillment::FulfillmentApiConfig;

/// Fulfillment API connection settings.
#[derive(Debug, Clone, Args)]
pub struct FulfillmentConfig {
    /// Fulfillment API base URL
    #[arg(long, env = "FULFILLMENT_BASE_URL")]
    pub fulfillment_base_url: String,

    /// Fulfillment API bearer token
    #[arg(long, env = "FULFILLMENT_TOKEN", hide_env_values = true)]
    pub fulfillment_token: String,

    /// Fulfillment request timeout in seconds
    #[arg(long, env = "FULFILLMENT_TIMEOUT_SECONDS", default_value_t = 10)]
    pub fulfillment_timeout_seconds: u64,
}

impl FulfillmentConfig {
    /// Request timeout.
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.fulfillment_timeout_seconds)
    }

    /// Client settings for [`crate::fulfillment::HttpFulfillmentClient`].
    pub fn api_config(&self) -> FulfillmentApiConfig {
        FulfillmentApiConfig {
            base_url: self.fulfillment_base_url.clone(),
            token: self.fulfillment_token.clone(),
            timeout: self.timeout(),
        }
    }
}
