//! App Context

use std::{sync::Arc, time::Duration};

use thiserror::Error;

use crate::{
    cache::{CacheError, FileCache, PersistentCache},
    config::{AppConfig, sync::SyncConfig},
    database,
    domain::{
        carts::CartSession,
        checkout::{CommitDependencies, OrderCommitCoordinator},
        loyalty::{LoyaltyLedger, RemoteLoyaltyLedger},
        promotions::{PromoLedger, RemotePromoLedger},
        stock::{RemoteStockDecrementer, StockDecrementer},
    },
    fulfillment::{FulfillmentClient, FulfillmentError, HttpFulfillmentClient},
    remote::{PgRemoteStore, RemoteStore},
};

/// Errors raised while building the application context.
#[derive(Debug, Error)]
pub enum AppInitError {
    /// The remote store database is unreachable.
    #[error("failed to connect to database")]
    Database(#[source] sqlx::Error),

    /// The cache directory cannot be used.
    #[error("failed to open persistent cache")]
    Cache(#[source] CacheError),

    /// The HTTP client cannot be built.
    #[error("failed to build fulfillment client")]
    Fulfillment(#[source] FulfillmentError),
}

/// Long-lived services shared by every session.
#[derive(Clone)]
pub struct AppContext {
    /// Backend of record.
    pub remote: Arc<dyn RemoteStore>,

    /// Durable client storage for carts and drafts.
    pub cache: Arc<dyn PersistentCache>,

    /// Shipping API.
    pub fulfillment: Arc<dyn FulfillmentClient>,

    /// Promo code validation and usage.
    pub promos: Arc<dyn PromoLedger>,

    /// Loyalty points.
    pub loyalty: Arc<dyn LoyaltyLedger>,

    /// Per-size stock.
    pub stock: Arc<dyn StockDecrementer>,

    sync: SyncConfig,
    fulfillment_timeout: Duration,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("sync", &self.sync)
            .field("fulfillment_timeout", &self.fulfillment_timeout)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Build application context from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the database, cache directory or HTTP client
    /// cannot be set up.
    pub async fn from_config(config: &AppConfig) -> Result<Self, AppInitError> {
        let pool = database::connect(&config.database)
            .await
            .map_err(AppInitError::Database)?;

        let cache = FileCache::open(&config.cache.cache_dir, config.cache.cache_quota_bytes)
            .map_err(AppInitError::Cache)?;

        let fulfillment = HttpFulfillmentClient::new(config.fulfillment.api_config())
            .map_err(AppInitError::Fulfillment)?;

        Ok(Self::with_services(
            Arc::new(PgRemoteStore::new(pool)),
            Arc::new(cache),
            Arc::new(fulfillment),
            config.sync,
            config.fulfillment.timeout(),
        ))
    }

    /// Build application context over existing collaborators.
    pub fn with_services(
        remote: Arc<dyn RemoteStore>,
        cache: Arc<dyn PersistentCache>,
        fulfillment: Arc<dyn FulfillmentClient>,
        sync: SyncConfig,
        fulfillment_timeout: Duration,
    ) -> Self {
        Self {
            promos: Arc::new(RemotePromoLedger::new(remote.clone())),
            loyalty: Arc::new(RemoteLoyaltyLedger::new(remote.clone())),
            stock: Arc::new(RemoteStockDecrementer::new(remote.clone())),
            remote,
            cache,
            fulfillment,
            sync,
            fulfillment_timeout,
        }
    }

    /// A new cart session.
    pub fn session(&self) -> CartSession {
        CartSession::new(self.cache.clone(), self.remote.clone(), self.sync)
    }

    /// The order commit coordinator for `session`.
    pub fn checkout(&self, session: CartSession) -> OrderCommitCoordinator {
        OrderCommitCoordinator::new(
            CommitDependencies {
                remote: self.remote.clone(),
                fulfillment: self.fulfillment.clone(),
                promos: self.promos.clone(),
                loyalty: self.loyalty.clone(),
                stock: self.stock.clone(),
                cache: self.cache.clone(),
            },
            session,
            self.fulfillment_timeout,
        )
    }
}

#[cfg(test)]
mod tests {
    use storefront::{
        cart::{CartSnapshot, LineKey},
        ids::{ProductId, UserId},
        orders::PaymentMethod,
    };
    use testresult::TestResult;

    use crate::{
        cache::{FileCache, cart_key, read_json},
        domain::checkout::CheckoutDraft,
        fulfillment::{MockFulfillmentClient, ShipmentReceipt},
        remote::InMemoryRemoteStore,
        test::helpers::{address, cart_line, now, shipping_option},
    };

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn a_session_runs_from_cart_to_order() -> TestResult {
        let dir = tempfile::tempdir()?;
        let remote = Arc::new(InMemoryRemoteStore::new());
        let product = ProductId::new();
        let user = UserId::new();

        remote.seed_stock(product, [("M", 3)].into_iter().collect());

        let mut fulfillment = MockFulfillmentClient::new();
        fulfillment.expect_create_shipment().returning(|request| {
            Ok(ShipmentReceipt {
                shipment_id: Some("SHP-9".to_string()),
                courier_id: request.courier_id,
                rate: 0,
                eta: None,
            })
        });

        let cache = Arc::new(FileCache::open(dir.path(), 1024 * 1024)?);

        let context = AppContext::with_services(
            remote.clone(),
            cache.clone(),
            Arc::new(fulfillment),
            SyncConfig::default(),
            Duration::from_secs(5),
        );

        let session = context.session();
        session.add_line(cart_line(product, "M", 1))?;
        session.login(user);
        session.update_quantity(&LineKey::sized(product, "M"), 2)?;
        session.settle().await;

        assert_eq!(remote.cart(user).map(|cart| cart.item_count()), Some(2));

        let draft = CheckoutDraft::load_or_new(cache.as_ref(), user)?
            .with_address(address())
            .with_shipping(shipping_option(0))
            .with_payment_method(PaymentMethod::Online {
                payment_id: "pay_123".to_string(),
            });
        draft.save(cache.as_ref())?;

        let outcome = context.checkout(session.clone()).commit(draft, now()).await?;

        assert_eq!(outcome.order().totals.total, 1_000_00);
        assert_eq!(remote.stock(product).and_then(|s| s.available("M")), Some(1));

        session.settle().await;

        assert_eq!(remote.cart(user), Some(CartSnapshot::empty()));

        let cached: Option<CartSnapshot> = read_json(cache.as_ref(), &cart_key(Some(user)))?;

        assert_eq!(cached, Some(CartSnapshot::empty()));

        Ok(())
    }
}
