//! Remote Store
//!
//! The backend of record: carts shared across devices, orders, promo codes and
//! their usage, the loyalty ledger and per-size stock. The store offers row
//! reads, inserts and upserts by unique key; it has no compare-and-swap, so
//! callers that read then write accept lost updates under concurrency.

use async_trait::async_trait;
use mockall::automock;
use storefront::{
    cart::CartSnapshot,
    ids::{OrderId, ProductId, PromoCodeId, UserId},
    loyalty::LoyaltyTransaction,
    orders::Order,
    promotions::{PromoCode, PromoUsage},
    stock::StockRecord,
};

pub mod errors;
mod memory;
mod postgres;

pub use errors::RemoteError;
pub use memory::{InMemoryRemoteStore, RemoteOperation};
pub use postgres::PgRemoteStore;

/// Rows of the remote store, read and written one at a time.
#[automock]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// The user's stored cart, if a row exists.
    async fn fetch_cart(&self, user: UserId) -> Result<Option<CartSnapshot>, RemoteError>;

    /// Insert or replace the user's cart row.
    async fn upsert_cart(&self, user: UserId, cart: CartSnapshot) -> Result<(), RemoteError>;

    /// Insert an order keyed by its id.
    ///
    /// Returns [`RemoteError::AlreadyExists`] when an order with the same id
    /// was stored before.
    async fn insert_order(&self, order: Order) -> Result<Order, RemoteError>;

    /// Read an order by id.
    async fn fetch_order(&self, order: OrderId) -> Result<Order, RemoteError>;

    /// Look up a promo code by its normalised code.
    async fn find_promo_code(&self, code: String) -> Result<PromoCode, RemoteError>;

    /// Read a promo code by id.
    async fn fetch_promo_code(&self, promo: PromoCodeId) -> Result<PromoCode, RemoteError>;

    /// Overwrite the global usage counter of a promo code.
    async fn update_promo_used(&self, promo: PromoCodeId, used: u32) -> Result<(), RemoteError>;

    /// The user's usage row for a promo code, if any.
    async fn fetch_promo_usage(
        &self,
        user: UserId,
        promo: PromoCodeId,
    ) -> Result<Option<PromoUsage>, RemoteError>;

    /// Insert or replace the usage row for `(user, promo)`.
    async fn upsert_promo_usage(&self, usage: PromoUsage) -> Result<(), RemoteError>;

    /// Every loyalty transaction of the user, oldest first.
    async fn list_loyalty_transactions(
        &self,
        user: UserId,
    ) -> Result<Vec<LoyaltyTransaction>, RemoteError>;

    /// Append a loyalty transaction.
    async fn insert_loyalty_transaction(
        &self,
        transaction: LoyaltyTransaction,
    ) -> Result<(), RemoteError>;

    /// Per-size stock of a product.
    async fn fetch_stock(&self, product: ProductId) -> Result<StockRecord, RemoteError>;

    /// Overwrite the per-size stock of a product.
    async fn update_stock(&self, product: ProductId, stock: StockRecord)
    -> Result<(), RemoteError>;
}
