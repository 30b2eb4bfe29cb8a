//! In-memory Remote Store
//!
//! Backs local development and tests. Individual operations can be made to
//! fail, and every call is counted, so sync and commit paths can be driven
//! through their degraded branches.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};
use storefront::{
    cart::CartSnapshot,
    ids::{OrderId, ProductId, PromoCodeId, UserId},
    loyalty::LoyaltyTransaction,
    orders::Order,
    promotions::{PromoCode, PromoUsage},
    stock::StockRecord,
};

use super::{RemoteError, RemoteStore};

/// Remote store operations, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOperation {
    /// [`RemoteStore::fetch_cart`]
    FetchCart,
    /// [`RemoteStore::upsert_cart`]
    UpsertCart,
    /// [`RemoteStore::insert_order`]
    InsertOrder,
    /// [`RemoteStore::fetch_order`]
    FetchOrder,
    /// [`RemoteStore::find_promo_code`]
    FindPromoCode,
    /// [`RemoteStore::fetch_promo_code`]
    FetchPromoCode,
    /// [`RemoteStore::update_promo_used`]
    UpdatePromoUsed,
    /// [`RemoteStore::fetch_promo_usage`]
    FetchPromoUsage,
    /// [`RemoteStore::upsert_promo_usage`]
    UpsertPromoUsage,
    /// [`RemoteStore::list_loyalty_transactions`]
    ListLoyaltyTransactions,
    /// [`RemoteStore::insert_loyalty_transaction`]
    InsertLoyaltyTransaction,
    /// [`RemoteStore::fetch_stock`]
    FetchStock,
    /// [`RemoteStore::update_stock`]
    UpdateStock,
}

#[derive(Debug, Default)]
struct Tables {
    carts: FxHashMap<UserId, CartSnapshot>,
    orders: FxHashMap<OrderId, Order>,
    promo_codes: FxHashMap<PromoCodeId, PromoCode>,
    promo_usage: FxHashMap<(UserId, PromoCodeId), PromoUsage>,
    loyalty: Vec<LoyaltyTransaction>,
    stock: FxHashMap<ProductId, StockRecord>,
    failing: FxHashSet<RemoteOperation>,
    calls: FxHashMap<RemoteOperation, usize>,
}

/// Remote store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryRemoteStore {
    tables: Mutex<Tables>,
}

impl InMemoryRemoteStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call of `operation` fail as unavailable.
    pub fn fail(&self, operation: RemoteOperation) {
        self.tables().failing.insert(operation);
    }

    /// Stop failing `operation`.
    pub fn recover(&self, operation: RemoteOperation) {
        self.tables().failing.remove(&operation);
    }

    /// Number of times `operation` was called, failed calls included.
    pub fn calls(&self, operation: RemoteOperation) -> usize {
        self.tables()
            .calls
            .get(&operation)
            .copied()
            .unwrap_or_default()
    }

    /// Store a cart row.
    pub fn seed_cart(&self, user: UserId, cart: CartSnapshot) {
        self.tables().carts.insert(user, cart);
    }

    /// Store a promo code row.
    pub fn seed_promo_code(&self, promo: PromoCode) {
        self.tables().promo_codes.insert(promo.id, promo);
    }

    /// Store a promo usage row.
    pub fn seed_promo_usage(&self, usage: PromoUsage) {
        self.tables()
            .promo_usage
            .insert((usage.user_id, usage.promo_code_id), usage);
    }

    /// Append a loyalty transaction.
    pub fn seed_loyalty_transaction(&self, transaction: LoyaltyTransaction) {
        self.tables().loyalty.push(transaction);
    }

    /// Store a product's stock row.
    pub fn seed_stock(&self, product: ProductId, stock: StockRecord) {
        self.tables().stock.insert(product, stock);
    }

    /// The stored cart of `user`.
    pub fn cart(&self, user: UserId) -> Option<CartSnapshot> {
        self.tables().carts.get(&user).cloned()
    }

    /// Every stored order.
    pub fn orders(&self) -> Vec<Order> {
        self.tables().orders.values().cloned().collect()
    }

    /// The stored promo code with `id`.
    pub fn promo_code(&self, id: PromoCodeId) -> Option<PromoCode> {
        self.tables().promo_codes.get(&id).cloned()
    }

    /// The usage row of `(user, promo)`.
    pub fn promo_usage(&self, user: UserId, promo: PromoCodeId) -> Option<PromoUsage> {
        self.tables().promo_usage.get(&(user, promo)).copied()
    }

    /// Every loyalty transaction.
    pub fn loyalty_transactions(&self) -> Vec<LoyaltyTransaction> {
        self.tables().loyalty.clone()
    }

    /// The stored stock of `product`.
    pub fn stock(&self, product: ProductId) -> Option<StockRecord> {
        self.tables().stock.get(&product).cloned()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, operation: RemoteOperation) -> Result<MutexGuard<'_, Tables>, RemoteError> {
        let mut tables = self.tables();

        *tables.calls.entry(operation).or_default() += 1;

        if tables.failing.contains(&operation) {
            return Err(RemoteError::Unavailable(format!("{operation:?} failed")));
        }

        Ok(tables)
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn fetch_cart(&self, user: UserId) -> Result<Option<CartSnapshot>, RemoteError> {
        let tables = self.begin(RemoteOperation::FetchCart)?;

        Ok(tables.carts.get(&user).cloned())
    }

    async fn upsert_cart(&self, user: UserId, cart: CartSnapshot) -> Result<(), RemoteError> {
        let mut tables = self.begin(RemoteOperation::UpsertCart)?;

        tables.carts.insert(user, cart);

        Ok(())
    }

    async fn insert_order(&self, order: Order) -> Result<Order, RemoteError> {
        let mut tables = self.begin(RemoteOperation::InsertOrder)?;

        if tables.orders.contains_key(&order.order_id) {
            return Err(RemoteError::AlreadyExists);
        }

        tables.orders.insert(order.order_id, order.clone());

        Ok(order)
    }

    async fn fetch_order(&self, order: OrderId) -> Result<Order, RemoteError> {
        let tables = self.begin(RemoteOperation::FetchOrder)?;

        tables
            .orders
            .get(&order)
            .cloned()
            .ok_or(RemoteError::NotFound)
    }

    async fn find_promo_code(&self, code: String) -> Result<PromoCode, RemoteError> {
        let tables = self.begin(RemoteOperation::FindPromoCode)?;

        tables
            .promo_codes
            .values()
            .find(|promo| promo.code == code)
            .cloned()
            .ok_or(RemoteError::NotFound)
    }

    async fn fetch_promo_code(&self, promo: PromoCodeId) -> Result<PromoCode, RemoteError> {
        let tables = self.begin(RemoteOperation::FetchPromoCode)?;

        tables
            .promo_codes
            .get(&promo)
            .cloned()
            .ok_or(RemoteError::NotFound)
    }

    async fn update_promo_used(&self, promo: PromoCodeId, used: u32) -> Result<(), RemoteError> {
        let mut tables = self.begin(RemoteOperation::UpdatePromoUsed)?;

        let row = tables
            .promo_codes
            .get_mut(&promo)
            .ok_or(RemoteError::NotFound)?;

        if used > row.usage_limit_global {
            return Err(RemoteError::InvalidData);
        }

        row.used_global = used;

        Ok(())
    }

    async fn fetch_promo_usage(
        &self,
        user: UserId,
        promo: PromoCodeId,
    ) -> Result<Option<PromoUsage>, RemoteError> {
        let tables = self.begin(RemoteOperation::FetchPromoUsage)?;

        Ok(tables.promo_usage.get(&(user, promo)).copied())
    }

    async fn upsert_promo_usage(&self, usage: PromoUsage) -> Result<(), RemoteError> {
        let mut tables = self.begin(RemoteOperation::UpsertPromoUsage)?;

        if !tables.promo_codes.contains_key(&usage.promo_code_id) {
            return Err(RemoteError::InvalidReference);
        }

        tables
            .promo_usage
            .insert((usage.user_id, usage.promo_code_id), usage);

        Ok(())
    }

    async fn list_loyalty_transactions(
        &self,
        user: UserId,
    ) -> Result<Vec<LoyaltyTransaction>, RemoteError> {
        let tables = self.begin(RemoteOperation::ListLoyaltyTransactions)?;

        let mut transactions: Vec<_> = tables
            .loyalty
            .iter()
            .filter(|transaction| transaction.user_id == user)
            .cloned()
            .collect();

        transactions.sort_by_key(|transaction| transaction.created_at);

        Ok(transactions)
    }

    async fn insert_loyalty_transaction(
        &self,
        transaction: LoyaltyTransaction,
    ) -> Result<(), RemoteError> {
        let mut tables = self.begin(RemoteOperation::InsertLoyaltyTransaction)?;

        tables.loyalty.push(transaction);

        Ok(())
    }

    async fn fetch_stock(&self, product: ProductId) -> Result<StockRecord, RemoteError> {
        let tables = self.begin(RemoteOperation::FetchStock)?;

        tables
            .stock
            .get(&product)
            .cloned()
            .ok_or(RemoteError::NotFound)
    }

    async fn update_stock(
        &self,
        product: ProductId,
        stock: StockRecord,
    ) -> Result<(), RemoteError> {
        let mut tables = self.begin(RemoteOperation::UpdateStock)?;

        let row = tables.stock.get_mut(&product).ok_or(RemoteError::NotFound)?;

        *row = stock;

        Ok(())
    }
}
