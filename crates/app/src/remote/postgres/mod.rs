//! PostgreSQL Remote Store

use async_trait::async_trait;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{PgPool, Postgres, query, query_as, types::Json};
use storefront::{
    cart::CartSnapshot,
    ids::{OrderId, ProductId, PromoCodeId, UserId},
    loyalty::LoyaltyTransaction,
    orders::Order,
    promotions::{PromoCode, PromoUsage},
    stock::StockRecord,
};

use super::{RemoteError, RemoteStore};

mod rows;

use rows::{CartRow, LoyaltyRow, OrderRow, PromoCodeRow, PromoUsageRow, StockRow};

const FETCH_CART_SQL: &str = include_str!("sql/fetch_cart.sql");
const UPSERT_CART_SQL: &str = include_str!("sql/upsert_cart.sql");
const INSERT_ORDER_SQL: &str = include_str!("sql/insert_order.sql");
const FETCH_ORDER_SQL: &str = include_str!("sql/fetch_order.sql");
const FIND_PROMO_CODE_SQL: &str = include_str!("sql/find_promo_code.sql");
const FETCH_PROMO_CODE_SQL: &str = include_str!("sql/fetch_promo_code.sql");
const UPDATE_PROMO_USED_SQL: &str = include_str!("sql/update_promo_used.sql");
const FETCH_PROMO_USAGE_SQL: &str = include_str!("sql/fetch_promo_usage.sql");
const UPSERT_PROMO_USAGE_SQL: &str = include_str!("sql/upsert_promo_usage.sql");
const LIST_LOYALTY_TRANSACTIONS_SQL: &str = include_str!("sql/list_loyalty_transactions.sql");
const INSERT_LOYALTY_TRANSACTION_SQL: &str = include_str!("sql/insert_loyalty_transaction.sql");
const FETCH_STOCK_SQL: &str = include_str!("sql/fetch_stock.sql");
const UPDATE_STOCK_SQL: &str = include_str!("sql/update_stock.sql");

/// Remote store over a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PgRemoteStore {
    pool: PgPool,
}

impl PgRemoteStore {
    /// Wrap a connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_i64(value: u64) -> Result<i64, RemoteError> {
    Ok(i64::try_from(value)?)
}

fn to_i32(value: u32) -> Result<i32, RemoteError> {
    Ok(i32::try_from(value)?)
}

fn optional_i64(value: Option<u64>) -> Result<Option<i64>, RemoteError> {
    value.map(to_i64).transpose()
}

#[async_trait]
impl RemoteStore for PgRemoteStore {
    #[tracing::instrument(name = "remote.pg.fetch_cart", skip(self), fields(user_id = %user), err)]
    async fn fetch_cart(&self, user: UserId) -> Result<Option<CartSnapshot>, RemoteError> {
        let row = query_as::<Postgres, CartRow>(FETCH_CART_SQL)
            .bind(user.into_uuid())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|CartRow(snapshot)| snapshot))
    }

    #[tracing::instrument(
        name = "remote.pg.upsert_cart",
        skip(self, cart),
        fields(user_id = %user, lines = cart.len()),
        err
    )]
    async fn upsert_cart(&self, user: UserId, cart: CartSnapshot) -> Result<(), RemoteError> {
        query(UPSERT_CART_SQL)
            .bind(user.into_uuid())
            .bind(Json(&cart))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[tracing::instrument(
        name = "remote.pg.insert_order",
        skip(self, order),
        fields(order_id = %order.order_id, user_id = %order.user_id),
        err
    )]
    async fn insert_order(&self, order: Order) -> Result<Order, RemoteError> {
        let row = query_as::<Postgres, OrderRow>(INSERT_ORDER_SQL)
            .bind(order.order_id.into_uuid())
            .bind(order.display_order_id.as_str())
            .bind(order.user_id.into_uuid())
            .bind(Json(&order.items))
            .bind(to_i64(order.totals.subtotal)?)
            .bind(to_i64(order.totals.discount)?)
            .bind(to_i64(order.totals.points_discount)?)
            .bind(to_i64(order.totals.shipping_charge)?)
            .bind(to_i64(order.totals.total)?)
            .bind(order.promo_code_id.map(PromoCodeId::into_uuid))
            .bind(to_i64(order.points_redeemed)?)
            .bind(order.status.as_str())
            .bind(order.shipping_status.as_str())
            .bind(order.payment_method.as_str())
            .bind(order.payment_method.payment_id())
            .bind(Json(&order.address))
            .bind(&order.shipping_details)
            .bind(SqlxTimestamp::from(order.created_at))
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0)
    }

    #[tracing::instrument(name = "remote.pg.fetch_order", skip(self), fields(order_id = %order), err)]
    async fn fetch_order(&self, order: OrderId) -> Result<Order, RemoteError> {
        let row = query_as::<Postgres, OrderRow>(FETCH_ORDER_SQL)
            .bind(order.into_uuid())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0)
    }

    #[tracing::instrument(name = "remote.pg.find_promo_code", skip(self), err)]
    async fn find_promo_code(&self, code: String) -> Result<PromoCode, RemoteError> {
        let row = query_as::<Postgres, PromoCodeRow>(FIND_PROMO_CODE_SQL)
            .bind(code)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0)
    }

    #[tracing::instrument(
        name = "remote.pg.fetch_promo_code",
        skip(self),
        fields(promo_code_id = %promo),
        err
    )]
    async fn fetch_promo_code(&self, promo: PromoCodeId) -> Result<PromoCode, RemoteError> {
        let row = query_as::<Postgres, PromoCodeRow>(FETCH_PROMO_CODE_SQL)
            .bind(promo.into_uuid())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0)
    }

    #[tracing::instrument(
        name = "remote.pg.update_promo_used",
        skip(self),
        fields(promo_code_id = %promo),
        err
    )]
    async fn update_promo_used(&self, promo: PromoCodeId, used: u32) -> Result<(), RemoteError> {
        let rows_affected = query(UPDATE_PROMO_USED_SQL)
            .bind(promo.into_uuid())
            .bind(to_i32(used)?)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(RemoteError::NotFound);
        }

        Ok(())
    }

    #[tracing::instrument(
        name = "remote.pg.fetch_promo_usage",
        skip(self),
        fields(user_id = %user, promo_code_id = %promo),
        err
    )]
    async fn fetch_promo_usage(
        &self,
        user: UserId,
        promo: PromoCodeId,
    ) -> Result<Option<PromoUsage>, RemoteError> {
        let row = query_as::<Postgres, PromoUsageRow>(FETCH_PROMO_USAGE_SQL)
            .bind(user.into_uuid())
            .bind(promo.into_uuid())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|PromoUsageRow(usage)| usage))
    }

    #[tracing::instrument(
        name = "remote.pg.upsert_promo_usage",
        skip(self, usage),
        fields(user_id = %usage.user_id, promo_code_id = %usage.promo_code_id),
        err
    )]
    async fn upsert_promo_usage(&self, usage: PromoUsage) -> Result<(), RemoteError> {
        query(UPSERT_PROMO_USAGE_SQL)
            .bind(usage.user_id.into_uuid())
            .bind(usage.promo_code_id.into_uuid())
            .bind(to_i32(usage.usage_count)?)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[tracing::instrument(
        name = "remote.pg.list_loyalty_transactions",
        skip(self),
        fields(user_id = %user),
        err
    )]
    async fn list_loyalty_transactions(
        &self,
        user: UserId,
    ) -> Result<Vec<LoyaltyTransaction>, RemoteError> {
        let rows = query_as::<Postgres, LoyaltyRow>(LIST_LOYALTY_TRANSACTIONS_SQL)
            .bind(user.into_uuid())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|LoyaltyRow(row)| row).collect())
    }

    #[tracing::instrument(
        name = "remote.pg.insert_loyalty_transaction",
        skip(self, transaction),
        fields(order_id = %transaction.order_id, user_id = %transaction.user_id),
        err
    )]
    async fn insert_loyalty_transaction(
        &self,
        transaction: LoyaltyTransaction,
    ) -> Result<(), RemoteError> {
        query(INSERT_LOYALTY_TRANSACTION_SQL)
            .bind(transaction.order_id.into_uuid())
            .bind(transaction.user_id.into_uuid())
            .bind(optional_i64(transaction.points_received)?)
            .bind(optional_i64(transaction.points_redeemed)?)
            .bind(optional_i64(transaction.amount_received)?)
            .bind(optional_i64(transaction.amount_redeemed)?)
            .bind(SqlxTimestamp::from(transaction.created_at))
            .bind(transaction.expiry_date.map(SqlxTimestamp::from))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[tracing::instrument(name = "remote.pg.fetch_stock", skip(self), fields(product_id = %product), err)]
    async fn fetch_stock(&self, product: ProductId) -> Result<StockRecord, RemoteError> {
        let row = query_as::<Postgres, StockRow>(FETCH_STOCK_SQL)
            .bind(product.into_uuid())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0)
    }

    #[tracing::instrument(
        name = "remote.pg.update_stock",
        skip(self, stock),
        fields(product_id = %product),
        err
    )]
    async fn update_stock(
        &self,
        product: ProductId,
        stock: StockRecord,
    ) -> Result<(), RemoteError> {
        let rows_affected = query(UPDATE_STOCK_SQL)
            .bind(product.into_uuid())
            .bind(Json(&stock))
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(RemoteError::NotFound);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use sqlx::query;
    use testresult::TestResult;

    use crate::test::{
        db::TestDb,
        helpers::{cart_line, order_for},
    };

    use super::*;

    async fn seed_product(db: &TestDb, product: ProductId, stock: &StockRecord) -> TestResult {
        query("INSERT INTO products (id, size) VALUES ($1, $2)")
            .bind(product.into_uuid())
            .bind(Json(stock))
            .execute(db.pool())
            .await?;

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn cart_upsert_replaces_row() -> TestResult {
        let db = TestDb::new().await;
        let store = PgRemoteStore::new(db.pool().clone());
        let user = UserId::new();

        assert_eq!(store.fetch_cart(user).await?, None);

        let first = CartSnapshot::from(vec![cart_line(ProductId::new(), "M", 1)]);
        let second = CartSnapshot::from(vec![cart_line(ProductId::new(), "L", 2)]);

        store.upsert_cart(user, first).await?;
        store.upsert_cart(user, second.clone()).await?;

        assert_eq!(store.fetch_cart(user).await?, Some(second));

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn duplicate_order_insert_is_already_exists() -> TestResult {
        let db = TestDb::new().await;
        let store = PgRemoteStore::new(db.pool().clone());
        let order = order_for(UserId::new(), vec![cart_line(ProductId::new(), "M", 2)])?;

        let stored = store.insert_order(order.clone()).await?;

        assert_eq!(stored, order);

        let result = store.insert_order(order.clone()).await;

        assert!(
            matches!(result, Err(RemoteError::AlreadyExists)),
            "expected AlreadyExists, got {result:?}"
        );
        assert_eq!(store.fetch_order(order.order_id).await?, order);

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn promo_usage_upsert_overwrites_count() -> TestResult {
        let db = TestDb::new().await;
        let store = PgRemoteStore::new(db.pool().clone());
        let promo = PromoCodeId::new();
        let user = UserId::new();

        query(
            "INSERT INTO promocodes (id, code, discount_percent, used, \"limit\", max_uses_per_user) \
             VALUES ($1, 'SAVE10', $2, 0, 5, 2)",
        )
        .bind(promo.into_uuid())
        .bind(Decimal::from(10))
        .execute(db.pool())
        .await?;

        let found = store.find_promo_code("SAVE10".to_string()).await?;

        assert_eq!(found.id, promo);
        assert_eq!(found.usage_limit_global, 5);

        let usage = PromoUsage::first(user, promo);

        store.upsert_promo_usage(usage).await?;
        store.upsert_promo_usage(usage.incremented()).await?;
        store.update_promo_used(promo, 2).await?;

        assert_eq!(
            store
                .fetch_promo_usage(user, promo)
                .await?
                .map(|u| u.usage_count),
            Some(2)
        );
        assert_eq!(store.fetch_promo_code(promo).await?.used_global, 2);

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn stock_round_trips_as_size_map() -> TestResult {
        let db = TestDb::new().await;
        let store = PgRemoteStore::new(db.pool().clone());
        let product = ProductId::new();
        let stock: StockRecord = [("M", 3), ("L", 1)].into_iter().collect();

        seed_product(&db, product, &stock).await?;

        let mut fetched = store.fetch_stock(product).await?;

        assert_eq!(fetched, stock);

        fetched.decrement("M", 2)?;
        store.update_stock(product, fetched.clone()).await?;

        assert_eq!(store.fetch_stock(product).await?, fetched);

        let missing = store.fetch_stock(ProductId::new()).await;

        assert!(
            matches!(missing, Err(RemoteError::NotFound)),
            "expected NotFound, got {missing:?}"
        );

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn loyalty_rows_keep_optional_columns() -> TestResult {
        let db = TestDb::new().await;
        let store = PgRemoteStore::new(db.pool().clone());
        let user = UserId::new();
        let now = jiff::Timestamp::from_second(jiff::Timestamp::now().as_second())?;

        let earn = LoyaltyTransaction::earn(OrderId::new(), user, 950_00, now)?;
        let redeem = LoyaltyTransaction::redeem(OrderId::new(), user, 30, now)?;

        store.insert_loyalty_transaction(earn.clone()).await?;
        store.insert_loyalty_transaction(redeem.clone()).await?;

        let transactions = store.list_loyalty_transactions(user).await?;

        assert_eq!(transactions.len(), 2);
        assert!(transactions.contains(&earn), "missing earn row");
        assert!(transactions.contains(&redeem), "missing redeem row");

        Ok(())
    }
}
