//! Row decoding for the PostgreSQL store.

use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{FromRow, Row, postgres::PgRow, types::Json};
use storefront::{
    cart::CartSnapshot,
    ids::{OrderId, ProductId, PromoCodeId, UserId},
    loyalty::LoyaltyTransaction,
    orders::{
        DeliveryAddress, DisplayOrderId, Order, OrderLine, OrderStatus, OrderTotals,
        PaymentMethod, ShippingStatus,
    },
    promotions::{PromoCode, PromoUsage},
    stock::StockRecord,
};

/// A `cart_data` row.
#[derive(Debug)]
pub(super) struct CartRow(pub(super) CartSnapshot);

impl<'r> FromRow<'r, PgRow> for CartRow {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let Json(snapshot) = row.try_get::<Json<CartSnapshot>, _>("cart_items")?;

        Ok(Self(snapshot))
    }
}

/// An `orders` row.
#[derive(Debug)]
pub(super) struct OrderRow(pub(super) Order);

impl<'r> FromRow<'r, PgRow> for OrderRow {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let Json(items) = row.try_get::<Json<Vec<OrderLine>>, _>("items")?;
        let Json(address) = row.try_get::<Json<DeliveryAddress>, _>("address")?;

        let payment_method = match row.try_get::<&str, _>("payment_method")? {
            "cod" => PaymentMethod::CashOnDelivery,
            "online" => PaymentMethod::Online {
                payment_id: row
                    .try_get::<Option<String>, _>("payment_id")?
                    .unwrap_or_default(),
            },
            other => return Err(invalid_value("payment_method", other)),
        };

        let status = row.try_get::<&str, _>("status")?;
        let status = OrderStatus::parse(status).ok_or_else(|| invalid_value("status", status))?;

        let shipping_status = row.try_get::<&str, _>("shipping_status")?;
        let shipping_status = ShippingStatus::parse(shipping_status)
            .ok_or_else(|| invalid_value("shipping_status", shipping_status))?;

        Ok(Self(Order {
            order_id: OrderId::from_uuid(row.try_get("order_id")?),
            display_order_id: DisplayOrderId::from_string(row.try_get("display_order_id")?),
            user_id: UserId::from_uuid(row.try_get("user_id")?),
            items,
            totals: OrderTotals {
                subtotal: try_get_amount(row, "subtotal")?,
                discount: try_get_amount(row, "discount")?,
                points_discount: try_get_amount(row, "points_discount")?,
                shipping_charge: try_get_amount(row, "shipping_charges")?,
                total: try_get_amount(row, "total")?,
            },
            promo_code_id: row
                .try_get::<Option<uuid::Uuid>, _>("promo_code_id")?
                .map(PromoCodeId::from_uuid),
            points_redeemed: try_get_amount(row, "points_redeemed")?,
            payment_method,
            status,
            shipping_status,
            address,
            shipping_details: row.try_get("shipping_details")?,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
        }))
    }
}

/// A `promocodes` row.
#[derive(Debug)]
pub(super) struct PromoCodeRow(pub(super) PromoCode);

impl<'r> FromRow<'r, PgRow> for PromoCodeRow {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self(PromoCode {
            id: PromoCodeId::from_uuid(row.try_get("id")?),
            code: row.try_get("code")?,
            discount_percent: row.try_get("discount_percent")?,
            usage_limit_global: try_get_count(row, "limit")?,
            used_global: try_get_count(row, "used")?,
            usage_limit_per_user: try_get_count(row, "max_uses_per_user")?,
            eligible_product_id: row
                .try_get::<Option<uuid::Uuid>, _>("product_id")?
                .map(ProductId::from_uuid),
        }))
    }
}

/// A `promo_usage` row.
#[derive(Debug)]
pub(super) struct PromoUsageRow(pub(super) PromoUsage);

impl<'r> FromRow<'r, PgRow> for PromoUsageRow {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self(PromoUsage {
            user_id: UserId::from_uuid(row.try_get("user_id")?),
            promo_code_id: PromoCodeId::from_uuid(row.try_get("promo_code_id")?),
            usage_count: try_get_count(row, "usage_count")?,
        }))
    }
}

/// A `point_redemptions` row.
#[derive(Debug)]
pub(super) struct LoyaltyRow(pub(super) LoyaltyTransaction);

impl<'r> FromRow<'r, PgRow> for LoyaltyRow {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self(LoyaltyTransaction {
            order_id: OrderId::from_uuid(row.try_get("order_id")?),
            user_id: UserId::from_uuid(row.try_get("user_id")?),
            points_received: try_get_optional_amount(row, "points_received")?,
            points_redeemed: try_get_optional_amount(row, "points_redeemed")?,
            amount_received: try_get_optional_amount(row, "amount_received")?,
            amount_redeemed: try_get_optional_amount(row, "amount_redeemed")?,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            expiry_date: row
                .try_get::<Option<SqlxTimestamp>, _>("expiry_date")?
                .map(SqlxTimestamp::to_jiff),
        }))
    }
}

/// A `products` row, reduced to its stock map.
#[derive(Debug)]
pub(super) struct StockRow(pub(super) StockRecord);

impl<'r> FromRow<'r, PgRow> for StockRow {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let Json(stock) = row.try_get::<Json<StockRecord>, _>("size")?;

        Ok(Self(stock))
    }
}

fn try_get_amount(row: &PgRow, col: &str) -> Result<u64, sqlx::Error> {
    let amount_i64: i64 = row.try_get(col)?;

    u64::try_from(amount_i64).map_err(|e| sqlx::Error::ColumnDecode {
        index: col.to_string(),
        source: Box::new(e),
    })
}

fn try_get_optional_amount(row: &PgRow, col: &str) -> Result<Option<u64>, sqlx::Error> {
    row.try_get::<Option<i64>, _>(col)?
        .map(|amount| {
            u64::try_from(amount).map_err(|e| sqlx::Error::ColumnDecode {
                index: col.to_string(),
                source: Box::new(e),
            })
        })
        .transpose()
}

fn try_get_count(row: &PgRow, col: &str) -> Result<u32, sqlx::Error> {
    let count_i32: i32 = row.try_get(col)?;

    u32::try_from(count_i32).map_err(|e| sqlx::Error::ColumnDecode {
        index: col.to_string(),
        source: Box::new(e),
    })
}

fn invalid_value(col: &str, value: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: col.to_string(),
        source: format!("unexpected value {value:?}").into(),
    }
}
