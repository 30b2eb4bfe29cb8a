//! Orders

use std::fmt;

use jiff::{Timestamp, tz::TimeZone};
use serde::{Deserialize, Serialize};

use crate::{
    cart::{CartLine, CartSnapshot},
    ids::{OrderId, ProductId, PromoCodeId, UserId},
    money::{MoneyError, format_amount},
};

/// An order line, frozen from a cart line at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Product ordered.
    pub product_id: ProductId,

    /// Selected size; lines without a size are not stock tracked.
    pub selected_size: Option<String>,

    /// Units ordered.
    pub quantity: u32,

    /// Price per unit in minor units.
    pub unit_price: u64,

    /// `unit_price × quantity`.
    pub line_total: u64,
}

impl TryFrom<&CartLine> for OrderLine {
    type Error = MoneyError;

    fn try_from(line: &CartLine) -> Result<Self, Self::Error> {
        Ok(Self {
            product_id: line.product_id,
            selected_size: line.selected_size.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total: line.total()?,
        })
    }
}

/// How the customer pays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Pay the courier on delivery.
    CashOnDelivery,

    /// Paid through the payment gateway; `payment_id` is the verified payment.
    Online {
        /// Gateway payment reference.
        payment_id: String,
    },
}

impl PaymentMethod {
    /// Stable storage name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CashOnDelivery => "cod",
            Self::Online { .. } => "online",
        }
    }

    /// Gateway payment reference, for online payments.
    pub fn payment_id(&self) -> Option<&str> {
        match self {
            Self::CashOnDelivery => None,
            Self::Online { payment_id } => Some(payment_id),
        }
    }
}

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Awaiting payment on delivery.
    Pending,

    /// Paid.
    Confirmed,
}

impl OrderStatus {
    /// Initial status for a payment method.
    pub const fn for_payment(method: &PaymentMethod) -> Self {
        match method {
            PaymentMethod::CashOnDelivery => Self::Pending,
            PaymentMethod::Online { .. } => Self::Confirmed,
        }
    }

    /// Stable storage name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
        }
    }

    /// Parse a storage name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            _ => None,
        }
    }
}

/// Shipping status recorded with the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingStatus {
    /// The fulfillment API accepted the shipment.
    Processing,

    /// The fulfillment API failed; the shipment must be booked by hand.
    AwaitingFulfillment,
}

impl ShippingStatus {
    /// Stable storage name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::AwaitingFulfillment => "awaiting_fulfillment",
        }
    }

    /// Parse a storage name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "processing" => Some(Self::Processing),
            "awaiting_fulfillment" => Some(Self::AwaitingFulfillment),
            _ => None,
        }
    }
}

/// Where an order ships to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    /// Recipient name.
    pub name: String,

    /// Contact phone.
    pub phone: String,

    /// Street address.
    pub line1: String,

    /// Additional address line.
    pub line2: Option<String>,

    /// City.
    pub city: String,

    /// State.
    pub state: String,

    /// Postal code.
    pub pincode: String,
}

/// A courier option returned by the serviceability lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingOption {
    /// Courier id understood by the fulfillment API.
    pub courier_id: String,

    /// Courier display name.
    pub courier_name: String,

    /// Shipping charge in minor units.
    pub rate: u64,

    /// Estimated delivery time in days.
    pub estimated_days: Option<u32>,
}

/// Amounts charged for an order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    /// Sum of line totals.
    pub subtotal: u64,

    /// Promo code discount.
    pub discount: u64,

    /// Discount paid for with loyalty points.
    pub points_discount: u64,

    /// Shipping charge.
    pub shipping_charge: u64,

    /// Amount payable.
    pub total: u64,
}

impl OrderTotals {
    /// Compute totals for a cart.
    ///
    /// Discounts are capped so they never exceed the subtotal: the promo
    /// discount first, then the points discount on what remains.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] when an amount does not fit in `u64`.
    pub fn compute(
        cart: &CartSnapshot,
        promo_discount: u64,
        points_discount: u64,
        shipping_charge: u64,
    ) -> Result<Self, MoneyError> {
        let subtotal = cart.subtotal()?;
        let discount = promo_discount.min(subtotal);
        let points_discount = points_discount.min(subtotal - discount);

        let total = (subtotal - discount - points_discount)
            .checked_add(shipping_charge)
            .ok_or(MoneyError::Overflow)?;

        Ok(Self {
            subtotal,
            discount,
            points_discount,
            shipping_charge,
            total,
        })
    }
}

/// Customer-facing order number, e.g. `ORD-20261017-042917`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayOrderId(String);

impl DisplayOrderId {
    /// Derive a display number from the order id and the checkout time.
    pub fn generate(order_id: OrderId, at: Timestamp) -> Self {
        let date = at.to_zoned(TimeZone::UTC).strftime("%Y%m%d").to_string();
        let suffix = order_id.into_uuid().as_u128() % 1_000_000;

        Self(format!("ORD-{date}-{suffix:06}"))
    }

    /// Wrap a stored display number.
    pub const fn from_string(value: String) -> Self {
        Self(value)
    }

    /// The display number.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Client-generated idempotency key.
    pub order_id: OrderId,

    /// Customer-facing order number.
    pub display_order_id: DisplayOrderId,

    /// Customer.
    pub user_id: UserId,

    /// Lines ordered.
    pub items: Vec<OrderLine>,

    /// Amounts charged.
    pub totals: OrderTotals,

    /// Promo code applied, if any.
    pub promo_code_id: Option<PromoCodeId>,

    /// Loyalty points spent on the order.
    pub points_redeemed: u64,

    /// Payment method.
    pub payment_method: PaymentMethod,

    /// Order status.
    pub status: OrderStatus,

    /// Shipping status.
    pub shipping_status: ShippingStatus,

    /// Delivery address.
    pub address: DeliveryAddress,

    /// Fulfillment API response, or `{"error": ...}` when it failed.
    pub shipping_details: serde_json::Value,

    /// Checkout time.
    pub created_at: Timestamp,
}

impl Order {
    /// Lines that carry a size and are therefore stock tracked.
    pub fn sized_lines(&self) -> impl Iterator<Item = (&OrderLine, &str)> {
        self.items
            .iter()
            .filter_map(|line| line.selected_size.as_deref().map(|size| (line, size)))
    }

    /// One-line summary for logs and support tooling.
    pub fn summary(&self) -> String {
        format!(
            "{} ({} items, subtotal {}, discount {}, points {}, shipping {}, total {})",
            self.display_order_id,
            self.items.len(),
            format_amount(self.totals.subtotal),
            format_amount(self.totals.discount),
            format_amount(self.totals.points_discount),
            format_amount(self.totals.shipping_charge),
            format_amount(self.totals.total),
        )
    }
}
