//! Test Helpers

use jiff::Timestamp;
use rust_decimal::Decimal;
use storefront::{
    cart::{CartLine, CartSnapshot},
    ids::{OrderId, ProductId, PromoCodeId, UserId},
    money::MoneyError,
    orders::{
        DeliveryAddress, DisplayOrderId, Order, OrderLine, OrderStatus, OrderTotals,
        PaymentMethod, ShippingOption, ShippingStatus,
    },
    promotions::PromoCode,
};

/// Unit price used by every helper line: ₹500.
pub(crate) const UNIT_PRICE: u64 = 500_00;

pub(crate) fn cart_line(product: ProductId, size: &str, quantity: u32) -> CartLine {
    CartLine {
        product_id: product,
        selected_size: Some(size.to_string()),
        quantity,
        unit_price: UNIT_PRICE,
    }
}

/// Current time truncated to whole seconds, so it survives a database round trip.
pub(crate) fn now() -> Timestamp {
    Timestamp::from_second(Timestamp::now().as_second()).unwrap_or(Timestamp::UNIX_EPOCH)
}

pub(crate) fn address() -> DeliveryAddress {
    DeliveryAddress {
        name: "Asha Rao".to_string(),
        phone: "9800000000".to_string(),
        line1: "12 MG Road".to_string(),
        line2: None,
        city: "Bengaluru".to_string(),
        state: "Karnataka".to_string(),
        pincode: "560001".to_string(),
    }
}

pub(crate) fn shipping_option(rate: u64) -> ShippingOption {
    ShippingOption {
        courier_id: "42".to_string(),
        courier_name: "Blue Courier".to_string(),
        rate,
        estimated_days: Some(4),
    }
}

pub(crate) fn save10() -> PromoCode {
    PromoCode {
        id: PromoCodeId::new(),
        code: "SAVE10".to_string(),
        discount_percent: Decimal::from(10),
        usage_limit_global: 100,
        used_global: 0,
        usage_limit_per_user: 1,
        eligible_product_id: None,
    }
}

/// A cash-on-delivery order for `lines` without discounts or shipping.
pub(crate) fn order_for(user: UserId, lines: Vec<CartLine>) -> Result<Order, MoneyError> {
    let cart = CartSnapshot::from(lines);
    let order_id = OrderId::new();
    let created_at = now();

    let items = cart
        .lines()
        .iter()
        .map(OrderLine::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Order {
        order_id,
        display_order_id: DisplayOrderId::generate(order_id, created_at),
        user_id: user,
        items,
        totals: OrderTotals::compute(&cart, 0, 0, 0)?,
        promo_code_id: None,
        points_redeemed: 0,
        payment_method: PaymentMethod::CashOnDelivery,
        status: OrderStatus::Pending,
        shipping_status: ShippingStatus::Processing,
        address: address(),
        shipping_details: serde_json::json!({ "shipment_id": "SHP-1" }),
        created_at,
    })
}
