//! Checkout Models

use serde::{Deserialize, Serialize};
use storefront::{
    cart::CartSnapshot,
    ids::{OrderId, UserId},
    orders::{DeliveryAddress, OrderTotals, PaymentMethod, ShippingOption},
    promotions::PromoQuote,
};
use tracing::warn;

use crate::{
    cache::{CacheError, PersistentCache, pending_order_key, read_json, write_json},
    domain::checkout::CheckoutValidationError,
};

/// A checkout in progress, staged in the persistent cache.
///
/// The order id is generated when the draft is created, so a commit retried
/// after a reload reuses the same idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutDraft {
    /// Idempotency key of the order this draft becomes.
    pub order_id: OrderId,

    /// Customer.
    pub user_id: UserId,

    /// Selected delivery address.
    pub address: Option<DeliveryAddress>,

    /// Selected courier.
    pub shipping: Option<ShippingOption>,

    /// Selected payment method.
    pub payment_method: Option<PaymentMethod>,

    /// Promo code as typed.
    pub promo_code: Option<String>,

    /// Loyalty points the customer wants to spend.
    pub points_to_redeem: u64,
}

/// The required parts of a draft, once present.
#[derive(Debug, Clone, Copy)]
pub struct ReadyDraft<'a> {
    /// Delivery address.
    pub address: &'a DeliveryAddress,

    /// Courier.
    pub shipping: &'a ShippingOption,

    /// Payment method.
    pub payment_method: &'a PaymentMethod,
}

/// Priced checkout, before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutQuote {
    /// Accepted promo code, if one was entered.
    pub promo: Option<PromoQuote>,

    /// Amounts the order would charge.
    pub totals: OrderTotals,

    /// Points the order would consume.
    pub points_redeemed: u64,
}

impl CheckoutDraft {
    /// Empty draft with a fresh order id.
    pub fn new(user_id: UserId) -> Self {
        Self {
            order_id: OrderId::new(),
            user_id,
            address: None,
            shipping: None,
            payment_method: None,
            promo_code: None,
            points_to_redeem: 0,
        }
    }

    /// The staged draft of `user`, or a new one.
    ///
    /// # Errors
    ///
    /// Returns an error when the cache cannot be read; unreadable drafts are
    /// replaced rather than reported.
    pub fn load_or_new(cache: &dyn PersistentCache, user: UserId) -> Result<Self, CacheError> {
        let key = pending_order_key(user);

        match read_json::<Self>(cache, &key) {
            Ok(Some(draft)) if draft.user_id == user => Ok(draft),
            Ok(_) => Ok(Self::new(user)),
            Err(error @ CacheError::Decode { .. }) => {
                warn!(%key, %error, "discarding unreadable checkout draft");

                Ok(Self::new(user))
            }
            Err(error) => Err(error),
        }
    }

    /// Stage the draft.
    ///
    /// # Errors
    ///
    /// Returns an error when the cache rejects the write.
    pub fn save(&self, cache: &dyn PersistentCache) -> Result<(), CacheError> {
        write_json(cache, &pending_order_key(self.user_id), self)
    }

    /// Remove the staged draft of `user`.
    ///
    /// # Errors
    ///
    /// Returns an error when the cache cannot be written.
    pub fn clear(cache: &dyn PersistentCache, user: UserId) -> Result<(), CacheError> {
        cache.remove(&pending_order_key(user))
    }

    /// Select the delivery address.
    #[must_use]
    pub fn with_address(mut self, address: DeliveryAddress) -> Self {
        self.address = Some(address);
        self
    }

    /// Select the courier.
    #[must_use]
    pub fn with_shipping(mut self, shipping: ShippingOption) -> Self {
        self.shipping = Some(shipping);
        self
    }

    /// Select the payment method.
    #[must_use]
    pub fn with_payment_method(mut self, payment_method: PaymentMethod) -> Self {
        self.payment_method = Some(payment_method);
        self
    }

    /// Apply a promo code as typed.
    #[must_use]
    pub fn with_promo_code(mut self, code: impl Into<String>) -> Self {
        self.promo_code = Some(code.into());
        self
    }

    /// Spend `points` loyalty points on the order.
    #[must_use]
    pub const fn with_points(mut self, points: u64) -> Self {
        self.points_to_redeem = points;
        self
    }

    /// Check that `cart` and the draft hold everything an order needs.
    ///
    /// # Errors
    ///
    /// Returns the first missing input: cart lines, address, shipping option,
    /// then payment method.
    pub fn validate(&self, cart: &CartSnapshot) -> Result<ReadyDraft<'_>, CheckoutValidationError> {
        if cart.is_empty() {
            return Err(CheckoutValidationError::EmptyCart);
        }

        let address = self
            .address
            .as_ref()
            .ok_or(CheckoutValidationError::NoAddress)?;

        let shipping = self
            .shipping
            .as_ref()
            .ok_or(CheckoutValidationError::NoShippingOption)?;

        let payment_method = self
            .payment_method
            .as_ref()
            .ok_or(CheckoutValidationError::NoPaymentMethod)?;

        Ok(ReadyDraft {
            address,
            shipping,
            payment_method,
        })
    }
}

#[cfg(test)]
mod tests {
    use storefront::ids::ProductId;
    use testresult::TestResult;

    use crate::{
        cache::MemoryCache,
        test::helpers::{address, cart_line, shipping_option},
    };

    use super::*;

    #[test]
    fn missing_inputs_are_reported_in_order() {
        let user = UserId::new();
        let cart = CartSnapshot::from(vec![cart_line(ProductId::new(), "M", 1)]);

        let draft = CheckoutDraft::new(user);

        assert_eq!(
            draft.validate(&CartSnapshot::empty()).err(),
            Some(CheckoutValidationError::EmptyCart)
        );
        assert_eq!(
            draft.validate(&cart).err(),
            Some(CheckoutValidationError::NoAddress)
        );

        let draft = draft.with_address(address());

        assert_eq!(
            draft.validate(&cart).err(),
            Some(CheckoutValidationError::NoShippingOption)
        );

        let draft = draft.with_shipping(shipping_option(50_00));

        assert_eq!(
            draft.validate(&cart).err(),
            Some(CheckoutValidationError::NoPaymentMethod)
        );

        let draft = draft.with_payment_method(PaymentMethod::CashOnDelivery);

        assert!(draft.validate(&cart).is_ok());
    }

    #[test]
    fn drafts_keep_their_order_id_across_reloads() -> TestResult {
        let cache = MemoryCache::new();
        let user = UserId::new();

        let draft = CheckoutDraft::load_or_new(&cache, user)?.with_address(address());
        draft.save(&cache)?;

        let reloaded = CheckoutDraft::load_or_new(&cache, user)?;

        assert_eq!(reloaded, draft);

        CheckoutDraft::clear(&cache, user)?;

        assert_ne!(CheckoutDraft::load_or_new(&cache, user)?.order_id, draft.order_id);

        Ok(())
    }

    #[test]
    fn unreadable_drafts_are_replaced() -> TestResult {
        let cache = MemoryCache::new();
        let user = UserId::new();

        cache.set(&pending_order_key(user), "not json")?;

        let draft = CheckoutDraft::load_or_new(&cache, user)?;

        assert_eq!(draft.user_id, user);
        assert_eq!(draft.address, None);

        Ok(())
    }
}
