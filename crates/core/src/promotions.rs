//! Promo Codes
//!
//! Validation here is advisory: it reads usage counters that other checkouts
//! may be changing at the same time. The global limit is enforced again when
//! usage is recorded for a committed order.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    cart::CartSnapshot,
    ids::{ProductId, PromoCodeId, UserId},
    money::percentage_of,
};

/// Why a promo code cannot be applied.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromoRejection {
    /// No promo code matches.
    #[error("promo code not found")]
    NotFound,

    /// The code has been used as many times as it may be, across all users.
    #[error("promo code usage limit reached")]
    GlobalLimitReached,

    /// This user has already used the code as many times as allowed.
    #[error("promo code already used the maximum number of times")]
    PerUserLimitReached,

    /// The code only applies to a product that is not in the cart.
    #[error("promo code does not apply to any product in the cart")]
    ProductNotEligible,
}

/// A promo code row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCode {
    /// Promo code id.
    pub id: PromoCodeId,

    /// Code as typed by customers.
    pub code: String,

    /// Percentage taken off the subtotal.
    pub discount_percent: Decimal,

    /// Maximum committed uses across all users.
    pub usage_limit_global: u32,

    /// Committed uses so far across all users.
    pub used_global: u32,

    /// Maximum committed uses per user.
    pub usage_limit_per_user: u32,

    /// When set, the code only applies if this product is in the cart.
    pub eligible_product_id: Option<ProductId>,
}

/// Per-user usage of a promo code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoUsage {
    /// User who used the code.
    pub user_id: UserId,

    /// The code used.
    pub promo_code_id: PromoCodeId,

    /// Committed orders that applied the code.
    pub usage_count: u32,
}

impl PromoUsage {
    /// Usage row for a first committed use.
    pub const fn first(user_id: UserId, promo_code_id: PromoCodeId) -> Self {
        Self {
            user_id,
            promo_code_id,
            usage_count: 1,
        }
    }

    /// The same row with one more committed use.
    #[must_use]
    pub const fn incremented(self) -> Self {
        Self {
            usage_count: self.usage_count.saturating_add(1),
            ..self
        }
    }
}

/// An accepted promo code and the discount it yields for a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoQuote {
    /// Promo code id.
    pub promo_code_id: PromoCodeId,

    /// Normalised code.
    pub code: String,

    /// Percentage applied.
    pub discount_percent: Decimal,

    /// Discount in minor units.
    pub discount_amount: u64,
}

impl PromoCode {
    /// Discount this code yields on `subtotal`, rounded down.
    pub fn discount_for(&self, subtotal: u64) -> u64 {
        percentage_of(subtotal, self.discount_percent)
    }

    /// Whether the global usage limit has been reached.
    pub const fn is_exhausted(&self) -> bool {
        self.used_global >= self.usage_limit_global
    }

    /// Check the code against a user's usage and cart contents.
    ///
    /// # Errors
    ///
    /// Returns the first [`PromoRejection`] that applies, checking the global
    /// limit, then the per-user limit, then product eligibility.
    pub fn evaluate(
        &self,
        user_usage: u32,
        cart: &CartSnapshot,
        subtotal: u64,
    ) -> Result<PromoQuote, PromoRejection> {
        if self.is_exhausted() {
            return Err(PromoRejection::GlobalLimitReached);
        }

        if user_usage >= self.usage_limit_per_user {
            return Err(PromoRejection::PerUserLimitReached);
        }

        if let Some(product) = self.eligible_product_id
            && !cart.lines().iter().any(|line| line.product_id == product)
        {
            return Err(PromoRejection::ProductNotEligible);
        }

        Ok(PromoQuote {
            promo_code_id: self.id,
            code: self.code.clone(),
            discount_percent: self.discount_percent,
            discount_amount: self.discount_for(subtotal),
        })
    }

    /// Count one committed use against the global limit.
    ///
    /// # Errors
    ///
    /// Returns [`PromoRejection::GlobalLimitReached`] when the limit has
    /// already been reached; the counter is left unchanged.
    pub fn record_use(&mut self) -> Result<u32, PromoRejection> {
        if self.is_exhausted() {
            return Err(PromoRejection::GlobalLimitReached);
        }

        self.used_global += 1;

        Ok(self.used_global)
    }
}

/// Canonical form of a customer-typed code: trimmed and upper-cased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use crate::cart::CartLine;

    use super::*;

    fn save10() -> PromoCode {
        PromoCode {
            id: PromoCodeId::new(),
            code: "SAVE10".to_string(),
            discount_percent: Decimal::from(10),
            usage_limit_global: 5,
            used_global: 0,
            usage_limit_per_user: 1,
            eligible_product_id: None,
        }
    }

    fn cart_with(product: ProductId) -> CartSnapshot {
        CartSnapshot::from(vec![CartLine {
            product_id: product,
            selected_size: Some("M".to_string()),
            quantity: 2,
            unit_price: 500_00,
        }])
    }

    #[test]
    fn accepted_code_quotes_percentage_of_subtotal() {
        let cart = cart_with(ProductId::new());

        let quote = save10().evaluate(0, &cart, 1_000_00);

        assert_eq!(quote.map(|q| q.discount_amount), Ok(100_00));
    }

    #[test]
    fn global_limit_is_checked_first() {
        let mut promo = save10();
        promo.used_global = 5;

        let result = promo.evaluate(1, &cart_with(ProductId::new()), 100);

        assert_eq!(result, Err(PromoRejection::GlobalLimitReached));
    }

    #[test]
    fn per_user_limit_rejects_repeat_use() {
        let result = save10().evaluate(1, &cart_with(ProductId::new()), 100);

        assert_eq!(result, Err(PromoRejection::PerUserLimitReached));
    }

    #[test]
    fn product_scoped_code_needs_matching_line() {
        let eligible = ProductId::new();
        let mut promo = save10();
        promo.eligible_product_id = Some(eligible);

        assert_eq!(
            promo.evaluate(0, &cart_with(ProductId::new()), 100),
            Err(PromoRejection::ProductNotEligible)
        );
        assert!(promo.evaluate(0, &cart_with(eligible), 100).is_ok());
    }

    #[test]
    fn record_use_stops_at_global_limit() {
        let mut promo = save10();
        promo.used_global = 4;

        assert_eq!(promo.record_use(), Ok(5));
        assert_eq!(promo.record_use(), Err(PromoRejection::GlobalLimitReached));
        assert_eq!(promo.used_global, 5);
    }

    #[test]
    fn usage_increments_from_first() {
        let usage = PromoUsage::first(UserId::new(), PromoCodeId::new());

        assert_eq!(usage.usage_count, 1);
        assert_eq!(usage.incremented().usage_count, 2);
    }

    #[test]
    fn codes_are_normalised() {
        assert_eq!(normalize_code("  save10 "), "SAVE10");
    }
}
