//! Checkout errors.

use std::fmt;

use serde::Serialize;
use storefront::{
    ids::{OrderId, ProductId},
    money::MoneyError,
};
use thiserror::Error;

use crate::{
    cache::CacheError,
    domain::{
        checkout::CommitStage, loyalty::LoyaltyLedgerError, promotions::PromoError,
    },
    remote::RemoteError,
};

/// Input the customer still has to supply.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckoutValidationError {
    /// The draft's user is not the signed-in user.
    #[error("the checkout belongs to a different session")]
    NotSignedIn,

    /// Nothing to order.
    #[error("the cart is empty")]
    EmptyCart,

    /// No delivery address chosen.
    #[error("no delivery address selected")]
    NoAddress,

    /// No courier chosen.
    #[error("no shipping option selected")]
    NoShippingOption,

    /// No payment method chosen.
    #[error("no payment method selected")]
    NoPaymentMethod,

    #[error("{requested} points requested but only {available} can be redeemed")]
    /// The spendable balance does not cover the points requested.
    InsufficientPoints {
        /// Points the draft asks to redeem.
        requested: u64,

        /// Spendable balance.
        available: i64,
    },
}

/// A side effect applied after the order was persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum LedgerStep {
    /// Promo code usage counters.
    PromoUsage,

    /// Points earned on the order.
    PointsEarned,

    /// Points spent on the order.
    PointsRedeemed,

    /// Stock decrement of one sized line.
    Stock {
        /// Product of the line.
        product_id: ProductId,

        /// Size of the line.
        size: String,
    },
}

impl fmt::Display for LedgerStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PromoUsage => f.write_str("promo usage"),
            Self::PointsEarned => f.write_str("points earned"),
            Self::PointsRedeemed => f.write_str("points redeemed"),
            Self::Stock { product_id, size } => write!(f, "stock of {product_id} size {size}"),
        }
    }
}

/// One failed ledger step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerFailure {
    /// Step that failed.
    pub step: LedgerStep,

    /// Underlying error.
    pub message: String,
}

/// The order was persisted but some ledger steps failed and need manual
/// reconciliation. The order stands.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("order {order_id} was placed but {} ledger step(s) failed", failures.len())]
pub struct LedgerApplicationError {
    /// The persisted order.
    pub order_id: OrderId,

    /// Every step that failed, in application order.
    pub failures: Vec<LedgerFailure>,
}

/// Errors raised by checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The draft is incomplete.
    #[error(transparent)]
    Validation(#[from] CheckoutValidationError),

    /// The promo code was rejected or could not be read.
    #[error(transparent)]
    Promo(#[from] PromoError),

    /// The points balance could not be read.
    #[error("failed to read loyalty points")]
    Loyalty(#[from] LoyaltyLedgerError),

    /// An amount overflowed.
    #[error("failed to price order")]
    Money(#[from] MoneyError),

    /// The draft could not be staged.
    #[error("failed to stage checkout")]
    Cache(#[from] CacheError),

    /// The order could not be read or written.
    #[error("order storage error")]
    Remote(#[from] RemoteError),

    /// The order was placed but ledger steps failed.
    #[error(transparent)]
    LedgerApplication(#[from] LedgerApplicationError),

    /// A concurrent commit this call waited on failed.
    #[error("checkout failed while {stage}: {message}")]
    Failed {
        /// Stage the other commit failed at.
        stage: CommitStage,

        /// Failure description.
        message: String,
    },

    /// A commit for a different order is running; this draft was not
    /// committed.
    #[error("order {in_flight} is already being committed")]
    CommitInFlight {
        /// Order of the running commit.
        in_flight: OrderId,
    },

    /// The commit task stopped unexpectedly.
    #[error("checkout task aborted")]
    Aborted,
}
