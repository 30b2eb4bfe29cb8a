//! Loyalty ledger errors.

use storefront::loyalty::LoyaltyError;
use thiserror::Error;

use crate::remote::RemoteError;

/// Errors raised by the loyalty ledger.
#[derive(Debug, Error)]
pub enum LoyaltyLedgerError {
    /// The ledger row could not be built.
    #[error("invalid loyalty transaction")]
    Loyalty(#[from] LoyaltyError),

    /// The ledger could not be read or written.
    #[error("loyalty storage error")]
    Remote(#[from] RemoteError),
}
