//! Promo ledger errors.

use storefront::{money::MoneyError, promotions::PromoRejection};
use thiserror::Error;

use crate::remote::RemoteError;

/// Errors raised by the promo ledger.
#[derive(Debug, Error)]
pub enum PromoError {
    /// The code cannot be applied.
    #[error(transparent)]
    Rejected(#[from] PromoRejection),

    /// The discount overflowed.
    #[error("failed to price promo code")]
    Money(#[from] MoneyError),

    /// Promo rows could not be read or written.
    #[error("promo code storage error")]
    Remote(#[source] RemoteError),
}

impl From<RemoteError> for PromoError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::NotFound => Self::Rejected(PromoRejection::NotFound),
            error => Self::Remote(error),
        }
    }
}
