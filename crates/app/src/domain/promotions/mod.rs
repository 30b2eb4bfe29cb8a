//! Promotions

mod errors;
pub mod ledger;

pub use errors::PromoError;
pub use ledger::{MockPromoLedger, PromoLedger, RemotePromoLedger};
