//! Loyalty

mod errors;
pub mod ledger;

pub use errors::LoyaltyLedgerError;
pub use ledger::{LoyaltyLedger, MockLoyaltyLedger, PointsBalance, RemoteLoyaltyLedger};
