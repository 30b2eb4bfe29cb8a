//! Checkout

pub mod coordinator;
mod errors;
pub mod models;
pub mod state;

pub use coordinator::{CommitDependencies, OrderCommitCoordinator};
pub use errors::{
    CheckoutError, CheckoutValidationError, LedgerApplicationError, LedgerFailure, LedgerStep,
};
pub use models::{CheckoutDraft, CheckoutQuote, ReadyDraft};
pub use state::{CommitOutcome, CommitStage, CommitState};
