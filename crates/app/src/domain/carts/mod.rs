//! Carts

pub mod session;
pub mod store;
pub mod sync;

pub use session::CartSession;
pub use store::{CartState, LocalCartStore};
pub use sync::SyncScheduler;
