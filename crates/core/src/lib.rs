//! Storefront
//!
//! Cart reconciliation and order commit rules for a client-resident storefront.
//!
//! Everything in this crate is synchronous and free of I/O: carts, the
//! local/remote merge, promo code evaluation, the loyalty points ledger, per-size
//! stock arithmetic and order totals. The async services that drive these rules
//! against a cache, a remote store and a fulfillment API live in `storefront-app`.
//!
//! Amounts are integer minor units (paise) unless a function says otherwise.

pub mod cart;
pub mod ids;
pub mod loyalty;
pub mod money;
pub mod orders;
pub mod promotions;
pub mod reconcile;
pub mod stock;
