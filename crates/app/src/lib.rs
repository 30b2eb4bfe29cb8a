//! Storefront application services.
//!
//! Drives the rules of the `storefront` crate against a persistent cache, a
//! remote store and a fulfillment API: cart sessions with debounced sync, and
//! order commits with their promo, loyalty and stock side effects.

pub mod cache;
pub mod config;
pub mod context;
pub mod database;
pub mod domain;
pub mod fulfillment;
pub mod observability;
pub mod remote;

#[cfg(test)]
mod test;
