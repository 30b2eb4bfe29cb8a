//! Storefront Domain Services

pub mod carts;
pub mod checkout;
pub mod loyalty;
pub mod promotions;
pub mod stock;
