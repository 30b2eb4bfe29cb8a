//! Stock

mod decrementer;

pub use decrementer::{
    MockStockDecrementer, RemoteStockDecrementer, StockDecrementError, StockDecrementer,
};
