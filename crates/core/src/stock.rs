//! Per-size Stock

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::ProductId;

/// Errors raised by stock decrements.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    /// Fewer units are available than requested.
    #[error("insufficient stock for size {size}: {available} available, {requested} requested")]
    InsufficientStock {
        /// Size label.
        size: String,
        /// Units on hand.
        available: u32,
        /// Units requested.
        requested: u32,
    },

    /// The product has no stock record.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),
}

/// Units on hand per size label for one product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockRecord {
    sizes: BTreeMap<String, u32>,
}

impl StockRecord {
    /// Units on hand for `size`, if the size is tracked.
    pub fn available(&self, size: &str) -> Option<u32> {
        self.sizes.get(size).copied()
    }

    /// Size labels and their units.
    pub fn sizes(&self) -> impl Iterator<Item = (&str, u32)> {
        self.sizes.iter().map(|(size, units)| (size.as_str(), *units))
    }

    /// Set the units on hand for `size`.
    pub fn set(&mut self, size: impl Into<String>, units: u32) {
        self.sizes.insert(size.into(), units);
    }

    /// Take `units` of `size`, leaving every other size untouched.
    ///
    /// An untracked size counts as zero units on hand.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::InsufficientStock`] when fewer than `units` are
    /// available; the record is left unchanged.
    pub fn decrement(&mut self, size: &str, units: u32) -> Result<u32, StockError> {
        let available = self.available(size).unwrap_or_default();

        let remaining =
            available
                .checked_sub(units)
                .ok_or_else(|| StockError::InsufficientStock {
                    size: size.to_string(),
                    available,
                    requested: units,
                })?;

        self.sizes.insert(size.to_string(), remaining);

        Ok(remaining)
    }
}

impl<S: Into<String>> FromIterator<(S, u32)> for StockRecord {
    fn from_iter<I: IntoIterator<Item = (S, u32)>>(iter: I) -> Self {
        Self {
            sizes: iter
                .into_iter()
                .map(|(size, units)| (size.into(), units))
                .collect(),
        }
    }
}
