//! Carts

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    ids::ProductId,
    money::{MoneyError, checked_sum, line_total},
};

/// Errors raised by cart mutations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CartError {
    /// Cart lines must carry at least one unit.
    #[error("quantity must be at least 1")]
    ZeroQuantity,

    /// Adding to a line would overflow its quantity.
    #[error("quantity overflowed")]
    QuantityOverflow,

    /// No line matches the given key.
    #[error("cart line not found")]
    LineNotFound,

    /// Amount arithmetic overflowed.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Identity of a cart line: one line per product and size.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineKey {
    /// Product on the line.
    pub product_id: ProductId,

    /// Selected size label, if the product is sized.
    pub selected_size: Option<String>,
}

impl LineKey {
    /// Key for a sized product line.
    pub fn sized(product_id: ProductId, size: impl Into<String>) -> Self {
        Self {
            product_id,
            selected_size: Some(size.into()),
        }
    }

    /// Key for a product without sizes.
    pub const fn without_size(product_id: ProductId) -> Self {
        Self {
            product_id,
            selected_size: None,
        }
    }
}

/// A single cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Product on the line.
    pub product_id: ProductId,

    /// Selected size label, if the product is sized.
    pub selected_size: Option<String>,

    /// Units, always at least one.
    pub quantity: u32,

    /// Price per unit in minor units.
    pub unit_price: u64,
}

impl CartLine {
    /// Build a cart line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::ZeroQuantity`] when `quantity` is zero.
    pub fn new(
        product_id: ProductId,
        selected_size: Option<String>,
        quantity: u32,
        unit_price: u64,
    ) -> Result<Self, CartError> {
        if quantity == 0 {
            return Err(CartError::ZeroQuantity);
        }

        Ok(Self {
            product_id,
            selected_size,
            quantity,
            unit_price,
        })
    }

    /// Identity key of this line.
    pub fn key(&self) -> LineKey {
        LineKey {
            product_id: self.product_id,
            selected_size: self.selected_size.clone(),
        }
    }

    /// Whether this line has the given key.
    pub fn has_key(&self, key: &LineKey) -> bool {
        self.product_id == key.product_id && self.selected_size == key.selected_size
    }

    /// Price of the whole line.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] when the line total does not fit in `u64`.
    pub fn total(&self) -> Result<u64, MoneyError> {
        line_total(self.unit_price, self.quantity)
    }
}

/// Ordered cart contents owned by one session.
///
/// No two lines share a [`LineKey`]. Deserialized snapshots are normalised on
/// the way in: duplicate keys are folded together and empty lines dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<CartLine>", into = "Vec<CartLine>")]
pub struct CartSnapshot {
    lines: Vec<CartLine>,
}

impl CartSnapshot {
    /// An empty cart.
    pub const fn empty() -> Self {
        Self { lines: Vec::new() }
    }

    /// Lines in insertion order.
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Number of distinct lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the cart has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total units across all lines.
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    /// Line with the given key, if present.
    pub fn get(&self, key: &LineKey) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.has_key(key))
    }

    /// Whether a line with the given key exists.
    pub fn contains(&self, key: &LineKey) -> bool {
        self.get(key).is_some()
    }

    /// Add a line, summing quantities when the key already exists.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::ZeroQuantity`] for empty lines and
    /// [`CartError::QuantityOverflow`] when the summed quantity overflows.
    pub fn add(&mut self, line: CartLine) -> Result<(), CartError> {
        if line.quantity == 0 {
            return Err(CartError::ZeroQuantity);
        }

        let key = line.key();

        match self.lines.iter_mut().find(|existing| existing.has_key(&key)) {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(line.quantity)
                    .ok_or(CartError::QuantityOverflow)?;
            }
            None => self.lines.push(line),
        }

        Ok(())
    }

    /// Append a line only when its key is absent. Returns whether it was added.
    pub fn insert_if_absent(&mut self, line: CartLine) -> bool {
        if line.quantity == 0 || self.contains(&line.key()) {
            return false;
        }

        self.lines.push(line);

        true
    }

    /// Set the quantity of an existing line; zero removes it.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::LineNotFound`] when no line has the key.
    pub fn set_quantity(&mut self, key: &LineKey, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return self.remove(key).map(|_| ()).ok_or(CartError::LineNotFound);
        }

        let line = self
            .lines
            .iter_mut()
            .find(|line| line.has_key(key))
            .ok_or(CartError::LineNotFound)?;

        line.quantity = quantity;

        Ok(())
    }

    /// Remove the line with the given key.
    pub fn remove(&mut self, key: &LineKey) -> Option<CartLine> {
        let index = self.lines.iter().position(|line| line.has_key(key))?;

        Some(self.lines.remove(index))
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Sum of line totals.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] when the subtotal does not fit in `u64`.
    pub fn subtotal(&self) -> Result<u64, MoneyError> {
        let totals = self
            .lines
            .iter()
            .map(CartLine::total)
            .collect::<Result<Vec<_>, _>>()?;

        checked_sum(totals)
    }
}

impl From<Vec<CartLine>> for CartSnapshot {
    fn from(lines: Vec<CartLine>) -> Self {
        let mut snapshot = Self::empty();

        for line in lines {
            if line.quantity == 0 {
                continue;
            }

            let key = line.key();

            match snapshot.lines.iter_mut().find(|existing| existing.has_key(&key)) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(line.quantity);
                }
                None => snapshot.lines.push(line),
            }
        }

        snapshot
    }
}

impl From<CartSnapshot> for Vec<CartLine> {
    fn from(snapshot: CartSnapshot) -> Self {
        snapshot.lines
    }
}

impl FromIterator<CartLine> for CartSnapshot {
    fn from_iter<I: IntoIterator<Item = CartLine>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    fn line(product: ProductId, size: &str, quantity: u32, price: u64) -> CartLine {
        CartLine {
            product_id: product,
            selected_size: Some(size.to_string()),
            quantity,
            unit_price: price,
        }
    }

    #[test]
    fn adding_same_key_sums_quantity() -> TestResult {
        let product = ProductId::new();
        let mut cart = CartSnapshot::empty();

        cart.add(line(product, "M", 1, 500_00))?;
        cart.add(line(product, "M", 2, 500_00))?;
        cart.add(line(product, "L", 1, 500_00))?;

        assert_eq!(cart.len(), 2);
        assert_eq!(
            cart.get(&LineKey::sized(product, "M")).map(|l| l.quantity),
            Some(3)
        );
        assert_eq!(cart.item_count(), 4);

        Ok(())
    }

    #[test]
    fn zero_quantity_lines_are_rejected() {
        let product = ProductId::new();

        assert_eq!(
            CartLine::new(product, None, 0, 100),
            Err(CartError::ZeroQuantity)
        );
        assert_eq!(
            CartSnapshot::empty().add(line(product, "M", 0, 100)),
            Err(CartError::ZeroQuantity)
        );
    }

    #[test]
    fn setting_quantity_to_zero_removes_line() -> TestResult {
        let product = ProductId::new();
        let key = LineKey::sized(product, "M");
        let mut cart = CartSnapshot::from(vec![line(product, "M", 2, 100)]);

        cart.set_quantity(&key, 5)?;
        assert_eq!(cart.get(&key).map(|l| l.quantity), Some(5));

        cart.set_quantity(&key, 0)?;
        assert!(cart.is_empty());

        assert_eq!(cart.set_quantity(&key, 1), Err(CartError::LineNotFound));

        Ok(())
    }

    #[test]
    fn deserializing_folds_duplicate_keys() -> TestResult {
        let product = ProductId::new();
        let raw = serde_json::to_string(&vec![
            line(product, "M", 1, 100),
            line(product, "M", 2, 100),
            line(product, "S", 0, 100),
        ])?;

        let cart: CartSnapshot = serde_json::from_str(&raw)?;

        assert_eq!(cart.len(), 1);
        assert_eq!(cart.item_count(), 3);

        Ok(())
    }

    #[test]
    fn subtotal_sums_line_totals() -> TestResult {
        let cart = CartSnapshot::from(vec![
            line(ProductId::new(), "M", 2, 500_00),
            line(ProductId::new(), "S", 1, 250_00),
        ]);

        assert_eq!(cart.subtotal()?, 1_250_00);

        Ok(())
    }

    #[test]
    fn sized_and_sizeless_lines_are_distinct() -> TestResult {
        let product = ProductId::new();
        let mut cart = CartSnapshot::empty();

        cart.add(CartLine::new(product, None, 1, 100)?)?;
        cart.add(line(product, "M", 1, 100))?;

        assert_eq!(cart.len(), 2);
        assert!(cart.contains(&LineKey::without_size(product)));

        Ok(())
    }
}
