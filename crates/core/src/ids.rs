//! Typed Identifiers

use std::{
    cmp::Ordering,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    hash::{Hash, Hasher},
    marker::PhantomData,
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// A UUID tagged with the kind of record it identifies.
///
/// Two ids with different tags cannot be mixed up at compile time, while the
/// runtime representation stays a plain [`Uuid`].
pub struct TypedUuid<T>(Uuid, PhantomData<T>);

impl<T> TypedUuid<T> {
    /// Generate a new time-ordered id.
    #[must_use]
    pub fn new() -> Self {
        Self::from_uuid(Uuid::now_v7())
    }

    /// Wrap an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid, PhantomData)
    }

    /// Unwrap into the underlying UUID.
    #[must_use]
    pub const fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl<T> Default for TypedUuid<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for TypedUuid<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TypedUuid<T> {}

impl<T> Debug for TypedUuid<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Debug::fmt(&self.0, f)
    }
}

impl<T> Display for TypedUuid<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self.0, f)
    }
}

impl<T> PartialEq for TypedUuid<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T> Eq for TypedUuid<T> {}

impl<T> Hash for TypedUuid<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T> PartialOrd for TypedUuid<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for TypedUuid<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T> From<Uuid> for TypedUuid<T> {
    fn from(value: Uuid) -> Self {
        Self::from_uuid(value)
    }
}

impl<T> From<TypedUuid<T>> for Uuid {
    fn from(value: TypedUuid<T>) -> Self {
        value.into_uuid()
    }
}

impl<T> FromStr for TypedUuid<T> {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self::from_uuid)
    }
}

impl<T> Serialize for TypedUuid<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for TypedUuid<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Uuid::deserialize(deserializer).map(Self::from_uuid)
    }
}

/// Marker for user ids.
#[derive(Debug)]
pub enum User {}

/// Marker for product ids.
#[derive(Debug)]
pub enum Product {}

/// Marker for order ids.
#[derive(Debug)]
pub enum OrderRecord {}

/// Marker for promo code ids.
#[derive(Debug)]
pub enum PromoCodeRecord {}

/// Authenticated user id, as supplied by the auth provider.
pub type UserId = TypedUuid<User>;

/// Product id.
pub type ProductId = TypedUuid<Product>;

/// Client-generated order id; the idempotency key for order commits.
pub type OrderId = TypedUuid<OrderRecord>;

/// Promo code id.
pub type PromoCodeId = TypedUuid<PromoCodeRecord>;

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn serializes_as_plain_uuid() -> TestResult {
        let uuid = Uuid::now_v7();
        let id = ProductId::from_uuid(uuid);

        assert_eq!(serde_json::to_string(&id)?, format!("\"{uuid}\""));

        let back: ProductId = serde_json::from_str(&format!("\"{uuid}\""))?;

        assert_eq!(back, id);

        Ok(())
    }

    #[test]
    fn parses_from_str() -> TestResult {
        let uuid = Uuid::now_v7();
        let id: OrderId = uuid.to_string().parse()?;

        assert_eq!(id.into_uuid(), uuid);
        assert!("not-a-uuid".parse::<OrderId>().is_err());

        Ok(())
    }
}
