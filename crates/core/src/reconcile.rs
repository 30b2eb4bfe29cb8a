//! Cart Reconciliation
//!
//! Merges the cart held locally with the copy last confirmed by the remote
//! store. The remote copy is the base: it carries the user's cart across
//! devices and tabs. Local lines are only appended when their key is missing
//! remotely; lines present on both sides keep the remote quantity, since the
//! local copy may predate the last confirmed sync.

use crate::cart::CartSnapshot;

/// Result of reconciling a local snapshot with the remote one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// The merged cart.
    pub merged: CartSnapshot,

    /// Whether the merged cart differs from what is stored remotely.
    pub push_required: bool,
}

/// Merge `local` into `remote`; remote lines win on key collisions.
pub fn merge(local: &CartSnapshot, remote: &CartSnapshot) -> CartSnapshot {
    let mut merged = remote.clone();

    for line in local.lines() {
        merged.insert_if_absent(line.clone());
    }

    merged
}

/// Merge against an optional remote snapshot and report whether a push is due.
///
/// A missing remote row is treated as an empty cart; pushing is only required
/// when the merge produced something the remote store does not already hold.
pub fn reconcile(local: &CartSnapshot, remote: Option<&CartSnapshot>) -> Reconciliation {
    let empty = CartSnapshot::empty();
    let remote = remote.unwrap_or(&empty);
    let merged = merge(local, remote);
    let push_required = &merged != remote;

    Reconciliation {
        merged,
        push_required,
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        cart::{CartLine, LineKey},
        ids::ProductId,
    };

    use super::*;

    fn line(product: ProductId, size: &str, quantity: u32) -> CartLine {
        CartLine {
            product_id: product,
            selected_size: Some(size.to_string()),
            quantity,
            unit_price: 100,
        }
    }

    #[test]
    fn remote_quantity_wins_on_collision() {
        let product = ProductId::new();
        let local = CartSnapshot::from(vec![line(product, "M", 5)]);
        let remote = CartSnapshot::from(vec![line(product, "M", 2)]);

        let merged = merge(&local, &remote);

        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged
                .get(&LineKey::sized(product, "M"))
                .map(|l| l.quantity),
            Some(2)
        );
    }

    #[test]
    fn local_only_lines_are_appended_after_remote_lines() {
        let shared = ProductId::new();
        let local_only = ProductId::new();

        let local = CartSnapshot::from(vec![line(local_only, "S", 1), line(shared, "M", 1)]);
        let remote = CartSnapshot::from(vec![line(shared, "M", 3)]);

        let merged = merge(&local, &remote);

        let keys: Vec<_> = merged.lines().iter().map(CartLine::key).collect();

        assert_eq!(
            keys,
            vec![LineKey::sized(shared, "M"), LineKey::sized(local_only, "S")]
        );
    }

    #[test]
    fn merge_is_idempotent() {
        let a = ProductId::new();
        let b = ProductId::new();

        let local = CartSnapshot::from(vec![line(a, "M", 1), line(b, "L", 4)]);
        let remote = CartSnapshot::from(vec![line(a, "M", 2), line(a, "S", 1)]);

        let once = merge(&local, &remote);
        let twice = merge(&once, &remote);

        assert_eq!(once, twice);
    }

    #[test]
    fn merged_keys_are_unique() {
        let a = ProductId::new();

        let local = CartSnapshot::from(vec![line(a, "M", 1), line(a, "L", 1)]);
        let remote = CartSnapshot::from(vec![line(a, "M", 1), line(a, "L", 7)]);

        let merged = merge(&local, &remote);
        let mut keys: Vec<_> = merged.lines().iter().map(CartLine::key).collect();
        keys.sort();
        keys.dedup();

        assert_eq!(keys.len(), merged.len());
    }

    #[test]
    fn push_only_required_when_merge_adds_lines() {
        let a = ProductId::new();
        let remote = CartSnapshot::from(vec![line(a, "M", 1)]);

        let same = reconcile(&CartSnapshot::from(vec![line(a, "M", 9)]), Some(&remote));
        assert!(!same.push_required);

        let grown = reconcile(&CartSnapshot::from(vec![line(a, "L", 1)]), Some(&remote));
        assert!(grown.push_required);
        assert_eq!(grown.merged.len(), 2);
    }

    #[test]
    fn missing_remote_pushes_non_empty_local() {
        let local = CartSnapshot::from(vec![line(ProductId::new(), "M", 1)]);

        assert!(reconcile(&local, None).push_required);
        assert!(!reconcile(&CartSnapshot::empty(), None).push_required);
    }
}
