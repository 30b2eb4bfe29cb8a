//! Loyalty Points
//!
//! The points balance is derived from an append-only transaction log. Earned
//! points become spendable after a grace window and lapse a year later; lapsed
//! points are excluded when reading the balance, never deleted, so the log
//! stays auditable.

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    ids::{OrderId, UserId},
    money::{MINOR_PER_MAJOR, whole_major_units},
};

/// Points granted for every full earn step spent.
pub const POINTS_PER_EARN_STEP: u64 = 10;

/// Major units (rupees) per earn step.
pub const EARN_STEP_MAJOR: u64 = 100;

/// Points consumed per major unit (rupee) of discount.
pub const POINTS_PER_MAJOR_REDEEMED: u64 = 5;

/// Delay before earned points become spendable.
pub const GRACE_PERIOD: SignedDuration = SignedDuration::from_hours(15 * 24);

/// Lifetime of earned points, counted from the end of the grace period.
pub const VALIDITY: SignedDuration = SignedDuration::from_hours(365 * 24);

/// Errors raised while building ledger rows.
#[derive(Debug, Error)]
pub enum LoyaltyError {
    /// The grace or validity window pushed a timestamp out of range.
    #[error("loyalty timestamp out of range")]
    TimestampOutOfRange(#[source] jiff::Error),

    /// Redemptions must consume at least one point.
    #[error("nothing to redeem")]
    NothingToRedeem,
}

/// A row of the points ledger, tied to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyTransaction {
    /// Order that produced the row.
    pub order_id: OrderId,

    /// Owner of the points.
    pub user_id: UserId,

    /// Points earned.
    pub points_received: Option<u64>,

    /// Points spent.
    pub points_redeemed: Option<u64>,

    /// Order amount the points were earned on, in minor units.
    pub amount_received: Option<u64>,

    /// Discount the spent points paid for, in minor units.
    pub amount_redeemed: Option<u64>,

    /// When the row takes effect; earn rows are dated after the grace period.
    pub created_at: Timestamp,

    /// When earned points lapse.
    pub expiry_date: Option<Timestamp>,
}

impl LoyaltyTransaction {
    /// Earn row for an order paid at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::TimestampOutOfRange`] when the deferred dates
    /// cannot be represented.
    pub fn earn(
        order_id: OrderId,
        user_id: UserId,
        order_total: u64,
        now: Timestamp,
    ) -> Result<Self, LoyaltyError> {
        let created_at = now
            .checked_add(GRACE_PERIOD)
            .map_err(LoyaltyError::TimestampOutOfRange)?;

        let expiry_date = created_at
            .checked_add(VALIDITY)
            .map_err(LoyaltyError::TimestampOutOfRange)?;

        Ok(Self {
            order_id,
            user_id,
            points_received: Some(points_for_total(order_total)),
            points_redeemed: None,
            amount_received: Some(order_total),
            amount_redeemed: None,
            created_at,
            expiry_date: Some(expiry_date),
        })
    }

    /// Redemption row spending `points` on an order at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::NothingToRedeem`] when `points` is zero.
    pub fn redeem(
        order_id: OrderId,
        user_id: UserId,
        points: u64,
        now: Timestamp,
    ) -> Result<Self, LoyaltyError> {
        if points == 0 {
            return Err(LoyaltyError::NothingToRedeem);
        }

        Ok(Self {
            order_id,
            user_id,
            points_received: None,
            points_redeemed: Some(points),
            amount_received: None,
            amount_redeemed: Some(discount_for_points(points)),
            created_at: now,
            expiry_date: None,
        })
    }

    /// Whether the earned points on this row have lapsed at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry <= now)
    }

    /// Whether the earned points on this row are still inside the grace window.
    pub fn is_pending(&self, now: Timestamp) -> bool {
        self.points_received.is_some() && self.created_at > now
    }

    fn received(&self) -> u64 {
        self.points_received.unwrap_or_default()
    }

    fn redeemed(&self) -> u64 {
        self.points_redeemed.unwrap_or_default()
    }
}

/// Points earned on an order total: ten per full ₹100.
pub const fn points_for_total(order_total: u64) -> u64 {
    (whole_major_units(order_total) / EARN_STEP_MAJOR).saturating_mul(POINTS_PER_EARN_STEP)
}

/// Points consumed by a discount: five per rupee, partial rupees rounded down.
pub const fn points_to_deduct(discount: u64) -> u64 {
    discount.saturating_mul(POINTS_PER_MAJOR_REDEEMED) / MINOR_PER_MAJOR
}

/// Discount, in minor units, paid for by `points`.
pub const fn discount_for_points(points: u64) -> u64 {
    points.saturating_mul(MINOR_PER_MAJOR) / POINTS_PER_MAJOR_REDEEMED
}

fn to_signed(points: u64) -> i64 {
    i64::try_from(points).unwrap_or(i64::MAX)
}

/// Points balance at `now`: unexpired earnings minus all redemptions.
pub fn balance(transactions: &[LoyaltyTransaction], now: Timestamp) -> i64 {
    transactions.iter().fold(0_i64, |total, transaction| {
        let received = if transaction.is_expired(now) {
            0
        } else {
            transaction.received()
        };

        total
            .saturating_add(to_signed(received))
            .saturating_sub(to_signed(transaction.redeemed()))
    })
}

/// Balance that can be redeemed at `now`, excluding points still in their
/// grace window.
pub fn spendable_balance(transactions: &[LoyaltyTransaction], now: Timestamp) -> i64 {
    balance(transactions, now).saturating_sub(to_signed(pending_points(transactions, now)))
}

/// Points earned but not yet spendable at `now`.
pub fn pending_points(transactions: &[LoyaltyTransaction], now: Timestamp) -> u64 {
    transactions
        .iter()
        .filter(|transaction| transaction.is_pending(now) && !transaction.is_expired(now))
        .map(LoyaltyTransaction::received)
        .fold(0, u64::saturating_add)
}

/// Kind of a displayed ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEntryKind {
    /// Points earned on an order.
    Earned,

    /// Points spent on an order.
    Redeemed,

    /// Synthetic row cancelling lapsed earnings.
    Expired,
}

/// A ledger row for display, with a signed points delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Order the row belongs to.
    pub order_id: OrderId,

    /// Row kind.
    pub kind: LedgerEntryKind,

    /// Signed points delta.
    pub points: i64,

    /// When the row took effect.
    pub at: Timestamp,
}

/// Display rows for the ledger at `now`, oldest first.
///
/// Every lapsed earning is followed by a synthetic [`LedgerEntryKind::Expired`]
/// row negating it, dated at its expiry.
pub fn ledger_entries(transactions: &[LoyaltyTransaction], now: Timestamp) -> Vec<LedgerEntry> {
    let mut entries = Vec::with_capacity(transactions.len());

    for transaction in transactions {
        if let Some(points) = transaction.points_received {
            entries.push(LedgerEntry {
                order_id: transaction.order_id,
                kind: LedgerEntryKind::Earned,
                points: to_signed(points),
                at: transaction.created_at,
            });

            if let Some(expiry) = transaction.expiry_date
                && expiry <= now
            {
                entries.push(LedgerEntry {
                    order_id: transaction.order_id,
                    kind: LedgerEntryKind::Expired,
                    points: to_signed(points).saturating_neg(),
                    at: expiry,
                });
            }
        }

        if let Some(points) = transaction.points_redeemed {
            entries.push(LedgerEntry {
                order_id: transaction.order_id,
                kind: LedgerEntryKind::Redeemed,
                points: to_signed(points).saturating_neg(),
                at: transaction.created_at,
            });
        }
    }

    entries.sort_by_key(|entry| entry.at);

    entries
}
