//! Commit State

use std::{fmt, sync::Arc};

use serde::Serialize;
use storefront::{ids::OrderId, orders::Order};

/// Non-terminal stages of an order commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStage {
    /// Validating and pricing the draft.
    Submitting,

    /// Waiting on the fulfillment API.
    AwaitingFulfillment,

    /// Writing the order row.
    Persisting,

    /// Recording promo usage, points and stock.
    ApplyingLedgers,
}

impl CommitStage {
    /// Stable name used in logs and serialized state.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submitting => "submitting",
            Self::AwaitingFulfillment => "awaiting_fulfillment",
            Self::Persisting => "persisting",
            Self::ApplyingLedgers => "applying_ledgers",
        }
    }
}

impl fmt::Display for CommitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable state of the order commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
///
/// Every in-flight state carries the order id being committed, so a second
/// caller can tell a retry of the same checkout from a different one.
pub enum CommitState {
    /// Nothing in flight.
    #[default]
    Idle,

    /// The draft is being validated and priced.
    Submitting {
        /// Order being committed.
        order_id: OrderId,
    },

    /// The shipment is being booked.
    AwaitingFulfillment {
        /// Order being committed.
        order_id: OrderId,
    },

    /// The order row is being written.
    Persisting {
        /// Order being committed.
        order_id: OrderId,
    },

    /// Ledger side effects are being applied.
    ApplyingLedgers {
        /// Order being committed.
        order_id: OrderId,
    },

    /// The order exists.
    Committed {
        /// The persisted order.
        order: Arc<Order>,

        /// Whether an earlier attempt had already placed it.
        replayed: bool,
    },

    /// The commit stopped at `stage`.
    Errored {
        /// Stage that failed.
        stage: CommitStage,

        /// Order the failed commit was for, when known.
        order_id: Option<OrderId>,

        /// Failure description.
        message: String,
    },
}

impl CommitState {
    /// Stage of an in-flight commit.
    pub const fn stage(&self) -> Option<CommitStage> {
        match self {
            Self::Submitting { .. } => Some(CommitStage::Submitting),
            Self::AwaitingFulfillment { .. } => Some(CommitStage::AwaitingFulfillment),
            Self::Persisting { .. } => Some(CommitStage::Persisting),
            Self::ApplyingLedgers { .. } => Some(CommitStage::ApplyingLedgers),
            Self::Idle | Self::Committed { .. } | Self::Errored { .. } => None,
        }
    }

    /// Whether a commit is running.
    pub const fn is_in_flight(&self) -> bool {
        self.stage().is_some()
    }

    /// Whether the last commit has finished, successfully or not.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed { .. } | Self::Errored { .. })
    }

    /// Order of the current or last commit.
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            Self::Submitting { order_id }
            | Self::AwaitingFulfillment { order_id }
            | Self::Persisting { order_id }
            | Self::ApplyingLedgers { order_id } => Some(*order_id),
            Self::Committed { order, .. } => Some(order.order_id),
            Self::Errored { order_id, .. } => *order_id,
            Self::Idle => None,
        }
    }
}

/// Successful end of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// This call created the order.
    Committed(Arc<Order>),

    /// The order already existed; nothing was written again.
    Replayed(Arc<Order>),
}

impl CommitOutcome {
    /// The committed order.
    pub fn order(&self) -> &Order {
        match self {
            Self::Committed(order) | Self::Replayed(order) => order,
        }
    }

    /// Whether the order had been placed by an earlier attempt.
    pub const fn is_replay(&self) -> bool {
        matches!(self, Self::Replayed(_))
    }
}
