//! Loyalty Ledger
//!
//! Appends earn and redeem rows to the remote points log and derives balances
//! from it. Rows are never updated or deleted.

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use serde::Serialize;
use storefront::{
    ids::{OrderId, UserId},
    loyalty::{self, LoyaltyTransaction},
    orders::Order,
};
use tracing::info;

use crate::{domain::loyalty::LoyaltyLedgerError, remote::RemoteStore};

/// A user's points at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PointsBalance {
    /// Unexpired earnings minus redemptions.
    pub balance: i64,

    /// Part of the balance that may be redeemed now.
    pub spendable: i64,

    /// Points earned but still inside their grace window.
    pub pending: u64,
}

impl PointsBalance {
    /// Balance derived from a user's transactions at `now`.
    pub fn at(transactions: &[LoyaltyTransaction], now: Timestamp) -> Self {
        Self {
            balance: loyalty::balance(transactions, now),
            spendable: loyalty::spendable_balance(transactions, now),
            pending: loyalty::pending_points(transactions, now),
        }
    }

    /// Whether `points` can be redeemed.
    pub fn covers(&self, points: u64) -> bool {
        i64::try_from(points).is_ok_and(|points| points <= self.spendable)
    }
}

/// The loyalty points ledger.
#[automock]
#[async_trait]
pub trait LoyaltyLedger: Send + Sync {
    /// Every transaction of `user`, oldest first.
    async fn transactions(&self, user: UserId)
    -> Result<Vec<LoyaltyTransaction>, LoyaltyLedgerError>;

    /// Balance of `user` at `now`.
    async fn balance(&self, user: UserId, now: Timestamp)
    -> Result<PointsBalance, LoyaltyLedgerError>;

    /// Record points earned on a committed order.
    async fn record_earn(
        &self,
        order: Order,
        now: Timestamp,
    ) -> Result<LoyaltyTransaction, LoyaltyLedgerError>;

    /// Record points spent on a committed order.
    async fn record_redeem(
        &self,
        order: OrderId,
        user: UserId,
        points: u64,
        now: Timestamp,
    ) -> Result<LoyaltyTransaction, LoyaltyLedgerError>;
}

/// [`LoyaltyLedger`] over the remote store.
#[derive(Clone)]
pub struct RemoteLoyaltyLedger {
    remote: Arc<dyn RemoteStore>,
}

impl std::fmt::Debug for RemoteLoyaltyLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteLoyaltyLedger").finish_non_exhaustive()
    }
}

impl RemoteLoyaltyLedger {
    /// Ledger over `remote`.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl LoyaltyLedger for RemoteLoyaltyLedger {
    async fn transactions(
        &self,
        user: UserId,
    ) -> Result<Vec<LoyaltyTransaction>, LoyaltyLedgerError> {
        Ok(self.remote.list_loyalty_transactions(user).await?)
    }

    #[tracing::instrument(name = "loyalty.ledger.balance", skip(self), fields(user_id = %user), err)]
    async fn balance(
        &self,
        user: UserId,
        now: Timestamp,
    ) -> Result<PointsBalance, LoyaltyLedgerError> {
        let transactions = self.transactions(user).await?;

        Ok(PointsBalance::at(&transactions, now))
    }

    #[tracing::instrument(
        name = "loyalty.ledger.record_earn",
        skip(self, order),
        fields(order_id = %order.order_id, user_id = %order.user_id, total = order.totals.total),
        err
    )]
    async fn record_earn(
        &self,
        order: Order,
        now: Timestamp,
    ) -> Result<LoyaltyTransaction, LoyaltyLedgerError> {
        let earn =
            LoyaltyTransaction::earn(order.order_id, order.user_id, order.totals.total, now)?;

        self.remote.insert_loyalty_transaction(earn.clone()).await?;

        info!(points = earn.points_received, "recorded points earned");

        Ok(earn)
    }

    #[tracing::instrument(
        name = "loyalty.ledger.record_redeem",
        skip(self),
        fields(order_id = %order, user_id = %user),
        err
    )]
    async fn record_redeem(
        &self,
        order: OrderId,
        user: UserId,
        points: u64,
        now: Timestamp,
    ) -> Result<LoyaltyTransaction, LoyaltyLedgerError> {
        let redeem = LoyaltyTransaction::redeem(order, user, points, now)?;

        self.remote.insert_loyalty_transaction(redeem.clone()).await?;

        info!(points, "recorded points redeemed");

        Ok(redeem)
    }
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;
    use storefront::{
        ids::ProductId,
        loyalty::{GRACE_PERIOD, LoyaltyError},
    };
    use testresult::TestResult;

    use crate::{
        remote::InMemoryRemoteStore,
        test::helpers::{cart_line, now, order_for},
    };

    use super::*;

    #[tokio::test]
    async fn earned_points_are_pending_until_the_grace_period_ends() -> TestResult {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let ledger = RemoteLoyaltyLedger::new(remote.clone());
        let user = UserId::new();
        let now = now();

        let order = order_for(user, vec![cart_line(ProductId::new(), "M", 2)])?;

        let earn = ledger.record_earn(order, now).await?;

        assert_eq!(earn.points_received, Some(100));
        assert_eq!(remote.loyalty_transactions().len(), 1);

        let today = ledger.balance(user, now).await?;

        assert_eq!(
            today,
            PointsBalance {
                balance: 100,
                spendable: 0,
                pending: 100
            }
        );

        let later = ledger
            .balance(user, now.checked_add(GRACE_PERIOD + SignedDuration::from_secs(1))?)
            .await?;

        assert_eq!(later.spendable, 100);
        assert_eq!(later.pending, 0);

        Ok(())
    }

    #[tokio::test]
    async fn redemptions_reduce_the_balance() -> TestResult {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let ledger = RemoteLoyaltyLedger::new(remote.clone());
        let user = UserId::new();
        let now = now();

        remote.seed_loyalty_transaction(LoyaltyTransaction {
            order_id: OrderId::new(),
            user_id: user,
            points_received: Some(500),
            points_redeemed: None,
            amount_received: Some(5_000_00),
            amount_redeemed: None,
            created_at: now.checked_sub(SignedDuration::from_hours(24 * 30))?,
            expiry_date: Some(now.checked_add(SignedDuration::from_hours(24 * 300))?),
        });

        let redeem = ledger.record_redeem(OrderId::new(), user, 200, now).await?;

        assert_eq!(redeem.amount_redeemed, Some(40_00));

        let balance = ledger.balance(user, now).await?;

        assert_eq!(balance.balance, 300);
        assert!(balance.covers(300));
        assert!(!balance.covers(301));

        Ok(())
    }

    #[tokio::test]
    async fn redeeming_zero_points_writes_nothing() {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let ledger = RemoteLoyaltyLedger::new(remote.clone());

        let result = ledger
            .record_redeem(OrderId::new(), UserId::new(), 0, now())
            .await;

        assert!(
            matches!(
                result,
                Err(LoyaltyLedgerError::Loyalty(LoyaltyError::NothingToRedeem))
            ),
            "expected NothingToRedeem, got {result:?}"
        );
        assert!(remote.loyalty_transactions().is_empty());
    }
}
