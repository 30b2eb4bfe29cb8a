//! Order Commit Coordinator
//!
//! Drives a checkout draft through fulfillment, order persistence and the
//! ledger side effects. Persistence is the point of no return: once the order
//! row exists the commit is never rolled back, and failed ledger steps are
//! reported for manual reconciliation instead.
//!
//! The pipeline runs on its own task, so a caller that stops waiting does not
//! leave a half-applied order behind. At most one commit runs at a time. A
//! second call for the same order id waits for the running one and reports
//! its result; a call for any other order is refused.

use std::{sync::Arc, time::Duration};

use jiff::Timestamp;
use serde_json::json;
use storefront::{
    cart::CartSnapshot,
    ids::OrderId,
    loyalty::{discount_for_points, points_to_deduct},
    orders::{
        DisplayOrderId, Order, OrderLine, OrderStatus, OrderTotals, PaymentMethod,
        ShippingOption, ShippingStatus,
    },
};
use tokio::{sync::watch, time::timeout};
use tracing::{error, info, warn};

use crate::{
    cache::PersistentCache,
    domain::{
        carts::CartSession,
        checkout::{
            CheckoutDraft, CheckoutError, CheckoutQuote, CheckoutValidationError, CommitOutcome,
            CommitStage, CommitState, LedgerApplicationError, LedgerFailure, LedgerStep,
        },
        loyalty::LoyaltyLedger,
        promotions::PromoLedger,
        stock::StockDecrementer,
    },
    fulfillment::{FulfillmentClient, FulfillmentError, ShipmentRequest},
    remote::{RemoteError, RemoteStore},
};

/// Collaborators of the coordinator.
#[derive(Clone)]
pub struct CommitDependencies {
    /// Backend of record for orders.
    pub remote: Arc<dyn RemoteStore>,

    /// Shipment booking.
    pub fulfillment: Arc<dyn FulfillmentClient>,

    /// Promo code validation and usage.
    pub promos: Arc<dyn PromoLedger>,

    /// Points balance and ledger rows.
    pub loyalty: Arc<dyn LoyaltyLedger>,

    /// Per-size stock.
    pub stock: Arc<dyn StockDecrementer>,

    /// Where checkout drafts are staged.
    pub cache: Arc<dyn PersistentCache>,
}

impl std::fmt::Debug for CommitDependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitDependencies").finish_non_exhaustive()
    }
}

struct Inner {
    deps: CommitDependencies,
    session: CartSession,
    fulfillment_timeout: Duration,
    state: watch::Sender<CommitState>,
}

/// Commits checkout drafts as orders, exactly once per order id.
#[derive(Clone)]
pub struct OrderCommitCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for OrderCommitCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderCommitCoordinator")
            .field("state", &*self.inner.state.borrow())
            .field("fulfillment_timeout", &self.inner.fulfillment_timeout)
            .finish_non_exhaustive()
    }
}

enum Prepared {
    Replay(Order),
    Fresh(Order, ShippingOption),
}

impl OrderCommitCoordinator {
    /// Coordinator committing drafts for the user signed in to `session`.
    pub fn new(
        deps: CommitDependencies,
        session: CartSession,
        fulfillment_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(CommitState::Idle);

        Self {
            inner: Arc::new(Inner {
                deps,
                session,
                fulfillment_timeout,
                state,
            }),
        }
    }

    /// Receive every commit state change.
    pub fn subscribe(&self) -> watch::Receiver<CommitState> {
        self.inner.state.subscribe()
    }

    /// Current commit state.
    pub fn state(&self) -> CommitState {
        self.inner.state.borrow().clone()
    }

    /// Return to [`CommitState::Idle`] after a terminal state. Ignored while a
    /// commit is in flight.
    pub fn reset(&self) {
        self.inner.state.send_if_modified(|state| {
            if state.is_in_flight() || *state == CommitState::Idle {
                return false;
            }

            *state = CommitState::Idle;

            true
        });
    }

    /// Price the draft against the current cart without writing anything.
    ///
    /// # Errors
    ///
    /// Returns validation, promo or points errors that would stop a commit.
    pub async fn quote(
        &self,
        draft: &CheckoutDraft,
        now: Timestamp,
    ) -> Result<CheckoutQuote, CheckoutError> {
        let cart = self.inner.session.snapshot();
        let ready = draft.validate(&cart)?;

        self.inner.price(draft, &cart, ready.shipping, now).await
    }

    /// Commit `draft` as an order.
    ///
    /// Committing a draft whose order already exists is a replay, not an
    /// error; nothing is written twice.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::LedgerApplication`] when the order was placed
    /// but ledger steps failed, and other variants when no order was placed.
    pub async fn commit(
        &self,
        draft: CheckoutDraft,
        now: Timestamp,
    ) -> Result<CommitOutcome, CheckoutError> {
        let mut in_flight = None;

        let claimed = self.inner.state.send_if_modified(|state| {
            if state.is_in_flight() {
                in_flight = state.order_id();
                return false;
            }

            *state = CommitState::Submitting {
                order_id: draft.order_id,
            };

            true
        });

        if !claimed {
            if let Some(in_flight) = in_flight.filter(|id| *id != draft.order_id) {
                warn!(order_id = %draft.order_id, %in_flight, "another order is being committed");

                return Err(CheckoutError::CommitInFlight { in_flight });
            }

            info!(order_id = %draft.order_id, "commit already in flight; waiting for it");

            return self.wait_for_in_flight(draft.order_id).await;
        }

        let inner = self.inner.clone();

        let task = tokio::spawn(async move {
            let result = inner.run(draft, now).await;

            inner.finish(&result);

            result
        });

        match task.await {
            Ok(result) => result,
            Err(join_error) => {
                error!(%join_error, "checkout task aborted");

                self.inner.state.send_modify(|state| {
                    *state = CommitState::Errored {
                        stage: state.stage().unwrap_or(CommitStage::Submitting),
                        order_id: state.order_id(),
                        message: join_error.to_string(),
                    };
                });

                Err(CheckoutError::Aborted)
            }
        }
    }

    async fn wait_for_in_flight(&self, order_id: OrderId) -> Result<CommitOutcome, CheckoutError> {
        let mut states = self.subscribe();

        let terminal = match states.wait_for(CommitState::is_terminal).await {
            Ok(state) => state.clone(),
            Err(error) => {
                warn!(%error, "commit state channel closed");

                return Err(CheckoutError::Aborted);
            }
        };

        match terminal {
            CommitState::Committed { order, .. } if order.order_id == order_id => {
                Ok(CommitOutcome::Replayed(order))
            }
            CommitState::Errored { stage, message, .. } => {
                Err(CheckoutError::Failed { stage, message })
            }
            CommitState::Committed { order, .. } => Err(CheckoutError::CommitInFlight {
                in_flight: order.order_id,
            }),
            _ => Err(CheckoutError::Aborted),
        }
    }
}

impl Inner {
    fn enter(&self, state: CommitState) {
        self.state.send_replace(state);
    }

    #[tracing::instrument(
        name = "checkout.coordinator.commit",
        skip(self, draft),
        fields(order_id = %draft.order_id, user_id = %draft.user_id),
        err
    )]
    async fn run(&self, draft: CheckoutDraft, now: Timestamp) -> Result<CommitOutcome, CheckoutError> {
        let (mut order, shipping) = match self.prepare(&draft, now).await? {
            Prepared::Replay(order) => {
                info!(display_order_id = %order.display_order_id, "order already committed");

                self.clear_checkout(&draft);

                return Ok(CommitOutcome::Replayed(Arc::new(order)));
            }
            Prepared::Fresh(order, shipping) => (order, shipping),
        };

        self.enter(CommitState::AwaitingFulfillment {
            order_id: order.order_id,
        });

        let (shipping_status, shipping_details) = self.book_shipment(&order, &shipping).await;

        order.shipping_status = shipping_status;
        order.shipping_details = shipping_details;

        self.enter(CommitState::Persisting {
            order_id: order.order_id,
        });

        let order = match self.deps.remote.insert_order(order).await {
            Ok(order) => order,
            Err(RemoteError::AlreadyExists) => {
                let existing = self.deps.remote.fetch_order(draft.order_id).await?;

                info!(display_order_id = %existing.display_order_id, "order already committed");

                self.clear_checkout(&draft);

                return Ok(CommitOutcome::Replayed(Arc::new(existing)));
            }
            Err(error) => return Err(error.into()),
        };

        info!(summary = %order.summary(), "order placed");

        self.enter(CommitState::ApplyingLedgers {
            order_id: order.order_id,
        });

        let failures = self.apply_ledgers(&order, now).await;

        self.clear_checkout(&draft);

        if failures.is_empty() {
            Ok(CommitOutcome::Committed(Arc::new(order)))
        } else {
            Err(LedgerApplicationError {
                order_id: order.order_id,
                failures,
            }
            .into())
        }
    }

    fn finish(&self, result: &Result<CommitOutcome, CheckoutError>) {
        self.state.send_modify(|state| {
            *state = match result {
                Ok(CommitOutcome::Committed(order)) => CommitState::Committed {
                    order: order.clone(),
                    replayed: false,
                },
                Ok(CommitOutcome::Replayed(order)) => CommitState::Committed {
                    order: order.clone(),
                    replayed: true,
                },
                Err(error) => CommitState::Errored {
                    stage: state.stage().unwrap_or(CommitStage::Submitting),
                    order_id: state.order_id(),
                    message: error.to_string(),
                },
            };
        });
    }

    async fn prepare(&self, draft: &CheckoutDraft, now: Timestamp) -> Result<Prepared, CheckoutError> {
        if self.session.user() != Some(draft.user_id) {
            return Err(CheckoutValidationError::NotSignedIn.into());
        }

        match self.deps.remote.fetch_order(draft.order_id).await {
            Ok(order) if order.user_id == draft.user_id => return Ok(Prepared::Replay(order)),
            Ok(_) => return Err(RemoteError::AlreadyExists.into()),
            Err(RemoteError::NotFound) => {}
            Err(error) => return Err(error.into()),
        }

        let cart = self.session.snapshot();
        let ready = draft.validate(&cart)?;

        let quote = self.price(draft, &cart, ready.shipping, now).await?;

        let items = cart
            .lines()
            .iter()
            .map(OrderLine::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let order = Order {
            order_id: draft.order_id,
            display_order_id: DisplayOrderId::generate(draft.order_id, now),
            user_id: draft.user_id,
            items,
            totals: quote.totals,
            promo_code_id: quote.promo.map(|promo| promo.promo_code_id),
            points_redeemed: quote.points_redeemed,
            payment_method: ready.payment_method.clone(),
            status: OrderStatus::for_payment(ready.payment_method),
            shipping_status: ShippingStatus::Processing,
            address: ready.address.clone(),
            shipping_details: serde_json::Value::Null,
            created_at: now,
        };

        Ok(Prepared::Fresh(order, ready.shipping.clone()))
    }

    async fn price(
        &self,
        draft: &CheckoutDraft,
        cart: &CartSnapshot,
        shipping: &ShippingOption,
        now: Timestamp,
    ) -> Result<CheckoutQuote, CheckoutError> {
        let promo = match &draft.promo_code {
            Some(code) => Some(
                self.deps
                    .promos
                    .validate(code.clone(), draft.user_id, cart.clone())
                    .await?,
            ),
            None => None,
        };

        if draft.points_to_redeem > 0 {
            let balance = self.deps.loyalty.balance(draft.user_id, now).await?;

            if !balance.covers(draft.points_to_redeem) {
                return Err(CheckoutValidationError::InsufficientPoints {
                    requested: draft.points_to_redeem,
                    available: balance.spendable,
                }
                .into());
            }
        }

        let promo_discount = promo.as_ref().map_or(0, |promo| promo.discount_amount);

        let capped = OrderTotals::compute(
            cart,
            promo_discount,
            discount_for_points(draft.points_to_redeem),
            shipping.rate,
        )?;

        // Only whole points are spent, so the discount is what those points buy.
        let points_redeemed = points_to_deduct(capped.points_discount);

        let totals = OrderTotals::compute(
            cart,
            promo_discount,
            discount_for_points(points_redeemed),
            shipping.rate,
        )?;

        Ok(CheckoutQuote {
            promo,
            points_redeemed,
            totals,
        })
    }

    /// Book the shipment, falling back to a degraded payload on failure.
    async fn book_shipment(
        &self,
        order: &Order,
        shipping: &ShippingOption,
    ) -> (ShippingStatus, serde_json::Value) {
        let collectable_amount = match order.payment_method {
            PaymentMethod::CashOnDelivery => order.totals.total,
            PaymentMethod::Online { .. } => 0,
        };

        let request = ShipmentRequest {
            order_id: order.order_id,
            display_order_id: order.display_order_id.clone(),
            courier_id: shipping.courier_id.clone(),
            address: order.address.clone(),
            items: order.items.clone(),
            collectable_amount,
            total: order.totals.total,
        };

        let result = timeout(
            self.fulfillment_timeout,
            self.deps.fulfillment.create_shipment(request),
        )
        .await
        .unwrap_or(Err(FulfillmentError::Timeout(self.fulfillment_timeout)));

        match result.map(|receipt| serde_json::to_value(&receipt)) {
            Ok(Ok(details)) => (ShippingStatus::Processing, details),
            Ok(Err(error)) => {
                warn!(%error, "failed to record shipment receipt");

                (ShippingStatus::Processing, json!({ "error": error.to_string() }))
            }
            Err(error) => {
                warn!(order_id = %order.order_id, %error, "fulfillment failed; persisting order without shipment");

                (
                    ShippingStatus::AwaitingFulfillment,
                    json!({ "error": error.to_string() }),
                )
            }
        }
    }

    /// Apply every ledger step, collecting failures rather than stopping.
    async fn apply_ledgers(&self, order: &Order, now: Timestamp) -> Vec<LedgerFailure> {
        let mut failures = Vec::new();

        let mut record = |step: LedgerStep, message: String| {
            error!(
                order_id = %order.order_id,
                display_order_id = %order.display_order_id,
                stage = %CommitStage::ApplyingLedgers,
                %step,
                error = %message,
                "ledger step failed; order needs manual reconciliation"
            );

            failures.push(LedgerFailure { step, message });
        };

        if let Some(promo) = order.promo_code_id
            && let Err(error) = self.deps.promos.commit_usage(promo, order.user_id).await
        {
            record(LedgerStep::PromoUsage, error.to_string());
        }

        if let Err(error) = self.deps.loyalty.record_earn(order.clone(), now).await {
            record(LedgerStep::PointsEarned, error.to_string());
        }

        if order.points_redeemed > 0
            && let Err(error) = self
                .deps
                .loyalty
                .record_redeem(order.order_id, order.user_id, order.points_redeemed, now)
                .await
        {
            record(LedgerStep::PointsRedeemed, error.to_string());
        }

        for (line, size) in order.sized_lines() {
            if let Err(error) = self
                .deps
                .stock
                .decrement(line.product_id, size.to_string(), line.quantity)
                .await
            {
                record(
                    LedgerStep::Stock {
                        product_id: line.product_id,
                        size: size.to_string(),
                    },
                    error.to_string(),
                );
            }
        }

        failures
    }

    fn clear_checkout(&self, draft: &CheckoutDraft) {
        self.session.clear();

        if let Err(error) = CheckoutDraft::clear(self.deps.cache.as_ref(), draft.user_id) {
            warn!(%error, "failed to clear checkout draft");
        }
    }
}
