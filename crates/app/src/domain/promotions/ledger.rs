//! Promo Ledger

use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use storefront::{
    cart::CartSnapshot,
    ids::{PromoCodeId, UserId},
    promotions::{PromoQuote, PromoRejection, PromoUsage, normalize_code},
};
use tracing::info;

use crate::{domain::promotions::PromoError, remote::RemoteStore};

/// Promo code validation and usage accounting.
#[automock]
#[async_trait]
pub trait PromoLedger: Send + Sync {
    /// Check `code` for `user` against `cart` and quote its discount.
    ///
    /// The check is advisory; usage may change before the order commits.
    async fn validate(
        &self,
        code: String,
        user: UserId,
        cart: CartSnapshot,
    ) -> Result<PromoQuote, PromoError>;

    /// Count one committed order against the code's global and per-user usage.
    async fn commit_usage(&self, promo: PromoCodeId, user: UserId) -> Result<PromoUsage, PromoError>;
}

/// [`PromoLedger`] over the remote store.
#[derive(Clone)]
pub struct RemotePromoLedger {
    remote: Arc<dyn RemoteStore>,
}

impl std::fmt::Debug for RemotePromoLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemotePromoLedger").finish_non_exhaustive()
    }
}

impl RemotePromoLedger {
    /// Ledger over `remote`.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl PromoLedger for RemotePromoLedger {
    #[tracing::instrument(
        name = "promotions.ledger.validate",
        skip(self, cart),
        fields(user_id = %user, lines = cart.len()),
        err
    )]
    async fn validate(
        &self,
        code: String,
        user: UserId,
        cart: CartSnapshot,
    ) -> Result<PromoQuote, PromoError> {
        let code = normalize_code(&code);

        if code.is_empty() {
            return Err(PromoRejection::NotFound.into());
        }

        let promo = self.remote.find_promo_code(code).await?;

        let used = self
            .remote
            .fetch_promo_usage(user, promo.id)
            .await?
            .map_or(0, |usage| usage.usage_count);

        let subtotal = cart.subtotal()?;

        Ok(promo.evaluate(used, &cart, subtotal)?)
    }

    #[tracing::instrument(
        name = "promotions.ledger.commit_usage",
        skip(self),
        fields(promo_code_id = %promo, user_id = %user),
        err
    )]
    async fn commit_usage(&self, promo: PromoCodeId, user: UserId) -> Result<PromoUsage, PromoError> {
        let mut code = self.remote.fetch_promo_code(promo).await?;

        let used = code.record_use()?;

        self.remote.update_promo_used(promo, used).await?;

        let usage = match self.remote.fetch_promo_usage(user, promo).await? {
            Some(usage) => usage.incremented(),
            None => PromoUsage::first(user, promo),
        };

        self.remote.upsert_promo_usage(usage).await?;

        info!(used_global = used, usage_count = usage.usage_count, "recorded promo usage");

        Ok(usage)
    }
}
