//! Cart Session
//!
//! Ties the local cart store to the sync scheduler and follows the user
//! through sign-in and sign-out. Guests only ever touch the cache; signed-in
//! users also get their edits pushed to the remote store.

use std::sync::Arc;

use storefront::{
    cart::{CartError, CartLine, CartSnapshot, LineKey},
    ids::UserId,
    reconcile::merge,
};
use tokio::sync::watch;
use tracing::info;

use crate::{
    cache::PersistentCache,
    config::sync::SyncConfig,
    domain::carts::{
        store::{CartState, LocalCartStore},
        sync::SyncScheduler,
    },
    remote::RemoteStore,
};

/// The cart of one client session.
#[derive(Debug, Clone)]
pub struct CartSession {
    store: Arc<LocalCartStore>,
    sync: SyncScheduler,
}

impl CartSession {
    /// Session over `cache` syncing with `remote`.
    pub fn new(
        cache: Arc<dyn PersistentCache>,
        remote: Arc<dyn RemoteStore>,
        config: SyncConfig,
    ) -> Self {
        let store = Arc::new(LocalCartStore::new(cache));
        let sync = SyncScheduler::new(store.clone(), remote, config);

        Self { store, sync }
    }

    /// The backing store.
    pub fn store(&self) -> &LocalCartStore {
        &self.store
    }

    /// Receive every cart state change.
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.store.subscribe()
    }

    /// Current cart contents.
    pub fn snapshot(&self) -> CartSnapshot {
        self.store.snapshot()
    }

    /// Signed-in user, if any.
    pub fn user(&self) -> Option<UserId> {
        self.store.user()
    }

    /// Restore the cached cart of `user` and, when signed in, reconcile it
    /// with the remote copy.
    #[tracing::instrument(name = "carts.session.start", skip(self), fields(user_id = ?user))]
    pub fn start(&self, user: Option<UserId>) -> CartSnapshot {
        let snapshot = self.store.hydrate(user);

        if let Some(user) = user {
            self.sync.schedule_load(user);
        }

        snapshot
    }

    /// Sign `user` in, carrying the guest cart over.
    ///
    /// Guest lines are merged under the user's cached cart; the user's own
    /// lines win on key collisions. The guest entry is removed afterwards.
    #[tracing::instrument(name = "carts.session.login", skip(self), fields(user_id = %user))]
    pub fn login(&self, user: UserId) -> CartSnapshot {
        self.sync.cancel_all();

        let guest = if self.store.user().is_none() {
            self.store.snapshot()
        } else {
            self.store.read_cached(None)
        };

        let cached = self.store.read_cached(Some(user));
        let merged = merge(&guest, &cached);

        let snapshot = self.store.switch_user(Some(user), merged);

        self.store.remove_cached(None);
        self.sync.schedule_load(user);

        info!(lines = snapshot.len(), "signed in");

        snapshot
    }

    /// Sign out: pending sync is cancelled and the user's cart dropped.
    #[tracing::instrument(name = "carts.session.logout", skip(self))]
    pub fn logout(&self) {
        self.sync.cancel_all();
        self.store.discard(None);

        info!("signed out");
    }

    /// The remote store rejected the session; treated like a sign-out.
    #[tracing::instrument(name = "carts.session.expired", skip(self))]
    pub fn session_expired(&self) {
        self.sync.cancel_all();
        self.store.discard(None);

        info!("session expired; cart reset");
    }

    /// Add a line, summing quantities with an existing line of the same key.
    ///
    /// # Errors
    ///
    /// Returns [`CartError`] when the line is empty or the quantity overflows.
    pub fn add_line(&self, line: CartLine) -> Result<CartSnapshot, CartError> {
        let snapshot = self.store.add_line(line)?;

        self.push(&snapshot);

        Ok(snapshot)
    }

    /// Set a line's quantity; zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::LineNotFound`] when no line has the key.
    pub fn update_quantity(&self, key: &LineKey, quantity: u32) -> Result<CartSnapshot, CartError> {
        let snapshot = self.store.update_quantity(key, quantity)?;

        self.push(&snapshot);

        Ok(snapshot)
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::LineNotFound`] when no line has the key.
    pub fn remove_line(&self, key: &LineKey) -> Result<CartSnapshot, CartError> {
        let snapshot = self.store.remove_line(key)?;

        self.push(&snapshot);

        Ok(snapshot)
    }

    /// Empty the cart.
    pub fn clear(&self) -> CartSnapshot {
        let snapshot = self.store.clear();

        self.push(&snapshot);

        snapshot
    }

    /// Wait for scheduled sync work to finish.
    pub async fn settle(&self) {
        self.sync.settle().await;
    }

    fn push(&self, snapshot: &CartSnapshot) {
        let Some(user) = self.store.user() else {
            return;
        };

        // A quota reset left only part of the cart; pushing it would wipe the
        // remote copy, so merge with it first.
        if self.store.reload_required() {
            self.sync.schedule_load(user);
        } else {
            self.sync.schedule_save(user, snapshot.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use storefront::{cart::LineKey, ids::ProductId};
    use testresult::TestResult;

    use crate::{
        cache::{CacheError, MemoryCache, MockPersistentCache, cart_key, read_json, write_json},
        remote::{InMemoryRemoteStore, RemoteOperation},
        test::helpers::cart_line,
    };

    use super::*;

    fn session() -> (CartSession, Arc<MemoryCache>, Arc<InMemoryRemoteStore>) {
        let cache = Arc::new(MemoryCache::new());
        let remote = Arc::new(InMemoryRemoteStore::new());

        let session = CartSession::new(cache.clone(), remote.clone(), SyncConfig::default());

        (session, cache, remote)
    }

    #[tokio::test(start_paused = true)]
    async fn guest_edits_stay_local() -> TestResult {
        let (session, cache, remote) = session();

        session.add_line(cart_line(ProductId::new(), "M", 1))?;
        session.settle().await;

        let cached: Option<CartSnapshot> = read_json(cache.as_ref(), &cart_key(None))?;

        assert_eq!(cached.map(|cart| cart.len()), Some(1));
        assert_eq!(remote.calls(RemoteOperation::FetchCart), 0);
        assert_eq!(remote.calls(RemoteOperation::UpsertCart), 0);

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn login_carries_the_guest_cart_over() -> TestResult {
        let (session, cache, remote) = session();
        let user = UserId::new();
        let shared = ProductId::new();
        let guest_only = ProductId::new();

        write_json(
            cache.as_ref(),
            &cart_key(Some(user)),
            &CartSnapshot::from(vec![cart_line(shared, "M", 4)]),
        )?;

        session.add_line(cart_line(shared, "M", 1))?;
        session.add_line(cart_line(guest_only, "S", 2))?;

        let snapshot = session.login(user);

        assert_eq!(
            snapshot
                .get(&LineKey::sized(shared, "M"))
                .map(|line| line.quantity),
            Some(4)
        );
        assert!(snapshot.contains(&LineKey::sized(guest_only, "S")));
        assert_eq!(cache.get(&cart_key(None))?, None);

        session.settle().await;

        assert_eq!(remote.cart(user), Some(session.snapshot()));

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn signed_in_edits_are_pushed() -> TestResult {
        let (session, _cache, remote) = session();
        let user = UserId::new();
        let product = ProductId::new();

        session.start(Some(user));
        session.settle().await;

        session.add_line(cart_line(product, "M", 1))?;
        session.update_quantity(&LineKey::sized(product, "M"), 3)?;
        session.settle().await;

        assert_eq!(remote.calls(RemoteOperation::UpsertCart), 1);
        assert_eq!(
            remote
                .cart(user)
                .and_then(|cart| cart.get(&LineKey::sized(product, "M")).map(|l| l.quantity)),
            Some(3)
        );

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn quota_resets_do_not_overwrite_the_remote_cart() -> TestResult {
        let mut cache = MockPersistentCache::new();
        cache.expect_get().returning(|_| Ok(None));
        cache
            .expect_set()
            .returning(|_, _| Err(CacheError::QuotaExceeded));
        cache.expect_remove().returning(|_| Ok(()));

        let remote = Arc::new(InMemoryRemoteStore::new());
        let session = CartSession::new(Arc::new(cache), remote.clone(), SyncConfig::default());
        let user = UserId::new();

        let stored = CartSnapshot::from(vec![
            cart_line(ProductId::new(), "M", 1),
            cart_line(ProductId::new(), "L", 2),
        ]);
        remote.seed_cart(user, stored.clone());

        session.start(Some(user));
        session.settle().await;

        session.add_line(cart_line(ProductId::new(), "S", 1))?;
        session.settle().await;

        assert_eq!(remote.cart(user), Some(stored));
        assert_eq!(remote.calls(RemoteOperation::UpsertCart), 0);
        assert!(
            session
                .store()
                .sync_error()
                .is_some_and(|message| message.contains("quota")),
            "expected a quota message, got {:?}",
            session.store().sync_error()
        );

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn logout_drops_the_users_cart() -> TestResult {
        let (session, cache, remote) = session();
        let user = UserId::new();

        session.start(Some(user));
        session.add_line(cart_line(ProductId::new(), "M", 1))?;
        session.logout();
        session.settle().await;

        assert_eq!(session.user(), None);
        assert!(session.snapshot().is_empty());
        assert_eq!(cache.get(&cart_key(Some(user)))?, None);
        assert_eq!(remote.calls(RemoteOperation::UpsertCart), 0);

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn start_restores_and_reconciles() -> TestResult {
        let (session, cache, remote) = session();
        let user = UserId::new();
        let cached = ProductId::new();
        let stored = ProductId::new();

        write_json(
            cache.as_ref(),
            &cart_key(Some(user)),
            &CartSnapshot::from(vec![cart_line(cached, "S", 1)]),
        )?;
        remote.seed_cart(user, CartSnapshot::from(vec![cart_line(stored, "L", 1)]));

        let restored = session.start(Some(user));

        assert_eq!(restored.len(), 1);

        session.settle().await;

        assert_eq!(session.snapshot().len(), 2);
        assert_eq!(remote.cart(user), Some(session.snapshot()));

        Ok(())
    }
}
