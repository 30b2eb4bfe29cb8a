//! Cart Sync Scheduler
//!
//! Debounced, cancellable pushes and pulls between the local cart and the
//! remote store. A newly scheduled load or save supersedes the pending one of
//! the same kind, so bursts of cart edits collapse into a single write.
//! Failures are surfaced on the cart state and never retried here; the next
//! user edit schedules the next attempt.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use storefront::{
    cart::CartSnapshot,
    ids::UserId,
    reconcile::{Reconciliation, reconcile},
};
use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{config::sync::SyncConfig, domain::carts::store::LocalCartStore, remote::RemoteStore};

struct Scheduled {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Tasks {
    load: Option<Scheduled>,
    save: Option<Scheduled>,
}

#[derive(Clone, Copy)]
enum Slot {
    Load,
    Save,
}

struct Inner {
    store: Arc<LocalCartStore>,
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
    tasks: Mutex<Tasks>,
}

/// Debounced cart sync between the local store and the remote store.
#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<Inner>,
}

impl fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tasks = self.tasks();

        f.debug_struct("SyncScheduler")
            .field("config", &self.inner.config)
            .field("load_pending", &tasks.load.is_some())
            .field("save_pending", &tasks.save.is_some())
            .finish_non_exhaustive()
    }
}

impl SyncScheduler {
    /// Scheduler syncing `store` with `remote`.
    pub fn new(
        store: Arc<LocalCartStore>,
        remote: Arc<dyn RemoteStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                remote,
                config,
                tasks: Mutex::default(),
            }),
        }
    }

    /// Pull the user's remote cart after the load debounce window and merge
    /// it into the local cart, pushing the result when it differs remotely.
    pub fn schedule_load(&self, user: UserId) {
        let scheduler = self.clone();
        let delay = self.inner.config.load_debounce();

        self.schedule(Slot::Load, delay, move |token| async move {
            scheduler.load(user, &token).await;
        });
    }

    /// Push `snapshot` as the user's remote cart after the save debounce
    /// window, unless the remote copy already matches it.
    pub fn schedule_save(&self, user: UserId, snapshot: CartSnapshot) {
        let scheduler = self.clone();
        let delay = self.inner.config.save_debounce();

        self.schedule(Slot::Save, delay, move |token| async move {
            scheduler.save(user, snapshot, &token).await;
        });
    }

    /// Cancel every pending load and save. Work already talking to the remote
    /// store finishes its call but discards the result.
    pub fn cancel_all(&self) {
        let mut tasks = self.tasks();

        for scheduled in [tasks.load.take(), tasks.save.take()].into_iter().flatten() {
            scheduled.token.cancel();
        }

        debug!("cancelled scheduled cart sync");
    }

    /// Wait until no sync work is scheduled, including work scheduled by the
    /// work being waited on.
    pub async fn settle(&self) {
        loop {
            let handles: Vec<_> = {
                let mut tasks = self.tasks();

                [tasks.load.take(), tasks.save.take()]
                    .into_iter()
                    .flatten()
                    .map(|scheduled| scheduled.handle)
                    .collect()
            };

            if handles.is_empty() {
                return;
            }

            for handle in handles {
                if let Err(error) = handle.await {
                    warn!(%error, "cart sync task failed");
                }
            }
        }
    }

    fn schedule<F, Fut>(&self, slot: Slot, delay: std::time::Duration, work: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                () = task_token.cancelled() => return,
                () = sleep(delay) => {}
            }

            work(task_token).await;
        });

        let mut tasks = self.tasks();

        let previous = match slot {
            Slot::Load => tasks.load.replace(Scheduled { token, handle }),
            Slot::Save => tasks.save.replace(Scheduled { token, handle }),
        };

        if let Some(previous) = previous {
            previous.token.cancel();
        }
    }

    #[tracing::instrument(name = "carts.sync.load", skip(self, token), fields(user_id = %user))]
    async fn load(&self, user: UserId, token: &CancellationToken) {
        let result = self.inner.remote.fetch_cart(user).await;

        if token.is_cancelled() || self.inner.store.user() != Some(user) {
            debug!("discarding stale cart load");
            return;
        }

        let remote = match result {
            Ok(remote) => remote,
            Err(error) => {
                warn!(%error, "failed to load remote cart");
                self.inner
                    .store
                    .set_sync_error(format!("failed to load cart: {error}"));
                return;
            }
        };

        self.inner.store.mark_reloaded();

        let local = self.inner.store.snapshot();

        let Reconciliation {
            merged,
            push_required,
        } = reconcile(&local, remote.as_ref());

        self.inner.store.replace(merged.clone());

        info!(lines = merged.len(), push_required, "reconciled cart");

        if push_required {
            self.schedule_save(user, merged);
        }
    }

    #[tracing::instrument(
        name = "carts.sync.save",
        skip(self, snapshot, token),
        fields(user_id = %user, lines = snapshot.len())
    )]
    async fn save(&self, user: UserId, snapshot: CartSnapshot, token: &CancellationToken) {
        match self.inner.remote.fetch_cart(user).await {
            Ok(remote) if serialized_equal(remote.as_ref(), &snapshot) => {
                debug!("remote cart already up to date");

                if !token.is_cancelled() {
                    self.inner.store.clear_sync_error();
                }

                return;
            }
            Ok(_) => {}
            Err(error) => {
                self.fail(user, token, &format!("failed to save cart: {error}"));
                return;
            }
        }

        if token.is_cancelled() {
            debug!("discarding cancelled cart save");
            return;
        }

        match self.inner.remote.upsert_cart(user, snapshot).await {
            Ok(()) => {
                info!("saved cart");

                if !token.is_cancelled() {
                    self.inner.store.clear_sync_error();
                }
            }
            Err(error) => self.fail(user, token, &format!("failed to save cart: {error}")),
        }
    }

    fn fail(&self, user: UserId, token: &CancellationToken, message: &str) {
        if token.is_cancelled() || self.inner.store.user() != Some(user) {
            return;
        }

        warn!(user_id = %user, "{message}");

        self.inner.store.set_sync_error(message);
    }

    fn tasks(&self) -> MutexGuard<'_, Tasks> {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn serialized_equal(remote: Option<&CartSnapshot>, snapshot: &CartSnapshot) -> bool {
    let Some(remote) = remote else {
        return false;
    };

    match (serde_json::to_string(remote), serde_json::to_string(snapshot)) {
        (Ok(remote), Ok(local)) => remote == local,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use storefront::{cart::LineKey, ids::ProductId};
    use testresult::TestResult;

    use crate::{
        cache::MemoryCache,
        remote::{InMemoryRemoteStore, RemoteOperation},
        test::helpers::cart_line,
    };

    use super::*;

    struct Harness {
        user: UserId,
        store: Arc<LocalCartStore>,
        remote: Arc<InMemoryRemoteStore>,
        scheduler: SyncScheduler,
    }

    fn harness() -> Harness {
        let user = UserId::new();
        let store = Arc::new(LocalCartStore::new(Arc::new(MemoryCache::new())));
        let remote = Arc::new(InMemoryRemoteStore::new());

        store.switch_user(Some(user), CartSnapshot::empty());

        Harness {
            user,
            scheduler: SyncScheduler::new(store.clone(), remote.clone(), SyncConfig::default()),
            store,
            remote,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_of_saves_collapse_into_one_write() -> TestResult {
        let h = harness();
        let product = ProductId::new();

        for quantity in 1..=3 {
            let snapshot = h
                .store
                .replace(CartSnapshot::from(vec![cart_line(product, "M", quantity)]));

            h.scheduler.schedule_save(h.user, snapshot);
        }

        h.scheduler.settle().await;

        assert_eq!(h.remote.calls(RemoteOperation::UpsertCart), 1);
        assert_eq!(
            h.remote
                .cart(h.user)
                .and_then(|cart| cart.get(&LineKey::sized(product, "M")).map(|l| l.quantity)),
            Some(3)
        );

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn saves_wait_for_the_debounce_window() -> TestResult {
        let h = harness();

        h.scheduler.schedule_save(h.user, CartSnapshot::empty());

        sleep(Duration::from_millis(300)).await;

        assert_eq!(h.remote.calls(RemoteOperation::FetchCart), 0);

        h.scheduler.settle().await;

        assert_eq!(h.remote.calls(RemoteOperation::FetchCart), 1);

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn matching_remote_cart_skips_the_write() -> TestResult {
        let h = harness();
        let snapshot = CartSnapshot::from(vec![cart_line(ProductId::new(), "M", 2)]);

        h.remote.seed_cart(h.user, snapshot.clone());
        h.scheduler.schedule_save(h.user, snapshot);
        h.scheduler.settle().await;

        assert_eq!(h.remote.calls(RemoteOperation::FetchCart), 1);
        assert_eq!(h.remote.calls(RemoteOperation::UpsertCart), 0);

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn failed_writes_surface_an_error_without_retrying() -> TestResult {
        let h = harness();
        let snapshot = h
            .store
            .replace(CartSnapshot::from(vec![cart_line(ProductId::new(), "M", 1)]));

        h.remote.fail(RemoteOperation::UpsertCart);
        h.scheduler.schedule_save(h.user, snapshot.clone());
        h.scheduler.settle().await;

        sleep(Duration::from_secs(30)).await;

        assert_eq!(h.remote.calls(RemoteOperation::UpsertCart), 1);
        assert_eq!(h.store.snapshot(), snapshot);
        assert!(
            h.store
                .sync_error()
                .is_some_and(|message| message.contains("failed to save cart")),
            "expected a sync error, got {:?}",
            h.store.sync_error()
        );

        h.remote.recover(RemoteOperation::UpsertCart);
        h.scheduler.schedule_save(h.user, snapshot);
        h.scheduler.settle().await;

        assert_eq!(h.store.sync_error(), None);

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn load_merges_remote_first_and_pushes_the_result() -> TestResult {
        let h = harness();
        let local_product = ProductId::new();
        let remote_product = ProductId::new();

        h.store
            .replace(CartSnapshot::from(vec![cart_line(local_product, "S", 1)]));
        h.remote.seed_cart(
            h.user,
            CartSnapshot::from(vec![cart_line(remote_product, "L", 2)]),
        );

        h.scheduler.schedule_load(h.user);
        h.scheduler.settle().await;

        let keys: Vec<_> = h
            .store
            .snapshot()
            .lines()
            .iter()
            .map(|line| line.key())
            .collect();

        assert_eq!(
            keys,
            vec![
                LineKey::sized(remote_product, "L"),
                LineKey::sized(local_product, "S")
            ]
        );
        assert_eq!(h.remote.cart(h.user), Some(h.store.snapshot()));
        assert_eq!(h.remote.calls(RemoteOperation::UpsertCart), 1);

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn load_without_local_changes_does_not_push() -> TestResult {
        let h = harness();
        let remote = CartSnapshot::from(vec![cart_line(ProductId::new(), "L", 2)]);

        h.remote.seed_cart(h.user, remote.clone());

        h.scheduler.schedule_load(h.user);
        h.scheduler.settle().await;

        assert_eq!(h.store.snapshot(), remote);
        assert_eq!(h.remote.calls(RemoteOperation::UpsertCart), 0);

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_work_never_reaches_the_remote_store() -> TestResult {
        let h = harness();

        h.scheduler.schedule_load(h.user);
        h.scheduler.schedule_save(h.user, CartSnapshot::empty());
        h.scheduler.cancel_all();

        sleep(Duration::from_secs(1)).await;

        assert_eq!(h.remote.calls(RemoteOperation::FetchCart), 0);
        assert_eq!(h.remote.calls(RemoteOperation::UpsertCart), 0);

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn loads_for_a_signed_out_user_are_discarded() -> TestResult {
        let h = harness();

        h.remote.seed_cart(
            h.user,
            CartSnapshot::from(vec![cart_line(ProductId::new(), "L", 2)]),
        );

        h.scheduler.schedule_load(h.user);
        h.store.discard(None);
        h.scheduler.settle().await;

        assert!(h.store.snapshot().is_empty());
        assert_eq!(h.store.user(), None);

        Ok(())
    }
}
