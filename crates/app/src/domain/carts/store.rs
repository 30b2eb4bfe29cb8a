//! Local Cart Store
//!
//! The session's authoritative cart. Mutations apply synchronously, notify
//! subscribers through a watch channel, and are written through to the
//! persistent cache before returning.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use storefront::{
    cart::{CartError, CartLine, CartSnapshot, LineKey},
    ids::UserId,
    money::MoneyError,
};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::{CacheError, PersistentCache, cart_key, read_json, write_json};

/// Observable cart state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartState {
    /// Signed-in user owning the cart, `None` for guests.
    pub user: Option<UserId>,

    /// Current cart contents.
    pub snapshot: CartSnapshot,

    /// Last sync or storage failure, for display.
    pub sync_error: Option<String>,
}

/// In-memory cart for the current session, backed by the persistent cache.
pub struct LocalCartStore {
    state: watch::Sender<CartState>,
    cache: Arc<dyn PersistentCache>,
    /// Set when a quota reset dropped lines the remote copy may still hold.
    reload_required: AtomicBool,
}

impl fmt::Debug for LocalCartStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCartStore")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl LocalCartStore {
    /// Empty guest cart over `cache`.
    pub fn new(cache: Arc<dyn PersistentCache>) -> Self {
        let (state, _) = watch::channel(CartState::default());

        Self {
            state,
            cache,
            reload_required: AtomicBool::new(false),
        }
    }

    /// Receive every state change.
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.state.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> CartState {
        self.state.borrow().clone()
    }

    /// Current cart contents.
    pub fn snapshot(&self) -> CartSnapshot {
        self.state.borrow().snapshot.clone()
    }

    /// User owning the cart.
    pub fn user(&self) -> Option<UserId> {
        self.state.borrow().user
    }

    /// Total units in the cart.
    pub fn count(&self) -> u64 {
        self.state.borrow().snapshot.item_count()
    }

    /// Cart subtotal.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] when the subtotal does not fit in `u64`.
    pub fn subtotal(&self) -> Result<u64, MoneyError> {
        self.state.borrow().snapshot.subtotal()
    }

    /// Last sync failure.
    pub fn sync_error(&self) -> Option<String> {
        self.state.borrow().sync_error.clone()
    }

    /// Whether the cart was reset by the storage quota and must be reloaded
    /// from the remote copy before it is pushed again.
    pub fn reload_required(&self) -> bool {
        self.reload_required.load(Ordering::Acquire)
    }

    pub(crate) fn mark_reloaded(&self) {
        self.reload_required.store(false, Ordering::Release);
    }

    /// Read the cached cart of `user` without touching the current state.
    ///
    /// An unreadable entry is removed and read as an empty cart.
    pub fn read_cached(&self, user: Option<UserId>) -> CartSnapshot {
        let key = cart_key(user);

        match read_json::<CartSnapshot>(self.cache.as_ref(), &key) {
            Ok(snapshot) => snapshot.unwrap_or_default(),
            Err(error @ CacheError::Decode { .. }) => {
                warn!(%key, %error, "discarding unreadable cached cart");

                if let Err(error) = self.cache.remove(&key) {
                    warn!(%key, %error, "failed to remove unreadable cached cart");
                }

                CartSnapshot::empty()
            }
            Err(error) => {
                warn!(%key, %error, "failed to read cached cart");

                self.set_sync_error(error.to_string());

                CartSnapshot::empty()
            }
        }
    }

    /// Remove the cached cart of `user`, leaving the current state alone.
    pub fn remove_cached(&self, user: Option<UserId>) {
        let key = cart_key(user);

        if let Err(error) = self.cache.remove(&key) {
            warn!(%key, %error, "failed to remove cached cart");
        }
    }

    /// Load the cached cart of `user` and make it current.
    pub fn hydrate(&self, user: Option<UserId>) -> CartSnapshot {
        let snapshot = self.read_cached(user);

        self.state.send_modify(|state| {
            state.user = user;
            state.snapshot = snapshot.clone();
        });

        snapshot
    }

    /// Make `snapshot` the current cart of `user` and persist it.
    pub fn switch_user(&self, user: Option<UserId>, snapshot: CartSnapshot) -> CartSnapshot {
        let persisted = snapshot.clone();

        self.mark_reloaded();

        self.state.send_modify(|state| {
            state.user = user;
            state.snapshot = snapshot;
            state.sync_error = None;
        });

        self.persist(user, &persisted)
    }

    /// Drop the current cart: empty it in memory and remove its cache entry,
    /// leaving an empty cart owned by `next_user`.
    pub fn discard(&self, next_user: Option<UserId>) {
        self.remove_cached(self.user());
        self.mark_reloaded();

        self.state.send_replace(CartState {
            user: next_user,
            snapshot: CartSnapshot::empty(),
            sync_error: None,
        });
    }

    /// Add a line, summing quantities with an existing line of the same key.
    ///
    /// # Errors
    ///
    /// Returns [`CartError`] when the line is empty or the quantity overflows.
    pub fn add_line(&self, line: CartLine) -> Result<CartSnapshot, CartError> {
        self.mutate(|snapshot| snapshot.add(line))
    }

    /// Set a line's quantity; zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::LineNotFound`] when no line has the key.
    pub fn update_quantity(&self, key: &LineKey, quantity: u32) -> Result<CartSnapshot, CartError> {
        self.mutate(|snapshot| snapshot.set_quantity(key, quantity))
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::LineNotFound`] when no line has the key.
    pub fn remove_line(&self, key: &LineKey) -> Result<CartSnapshot, CartError> {
        self.mutate(|snapshot| {
            snapshot
                .remove(key)
                .map(|_| ())
                .ok_or(CartError::LineNotFound)
        })
    }

    /// Remove every line.
    pub fn clear(&self) -> CartSnapshot {
        self.replace(CartSnapshot::empty())
    }

    /// Replace the cart wholesale.
    pub fn replace(&self, snapshot: CartSnapshot) -> CartSnapshot {
        let mut changed = None;

        self.state.send_if_modified(|state| {
            if state.snapshot == snapshot {
                return false;
            }

            state.snapshot = snapshot;
            changed = Some((state.user, state.snapshot.clone()));

            true
        });

        match changed {
            Some((user, snapshot)) => self.persist(user, &snapshot),
            None => self.snapshot(),
        }
    }

    /// Surface a sync failure.
    pub fn set_sync_error(&self, message: impl Into<String>) {
        let message = message.into();

        self.state.send_if_modified(|state| {
            if state.sync_error.as_deref() == Some(message.as_str()) {
                return false;
            }

            state.sync_error = Some(message);

            true
        });
    }

    /// Clear a surfaced sync failure.
    pub fn clear_sync_error(&self) {
        self.state
            .send_if_modified(|state| state.sync_error.take().is_some());
    }

    fn mutate<F>(&self, apply: F) -> Result<CartSnapshot, CartError>
    where
        F: FnOnce(&mut CartSnapshot) -> Result<(), CartError>,
    {
        let mut outcome = Ok(());
        let mut changed = None;

        self.state.send_if_modified(|state| {
            let mut next = state.snapshot.clone();

            if let Err(error) = apply(&mut next) {
                outcome = Err(error);
                return false;
            }

            if next == state.snapshot {
                return false;
            }

            state.snapshot = next;
            changed = Some((state.user, state.snapshot.clone()));

            true
        });

        outcome?;

        Ok(match changed {
            Some((user, snapshot)) => self.persist(user, &snapshot),
            None => self.snapshot(),
        })
    }

    /// Write `snapshot` to the cache. Returns the cart as it stands afterwards,
    /// which is empty when the write hit the storage quota.
    fn persist(&self, user: Option<UserId>, snapshot: &CartSnapshot) -> CartSnapshot {
        let key = cart_key(user);

        match write_json(self.cache.as_ref(), &key, snapshot) {
            Ok(()) => {
                debug!(%key, lines = snapshot.len(), "persisted cart");

                snapshot.clone()
            }
            Err(CacheError::QuotaExceeded) => {
                warn!(%key, "storage quota exceeded; resetting cart");

                self.reload_required.store(true, Ordering::Release);

                if let Err(error) = self.cache.remove(&key) {
                    warn!(%key, %error, "failed to remove cached cart");
                }

                self.state.send_modify(|state| {
                    state.snapshot = CartSnapshot::empty();
                    state.sync_error = Some(format!(
                        "{}; the cart was reset",
                        CacheError::QuotaExceeded
                    ));
                });

                CartSnapshot::empty()
            }
            Err(error) => {
                warn!(%key, %error, "failed to persist cart");

                self.set_sync_error(error.to_string());

                snapshot.clone()
            }
        }
    }
}
