//! # Chagua Runtime
//!
//! Runtime implementation for the Chagua marketplace engines.
//!
//! This crate provides:
//! - [`Store`]: owns one aggregate's state behind an exclusive lock, runs the
//!   reducer under that lock, and dispatches effects after releasing it
//! - [`StoreMap`]: one lazily created [`Store`] per key (listing, review target,
//!   user) so that unrelated aggregates never contend
//! - [`notifiers`]: ready-made [`Notifier`] implementations
//!
//! # Transaction Boundary
//!
//! One `Store::send` call is one transaction. The reducer either returns
//! `Ok`, in which case its state mutation and effects are kept, or `Err`, in
//! which case the reducer contract guarantees the state was not touched.
//! Because the lock is held across the whole read-check-write sequence, two
//! concurrent commands against the same aggregate are strictly serialized.
//!
//! # Example
//!
//! ```ignore
//! let store = Store::new(ListingState::new(listing), BookingReducer::new(), env, notifier);
//!
//! let reservation = store.send(BookingAction::RequestBooking { .. }).await?;
//! let booked = store.state(|s| s.calendar.booked_count()).await;
//! ```

use chagua_core::effect::Effect;
use chagua_core::notify::Notifier;
use chagua_core::reducer::{Effects, Reducer};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

pub mod metrics;
pub mod notifiers;

/// Owner of a single aggregate's state.
///
/// # Type Parameters
///
/// - `R`: Reducer implementation (business logic)
pub struct Store<R>
where
    R: Reducer,
{
    state: Mutex<R::State>,
    reducer: R,
    environment: R::Environment,
    notifier: Arc<dyn Notifier<R::Notification>>,
}

impl<R> Store<R>
where
    R: Reducer + Send + Sync,
    R::State: Send,
    R::Environment: Send + Sync,
    R::Notification: Send + 'static,
{
    /// Create a new store with initial state, reducer, environment and notifier
    #[must_use]
    pub fn new(
        initial_state: R::State,
        reducer: R,
        environment: R::Environment,
        notifier: Arc<dyn Notifier<R::Notification>>,
    ) -> Self {
        Self {
            state: Mutex::new(initial_state),
            reducer,
            environment,
            notifier,
        }
    }

    /// Send an action to the store.
    ///
    /// The reducer runs while the state lock is held. Effects are dispatched
    /// only after the lock is released, so a slow transport never extends the
    /// critical section.
    ///
    /// # Errors
    ///
    /// Returns the reducer's error when the action is rejected. Notification
    /// delivery failures are logged and never returned.
    #[tracing::instrument(skip_all, name = "store_send")]
    pub async fn send(&self, action: R::Action) -> Result<R::Output, R::Error> {
        let reduced = {
            let mut state = self.state.lock().await;
            match self.reducer.reduce(&mut state, action, &self.environment) {
                Ok(reduced) => {
                    metrics::record_action(metrics::ActionOutcome::Committed);
                    reduced
                },
                Err(error) => {
                    metrics::record_action(metrics::ActionOutcome::Rejected);
                    return Err(error);
                },
            }
        };

        self.dispatch(reduced.effects).await;
        Ok(reduced.output)
    }

    /// Read the current state through a closure.
    ///
    /// Takes the same lock as [`Store::send`], so the closure never observes a
    /// half-applied command.
    pub async fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&R::State) -> T,
    {
        let state = self.state.lock().await;
        f(&state)
    }

    async fn dispatch(&self, effects: Effects<R::Notification>) {
        let notifications: Vec<R::Notification> = effects
            .into_iter()
            .flat_map(Effect::into_notifications)
            .collect();

        if notifications.is_empty() {
            return;
        }

        let deliveries = notifications
            .into_iter()
            .map(|notification| self.notifier.notify(notification));

        for result in futures::future::join_all(deliveries).await {
            match result {
                Ok(()) => metrics::record_notification(true),
                Err(error) => {
                    metrics::record_notification(false);
                    tracing::warn!(%error, "Notification dropped");
                },
            }
        }
    }
}

/// Keyed collection of stores, one per aggregate instance.
///
/// The map lock is only held while looking up or inserting a store handle;
/// commands then run against the per-key [`Store`] lock. Two keys therefore
/// never block each other.
pub struct StoreMap<K, R>
where
    R: Reducer,
{
    stores: RwLock<HashMap<K, Arc<Store<R>>>>,
    reducer: R,
    environment: R::Environment,
    notifier: Arc<dyn Notifier<R::Notification>>,
}

impl<K, R> StoreMap<K, R>
where
    K: Eq + Hash + Clone,
    R: Reducer + Clone + Send + Sync,
    R::State: Send,
    R::Environment: Clone + Send + Sync,
    R::Notification: Send + 'static,
{
    /// Create an empty map whose stores share the reducer, environment and notifier
    #[must_use]
    pub fn new(
        reducer: R,
        environment: R::Environment,
        notifier: Arc<dyn Notifier<R::Notification>>,
    ) -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
            reducer,
            environment,
            notifier,
        }
    }

    fn build(&self, state: R::State) -> Arc<Store<R>> {
        Arc::new(Store::new(
            state,
            self.reducer.clone(),
            self.environment.clone(),
            Arc::clone(&self.notifier),
        ))
    }

    /// Look up the store for a key
    pub async fn get(&self, key: &K) -> Option<Arc<Store<R>>> {
        self.stores.read().await.get(key).cloned()
    }

    /// Insert a store for a new key.
    ///
    /// Returns `None` when the key already has a store; the existing state is
    /// left untouched.
    pub async fn insert_new(&self, key: K, state: R::State) -> Option<Arc<Store<R>>> {
        let mut stores = self.stores.write().await;
        if stores.contains_key(&key) {
            return None;
        }
        let store = self.build(state);
        stores.insert(key, Arc::clone(&store));
        Some(store)
    }

    /// Look up the store for a key, creating it from `init` when absent
    pub async fn get_or_insert_with<F>(&self, key: K, init: F) -> Arc<Store<R>>
    where
        F: FnOnce() -> R::State,
    {
        if let Some(store) = self.get(&key).await {
            return store;
        }

        let mut stores = self.stores.write().await;
        // Another task may have inserted between the read and write locks.
        if let Some(store) = stores.get(&key) {
            return Arc::clone(store);
        }
        let store = self.build(init());
        stores.insert(key, Arc::clone(&store));
        store
    }

    /// Number of aggregates currently held
    pub async fn len(&self) -> usize {
        self.stores.read().await.len()
    }

    /// Whether the map holds no aggregates
    pub async fn is_empty(&self) -> bool {
        self.stores.read().await.is_empty()
    }

    /// Snapshot of all keys
    pub async fn keys(&self) -> Vec<K> {
        self.stores.read().await.keys().cloned().collect()
    }
}
