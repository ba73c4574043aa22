//! Primary identity provider abstraction.
//!
//! The real provider is an external service; the reconciler only needs its
//! "current user changed" feed. `LocalIdentityProvider` is the in-process
//! implementation used by the CLI and tests.

use crate::state::PrimaryUser;
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Callback invoked with the current user on subscribe and on every change.
pub type UserCallback = Box<dyn Fn(Option<PrimaryUser>) + Send + Sync>;

/// Push-based source of the primary identity.
pub trait IdentityProvider: Send + Sync {
    /// Register a callback. It must be invoked once immediately with the
    /// current user, then on every change until the subscription is dropped.
    fn subscribe(&self, callback: UserCallback) -> ProviderSubscription;
}

/// Live provider subscription. Dropping it unsubscribes.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct ProviderSubscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl ProviderSubscription {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// A subscription with nothing to detach.
    pub fn noop() -> Self {
        Self { detach: None }
    }

    pub fn unsubscribe(mut self) {
        self.detach_now();
    }

    fn detach_now(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for ProviderSubscription {
    fn drop(&mut self) {
        self.detach_now();
    }
}

impl std::fmt::Debug for ProviderSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSubscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

type SharedCallback = Arc<dyn Fn(Option<PrimaryUser>) + Send + Sync>;

#[derive(Default)]
struct ProviderState {
    current: Option<PrimaryUser>,
    listeners: BTreeMap<u64, SharedCallback>,
}

#[derive(Default)]
struct ProviderInner {
    state: Mutex<ProviderState>,
    /// Held for a whole change-and-deliver cycle so every listener sees
    /// changes in the order they were made. Reentrant so callbacks may call
    /// back into the provider.
    delivery: ReentrantMutex<()>,
    next_id: AtomicU64,
}

impl ProviderInner {
    fn set_and_notify(&self, user: Option<PrimaryUser>) {
        let _delivery = self.delivery.lock();
        let listeners: Vec<SharedCallback> = {
            let mut state = self.state.lock();
            state.current = user.clone();
            state.listeners.values().cloned().collect()
        };
        // Callbacks run outside the state lock so they may subscribe or unsubscribe.
        for listener in listeners {
            listener(user.clone());
        }
    }
}

/// In-process identity provider.
#[derive(Clone, Default)]
pub struct LocalIdentityProvider {
    inner: Arc<ProviderInner>,
}

impl LocalIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that starts with a signed-in user.
    pub fn signed_in(user: PrimaryUser) -> Self {
        let provider = Self::new();
        provider.inner.state.lock().current = Some(user);
        provider
    }

    pub fn sign_in(&self, user: PrimaryUser) {
        info!(uid = %user.uid, "Primary user signed in");
        self.inner.set_and_notify(Some(user));
    }

    pub fn sign_out(&self) {
        info!("Primary user signed out");
        self.inner.set_and_notify(None);
    }

    pub fn current_user(&self) -> Option<PrimaryUser> {
        self.inner.state.lock().current.clone()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().listeners.len()
    }
}

impl IdentityProvider for LocalIdentityProvider {
    fn subscribe(&self, callback: UserCallback) -> ProviderSubscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: SharedCallback = Arc::from(callback);

        {
            let _delivery = self.inner.delivery.lock();
            let current = {
                let mut state = self.inner.state.lock();
                state.listeners.insert(id, callback.clone());
                state.current.clone()
            };
            debug!(subscription = id, "Identity provider subscription added");
            callback(current);
        }

        let inner: Weak<ProviderInner> = Arc::downgrade(&self.inner);
        ProviderSubscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.state.lock().listeners.remove(&id);
                debug!(subscription = id, "Identity provider subscription removed");
            }
        })
    }
}
