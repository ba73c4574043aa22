//! Session reconciliation.
//!
//! Two sources decide whether someone is logged in: the primary identity
//! provider (push callbacks) and the alternate credential in the session
//! store (change notifications plus a poll for writes made by other
//! processes). [`Reconciler`] is the synchronous core that folds those
//! observations into the session FSM. [`SessionReconciler`] owns a core on a
//! single tokio task and feeds it from all trigger sources, so state is only
//! ever mutated in one place.
//!
//! # Lifecycle
//!
//! 1. [`SessionReconciler::spawn()`] reads the cached flag synchronously so
//!    the first observable state is already provisional, then subscribes to
//!    the provider and the store.
//! 2. The returned [`ReconcilerHandle`] exposes the state (`watch`) and the
//!    event stream (`broadcast`).
//! 3. [`ReconcilerHandle::shutdown()`] or dropping the handle stops the poll
//!    timer and unsubscribes from the provider together.

use crate::navigation::Route;
use crate::provider::{IdentityProvider, ProviderSubscription};
use crate::session_fsm::{SessionMachine, SessionMachineInput, SessionPhase};
use crate::state::{resolve, PrimaryObservation, PrimaryUser, Resolution, SessionState};
use crate::{SessionError, SessionResult};
use serde::Serialize;
use snapsafe_storage::{
    ActiveIdentitySelector, AlternateCredential, PersistQueue, SessionStore, StorageKeys,
    StoreChange,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Default interval for re-reading the alternate credential.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Reconciler configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// How often the store is re-read for the alternate credential.
    pub poll_interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Published to the screen layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The derived state changed.
    StateChanged {
        state: SessionState,
        phase: SessionPhase,
    },
    /// Navigate to `route`. Emitted once per entry into `Unauthenticated`.
    Redirect { route: Route },
}

/// Result of feeding one input to the core.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Step {
    pub events: Vec<SessionEvent>,
    /// The core entered a new determined phase; its state should be written
    /// back to the cache.
    pub persist: bool,
}

/// Synchronous reconciliation core.
pub struct Reconciler {
    fsm: SessionMachine,
    primary: PrimaryObservation,
    provisional_identity: ActiveIdentitySelector,
    state: SessionState,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            fsm: SessionMachine::new(),
            primary: PrimaryObservation::Unknown,
            provisional_identity: ActiveIdentitySelector::Unset,
            state: SessionState::default(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from(self.fsm.state())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn primary(&self) -> &PrimaryObservation {
        &self.primary
    }

    /// Apply the cached flag from the previous run.
    ///
    /// Only has an effect while still `Loading`. The provisional identity is
    /// the stored preference, trusting the primary identity unless the
    /// alternate one is both preferred and present.
    pub fn load_cache(
        &mut self,
        cached: Option<bool>,
        preference: ActiveIdentitySelector,
        alternate_present: bool,
    ) -> Step {
        let input = match cached {
            Some(true) => SessionMachineInput::CachedAuthenticated,
            Some(false) => SessionMachineInput::CachedSignedOut,
            None => return Step::default(),
        };
        self.provisional_identity = preference.sanitize(true, alternate_present);
        self.apply(input)
    }

    /// The provider reported a (possibly null) user.
    pub fn primary_changed(
        &mut self,
        user: Option<PrimaryUser>,
        alternate: Option<&AlternateCredential>,
    ) -> Step {
        self.primary = PrimaryObservation::from(user);
        self.reconcile(alternate)
    }

    /// The alternate credential was (re-)read from the store.
    pub fn alternate_observed(&mut self, alternate: Option<&AlternateCredential>) -> Step {
        self.reconcile(alternate)
    }

    fn reconcile(&mut self, alternate: Option<&AlternateCredential>) -> Step {
        let input = match resolve(&self.primary, alternate, self.phase()) {
            Resolution::Primary => SessionMachineInput::PrimaryResolved,
            Resolution::Alternate => SessionMachineInput::AlternateResolved,
            Resolution::NoIdentity => SessionMachineInput::NoIdentity,
            Resolution::Undetermined => return Step::default(),
        };
        self.apply(input)
    }

    /// Transition the FSM.
    fn transition(&mut self, input: &SessionMachineInput) -> SessionResult<SessionPhase> {
        self.fsm.consume(input).map_err(|_| {
            SessionError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                self.fsm.state()
            ))
        })?;
        Ok(self.phase())
    }

    fn apply(&mut self, input: SessionMachineInput) -> Step {
        let old_phase = self.phase();
        let phase = match self.transition(&input) {
            Ok(phase) => phase,
            Err(e) => {
                debug!(error = %e, "Ignoring session input");
                return Step::default();
            }
        };

        let mut step = Step::default();
        if phase == old_phase {
            return step;
        }

        debug!(old_phase = ?old_phase, new_phase = ?phase, "Session phase transition");

        let state = SessionState::for_phase(phase, self.provisional_identity);
        if state != self.state {
            self.state = state;
            step.events.push(SessionEvent::StateChanged { state, phase });
        }
        if phase == SessionPhase::Unauthenticated {
            step.events.push(SessionEvent::Redirect {
                route: Route::Login,
            });
        }
        step.persist = phase.is_determined();
        step
    }
}

/// Event loop owning a [`Reconciler`].
pub struct SessionReconciler {
    core: Reconciler,
    store: Arc<SessionStore>,
    persist: PersistQueue,
    state_tx: watch::Sender<SessionState>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl SessionReconciler {
    /// Start reconciling on the current tokio runtime.
    pub fn spawn(
        store: Arc<SessionStore>,
        provider: &dyn IdentityProvider,
        config: ReconcilerConfig,
    ) -> ReconcilerHandle {
        let (persist, _worker) = PersistQueue::start(store.clone());
        let (state_tx, state_rx) = watch::channel(SessionState::default());
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let mut reconciler = Self {
            core: Reconciler::new(),
            store: store.clone(),
            persist: persist.clone(),
            state_tx,
            events_tx: events_tx.clone(),
        };

        // Synchronous so the first observable state is already provisional.
        let cached = store.auth_cache();
        let preference = store.active_identity_preference();
        let alternate_present = store.alternate_token().is_some();
        info!(
            cached = ?cached,
            preference = %preference,
            alternate_present,
            "Session reconciler starting"
        );
        let step = reconciler
            .core
            .load_cache(cached, preference, alternate_present);
        reconciler.publish(step);

        // Subscribe to the store before the provider so no write made in
        // between goes unnoticed.
        let store_rx = store.subscribe();
        let (provider_tx, provider_rx) = mpsc::unbounded_channel::<Option<PrimaryUser>>();
        let subscription = provider.subscribe(Box::new(move |user: Option<PrimaryUser>| {
            let _ = provider_tx.send(user);
        }));

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(reconciler.run(
            config.poll_interval,
            provider_rx,
            store_rx,
            shutdown_rx,
            subscription,
        ));

        ReconcilerHandle {
            state_rx,
            events_tx,
            persist,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    async fn run(
        mut self,
        poll_interval: Duration,
        mut provider_rx: mpsc::UnboundedReceiver<Option<PrimaryUser>>,
        mut store_rx: broadcast::Receiver<StoreChange>,
        mut shutdown_rx: oneshot::Receiver<()>,
        subscription: ProviderSubscription,
    ) {
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                // Explicit shutdown or a dropped handle.
                _ = &mut shutdown_rx => break,
                Some(user) = provider_rx.recv() => {
                    self.on_primary(user).await;
                }
                change = store_rx.recv() => {
                    match change {
                        Ok(change) if change.key == StorageKeys::ALT_TOKEN => {
                            self.refresh_alternate().await;
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "Store notifications lagged, re-reading");
                            self.refresh_alternate().await;
                        }
                        Err(RecvError::Closed) => {
                            store_rx = self.store.subscribe();
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.refresh_alternate().await;
                }
            }
        }

        subscription.unsubscribe();
        info!(phase = ?self.core.phase(), "Session reconciler stopped");
    }

    async fn on_primary(&mut self, user: Option<PrimaryUser>) {
        debug!(
            uid = user.as_ref().map(|u| u.uid.as_str()),
            "Primary identity changed"
        );
        let alternate = self.read_alternate().await;
        let step = self.core.primary_changed(user, alternate.as_ref());
        self.publish(step);
    }

    async fn refresh_alternate(&mut self) {
        let alternate = self.read_alternate().await;
        let step = self.core.alternate_observed(alternate.as_ref());
        self.publish(step);
    }

    /// Reads go through the blocking pool since the file backend hits disk.
    ///
    /// The store logs and swallows read failures, so an unreadable store
    /// counts as "no alternate credential" and can sign the alternate
    /// identity out.
    async fn read_alternate(&self) -> Option<AlternateCredential> {
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || store.alternate_credential()).await {
            Ok(alternate) => alternate,
            Err(e) => {
                warn!(error = %e, "Alternate credential read task failed");
                None
            }
        }
    }

    fn publish(&mut self, step: Step) {
        if step.persist {
            let state = self.core.state();
            self.persist.set(
                StorageKeys::AUTH_CACHE,
                if state.is_authenticated() { "true" } else { "false" },
            );
            self.persist.set(
                StorageKeys::ACTIVE_IDENTITY_PREFERENCE,
                state.active_identity.as_str(),
            );
        }

        for event in step.events {
            match &event {
                SessionEvent::StateChanged { state, phase } => {
                    info!(
                        phase = ?phase,
                        authenticated = ?state.is_authenticated,
                        identity = %state.active_identity,
                        "Session state changed"
                    );
                    self.state_tx.send_replace(*state);
                }
                SessionEvent::Redirect { route } => {
                    info!(route = %route, "Redirecting");
                }
            }
            // No subscribers is fine.
            let _ = self.events_tx.send(event);
        }
    }
}

/// Handle to a running [`SessionReconciler`].
///
/// Dropping the handle stops the reconciler like [`shutdown`](Self::shutdown)
/// but without waiting for it.
pub struct ReconcilerHandle {
    state_rx: watch::Receiver<SessionState>,
    events_tx: broadcast::Sender<SessionEvent>,
    persist: PersistQueue,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ReconcilerHandle {
    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Receiver that is notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Subscribe to state changes and redirects.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Wait until every cache write issued so far has reached the store.
    pub async fn flush(&self) {
        self.persist.flush().await;
    }

    /// Stop the event loop, unsubscribe from the provider and flush pending
    /// cache writes.
    pub async fn shutdown(mut self) -> SessionResult<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.await.map_err(|_| SessionError::ChannelClosed)?;
        }
        self.persist.flush().await;
        Ok(())
    }
}
