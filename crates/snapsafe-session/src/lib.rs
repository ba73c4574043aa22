//! Session reconciliation for the SnapSafe client.
//!
//! This crate provides:
//! - An explicit FSM-based session phase model
//! - Identity resolution across the primary provider and the alternate
//!   credential in the session store
//! - `SessionReconciler`, the event loop that keeps the session state current
//! - The navigation gate driven by that state
//! - Completion of the alternate login flow

mod alt_login;
mod error;
mod navigation;
mod provider;
mod reconciler;
mod session_fsm;
mod state;

pub use alt_login::{complete_alternate_login, RedirectCredential};
pub use error::{AltLoginError, SessionError, SessionResult};
pub use navigation::{guard, home_route, GuardDecision, LoginAccess, Route};
pub use provider::{IdentityProvider, LocalIdentityProvider, ProviderSubscription, UserCallback};
pub use reconciler::{
    Reconciler, ReconcilerConfig, ReconcilerHandle, SessionEvent, SessionReconciler, Step,
    DEFAULT_POLL_INTERVAL,
};
pub use session_fsm::session_machine;
pub use session_fsm::{SessionMachine, SessionMachineInput, SessionMachineState, SessionPhase};
pub use state::{resolve, PrimaryObservation, PrimaryUser, Resolution, SessionState};
