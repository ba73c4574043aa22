//! Session state machine using rust-fsm.
//!
//! The machine only tracks *which* phase the session is in. What drives it
//! is a resolution computed from the two sources of truth (the primary
//! provider and the alternate credential in the store), so every determined
//! phase accepts every resolution.
//!
//! ## State Diagram
//!
//! ```text
//!                        ┌─────────────┐
//!                        │   Loading   │ (initial)
//!                        └──────┬──────┘
//!        CachedAuthenticated    │    CachedSignedOut
//!          ┌────────────────────┼────────────────────┐
//!          ▼                    │                    ▼
//! ┌──────────────────────┐      │      ┌────────────────────────┐
//! │ProvisionalAuthentic. │      │      │ProvisionalUnauthentic. │
//! └──────────┬───────────┘      │      └───────────┬────────────┘
//!            └──────────────────┼──────────────────┘
//!                               │ PrimaryResolved / AlternateResolved / NoIdentity
//!                               ▼
//!   ┌────────────────────┐ ┌──────────────────────┐ ┌─────────────────┐
//!   │AuthenticatedPrimary│◄┤AuthenticatedAlternate├►│ Unauthenticated │
//!   └────────────────────┘ └──────────────────────┘ └─────────────────┘
//!          (all three accept all three resolutions)
//! ```
//!
//! Cached inputs are only accepted from `Loading`: once any resolution has
//! happened a late cache read is an invalid transition.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Loading)

    Loading => {
        CachedAuthenticated => ProvisionalAuthenticated,
        CachedSignedOut => ProvisionalUnauthenticated,
        PrimaryResolved => AuthenticatedPrimary,
        AlternateResolved => AuthenticatedAlternate,
        NoIdentity => Unauthenticated
    },
    ProvisionalAuthenticated => {
        PrimaryResolved => AuthenticatedPrimary,
        AlternateResolved => AuthenticatedAlternate,
        NoIdentity => Unauthenticated
    },
    ProvisionalUnauthenticated => {
        PrimaryResolved => AuthenticatedPrimary,
        AlternateResolved => AuthenticatedAlternate,
        NoIdentity => Unauthenticated
    },
    AuthenticatedPrimary => {
        PrimaryResolved => AuthenticatedPrimary,
        AlternateResolved => AuthenticatedAlternate,
        NoIdentity => Unauthenticated
    },
    AuthenticatedAlternate => {
        PrimaryResolved => AuthenticatedPrimary,
        AlternateResolved => AuthenticatedAlternate,
        NoIdentity => Unauthenticated
    },
    Unauthenticated => {
        PrimaryResolved => AuthenticatedPrimary,
        AlternateResolved => AuthenticatedAlternate,
        NoIdentity => Unauthenticated
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Session phase for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Nothing known yet.
    Loading,
    /// Cache from the last run says signed in; not yet confirmed.
    ProvisionalAuthenticated,
    /// Cache from the last run says signed out; not yet confirmed.
    ProvisionalUnauthenticated,
    AuthenticatedPrimary,
    AuthenticatedAlternate,
    Unauthenticated,
}

impl SessionPhase {
    /// `None` while nothing is known, otherwise whether someone is signed in.
    pub fn is_authenticated(&self) -> Option<bool> {
        match self {
            SessionPhase::Loading => None,
            SessionPhase::ProvisionalAuthenticated
            | SessionPhase::AuthenticatedPrimary
            | SessionPhase::AuthenticatedAlternate => Some(true),
            SessionPhase::ProvisionalUnauthenticated | SessionPhase::Unauthenticated => {
                Some(false)
            }
        }
    }

    /// Returns true once a real resolution has happened.
    pub fn is_determined(&self) -> bool {
        matches!(
            self,
            SessionPhase::AuthenticatedPrimary
                | SessionPhase::AuthenticatedAlternate
                | SessionPhase::Unauthenticated
        )
    }
}

impl From<&SessionMachineState> for SessionPhase {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Loading => SessionPhase::Loading,
            SessionMachineState::ProvisionalAuthenticated => SessionPhase::ProvisionalAuthenticated,
            SessionMachineState::ProvisionalUnauthenticated => {
                SessionPhase::ProvisionalUnauthenticated
            }
            SessionMachineState::AuthenticatedPrimary => SessionPhase::AuthenticatedPrimary,
            SessionMachineState::AuthenticatedAlternate => SessionPhase::AuthenticatedAlternate,
            SessionMachineState::Unauthenticated => SessionPhase::Unauthenticated,
        }
    }
}
