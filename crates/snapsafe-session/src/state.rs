//! Session state and identity resolution.

use crate::session_fsm::SessionPhase;
use serde::{Deserialize, Serialize};
use snapsafe_storage::{ActiveIdentitySelector, AlternateCredential};

/// A user reported by the primary identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryUser {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl PrimaryUser {
    pub fn new(uid: impl Into<String>, email: Option<String>) -> Self {
        Self {
            uid: uid.into(),
            email,
        }
    }
}

/// The most recent thing the primary provider said.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PrimaryObservation {
    /// The provider has not fired yet.
    #[default]
    Unknown,
    SignedIn(PrimaryUser),
    SignedOut,
}

impl PrimaryObservation {
    pub fn is_signed_in(&self) -> bool {
        matches!(self, PrimaryObservation::SignedIn(_))
    }
}

impl From<Option<PrimaryUser>> for PrimaryObservation {
    fn from(user: Option<PrimaryUser>) -> Self {
        match user {
            Some(user) => PrimaryObservation::SignedIn(user),
            None => PrimaryObservation::SignedOut,
        }
    }
}

/// The authoritative answer to "is someone logged in, and as whom".
///
/// `is_authenticated == None` means not yet determined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub is_authenticated: Option<bool>,
    pub active_identity: ActiveIdentitySelector,
}

impl SessionState {
    /// Derive the state for a phase.
    ///
    /// `provisional_identity` is only used for `ProvisionalAuthenticated`,
    /// where no source has confirmed who is signed in yet.
    pub fn for_phase(phase: SessionPhase, provisional_identity: ActiveIdentitySelector) -> Self {
        let active_identity = match phase {
            SessionPhase::AuthenticatedPrimary => ActiveIdentitySelector::Primary,
            SessionPhase::AuthenticatedAlternate => ActiveIdentitySelector::Alternate,
            SessionPhase::ProvisionalAuthenticated => provisional_identity,
            SessionPhase::Loading
            | SessionPhase::ProvisionalUnauthenticated
            | SessionPhase::Unauthenticated => ActiveIdentitySelector::Unset,
        };
        Self {
            is_authenticated: phase.is_authenticated(),
            active_identity,
        }
    }

    pub fn is_determined(&self) -> bool {
        self.is_authenticated.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated == Some(true)
    }
}

/// Outcome of combining both identity sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Primary,
    Alternate,
    NoIdentity,
    /// Not enough information yet; keep the current phase.
    Undetermined,
}

/// Combine the two identity sources.
///
/// A signed-in primary user always wins. Otherwise a usable alternate
/// credential authenticates. With neither, the answer is `NoIdentity` once
/// the provider has said it is signed out, or when the alternate identity
/// was the one keeping the session alive.
pub fn resolve(
    primary: &PrimaryObservation,
    alternate: Option<&AlternateCredential>,
    current: SessionPhase,
) -> Resolution {
    if primary.is_signed_in() {
        return Resolution::Primary;
    }
    if alternate.is_some_and(|cred| cred.is_usable()) {
        return Resolution::Alternate;
    }
    match primary {
        PrimaryObservation::SignedOut => Resolution::NoIdentity,
        _ if current == SessionPhase::AuthenticatedAlternate => Resolution::NoIdentity,
        _ => Resolution::Undetermined,
    }
}
