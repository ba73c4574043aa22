//! Route gating driven by the session state.

use crate::state::SessionState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Screens the gate knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Splash,
    Root,
    AuthenticatedArea,
    Login,
    Register,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Splash => "splash",
            Route::Root => "root",
            Route::AuthenticatedArea => "authenticated_area",
            Route::Login => "login",
            Route::Register => "register",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a navigation to the login screen was initiated.
///
/// Redirects issued by the reconciler count as `Allowed`; a deep link or
/// typed-in route is `Direct`. This is a loose access check, not a security
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginAccess {
    Allowed,
    #[default]
    Direct,
}

/// Verdict for a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session not determined yet; keep showing the splash screen.
    Wait,
    Allow,
    Redirect(Route),
}

/// Where the app should land for a given state.
pub fn home_route(state: &SessionState) -> Route {
    match state.is_authenticated {
        None => Route::Splash,
        Some(true) => Route::AuthenticatedArea,
        Some(false) => Route::Login,
    }
}

/// Decide whether `requested` may be shown in `state`.
pub fn guard(state: &SessionState, requested: Route, access: LoginAccess) -> GuardDecision {
    let Some(authenticated) = state.is_authenticated else {
        return GuardDecision::Wait;
    };

    match (authenticated, requested) {
        (_, Route::Splash | Route::Root) => GuardDecision::Redirect(home_route(state)),
        (true, Route::AuthenticatedArea) => GuardDecision::Allow,
        (true, Route::Login | Route::Register) => {
            GuardDecision::Redirect(Route::AuthenticatedArea)
        }
        (false, Route::AuthenticatedArea) => GuardDecision::Redirect(Route::Login),
        (false, Route::Login) => match access {
            LoginAccess::Allowed => GuardDecision::Allow,
            LoginAccess::Direct => GuardDecision::Redirect(Route::Root),
        },
        (false, Route::Register) => GuardDecision::Allow,
    }
}
