//! Alternate identity credential and the active identity selector.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Credentials of the secondary identity obtained from the external login.
///
/// The token is an opaque authorization code; there is no expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternateCredential {
    pub token: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl AlternateCredential {
    /// Build a credential, normalizing empty optional fields to `None`.
    pub fn new(
        token: impl Into<String>,
        email: Option<String>,
        display_name: Option<String>,
    ) -> Self {
        Self {
            token: token.into(),
            email: email.filter(|v| !v.trim().is_empty()),
            display_name: display_name.filter(|v| !v.trim().is_empty()),
        }
    }

    /// A credential only counts when its token has content.
    pub fn is_usable(&self) -> bool {
        is_usable_token(&self.token)
    }
}

// The token stays out of Debug output so credentials never end up in logs.
impl fmt::Debug for AlternateCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlternateCredential")
            .field("token", &"<redacted>")
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .finish()
    }
}

pub(crate) fn is_usable_token(token: &str) -> bool {
    !token.trim().is_empty()
}

/// Which identity is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveIdentitySelector {
    Primary,
    Alternate,
    #[default]
    Unset,
}

impl ActiveIdentitySelector {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActiveIdentitySelector::Primary => "primary",
            ActiveIdentitySelector::Alternate => "alternate",
            ActiveIdentitySelector::Unset => "unset",
        }
    }

    /// Enforce the selector invariant against what is actually present.
    ///
    /// `Alternate` needs an alternate credential, `Primary` needs a primary
    /// user. A selector that cannot hold falls back to the other identity if
    /// it is present, else to `Unset`.
    pub fn sanitize(self, primary_present: bool, alternate_present: bool) -> Self {
        match self {
            ActiveIdentitySelector::Alternate if alternate_present => self,
            ActiveIdentitySelector::Primary if primary_present => self,
            _ if primary_present => ActiveIdentitySelector::Primary,
            _ if alternate_present => ActiveIdentitySelector::Alternate,
            _ => ActiveIdentitySelector::Unset,
        }
    }
}

impl fmt::Display for ActiveIdentitySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActiveIdentitySelector {
    type Err = std::convert::Infallible;

    /// Unknown strings read as `Unset`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "primary" => ActiveIdentitySelector::Primary,
            "alternate" => ActiveIdentitySelector::Alternate,
            _ => ActiveIdentitySelector::Unset,
        })
    }
}
