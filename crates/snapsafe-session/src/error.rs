//! Session error types.

use thiserror::Error;

/// Failure to turn an alternate-login redirect into a credential.
#[derive(Error, Debug)]
pub enum AltLoginError {
    /// The redirect is not a valid URL
    #[error("Invalid redirect URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The identity service reported an error instead of a code
    #[error("Alternate login was rejected: {0}")]
    Rejected(String),

    /// The redirect carried no usable authorization code
    #[error("Redirect carried no authorization code")]
    MissingCode,
}

/// Session error type.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Invalid state transition in the session FSM
    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    /// Alternate login flow error
    #[error("Alternate login failed: {0}")]
    AltLogin(#[from] AltLoginError),

    /// A store write did not land
    #[error("Failed to write session key: {0}")]
    StoreWrite(String),

    /// The reconciler task is gone
    #[error("Session reconciler is not running")]
    ChannelClosed,
}

impl SessionError {
    /// Returns true if the error came from the user or the identity service
    /// rather than from local storage.
    pub fn is_login_failure(&self) -> bool {
        matches!(self, SessionError::AltLogin(_))
    }
}

/// Result type alias using SessionError.
pub type SessionResult<T> = Result<T, SessionError>;
