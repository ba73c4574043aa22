//! Best-effort typed API over a key-value backend.
//!
//! Nothing here returns an error to the caller: failed reads are logged and
//! read as absent, failed writes are logged and dropped. Callers must not
//! assume a write landed. Every successful mutation is published as a
//! `StoreChange` so observers do not have to poll.

use crate::credential::is_usable_token;
use crate::{
    ActiveIdentitySelector, AlternateCredential, KeyValueStorage, StorageKeys, StorageResult,
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Kind of mutation that happened to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Set,
    Removed,
}

/// Notification of a successful store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
    pub kind: ChangeKind,
}

/// Session store over a durable backend.
pub struct SessionStore {
    storage: Box<dyn KeyValueStorage>,
    changes: broadcast::Sender<StoreChange>,
}

impl SessionStore {
    /// Create a session store over the given backend.
    pub fn new(storage: Box<dyn KeyValueStorage>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { storage, changes }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// Read a key, surfacing backend errors.
    pub fn try_get(&self, key: &str) -> StorageResult<Option<String>> {
        self.storage.get(key)
    }

    /// Read a key. Failures are logged and read as `None`.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Session store read failed, treating as absent");
                None
            }
        }
    }

    /// Write a key. Returns whether the write landed; failures are logged.
    pub fn set(&self, key: &str, value: &str) -> bool {
        match self.storage.set(key, value) {
            Ok(()) => {
                debug!(key, "Session store key written");
                self.publish(key, ChangeKind::Set);
                true
            }
            Err(e) => {
                warn!(key, error = %e, "Session store write failed");
                false
            }
        }
    }

    /// Delete a key. Returns whether the delete landed; failures are logged.
    pub fn remove(&self, key: &str) -> bool {
        match self.storage.delete(key) {
            Ok(existed) => {
                if existed {
                    debug!(key, "Session store key removed");
                    self.publish(key, ChangeKind::Removed);
                }
                true
            }
            Err(e) => {
                warn!(key, error = %e, "Session store delete failed");
                false
            }
        }
    }

    fn publish(&self, key: &str, kind: ChangeKind) {
        // No subscribers is fine.
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
            kind,
        });
    }

    // ==========================================
    // Auth cache
    // ==========================================

    /// Cached "is authenticated" flag from the last run.
    pub fn auth_cache(&self) -> Option<bool> {
        self.get(StorageKeys::AUTH_CACHE)
            .and_then(|value| match value.trim() {
                "true" => Some(true),
                "false" => Some(false),
                other => {
                    debug!(value = other, "Ignoring unrecognized auth cache value");
                    None
                }
            })
    }

    pub fn set_auth_cache(&self, authenticated: bool) -> bool {
        self.set(StorageKeys::AUTH_CACHE, if authenticated { "true" } else { "false" })
    }

    // ==========================================
    // Alternate identity
    // ==========================================

    /// The alternate token, if present and non-empty.
    pub fn alternate_token(&self) -> Option<String> {
        self.get(StorageKeys::ALT_TOKEN)
            .filter(|token| is_usable_token(token))
    }

    /// The full alternate credential, if a usable token is stored.
    pub fn alternate_credential(&self) -> Option<AlternateCredential> {
        let token = self.alternate_token()?;
        Some(AlternateCredential::new(
            token,
            self.get(StorageKeys::ALT_EMAIL),
            self.get(StorageKeys::ALT_DISPLAY_NAME),
        ))
    }

    /// Store an alternate credential.
    ///
    /// Profile fields go first and the token last, so an observer that sees
    /// the token also sees the profile written alongside it.
    pub fn set_alternate_credential(&self, credential: &AlternateCredential) -> bool {
        let mut ok = true;
        ok &= self.set_or_remove(StorageKeys::ALT_EMAIL, credential.email.as_deref());
        ok &= self.set_or_remove(
            StorageKeys::ALT_DISPLAY_NAME,
            credential.display_name.as_deref(),
        );
        ok &= self.set(StorageKeys::ALT_TOKEN, &credential.token);
        ok
    }

    /// Remove the alternate credential, token first.
    pub fn clear_alternate_credential(&self) -> bool {
        let mut ok = true;
        ok &= self.remove(StorageKeys::ALT_TOKEN);
        ok &= self.remove(StorageKeys::ALT_EMAIL);
        ok &= self.remove(StorageKeys::ALT_DISPLAY_NAME);
        ok
    }

    fn set_or_remove(&self, key: &str, value: Option<&str>) -> bool {
        match value {
            Some(value) => self.set(key, value),
            None => self.remove(key),
        }
    }

    // ==========================================
    // Active identity preference
    // ==========================================

    /// Stored identity preference; missing or unknown values read as `Unset`.
    pub fn active_identity_preference(&self) -> ActiveIdentitySelector {
        self.get(StorageKeys::ACTIVE_IDENTITY_PREFERENCE)
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }

    pub fn set_active_identity_preference(&self, selector: ActiveIdentitySelector) -> bool {
        self.set(StorageKeys::ACTIVE_IDENTITY_PREFERENCE, selector.as_str())
    }

    // ==========================================
    // Sign-out
    // ==========================================

    /// Remove every session key. Returns false if any removal failed.
    pub fn clear_session(&self) -> bool {
        let mut ok = true;
        for key in StorageKeys::ALL {
            ok &= self.remove(key);
        }
        ok
    }
}
