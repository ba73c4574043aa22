//! Completion of the alternate (external) login flow.
//!
//! The identity service redirects back with `code`, `email` and
//! `displayName` query parameters. The code is stored as the alternate
//! token.

use crate::error::{AltLoginError, SessionError, SessionResult};
use snapsafe_storage::{ActiveIdentitySelector, AlternateCredential, SessionStore};
use std::collections::HashMap;
use tracing::{info, warn};
use url::Url;

/// Build an `AlternateCredential` from a login redirect.
pub trait RedirectCredential: Sized {
    fn from_redirect_url(redirect: &str) -> Result<Self, AltLoginError>;
}

impl RedirectCredential for AlternateCredential {
    fn from_redirect_url(redirect: &str) -> Result<Self, AltLoginError> {
        let url = Url::parse(redirect)?;
        let mut params: HashMap<String, String> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        // Some providers answer in the fragment instead of the query. Query
        // values win on conflict.
        if !params.contains_key("code") {
            if let Some(fragment) = url.fragment() {
                for (k, v) in url::form_urlencoded::parse(fragment.as_bytes()) {
                    params.entry(k.into_owned()).or_insert_with(|| v.into_owned());
                }
            }
        }

        if let Some(error) = params.get("error") {
            let detail = params
                .get("error_description")
                .map(|d| format!("{}: {}", error, d))
                .unwrap_or_else(|| error.clone());
            return Err(AltLoginError::Rejected(detail));
        }

        let credential = AlternateCredential::new(
            params.remove("code").unwrap_or_default(),
            params.remove("email"),
            params.remove("displayName"),
        );
        if !credential.is_usable() {
            return Err(AltLoginError::MissingCode);
        }
        Ok(credential)
    }
}

/// Store the credential carried by `redirect` and prefer the alternate
/// identity from now on.
///
/// A running reconciler picks the change up through the store's change
/// notifications (same process) or its poll (other processes).
pub fn complete_alternate_login(
    store: &SessionStore,
    redirect: &str,
) -> SessionResult<AlternateCredential> {
    let credential = AlternateCredential::from_redirect_url(redirect).map_err(|e| {
        warn!(error = %e, "Alternate login redirect rejected");
        e
    })?;

    if !store.set_alternate_credential(&credential) {
        return Err(SessionError::StoreWrite("alternate credential".to_string()));
    }
    if !store.set_active_identity_preference(ActiveIdentitySelector::Alternate) {
        return Err(SessionError::StoreWrite(
            "active identity preference".to_string(),
        ));
    }

    info!(
        has_email = credential.email.is_some(),
        has_display_name = credential.display_name.is_some(),
        "Alternate login completed"
    );
    Ok(credential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapsafe_storage::{MemoryStorage, StorageKeys};
    use std::sync::Arc;

    #[test]
    fn test_full_redirect() {
        let cred = AlternateCredential::from_redirect_url(
            "snapsafe://login?code=abc123&email=reporter%40example.com&displayName=Night%20Shift",
        )
        .unwrap();
        assert_eq!(cred.token, "abc123");
        assert_eq!(cred.email.as_deref(), Some("reporter@example.com"));
        assert_eq!(cred.display_name.as_deref(), Some("Night Shift"));
    }

    #[test]
    fn test_code_only() {
        let cred = AlternateCredential::from_redirect_url("https://app.example.com/cb?code=xyz")
            .unwrap();
        assert_eq!(cred.token, "xyz");
        assert!(cred.email.is_none());
        assert!(cred.display_name.is_none());
    }

    #[test]
    fn test_fragment_params() {
        let cred =
            AlternateCredential::from_redirect_url("snapsafe://login#code=frag&email=a%40b.c")
                .unwrap();
        assert_eq!(cred.token, "frag");
        assert_eq!(cred.email.as_deref(), Some("a@b.c"));
    }

    #[test]
    fn test_fragment_code_with_unrelated_query() {
        let cred = AlternateCredential::from_redirect_url(
            "snapsafe://login?state=x&email=q%40b.c#code=abc&email=f%40b.c",
        )
        .unwrap();
        assert_eq!(cred.token, "abc");
        assert_eq!(cred.email.as_deref(), Some("q@b.c"));
    }

    #[test]
    fn test_missing_or_blank_code() {
        assert!(matches!(
            AlternateCredential::from_redirect_url("snapsafe://login?email=a%40b.c"),
            Err(AltLoginError::MissingCode)
        ));
        assert!(matches!(
            AlternateCredential::from_redirect_url("snapsafe://login?code="),
            Err(AltLoginError::MissingCode)
        ));
    }

    #[test]
    fn test_error_param() {
        let err = AlternateCredential::from_redirect_url(
            "snapsafe://login?error=access_denied&error_description=user%20cancelled",
        )
        .unwrap_err();
        match err {
            AltLoginError::Rejected(detail) => {
                assert_eq!(detail, "access_denied: user cancelled")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            AlternateCredential::from_redirect_url("not a url"),
            Err(AltLoginError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_complete_login_stores_credential_and_preference() {
        let store = SessionStore::new(Box::new(MemoryStorage::new()));

        let cred = complete_alternate_login(&store, "snapsafe://login?code=abc123").unwrap();

        assert_eq!(store.alternate_credential(), Some(cred));
        assert_eq!(
            store.active_identity_preference(),
            ActiveIdentitySelector::Alternate
        );
    }

    #[test]
    fn test_complete_login_rejection_leaves_store_untouched() {
        let store = SessionStore::new(Box::new(MemoryStorage::new()));

        let err = complete_alternate_login(&store, "snapsafe://login?error=denied").unwrap_err();
        assert!(err.is_login_failure());
        assert!(store.get(StorageKeys::ALT_TOKEN).is_none());
    }

    #[test]
    fn test_complete_login_reports_write_failure() {
        let backend = Arc::new(MemoryStorage::new());
        let store = SessionStore::new(Box::new(backend.clone()));
        backend.set_fail_writes(true);

        let err = complete_alternate_login(&store, "snapsafe://login?code=abc123").unwrap_err();
        assert!(matches!(err, SessionError::StoreWrite(_)));
    }
}
