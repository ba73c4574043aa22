//! Subcommand implementations.

use anyhow::{bail, Context};
use serde::Serialize;
use snapsafe_config_and_utils::{Config, Paths};
use snapsafe_session::{
    complete_alternate_login, home_route, LocalIdentityProvider, PrimaryUser, Reconciler,
    ReconcilerConfig, Route, SessionEvent, SessionReconciler, SessionState,
};
use snapsafe_storage::{create_file_store, ActiveIdentitySelector, SessionStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// What `status` reports.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub store_file: PathBuf,
    pub auth_cache: Option<bool>,
    pub alternate: Option<AlternateSummary>,
    pub preference: ActiveIdentitySelector,
    /// State the reconciler would settle on if the primary provider reports
    /// no user.
    pub derived: SessionState,
    pub home: Route,
}

/// Alternate identity without its token.
#[derive(Debug, Serialize)]
pub struct AlternateSummary {
    pub email: Option<String>,
    pub display_name: Option<String>,
}

fn open_store(config: &Config, paths: &Paths) -> (PathBuf, SessionStore) {
    let path = config.store_file(paths);
    let store = create_file_store(&path);
    (path, store)
}

pub fn build_status(store: &SessionStore, store_file: &Path) -> StatusReport {
    let auth_cache = store.auth_cache();
    let preference = store.active_identity_preference();
    let alternate = store.alternate_credential();

    let mut core = Reconciler::new();
    core.load_cache(auth_cache, preference, alternate.is_some());
    core.primary_changed(None, alternate.as_ref());
    let derived = core.state();

    StatusReport {
        store_file: store_file.to_path_buf(),
        auth_cache,
        alternate: alternate.map(|cred| AlternateSummary {
            email: cred.email,
            display_name: cred.display_name,
        }),
        preference,
        derived,
        home: home_route(&derived),
    }
}

pub fn status(config: &Config, paths: &Paths, json: bool) -> anyhow::Result<()> {
    let (path, store) = open_store(config, paths);
    let report = build_status(&store, &path);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Store:       {}", report.store_file.display());
    println!(
        "Auth cache:  {}",
        match report.auth_cache {
            Some(true) => "signed in",
            Some(false) => "signed out",
            None => "none",
        }
    );
    match &report.alternate {
        Some(alt) => println!(
            "Alternate:   {} <{}>",
            alt.display_name.as_deref().unwrap_or("(no name)"),
            alt.email.as_deref().unwrap_or("no email")
        ),
        None => println!("Alternate:   none"),
    }
    println!("Preference:  {}", report.preference);
    println!(
        "Derived:     {} as {} (home: {})",
        if report.derived.is_authenticated() {
            "authenticated"
        } else {
            "unauthenticated"
        },
        report.derived.active_identity,
        report.home
    );
    Ok(())
}

pub fn complete_login(config: &Config, paths: &Paths, redirect_url: &str) -> anyhow::Result<()> {
    let (path, store) = open_store(config, paths);
    let credential = complete_alternate_login(&store, redirect_url)
        .with_context(|| format!("Could not complete login into {}", path.display()))?;

    println!(
        "Signed in with alternate identity{}",
        credential
            .display_name
            .as_deref()
            .or(credential.email.as_deref())
            .map(|who| format!(" as {}", who))
            .unwrap_or_default()
    );
    Ok(())
}

pub fn sign_out(config: &Config, paths: &Paths) -> anyhow::Result<()> {
    let (path, store) = open_store(config, paths);
    if !store.clear_session() {
        bail!("Some session keys could not be removed from {}", path.display());
    }
    info!(store = %path.display(), "Session cleared");
    println!("Signed out");
    Ok(())
}

pub async fn watch(
    config: &Config,
    paths: &Paths,
    signed_in_as: Option<String>,
) -> anyhow::Result<()> {
    let (_path, store) = open_store(config, paths);
    let store = Arc::new(store);

    let provider = match signed_in_as {
        Some(uid) => LocalIdentityProvider::signed_in(PrimaryUser::new(uid, None)),
        None => LocalIdentityProvider::new(),
    };

    let handle = SessionReconciler::spawn(
        store,
        &provider,
        ReconcilerConfig {
            poll_interval: config.poll_interval(),
        },
    );
    let mut events = handle.subscribe();
    println!(
        "{}",
        serde_json::json!({ "type": "initial_state", "state": handle.state() })
    );

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => print_event(&event)?,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Dropped session events");
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle
        .shutdown()
        .await
        .context("Session reconciler did not stop cleanly")?;
    Ok(())
}

fn print_event(event: &SessionEvent) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}
