use snapsafe_session::{
    complete_alternate_login, IdentityProvider, LocalIdentityProvider, PrimaryUser,
    ProviderSubscription, ReconcilerConfig, ReconcilerHandle, Route, SessionEvent,
    SessionReconciler, SessionState, UserCallback,
};
use snapsafe_storage::{
    create_file_store, ActiveIdentitySelector, KeyValueStorage, MemoryStorage, SessionStore,
    StorageKeys,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const POLL: Duration = Duration::from_millis(1000);

/// A provider that never fires.
struct SilentProvider;

impl IdentityProvider for SilentProvider {
    fn subscribe(&self, _callback: UserCallback) -> ProviderSubscription {
        ProviderSubscription::noop()
    }
}

fn memory_store() -> (Arc<MemoryStorage>, Arc<SessionStore>) {
    let backend = Arc::new(MemoryStorage::new());
    let store = Arc::new(SessionStore::new(Box::new(backend.clone())));
    (backend, store)
}

fn spawn(store: &Arc<SessionStore>, provider: &dyn IdentityProvider) -> ReconcilerHandle {
    SessionReconciler::spawn(
        store.clone(),
        provider,
        ReconcilerConfig {
            poll_interval: POLL,
        },
    )
}

/// Let the reconciler task run, including store reads on the blocking pool.
///
/// With the clock paused, a sleep only completes once the runtime is idle
/// and no blocking task is in flight. One millisecond stays well clear of
/// the next poll tick.
async fn settle() {
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(1)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn login_redirects(events: &[SessionEvent]) -> usize {
    events
        .iter()
        .filter(|e| {
            matches!(
                e,
                SessionEvent::Redirect {
                    route: Route::Login
                }
            )
        })
        .count()
}

fn signed_in_as(identity: ActiveIdentitySelector) -> SessionState {
    SessionState {
        is_authenticated: Some(true),
        active_identity: identity,
    }
}

fn signed_out() -> SessionState {
    SessionState {
        is_authenticated: Some(false),
        active_identity: ActiveIdentitySelector::Unset,
    }
}

fn user(uid: &str) -> PrimaryUser {
    PrimaryUser::new(uid, Some(format!("{}@example.com", uid)))
}

#[tokio::test(start_paused = true)]
async fn null_user_without_token_redirects_exactly_once() {
    let (_backend, store) = memory_store();
    let provider = LocalIdentityProvider::new();
    let handle = spawn(&store, &provider);
    let mut events = handle.subscribe();

    settle().await;
    assert_eq!(handle.state(), signed_out());

    // Repeated identical inputs: another null from the provider and a few polls.
    provider.sign_out();
    tokio::time::sleep(POLL * 3).await;
    settle().await;

    let events = drain(&mut events);
    assert_eq!(login_redirects(&events), 1);
    assert_eq!(
        events.first(),
        Some(&SessionEvent::StateChanged {
            state: signed_out(),
            phase: snapsafe_session::SessionPhase::Unauthenticated,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn token_without_primary_authenticates_within_one_poll() {
    let (backend, store) = memory_store();
    let handle = spawn(&store, &SilentProvider);

    settle().await;
    assert_eq!(handle.state(), SessionState::default());

    // Written behind the store's back, so only the poll can see it.
    backend.set(StorageKeys::ALT_TOKEN, "abc123").unwrap();
    tokio::time::sleep(POLL).await;
    settle().await;

    assert_eq!(
        handle.state(),
        signed_in_as(ActiveIdentitySelector::Alternate)
    );
}

#[tokio::test(start_paused = true)]
async fn primary_wins_when_both_present() {
    let (_backend, store) = memory_store();
    store.set(StorageKeys::ALT_TOKEN, "abc123");
    let provider = LocalIdentityProvider::signed_in(user("u1"));
    let handle = spawn(&store, &provider);

    settle().await;
    assert_eq!(handle.state(), signed_in_as(ActiveIdentitySelector::Primary));

    tokio::time::sleep(POLL * 2).await;
    settle().await;
    assert_eq!(handle.state(), signed_in_as(ActiveIdentitySelector::Primary));

    provider.sign_out();
    settle().await;
    assert_eq!(
        handle.state(),
        signed_in_as(ActiveIdentitySelector::Alternate)
    );
}

#[tokio::test(start_paused = true)]
async fn primary_state_follows_latest_provider_event() {
    let (_backend, store) = memory_store();
    let provider = LocalIdentityProvider::new();
    let handle = spawn(&store, &provider);
    settle().await;

    provider.sign_in(user("u1"));
    settle().await;
    assert_eq!(handle.state(), signed_in_as(ActiveIdentitySelector::Primary));

    provider.sign_out();
    settle().await;
    assert_eq!(handle.state(), signed_out());

    provider.sign_in(user("u2"));
    settle().await;
    assert_eq!(handle.state(), signed_in_as(ActiveIdentitySelector::Primary));
}

#[tokio::test(start_paused = true)]
async fn removing_token_signs_out_within_one_poll() {
    let (backend, store) = memory_store();
    backend.set(StorageKeys::ALT_TOKEN, "abc123").unwrap();
    let handle = spawn(&store, &SilentProvider);
    let mut events = handle.subscribe();

    settle().await;
    assert_eq!(
        handle.state(),
        signed_in_as(ActiveIdentitySelector::Alternate)
    );

    backend.delete(StorageKeys::ALT_TOKEN).unwrap();
    tokio::time::sleep(POLL).await;
    settle().await;

    assert_eq!(handle.state(), signed_out());
    assert_eq!(login_redirects(&drain(&mut events)), 1);
}

#[tokio::test(start_paused = true)]
async fn store_notifications_apply_without_waiting_for_poll() {
    let (_backend, store) = memory_store();
    let provider = LocalIdentityProvider::new();
    let handle = spawn(&store, &provider);
    settle().await;
    assert_eq!(handle.state(), signed_out());

    complete_alternate_login(&store, "snapsafe://login?code=abc123&displayName=Reporter")
        .unwrap();
    settle().await;
    assert_eq!(
        handle.state(),
        signed_in_as(ActiveIdentitySelector::Alternate)
    );

    let mut events = handle.subscribe();
    store.clear_session();
    settle().await;
    assert_eq!(handle.state(), signed_out());
    assert_eq!(login_redirects(&drain(&mut events)), 1);
}

#[tokio::test(start_paused = true)]
async fn cached_flag_gives_provisional_state_immediately() {
    let (_backend, store) = memory_store();
    store.set_auth_cache(true);
    store.set_active_identity_preference(ActiveIdentitySelector::Primary);

    let handle = spawn(&store, &SilentProvider);
    // Before the task has run at all.
    assert_eq!(handle.state(), signed_in_as(ActiveIdentitySelector::Primary));

    // The silent provider and the empty store never confirm it.
    tokio::time::sleep(POLL * 2).await;
    settle().await;
    assert_eq!(handle.state(), signed_in_as(ActiveIdentitySelector::Primary));
}

#[tokio::test(start_paused = true)]
async fn stale_cache_is_overwritten_by_provider() {
    let (_backend, store) = memory_store();
    store.set_auth_cache(true);
    let provider = LocalIdentityProvider::new();

    let handle = spawn(&store, &provider);
    assert_eq!(handle.state().is_authenticated, Some(true));

    settle().await;
    assert_eq!(handle.state(), signed_out());

    handle.flush().await;
    assert_eq!(store.auth_cache(), Some(false));
}

#[tokio::test(start_paused = true)]
async fn determined_state_is_written_back() {
    let (_backend, store) = memory_store();
    store.set(StorageKeys::ALT_TOKEN, "abc123");
    let handle = spawn(&store, &SilentProvider);

    settle().await;
    handle.flush().await;

    assert_eq!(store.auth_cache(), Some(true));
    assert_eq!(
        store.active_identity_preference(),
        ActiveIdentitySelector::Alternate
    );
}

#[tokio::test(start_paused = true)]
async fn repeated_sign_in_publishes_once() {
    let (_backend, store) = memory_store();
    let provider = LocalIdentityProvider::signed_in(user("u1"));
    let handle = spawn(&store, &provider);
    let mut events = handle.subscribe();

    settle().await;
    provider.sign_in(user("u1"));
    settle().await;

    let events = drain(&mut events);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], SessionEvent::StateChanged { .. }));
}

#[tokio::test(start_paused = true)]
async fn unreadable_store_signs_out_alternate() {
    let (backend, store) = memory_store();
    backend.set(StorageKeys::ALT_TOKEN, "abc123").unwrap();
    let handle = spawn(&store, &SilentProvider);
    settle().await;
    assert_eq!(
        handle.state(),
        signed_in_as(ActiveIdentitySelector::Alternate)
    );

    backend.set_fail_reads(true);
    tokio::time::sleep(POLL).await;
    settle().await;
    assert_eq!(handle.state(), signed_out());
}

#[tokio::test(start_paused = true)]
async fn watch_state_notifies_changes() {
    let (_backend, store) = memory_store();
    let provider = LocalIdentityProvider::new();
    let handle = spawn(&store, &provider);
    let mut state_rx = handle.watch_state();

    settle().await;
    assert!(state_rx.has_changed().unwrap());
    assert_eq!(*state_rx.borrow_and_update(), signed_out());

    provider.sign_in(user("u1"));
    state_rx.changed().await.unwrap();
    assert_eq!(
        *state_rx.borrow(),
        signed_in_as(ActiveIdentitySelector::Primary)
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_unsubscribes_and_stops_polling() {
    let (backend, store) = memory_store();
    let provider = LocalIdentityProvider::new();
    let handle = spawn(&store, &provider);
    settle().await;
    assert_eq!(provider.subscriber_count(), 1);
    assert!(handle.is_running());

    let state_rx = handle.watch_state();
    handle.shutdown().await.unwrap();
    assert_eq!(provider.subscriber_count(), 0);

    backend.set(StorageKeys::ALT_TOKEN, "abc123").unwrap();
    tokio::time::sleep(POLL * 2).await;
    settle().await;
    assert_eq!(*state_rx.borrow(), signed_out());
}

#[tokio::test(start_paused = true)]
async fn dropping_handle_stops_reconciler() {
    let (_backend, store) = memory_store();
    let provider = LocalIdentityProvider::new();
    let handle = spawn(&store, &provider);
    settle().await;

    drop(handle);
    settle().await;
    assert_eq!(provider.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn login_in_another_process_is_picked_up_by_poll() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session_store.json");
    let store = Arc::new(create_file_store(&path));
    let provider = LocalIdentityProvider::new();
    let handle = spawn(&store, &provider);
    settle().await;
    assert_eq!(handle.state(), signed_out());

    let other_process = create_file_store(&path);
    complete_alternate_login(&other_process, "snapsafe://login?code=abc123").unwrap();
    settle().await;
    // No notification crosses the handle boundary.
    assert_eq!(handle.state(), signed_out());

    tokio::time::sleep(POLL).await;
    settle().await;
    assert_eq!(
        handle.state(),
        signed_in_as(ActiveIdentitySelector::Alternate)
    );
}

#[tokio::test]
async fn blocked_store_writes_do_not_stall_the_reconciler() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session_store.json");
    let store = Arc::new(create_file_store(&path));

    // Another process mid-write holds the store lock.
    let lock = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(dir.path().join(".session_store.json.lock"))
        .expect("lock file");
    fs2::FileExt::lock_exclusive(&lock).expect("lock");

    let provider = LocalIdentityProvider::new();
    let handle = spawn(&store, &provider);
    let mut state_rx = handle.watch_state();

    let wait = Duration::from_secs(5);
    tokio::time::timeout(wait, state_rx.wait_for(|state| *state == signed_out()))
        .await
        .expect("signed out while the write is pending")
        .unwrap();

    provider.sign_in(user("u1"));
    tokio::time::timeout(
        wait,
        state_rx.wait_for(|state| *state == signed_in_as(ActiveIdentitySelector::Primary)),
    )
    .await
    .expect("primary sign-in while the write is pending")
    .unwrap();
    assert_eq!(store.auth_cache(), None);

    fs2::FileExt::unlock(&lock).expect("unlock");
    handle.flush().await;
    assert_eq!(store.auth_cache(), Some(true));
}
