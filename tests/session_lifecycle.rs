//! Integration tests for the identity session lifecycle
//!
//! These drive the session manager against scripted provider/backend
//! collaborators — no network required.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use pavilion_client::credentials::{CredentialStore, MemoryCredentialStore, StoredCredentialSet, UserSnapshot};
use pavilion_client::error::AuthError;
use pavilion_client::identity::{
    ExchangeRequest, IdentityProvider, ProviderFailure, ProviderIdentity, Registration,
    SessionBackend, SessionManager, SessionPhase,
};

// =============================================================================
// Scripted collaborators
// =============================================================================

#[derive(Default)]
struct StubProvider {
    sign_in_calls: AtomicUsize,
    identity_token_calls: AtomicUsize,
    sign_in_error: Option<ProviderFailure>,
    display_name_fails: bool,
    sign_out_fails: bool,
}

fn identity_for(email: &str) -> ProviderIdentity {
    ProviderIdentity {
        user_id: "user-1".into(),
        email: email.into(),
        display_name: "Opening Bat".into(),
        identity_token: "idtok-1".into(),
    }
}

#[async_trait]
impl IdentityProvider for StubProvider {
    async fn sign_in(
        &self,
        email: &str,
        _password: &str,
    ) -> Result<ProviderIdentity, ProviderFailure> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        match &self.sign_in_error {
            Some(failure) => Err(failure.clone()),
            None => Ok(identity_for(email)),
        }
    }

    async fn sign_up(
        &self,
        email: &str,
        _password: &str,
    ) -> Result<ProviderIdentity, ProviderFailure> {
        Ok(identity_for(email))
    }

    async fn set_display_name(&self, _display_name: &str) -> Result<(), ProviderFailure> {
        if self.display_name_fails {
            Err(ProviderFailure::new("auth/internal-error", "profile service down"))
        } else {
            Ok(())
        }
    }

    async fn sign_out(&self) -> Result<(), ProviderFailure> {
        if self.sign_out_fails {
            Err(ProviderFailure::new("auth/network-request-failed", "offline"))
        } else {
            Ok(())
        }
    }

    async fn send_password_reset(&self, _email: &str) -> Result<(), ProviderFailure> {
        Ok(())
    }

    async fn identity_token(&self) -> Result<String, ProviderFailure> {
        self.identity_token_calls.fetch_add(1, Ordering::SeqCst);
        Ok("idtok-fresh".into())
    }
}

/// Backend whose `exchange` can be held open mid-flight via the gate.
/// Gating starts at `gate_from_call` (1-indexed) so the login exchange runs
/// through ungated.
#[derive(Default)]
struct StubBackend {
    exchange_calls: AtomicUsize,
    responses: Mutex<VecDeque<Result<String, AuthError>>>,
    entered: Notify,
    release: Option<Notify>,
    gate_from_call: usize,
}

impl StubBackend {
    fn gated_after_first() -> Self {
        Self {
            release: Some(Notify::new()),
            gate_from_call: 2,
            ..Default::default()
        }
    }

    fn respond_with(responses: Vec<Result<String, AuthError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    fn release_one(&self) {
        self.release
            .as_ref()
            .expect("backend is not gated")
            .notify_one();
    }
}

#[async_trait]
impl SessionBackend for StubBackend {
    async fn exchange(&self, _request: &ExchangeRequest) -> Result<String, AuthError> {
        let call = self.exchange_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(release) = &self.release {
            if call >= self.gate_from_call {
                self.entered.notify_one();
                release.notified().await;
            }
        }
        let scripted = self.responses.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(format!("sess-{}", call)),
        }
    }
}

fn manager_with(
    provider: Arc<StubProvider>,
    backend: Arc<StubBackend>,
) -> (Arc<SessionManager>, Arc<MemoryCredentialStore>) {
    let store = Arc::new(MemoryCredentialStore::new());
    let manager = Arc::new(SessionManager::new(provider, backend, store.clone()));
    (manager, store)
}

fn stored_set() -> StoredCredentialSet {
    StoredCredentialSet {
        session_token: "sess-old".into(),
        identity_token: "idtok-old".into(),
        user_snapshot: UserSnapshot {
            identity_id: "user-1".into(),
            email: "a@b.com".into(),
            display_name: "Opening Bat".into(),
        },
    }
}

// =============================================================================
// Login / registration
// =============================================================================

#[tokio::test]
async fn test_login_establishes_session_and_persists() {
    let provider = Arc::new(StubProvider::default());
    let backend = Arc::new(StubBackend::default());
    let (manager, store) = manager_with(provider, backend.clone());

    let session = manager.login("a@b.com", "secret12").await.unwrap();
    assert_eq!(session.session_token, "sess-1");
    assert_eq!(session.email, "a@b.com");
    assert_eq!(backend.calls(), 1);

    let stored = store.read().unwrap().unwrap();
    assert!(stored.is_complete());
    assert_eq!(stored.session_token, "sess-1");
    assert_eq!(stored.identity_token, "idtok-1");

    let snapshot = manager.current();
    assert_eq!(snapshot.phase, SessionPhase::Authenticated);
    assert!(snapshot.is_authenticated());
}

#[tokio::test]
async fn test_invalid_input_fails_before_any_network_call() {
    let provider = Arc::new(StubProvider::default());
    let backend = Arc::new(StubBackend::default());
    let (manager, _store) = manager_with(provider.clone(), backend.clone());

    assert!(matches!(
        manager.login("", "secret12").await,
        Err(AuthError::Invalid(_))
    ));
    assert!(matches!(
        manager.login("a@b.com", "short").await,
        Err(AuthError::Invalid(_))
    ));
    assert_eq!(provider.sign_in_calls.load(Ordering::SeqCst), 0);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_provider_rejection_maps_to_closed_error_set() {
    let provider = Arc::new(StubProvider {
        sign_in_error: Some(ProviderFailure::new("auth/wrong-password", "nope")),
        ..Default::default()
    });
    let backend = Arc::new(StubBackend::default());
    let (manager, store) = manager_with(provider, backend);

    let result = manager.login("a@b.com", "secret12").await;
    assert_eq!(result.unwrap_err(), AuthError::InvalidCredentials);
    assert_eq!(store.read().unwrap(), None);
    assert!(!manager.current().is_authenticated());
}

#[tokio::test]
async fn test_registration_survives_display_name_failure() {
    let provider = Arc::new(StubProvider {
        display_name_fails: true,
        ..Default::default()
    });
    let backend = Arc::new(StubBackend::default());
    let (manager, _store) = manager_with(provider, backend);

    let session = manager
        .register(Registration {
            email: "a@b.com".into(),
            password: "secret12".into(),
            username: "allrounder".into(),
            age: 27,
        })
        .await
        .unwrap();

    // Registration went through with whatever the provider already had.
    assert_eq!(session.display_name, "Opening Bat");
    assert!(manager.current().is_authenticated());
}

// =============================================================================
// Subscription
// =============================================================================

#[tokio::test]
async fn test_late_subscriber_receives_current_state_immediately() {
    let provider = Arc::new(StubProvider::default());
    let backend = Arc::new(StubBackend::default());
    let (manager, _store) = manager_with(provider, backend);

    manager.login("a@b.com", "secret12").await.unwrap();

    // Subscribed after the transition; no new transition required.
    let events = manager.subscribe();
    let snapshot = events.current();
    assert!(snapshot.is_authenticated());
    assert_eq!(
        snapshot.session.unwrap().session_token,
        "sess-1"
    );
}

#[tokio::test]
async fn test_subscriber_observes_logout_transition() {
    let provider = Arc::new(StubProvider::default());
    let backend = Arc::new(StubBackend::default());
    let (manager, _store) = manager_with(provider, backend);

    manager.login("a@b.com", "secret12").await.unwrap();
    let mut events = manager.subscribe();

    manager.logout().await;
    let snapshot = events.changed().await.unwrap();
    assert!(!snapshot.is_authenticated());
    assert_eq!(snapshot.phase, SessionPhase::Unauthenticated);
}

// =============================================================================
// Refresh
// =============================================================================

#[tokio::test]
async fn test_concurrent_refreshes_collapse_into_one_exchange() {
    let provider = Arc::new(StubProvider::default());
    let backend = Arc::new(StubBackend::gated_after_first());
    let (manager, _store) = manager_with(provider.clone(), backend.clone());

    manager.login("a@b.com", "secret12").await.unwrap();
    let calls_after_login = backend.calls();

    // First caller enters the exchange and is held there...
    let first = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.refresh_session().await }
    });
    backend.entered.notified().await;

    // ...while the rest queue up behind the refresh gate.
    let mut rest = Vec::new();
    for _ in 0..4 {
        let manager = Arc::clone(&manager);
        rest.push(tokio::spawn(async move { manager.refresh_session().await }));
    }
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    backend.release_one();

    let session = first.await.unwrap().unwrap();
    for task in rest {
        let queued = task.await.unwrap().unwrap();
        assert_eq!(queued.session_token, session.session_token);
    }

    // Exactly one exchange for all five callers.
    assert_eq!(backend.calls() - calls_after_login, 1);
    assert_eq!(provider.identity_token_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_auth_class_refresh_failure_invalidates_session() {
    let provider = Arc::new(StubProvider::default());
    let backend = Arc::new(StubBackend::respond_with(vec![
        Ok("sess-1".into()),
        Err(AuthError::InvalidCredentials),
    ]));
    let (manager, store) = manager_with(provider, backend);

    manager.login("a@b.com", "secret12").await.unwrap();

    let result = manager.refresh_session().await;
    assert_eq!(result.unwrap_err(), AuthError::InvalidCredentials);

    // No ambiguous "maybe still logged in" state.
    assert!(!manager.current().is_authenticated());
    assert_eq!(store.read().unwrap(), None);
}

#[tokio::test]
async fn test_transient_refresh_failure_keeps_session() {
    let provider = Arc::new(StubProvider::default());
    let backend = Arc::new(StubBackend::respond_with(vec![
        Ok("sess-1".into()),
        Err(AuthError::NetworkUnavailable),
    ]));
    let (manager, store) = manager_with(provider, backend);

    manager.login("a@b.com", "secret12").await.unwrap();

    let result = manager.refresh_session().await;
    assert_eq!(result.unwrap_err(), AuthError::NetworkUnavailable);

    // Transient failures never force a logout.
    let snapshot = manager.current();
    assert!(snapshot.is_authenticated());
    assert_eq!(snapshot.phase, SessionPhase::Authenticated);
    assert!(store.read().unwrap().is_some());
}

#[tokio::test]
async fn test_logout_during_refresh_discards_stale_result() {
    let provider = Arc::new(StubProvider::default());
    let backend = Arc::new(StubBackend::gated_after_first());
    let (manager, store) = manager_with(provider, backend.clone());

    let session = manager.login("a@b.com", "secret12").await.unwrap();
    assert!(!session.session_token.is_empty());

    // Refresh suspends inside the exchange...
    let refresh = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.refresh_session().await }
    });
    backend.entered.notified().await;

    // ...logout lands first and wins immediately.
    manager.logout().await;
    assert!(!manager.current().is_authenticated());
    assert_eq!(store.read().unwrap(), None);

    // The stale refresh resolves afterwards and must be discarded.
    backend.release_one();
    let result = refresh.await.unwrap();
    assert!(result.is_err());
    assert!(!manager.current().is_authenticated());
    assert_eq!(store.read().unwrap(), None);
}

#[tokio::test]
async fn test_logout_succeeds_even_when_provider_signout_fails() {
    let provider = Arc::new(StubProvider {
        sign_out_fails: true,
        ..Default::default()
    });
    let backend = Arc::new(StubBackend::default());
    let (manager, store) = manager_with(provider, backend);

    manager.login("a@b.com", "secret12").await.unwrap();
    manager.logout().await;

    assert!(!manager.current().is_authenticated());
    assert_eq!(store.read().unwrap(), None);
}

#[tokio::test]
async fn test_ensure_fresh_skips_network_within_window() {
    let provider = Arc::new(StubProvider::default());
    let backend = Arc::new(StubBackend::default());
    let (manager, _store) = manager_with(provider.clone(), backend.clone());

    manager.login("a@b.com", "secret12").await.unwrap();
    let calls_after_login = backend.calls();

    let session = manager
        .ensure_fresh(std::time::Duration::from_secs(3600))
        .await
        .unwrap();
    assert_eq!(session.session_token, "sess-1");
    assert_eq!(backend.calls(), calls_after_login);

    // A zero window forces the refresh path.
    let session = manager.ensure_fresh(std::time::Duration::ZERO).await.unwrap();
    assert_eq!(session.session_token, "sess-2");
    assert_eq!(backend.calls(), calls_after_login + 1);
}

// =============================================================================
// Restore
// =============================================================================

#[tokio::test]
async fn test_restore_with_empty_store_is_unauthenticated() {
    let provider = Arc::new(StubProvider::default());
    let backend = Arc::new(StubBackend::default());
    let (manager, _store) = manager_with(provider, backend.clone());

    let snapshot = manager.restore().await.unwrap();
    assert!(!snapshot.is_authenticated());
    assert_eq!(snapshot.phase, SessionPhase::Unauthenticated);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_restore_with_partial_record_forces_reauthentication() {
    let provider = Arc::new(StubProvider::default());
    let backend = Arc::new(StubBackend::default());
    let (manager, store) = manager_with(provider, backend.clone());

    let mut partial = stored_set();
    partial.identity_token.clear();
    store.write(&partial).unwrap();

    let snapshot = manager.restore().await.unwrap();
    assert!(!snapshot.is_authenticated());
    // The corrupt record is gone, and no verification was attempted.
    assert_eq!(store.read().unwrap(), None);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_restore_with_valid_record_reauthenticates() {
    let provider = Arc::new(StubProvider::default());
    let backend = Arc::new(StubBackend::default());
    let (manager, store) = manager_with(provider, backend.clone());

    store.write(&stored_set()).unwrap();

    let snapshot = manager.restore().await.unwrap();
    assert!(snapshot.is_authenticated());
    let session = snapshot.session.unwrap();
    assert_eq!(session.email, "a@b.com");
    assert_eq!(session.session_token, "sess-1");
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_restore_rejection_clears_stored_credentials() {
    let provider = Arc::new(StubProvider::default());
    let backend = Arc::new(StubBackend::respond_with(vec![Err(
        AuthError::InvalidCredentials,
    )]));
    let (manager, store) = manager_with(provider, backend);

    store.write(&stored_set()).unwrap();

    let snapshot = manager.restore().await.unwrap();
    assert!(!snapshot.is_authenticated());
    assert_eq!(store.read().unwrap(), None);
}

#[tokio::test]
async fn test_restore_transient_failure_keeps_stored_credentials() {
    let provider = Arc::new(StubProvider::default());
    let backend = Arc::new(StubBackend::respond_with(vec![Err(
        AuthError::NetworkUnavailable,
    )]));
    let (manager, store) = manager_with(provider, backend);

    store.write(&stored_set()).unwrap();

    let result = manager.restore().await;
    assert_eq!(result.unwrap_err(), AuthError::NetworkUnavailable);
    assert!(!manager.current().is_authenticated());
    // The record survives for a later retry.
    assert!(store.read().unwrap().is_some());
}
