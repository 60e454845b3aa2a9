//! Identity session manager
//!
//! Single source of truth for "who is the current user and is their
//! credential valid." Owns the session state machine
//! (`Uninitialized → Restoring → Authenticated/Unauthenticated`, with
//! `Refreshing` in between) and the only write access to the credential
//! store.
//!
//! # Key invariants
//!
//! - At most one refresh exchange is in flight at a time. Concurrent
//!   callers collapse into it and all receive the same resulting session.
//! - Logout always succeeds locally, even when the provider's sign-out
//!   call fails, and interrupts an in-flight refresh: a refresh that
//!   resolves after logout is discarded, never applied.
//! - Authentication-class rejections clear storage immediately; there is
//!   no "maybe still logged in" state. Transient network errors never
//!   force a logout.
//!
//! The epoch counter makes both of the refresh invariants cheap: every
//! applied state change bumps it, and a refresh only applies its result if
//! the epoch it started from is still current.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::exchange::{ExchangeRequest, SessionBackend};
use super::provider::{map_provider_failure, IdentityProvider, ProviderIdentity};
use super::session::{Registration, Session, SessionPhase, SessionSnapshot};
use super::validate;
use crate::credentials::{CredentialStore, StoredCredentialSet, UserSnapshot};
use crate::error::{AuthError, ValidationError};

struct ManagerState {
    phase: SessionPhase,
    session: Option<Session>,
    /// Bumped on every applied auth state change (login, logout, applied
    /// refresh). A stale epoch means the world moved on.
    epoch: u64,
}

/// Read-only subscription to session state.
///
/// A late subscriber observes the current state immediately via
/// [`SessionEvents::current`]; dropping the subscription releases it — no
/// manual listener cleanup.
pub struct SessionEvents {
    rx: watch::Receiver<SessionSnapshot>,
}

impl SessionEvents {
    /// The state as of now, delivered without waiting for a transition.
    pub fn current(&self) -> SessionSnapshot {
        self.rx.borrow().clone()
    }

    /// Completes at the next state change with the new snapshot. Returns
    /// `None` once the manager is gone.
    pub async fn changed(&mut self) -> Option<SessionSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// Owns the authentication lifecycle.
///
/// Constructed once with its collaborators injected; no ambient globals.
pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    backend: Arc<dyn SessionBackend>,
    store: Arc<dyn CredentialStore>,
    state: Mutex<ManagerState>,
    changes: watch::Sender<SessionSnapshot>,
    /// Serializes refresh attempts; see module docs.
    refresh_gate: Mutex<()>,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        backend: Arc<dyn SessionBackend>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        let (changes, _) = watch::channel(SessionSnapshot::initial());
        Self {
            provider,
            backend,
            store,
            state: Mutex::new(ManagerState {
                phase: SessionPhase::Uninitialized,
                session: None,
                epoch: 0,
            }),
            changes,
            refresh_gate: Mutex::new(()),
        }
    }

    /// Subscribe to session state. The current state is observable
    /// immediately; subscribers added after a transition do not wait for
    /// the next one.
    pub fn subscribe(&self) -> SessionEvents {
        SessionEvents {
            rx: self.changes.subscribe(),
        }
    }

    /// The current snapshot without subscribing.
    pub fn current(&self) -> SessionSnapshot {
        self.changes.borrow().clone()
    }

    fn publish(&self, state: &ManagerState) {
        self.changes.send_replace(SessionSnapshot {
            phase: state.phase,
            session: state.session.clone(),
        });
    }

    /// Attempt silent session restoration from the credential store.
    ///
    /// Runs once at process start. An empty or corrupt record, or an
    /// authentication-class rejection of the verification exchange, lands
    /// in `Unauthenticated`. A transient network failure also lands in
    /// `Unauthenticated` but keeps the stored record and returns the error
    /// so the caller may retry.
    pub async fn restore(&self) -> Result<SessionSnapshot, AuthError> {
        {
            let mut state = self.state.lock().await;
            if state.session.is_some() || state.phase == SessionPhase::Restoring {
                return Ok(self.current());
            }
            state.phase = SessionPhase::Restoring;
            self.publish(&state);
        }

        let stored = match self.store.read() {
            Ok(stored) => stored,
            Err(err) => {
                warn!(error = %err, "credential read failed during restore");
                None
            }
        };

        let set = match stored {
            Some(set) if set.is_complete() => set,
            Some(_) => {
                warn!("partial credential record, forcing re-authentication");
                if let Err(err) = self.store.clear() {
                    warn!(error = %err, "failed to clear corrupt credential record");
                }
                return Ok(self.enter_unauthenticated().await);
            }
            None => {
                debug!("no stored credentials, starting unauthenticated");
                return Ok(self.enter_unauthenticated().await);
            }
        };

        let request = ExchangeRequest {
            identity_token: set.identity_token.clone(),
            provider_user_id: set.user_snapshot.identity_id.clone(),
            email: set.user_snapshot.email.clone(),
            display_name: set.user_snapshot.display_name.clone(),
        };

        match self.backend.exchange(&request).await {
            Ok(session_token) => {
                let identity = ProviderIdentity {
                    user_id: set.user_snapshot.identity_id,
                    email: set.user_snapshot.email,
                    display_name: set.user_snapshot.display_name,
                    identity_token: set.identity_token,
                };
                let session = self.install_session(identity, session_token).await?;
                info!(identity_id = %session.identity_id, "session restored");
                Ok(self.current())
            }
            Err(err) if err.invalidates_session() => {
                info!("stored credentials rejected, forcing re-authentication");
                if let Err(clear_err) = self.store.clear() {
                    warn!(error = %clear_err, "failed to clear rejected credential record");
                }
                Ok(self.enter_unauthenticated().await)
            }
            Err(err) => {
                // Transient failure: stored credentials stay for a later
                // retry, but the process starts unauthenticated.
                warn!(error = %err, "restore verification unavailable");
                self.enter_unauthenticated().await;
                Err(err)
            }
        }
    }

    /// Authenticate with raw credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        validate::login_input(email, password)?;

        let identity = self
            .provider
            .sign_in(email, password)
            .await
            .map_err(|f| map_provider_failure(&f))?;

        let request = self.exchange_request(&identity);
        let session_token = self.backend.exchange(&request).await?;
        let session = self.install_session(identity, session_token).await?;
        info!(identity_id = %session.identity_id, "logged in");
        Ok(session)
    }

    /// Create an account and authenticate.
    ///
    /// A failed display-name write is logged and registration proceeds with
    /// whatever the provider already has.
    pub async fn register(&self, profile: Registration) -> Result<Session, AuthError> {
        validate::registration_input(&profile)?;

        let mut identity = self
            .provider
            .sign_up(&profile.email, &profile.password)
            .await
            .map_err(|f| map_provider_failure(&f))?;

        match self.provider.set_display_name(&profile.username).await {
            Ok(()) => identity.display_name = profile.username.clone(),
            Err(failure) => {
                warn!(code = %failure.code, "display name not set, continuing registration");
            }
        }

        let request = self.exchange_request(&identity);
        let session_token = self.backend.exchange(&request).await?;
        let session = self.install_session(identity, session_token).await?;
        info!(identity_id = %session.identity_id, "registered");
        Ok(session)
    }

    /// Sign out. Always succeeds from the caller's point of view: the
    /// provider call is best-effort, local state and storage are cleared
    /// unconditionally, and subscribers are notified before returning.
    pub async fn logout(&self) {
        if let Err(failure) = self.provider.sign_out().await {
            warn!(code = %failure.code, "provider sign-out failed, clearing local session anyway");
        }

        let mut state = self.state.lock().await;
        if let Err(err) = self.store.clear() {
            warn!(error = %err, "failed to clear credential store on logout");
        }
        state.session = None;
        state.phase = SessionPhase::Unauthenticated;
        state.epoch += 1;
        self.publish(&state);
        info!("logged out");
    }

    /// Re-derive the session token from a fresh identity token.
    ///
    /// Concurrent callers collapse into a single exchange: whoever holds
    /// the gate does the network work, everyone queued behind it observes
    /// the epoch moved and returns the refreshed session without another
    /// round trip. This component does not self-retry; transient failures
    /// go back to the caller.
    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        let entry_epoch = { self.state.lock().await.epoch };
        let _gate = self.refresh_gate.lock().await;

        let (request, work_epoch) = {
            let mut state = self.state.lock().await;
            if state.epoch != entry_epoch {
                // Another caller's refresh (or a logout) settled our fate
                // while we queued.
                return match &state.session {
                    Some(session) => Ok(session.clone()),
                    None => Err(AuthError::InvalidCredentials),
                };
            }
            let session = match &state.session {
                Some(session) => session.clone(),
                None => return Err(AuthError::InvalidCredentials),
            };
            state.phase = SessionPhase::Refreshing;
            self.publish(&state);

            let request = ExchangeRequest {
                identity_token: String::new(), // filled once the provider answers
                provider_user_id: session.identity_id,
                email: session.email,
                display_name: session.display_name,
            };
            (request, state.epoch)
        };

        let identity_token = match self.provider.identity_token().await {
            Ok(token) => token,
            Err(failure) => {
                let err = map_provider_failure(&failure);
                return Err(self.fail_refresh(work_epoch, err).await);
            }
        };
        let request = ExchangeRequest {
            identity_token,
            ..request
        };

        let session_token = match self.backend.exchange(&request).await {
            Ok(token) => token,
            Err(err) => return Err(self.fail_refresh(work_epoch, err).await),
        };

        let mut state = self.state.lock().await;
        if state.epoch != work_epoch {
            debug!("discarding refresh that resolved after the session changed");
            return Err(AuthError::InvalidCredentials);
        }
        let current = match state.session.clone() {
            Some(session) => session,
            None => return Err(AuthError::InvalidCredentials),
        };
        let refreshed = Session {
            session_token: session_token.clone(),
            issued_at: Utc::now(),
            ..current
        };
        let set = StoredCredentialSet {
            session_token,
            identity_token: request.identity_token,
            user_snapshot: UserSnapshot {
                identity_id: refreshed.identity_id.clone(),
                email: refreshed.email.clone(),
                display_name: refreshed.display_name.clone(),
            },
        };
        if let Err(err) = self.store.write(&set) {
            warn!(error = %err, "refreshed credentials not persisted");
        }
        state.session = Some(refreshed.clone());
        state.phase = SessionPhase::Authenticated;
        state.epoch += 1;
        self.publish(&state);
        debug!("session refreshed");
        Ok(refreshed)
    }

    /// Return the current session, refreshing first when it is older than
    /// `max_age`. Within the freshness window this performs no network
    /// calls.
    pub async fn ensure_fresh(&self, max_age: Duration) -> Result<Session, AuthError> {
        {
            let state = self.state.lock().await;
            match &state.session {
                Some(session) => {
                    let age = (Utc::now() - session.issued_at)
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    if age < max_age {
                        return Ok(session.clone());
                    }
                }
                None => return Err(AuthError::InvalidCredentials),
            }
        }
        self.refresh_session().await
    }

    /// Ask the provider to send a password-reset message.
    pub async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        if email.trim().is_empty() {
            return Err(ValidationError::EmptyEmail.into());
        }
        self.provider
            .send_password_reset(email)
            .await
            .map_err(|f| map_provider_failure(&f))
    }

    fn exchange_request(&self, identity: &ProviderIdentity) -> ExchangeRequest {
        ExchangeRequest {
            identity_token: identity.identity_token.clone(),
            provider_user_id: identity.user_id.clone(),
            email: identity.email.clone(),
            display_name: identity.display_name.clone(),
        }
    }

    /// Persist the credential set and enter `Authenticated`.
    ///
    /// The store write happens under the state lock so a concurrent logout
    /// cannot interleave between persistence and the in-memory update.
    async fn install_session(
        &self,
        identity: ProviderIdentity,
        session_token: String,
    ) -> Result<Session, AuthError> {
        let session = Session {
            identity_id: identity.user_id,
            email: identity.email,
            display_name: identity.display_name,
            session_token: session_token.clone(),
            issued_at: Utc::now(),
        };
        let set = StoredCredentialSet {
            session_token,
            identity_token: identity.identity_token,
            user_snapshot: UserSnapshot {
                identity_id: session.identity_id.clone(),
                email: session.email.clone(),
                display_name: session.display_name.clone(),
            },
        };

        let mut state = self.state.lock().await;
        if let Err(err) = self.store.write(&set) {
            // No half state: a session we could not persist is not installed.
            state.session = None;
            state.phase = SessionPhase::Unauthenticated;
            state.epoch += 1;
            self.publish(&state);
            return Err(AuthError::Unknown(format!(
                "credential persistence failed: {}",
                err
            )));
        }
        state.session = Some(session.clone());
        state.phase = SessionPhase::Authenticated;
        state.epoch += 1;
        self.publish(&state);
        Ok(session)
    }

    async fn enter_unauthenticated(&self) -> SessionSnapshot {
        let mut state = self.state.lock().await;
        state.session = None;
        state.phase = SessionPhase::Unauthenticated;
        state.epoch += 1;
        self.publish(&state);
        self.current()
    }

    /// Settle a failed refresh: authentication-class errors invalidate the
    /// session and clear storage; transient errors put the phase back.
    async fn fail_refresh(&self, work_epoch: u64, err: AuthError) -> AuthError {
        let mut state = self.state.lock().await;
        if state.epoch != work_epoch {
            return err;
        }
        if err.invalidates_session() {
            warn!(error = %err, "refresh rejected, invalidating session");
            if let Err(clear_err) = self.store.clear() {
                warn!(error = %clear_err, "failed to clear credential store");
            }
            state.session = None;
            state.phase = SessionPhase::Unauthenticated;
            state.epoch += 1;
        } else {
            debug!(error = %err, "refresh failed transiently");
            state.phase = SessionPhase::Authenticated;
        }
        self.publish(&state);
        err
    }
}
