//! Session types
//!
//! A `Session` only exists while the backend has confirmed the user's
//! identity; holding one means the session token it carries was valid when
//! issued. The manager owns the only mutable copy — everything else sees
//! read-only snapshots through the subscription.

use chrono::{DateTime, Utc};

/// Backend-confirmed identity of the current user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque id assigned by the identity provider.
    pub identity_id: String,
    pub email: String,
    pub display_name: String,
    /// Backend-issued bearer credential.
    pub session_token: String,
    pub issued_at: DateTime<Utc>,
}

/// Lifecycle phase of the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Restoring,
    Authenticated,
    Refreshing,
    Unauthenticated,
}

/// What subscribers observe: the full session tuple at a point in time.
///
/// The session stays present through `Refreshing` — the previous token
/// remains the bearer credential until the refresh settles.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub session: Option<Session>,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub(crate) fn initial() -> Self {
        Self {
            phase: SessionPhase::Uninitialized,
            session: None,
        }
    }
}

/// Profile seed supplied at registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub username: String,
    pub age: u8,
}
