//! Error types for the Pavilion client core
//!
//! Each component surfaces a closed error set. Provider-native codes are
//! mapped into `AuthError` inside the identity module; callers above the
//! session manager never branch on them.

use thiserror::Error;

/// Malformed input caught before any network call.
///
/// Always recoverable at the call site; never logged as a system failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("email must not be empty")]
    EmptyEmail,

    #[error("password must not be empty")]
    EmptyPassword,

    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("username must be {min}-{max} characters")]
    UsernameLength { min: usize, max: usize },

    #[error("age must be between {min} and {max}")]
    AgeOutOfRange { min: u8, max: u8 },
}

/// Authentication failures, mapped from identity-provider codes and backend
/// exchange statuses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Rejected locally before any network call.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("an account with this email already exists")]
    AccountExists,

    #[error("credential is too weak")]
    WeakCredential,

    #[error("account is disabled")]
    AccountDisabled,

    #[error("too many attempts, try again later")]
    RateLimited,

    #[error("network unavailable")]
    NetworkUnavailable,

    #[error("authentication failed: {0}")]
    Unknown(String),
}

impl AuthError {
    /// Authentication-class rejections force local session invalidation.
    /// Transient failures are returned to the caller for caller-chosen retry
    /// and never force a logout.
    pub fn invalidates_session(&self) -> bool {
        matches!(self, Self::InvalidCredentials | Self::AccountDisabled)
    }
}

/// Real-time channel failures.
///
/// Everything below `MaxReconnectExceeded` is handled internally by the
/// reconnect loop and is invisible to the rest of the system.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("transport dropped: {0}")]
    TransportDropped(String),

    #[error("gave up after {0} reconnect attempts")]
    MaxReconnectExceeded(u32),
}

/// Resource fetch failure. Not subdivided; the caller decides whether to
/// retry, and an existing cache entry is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fetch failed: {0}")]
pub struct FetchError(pub String);

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self(err.to_string())
    }
}

/// Credential store I/O failure. Reported, never silently swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("storage failed: {0}")]
pub struct StorageError(pub String);

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.to_string())
    }
}

/// Local cache rejections raised before any network call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// A second optimistic mutation on the same `(resource, item)` key is
    /// rejected until the first reconciles.
    #[error("a mutation for {resource}/{item_id} is already in flight")]
    MutationInFlight { resource: &'static str, item_id: String },

    #[error("no cached item {item_id} in {resource}")]
    UnknownItem { resource: &'static str, item_id: String },

    #[error("mutation targets item {expected} but carries item {actual}")]
    IdMismatch { expected: String, actual: String },
}
