//! Identity provider seam
//!
//! The external provider authenticates raw credentials and issues identity
//! tokens. Only its contract is modeled here; the concrete provider is
//! injected at construction. Provider-native error codes never cross this
//! module's boundary unmapped.

use async_trait::async_trait;

use crate::error::AuthError;

/// Raw failure reported by the provider, prior to mapping.
#[derive(Debug, Clone)]
pub struct ProviderFailure {
    pub code: String,
    pub message: String,
}

impl ProviderFailure {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Identity returned by a successful provider exchange.
#[derive(Debug, Clone)]
pub struct ProviderIdentity {
    /// Opaque provider-assigned user id.
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    /// Raw identity token, retained for refresh.
    pub identity_token: String,
}

/// Contract required from the external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str)
        -> Result<ProviderIdentity, ProviderFailure>;

    async fn sign_up(&self, email: &str, password: &str)
        -> Result<ProviderIdentity, ProviderFailure>;

    /// Best-effort; a failure here never aborts registration.
    async fn set_display_name(&self, display_name: &str) -> Result<(), ProviderFailure>;

    async fn sign_out(&self) -> Result<(), ProviderFailure>;

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderFailure>;

    /// A fresh identity token for the signed-in user, used to re-derive the
    /// backend session credential.
    async fn identity_token(&self) -> Result<String, ProviderFailure>;
}

/// Map a provider-native failure into the closed `AuthError` set.
///
/// Unrecognized codes fall through to `Unknown` with the raw code and
/// message preserved for logs; callers still only see the closed set.
pub(crate) fn map_provider_failure(failure: &ProviderFailure) -> AuthError {
    match failure.code.as_str() {
        "auth/invalid-credential"
        | "auth/user-not-found"
        | "auth/wrong-password"
        | "auth/invalid-email" => AuthError::InvalidCredentials,
        "auth/email-already-in-use" => AuthError::AccountExists,
        "auth/weak-password" => AuthError::WeakCredential,
        "auth/user-disabled" => AuthError::AccountDisabled,
        "auth/too-many-requests" => AuthError::RateLimited,
        "auth/network-request-failed" => AuthError::NetworkUnavailable,
        other => AuthError::Unknown(format!("{}: {}", other, failure.message)),
    }
}
