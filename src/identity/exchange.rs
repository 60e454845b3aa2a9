//! Backend session exchange
//!
//! `POST /auth/exchange` swaps a provider identity token for the backend
//! session token used as the bearer credential everywhere else. The same
//! call doubles as refresh verification: re-deriving the session token from
//! a fresh identity token proves the identity is still honored.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AuthError;

/// Payload for the identity-exchange endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRequest {
    pub identity_token: String,
    pub provider_user_id: String,
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeResponse {
    session_token: String,
}

/// Backend endpoint that issues session tokens.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Exchange an identity token for a backend session token.
    async fn exchange(&self, request: &ExchangeRequest) -> Result<String, AuthError>;
}

/// reqwest-backed implementation against the REST API.
pub struct HttpSessionBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSessionBackend {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    async fn exchange(&self, request: &ExchangeRequest) -> Result<String, AuthError> {
        let url = format!("{}/auth/exchange", self.base_url.trim_end_matches('/'));
        debug!(url = %url, provider_user_id = %request.provider_user_id, "exchanging identity token");

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        match response.status() {
            status if status.is_success() => {
                let body: ExchangeResponse = response
                    .json()
                    .await
                    .map_err(|e| AuthError::Unknown(format!("malformed exchange response: {}", e)))?;
                Ok(body.session_token)
            }
            StatusCode::UNAUTHORIZED => Err(AuthError::InvalidCredentials),
            StatusCode::FORBIDDEN => Err(AuthError::AccountDisabled),
            StatusCode::CONFLICT => Err(AuthError::AccountExists),
            StatusCode::TOO_MANY_REQUESTS => Err(AuthError::RateLimited),
            status => Err(AuthError::Unknown(format!("exchange returned {}", status))),
        }
    }
}

fn map_transport_error(err: reqwest::Error) -> AuthError {
    if err.is_timeout() || err.is_connect() {
        AuthError::NetworkUnavailable
    } else {
        AuthError::Unknown(err.to_string())
    }
}
