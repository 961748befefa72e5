//! Google sign-in: PKCE authorization-code flow, sealed credential
//! persistence, token refresh, and the cached profile.

mod coordinator;
mod pkce;

pub use coordinator::{AuthState, OAuthConfig, OAuthCoordinator};
pub use pkce::{challenge_s256, generate_state_token, generate_verifier};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no authorization flow in progress")]
    NoFlowInProgress,
    /// Redirect state token did not match this sign-in attempt (possible CSRF)
    #[error("authorization response did not match this sign-in attempt")]
    StateMismatch,
    #[error("sign-in attempt expired; start again")]
    FlowExpired,
    #[error("not signed in")]
    NotSignedIn,
    #[error("no refresh token stored")]
    RefreshTokenUnavailable,
    #[error("authorization server returned HTTP {status}: {body}")]
    Endpoint { status: u16, body: String },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// OAuth credential as persisted in the sealed cell. An absent cell means
/// "not signed in".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCredential {
    pub access_token: String,
    /// Not reissued on every refresh; the stored one is retained whenever
    /// a refresh response omits it.
    pub refresh_token: Option<String>,
    pub id_token: String,
    pub expires_in: i64,
    pub scope: String,
    pub token_type: String,
}

/// Cached profile data, refetched when absent or stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub picture: String,
    pub last_updated: DateTime<Utc>,
}

/// Hands the current access token to the API clients (mail, Drive).
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, AuthError>;
}
