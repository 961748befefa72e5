// The sign-in flow state machine.
//
// NoCredential -> InProgress -> (ProfileLoaded | Error), with re-auth
// from ProfileLoaded and sign-out back to NoCredential. At most one
// exchange is in flight: beginning a new attempt replaces the previous
// attempt's verifier and state token, so its redirect can no longer
// complete. A mismatched, expired, or missing redirect clears the
// exchange cell the same way a cancel does - a retry always starts clean.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::watch;

use crate::crypto::KeyProvider;
use crate::paths::{DataDir, CREDENTIAL_FILE, PROFILE_FILE};
use crate::store::DurableCell;

use super::{pkce, AccessTokenProvider, AuthError, GoogleCredential, GoogleProfile};

/// How long a begun sign-in may wait for its redirect before the stored
/// exchange state goes stale
const EXCHANGE_DEADLINE: Duration = Duration::from_secs(10 * 60);
/// Cached profile older than this is refetched
const PROFILE_STALE_AFTER_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    NoCredential,
    InProgress,
    ProfileLoaded(GoogleProfile),
    Error(String),
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub redirect_uri: String,
    pub auth_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    /// Google endpoints with the scopes the app needs (identity, mail
    /// send, Drive app files).
    pub fn google(client_id: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            redirect_uri,
            auth_endpoint: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_endpoint: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_endpoint: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
            scopes: [
                "openid",
                "email",
                "profile",
                "https://www.googleapis.com/auth/gmail.send",
                "https://www.googleapis.com/auth/drive.file",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Temp state for one in-flight authorization round trip. Owned by the
/// single current attempt; discarded on completion, cancellation,
/// mismatch, or expiry.
struct ExchangeState {
    verifier: String,
    expected_state: String,
    deadline: Instant,
}

/// Token endpoint reply for both the code exchange and refresh grants.
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    expires_in: i64,
    #[serde(default)]
    scope: Option<String>,
    token_type: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

pub struct OAuthCoordinator {
    http: reqwest::Client,
    config: OAuthConfig,
    credentials: DurableCell<Option<GoogleCredential>>,
    profiles: DurableCell<Option<GoogleProfile>>,
    exchange: Mutex<Option<ExchangeState>>,
    state: watch::Sender<AuthState>,
    exchange_deadline: Duration,
}

impl OAuthCoordinator {
    pub fn new(config: OAuthConfig, data_dir: &DataDir, keys: Arc<dyn KeyProvider>) -> Self {
        let (state, _) = watch::channel(AuthState::NoCredential);
        Self {
            http: reqwest::Client::new(),
            config,
            credentials: DurableCell::encrypted(data_dir.cell(CREDENTIAL_FILE), keys),
            profiles: DurableCell::new(data_dir.cell(PROFILE_FILE)),
            exchange: Mutex::new(None),
            state,
            exchange_deadline: EXCHANGE_DEADLINE,
        }
    }

    /// Shorter redirect deadline, for tests.
    pub fn with_exchange_deadline(mut self, deadline: Duration) -> Self {
        self.exchange_deadline = deadline;
        self
    }

    pub fn auth_state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn watch_auth_state(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Settle the observable state from the persisted cells (app start).
    pub async fn restore(&self) -> AuthState {
        let restored = match self.profiles.read().await {
            Some(profile) => AuthState::ProfileLoaded(profile),
            None => AuthState::NoCredential,
        };
        self.state.send_replace(restored.clone());
        restored
    }

    /// Start a sign-in attempt and return the authorization URL to open.
    /// Any previous in-flight attempt is invalidated here.
    pub fn begin_authorization(&self) -> String {
        let verifier = pkce::generate_verifier();
        let state_token = pkce::generate_state_token();
        let challenge = pkce::challenge_s256(&verifier);

        *self.exchange.lock() = Some(ExchangeState {
            verifier,
            expected_state: state_token.clone(),
            deadline: Instant::now() + self.exchange_deadline,
        });
        self.state.send_replace(AuthState::InProgress);

        let scopes = self.config.scopes.join(" ");
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}\
             &code_challenge={}&code_challenge_method=S256&state={}\
             &access_type=offline&prompt=consent",
            self.config.auth_endpoint,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&scopes),
            challenge,
            urlencoding::encode(&state_token),
        )
    }

    /// Handle the redirect: validate the state token, exchange the code,
    /// persist credential and profile. The exchange state is consumed on
    /// entry, so retries after any failure start clean.
    pub async fn complete_authorization(
        &self,
        received_state: &str,
        code: &str,
    ) -> Result<GoogleProfile, AuthError> {
        let exchange = match self.exchange.lock().take() {
            Some(exchange) => exchange,
            None => return Err(AuthError::NoFlowInProgress),
        };

        if Instant::now() > exchange.deadline {
            crate::warn!("redirect arrived after the sign-in deadline");
            self.state
                .send_replace(AuthState::Error(AuthError::FlowExpired.to_string()));
            return Err(AuthError::FlowExpired);
        }

        if received_state != exchange.expected_state {
            crate::error!("authorization state mismatch; rejecting redirect");
            self.state
                .send_replace(AuthState::Error(AuthError::StateMismatch.to_string()));
            return Err(AuthError::StateMismatch);
        }

        match self.finish_exchange(code, &exchange.verifier).await {
            Ok(profile) => {
                self.state
                    .send_replace(AuthState::ProfileLoaded(profile.clone()));
                Ok(profile)
            }
            Err(e) => {
                self.state.send_replace(AuthState::Error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Abandon the in-flight attempt (user backed out) and settle the
    /// state back to what the persisted cells say.
    pub async fn cancel_authorization(&self) {
        if self.exchange.lock().take().is_some() {
            crate::info!("sign-in attempt cancelled");
        }
        self.restore().await;
    }

    async fn finish_exchange(
        &self,
        code: &str,
        verifier: &str,
    ) -> Result<GoogleProfile, AuthError> {
        let credential = self.exchange_code(code, verifier).await?;
        self.credentials.write(Some(credential.clone())).await?;

        let profile = self.fetch_profile(&credential.access_token).await?;
        self.profiles.write(Some(profile.clone())).await?;
        Ok(profile)
    }

    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
    ) -> Result<GoogleCredential, AuthError> {
        let response = self
            .http
            .post(&self.config.token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("code_verifier", verifier),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await?;
        let token = Self::token_reply(response).await?;

        Ok(GoogleCredential {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            id_token: token.id_token.unwrap_or_default(),
            expires_in: token.expires_in,
            scope: token.scope.unwrap_or_default(),
            token_type: token.token_type,
        })
    }

    /// Rotate the access token via the refresh grant.
    pub async fn refresh(&self) -> Result<GoogleCredential, AuthError> {
        let current = self
            .credentials
            .read()
            .await
            .ok_or(AuthError::NotSignedIn)?;
        let refresh_token = current
            .refresh_token
            .ok_or(AuthError::RefreshTokenUnavailable)?;

        let response = self
            .http
            .post(&self.config.token_endpoint)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", self.config.client_id.as_str()),
            ])
            .send()
            .await?;
        let token = Self::token_reply(response).await?;

        let updated = self
            .credentials
            .update(move |stored| {
                stored.map(|previous| merge_refreshed(previous, token))
            })
            .await?;
        updated.ok_or(AuthError::NotSignedIn)
    }

    /// Cached profile, refetched when absent or older than a day.
    pub async fn profile(&self) -> Result<GoogleProfile, AuthError> {
        if let Some(cached) = self.profiles.read().await {
            if !profile_is_stale(&cached, Utc::now()) {
                return Ok(cached);
            }
        }

        let credential = self
            .credentials
            .read()
            .await
            .ok_or(AuthError::NotSignedIn)?;
        let profile = self.fetch_profile(&credential.access_token).await?;
        self.profiles.write(Some(profile.clone())).await?;
        self.state
            .send_replace(AuthState::ProfileLoaded(profile.clone()));
        Ok(profile)
    }

    /// Drop credential and profile; back to NoCredential.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        *self.exchange.lock() = None;
        self.credentials.write(None).await?;
        self.profiles.write(None).await?;
        self.state.send_replace(AuthState::NoCredential);
        crate::info!("signed out");
        Ok(())
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<GoogleProfile, AuthError> {
        let response = self
            .http
            .get(&self.config.userinfo_endpoint)
            .bearer_auth(access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Endpoint { status, body });
        }

        let info: UserInfo = response.json().await?;
        Ok(GoogleProfile {
            id: info.sub,
            name: info.name.unwrap_or_default(),
            email: info.email.unwrap_or_default(),
            picture: info.picture.unwrap_or_default(),
            last_updated: Utc::now(),
        })
    }

    async fn token_reply(response: reqwest::Response) -> Result<TokenResponse, AuthError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Endpoint { status, body });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl AccessTokenProvider for OAuthCoordinator {
    async fn access_token(&self) -> Result<String, AuthError> {
        let credential = self
            .credentials
            .read()
            .await
            .ok_or(AuthError::NotSignedIn)?;
        Ok(credential.access_token)
    }
}

/// A refresh reply always replaces the access token but may omit a new
/// refresh token; the previous one must survive in that case.
fn merge_refreshed(previous: GoogleCredential, reply: TokenResponse) -> GoogleCredential {
    GoogleCredential {
        access_token: reply.access_token,
        refresh_token: reply.refresh_token.or(previous.refresh_token),
        id_token: reply.id_token.unwrap_or(previous.id_token),
        expires_in: reply.expires_in,
        scope: reply.scope.unwrap_or(previous.scope),
        token_type: reply.token_type,
    }
}

fn profile_is_stale(profile: &GoogleProfile, now: DateTime<Utc>) -> bool {
    now - profile.last_updated > chrono::Duration::hours(PROFILE_STALE_AFTER_HOURS)
}

#[cfg(test)]
#[path = "coordinator_test.rs"]
mod tests;
