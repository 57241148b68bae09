//! OAuth2 token handling for the Netatmo API.
//!
//! Tokens live only in process memory. The first call performs a password
//! grant; once the access token expires the refresh token is exchanged for a
//! new pair, falling back to the password grant if the provider has revoked
//! the refresh token. The check-and-refresh sequence runs under one async mutex, so a
//! burst of concurrent callers behind an expired token causes a single
//! refresh.

use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::fmt;
use tokio::sync::Mutex;

use crate::{
    config::Credentials,
    error::{Error, Result, truncate_body},
};

/// Tokens are considered expired this long before the provider says so.
const EXPIRY_MARGIN_SECS: i64 = 60;

const SCOPE: &str = "read_station";

#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Token {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

#[derive(Debug)]
pub struct TokenManager {
    http: Client,
    token_url: String,
    credentials: Credentials,
    cached: Mutex<Option<Token>>,
}

impl TokenManager {
    pub fn new(http: Client, api_url: &str, credentials: Credentials) -> Self {
        Self {
            http,
            token_url: format!("{}/oauth2/token", api_url.trim_end_matches('/')),
            credentials,
            cached: Mutex::new(None),
        }
    }

    /// Start from a token obtained elsewhere, e.g. from an earlier run.
    pub fn with_token(http: Client, api_url: &str, credentials: Credentials, token: Token) -> Self {
        let manager = Self::new(http, api_url, credentials);
        Self {
            cached: Mutex::new(Some(token)),
            ..manager
        }
    }

    /// Return a token that is valid right now, authenticating or refreshing
    /// as needed.
    pub async fn valid_token(&self) -> Result<Token> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if !token.is_expired(Utc::now()) {
                return Ok(token.clone());
            }
        }

        let fresh = match cached.take() {
            Some(stale) => match self.refresh(&stale.refresh_token).await {
                Err(Error::Auth(reason)) => {
                    tracing::warn!("refresh token rejected ({reason}), signing in again");
                    self.authenticate().await?
                }
                other => other?,
            },
            None => self.authenticate().await?,
        };

        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    /// Mark `rejected` as expired so the next call refreshes it.
    ///
    /// Does nothing if the cache already holds a different token: another
    /// caller got there first.
    pub async fn invalidate(&self, rejected: &Token) {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_mut() {
            if token.access_token == rejected.access_token {
                tracing::warn!("Netatmo rejected the access token, forcing a refresh");
                token.expires_at = DateTime::<Utc>::MIN_UTC;
            }
        }
    }

    async fn authenticate(&self) -> Result<Token> {
        let c = &self.credentials;
        let token = self
            .exchange(&[
                ("grant_type", "password"),
                ("client_id", c.client_id.as_str()),
                ("client_secret", c.client_secret.as_str()),
                ("username", c.username.as_str()),
                ("password", c.password.as_str()),
                ("scope", SCOPE),
            ])
            .await?;

        tracing::info!("authenticated with Netatmo as {}", c.username);
        Ok(token)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Token> {
        let c = &self.credentials;
        let token = self
            .exchange(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", c.client_id.as_str()),
                ("client_secret", c.client_secret.as_str()),
            ])
            .await?;

        tracing::info!("refreshed Netatmo access token");
        Ok(token)
    }

    async fn exchange(&self, form: &[(&str, &str)]) -> Result<Token> {
        tracing::debug!("POST {}", self.token_url);

        let res = self.http.post(&self.token_url).form(form).send().await?;

        let status = res.status();
        let body = res.text().await?;

        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(Error::Auth(format!(
                "token request rejected with status {}: {}",
                status,
                truncate_body(&body)
            )));
        }

        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: truncate_body(&body),
            });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| Error::parse("Netatmo token response", e))?;

        let expires_at = Duration::try_seconds(parsed.expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| Error::Api {
                status: status.as_u16(),
                message: format!("token lifetime out of range: {}s", parsed.expires_in),
            })?;

        Ok(Token {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token,
            expires_at,
        })
    }
}
