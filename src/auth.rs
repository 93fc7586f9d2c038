//! OAuth2 refresh-token flow for the YouTube Data API.
//!
//! A long-lived refresh token is exchanged for short-lived access tokens. The
//! current token is cached and reused until it is close to expiry.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::YouTube;
use crate::error::AuthError;

/// Tokens are refreshed this long before Google says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
/// Longer `expires_in` values are capped to this.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub refresh_token: String,
}

impl From<&YouTube> for Credentials {
    fn from(cfg: &YouTube) -> Self {
        Credentials {
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
            redirect_uri: cfg.redirect_uri.clone(),
            refresh_token: cfg.refresh_token.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + EXPIRY_MARGIN < self.expires_at
    }
}

pub struct OAuthClient {
    http: Client,
    token_url: String,
    credentials: Credentials,
    cached: Mutex<Option<CachedToken>>,
}

impl OAuthClient {
    pub fn new(http: Client, token_url: &str, credentials: Credentials) -> Self {
        Self {
            http,
            token_url: token_url.to_string(),
            credentials,
            cached: Mutex::new(None),
        }
    }

    /// Returns a usable access token, refreshing it when needed.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(token.value.clone());
        }

        let token = self.refresh().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Drops the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn refresh(&self) -> Result<CachedToken, AuthError> {
        tracing::debug!(token_url = %self.token_url, "refreshing access token");

        let form = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("redirect_uri", self.credentials.redirect_uri.as_str()),
            ("refresh_token", self.credentials.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let resp = self.http.post(&self.token_url).form(&form).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message: token_error_message(&body),
            });
        }

        let parsed: TokenResponse = resp.json().await?;
        let value = parsed.access_token.filter(|t| !t.is_empty()).ok_or(AuthError::MissingToken)?;
        let expires_in = Duration::from_secs(parsed.expires_in.unwrap_or(3600));

        tracing::info!(expires_in_secs = expires_in.as_secs(), "access token refreshed");
        Ok(CachedToken {
            value,
            expires_at: expiry_after(Instant::now(), expires_in),
        })
    }
}

fn expiry_after(now: Instant, expires_in: Duration) -> Instant {
    now.checked_add(expires_in.min(MAX_TOKEN_LIFETIME)).unwrap_or(now)
}

fn token_error_message(body: &str) -> String {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(TokenErrorResponse {
            error: Some(error),
            error_description: Some(description),
        }) => format!("{}: {}", error, description),
        Ok(TokenErrorResponse { error: Some(error), .. }) => error,
        _ => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_freshness_respects_margin() {
        let now = Instant::now();
        let fresh = CachedToken {
            value: "a".to_string(),
            expires_at: now + Duration::from_secs(3600),
        };
        let stale = CachedToken {
            value: "b".to_string(),
            expires_at: now + Duration::from_secs(30),
        };
        assert!(fresh.is_fresh(now));
        assert!(!stale.is_fresh(now));
    }

    #[test]
    fn test_huge_expires_in_is_capped() {
        let now = Instant::now();
        let expires_at = expiry_after(now, Duration::from_secs(u64::MAX));
        assert_eq!(expires_at, now + MAX_TOKEN_LIFETIME);

        let expires_at = expiry_after(now, Duration::from_secs(3599));
        assert_eq!(expires_at, now + Duration::from_secs(3599));
    }

    #[test]
    fn test_token_error_message() {
        assert_eq!(
            token_error_message(r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#),
            "invalid_grant: Token has been expired or revoked."
        );
        assert_eq!(token_error_message(r#"{"error":"invalid_client"}"#), "invalid_client");
        assert_eq!(token_error_message("bad gateway"), "bad gateway");
    }
}
