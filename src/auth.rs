//! Auth Token Client
//!
//! Fetches the short-lived bearer token from the vendor's HTTP auth
//! endpoint. A 401/403 means the API key is bad and is fatal; transport
//! failures and 5xx responses are retried with backoff before being
//! surfaced as transient. Tokens are cached and rotated: a token older
//! than 24 hours is considered stale and refreshed before the next dial.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::provider::ProviderProfile;

/// Value of the `Client-Information` header sent to the vendor.
pub const CLIENT_INFORMATION: &str = "INTRINIO_REALTIME_RUST_SDK";

/// Tokens older than this are refreshed before use.
const TOKEN_TTL: Duration = Duration::from_secs(60 * 60 * 24);

/// Transient-failure retry budget for one fetch.
const FETCH_ATTEMPTS: u32 = 3;

/// Base backoff between transient-failure retries.
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Errors raised by the auth client.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The vendor rejected the API key. Fatal; retrying cannot help.
    #[error("authentication rejected (status {status}): check the API key")]
    InvalidApiKey {
        /// HTTP status returned by the auth endpoint.
        status: u16,
    },

    /// The auth endpoint answered with a non-auth failure status after the
    /// retry budget was spent.
    #[error("auth endpoint returned status {status}")]
    ServerError {
        /// HTTP status returned by the auth endpoint.
        status: u16,
    },

    /// The request never completed after the retry budget was spent.
    #[error("auth request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint returned 200 with an empty body.
    #[error("auth endpoint returned an empty token")]
    EmptyToken,
}

impl AuthError {
    /// Whether retrying with the same configuration is pointless.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidApiKey { .. } | Self::EmptyToken)
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    fetched_at: Instant,
}

/// HTTP client for the vendor auth endpoint with token caching.
pub struct AuthClient {
    http: reqwest::Client,
    profile: ProviderProfile,
    api_key: String,
    cached: Mutex<Option<CachedToken>>,
}

impl AuthClient {
    /// Create an auth client for one feed profile.
    #[must_use]
    pub fn new(profile: ProviderProfile, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            profile,
            api_key,
            cached: Mutex::new(None),
        }
    }

    /// Get a token, reusing the cached one while it is fresh.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when no fresh token is cached and the endpoint
    /// cannot produce one.
    pub async fn token(&self) -> Result<String, AuthError> {
        if let Some(token) = self.fresh_cached() {
            return Ok(token);
        }
        self.fetch_token().await
    }

    /// Drop the cached token so the next [`Self::token`] call re-fetches.
    pub fn invalidate(&self) {
        *self.cached.lock() = None;
    }

    fn fresh_cached(&self) -> Option<String> {
        let cached = self.cached.lock();
        cached
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < TOKEN_TTL)
            .map(|c| c.token.clone())
    }

    /// Fetch a token from the endpoint, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`AuthError`] immediately on credential rejection,
    /// or the last transient error once the retry budget is spent.
    pub async fn fetch_token(&self) -> Result<String, AuthError> {
        let mut last_error: Option<AuthError> = None;

        for attempt in 0..FETCH_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
            }

            match self.try_fetch().await {
                Ok(token) => {
                    *self.cached.lock() = Some(CachedToken {
                        token: token.clone(),
                        fetched_at: Instant::now(),
                    });
                    tracing::info!("authentication successful");
                    return Ok(token);
                }
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    tracing::warn!(attempt = attempt + 1, error = %error, "auth attempt failed");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or(AuthError::EmptyToken))
    }

    async fn try_fetch(&self) -> Result<String, AuthError> {
        let url = self.profile.auth_url(&self.api_key);
        let response = self
            .http
            .get(url)
            .header("Client-Information", CLIENT_INFORMATION)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(AuthError::InvalidApiKey {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(AuthError::ServerError {
                status: status.as_u16(),
            });
        }

        let token = response.text().await?;
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(token)
    }
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("profile", &self.profile)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}
