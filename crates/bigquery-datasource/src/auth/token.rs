//! Access tokens and the token source abstraction

use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;

use crate::Result;

/// Tokens are refreshed this long before they expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// OAuth2 bearer token
#[derive(Clone)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: Instant,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl AccessToken {
    #[must_use]
    pub fn new(value: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            value: value.into(),
            expires_at: Instant::now() + expires_in,
        }
    }

    /// Whether the token is still usable for a request starting now
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

/// Token endpoint response body
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

const fn default_expires_in() -> u64 {
    3600
}

impl From<TokenResponse> for AccessToken {
    fn from(resp: TokenResponse) -> Self {
        Self::new(resp.access_token, Duration::from_secs(resp.expires_in))
    }
}

/// Source of bearer tokens for outgoing requests
#[async_trait]
pub trait TokenSource: Send + Sync + std::fmt::Debug {
    async fn token(&self) -> Result<AccessToken>;
}

/// Holds the last fetched token until it goes stale.
#[derive(Debug, Default)]
pub(crate) struct TokenSlot {
    current: RwLock<Option<AccessToken>>,
}

impl TokenSlot {
    pub(crate) fn fresh(&self) -> Option<AccessToken> {
        self.current
            .read()
            .as_ref()
            .filter(|token| token.is_fresh())
            .cloned()
    }

    pub(crate) fn store(&self, token: AccessToken) {
        *self.current.write() = Some(token);
    }
}

/// Fixed token, for environments where a token is minted elsewhere
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: AccessToken,
}

impl StaticTokenSource {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(value, Duration::from_secs(u64::from(u32::MAX))),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self) -> Result<AccessToken> {
        Ok(self.token.clone())
    }
}
