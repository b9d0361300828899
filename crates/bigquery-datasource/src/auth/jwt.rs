//! Service-account token exchange (JWT bearer grant)

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;

use super::token::{AccessToken, TokenResponse, TokenSlot, TokenSource};
use crate::constants::JWT_BEARER_GRANT;
use crate::{Error, Result};

/// Lifetime requested for each signed assertion
const ASSERTION_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

/// Exchanges an RS256-signed assertion for an access token.
///
/// The PEM key is parsed on the first token request, not at construction,
/// so building a transport never fails on key material alone.
pub struct ServiceAccountTokenSource {
    http: reqwest::Client,
    client_email: String,
    private_key: String,
    token_uri: String,
    scopes: Vec<String>,
    slot: TokenSlot,
}

impl std::fmt::Debug for ServiceAccountTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountTokenSource")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountTokenSource {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        client_email: impl Into<String>,
        private_key: impl Into<String>,
        token_uri: impl Into<String>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            http,
            client_email: client_email.into(),
            private_key: private_key.into(),
            token_uri: token_uri.into(),
            scopes,
            slot: TokenSlot::default(),
        }
    }

    fn assertion(&self) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Config(format!("system clock before unix epoch: {e}")))?
            .as_secs();

        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: self.scopes.join(" "),
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME.as_secs(),
        };

        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| Error::Config(format!("invalid service account private key: {e}")))?;

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| Error::Config(format!("failed to sign token assertion: {e}")))
    }

    async fn exchange(&self) -> Result<AccessToken> {
        let assertion = self.assertion()?;
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", JWT_BEARER_GRANT)
            .append_pair("assertion", &assertion)
            .finish();

        tracing::debug!(client_email = %self.client_email, "Exchanging service account assertion");

        let resp = self
            .http
            .post(&self.token_uri)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body)
            .send()
            .await
            .map_err(|e| Error::transport(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        let token: TokenResponse = resp.json().await.map_err(|e| Error::transport(&e))?;
        Ok(token.into())
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn token(&self) -> Result<AccessToken> {
        if let Some(token) = self.slot.fresh() {
            return Ok(token);
        }
        let token = self.exchange().await?;
        self.slot.store(token.clone());
        Ok(token)
    }
}
