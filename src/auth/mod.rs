//! Credentials and OAuth2 access tokens for the REST collaborators.
//!
//! Three sources are supported, checked in this order by
//! [`Credentials::from_env`]:
//! - `TXLOG_ACCESS_TOKEN`: a ready-made bearer token
//! - `GOOGLE_APPLICATION_CREDENTIALS`: path to a service-account key file
//!
//! Emulator endpoints use [`Credentials::Anonymous`].

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{Error, Result};

/// Environment variable naming the service-account key file.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
/// Environment variable carrying a pre-issued bearer token.
pub const ACCESS_TOKEN_ENV: &str = "TXLOG_ACCESS_TOKEN";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const JWT_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;

/// Service-account key file contents (the fields we use).
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    /// Account email, used as JWT issuer.
    pub client_email: String,
    /// PEM-encoded RSA private key.
    pub private_key: String,
    /// Key id, sent as the JWT `kid`.
    #[serde(default)]
    pub private_key_id: Option<String>,
    /// OAuth2 token endpoint.
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    /// Load a key file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Auth(format!(
                "Failed to read service account key {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            Error::Auth(format!(
                "Invalid service account key {}: {}",
                path.display(),
                e
            ))
        })
    }
}

/// Where access tokens come from.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// No Authorization header (emulators).
    Anonymous,
    /// Fixed bearer token.
    AccessToken(String),
    /// Tokens minted from a service-account key.
    ServiceAccount(ServiceAccountKey),
}

impl Credentials {
    /// Resolve credentials from the environment.
    pub fn from_env() -> Result<Self> {
        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            if !token.trim().is_empty() {
                debug!("Using bearer token from {}", ACCESS_TOKEN_ENV);
                return Ok(Credentials::AccessToken(token.trim().to_string()));
            }
        }

        let path = std::env::var(CREDENTIALS_ENV)
            .map_err(|_| Error::Auth(format!("{} is not set", CREDENTIALS_ENV)))?;
        let key = ServiceAccountKey::from_file(&path)?;
        info!(client_email = %key.client_email, "Loaded service account credentials");
        Ok(Credentials::ServiceAccount(key))
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: DateTime<Utc>,
}

/// Hands out bearer tokens, refreshing service-account tokens before expiry.
pub struct TokenSource {
    credentials: Credentials,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    /// Create a token source.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            cached: Mutex::new(None),
        }
    }

    /// Token source that never authenticates.
    pub fn anonymous() -> Self {
        Self::new(Credentials::Anonymous)
    }

    /// Current bearer token, or `None` for anonymous access.
    pub async fn token(&self) -> Result<Option<String>> {
        let key = match &self.credentials {
            Credentials::Anonymous => return Ok(None),
            Credentials::AccessToken(token) => return Ok(Some(token.clone())),
            Credentials::ServiceAccount(key) => key,
        };

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Utc::now() < token.refresh_at {
                return Ok(Some(token.value.clone()));
            }
        }

        let token = self.exchange(key).await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(Some(value))
    }

    /// Attach the Authorization header, if any, to a request.
    pub async fn authorize(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        Ok(match self.token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    async fn exchange(&self, key: &ServiceAccountKey) -> Result<CachedToken> {
        let now = Utc::now();
        let assertion = sign_assertion(key, now)?;

        debug!(token_uri = %key.token_uri, "Exchanging service account assertion for access token");
        let response = self
            .http
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "Token exchange failed ({}): {}",
                status, error_text
            )));
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = token.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);
        Ok(CachedToken {
            value: token.access_token,
            refresh_at: now + chrono::Duration::seconds((lifetime - REFRESH_MARGIN_SECS).max(0)),
        })
    }
}

/// Build the RS256 JWT bearer assertion for a key.
fn sign_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> Result<String> {
    let claims = Claims {
        iss: &key.client_email,
        scope: CLOUD_PLATFORM_SCOPE,
        aud: &key.token_uri,
        iat: now.timestamp(),
        exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| Error::Auth(format!("Invalid service account private key: {}", e)))?;

    jsonwebtoken::encode(&header, &claims, &encoding_key)
        .map_err(|e| Error::Auth(format!("Failed to sign token assertion: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    const TEST_KEY: &str = include_str!("../../tests/fixtures/test_rsa_key.pem");

    fn test_key() -> ServiceAccountKey {
        ServiceAccountKey {
            client_email: "txlog@example.iam.gserviceaccount.com".to_string(),
            private_key: TEST_KEY.to_string(),
            private_key_id: Some("key-1".to_string()),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
        }
    }

    #[test]
    fn test_sign_assertion_claims() {
        let now = Utc::now();
        let jwt = sign_assertion(&test_key(), now).unwrap();
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);

        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let header: serde_json::Value =
            serde_json::from_slice(&engine.decode(parts[0]).unwrap()).unwrap();
        let claims: serde_json::Value =
            serde_json::from_slice(&engine.decode(parts[1]).unwrap()).unwrap();

        assert_eq!(header["alg"], "RS256");
        assert_eq!(header["kid"], "key-1");
        assert_eq!(claims["iss"], "txlog@example.iam.gserviceaccount.com");
        assert_eq!(claims["aud"], DEFAULT_TOKEN_URI);
        assert_eq!(claims["scope"], CLOUD_PLATFORM_SCOPE);
        assert_eq!(claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap(), 3600);
    }

    #[test]
    fn test_sign_assertion_rejects_bad_key() {
        let mut key = test_key();
        key.private_key = "not a pem".to_string();
        assert!(matches!(sign_assertion(&key, Utc::now()), Err(Error::Auth(_))));
    }

    #[test]
    fn test_key_file_defaults_token_uri() {
        let key: ServiceAccountKey = serde_json::from_str(
            r#"{"client_email": "a@b.c", "private_key": "pem", "type": "service_account"}"#,
        )
        .unwrap();
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
        assert!(key.private_key_id.is_none());
    }

    #[tokio::test]
    async fn test_static_and_anonymous_tokens() {
        assert_eq!(TokenSource::anonymous().token().await.unwrap(), None);
        let source = TokenSource::new(Credentials::AccessToken("abc".to_string()));
        assert_eq!(source.token().await.unwrap(), Some("abc".to_string()));
    }
}
