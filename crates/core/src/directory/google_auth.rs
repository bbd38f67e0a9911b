//! OAuth credentials for the Google Admin Directory API.
//!
//! A service account with domain-wide delegation signs a JWT assertion
//! naming the admin it impersonates and trades it at the key's token
//! endpoint (RFC 7523 JWT bearer grant). Access tokens live about an hour,
//! so the minted token is cached and replaced shortly before it expires.

use std::path::Path;

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::check_response;
use crate::errors::DirectoryError;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// A cached token is replaced once it has less than this left.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Read-only scopes covering users, groups and group members.
pub const DIRECTORY_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/admin.directory.user.readonly",
    "https://www.googleapis.com/auth/admin.directory.group.readonly",
    "https://www.googleapis.com/auth/admin.directory.group.member.readonly",
];

/// The fields of a service-account JSON key that the grant needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.into()
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AssertionClaims {
    pub iss: String,
    pub sub: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    assertion: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: i64,
}

/// Mints and caches impersonated access tokens for a service account.
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    subject: String,
    cache: Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub fn new(key: ServiceAccountKey, subject: impl Into<String>) -> Result<Self, DirectoryError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| DirectoryError::Credentials(format!("invalid private_key: {}", e)))?;
        Ok(Self {
            key,
            encoding_key,
            subject: subject.into(),
            cache: Mutex::new(None),
        })
    }

    /// Load a JSON key file as downloaded from the Google Cloud console.
    pub fn from_file(path: &Path, subject: impl Into<String>) -> Result<Self, DirectoryError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DirectoryError::Credentials(format!("cannot read {}: {}", path.display(), e))
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&raw).map_err(|e| {
            DirectoryError::Credentials(format!("malformed key {}: {}", path.display(), e))
        })?;
        let auth = Self::new(key, subject)?;
        info!(
            client_email = %auth.key.client_email,
            subject = %auth.subject,
            "loaded service account key"
        );
        Ok(auth)
    }

    pub(crate) fn assertion(&self, now: i64) -> Result<String, DirectoryError> {
        let claims = AssertionClaims {
            iss: self.key.client_email.clone(),
            sub: self.subject.clone(),
            scope: DIRECTORY_SCOPES.join(" "),
            aud: self.key.token_uri.clone(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| DirectoryError::Credentials(format!("cannot sign assertion: {}", e)))
    }

    /// A valid access token, exchanging a fresh assertion when the cached
    /// one is missing or about to expire.
    pub async fn access_token(&self, http: &reqwest::Client) -> Result<String, DirectoryError> {
        let mut cache = self.cache.lock().await;
        let now = Utc::now().timestamp();
        if let Some(cached) = cache.as_ref() {
            if cached.expires_at - REFRESH_MARGIN_SECS > now {
                return Ok(cached.value.clone());
            }
        }

        let assertion = self.assertion(now)?;
        let resp = http
            .post(&self.key.token_uri)
            .form(&TokenRequest {
                grant_type: JWT_BEARER_GRANT,
                assertion: &assertion,
            })
            .send()
            .await?;
        let token: TokenResponse = check_response(resp)
            .await?
            .json()
            .await
            .map_err(|e| DirectoryError::Parse(format!("token response: {}", e)))?;

        debug!(expires_in = token.expires_in, "minted directory access token");
        *cache = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: now + token.expires_in,
        });
        Ok(token.access_token)
    }
}

/// How the source adapter authenticates.
pub enum GoogleAuth {
    /// A pre-minted access token, used as-is until it stops working.
    Static(String),
    ServiceAccount(ServiceAccountAuth),
}

impl GoogleAuth {
    pub(crate) async fn bearer(&self, http: &reqwest::Client) -> Result<String, DirectoryError> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::ServiceAccount(auth) => auth.access_token(http).await,
        }
    }
}

impl From<ServiceAccountAuth> for GoogleAuth {
    fn from(auth: ServiceAccountAuth) -> Self {
        Self::ServiceAccount(auth)
    }
}
