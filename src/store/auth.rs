//! OAuth2 access tokens for the Sheets API.
//!
//! A service account key signs a short-lived JWT assertion, which Google's
//! token endpoint exchanges for a bearer token. Tokens are cached until
//! shortly before they expire and dropped early when the API rejects one.

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::GoogleAuth;
use crate::error::StoreError;

/// Read/write access to spreadsheets.
pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// The fields we need from a service account JSON key.
#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// A Google service account able to mint its own access tokens.
pub struct ServiceAccount {
    client_email: String,
    key_id: Option<String>,
    token_uri: String,
    signing_key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccount {
    /// Load a service account JSON key file as downloaded from the Google
    /// Cloud console.
    ///
    /// # Errors
    /// * `StoreError::Connection` if the file is unreadable, is not a
    ///   service account key, or holds an invalid private key
    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let invalid = |reason: String| StoreError::Connection {
            target: format!("service account key {}", path.display()),
            reason,
        };
        let json = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let key: ServiceAccountKey =
            serde_json::from_str(&json).map_err(|e| invalid(e.to_string()))?;
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| invalid(format!("bad private key: {e}")))?;

        Ok(ServiceAccount {
            client_email: key.client_email,
            key_id: key.private_key_id,
            token_uri: key.token_uri,
            signing_key,
            cached: Mutex::new(None),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    fn target(&self) -> String {
        format!("token endpoint for {}", self.client_email)
    }

    /// Current access token, fetching a new one when none is cached or the
    /// cached one is about to expire.
    fn token(&self, agent: &ureq::Agent) -> Result<String, StoreError> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = cached.as_ref().filter(|t| Instant::now() < t.refresh_at) {
            return Ok(token.value.clone());
        }
        let fresh = self.fetch(agent)?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    fn fetch(&self, agent: &ureq::Agent) -> Result<CachedToken, StoreError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: &self.client_email,
            scope: SPREADSHEETS_SCOPE,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();
        let assertion = jsonwebtoken::encode(&header, &claims, &self.signing_key).map_err(|e| {
            StoreError::Unauthorized {
                target: self.target(),
                reason: format!("could not sign assertion: {e}"),
            }
        })?;

        let response: TokenResponse = agent
            .post(&self.token_uri)
            .send_form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)])
            .map_err(|e| match e {
                ureq::Error::Status(status, response) => StoreError::Unauthorized {
                    target: self.target(),
                    reason: format!("HTTP {status}: {}", token_error(response)),
                },
                ureq::Error::Transport(transport) => StoreError::Connection {
                    target: self.target(),
                    reason: transport.to_string(),
                },
            })?
            .into_json()?;

        log::debug!(
            "obtained access token for {}, valid for {}s",
            self.client_email,
            response.expires_in
        );
        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(EXPIRY_MARGIN);
        Ok(CachedToken {
            value: response.access_token,
            refresh_at: Instant::now() + lifetime,
        })
    }

    fn invalidate(&self) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// OAuth error bodies look like `{"error": "invalid_grant", "error_description": "..."}`.
fn token_error(response: ureq::Response) -> String {
    let status_text = response.status_text().to_string();
    let Ok(body) = response.into_json::<Value>() else {
        return status_text;
    };
    let error = body.get("error").and_then(Value::as_str);
    let description = body.get("error_description").and_then(Value::as_str);
    match (error, description) {
        (Some(error), Some(description)) => format!("{error}: {description}"),
        (Some(error), None) => error.to_string(),
        _ => status_text,
    }
}

/// How requests to the Sheets API are authorized.
pub enum Credentials {
    /// A fixed bearer token. It cannot be renewed once it expires.
    AccessToken(String),
    ServiceAccount(ServiceAccount),
}

impl Credentials {
    pub fn from_config(auth: &GoogleAuth) -> Result<Self, StoreError> {
        match auth {
            GoogleAuth::AccessToken(token) => Ok(Credentials::AccessToken(token.clone())),
            GoogleAuth::ServiceAccount(path) => {
                let account = ServiceAccount::from_file(path)?;
                log::info!("authenticating as service account {}", account.client_email());
                Ok(Credentials::ServiceAccount(account))
            }
        }
    }

    /// Token to send as `Authorization: Bearer ...`.
    pub fn bearer(&self, agent: &ureq::Agent) -> Result<String, StoreError> {
        match self {
            Credentials::AccessToken(token) => Ok(token.clone()),
            Credentials::ServiceAccount(account) => account.token(agent),
        }
    }

    /// Whether a rejected token can be replaced by asking for a new one.
    pub fn refreshable(&self) -> bool {
        matches!(self, Credentials::ServiceAccount(_))
    }

    /// Forget any cached token so the next request fetches a fresh one.
    pub fn invalidate(&self) {
        if let Credentials::ServiceAccount(account) = self {
            account.invalidate();
        }
    }
}
