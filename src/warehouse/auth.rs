//! Google service account authentication.
//!
//! Signs an RS256 assertion with the account key and exchanges it for an
//! OAuth access token. Tokens are reused until shortly before expiry.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::WarehouseError;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";
const ASSERTION_LIFETIME_SECS: u64 = 3600;
const KEY_END_MARKER: &str = "-----END PRIVATE KEY-----";

/// Refresh this long before the token actually expires.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// The fields of a service account key file we need.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl ServiceAccountKey {
    /// Parse a key file and repair the private key.
    pub fn from_json(json: &str) -> Result<Self, WarehouseError> {
        let mut key: Self = serde_json::from_str(json)
            .map_err(|e| WarehouseError::Credentials(format!("not a service account key: {e}")))?;
        key.private_key = repair_private_key(&key.private_key)?;
        Ok(key)
    }

    fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }
}

/// Keys pasted into `.env` often arrive with escaped newlines or
/// surrounding garbage.
fn repair_private_key(raw: &str) -> Result<String, WarehouseError> {
    let mut key = if raw.contains("\\\\n") {
        raw.replace("\\\\n", "\n")
    } else {
        raw.replace("\\n", "\n")
    };
    key = key.trim().to_string();

    let begin = key
        .find("-----BEGIN")
        .ok_or_else(|| WarehouseError::Credentials("private_key is missing -----BEGIN".into()))?;
    if begin > 0 {
        warn!("private_key has leading garbage, trimming");
        key.drain(..begin);
    }

    match key.rfind(KEY_END_MARKER) {
        Some(end) => key.truncate(end + KEY_END_MARKER.len()),
        None => warn!("Could not find proper end of private_key"),
    }

    if key.len() < 100 {
        return Err(WarehouseError::Credentials(format!(
            "private_key is too short ({} chars)",
            key.len()
        )));
    }

    Ok(key)
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECS
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Supplies bearer tokens for BigQuery requests.
pub struct TokenProvider {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(key: ServiceAccountKey, http: reqwest::Client) -> Result<Self, WarehouseError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| WarehouseError::Credentials(format!("unusable private_key: {e}")))?;

        info!("Service account loaded: {}", key.client_email);

        Ok(Self {
            key,
            encoding_key,
            http,
            cached: Mutex::new(None),
        })
    }

    /// A valid access token, fetching a new one if needed.
    pub async fn token(&self) -> Result<String, WarehouseError> {
        if let Some(cached) = self.cached.lock().as_ref()
            && cached.refresh_at > Instant::now()
        {
            return Ok(cached.value.clone());
        }

        let fetched = self.fetch().await?;
        let lifetime = Duration::from_secs(fetched.expires_in).saturating_sub(EXPIRY_MARGIN);

        *self.cached.lock() = Some(CachedToken {
            value: fetched.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        debug!("Fetched access token, valid for {}s", fetched.expires_in);
        Ok(fetched.access_token)
    }

    fn assertion(&self) -> Result<String, WarehouseError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| WarehouseError::Auth(e.to_string()))?
            .as_secs();

        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: BIGQUERY_SCOPE,
            aud: self.key.token_uri(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| WarehouseError::Auth(format!("signing assertion failed: {e}")))
    }

    async fn fetch(&self) -> Result<TokenResponse, WarehouseError> {
        let assertion = self.assertion()?;

        let response = self
            .http
            .post(self.key.token_uri())
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WarehouseError::Auth(format!("{status}: {body}")));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| WarehouseError::Auth(format!("bad token response: {e}")))
    }
}
