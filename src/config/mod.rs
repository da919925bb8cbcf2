//! Configuration module for the collection report bot.
//!
//! Loads configuration from environment variables (after `.env`).

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

const DEFAULT_PROJECT_ID: &str = "looky-374212";
const DEFAULT_COLLECTIONS_TABLE: &str = "looky-374212.mosaica.showoff_custom_collections";
const DEFAULT_COMPANY_ID: &str = "tsum_cs";
const DEFAULT_ADMIN_URL: &str = "https://sandbox-prod.mosaica.ai";
const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
const DEFAULT_TARGET_STATUS: &str = "tsum cs";
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;
const DEFAULT_ADMIN_COLLECTION_URL: &str = "https://admin.dresscode.ai/collection";
const DEFAULT_PUBLIC_COLLECTION_URL: &str = "https://catalog.dresscode.ai/collection";

/// Errors raised while reading the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read credentials file {path}: {source}")]
    CredentialsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Warehouse (BigQuery) settings.
#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    pub project_id: String,
    pub collections_table: String,
    pub company_id: String,
    /// Service account JSON document (already read from disk if a path was given).
    pub credentials_json: String,
}

/// Admin panel and browser settings.
#[derive(Clone)]
pub struct AdminPanelConfig {
    pub base_url: String,
    pub email: Option<String>,
    pub password: Option<String>,
    pub webdriver_url: String,
    pub headless: bool,
}

impl AdminPanelConfig {
    /// Login credentials, if both are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.email.as_deref(), self.password.as_deref()) {
            (Some(email), Some(password)) => Some((email, password)),
            _ => None,
        }
    }
}

impl std::fmt::Debug for AdminPanelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminPanelConfig")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("webdriver_url", &self.webdriver_url)
            .field("headless", &self.headless)
            .finish()
    }
}

/// Status polling settings.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub target_status: String,
    pub check_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            target_status: DEFAULT_TARGET_STATUS.to_string(),
            check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS),
        }
    }
}

/// Link bases used when rendering reports.
#[derive(Debug, Clone)]
pub struct ReportLinks {
    /// Used in on-demand reports.
    pub admin_base: String,
    /// Used in broadcast reports.
    pub public_base: String,
}

impl Default for ReportLinks {
    fn default() -> Self {
        Self {
            admin_base: DEFAULT_ADMIN_COLLECTION_URL.to_string(),
            public_base: DEFAULT_PUBLIC_COLLECTION_URL.to_string(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // Telegram
    pub bot_token: String,

    /// Directory with users.json, chats.json and the status snapshot.
    pub data_dir: PathBuf,

    pub bigquery: BigQueryConfig,
    pub admin_panel: AdminPanelConfig,
    pub tracker: TrackerConfig,
    pub links: ReportLinks,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_token = var("TELEGRAM_TOKEN")
            .or_else(|| var("BOT_TOKEN"))
            .ok_or(ConfigError::Missing("TELEGRAM_TOKEN"))?;

        let data_dir = var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));

        let credentials = var("GOOGLE_APPLICATION_CREDENTIALS")
            .ok_or(ConfigError::Missing("GOOGLE_APPLICATION_CREDENTIALS"))?;
        let credentials_json = read_credentials(&credentials)?;

        let bigquery = BigQueryConfig {
            project_id: var("BIGQUERY_PROJECT_ID").unwrap_or_else(|| DEFAULT_PROJECT_ID.into()),
            collections_table: var("BIGQUERY_TABLE_COLLECTIONS")
                .unwrap_or_else(|| DEFAULT_COLLECTIONS_TABLE.into()),
            company_id: var("BIGQUERY_COMPANY_ID").unwrap_or_else(|| DEFAULT_COMPANY_ID.into()),
            credentials_json,
        };

        let admin_panel = AdminPanelConfig {
            base_url: parse_base_url(
                "ADMIN_URL",
                var("ADMIN_URL").unwrap_or_else(|| DEFAULT_ADMIN_URL.into()),
            )?,
            email: var("ADMIN_EMAIL").or_else(|| var("EMAIL")),
            password: var("ADMIN_PASSWORD").or_else(|| var("PASSWORD_M")),
            webdriver_url: var("WEBDRIVER_URL")
                .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.into())
                .trim_end_matches('/')
                .to_string(),
            headless: parse_bool("BROWSER_HEADLESS", var("BROWSER_HEADLESS"))?,
        };

        let check_interval = match var("STATUS_CHECK_INTERVAL") {
            Some(raw) => parse_interval(&raw)?,
            None => Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS),
        };

        let tracker = TrackerConfig {
            target_status: var("TARGET_STATUS")
                .map(|s| s.to_lowercase())
                .unwrap_or_else(|| DEFAULT_TARGET_STATUS.into()),
            check_interval,
        };

        let links = ReportLinks {
            admin_base: var("ADMIN_COLLECTION_URL")
                .unwrap_or_else(|| DEFAULT_ADMIN_COLLECTION_URL.into())
                .trim_end_matches('/')
                .to_string(),
            public_base: var("PUBLIC_COLLECTION_URL")
                .unwrap_or_else(|| DEFAULT_PUBLIC_COLLECTION_URL.into())
                .trim_end_matches('/')
                .to_string(),
        };

        Ok(Self {
            bot_token,
            data_dir,
            bigquery,
            admin_panel,
            tracker,
            links,
        })
    }

    pub fn users_file(&self) -> PathBuf {
        self.data_dir.join("users.json")
    }

    pub fn chats_file(&self) -> PathBuf {
        self.data_dir.join("chats.json")
    }

    pub fn status_file(&self) -> PathBuf {
        self.data_dir.join("collections_status.json")
    }

    pub fn cookies_file(&self) -> PathBuf {
        self.data_dir.join("google_cookies.json")
    }
}

/// Accept either an inline JSON document or a path to one.
fn read_credentials(raw: &str) -> Result<String, ConfigError> {
    let path = Path::new(raw);
    let json = if !raw.trim_start().starts_with('{') && path.is_file() {
        std::fs::read_to_string(path).map_err(|source| ConfigError::CredentialsFile {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        raw.to_string()
    };

    serde_json::from_str::<serde_json::Value>(&json).map_err(|e| ConfigError::Invalid {
        name: "GOOGLE_APPLICATION_CREDENTIALS",
        value: "<redacted>".into(),
        reason: format!("not valid JSON: {e}"),
    })?;

    Ok(json)
}

/// Require an absolute URL with a host, returned without the trailing slash.
fn parse_base_url(name: &'static str, raw: String) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        name,
        value: raw.clone(),
        reason,
    };
    let url = url::Url::parse(&raw).map_err(|e| invalid(e.to_string()))?;
    if url.host().is_none() {
        return Err(invalid("no host".into()));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn parse_interval(raw: &str) -> Result<Duration, ConfigError> {
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        Ok(_) => Err(ConfigError::Invalid {
            name: "STATUS_CHECK_INTERVAL",
            value: raw.to_string(),
            reason: "must be positive".into(),
        }),
        Err(e) => Err(ConfigError::Invalid {
            name: "STATUS_CHECK_INTERVAL",
            value: raw.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn parse_bool(name: &'static str, raw: Option<String>) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_lowercase).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            name,
            value: other.to_string(),
            reason: "expected true or false".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const CREDS: &str = r#"{"client_email":"bot@example.iam.gserviceaccount.com","private_key":"k"}"#;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("TELEGRAM_TOKEN", "123:abc"),
            ("GOOGLE_APPLICATION_CREDENTIALS", CREDS),
        ]))
        .unwrap();

        assert_eq!(config.tracker.target_status, "tsum cs");
        assert_eq!(config.tracker.check_interval, Duration::from_secs(60));
        assert_eq!(config.bigquery.company_id, "tsum_cs");
        assert_eq!(config.status_file(), PathBuf::from("data/collections_status.json"));
        assert!(config.admin_panel.credentials().is_none());
    }

    #[test]
    fn test_aliases_and_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("BOT_TOKEN", "123:abc"),
            ("GOOGLE_APPLICATION_CREDENTIALS", CREDS),
            ("EMAIL", "ops@example.com"),
            ("PASSWORD_M", "secret"),
            ("STATUS_CHECK_INTERVAL", "15"),
            ("TARGET_STATUS", "TSUM CS"),
        ]))
        .unwrap();

        assert_eq!(config.bot_token, "123:abc");
        assert_eq!(config.tracker.check_interval, Duration::from_secs(15));
        assert_eq!(config.tracker.target_status, "tsum cs");
        assert_eq!(
            config.admin_panel.credentials(),
            Some(("ops@example.com", "secret"))
        );
    }

    #[test]
    fn test_rejects_zero_interval() {
        let err = Config::from_lookup(lookup(&[
            ("TELEGRAM_TOKEN", "123:abc"),
            ("GOOGLE_APPLICATION_CREDENTIALS", CREDS),
            ("STATUS_CHECK_INTERVAL", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "STATUS_CHECK_INTERVAL", .. }));
    }

    #[test]
    fn test_rejects_malformed_credentials() {
        let err = Config::from_lookup(lookup(&[
            ("TELEGRAM_TOKEN", "123:abc"),
            ("GOOGLE_APPLICATION_CREDENTIALS", "{not json"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_admin_url_must_have_host() {
        let with = |url: &str| {
            Config::from_lookup(lookup(&[
                ("TELEGRAM_TOKEN", "123:abc"),
                ("GOOGLE_APPLICATION_CREDENTIALS", CREDS),
                ("ADMIN_URL", url),
            ]))
        };

        assert_eq!(
            with("https://admin.mosaica.ai/").unwrap().admin_panel.base_url,
            "https://admin.mosaica.ai"
        );
        assert!(matches!(
            with("admin.mosaica.ai").unwrap_err(),
            ConfigError::Invalid { name: "ADMIN_URL", .. }
        ));
        assert!(matches!(
            with("data:text/plain,mosaica.ai").unwrap_err(),
            ConfigError::Invalid { name: "ADMIN_URL", .. }
        ));
    }

    #[test]
    fn test_missing_token() {
        let err = Config::from_lookup(lookup(&[("GOOGLE_APPLICATION_CREDENTIALS", CREDS)]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("TELEGRAM_TOKEN")));
    }
}
