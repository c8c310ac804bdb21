//! Configuration of the tool, parsed once at startup and passed in explicitly.
//!
//! All of it lives in a single json secrets file:
//!
//! ```json
//! {
//!   "oauth2_credentials": {
//!     "client_id": "...apps.googleusercontent.com",
//!     "client_secret": "...",
//!     "project_id": "my-project",
//!     "redirect_uris": ["http://localhost"]
//!   },
//!   "service_account_key": "{\"type\": \"service_account\", ...}",
//!   "settings": { "strategy": "cached-oauth", "token_cache": "token.json" }
//! }
//! ```
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error as ThisError;

use crate::service_account::ServiceAccountKey;
use crate::types::{ApplicationSecret, ConsoleApplicationSecret};

/// OAuth scope allowing full read/write access to the user's videos.
pub const YOUTUBE_FORCE_SSL_SCOPE: &str = "https://www.googleapis.com/auth/youtube.force-ssl";

/// Resumable upload chunks must be multiples of this size.
pub const UPLOAD_CHUNK_GRANULARITY: usize = 256 * 1024;

pub(crate) const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 32 * UPLOAD_CHUNK_GRANULARITY;

/// YouTube Data API v3.
pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Media upload endpoint of the YouTube Data API v3.
pub const DEFAULT_UPLOAD_BASE_URL: &str = "https://www.googleapis.com/upload/youtube/v3";

/// Errors while reading or validating the configuration.
#[derive(Debug, ThisError)]
pub enum ConfigError {
    /// The secrets file could not be read.
    #[error("cannot read secrets file: {0}")]
    Io(#[from] std::io::Error),
    /// The secrets file is not valid json, or has the wrong shape.
    #[error("malformed secrets: {0}")]
    Json(#[from] serde_json::Error),
    /// A section required by the selected strategy is absent.
    #[error("missing {0}")]
    Missing(&'static str),
    /// A value is present but unusable.
    #[error("invalid {0}")]
    Invalid(String),
}

/// How a credential is obtained. Selected once, when the configuration is loaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Reuse the token cache, refresh it if needed, fall back to interactive consent.
    #[serde(rename = "cached-oauth")]
    CachedOAuth,
    /// Always ask for consent at startup.
    #[serde(rename = "interactive-oauth")]
    InteractiveOAuth,
    /// Non-interactive service account key.
    ServiceAccount,
}

/// Fully resolved configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// OAuth client of the installed application, required by the OAuth strategies.
    pub app_secret: Option<ApplicationSecret>,
    /// Service account key, required by the service account strategy.
    pub service_account_key: Option<ServiceAccountKey>,
    /// Selected strategy.
    pub strategy: Strategy,
    /// Location of the token cache file.
    pub token_cache: PathBuf,
    /// Scopes requested for every credential.
    pub scopes: Vec<String>,
    /// Fixed loopback port for the consent redirect; ephemeral when `None`.
    pub redirect_port: Option<u16>,
    /// How long to wait for the user to finish consent.
    pub consent_timeout: Duration,
    /// Whether a failed or missing cached credential may fall back to interactive consent.
    pub interactive_fallback: bool,
    /// Timeout of a single HTTP request.
    pub request_timeout: Duration,
    /// Chunk size of resumable uploads.
    pub upload_chunk_size: usize,
    /// Base URL of the video API, e.g. `https://www.googleapis.com/youtube/v3`.
    pub api_base_url: String,
    /// Base URL of the media upload API.
    pub upload_base_url: String,
    /// Address the form UI listens on.
    pub ui_addr: SocketAddr,
}

#[derive(Deserialize, Debug, Default)]
struct SecretsFile {
    oauth2_credentials: Option<ApplicationSecret>,
    #[serde(flatten)]
    console: ConsoleApplicationSecret,
    service_account_key: Option<KeyBlob>,
    #[serde(default)]
    settings: Settings,
}

/// The key is usually pasted into the secrets store as a string holding json.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum KeyBlob {
    Json(String),
    Inline(ServiceAccountKey),
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct Settings {
    strategy: Option<Strategy>,
    token_cache: Option<PathBuf>,
    scopes: Option<Vec<String>>,
    redirect_port: Option<u16>,
    consent_timeout_secs: Option<u64>,
    interactive_fallback: Option<bool>,
    request_timeout_secs: Option<u64>,
    upload_chunk_size: Option<usize>,
    api_base_url: Option<String>,
    upload_base_url: Option<String>,
    ui_addr: Option<SocketAddr>,
}

impl Config {
    /// Parse and validate the contents of a secrets file.
    pub fn from_json(data: &str) -> Result<Config, ConfigError> {
        let file: SecretsFile = serde_json::from_str(data)?;
        let settings = file.settings;

        let app_secret = file
            .oauth2_credentials
            .or(file.console.installed)
            .or(file.console.web);
        let service_account_key = match file.service_account_key {
            Some(KeyBlob::Json(blob)) => Some(crate::helper::parse_service_account_key(blob)?),
            Some(KeyBlob::Inline(key)) => Some(key),
            None => None,
        };

        let strategy = settings.strategy.unwrap_or(if service_account_key.is_some() {
            Strategy::ServiceAccount
        } else {
            Strategy::CachedOAuth
        });

        let upload_chunk_size = settings
            .upload_chunk_size
            .unwrap_or(DEFAULT_UPLOAD_CHUNK_SIZE);
        if upload_chunk_size == 0 || upload_chunk_size % UPLOAD_CHUNK_GRANULARITY != 0 {
            return Err(ConfigError::Invalid(format!(
                "upload_chunk_size {}: must be a positive multiple of {}",
                upload_chunk_size, UPLOAD_CHUNK_GRANULARITY
            )));
        }

        let config = Config {
            app_secret,
            service_account_key,
            strategy,
            token_cache: settings
                .token_cache
                .unwrap_or_else(|| PathBuf::from("token.json")),
            scopes: settings
                .scopes
                .unwrap_or_else(|| vec![YOUTUBE_FORCE_SSL_SCOPE.to_string()]),
            redirect_port: settings.redirect_port,
            consent_timeout: Duration::from_secs(settings.consent_timeout_secs.unwrap_or(300)),
            interactive_fallback: settings.interactive_fallback.unwrap_or(true),
            request_timeout: Duration::from_secs(settings.request_timeout_secs.unwrap_or(60)),
            upload_chunk_size,
            api_base_url: trim_base(
                settings
                    .api_base_url
                    .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            ),
            upload_base_url: trim_base(
                settings
                    .upload_base_url
                    .unwrap_or_else(|| DEFAULT_UPLOAD_BASE_URL.to_string()),
            ),
            ui_addr: settings
                .ui_addr
                .unwrap_or_else(|| ([127, 0, 0, 1], 8501).into()),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scopes.is_empty() {
            return Err(ConfigError::Invalid("scopes: at least one scope is required".into()));
        }
        match self.strategy {
            Strategy::CachedOAuth | Strategy::InteractiveOAuth => {
                let secret = self
                    .app_secret
                    .as_ref()
                    .ok_or(ConfigError::Missing("oauth2_credentials"))?;
                if secret.client_id.is_empty() {
                    return Err(ConfigError::Missing("oauth2_credentials.client_id"));
                }
                if secret.client_secret.is_empty() {
                    return Err(ConfigError::Missing("oauth2_credentials.client_secret"));
                }
            }
            Strategy::ServiceAccount => {
                let key = self
                    .service_account_key
                    .as_ref()
                    .ok_or(ConfigError::Missing("service_account_key"))?;
                if key.private_key.is_empty() || key.client_email.is_empty() {
                    return Err(ConfigError::Invalid(
                        "service_account_key: private_key and client_email are required".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
