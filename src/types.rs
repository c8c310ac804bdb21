use crate::client::Response;
use crate::error::{AuthError, JsonErrorOr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens this close to their expiry are treated as expired already.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Represents a token as returned by OAuth2 servers.
///
/// It is produced by all authentication flows and persisted by the token cache.
/// The expiry is kept in absolute terms so that a reloaded token can be judged
/// without knowing when it was obtained.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct Credential {
    /// used when authenticating calls to oauth2 enabled services.
    pub access_token: String,
    /// used to refresh an expired access_token.
    pub refresh_token: Option<String>,
    /// The time when the token expires.
    pub expires_at: Option<DateTime<Utc>>,
    /// The token type as string - usually 'Bearer'.
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Credential {
    /// Returns true if we are expired, or about to expire.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub(crate) fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.access_token.is_empty()
            || self
                .expires_at
                .map(|expiry| expiry - Duration::seconds(EXPIRY_SKEW_SECS) <= now)
                .unwrap_or(false)
    }

    /// Value of the `Authorization` header for API requests.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    /// Parse a token endpoint response. Server errors, timeouts and throttling are
    /// `AuthError::Unavailable`; the request may succeed when repeated later.
    pub(crate) fn from_response(response: &Response) -> Result<Credential, AuthError> {
        let status = response.status();
        if status.is_server_error()
            || status == http::StatusCode::REQUEST_TIMEOUT
            || status == http::StatusCode::TOO_MANY_REQUESTS
        {
            return Err(AuthError::Unavailable(format!(
                "{}: {}",
                status,
                String::from_utf8_lossy(&response.body)
            )));
        }
        Credential::from_json(&response.body)
    }

    /// Parse the body of a token endpoint response.
    pub(crate) fn from_json(json_data: &[u8]) -> Result<Credential, AuthError> {
        let RawToken {
            access_token,
            refresh_token,
            token_type,
            expires_in,
        } = serde_json::from_slice::<JsonErrorOr<RawToken>>(json_data)?.into_result()?;

        let access_token = access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::BadServerResponse("response lacks access_token".into()))?;
        let expires_at = expires_in.map(|seconds_from_now| Utc::now() + Duration::seconds(seconds_from_now));

        Ok(Credential {
            access_token,
            refresh_token,
            expires_at,
            token_type: token_type.unwrap_or_else(default_token_type),
        })
    }
}

/// This is the schema of the server's response.
#[derive(Deserialize, Debug)]
struct RawToken {
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
}

/// OAuth client secrets of an installed application.
///
/// The field names match the json files downloaded from the
/// [google developer console](https://console.cloud.google.com/apis/credentials).
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplicationSecret {
    /// The client ID.
    pub client_id: String,
    /// The client secret.
    pub client_secret: String,
    /// The token server endpoint URI.
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    /// The authorization server endpoint URI.
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    /// Redirect URIs registered for the client.
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    /// Name of the google project the credentials are associated with
    pub project_id: Option<String>,
}

pub(crate) fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

pub(crate) fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

/// A type to facilitate reading and writing the json secret file
/// as returned by the google developer console.
#[derive(Deserialize, Serialize, Default, Debug)]
pub struct ConsoleApplicationSecret {
    /// Secret of a web application.
    pub web: Option<ApplicationSecret>,
    /// Secret of an installed application.
    pub installed: Option<ApplicationSecret>,
}
