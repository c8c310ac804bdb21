//! Helper functions allowing you to avoid writing boilerplate code for common operations, such as
//! parsing JSON or reading files.

// Copyright (c) 2016 Google Inc (lewinb@google.com).
//
// Refer to the project root for licensing information.
use crate::config::{Config, ConfigError};
use crate::service_account::ServiceAccountKey;

use itertools::Itertools;
use std::path::Path;

/// Read the secrets file at `path` and resolve it into a `Config`.
pub async fn read_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let data = tokio::fs::read_to_string(path).await?;
    Config::from_json(&data)
}

/// Parse a service account key from a JSON blob.
pub fn parse_service_account_key<S: AsRef<[u8]>>(
    key: S,
) -> Result<ServiceAccountKey, serde_json::Error> {
    serde_json::from_slice(key.as_ref())
}

pub(crate) fn join<T>(pieces: &[T], separator: &str) -> String
where
    T: AsRef<str>,
{
    pieces.iter().map(|p| p.as_ref()).join(separator)
}

/// Shorten a secret for log output.
pub(crate) fn redact(secret: &str) -> String {
    let visible: String = secret.chars().take(6).collect();
    format!("{}…", visible)
}
