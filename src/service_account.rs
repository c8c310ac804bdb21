//! This module provides a flow that obtains tokens for service accounts.
//!
//! Service accounts are usually used by software (i.e., non-human actors) to get access to
//! resources. Currently, this module only works with RS256 JWTs, which makes it at least suitable
//! for authentication with Google services.
//!
//! Resources:
//! - [Using OAuth 2.0 for Server to Server
//!   Applications](https://developers.google.com/identity/protocols/OAuth2ServiceAccount)
//! - [JSON Web Tokens](https://jwt.io/)
//!
//! Copyright (c) 2016 Google Inc (lewinb@google.com).
//!
use std::sync::Arc;

use base64::Engine as _;
use hyper_util::client::legacy::connect::Connect;
use rustls::crypto::ring::sign::any_supported_type;
use rustls::pki_types::PrivateKeyDer;
use rustls::sign::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::client::{form_post, HttpClient};
use crate::config::ConfigError;
use crate::error::AuthError;
use crate::types::{default_token_uri, Credential};

const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const GOOGLE_RS256_HEAD: &str = r#"{"alg":"RS256","typ":"JWT"}"#;

/// Encodes s as Base64
fn append_base64<T: AsRef<[u8]> + ?Sized>(s: &T, out: &mut String) {
    base64::engine::general_purpose::URL_SAFE.encode_string(s, out)
}

/// Decode a PKCS8 formatted RSA key.
fn decode_rsa_key(pem_pkcs8: &str) -> Result<PrivateKeyDer<'static>, ConfigError> {
    let private_key = rustls_pemfile::pkcs8_private_keys(&mut pem_pkcs8.as_bytes()).next();

    match private_key {
        Some(Ok(key)) => Ok(PrivateKeyDer::Pkcs8(key)),
        Some(Err(e)) => Err(ConfigError::Invalid(format!(
            "service_account_key.private_key: error reading key from PEM: {}",
            e
        ))),
        None => Err(ConfigError::Invalid(
            "service_account_key.private_key: no PKCS#8 private key in PEM".to_string(),
        )),
    }
}

/// JSON schema of secret service account key. You can obtain the key from
/// the Cloud Console at <https://console.cloud.google.com/>.
///
/// You can use `parse_service_account_key()` as a quick way to parse a JSON
/// key blob into a ServiceAccountKey.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    /// key_type
    pub key_type: Option<String>,
    /// project_id
    pub project_id: Option<String>,
    /// private_key_id
    pub private_key_id: Option<String>,
    /// private_key
    pub private_key: String,
    /// client_email
    pub client_email: String,
    /// client_id
    pub client_id: Option<String>,
    /// token_uri
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

/// Permissions requested for a JWT.
/// See <https://developers.google.com/identity/protocols/OAuth2ServiceAccount#authorizingrequests>.
#[derive(Serialize, Debug)]
pub(crate) struct Claims<'a> {
    iss: &'a str,
    aud: &'a str,
    exp: i64,
    iat: i64,
    scope: String,
}

impl<'a> Claims<'a> {
    pub(crate) fn new<T>(key: &'a ServiceAccountKey, scopes: &[T]) -> Self
    where
        T: AsRef<str>,
    {
        let iat = chrono::Utc::now().timestamp();
        let expiry = iat + 3600 - 5; // Max validity is 1h.

        Claims {
            iss: &key.client_email,
            aud: &key.token_uri,
            exp: expiry,
            iat,
            scope: crate::helper::join(scopes, " "),
        }
    }
}

/// A JSON Web Token ready for signing.
pub(crate) struct JWTSigner {
    signer: Box<dyn Signer>,
}

impl JWTSigner {
    fn new(private_key: &str) -> Result<Self, AuthError> {
        let key = decode_rsa_key(private_key)?;
        let signing_key: Arc<dyn SigningKey> = any_supported_type(&key)
            .map_err(|_| AuthError::Signing("Couldn't initialize signer".to_string()))?;
        let signer = signing_key
            .choose_scheme(&[rustls::SignatureScheme::RSA_PKCS1_SHA256])
            .ok_or_else(|| AuthError::Signing("Couldn't choose signing scheme".to_string()))?;
        Ok(JWTSigner { signer })
    }

    fn sign_claims(&self, claims: &Claims) -> Result<String, AuthError> {
        let mut jwt_head = Self::encode_claims(claims)?;
        let signature = self
            .signer
            .sign(jwt_head.as_bytes())
            .map_err(|e| AuthError::Signing(e.to_string()))?;
        jwt_head.push('.');
        append_base64(&signature, &mut jwt_head);
        Ok(jwt_head)
    }

    /// Encodes the first two parts (header and claims) to base64 and assembles them into a form
    /// ready to be signed.
    fn encode_claims(claims: &Claims) -> Result<String, AuthError> {
        let mut head = String::new();
        append_base64(GOOGLE_RS256_HEAD, &mut head);
        head.push('.');
        append_base64(&serde_json::to_string(&claims)?, &mut head);
        Ok(head)
    }
}

/// ServiceAccountFlow can fetch oauth tokens using a service account.
pub struct ServiceAccountFlow {
    key: ServiceAccountKey,
    signer: JWTSigner,
}

impl ServiceAccountFlow {
    /// The key is parsed and checked here, so malformed keys fail before any request is made.
    pub(crate) fn new(key: ServiceAccountKey) -> Result<Self, AuthError> {
        let signer = JWTSigner::new(&key.private_key)?;
        Ok(ServiceAccountFlow { key, signer })
    }

    /// Send a request for a new Bearer token to the OAuth provider.
    pub(crate) async fn token<C, T>(
        &self,
        hyper_client: &HttpClient<C>,
        scopes: &[T],
    ) -> Result<Credential, AuthError>
    where
        T: AsRef<str>,
        C: Connect + Clone + Send + Sync + 'static,
    {
        let claims = Claims::new(&self.key, scopes);
        let signed = self.signer.sign_claims(&claims)?;
        let rqbody = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&[("grant_type", GRANT_TYPE), ("assertion", signed.as_str())])
            .finish();
        let request = form_post(&self.key.token_uri, rqbody)?;
        log::debug!("requesting token from service account {}", self.key.client_email);
        let response = hyper_client.send(request).await?;
        log::debug!("received response; head: {:?}", response.head);
        Credential::from_response(&response)
    }
}
