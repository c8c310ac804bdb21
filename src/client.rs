//! Module containing the HTTP client used for sending requests
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::{connect::Connect, Error as LegacyHyperError};
use rustls::crypto::ring::default_provider as default_crypto_provider;
use thiserror::Error as ThisError;

/// Body type of every outgoing request.
pub type RequestBody = Full<Bytes>;
pub(crate) type LegacyClient<C> = hyper_util::client::legacy::Client<C, RequestBody>;
/// Connector used by [`DefaultHyperClientBuilder`].
pub type DefaultConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;

#[derive(Debug, ThisError)]
/// Errors that can happen when a request is sent
pub enum SendError {
    /// Request could not complete before timeout elapsed
    #[error("Request timed out")]
    Timeout,
    /// Wrapper for hyper errors
    #[error("Hyper error: {0}")]
    Hyper(#[source] LegacyHyperError),
    /// The response body could not be read
    #[error("Error reading response body: {0}")]
    Body(#[source] hyper::Error),
    /// The request could not be assembled
    #[error("Invalid request: {0}")]
    Request(#[source] http::Error),
}

/// A fully read response.
#[derive(Debug)]
pub struct Response {
    /// Status line and headers.
    pub head: http::response::Parts,
    /// Complete body.
    pub body: Bytes,
}

impl Response {
    /// The response status.
    pub fn status(&self) -> http::StatusCode {
        self.head.status
    }

    /// A header value, if present and valid UTF-8.
    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A trait implemented for any hyper_util::client::legacy::Client as well as the DefaultHyperClient.
pub trait HyperClientBuilder {
    /// The hyper connector that the resulting hyper client will use.
    type Connector: Connect + Clone + Send + Sync + 'static;

    /// Sets duration after which a request times out
    fn with_timeout(self, timeout: Duration) -> Self;

    /// Create a hyper::Client
    fn build_hyper_client(self) -> Result<HttpClient<Self::Connector>, std::io::Error>;
}

/// Client that can be configured that a request will timeout after a specified
/// duration.
#[derive(Clone)]
pub struct HttpClient<C = DefaultConnector>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    client: LegacyClient<C>,
    timeout: Option<Duration>,
}

impl<C> HttpClient<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(hyper_client: LegacyClient<C>, timeout: Option<Duration>) -> Self {
        Self {
            client: hyper_client,
            timeout,
        }
    }

    /// Send `payload` and read the whole response body. The timeout, if any, covers both.
    pub async fn send(&self, payload: http::Request<RequestBody>) -> Result<Response, SendError> {
        let future = async {
            let (head, body) = self
                .client
                .request(payload)
                .await
                .map_err(SendError::Hyper)?
                .into_parts();
            let body = body.collect().await.map_err(SendError::Body)?.to_bytes();
            Ok::<_, SendError>(Response { head, body })
        };
        match self.timeout {
            Some(duration) => tokio::time::timeout(duration, future)
                .await
                .map_err(|_| SendError::Timeout)?,
            None => future.await,
        }
    }
}

impl<C> HyperClientBuilder for HttpClient<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    type Connector = C;

    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn build_hyper_client(self) -> Result<HttpClient<Self::Connector>, std::io::Error> {
        Ok(self)
    }
}

/// The builder value used when the default hyper client should be used.
#[derive(Default)]
pub struct DefaultHyperClientBuilder {
    timeout: Option<Duration>,
}

impl HyperClientBuilder for DefaultHyperClientBuilder {
    type Connector = DefaultConnector;

    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn build_hyper_client(self) -> Result<HttpClient<Self::Connector>, std::io::Error> {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(default_crypto_provider())
            .map_err(std::io::Error::other)?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();

        Ok(HttpClient::new(
            hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
                .pool_max_idle_per_host(0)
                .build::<_, RequestBody>(connector),
            self.timeout,
        ))
    }
}

/// Intended for using an existing hyper client. Instantiate
/// with [`CustomHyperClientBuilder::from`]
pub struct CustomHyperClientBuilder<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    client: LegacyClient<C>,
    timeout: Option<Duration>,
}

impl<C> From<LegacyClient<C>> for CustomHyperClientBuilder<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    fn from(client: LegacyClient<C>) -> Self {
        Self {
            client,
            timeout: None,
        }
    }
}

impl<C> HyperClientBuilder for CustomHyperClientBuilder<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    type Connector = C;

    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn build_hyper_client(self) -> Result<HttpClient<Self::Connector>, std::io::Error> {
        Ok(HttpClient::new(self.client, self.timeout))
    }
}

/// Shorthand for a form-encoded POST, as used by every token endpoint.
pub(crate) fn form_post(uri: &str, body: String) -> Result<http::Request<RequestBody>, SendError> {
    http::Request::post(uri)
        .header(
            http::header::CONTENT_TYPE,
            mime::APPLICATION_WWW_FORM_URLENCODED.as_ref(),
        )
        .body(Full::new(Bytes::from(body)))
        .map_err(SendError::Request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_post() {
        let req = form_post("http://localhost/token", "a=b".to_string()).unwrap();
        assert_eq!(req.method(), http::Method::POST);
        assert_eq!(
            req.headers()[http::header::CONTENT_TYPE],
            "application/x-www-form-urlencoded"
        );
    }

    #[test]
    fn test_form_post_rejects_bad_uri() {
        assert!(matches!(
            form_post("not a uri", String::new()),
            Err(SendError::Request(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_applies() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = DefaultHyperClientBuilder::default()
            .with_timeout(Duration::from_millis(50))
            .build_hyper_client()
            .unwrap();
        let req = http::Request::get(format!("http://{}/", addr))
            .body(Full::new(Bytes::new()))
            .unwrap();
        // The listener accepts but never answers.
        let res = client.send(req).await;
        assert!(matches!(res, Err(SendError::Timeout)));
        drop(listener);
    }
}
