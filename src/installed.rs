//! Loopback consent flow for installed applications: open the consent page, receive the
//! redirect on a local server and exchange the code for a credential.
//!
// Copyright (c) 2016 Google Inc (lewinb@google.com).
//
// Refer to the project root for licensing information.
//
use crate::authenticator_delegate::{DefaultInstalledFlowDelegate, InstalledFlowDelegate};
use crate::client::{form_post, HttpClient};
use crate::error::AuthError;
use crate::types::{ApplicationSecret, Credential};

use futures::lock::Mutex;
use std::borrow::Cow;
use std::convert::AsRef;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper_util::client::legacy::connect::Connect;
use percent_encoding::{percent_encode, AsciiSet, CONTROLS};
use tokio::sync::oneshot;
use url::form_urlencoded;

const QUERY_SET: AsciiSet = CONTROLS.add(b' ').add(b'"').add(b'#').add(b'<').add(b'>');

/// What the redirect carried: the authorization code, or the provider's error.
type Redirect = Result<String, String>;

/// Assembles a URL to request an authorization token (with user interaction).
/// Note that the redirect_uri here has to be some variation of
/// http://localhost:{port}, or the authorization won't work (error "redirect_uri_mismatch")
fn build_authentication_request_url<T>(
    auth_uri: &str,
    client_id: &str,
    scopes: &[T],
    redirect_uri: &str,
) -> String
where
    T: AsRef<str>,
{
    let mut url = String::new();
    let scopes_string = crate::helper::join(scopes, " ");

    url.push_str(auth_uri);

    if !url.contains('?') {
        url.push('?');
    } else {
        match url.chars().last() {
            Some('?') | None => {}
            Some(_) => url.push('&'),
        }
    }

    let params = vec![
        format!("scope={}", scopes_string),
        "&access_type=offline".to_string(),
        format!("&redirect_uri={}", redirect_uri),
        "&response_type=code".to_string(),
        format!("&client_id={}", client_id),
    ];
    params.into_iter().fold(url, |mut u, param| {
        u.push_str(&percent_encode(param.as_ref(), &QUERY_SET).to_string());
        u
    })
}

/// InstalledFlow provides tokens for services that follow the "Installed" OAuth flow with a
/// loopback redirect. (See
/// <https://developers.google.com/identity/protocols/oauth2/native-app#redirect-uri_loopback>).
pub struct InstalledFlow {
    pub(crate) app_secret: ApplicationSecret,
    /// Fixed port of the local server; random if `None`.
    pub(crate) port: Option<u16>,
    pub(crate) flow_delegate: Box<dyn InstalledFlowDelegate>,
    /// How long the user may take to grant access.
    pub(crate) consent_timeout: Duration,
}

impl InstalledFlow {
    /// Create a new InstalledFlow with the provided secret, listening on `port`.
    pub(crate) fn new(app_secret: ApplicationSecret, port: Option<u16>) -> InstalledFlow {
        InstalledFlow {
            app_secret,
            port,
            flow_delegate: Box::new(DefaultInstalledFlowDelegate),
            consent_timeout: Duration::from_secs(300),
        }
    }

    pub(crate) fn app_secret(&self) -> &ApplicationSecret {
        &self.app_secret
    }

    /// Handles the token request flow; it consists of the following steps:
    /// . Spin up a local server and present the consent URL to the user.
    /// . Wait for the provider to redirect the browser to the server, carrying the code.
    /// . Obtain a token and refresh token using that code.
    pub(crate) async fn token<C, T>(
        &self,
        hyper_client: &HttpClient<C>,
        scopes: &[T],
    ) -> Result<Credential, AuthError>
    where
        T: AsRef<str>,
        C: Connect + Clone + Send + Sync + 'static,
    {
        let server = InstalledFlowServer::run(self.port)?;
        let server_addr = server.local_addr();

        // The redirect URI must be this very localhost URL, otherwise authorization is refused
        // by certain providers.
        let redirect_uri: Cow<str> = match self.flow_delegate.redirect_uri() {
            Some(uri) => uri.into(),
            None => format!("http://{}", server_addr).into(),
        };
        let url = build_authentication_request_url(
            &self.app_secret.auth_uri,
            &self.app_secret.client_id,
            scopes,
            redirect_uri.as_ref(),
        );
        log::debug!("Presenting auth url to user: {}", url);
        self.flow_delegate
            .present_user_url(&url)
            .await
            .map_err(AuthError::ConsentAbandoned)?;

        let auth_code = server.wait_for_auth_code(self.consent_timeout).await?;
        self.exchange_auth_code(&auth_code, hyper_client, redirect_uri.as_ref())
            .await
    }

    async fn exchange_auth_code<C>(
        &self,
        authcode: &str,
        hyper_client: &HttpClient<C>,
        redirect_uri: &str,
    ) -> Result<Credential, AuthError>
    where
        C: Connect + Clone + Send + Sync + 'static,
    {
        let request = Self::request_token(&self.app_secret, authcode, redirect_uri)?;
        log::debug!("Sending token request to {}", self.app_secret.token_uri);
        let response = hyper_client.send(request).await?;
        log::debug!("Received response; head: {:?}", response.head);
        Credential::from_response(&response)
    }

    /// Sends the authorization code to the provider in order to obtain access and refresh tokens.
    fn request_token(
        app_secret: &ApplicationSecret,
        authcode: &str,
        redirect_uri: &str,
    ) -> Result<http::Request<crate::client::RequestBody>, AuthError> {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(vec![
                ("code", authcode),
                ("client_id", app_secret.client_id.as_str()),
                ("client_secret", app_secret.client_secret.as_str()),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .finish();

        Ok(form_post(&app_secret.token_uri, body)?)
    }
}

struct InstalledFlowServer {
    addr: SocketAddr,
    auth_code_rx: oneshot::Receiver<Redirect>,
    trigger_shutdown_tx: oneshot::Sender<()>,
    shutdown_complete: tokio::task::JoinHandle<()>,
}

impl InstalledFlowServer {
    fn run(port: Option<u16>) -> Result<Self, AuthError> {
        let (auth_code_tx, auth_code_rx) = oneshot::channel::<Redirect>();
        let (trigger_shutdown_tx, mut trigger_shutdown_rx) = oneshot::channel::<()>();
        let auth_code_tx = Arc::new(Mutex::new(Some(auth_code_tx)));

        let service = hyper::service::service_fn(move |req| {
            installed_flow_server::handle_req(req, auth_code_tx.clone())
        });

        let addr: std::net::SocketAddr = ([127, 0, 0, 1], port.unwrap_or(0)).into();

        let server =
            hyper_util::server::conn::auto::Builder::new(hyper_util::rt::TokioExecutor::new())
                .http1_only();
        let graceful = hyper_util::server::graceful::GracefulShutdown::new();

        let std_listener = std::net::TcpListener::bind(addr)?;
        std_listener.set_nonblocking(true)?;
        let addr = std_listener.local_addr()?;
        let tcp_server = tokio::net::TcpListener::from_std(std_listener)?;

        log::debug!("HTTP server listening on {}", addr);

        let shutdown_complete = tokio::spawn(async move {
            loop {
                let conn = tokio::select! {
                    Ok((conn,_)) = tcp_server.accept() => conn,
                    _ = &mut trigger_shutdown_rx => break,
                    else => break,
                };

                let conn = server
                    .serve_connection(hyper_util::rt::TokioIo::new(conn), service.clone())
                    .into_owned();

                let conn = graceful.watch(conn);

                tokio::spawn(async move {
                    if let Err(err) = conn.await {
                        log::debug!("connection error: {err}");
                    }
                });
            }

            tokio::select! {
                _ = graceful.shutdown() => {
                     log::debug!("Gracefully shutdown!");
                },
                _ = tokio::time::sleep(std::time::Duration::from_secs(10)) => {
                     log::debug!("Waited 10 seconds for graceful shutdown, aborting...");
                }
            }
        });

        Ok(InstalledFlowServer {
            addr,
            auth_code_rx,
            trigger_shutdown_tx,
            shutdown_complete,
        })
    }

    fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    async fn wait_for_auth_code(self, timeout: Duration) -> Result<String, AuthError> {
        log::debug!("Waiting for HTTP server to receive auth code");
        let outcome = match tokio::time::timeout(timeout, self.auth_code_rx).await {
            Ok(Ok(Ok(code))) => Ok(code),
            Ok(Ok(Err(error))) => Err(AuthError::ConsentAbandoned(format!(
                "provider redirected with error '{}'",
                error
            ))),
            Ok(Err(_)) => Err(AuthError::ConsentAbandoned(
                "server shutdown while waiting for auth code".to_string(),
            )),
            Err(_) => Err(AuthError::ConsentAbandoned(format!(
                "no response within {} seconds",
                timeout.as_secs()
            ))),
        };
        log::debug!("Shutting down HTTP server");
        let _ = self.trigger_shutdown_tx.send(());
        let _ = self.shutdown_complete.await;
        outcome
    }
}

mod installed_flow_server {
    use super::Redirect;
    use futures::lock::Mutex;
    use http::{Request, Response, StatusCode, Uri};
    use std::sync::Arc;
    use tokio::sync::oneshot;
    use url::form_urlencoded;

    pub(super) async fn handle_req<B: hyper::body::Body>(
        req: Request<B>,
        auth_code_tx: Arc<Mutex<Option<oneshot::Sender<Redirect>>>>,
    ) -> Result<Response<String>, http::Error> {
        match req.uri().path_and_query() {
            Some(path_and_query) => {
                // We use a fake URL because the redirect goes to a URL, meaning we
                // can't use the url form decode (because there's slashes and hashes and stuff in
                // it).
                let url = Uri::builder()
                    .scheme("http")
                    .authority("example.com")
                    .path_and_query(path_and_query.clone())
                    .build();

                match url {
                    Err(_) => http::Response::builder()
                        .status(StatusCode::BAD_REQUEST)
                        .body(String::from("Unparseable URL")),
                    Ok(url) => match redirect_from_url(url) {
                        Some(redirect) => {
                            let granted = redirect.is_ok();
                            if let Some(sender) = auth_code_tx.lock().await.take() {
                                let _ = sender.send(redirect);
                            }
                            let page = if granted {
                                "<html><head><title>Success</title></head><body>You may now \
                                 close this window.</body></html>"
                            } else {
                                "<html><head><title>Access denied</title></head><body>Access \
                                 was not granted. You may close this window.</body></html>"
                            };
                            http::Response::builder()
                                .status(StatusCode::OK)
                                .header(http::header::CONTENT_TYPE, mime::TEXT_HTML_UTF_8.as_ref())
                                .body(String::from(page))
                        }
                        None => http::Response::builder()
                            .status(StatusCode::BAD_REQUEST)
                            .body(String::from("No `code` in URL")),
                    },
                }
            }
            None => http::Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .body(String::from("Invalid Request!")),
        }
    }

    fn redirect_from_url(url: http::Uri) -> Option<Redirect> {
        // The provider redirects to the specified localhost URL, appending the authorization
        // code, like this: http://localhost:8080/xyz/?code=4/731fJ3BheyCouCniPufAd280GHNV5Ju35yYcGs
        // or, if the user declined, ?error=access_denied.
        form_urlencoded::parse(url.query().unwrap_or("").as_bytes()).find_map(|(param, val)| {
            match param.as_ref() {
                "code" => Some(Ok(val.into_owned())),
                "error" => Some(Err(val.into_owned())),
                _ => None,
            }
        })
    }
}
