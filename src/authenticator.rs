//! Module containing the core functionality for OAuth2 Authentication.
use crate::authenticator_delegate::InstalledFlowDelegate;
use crate::client::{DefaultConnector, DefaultHyperClientBuilder, HttpClient, HyperClientBuilder};
use crate::config::{Config, ConfigError, Strategy};
use crate::error::AuthError;
use crate::installed::InstalledFlow;
use crate::refresh::RefreshFlow;
use crate::service_account::{ServiceAccountFlow, ServiceAccountKey};
use crate::storage::{DiskStorage, MemoryStorage, NullStorage, TokenStorage};
use crate::types::{ApplicationSecret, Credential};

use futures::lock::Mutex;
use hyper_util::client::legacy::connect::Connect;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// The ways a credential can be obtained; exactly one is chosen per `Authenticator`.
pub enum AuthFlow {
    /// Reuse the token cache, refreshing it when expired; ask for consent only if that fails.
    CachedOAuth(InstalledFlow),
    /// Ask for consent when the session starts, refresh within the session.
    InteractiveOAuth(InstalledFlow),
    /// Exchange a signed assertion of a service account key; nothing is persisted.
    ServiceAccount(ServiceAccountFlow),
}

impl AuthFlow {
    /// Installed-app OAuth backed by the token cache.
    pub fn cached_oauth(app_secret: ApplicationSecret) -> AuthFlow {
        AuthFlow::CachedOAuth(InstalledFlow::new(app_secret, None))
    }

    /// Installed-app OAuth that always asks for consent first.
    pub fn interactive_oauth(app_secret: ApplicationSecret) -> AuthFlow {
        AuthFlow::InteractiveOAuth(InstalledFlow::new(app_secret, None))
    }

    /// Service account authentication. Fails if the private key cannot be used.
    pub fn service_account(key: ServiceAccountKey) -> Result<AuthFlow, AuthError> {
        Ok(AuthFlow::ServiceAccount(ServiceAccountFlow::new(key)?))
    }

    fn installed_mut(&mut self) -> Option<&mut InstalledFlow> {
        match self {
            AuthFlow::CachedOAuth(flow) | AuthFlow::InteractiveOAuth(flow) => Some(flow),
            AuthFlow::ServiceAccount(_) => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            AuthFlow::CachedOAuth(_) => "cached-oauth",
            AuthFlow::InteractiveOAuth(_) => "interactive-oauth",
            AuthFlow::ServiceAccount(_) => "service-account",
        }
    }
}

impl fmt::Debug for AuthFlow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

struct InnerAuthenticator<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    hyper_client: HttpClient<C>,
    storage: Box<dyn TokenStorage>,
    flow: AuthFlow,
    scopes: Vec<String>,
    interactive_fallback: bool,
    /// The one credential of this session.
    active: Mutex<Option<Credential>>,
}

/// Authenticator is responsible for fetching tokens, handling refreshing tokens,
/// and optionally persisting tokens to disk.
///
/// Clones share the same credential.
pub struct Authenticator<C = DefaultConnector>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    inner: Arc<InnerAuthenticator<C>>,
}

impl<C> Clone for Authenticator<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Authenticator {
            inner: self.inner.clone(),
        }
    }
}

impl Authenticator<DefaultConnector> {
    /// Create a builder using the default HTTPS client.
    pub fn builder(flow: AuthFlow) -> AuthenticatorBuilder<DefaultHyperClientBuilder> {
        Self::with_client(flow, DefaultHyperClientBuilder::default())
    }

    /// Build the authenticator described by `config`: its strategy, scopes, token cache,
    /// redirect port and timeouts.
    pub fn from_config(config: &Config) -> Result<Authenticator<DefaultConnector>, AuthError> {
        let flow = match config.strategy {
            Strategy::CachedOAuth => AuthFlow::cached_oauth(
                config
                    .app_secret
                    .clone()
                    .ok_or(ConfigError::Missing("oauth2_credentials"))?,
            ),
            Strategy::InteractiveOAuth => AuthFlow::interactive_oauth(
                config
                    .app_secret
                    .clone()
                    .ok_or(ConfigError::Missing("oauth2_credentials"))?,
            ),
            Strategy::ServiceAccount => AuthFlow::service_account(
                config
                    .service_account_key
                    .clone()
                    .ok_or(ConfigError::Missing("service_account_key"))?,
            )?,
        };
        let mut builder = Self::builder(flow)
            .scopes(config.scopes.clone())
            .consent_timeout(config.consent_timeout)
            .interactive_fallback(config.interactive_fallback)
            .request_timeout(config.request_timeout)
            .persist_tokens_to_disk(config.token_cache.clone());
        if let Some(port) = config.redirect_port {
            builder = builder.redirect_port(port);
        }
        builder.build()
    }
}

impl<C> Authenticator<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    /// Create a builder using the given client.
    pub fn with_client<B>(flow: AuthFlow, client: B) -> AuthenticatorBuilder<B>
    where
        B: HyperClientBuilder<Connector = C>,
    {
        AuthenticatorBuilder {
            hyper_client_builder: client,
            flow,
            storage: StorageType::Memory,
            scopes: vec![crate::config::YOUTUBE_FORCE_SSL_SCOPE.to_string()],
            interactive_fallback: true,
            request_timeout: None,
        }
    }

    /// The HTTP client used for token requests; API calls reuse it.
    pub fn http_client(&self) -> &HttpClient<C> {
        &self.inner.hyper_client
    }

    /// Return a valid credential, obtaining a new one through the configured strategy if the
    /// active one is missing or expired.
    ///
    /// A credential that is not expired is returned as is, without any request. Concurrent
    /// callers wait for the first one, so a credential is refreshed at most once.
    pub async fn credential(&self) -> Result<Credential, AuthError> {
        let mut active = self.inner.active.lock().await;
        if let Some(credential) = active.as_ref() {
            if !credential.is_expired() {
                return Ok(credential.clone());
            }
        }
        let expired = active.take();
        match self.inner.acquire(expired.clone()).await {
            Ok(credential) => {
                *active = Some(credential.clone());
                Ok(credential)
            }
            Err(err) => {
                if err.is_transient() {
                    *active = expired;
                }
                Err(err)
            }
        }
    }

    /// Forget the active credential, e.g. after the API refused it. It is removed from the
    /// token cache as well, so the next `credential()` starts over.
    pub async fn invalidate(&self) -> Result<(), AuthError> {
        log::info!("discarding the active credential");
        *self.inner.active.lock().await = None;
        self.inner.storage.clear()?;
        Ok(())
    }
}

impl<C> InnerAuthenticator<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    async fn acquire(&self, expired: Option<Credential>) -> Result<Credential, AuthError> {
        let flow = match &self.flow {
            AuthFlow::ServiceAccount(flow) => {
                log::info!("requesting service account token");
                return flow.token(&self.hyper_client, &self.scopes).await;
            }
            AuthFlow::CachedOAuth(flow) | AuthFlow::InteractiveOAuth(flow) => flow,
        };

        let consent_allowed =
            matches!(self.flow, AuthFlow::InteractiveOAuth(_)) || self.interactive_fallback;
        let candidate = match expired {
            Some(credential) => Some(credential),
            None if matches!(self.flow, AuthFlow::CachedOAuth(_)) => {
                self.storage.get(&self.scopes)?
            }
            None => None,
        };

        match candidate {
            Some(credential) if !credential.is_expired() => {
                log::info!("using cached credential");
                return Ok(credential);
            }
            Some(Credential {
                refresh_token: Some(refresh_token),
                ..
            }) => {
                match RefreshFlow::refresh_token(
                    &self.hyper_client,
                    flow.app_secret(),
                    &refresh_token,
                )
                .await
                {
                    Ok(credential) => {
                        log::info!("refreshed expired credential");
                        self.storage.set(&self.scopes, credential.clone())?;
                        return Ok(credential);
                    }
                    Err(err @ AuthError::Server { .. }) => {
                        log::warn!("refresh token rejected: {}", err);
                        self.storage.clear()?;
                        if !consent_allowed {
                            return Err(AuthError::RefreshFailed(Box::new(err)));
                        }
                    }
                    Err(err) => {
                        // The refresh token may still be good; keep it for the next attempt.
                        log::warn!("failed to refresh credential: {}", err);
                        return Err(err);
                    }
                }
            }
            Some(_) => {
                log::info!("cached credential expired and cannot be refreshed");
                self.storage.clear()?;
            }
            None => {}
        }

        if !consent_allowed {
            return Err(AuthError::NoCredential);
        }
        log::info!("asking for consent");
        let credential = flow.token(&self.hyper_client, &self.scopes).await?;
        self.storage.set(&self.scopes, credential.clone())?;
        Ok(credential)
    }
}

enum StorageType {
    Memory,
    Disk(PathBuf),
    Custom(Box<dyn TokenStorage>),
}

/// Configure an Authenticator before building it.
pub struct AuthenticatorBuilder<B> {
    hyper_client_builder: B,
    flow: AuthFlow,
    storage: StorageType,
    scopes: Vec<String>,
    interactive_fallback: bool,
    request_timeout: Option<Duration>,
}

impl<B> AuthenticatorBuilder<B>
where
    B: HyperClientBuilder,
{
    /// Scopes requested for the credential.
    pub fn scopes(self, scopes: Vec<String>) -> Self {
        AuthenticatorBuilder { scopes, ..self }
    }

    /// Persist tokens to a json file on disk. Ignored by the service account flow.
    pub fn persist_tokens_to_disk<P: Into<PathBuf>>(self, path: P) -> Self {
        AuthenticatorBuilder {
            storage: StorageType::Disk(path.into()),
            ..self
        }
    }

    /// Use a custom token storage. Ignored by the service account flow.
    pub fn with_storage(self, storage: Box<dyn TokenStorage>) -> Self {
        AuthenticatorBuilder {
            storage: StorageType::Custom(storage),
            ..self
        }
    }

    /// Whether the cached-oauth flow may fall back to interactive consent.
    pub fn interactive_fallback(self, enabled: bool) -> Self {
        AuthenticatorBuilder {
            interactive_fallback: enabled,
            ..self
        }
    }

    /// Timeout of each token request.
    pub fn request_timeout(self, timeout: Duration) -> Self {
        AuthenticatorBuilder {
            request_timeout: Some(timeout),
            ..self
        }
    }

    /// Use the provided delegate to present the consent URL.
    pub fn flow_delegate(mut self, delegate: Box<dyn InstalledFlowDelegate>) -> Self {
        if let Some(flow) = self.flow.installed_mut() {
            flow.flow_delegate = delegate;
        }
        self
    }

    /// Listen for the consent redirect on this port instead of a random one.
    pub fn redirect_port(mut self, port: u16) -> Self {
        if let Some(flow) = self.flow.installed_mut() {
            flow.port = Some(port);
        }
        self
    }

    /// How long to wait for the user to grant access.
    pub fn consent_timeout(mut self, timeout: Duration) -> Self {
        if let Some(flow) = self.flow.installed_mut() {
            flow.consent_timeout = timeout;
        }
        self
    }

    /// Create the authenticator.
    pub fn build(self) -> Result<Authenticator<B::Connector>, AuthError> {
        let mut client_builder = self.hyper_client_builder;
        if let Some(timeout) = self.request_timeout {
            client_builder = client_builder.with_timeout(timeout);
        }
        let hyper_client = client_builder.build_hyper_client()?;

        let storage: Box<dyn TokenStorage> = match (&self.flow, self.storage) {
            (AuthFlow::ServiceAccount(_), _) => Box::new(NullStorage),
            (_, StorageType::Memory) => Box::new(MemoryStorage::new()),
            (_, StorageType::Disk(path)) => Box::new(DiskStorage::new(path)),
            (_, StorageType::Custom(storage)) => storage,
        };
        log::debug!("authenticator uses the {} strategy", self.flow.name());

        Ok(Authenticator {
            inner: Arc::new(InnerAuthenticator {
                hyper_client,
                storage,
                flow: self.flow,
                scopes: self.scopes,
                interactive_fallback: self.interactive_fallback,
                active: Mutex::new(None),
            }),
        })
    }
}
