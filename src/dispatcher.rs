//! Runs one operation against the YouTube Data API and turns every outcome into an
//! `OperationResult`.
use crate::authenticator::Authenticator;
use crate::client::{DefaultConnector, Response, SendError};
use crate::config::{
    Config, DEFAULT_API_BASE_URL, DEFAULT_UPLOAD_BASE_URL, DEFAULT_UPLOAD_CHUNK_SIZE,
};
use crate::error::{failure_from_response, Failure, FailureKind};
use crate::request::{NewVideo, OperationRequest};
use crate::upload::ResumableUpload;
use crate::video::{merge_snippet, Snippet, SnippetPatch, VideoListResponse, VideoResource};

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http_body_util::Full;
use hyper_util::client::legacy::connect::Connect;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde_json::{json, Value};

/// The raw response payload of an operation, or why it failed.
pub type OperationResult = Result<Value, Failure>;

const READ_PARTS: &str = "snippet,contentDetails,statistics";

/// Performs the four video operations with the credential of an [`Authenticator`].
///
/// Calls are independent of each other; a rejected credential (HTTP 401) is discarded so the
/// next call obtains a fresh one.
pub struct Dispatcher<C = DefaultConnector>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    authenticator: Authenticator<C>,
    api_base: String,
    upload_base: String,
    chunk_size: usize,
}

impl<C> Dispatcher<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    /// A dispatcher talking to the public YouTube endpoints.
    pub fn new(authenticator: Authenticator<C>) -> Dispatcher<C> {
        Dispatcher {
            authenticator,
            api_base: DEFAULT_API_BASE_URL.to_string(),
            upload_base: DEFAULT_UPLOAD_BASE_URL.to_string(),
            chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
        }
    }

    /// A dispatcher using the endpoints and chunk size of `config`.
    pub fn from_config(config: &Config, authenticator: Authenticator<C>) -> Dispatcher<C> {
        Dispatcher::new(authenticator)
            .api_base_url(&config.api_base_url)
            .upload_base_url(&config.upload_base_url)
            .upload_chunk_size(config.upload_chunk_size)
    }

    /// Override the base URL of the video API.
    pub fn api_base_url(self, url: &str) -> Self {
        Dispatcher {
            api_base: url.trim_end_matches('/').to_string(),
            ..self
        }
    }

    /// Override the base URL of media uploads.
    pub fn upload_base_url(self, url: &str) -> Self {
        Dispatcher {
            upload_base: url.trim_end_matches('/').to_string(),
            ..self
        }
    }

    /// Set the number of bytes sent per upload request.
    pub fn upload_chunk_size(self, chunk_size: usize) -> Self {
        Dispatcher { chunk_size, ..self }
    }

    /// Validate `request`, perform it and return the payload to show the user.
    ///
    /// Delete has no payload of its own; it acknowledges with `{"id": .., "deleted": true}`.
    pub async fn dispatch(&self, request: &OperationRequest) -> OperationResult {
        request.validate()?;
        log::info!("dispatching {}", request.name());
        let result = match request {
            OperationRequest::Create(video) => self.create(video).await.and_then(to_value),
            OperationRequest::Read { video_id } => self.read(video_id).await.and_then(to_value),
            OperationRequest::Update { video_id, patch } => {
                self.update(video_id, patch).await.and_then(to_value)
            }
            OperationRequest::Delete { video_id } => self
                .delete(video_id)
                .await
                .map(|()| json!({"id": video_id.trim(), "deleted": true})),
        };
        if let Err(failure) = &result {
            log::warn!("{} failed: {}", request.name(), failure);
        }
        result
    }

    /// Upload a video file with its metadata and return the created video.
    pub async fn create(&self, video: &NewVideo) -> Result<VideoResource, Failure> {
        OperationRequest::Create(video.clone()).validate()?;
        let total = tokio::fs::metadata(&video.file).await?.len();
        if total == 0 {
            return Err(Failure::validation(format!(
                "'{}' is empty",
                video.file.display()
            )));
        }
        let content_type = mime_guess::from_path(&video.file)
            .first_or_octet_stream()
            .to_string();
        let snippet = Snippet {
            title: video.title.trim().to_string(),
            description: video.description.clone(),
            tags: Some(video.tags.clone()),
            category_id: Some(video.category_id.trim().to_string()),
            ..Default::default()
        };
        let metadata = json!({
            "snippet": snippet,
            "status": {"privacyStatus": video.privacy_status},
        });

        let authorization = self.authorization().await?;
        let result = async {
            let upload = ResumableUpload::start(
                self.authenticator.http_client(),
                &authorization,
                &self.upload_base,
                &metadata,
                total,
                &content_type,
                self.chunk_size,
            )
            .await?;
            upload.send_file(&video.file, total).await
        }
        .await;
        let created = self.discard_rejected(result).await?;
        log::info!("created video {} ({} bytes)", created.id, total);
        Ok(created)
    }

    /// Fetch snippet, content details and statistics of a video.
    pub async fn read(&self, video_id: &str) -> Result<VideoResource, Failure> {
        self.list(video_id.trim(), READ_PARTS).await
    }

    /// Overlay `patch` onto the current snippet of a video and store the result.
    pub async fn update(
        &self,
        video_id: &str,
        patch: &SnippetPatch,
    ) -> Result<VideoResource, Failure> {
        let video_id = video_id.trim();
        let current = self.list(video_id, "snippet").await?.snippet.ok_or_else(|| {
            Failure::new(
                FailureKind::Transport,
                format!("video '{}' was returned without a snippet", video_id),
            )
        })?;
        let merged = merge_snippet(&current, patch);
        let body = json!({"id": video_id, "snippet": merged.editable()});

        let uri = format!("{}/videos?part=snippet", self.api_base);
        let request = http::Request::put(&uri)
            .header(CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
            .body(Full::new(Bytes::from(serde_json::to_vec(&body)?)));
        let response = self.call(request).await?;
        let updated: VideoResource = serde_json::from_slice(&response.body)?;
        log::info!("updated video {}", video_id);
        Ok(updated)
    }

    /// Delete a video.
    pub async fn delete(&self, video_id: &str) -> Result<(), Failure> {
        let video_id = video_id.trim();
        let uri = format!("{}/videos?id={}", self.api_base, encode(video_id));
        let request = http::Request::delete(&uri).body(Full::new(Bytes::new()));
        self.call(request).await?;
        log::info!("deleted video {}", video_id);
        Ok(())
    }

    /// `videos.list` for a single id. An empty item list means the id does not resolve.
    async fn list(&self, video_id: &str, parts: &str) -> Result<VideoResource, Failure> {
        let uri = format!(
            "{}/videos?part={}&id={}",
            self.api_base,
            parts,
            encode(video_id)
        );
        let request = http::Request::get(&uri).body(Full::new(Bytes::new()));
        let response = self.call(request).await?;
        let list: VideoListResponse = serde_json::from_slice(&response.body)?;
        list.items
            .into_iter()
            .next()
            .ok_or_else(|| Failure::not_found(video_id))
    }

    async fn authorization(&self) -> Result<String, Failure> {
        Ok(self.authenticator.credential().await?.authorization())
    }

    /// Authorize and send a request; any non-success status becomes a `Failure`.
    async fn call(
        &self,
        request: Result<http::Request<Full<Bytes>>, http::Error>,
    ) -> Result<Response, Failure> {
        let mut request = request.map_err(SendError::Request)?;
        let authorization = self.authorization().await?;
        request.headers_mut().insert(
            AUTHORIZATION,
            authorization
                .parse()
                .map_err(|_| Failure::new(FailureKind::Auth, "malformed access token"))?,
        );
        log::debug!("{} {}", request.method(), request.uri());
        let result = async {
            let response = self.authenticator.http_client().send(request).await?;
            log::debug!("received response; head: {:?}", response.head);
            if response.status().is_success() {
                Ok::<_, Failure>(response)
            } else {
                Err(failure_from_response(response.status(), &response.body))
            }
        }
        .await;
        self.discard_rejected(result).await
    }

    /// Forget the credential if the remote refused it.
    async fn discard_rejected<T>(&self, result: Result<T, Failure>) -> Result<T, Failure> {
        if let Err(failure) = &result {
            if failure.kind == FailureKind::Auth {
                log::warn!("credential rejected by the video service");
                if let Err(err) = self.authenticator.invalidate().await {
                    log::warn!("failed to clear token cache: {}", err);
                }
            }
        }
        result
    }
}

fn encode(video_id: &str) -> String {
    utf8_percent_encode(video_id, NON_ALPHANUMERIC).to_string()
}

fn to_value(video: VideoResource) -> OperationResult {
    Ok(serde_json::to_value(video)?)
}
