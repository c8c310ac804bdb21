//! Resumable media upload, as used by `videos.insert`.
//!
//! A session is opened with the metadata, then the file is sent in chunks with `Content-Range`.
//! The server answers `308 Resume Incomplete` with a `Range` header naming the bytes it kept;
//! the next chunk starts right after them. The last chunk is answered with the created video.
use crate::client::{HttpClient, SendError};
use crate::error::{failure_from_response, Failure, FailureKind};
use crate::video::VideoResource;

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use http::StatusCode;
use http_body_util::Full;
use hyper_util::client::legacy::connect::Connect;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const RESUME_INCOMPLETE: u16 = 308;

/// An open upload session.
pub(crate) struct ResumableUpload<'a, C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    client: &'a HttpClient<C>,
    authorization: &'a str,
    session_uri: String,
    chunk_size: usize,
}

impl<'a, C> ResumableUpload<'a, C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    /// Open a session for `total` bytes of `content_type`, described by `metadata`.
    pub(crate) async fn start(
        client: &'a HttpClient<C>,
        authorization: &'a str,
        upload_base: &str,
        metadata: &serde_json::Value,
        total: u64,
        content_type: &str,
        chunk_size: usize,
    ) -> Result<ResumableUpload<'a, C>, Failure> {
        let uri = format!(
            "{}/videos?uploadType=resumable&part=snippet,status",
            upload_base
        );
        let request = http::Request::post(&uri)
            .header(AUTHORIZATION, authorization)
            .header(CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
            .header("X-Upload-Content-Length", total.to_string())
            .header("X-Upload-Content-Type", content_type)
            .body(Full::new(Bytes::from(serde_json::to_vec(metadata)?)))
            .map_err(SendError::Request)?;
        log::debug!("opening upload session at {}", uri);
        let response = client.send(request).await?;
        if !response.status().is_success() {
            return Err(failure_from_response(response.status(), &response.body));
        }
        let session_uri = response
            .header(LOCATION)
            .ok_or_else(|| {
                Failure::new(
                    FailureKind::Transport,
                    "upload session response carries no Location header",
                )
            })?
            .to_string();
        log::debug!("upload session opened: {}", session_uri);
        Ok(ResumableUpload {
            client,
            authorization,
            session_uri,
            chunk_size,
        })
    }

    /// Send the file and return the video the server created from it.
    pub(crate) async fn send_file(
        &self,
        path: &Path,
        total: u64,
    ) -> Result<VideoResource, Failure> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut offset = 0u64;
        let mut buffer = Vec::with_capacity(self.chunk_size);

        while offset < total {
            let len = (total - offset).min(self.chunk_size as u64);
            buffer.resize(len as usize, 0);
            file.seek(std::io::SeekFrom::Start(offset)).await?;
            file.read_exact(&mut buffer).await?;

            let last = offset + len - 1;
            let request = http::Request::put(&self.session_uri)
                .header(AUTHORIZATION, self.authorization)
                .header(CONTENT_LENGTH, len.to_string())
                .header(CONTENT_RANGE, format!("bytes {}-{}/{}", offset, last, total))
                .body(Full::new(Bytes::copy_from_slice(&buffer)))
                .map_err(SendError::Request)?;
            let response = self.client.send(request).await?;

            match response.status() {
                StatusCode::OK | StatusCode::CREATED => {
                    log::debug!("upload complete after {} bytes", total);
                    return Ok(serde_json::from_slice(&response.body)?);
                }
                status if status.as_u16() == RESUME_INCOMPLETE => {
                    let next = acknowledged(response.header(RANGE));
                    log::debug!("server holds {} of {} bytes", next, total);
                    if next <= offset {
                        return Err(Failure::new(
                            FailureKind::Transport,
                            format!("upload stalled at byte {}", offset),
                        ));
                    }
                    offset = next;
                }
                status => return Err(failure_from_response(status, &response.body)),
            }
        }
        Err(Failure::new(
            FailureKind::Transport,
            "upload ended without the server returning a video",
        ))
    }
}

/// Offset following the bytes acknowledged by a `Range: bytes=0-N` header; 0 when absent.
fn acknowledged(range: Option<&str>) -> u64 {
    range
        .and_then(|r| r.trim().strip_prefix("bytes="))
        .and_then(|r| r.split_once('-'))
        .and_then(|(_, end)| end.trim().parse::<u64>().ok())
        .map_or(0, |end| end + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acknowledged() {
        assert_eq!(acknowledged(Some("bytes=0-262143")), 262144);
        assert_eq!(acknowledged(Some("bytes=0-0")), 1);
        assert_eq!(acknowledged(None), 0);
        assert_eq!(acknowledged(Some("garbage")), 0);
    }
}
