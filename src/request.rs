//! One user-initiated action, and the checks run on it before anything goes over the wire.
use crate::error::Failure;
use crate::video::{PrivacyStatus, SnippetPatch};

use std::path::PathBuf;

/// Everything needed to upload a new video.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewVideo {
    /// Local media file.
    pub file: PathBuf,
    /// Title; must not be blank.
    pub title: String,
    /// Description; may be empty.
    pub description: String,
    /// Category id; must not be blank.
    pub category_id: String,
    /// Tags in the order given.
    pub tags: Vec<String>,
    /// Visibility after upload.
    pub privacy_status: PrivacyStatus,
}

/// The four operations the dispatcher knows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationRequest {
    /// Upload a video.
    Create(NewVideo),
    /// Fetch snippet, content details and statistics of a video.
    Read {
        /// Target video.
        video_id: String,
    },
    /// Change some of title, description and tags.
    Update {
        /// Target video.
        video_id: String,
        /// Fields to change.
        patch: SnippetPatch,
    },
    /// Delete a video.
    Delete {
        /// Target video.
        video_id: String,
    },
}

impl OperationRequest {
    /// Short name used in logs and the UI.
    pub fn name(&self) -> &'static str {
        match self {
            OperationRequest::Create(_) => "create",
            OperationRequest::Read { .. } => "read",
            OperationRequest::Update { .. } => "update",
            OperationRequest::Delete { .. } => "delete",
        }
    }

    /// Check required fields. Runs before any credential is requested.
    pub fn validate(&self) -> Result<(), Failure> {
        match self {
            OperationRequest::Create(video) => {
                if video.title.trim().is_empty() {
                    return Err(Failure::validation("a title is required"));
                }
                if video.category_id.trim().is_empty() {
                    return Err(Failure::validation("a category is required"));
                }
                if video.file.as_os_str().is_empty() {
                    return Err(Failure::validation("a video file is required"));
                }
                if !video.file.is_file() {
                    return Err(Failure::validation(format!(
                        "'{}' is not a readable file",
                        video.file.display()
                    )));
                }
                Ok(())
            }
            OperationRequest::Read { video_id }
            | OperationRequest::Update { video_id, .. }
            | OperationRequest::Delete { video_id } => {
                if video_id.trim().is_empty() {
                    Err(Failure::validation("a video id is required"))
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Split a comma separated tag list. Entries are trimmed and blank ones dropped.
pub fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[test]
    fn test_parse_tags() {
        assert_eq!(parse_tags("a, b ,,c"), vec!["a", "b", "c"]);
        assert!(parse_tags(" , ").is_empty());
        assert!(parse_tags("").is_empty());
    }

    #[test]
    fn test_validate_video_id() {
        let req = OperationRequest::Delete {
            video_id: "  ".to_string(),
        };
        assert_eq!(req.validate().unwrap_err().kind, FailureKind::Validation);
        let req = OperationRequest::Read {
            video_id: "abc".to_string(),
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_validate_create() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"data").unwrap();
        let video = NewVideo {
            file: file.clone(),
            title: "Test".to_string(),
            category_id: "22".to_string(),
            ..Default::default()
        };
        assert!(OperationRequest::Create(video.clone()).validate().is_ok());

        let untitled = NewVideo {
            title: String::new(),
            ..video.clone()
        };
        assert!(OperationRequest::Create(untitled).validate().is_err());

        let missing = NewVideo {
            file: dir.path().join("missing.mp4"),
            ..video.clone()
        };
        let err = OperationRequest::Create(missing).validate().unwrap_err();
        assert_eq!(err.kind, FailureKind::Validation);

        let directory = NewVideo {
            file: dir.path().to_path_buf(),
            ..video
        };
        assert!(OperationRequest::Create(directory).validate().is_err());
    }
}
