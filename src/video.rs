//! Resources of the YouTube Data API, as far as this crate reads and writes them.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A video as returned by `videos.list`, `videos.insert` and `videos.update`.
///
/// Fields this crate does not interpret are kept in `extra` and survive a round trip.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoResource {
    /// Opaque video id.
    #[serde(default)]
    pub id: String,
    /// Editable metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<Snippet>,
    /// Visibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<VideoStatus>,
    /// Duration, definition etc.; passed through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_details: Option<Value>,
    /// View counts etc.; passed through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Value>,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The editable metadata bundle of a video.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    /// Video title.
    #[serde(default)]
    pub title: String,
    /// Video description; may be empty.
    #[serde(default)]
    pub description: String,
    /// Absent when the video has no tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Numeric category id, e.g. `"22"` (People & Blogs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    /// Other fields, e.g. the read-only `channelId` or the writable `defaultLanguage`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Snippet fields the API sets itself. `videos.update` rejects or ignores them.
const READ_ONLY_SNIPPET_FIELDS: &[&str] = &[
    "channelId",
    "channelTitle",
    "publishedAt",
    "thumbnails",
    "liveBroadcastContent",
    "localized",
];

impl Snippet {
    /// The snippet as `videos.update` expects it for `part=snippet`.
    ///
    /// Writable properties left out of an update are cleared remotely, so everything except the
    /// read-only fields is sent back.
    pub(crate) fn editable(&self) -> Snippet {
        let mut snippet = self.clone();
        snippet
            .extra
            .retain(|key, _| !READ_ONLY_SNIPPET_FIELDS.contains(&key.as_str()));
        snippet
    }
}

/// `status` part of a video.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatus {
    /// Visibility of the video.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_status: Option<PrivacyStatus>,
    /// Other status fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Who can see a video.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    /// Only the owner can see it.
    #[default]
    Private,
    /// Everyone can see it.
    Public,
    /// Anyone with the link can see it.
    Unlisted,
}

impl PrivacyStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyStatus::Private => "private",
            PrivacyStatus::Public => "public",
            PrivacyStatus::Unlisted => "unlisted",
        }
    }
}

impl fmt::Display for PrivacyStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrivacyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "private" => Ok(PrivacyStatus::Private),
            "public" => Ok(PrivacyStatus::Public),
            "unlisted" => Ok(PrivacyStatus::Unlisted),
            other => Err(format!("unknown privacy status '{}'", other)),
        }
    }
}

/// The fields a caller wants to change on update. `None` leaves a field as it is.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct SnippetPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl SnippetPatch {
    /// True if applying the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.tags.is_none()
    }
}

/// Overlay `patch` onto `current`. Fields the patch leaves unset, and everything outside
/// title, description and tags, are taken from `current` unchanged.
pub fn merge_snippet(current: &Snippet, patch: &SnippetPatch) -> Snippet {
    let mut merged = current.clone();
    if let Some(title) = &patch.title {
        merged.title = title.clone();
    }
    if let Some(description) = &patch.description {
        merged.description = description.clone();
    }
    if let Some(tags) = &patch.tags {
        merged.tags = Some(tags.clone());
    }
    merged
}

/// Response of `videos.list`.
#[derive(Deserialize, Debug, Default)]
pub(crate) struct VideoListResponse {
    #[serde(default)]
    pub items: Vec<VideoResource>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snippet() -> Snippet {
        serde_json::from_value(json!({
            "title": "Old title",
            "description": "Old description",
            "tags": ["x", "y"],
            "categoryId": "22",
            "channelId": "UC123",
            "channelTitle": "Channel",
            "publishedAt": "2024-01-01T00:00:00Z",
            "defaultLanguage": "en",
            "thumbnails": {"default": {"url": "https://i.ytimg.com/vi/abc/default.jpg"}}
        }))
        .unwrap()
    }

    #[test]
    fn test_merge_empty_patch_is_identity() {
        let current = snippet();
        assert_eq!(merge_snippet(&current, &SnippetPatch::default()), current);
    }

    #[test]
    fn test_merge_title_only() {
        let current = snippet();
        let merged = merge_snippet(
            &current,
            &SnippetPatch {
                title: Some("New title".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(merged.title, "New title");
        assert_eq!(merged.description, current.description);
        assert_eq!(merged.tags, current.tags);
        assert_eq!(merged.category_id, current.category_id);
        assert_eq!(merged.extra, current.extra);
    }

    #[test]
    fn test_merge_replaces_tags_wholesale() {
        let merged = merge_snippet(
            &snippet(),
            &SnippetPatch {
                tags: Some(vec!["z".to_string()]),
                description: Some(String::new()),
                ..Default::default()
            },
        );
        assert_eq!(merged.tags, Some(vec!["z".to_string()]));
        assert_eq!(merged.description, "");
        assert_eq!(merged.title, "Old title");
    }

    #[test]
    fn test_editable_drops_read_only_fields() {
        let body = serde_json::to_value(snippet().editable()).unwrap();
        assert_eq!(
            body,
            json!({
                "title": "Old title",
                "description": "Old description",
                "tags": ["x", "y"],
                "categoryId": "22",
                "defaultLanguage": "en"
            })
        );
    }

    #[test]
    fn test_resource_keeps_unknown_fields() {
        let value = json!({
            "kind": "youtube#video",
            "etag": "abc",
            "id": "vid1",
            "snippet": {"title": "t", "description": ""},
            "status": {"privacyStatus": "unlisted", "embeddable": true},
            "statistics": {"viewCount": "12"}
        });
        let video: VideoResource = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(video.id, "vid1");
        assert_eq!(
            video.status.as_ref().unwrap().privacy_status,
            Some(PrivacyStatus::Unlisted)
        );
        assert_eq!(video.snippet.as_ref().unwrap().tags, None);
        assert_eq!(serde_json::to_value(&video).unwrap(), value);
    }

    #[test]
    fn test_privacy_status_from_str() {
        assert_eq!("Public".parse(), Ok(PrivacyStatus::Public));
        assert_eq!(" unlisted ".parse(), Ok(PrivacyStatus::Unlisted));
        assert!("secret".parse::<PrivacyStatus>().is_err());
        assert_eq!(PrivacyStatus::default(), PrivacyStatus::Private);
    }
}
