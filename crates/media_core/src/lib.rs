use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One archived message from a monitored stream, carrying zero or more media attachments.
///
/// This mirrors the record shape returned by the archive API. Only `id` is required; every
/// other field is optional because older archive rows were captured before those columns existed.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct MediaRecord {
    pub id: i64,
    #[serde(default, rename = "channelId")]
    pub channel_id: Option<i64>,
    #[serde(default, rename = "channelName")]
    pub channel_name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Unix seconds when the message was posted upstream.
    #[serde(default, rename = "postedAt")]
    pub posted_at: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_media_tolerant")]
    pub media: Vec<MediaAttachment>,
}

impl MediaRecord {
    /// Returns the first attachment, which galleries use as the cover.
    pub fn cover(&self) -> Option<&MediaAttachment> {
        self.media.first()
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct MediaAttachment {
    pub url: String,
    #[serde(default)]
    pub kind: MediaKind,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default, rename = "durationSecs")]
    pub duration_secs: Option<u32>,
    #[serde(default, rename = "thumbnailUrl")]
    pub thumbnail_url: Option<String>,
}

/// Attachment classification. Unknown upstream kinds decode as `Other`.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Audio,
    Document,
    #[default]
    Other,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Other => "other",
        }
    }

    fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "photo" | "image" => Self::Photo,
            "video" | "gif" => Self::Video,
            "audio" | "voice" => Self::Audio,
            "document" | "file" => Self::Document,
            _ => Self::Other,
        }
    }
}

impl<'de> Deserialize<'de> for MediaKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(value.as_deref().map_or(Self::Other, Self::from_label))
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match Self::from_label(raw) {
            Self::Other if !raw.trim().eq_ignore_ascii_case("other") => {
                Err(format!("unknown media kind: {raw}"))
            }
            kind => Ok(kind),
        }
    }
}

/// Filter descriptor for one browsing session.
///
/// The queue controller never looks inside it; the HTTP record source serializes it as query
/// parameters, omitting unset fields.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaFilter {
    #[serde(skip_serializing_if = "Option::is_none", rename = "channelId")]
    pub channel_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "mediaKind")]
    pub media_kind: Option<MediaKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,
}

/// Decodes the media list while tolerating archive drift.
///
/// `null` becomes an empty list, a single object is treated as a one-element list, and entries
/// that fail to decode are skipped so one bad attachment does not poison the whole record.
fn deserialize_media_tolerant<'de, D>(deserializer: D) -> Result<Vec<MediaAttachment>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(entries)) => entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect(),
        Some(entry @ Value::Object(_)) => serde_json::from_value(entry).into_iter().collect(),
        _ => Vec::new(),
    })
}
