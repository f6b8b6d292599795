// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One feed entry as the search oracle returns it. Every field is optional;
/// resolution of the canonical values happens in `normalize`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RawItem {
    pub id: Option<String>,
    pub text: Option<String>,
    pub url: Option<String>,
    pub twitter_url: Option<String>,
    pub created_at: Option<String>,
    pub lang: Option<String>,
    pub author: Option<RawAuthor>,
    pub extended_entities: Option<RawEntities>,
    pub like_count: Option<u64>,
    pub retweet_count: Option<u64>,
    pub reply_count: Option<u64>,
    pub quote_count: Option<u64>,
    pub view_count: Option<u64>,
    pub bookmark_count: Option<u64>,
    pub is_reply: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RawAuthor {
    pub id: Option<String>,
    pub name: Option<String>,
    pub user_name: Option<String>,
    pub is_blue_verified: Option<bool>,
    pub is_verified: Option<bool>,
    pub verified_type: Option<String>,
    pub profile_picture: Option<String>,
    pub profile_image_url: Option<String>,
    pub followers_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawEntities {
    pub media: Vec<RawMedia>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawMedia {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub media_url_https: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    AnimatedGif,
    #[default]
    None,
}

impl MediaKind {
    /// Lenient mapping of the oracle's media `type` string.
    pub fn from_oracle(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "photo" => MediaKind::Photo,
            "video" => MediaKind::Video,
            "animated_gif" => MediaKind::AnimatedGif,
            _ => MediaKind::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::AnimatedGif => "animated_gif",
            MediaKind::None => "none",
        }
    }
}

/// The durable unit. `canonical_url` is the dedup key; `external_id` is a
/// second one when present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    pub external_id: Option<String>,
    pub text: String,
    pub author_display_name: String,
    pub author_handle: String,
    pub author_verified: bool,
    pub author_verification_kind: String,
    pub author_avatar_url: String,
    pub canonical_url: String,
    pub media_preview_url: Option<String>,
    pub media_kind: MediaKind,
    pub topics: Vec<String>,
    /// Source-supplied timestamp, kept verbatim.
    pub published_at: String,
    pub inserted_at: DateTime<Utc>,
}

/// Feed-search oracle seam. Implementations return the items of `source`
/// newer than `since`, most recent first.
#[async_trait::async_trait]
pub trait FeedProvider: Send + Sync {
    async fn fetch(&self, source: &str, since: DateTime<Utc>) -> Result<Vec<RawItem>>;
    fn name(&self) -> &'static str;
}
