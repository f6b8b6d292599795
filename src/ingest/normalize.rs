// src/ingest/normalize.rs
//! Raw feed item -> canonical record. Pure; every field resolves through a
//! fixed "first non-empty wins" chain and falls back to an empty string.

use chrono::{DateTime, Utc};

use crate::ingest::types::{CanonicalRecord, MediaKind, RawItem};

/// First candidate that is present and not blank.
fn first_non_empty<'a, I>(candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = Option<&'a String>>,
{
    candidates
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
}

/// Map one raw item. `inserted_at` is supplied by the caller so the function
/// stays clock-free. Topics start empty; classification fills them.
pub fn normalize(raw: &RawItem, inserted_at: DateTime<Utc>) -> CanonicalRecord {
    let author = raw.author.as_ref();
    let media = raw.extended_entities.as_ref().and_then(|e| e.media.first());

    // verified = blue-verified OR legacy-verified
    let author_verified = author
        .map(|a| a.is_blue_verified.unwrap_or(false) || a.is_verified.unwrap_or(false))
        .unwrap_or(false);

    // avatar = custom picture OR profile image OR ""
    let author_avatar_url = first_non_empty([
        author.and_then(|a| a.profile_picture.as_ref()),
        author.and_then(|a| a.profile_image_url.as_ref()),
    ])
    .unwrap_or_default()
    .to_string();

    // url = full tweet url OR short url OR ""
    let canonical_url = first_non_empty([raw.twitter_url.as_ref(), raw.url.as_ref()])
        .unwrap_or_default()
        .to_string();

    CanonicalRecord {
        external_id: first_non_empty([raw.id.as_ref()]).map(str::to_string),
        text: raw.text.as_deref().unwrap_or_default().trim().to_string(),
        author_display_name: first_non_empty([author.and_then(|a| a.name.as_ref())])
            .unwrap_or_default()
            .to_string(),
        author_handle: first_non_empty([author.and_then(|a| a.user_name.as_ref())])
            .unwrap_or_default()
            .to_string(),
        author_verified,
        author_verification_kind: first_non_empty([author.and_then(|a| a.verified_type.as_ref())])
            .unwrap_or_default()
            .to_string(),
        author_avatar_url,
        canonical_url,
        media_preview_url: first_non_empty([media.and_then(|m| m.media_url_https.as_ref())])
            .map(str::to_string),
        media_kind: media
            .and_then(|m| m.kind.as_deref())
            .map(MediaKind::from_oracle)
            .unwrap_or_default(),
        topics: Vec::new(),
        published_at: raw.created_at.as_deref().unwrap_or_default().to_string(),
        inserted_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{RawAuthor, RawEntities, RawMedia};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-05T07:08:09Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn empty_item_maps_to_empty_fields() {
        let rec = normalize(&RawItem::default(), now());
        assert_eq!(rec.external_id, None);
        assert_eq!(rec.text, "");
        assert_eq!(rec.canonical_url, "");
        assert_eq!(rec.author_avatar_url, "");
        assert!(!rec.author_verified);
        assert_eq!(rec.media_kind, MediaKind::None);
        assert_eq!(rec.media_preview_url, None);
        assert!(rec.topics.is_empty());
        assert_eq!(rec.inserted_at, now());
    }

    #[test]
    fn fallback_order_prefers_richest_fields() {
        let raw = RawItem {
            id: Some("1765".into()),
            text: Some(" gm ".into()),
            url: Some("https://x.com/short".into()),
            twitter_url: Some("https://twitter.com/alice/status/1765".into()),
            created_at: Some("Tue Mar 05 07:08:09 +0000 2024".into()),
            author: Some(RawAuthor {
                name: Some("Alice".into()),
                user_name: Some("alice".into()),
                is_blue_verified: Some(false),
                is_verified: Some(true),
                verified_type: Some("Business".into()),
                profile_picture: Some("".into()),
                profile_image_url: Some("https://img/alice.png".into()),
                ..Default::default()
            }),
            extended_entities: Some(RawEntities {
                media: vec![
                    RawMedia {
                        kind: Some("animated_gif".into()),
                        media_url_https: Some("https://img/first.gif".into()),
                        url: None,
                    },
                    RawMedia {
                        kind: Some("photo".into()),
                        media_url_https: Some("https://img/second.jpg".into()),
                        url: None,
                    },
                ],
            }),
            ..Default::default()
        };
        let rec = normalize(&raw, now());
        assert_eq!(rec.external_id.as_deref(), Some("1765"));
        assert_eq!(rec.text, "gm");
        assert_eq!(rec.canonical_url, "https://twitter.com/alice/status/1765");
        assert!(rec.author_verified, "legacy verified counts");
        assert_eq!(rec.author_verification_kind, "Business");
        assert_eq!(rec.author_avatar_url, "https://img/alice.png");
        assert_eq!(rec.media_kind, MediaKind::AnimatedGif);
        assert_eq!(
            rec.media_preview_url.as_deref(),
            Some("https://img/first.gif")
        );
        assert_eq!(rec.published_at, "Tue Mar 05 07:08:09 +0000 2024");
    }

    #[test]
    fn short_url_used_when_full_url_missing() {
        let raw = RawItem {
            url: Some("https://x.com/short".into()),
            twitter_url: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(normalize(&raw, now()).canonical_url, "https://x.com/short");
    }
}
