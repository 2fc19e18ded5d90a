//! JSON parser for full-archive search response pages.
//!
//! A page carries the posts in `data`, the expanded users and places in
//! `includes`, and the pagination cursor in `meta`.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::Result;
use crate::places::Place;
use crate::records::{Author, Coordinates, Geo, PublicMetrics, Record, ReferencedTweet};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub data: Vec<RawTweet>,
    #[serde(default)]
    pub includes: Includes,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Includes {
    #[serde(default)]
    pub users: Vec<Author>,
    #[serde(default)]
    pub places: Vec<Place>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub result_count: u64,
    #[serde(default)]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawGeo {
    #[serde(default)]
    pub place_id: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

/// A post as it appears in `data`, before includes are attached.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTweet {
    pub id: String,
    pub author_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub geo: Option<RawGeo>,
    #[serde(default)]
    pub public_metrics: PublicMetrics,
    #[serde(default)]
    pub referenced_tweets: Vec<ReferencedTweet>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Decodes one response page.
///
/// # Errors
///
/// Returns an error if the bytes are not a valid JSON search page.
pub fn parse_page(bytes: &[u8]) -> Result<SearchPage> {
    Ok(serde_json::from_slice(bytes)?)
}

impl SearchPage {
    /// Converts the page's posts into [`Record`]s with their author and
    /// place expanded from `includes`.
    ///
    /// A matching place replaces the raw geo annotation entirely, exact
    /// coordinates included. Posts whose place is missing from `includes`
    /// keep the raw `place_id`/`coordinates`.
    pub fn attach_includes(&self) -> Vec<Record> {
        self.data
            .iter()
            .map(|tweet| {
                let author = self
                    .includes
                    .users
                    .iter()
                    .find(|u| u.id == tweet.author_id)
                    .cloned()
                    .unwrap_or_else(|| Author::from_id(&tweet.author_id));

                let geo = tweet.geo.as_ref().map(|raw| {
                    let place = raw
                        .place_id
                        .as_ref()
                        .and_then(|id| self.includes.places.iter().find(|p| &p.id == id));
                    match place {
                        Some(place) => place.to_geo(),
                        None => Geo {
                            place_id: raw.place_id.clone(),
                            coordinates: raw.coordinates.clone(),
                            ..Default::default()
                        },
                    }
                });

                Record {
                    id: tweet.id.clone(),
                    author,
                    text: tweet.text.clone(),
                    created_at: tweet.created_at,
                    geo,
                    public_metrics: tweet.public_metrics,
                    referenced_tweets: tweet.referenced_tweets.clone(),
                    lang: tweet.lang.clone(),
                    conversation_id: tweet.conversation_id.clone(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::records::PlaceType;

    pub const PAGE: &str = r#"{
        "data": [
            {"id": "1", "author_id": "u1", "text": "Guten Morgen",
             "created_at": "2020-04-06T08:00:00.000Z",
             "geo": {"place_id": "p1"},
             "public_metrics": {"retweet_count": 0, "reply_count": 1, "like_count": 2, "quote_count": 0}},
            {"id": "2", "author_id": "u2", "text": "Hallo",
             "created_at": "2020-04-06T09:00:00.000Z",
             "geo": {"place_id": "missing", "coordinates": {"type": "Point", "coordinates": [13.04, 47.8]}}},
            {"id": "3", "author_id": "u3", "text": "no geo",
             "created_at": "2020-04-06T10:00:00.000Z"}
        ],
        "includes": {
            "users": [{"id": "u1", "name": "One", "username": "one"}],
            "places": [{"id": "p1", "full_name": "Salzburg, Austria", "name": "Salzburg",
                        "place_type": "city", "geo": {"bbox": [12.9, 47.7, 13.1, 47.9]}}]
        },
        "meta": {"result_count": 3, "next_token": "abc"}
    }"#;

    #[test]
    fn test_parse_page() {
        let page = parse_page(PAGE.as_bytes()).unwrap();
        assert_eq!(page.data.len(), 3);
        assert_eq!(page.meta.next_token.as_deref(), Some("abc"));
        assert_eq!(page.includes.places[0].place_type, Some(PlaceType::City));
    }

    #[test]
    fn test_parse_invalid_bytes() {
        assert!(parse_page(&[0xFF, 0xFE, 0x00]).is_err());
    }

    #[test]
    fn test_parse_empty_page() {
        let page = parse_page(br#"{"meta": {"result_count": 0}}"#).unwrap();
        assert!(page.data.is_empty());
        assert!(page.meta.next_token.is_none());
    }

    #[test]
    fn test_attach_includes() {
        let page = parse_page(PAGE.as_bytes()).unwrap();
        let records = page.attach_includes();

        assert_eq!(records[0].author.username.as_deref(), Some("one"));
        let geo = records[0].geo.as_ref().unwrap();
        assert_eq!(geo.place_type, Some(PlaceType::City));
        assert_eq!(geo.bbox, Some([12.9, 47.7, 13.1, 47.9]));

        // unknown place keeps the raw annotation
        assert!(records[1].has_coordinates());
        assert_eq!(records[1].author.id, "u2");
        assert!(records[1].author.username.is_none());

        assert!(records[2].geo.is_none());
    }
}
