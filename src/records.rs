//! Record model for posts returned by the search API, plus the tabular
//! projection used for CSV export and inspection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of place attached to a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceType {
    Poi,
    Neighborhood,
    City,
    Admin,
    Country,
    #[serde(other)]
    Unknown,
}

impl PlaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceType::Poi => "poi",
            PlaceType::Neighborhood => "neighborhood",
            PlaceType::City => "city",
            PlaceType::Admin => "admin",
            PlaceType::Country => "country",
            PlaceType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl Author {
    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicMetrics {
    #[serde(default)]
    pub retweet_count: u64,
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub quote_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Retweeted,
    Quoted,
    RepliedTo,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencedTweet {
    #[serde(rename = "type")]
    pub kind: ReferenceKind,
    pub id: String,
}

/// Exact point coordinates as sent by the API (`[lon, lat]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub coordinates: [f64; 2],
}

/// Geo annotation of a post.
///
/// Before place attachment this only holds `place_id` and maybe
/// `coordinates`; once the matching place is attached the place fields are
/// filled in and the exact coordinates are gone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geo {
    #[serde(default)]
    pub place_id: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub place_type: Option<PlaceType>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    /// `[west, south, east, north]`
    #[serde(default)]
    pub bbox: Option<[f64; 4]>,
}

impl Geo {
    /// True when only the place id is known (place lookup failed or the
    /// place was extracted into a separate collection).
    pub fn is_reference_only(&self) -> bool {
        self.coordinates.is_none()
            && self.place_type.is_none()
            && self.name.is_none()
            && self.full_name.is_none()
            && self.bbox.is_none()
    }
}

/// A single social-media post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub author: Author,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub geo: Option<Geo>,
    #[serde(default)]
    pub public_metrics: PublicMetrics,
    #[serde(default)]
    pub referenced_tweets: Vec<ReferencedTweet>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl Record {
    pub fn place_type(&self) -> Option<PlaceType> {
        self.geo.as_ref().and_then(|g| g.place_type)
    }

    pub fn has_coordinates(&self) -> bool {
        self.geo.as_ref().is_some_and(|g| g.coordinates.is_some())
    }

    /// A retweet carries exactly one reference, of kind `retweeted`.
    pub fn is_retweet(&self) -> bool {
        self.referenced_tweets.len() == 1
            && self.referenced_tweets[0].kind == ReferenceKind::Retweeted
    }
}

/// Flat projection of a [`Record`], one CSV row per post.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordRow {
    #[serde(rename = "Text")]
    pub text: String,
    #[serde(rename = "Id_Tweet")]
    pub id: String,
    #[serde(rename = "Id_User")]
    pub user_id: String,
    #[serde(rename = "Username")]
    pub username: Option<String>,
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "Likes")]
    pub likes: u64,
    #[serde(rename = "Retweets")]
    pub retweets: u64,
    #[serde(rename = "Quotes")]
    pub quotes: u64,
    #[serde(rename = "Replies")]
    pub replies: u64,
    #[serde(rename = "Place_Type")]
    pub place_type: Option<&'static str>,
    #[serde(rename = "Place_Name")]
    pub place_name: Option<String>,
    #[serde(rename = "Id_Place")]
    pub place_id: Option<String>,
}

impl From<&Record> for RecordRow {
    fn from(record: &Record) -> Self {
        let geo = record.geo.as_ref();
        RecordRow {
            text: unescape_html(&record.text),
            id: record.id.clone(),
            user_id: record.author.id.clone(),
            username: record.author.username.clone(),
            timestamp: record.created_at,
            likes: record.public_metrics.like_count,
            retweets: record.public_metrics.retweet_count,
            quotes: record.public_metrics.quote_count,
            replies: record.public_metrics.reply_count,
            place_type: geo.and_then(|g| g.place_type).map(|t| t.as_str()),
            place_name: geo.and_then(|g| g.name.clone()),
            place_id: geo.and_then(|g| g.place_id.clone()),
        }
    }
}

/// Projects a record collection into rows.
pub fn to_rows(records: &[Record]) -> Vec<RecordRow> {
    records.iter().map(RecordRow::from).collect()
}

/// Decodes the HTML entities the search API escapes in post text: the
/// named `&lt;`, `&gt;`, `&quot;`, `&apos;` and `&amp;`, plus decimal and
/// hex character references. Anything else is left as written.
pub fn unescape_html(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find('&') {
        out.push_str(&rest[..at]);
        rest = &rest[at..];
        let decoded = rest
            .find(';')
            .filter(|end| *end <= 12)
            .and_then(|end| decode_entity(&rest[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "amp" => Some('&'),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_unescape_html() {
        assert_eq!(unescape_html("a &amp; b &lt;3"), "a & b <3");
        assert_eq!(unescape_html("&amp;lt;"), "&lt;");
        assert_eq!(unescape_html("plain"), "plain");
    }

    #[test]
    fn test_unescape_character_references() {
        assert_eq!(unescape_html("it&#8217;s &#x1F600; &#39;ok&#X27;"), "it\u{2019}s \u{1F600} 'ok'");
        assert_eq!(unescape_html("Tom &amp; Jerry &#38; co"), "Tom & Jerry & co");
        // unknown or malformed references stay as written
        assert_eq!(unescape_html("&nbsp; &#xZZ; &#; a&b"), "&nbsp; &#xZZ; &#; a&b");
        assert_eq!(unescape_html("&#1114112;"), "&#1114112;");
    }

    #[test]
    fn test_row_projection() {
        let mut r = with_place(record("1", "42", "Tom &amp; Jerry"), "p1", PlaceType::Poi);
        r.public_metrics.like_count = 3;
        let row = RecordRow::from(&r);

        assert_eq!(row.text, "Tom & Jerry");
        assert_eq!(row.user_id, "42");
        assert_eq!(row.likes, 3);
        assert_eq!(row.place_type, Some("poi"));
        assert_eq!(row.place_id.as_deref(), Some("p1"));
    }

    #[test]
    fn test_is_retweet() {
        let mut r = record("1", "a", "RT hello");
        assert!(!r.is_retweet());
        r.referenced_tweets.push(ReferencedTweet {
            kind: ReferenceKind::Retweeted,
            id: "0".to_string(),
        });
        assert!(r.is_retweet());
        r.referenced_tweets.push(ReferencedTweet {
            kind: ReferenceKind::Quoted,
            id: "9".to_string(),
        });
        assert!(!r.is_retweet());
    }

    #[test]
    fn test_place_type_deserializes_unknown() {
        let t: PlaceType = serde_json::from_str("\"planet\"").unwrap();
        assert_eq!(t, PlaceType::Unknown);
        let t: PlaceType = serde_json::from_str("\"neighborhood\"").unwrap();
        assert_eq!(t, PlaceType::Neighborhood);
    }
}
