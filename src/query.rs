//! Full-archive search query construction.
//!
//! Elements of a list parameter are OR-joined (or AND-joined for places when
//! requested) and wrapped in parentheses when there is more than one; a
//! leading `--` negates an element. Different parameters are AND-joined.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const SEARCH_URL: &str = "https://api.twitter.com/2/tweets/search/all";
pub const TWEET_FIELDS: &str =
    "created_at,text,public_metrics,referenced_tweets,geo,lang,conversation_id";
pub const EXPANSIONS: &str = "author_id,geo.place_id";
pub const PLACE_FIELDS: &str = "full_name,geo,id,name,place_type";
pub const USER_FIELDS: &str = "id,name,username";

const MAX_QUERY_LEN: usize = 1024;
const NEGATION: &str = "--";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RadiusUnit {
    Km,
    Mi,
}

impl RadiusUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            RadiusUnit::Km => "km",
            RadiusUnit::Mi => "mi",
        }
    }

    pub fn max_radius(&self) -> f64 {
        match self {
            RadiusUnit::Km => 40.0,
            RadiusUnit::Mi => 25.0,
        }
    }
}

/// Circle around a point, rendered as `point_radius:[lon lat radius]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointRadius {
    pub lat: f64,
    pub lon: f64,
    pub radius: f64,
    pub unit: RadiusUnit,
    #[serde(default)]
    pub negate: bool,
}

impl PointRadius {
    fn validate(&self) -> Result<()> {
        let max = self.unit.max_radius();
        if self.radius > max {
            return Err(Error::RadiusTooLarge {
                radius: self.radius,
                unit: self.unit.as_str().to_string(),
                max,
            });
        }
        Ok(())
    }

    fn element(&self) -> String {
        let body = format!("{} {} {}{}", self.lon, self.lat, self.radius, self.unit.as_str());
        if self.negate {
            format!("{NEGATION}{body}")
        } else {
            body
        }
    }
}

/// `[west, south, east, north]` in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub bbox: [f64; 4],
    #[serde(default)]
    pub negate: bool,
}

impl BoundingBox {
    fn element(&self) -> String {
        let [w, s, e, n] = self.bbox;
        let body = format!("{w} {s} {e} {n}");
        if self.negate {
            format!("{NEGATION}{body}")
        } else {
            body
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Logic {
    #[default]
    Or,
    And,
}

/// Search parameters, usually read from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Raw query used verbatim instead of the built one.
    pub query: Option<String>,
    pub hashtags: Vec<String>,
    pub phrases: Vec<String>,
    pub from_accounts: Vec<String>,
    pub to_accounts: Vec<String>,
    pub mentions: Vec<String>,
    pub point_radius: Vec<PointRadius>,
    pub bounding_boxes: Vec<BoundingBox>,
    pub places: Vec<String>,
    pub place_logic: Logic,
    pub retweets: Option<bool>,
    pub replies: Option<bool>,
    pub quotes: Option<bool>,
    pub has_media: Option<bool>,
    pub has_links: Option<bool>,
    pub has_geo: Option<bool>,
    pub lang: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub max_results: u32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            query: None,
            hashtags: Vec::new(),
            phrases: Vec::new(),
            from_accounts: Vec::new(),
            to_accounts: Vec::new(),
            mentions: Vec::new(),
            point_radius: Vec::new(),
            bounding_boxes: Vec::new(),
            places: Vec::new(),
            place_logic: Logic::Or,
            retweets: None,
            replies: None,
            quotes: None,
            has_media: None,
            has_links: None,
            has_geo: None,
            lang: None,
            start_time: None,
            end_time: None,
            max_results: 10,
        }
    }
}

fn subquery(elements: &[String], before: &str, after: &str, logic: Logic) -> Option<String> {
    if elements.is_empty() {
        return None;
    }
    let joiner = match logic {
        Logic::Or => " OR ",
        Logic::And => " ",
    };
    let parts: Vec<String> = elements
        .iter()
        .map(|e| match e.strip_prefix(NEGATION) {
            Some(rest) => format!("-{before}{rest}{after}"),
            None => format!("{before}{e}{after}"),
        })
        .collect();
    let joined = parts.join(joiner);
    if parts.len() > 1 {
        Some(format!("({joined})"))
    } else {
        Some(joined)
    }
}

fn flag(value: Option<bool>, operator: &str) -> Option<String> {
    value.map(|on| {
        if on {
            operator.to_string()
        } else {
            format!("-{operator}")
        }
    })
}

impl SearchParams {
    /// Builds the query string.
    ///
    /// # Errors
    ///
    /// Fails on a radius above the unit's maximum or a query longer than
    /// 1024 characters.
    pub fn build_query(&self) -> Result<String> {
        if let Some(raw) = &self.query {
            return check_length(raw.clone());
        }
        for point in &self.point_radius {
            point.validate()?;
        }

        let points: Vec<String> = self.point_radius.iter().map(PointRadius::element).collect();
        let boxes: Vec<String> = self.bounding_boxes.iter().map(BoundingBox::element).collect();

        let parts = [
            subquery(&self.hashtags, "", "", Logic::Or),
            subquery(&self.phrases, "\"", "\"", Logic::Or),
            subquery(&self.from_accounts, "from:", "", Logic::Or),
            subquery(&self.to_accounts, "to:", "", Logic::Or),
            subquery(&self.mentions, "@", "", Logic::Or),
            subquery(&points, "point_radius:[", "]", Logic::Or),
            subquery(&boxes, "bounding_box:[", "]", Logic::Or),
            subquery(&self.places, "place:", "", self.place_logic),
            flag(self.retweets, "is:retweet"),
            flag(self.replies, "is:reply"),
            flag(self.quotes, "is:quote"),
            flag(self.has_media, "has:media"),
            flag(self.has_links, "has:links"),
            flag(self.has_geo, "has:geo"),
            self.lang.as_ref().map(|l| format!("lang:{l}")),
        ];

        let query = parts.into_iter().flatten().collect::<Vec<_>>().join(" ");
        check_length(query)
    }

    /// Request query parameters, without the pagination token.
    ///
    /// # Errors
    ///
    /// Fails when the query is invalid or the page size is outside 10..=500.
    pub fn query_params(&self) -> Result<Vec<(String, String)>> {
        if !(10..=500).contains(&self.max_results) {
            return Err(Error::PageSizeOutOfRange {
                requested: self.max_results,
            });
        }

        let mut params = vec![
            ("query".to_string(), self.build_query()?),
            ("tweet.fields".to_string(), TWEET_FIELDS.to_string()),
            ("expansions".to_string(), EXPANSIONS.to_string()),
            ("place.fields".to_string(), PLACE_FIELDS.to_string()),
            ("user.fields".to_string(), USER_FIELDS.to_string()),
            ("max_results".to_string(), self.max_results.to_string()),
        ];
        if let Some(start) = self.start_time {
            params.push((
                "start_time".to_string(),
                start.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }
        if let Some(end) = self.end_time {
            params.push((
                "end_time".to_string(),
                end.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }
        Ok(params)
    }
}

fn check_length(query: String) -> Result<String> {
    let length = query.chars().count();
    if length > MAX_QUERY_LEN {
        return Err(Error::QueryTooLong { length });
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_hashtags_and_flags() {
        let params = SearchParams {
            hashtags: strings(&["#sturm", "#gewitter"]),
            retweets: Some(false),
            has_geo: Some(true),
            lang: Some("de".to_string()),
            ..Default::default()
        };
        assert_eq!(
            params.build_query().unwrap(),
            "(#sturm OR #gewitter) -is:retweet has:geo lang:de"
        );
    }

    #[test]
    fn test_single_element_has_no_parentheses() {
        let params = SearchParams {
            from_accounts: strings(&["dwd_presse"]),
            retweets: Some(true),
            ..Default::default()
        };
        assert_eq!(params.build_query().unwrap(), "from:dwd_presse is:retweet");
    }

    #[test]
    fn test_negation_and_own_fields() {
        let params = SearchParams {
            phrases: strings(&["sturm", "--regen"]),
            to_accounts: strings(&["alice"]),
            mentions: strings(&["bob"]),
            ..Default::default()
        };
        assert_eq!(
            params.build_query().unwrap(),
            "(\"sturm\" OR -\"regen\") to:alice @bob"
        );
    }

    #[test]
    fn test_geo_operators() {
        let params = SearchParams {
            point_radius: vec![PointRadius {
                lat: 47.8,
                lon: 13.04,
                radius: 10.0,
                unit: RadiusUnit::Km,
                negate: false,
            }],
            bounding_boxes: vec![BoundingBox {
                bbox: [-43.8, -23.1, -43.4, -22.7],
                negate: false,
            }],
            places: strings(&["--97bcdfca1a2dca59", "--41bf05f3b26396e4"]),
            place_logic: Logic::And,
            ..Default::default()
        };
        assert_eq!(
            params.build_query().unwrap(),
            "point_radius:[13.04 47.8 10km] bounding_box:[-43.8 -23.1 -43.4 -22.7] \
             (-place:97bcdfca1a2dca59 -place:41bf05f3b26396e4)"
        );
    }

    #[test]
    fn test_radius_limits() {
        let point = |radius, unit| SearchParams {
            point_radius: vec![PointRadius {
                lat: 0.0,
                lon: 0.0,
                radius,
                unit,
                negate: false,
            }],
            ..Default::default()
        };
        assert!(point(40.0, RadiusUnit::Km).build_query().is_ok());
        assert!(matches!(
            point(41.0, RadiusUnit::Km).build_query(),
            Err(Error::RadiusTooLarge { .. })
        ));
        assert!(matches!(
            point(26.0, RadiusUnit::Mi).build_query(),
            Err(Error::RadiusTooLarge { .. })
        ));
    }

    #[test]
    fn test_query_too_long() {
        let params = SearchParams {
            query: Some("a".repeat(1025)),
            ..Default::default()
        };
        assert!(matches!(
            params.build_query(),
            Err(Error::QueryTooLong { length: 1025 })
        ));
    }

    #[test]
    fn test_page_size_bounds() {
        for bad in [9, 501] {
            let params = SearchParams {
                hashtags: strings(&["#x"]),
                max_results: bad,
                ..Default::default()
            };
            assert!(matches!(
                params.query_params(),
                Err(Error::PageSizeOutOfRange { .. })
            ));
        }
    }

    #[test]
    fn test_query_params_carry_both_times() {
        let params = SearchParams {
            hashtags: strings(&["#x"]),
            start_time: Some(Utc.with_ymd_and_hms(2019, 5, 31, 0, 0, 0).unwrap()),
            end_time: Some(Utc.with_ymd_and_hms(2019, 5, 31, 23, 59, 59).unwrap()),
            max_results: 100,
            ..Default::default()
        };
        let qp = params.query_params().unwrap();
        let get = |k: &str| qp.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("start_time"), Some("2019-05-31T00:00:00Z"));
        assert_eq!(get("end_time"), Some("2019-05-31T23:59:59Z"));
        assert_eq!(get("max_results"), Some("100"));
    }

    #[test]
    fn test_params_from_json() {
        let params: SearchParams =
            serde_json::from_str(r##"{"hashtags": ["#trump"], "has_geo": true}"##).unwrap();
        assert_eq!(params.max_results, 10);
        assert_eq!(params.build_query().unwrap(), "#trump has:geo");
    }
}
