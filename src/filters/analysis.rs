//! Exploratory queries over a record collection: time ranges, busy days,
//! interactions and engagement rankings.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};
use serde::Serialize;

use super::Partition;
use crate::records::{Record, ReferenceKind};

/// Keeps records with `start <= created_at <= end`.
pub fn within_time_range(records: &[Record], start: DateTime<Utc>, end: DateTime<Utc>) -> Partition {
    Partition::split(records, |r| r.created_at >= start && r.created_at <= end)
}

/// Number of records per calendar day, ascending by day.
pub fn daily_counts(records: &[Record]) -> BTreeMap<NaiveDate, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.created_at.date_naive()).or_default() += 1;
    }
    counts
}

/// Number of records per ISO week, labelled `YY: WW`.
pub fn weekly_counts(records: &[Record]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        let week = record.created_at.iso_week();
        let label = format!("{:02}: {}", week.year() % 100, week.week());
        *counts.entry(label).or_default() += 1;
    }
    counts
}

/// Days with more records than the average over days that have any.
pub fn exceptional_days(records: &[Record]) -> Vec<NaiveDate> {
    let counts = daily_counts(records);
    if counts.is_empty() {
        return Vec::new();
    }
    let average = records.len() as f64 / counts.len() as f64;
    counts
        .into_iter()
        .filter(|(_, n)| *n as f64 > average)
        .map(|(day, _)| day)
        .collect()
}

/// Records sent on an [`exceptional_days`] day.
pub fn records_on_exceptional_days(records: &[Record]) -> Vec<Record> {
    let days: HashSet<NaiveDate> = exceptional_days(records).into_iter().collect();
    records
        .iter()
        .filter(|r| days.contains(&r.created_at.date_naive()))
        .cloned()
        .collect()
}

/// Records referencing `record_id` with the given kind.
pub fn interactions(records: &[Record], record_id: &str, kind: ReferenceKind) -> Vec<Record> {
    records
        .iter()
        .filter(|r| {
            r.referenced_tweets
                .iter()
                .any(|t| t.id == record_id && t.kind == kind)
        })
        .cloned()
        .collect()
}

pub fn replies_to(records: &[Record], record_id: &str) -> Vec<Record> {
    interactions(records, record_id, ReferenceKind::RepliedTo)
}

pub fn quotes_of(records: &[Record], record_id: &str) -> Vec<Record> {
    interactions(records, record_id, ReferenceKind::Quoted)
}

pub fn retweets_of(records: &[Record], record_id: &str) -> Vec<Record> {
    interactions(records, record_id, ReferenceKind::Retweeted)
}

/// Engagement metric used to rank accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engagement {
    Likes,
    Retweets,
    Quotes,
    Replies,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccountEngagement {
    pub username: String,
    pub records: usize,
    pub likes: u64,
    pub retweets: u64,
    pub quotes: u64,
    pub replies: u64,
}

impl AccountEngagement {
    fn get(&self, by: Engagement) -> u64 {
        match by {
            Engagement::Likes => self.likes,
            Engagement::Retweets => self.retweets,
            Engagement::Quotes => self.quotes,
            Engagement::Replies => self.replies,
        }
    }
}

/// Sums engagement per username, most engaged first.
pub fn most_interacted_accounts(records: &[Record], by: Engagement) -> Vec<AccountEngagement> {
    let mut accounts: HashMap<String, AccountEngagement> = HashMap::new();
    for record in records {
        let username = record
            .author
            .username
            .clone()
            .unwrap_or_else(|| record.author.id.clone());
        let entry = accounts
            .entry(username.clone())
            .or_insert_with(|| AccountEngagement {
                username,
                ..Default::default()
            });
        entry.records += 1;
        entry.likes += record.public_metrics.like_count;
        entry.retweets += record.public_metrics.retweet_count;
        entry.quotes += record.public_metrics.quote_count;
        entry.replies += record.public_metrics.reply_count;
    }

    let mut ranked: Vec<_> = accounts.into_values().collect();
    ranked.sort_by(|a, b| {
        b.get(by)
            .cmp(&a.get(by))
            .then_with(|| a.username.cmp(&b.username))
    });
    ranked
}

/// Gap to the previous record, after sorting by time. The first gap is `None`.
pub fn time_deltas(records: &[Record]) -> Vec<(Record, Option<TimeDelta>)> {
    let mut sorted: Vec<Record> = records.to_vec();
    sorted.sort_by_key(|r| r.created_at);
    let mut previous: Option<DateTime<Utc>> = None;
    sorted
        .into_iter()
        .map(|r| {
            let delta = previous.map(|p| r.created_at - p);
            previous = Some(r.created_at);
            (r, delta)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::ReferencedTweet;
    use crate::records::fixtures::record;
    use chrono::TimeZone;

    fn at(mut r: Record, day: u32, hour: u32) -> Record {
        r.created_at = Utc.with_ymd_and_hms(2020, 4, day, hour, 0, 0).unwrap();
        r
    }

    #[test]
    fn test_time_range_is_inclusive() {
        let records = vec![
            at(record("1", "a", "x"), 6, 0),
            at(record("2", "a", "y"), 7, 0),
            at(record("3", "a", "z"), 8, 0),
        ];
        let start = Utc.with_ymd_and_hms(2020, 4, 6, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2020, 4, 7, 0, 0, 0).unwrap();
        let p = within_time_range(&records, start, end);
        assert_eq!(p.kept.len(), 2);
    }

    #[test]
    fn test_exceptional_days() {
        let records = vec![
            at(record("1", "a", "x"), 6, 1),
            at(record("2", "a", "x"), 6, 2),
            at(record("3", "a", "x"), 6, 3),
            at(record("4", "a", "x"), 7, 1),
        ];
        let days = exceptional_days(&records);
        assert_eq!(days, vec![NaiveDate::from_ymd_opt(2020, 4, 6).unwrap()]);
        assert_eq!(records_on_exceptional_days(&records).len(), 3);
    }

    #[test]
    fn test_weekly_counts_label() {
        let records = vec![at(record("1", "a", "x"), 6, 1)];
        let weeks = weekly_counts(&records);
        assert_eq!(weeks.get("20: 15"), Some(&1));
    }

    #[test]
    fn test_interactions() {
        let mut reply = record("2", "b", "@a yes");
        reply.referenced_tweets.push(ReferencedTweet {
            kind: ReferenceKind::RepliedTo,
            id: "1".to_string(),
        });
        let records = vec![record("1", "a", "question?"), reply];
        assert_eq!(replies_to(&records, "1").len(), 1);
        assert!(quotes_of(&records, "1").is_empty());
        assert!(retweets_of(&records, "1").is_empty());
    }

    #[test]
    fn test_most_interacted_accounts() {
        let mut a = record("1", "a", "x");
        a.public_metrics.like_count = 5;
        let mut b = record("2", "b", "y");
        b.public_metrics.like_count = 7;
        let mut b2 = record("3", "b", "z");
        b2.public_metrics.like_count = 1;

        let ranked = most_interacted_accounts(&[a, b, b2], Engagement::Likes);
        assert_eq!(ranked[0].username, "user_b");
        assert_eq!(ranked[0].likes, 8);
        assert_eq!(ranked[0].records, 2);
    }

    #[test]
    fn test_time_deltas() {
        let records = vec![at(record("2", "a", "y"), 6, 3), at(record("1", "a", "x"), 6, 1)];
        let deltas = time_deltas(&records);
        assert_eq!(deltas[0].0.id, "1");
        assert!(deltas[0].1.is_none());
        assert_eq!(deltas[1].1, Some(TimeDelta::hours(2)));
    }
}
