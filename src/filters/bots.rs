//! Bot heuristics: machine-formatted content, over-active accounts and
//! duplicated texts.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::Partition;
use crate::records::Record;

/// Symbols counted by [`detect_bot_by_content`].
pub static DEFAULT_BOT_SYMBOLS: &[&str] = &[
    "%", "°C", "hpa", "km/h", " mm ", "hPa", "Km/h", "kmh", "m/s",
];

/// Tunables of the content heuristic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotRules {
    /// Case-sensitive substrings; each one present adds 1.
    pub symbols: Vec<String>,
    /// Score at which a text counts as machine-made.
    pub threshold: usize,
    /// Minimum distance, in characters, between the first `|` and a later one.
    pub pipe_gap: usize,
    /// Score added when the pipe rule matches.
    pub pipe_weight: usize,
}

impl Default for BotRules {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_BOT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            threshold: 2,
            pipe_gap: 3,
            pipe_weight: 2,
        }
    }
}

/// Scores `text` against `rules` and reports whether it looks like an
/// automated weather/telemetry bulletin.
pub fn detect_bot_by_content(text: &str, rules: &BotRules) -> bool {
    let mut score = rules
        .symbols
        .iter()
        .filter(|s| text.contains(s.as_str()))
        .count();

    let pipes: Vec<usize> = text
        .chars()
        .enumerate()
        .filter(|(_, c)| *c == '|')
        .map(|(i, _)| i)
        .collect();
    if let Some(first) = pipes.first() {
        if pipes.iter().skip(1).any(|p| *p >= first + rules.pipe_gap) {
            score += rules.pipe_weight;
        }
    }

    score >= rules.threshold
}

/// Splits off every record whose text trips [`detect_bot_by_content`].
pub fn split_bot_content(records: &[Record], rules: &BotRules) -> Partition {
    Partition::split(records, |r| !detect_bot_by_content(&r.text, rules))
}

/// Result of the account-share heuristic.
#[derive(Debug, Clone, Default)]
pub struct AccountFilterOutcome {
    pub partition: Partition,
    /// Blacklisted author id → share of the pre-filter total.
    pub blacklist: BTreeMap<String, f64>,
}

/// Removes all records of authors whose share of `original_total` exceeds
/// `threshold`.
///
/// Counts are taken once over `records`; the denominator is the size of the
/// collection before any filtering and stays fixed for the whole pass.
pub fn detect_bot_by_account_ratio(
    records: &[Record],
    original_total: usize,
    threshold: f64,
) -> AccountFilterOutcome {
    if original_total == 0 {
        return AccountFilterOutcome {
            partition: Partition::split(records, |_| true),
            blacklist: BTreeMap::new(),
        };
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        *counts.entry(record.author.id.as_str()).or_default() += 1;
    }

    let blacklist: BTreeMap<String, f64> = counts
        .into_iter()
        .map(|(author, count)| (author, count as f64 / original_total as f64))
        .filter(|(_, ratio)| *ratio > threshold)
        .map(|(author, ratio)| (author.to_string(), ratio))
        .collect();

    let partition = Partition::split(records, |r| !blacklist.contains_key(&r.author.id));
    AccountFilterOutcome {
        partition,
        blacklist,
    }
}

/// Keeps the first record of every exact text and drops later repeats.
pub fn eliminate_duplicate_texts(records: &[Record]) -> Partition {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut partition = Partition::default();
    for record in records {
        if seen.insert(record.text.as_str()) {
            partition.kept.push(record.clone());
        } else {
            partition.removed.push(record.clone());
        }
    }
    partition
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::fixtures::record;

    #[test]
    fn test_weather_bulletin_is_bot() {
        let rules = BotRules::default();
        assert!(detect_bot_by_content(
            "Temp 12.3°C, Wind 5 km/h, Feuchte 80%",
            &rules
        ));
        assert!(detect_bot_by_content("1013 hPa, 70%", &rules));
    }

    #[test]
    fn test_single_symbol_is_not_bot() {
        let rules = BotRules::default();
        assert!(!detect_bot_by_content("50% off today!", &rules));
        assert!(!detect_bot_by_content("Schönes Wetter heute", &rules));
    }

    #[test]
    fn test_pipe_rule() {
        let rules = BotRules::default();
        assert!(detect_bot_by_content("T: 12 | H: 80 | W: 3", &rules));
        // adjacent pipes do not reach the gap
        assert!(!detect_bot_by_content("a || b", &rules));
        assert!(!detect_bot_by_content("one | pipe", &rules));
    }

    #[test]
    fn test_threshold_is_configurable() {
        let rules = BotRules {
            threshold: 1,
            ..BotRules::default()
        };
        assert!(detect_bot_by_content("50% off today!", &rules));
    }

    #[test]
    fn test_account_ratio_removes_only_heavy_author() {
        // 1 heavy author with 2 of 201 records (~1%), 199 authors with 1 each (~0.5%)
        let mut records = vec![record("h1", "heavy", "a"), record("h2", "heavy", "b")];
        for i in 0..199 {
            records.push(record(&format!("r{i}"), &format!("user{i}"), "c"));
        }
        let total = records.len();

        let outcome = detect_bot_by_account_ratio(&records, total, 0.005);

        assert_eq!(outcome.blacklist.len(), 1);
        assert!(outcome.blacklist.contains_key("heavy"));
        assert_eq!(outcome.partition.removed.len(), 2);
        assert_eq!(outcome.partition.kept.len(), 199);
        assert!(outcome.partition.kept.iter().all(|r| r.author.id != "heavy"));
    }

    #[test]
    fn test_account_ratio_uses_fixed_denominator() {
        let records = vec![record("1", "a", "x"), record("2", "b", "y")];
        // against a large pre-filter total nobody exceeds the threshold
        let outcome = detect_bot_by_account_ratio(&records, 1000, 0.005);
        assert!(outcome.blacklist.is_empty());
        assert_eq!(outcome.partition.kept.len(), 2);
    }

    #[test]
    fn test_duplicates_keep_first() {
        let records = vec![
            record("1", "a", "same"),
            record("2", "b", "other"),
            record("3", "c", "same"),
        ];
        let partition = eliminate_duplicate_texts(&records);
        let ids: Vec<_> = partition.kept.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(partition.removed[0].id, "3");
    }
}
