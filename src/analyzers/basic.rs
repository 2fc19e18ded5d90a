//! Row and user counts of a window.

use std::collections::HashSet;

use crate::analyzers::aggregate::{Aggregator, Stage, WindowContext};
use crate::analyzers::od::MatrixStore;
use crate::analyzers::types::{KeyColumn, MetricsRow};
use crate::analyzers::utility::{median, safe_div};
use crate::error::Result;
use crate::subsets::Subset;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct WindowStats {
    pub no_of_tweets: usize,
    pub number_unique_users: usize,
    pub median_tweets_per_user: f64,
    pub mean_tweets_per_user: f64,
    pub n_user_more_than_one_tweet: usize,
    pub n_users_with_more_than_one_location_point: usize,
    pub n_users_with_more_than_one_cod: usize,
}

impl WindowStats {
    pub fn from_subset(subset: &Subset) -> Self {
        let mut s = WindowStats {
            no_of_tweets: subset.len(),
            ..Default::default()
        };

        let users = subset.rows_by_user();
        s.number_unique_users = users.len();

        let mut per_user = Vec::with_capacity(users.len());
        for (_, rows) in &users {
            per_user.push(rows.len() as f64);

            if rows.len() > 1 {
                s.n_user_more_than_one_tweet += 1;
            }

            let points: HashSet<&str> = rows.iter().map(|r| r.wkt.as_str()).collect();
            if points.len() > 1 {
                s.n_users_with_more_than_one_location_point += 1;
            }

            let codes: HashSet<u32> = rows.iter().map(|r| r.cod).collect();
            if codes.len() > 1 {
                s.n_users_with_more_than_one_cod += 1;
            }
        }

        s.median_tweets_per_user = median(&per_user);
        s.mean_tweets_per_user = safe_div(s.no_of_tweets as f64, s.number_unique_users as f64);
        s
    }

    pub fn to_row(&self, middle_key: &str, start_key: &str, end_key: &str) -> MetricsRow {
        let mut row = MetricsRow::new(middle_key);
        row.text("start_date", start_key);
        row.text("end_date", end_key);
        row.count("no_of_tweets", self.no_of_tweets);
        row.count("number_unique_users", self.number_unique_users);
        row.number("median_tweets_per_user", self.median_tweets_per_user);
        row.number("mean_tweets_per_user", self.mean_tweets_per_user);
        row.count("n_user_more_than_one_tweet", self.n_user_more_than_one_tweet);
        row.count(
            "n_users_with_more_than_one_location_point",
            self.n_users_with_more_than_one_location_point,
        );
        row.count(
            "n_users_with_more_than_one_cod",
            self.n_users_with_more_than_one_cod,
        );
        row
    }
}

/// Creates each window's row, keyed by its middle date.
pub struct BasicStage;

impl Aggregator for BasicStage {
    fn stage(&self) -> Stage {
        Stage::Basic
    }

    fn key_column(&self) -> KeyColumn {
        KeyColumn::MiddleDate
    }

    fn compute(
        &mut self,
        window: &WindowContext<'_>,
        _matrices: &mut MatrixStore,
    ) -> Result<Option<MetricsRow>> {
        let stats = WindowStats::from_subset(window.subset);
        Ok(Some(stats.to_row(
            &window.middle_key,
            &window.start_key,
            &window.end_key,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsets::fixtures::{row, subset};

    #[test]
    fn test_empty_window() {
        let stats = WindowStats::from_subset(&subset(Vec::new()));
        assert_eq!(stats.no_of_tweets, 0);
        assert_eq!(stats.number_unique_users, 0);
        assert!(stats.mean_tweets_per_user.is_nan());
        assert!(stats.median_tweets_per_user.is_nan());
    }

    #[test]
    fn test_counts() {
        let s = subset(vec![
            row("1", "a", "2020-04-06 08:00:00", 1, 0.0, 0.0),
            row("2", "a", "2020-04-06 09:00:00", 1, 0.0, 0.0),
            row("3", "a", "2020-04-06 10:00:00", 1, 0.5, 0.0),
            row("4", "b", "2020-04-06 10:00:00", 2, 0.0, 0.0),
            row("5", "b", "2020-04-06 11:00:00", 3, 0.0, 0.0),
            row("6", "c", "2020-04-06 11:00:00", 3, 0.0, 0.0),
        ]);
        let stats = WindowStats::from_subset(&s);
        assert_eq!(stats.no_of_tweets, 6);
        assert_eq!(stats.number_unique_users, 3);
        assert_eq!(stats.median_tweets_per_user, 2.0);
        assert_eq!(stats.mean_tweets_per_user, 2.0);
        assert_eq!(stats.n_user_more_than_one_tweet, 2);
        // a moved within zone 1, b only changed zone
        assert_eq!(stats.n_users_with_more_than_one_location_point, 1);
        assert_eq!(stats.n_users_with_more_than_one_cod, 1);

        let row = stats.to_row("20200408", "20200406", "20200411");
        assert_eq!(row.key, "20200408");
        assert_eq!(
            row.get("start_date").map(|v| v.to_cell()),
            Some("20200406".to_string())
        );
    }
}
