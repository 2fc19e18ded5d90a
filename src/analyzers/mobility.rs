//! Per-window mobility statistics aggregated across users.

use std::collections::{BTreeMap, HashSet};

use crate::analyzers::aggregate::{Aggregator, Stage, WindowContext};
use crate::analyzers::od::MatrixStore;
use crate::analyzers::trajectory::Trajectory;
use crate::analyzers::types::{KeyColumn, MetricsRow};
use crate::analyzers::utility::{mean, mean_or_zero, safe_div, sample_std};
use crate::error::Result;
use crate::subsets::Subset;

fn present(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).collect()
}

/// Mean over zones of `log2` of the number of distinct users seen there.
pub fn random_location_entropy(subset: &Subset) -> f64 {
    let mut users: BTreeMap<u32, HashSet<&str>> = BTreeMap::new();
    for r in &subset.rows {
        users.entry(r.cod).or_default().insert(r.user_id.as_str());
    }
    let entropies: Vec<f64> = users.values().map(|u| (u.len() as f64).log2()).collect();
    mean(&entropies)
}

/// Mobility statistics of one window, or `None` when it has no rows.
pub fn mobility_metrics(key: &str, subset: &Subset) -> Option<MetricsRow> {
    if subset.is_empty() {
        return None;
    }

    let trajectories: Vec<Trajectory> = subset
        .rows_by_user()
        .iter()
        .map(|(_, rows)| Trajectory::new(rows))
        .collect();
    let users = trajectories.len() as f64;
    let trips = (subset.len() - trajectories.len()) as f64;

    let mut rog = Vec::new();
    let mut jump_means = Vec::new();
    let mut all_jumps = Vec::new();
    let mut waiting_means = Vec::new();
    let mut total_waiting = 0.0;
    let mut max_distance = Vec::new();
    let mut locations = Vec::new();
    let mut from_home = Vec::new();

    for t in &trajectories {
        rog.push(t.radius_of_gyration());

        let jumps = t.jump_lengths();
        jump_means.push(mean_or_zero(&jumps));
        all_jumps.extend(jumps);

        let waits = t.waiting_times();
        waiting_means.push(mean_or_zero(&waits));
        total_waiting += waits.iter().sum::<f64>();

        max_distance.push(t.maximum_distance());
        locations.push(t.number_of_locations() as f64);
        from_home.push(t.max_distance_from_home());
    }
    let moving: Vec<f64> = jump_means.iter().copied().filter(|m| *m > 0.0).collect();
    let rog = present(&rog);
    let from_home = present(&from_home);

    let mut row = MetricsRow::new(key);
    row.number("poi_number_of_total_trips", trips);
    row.number("mean_rog", mean(&rog));
    row.number("std_rog", sample_std(&rog));
    row.number("jl_simple_means_over_user_means", mean(&jump_means));
    row.number("jl_std_over_user_means", sample_std(&jump_means));
    row.number("jl_simple_means_only_with_movement_user_means", mean(&moving));
    row.number("jl_std_only_with_movement_user_means", sample_std(&moving));
    row.number(
        "mean_total_distance",
        safe_div(all_jumps.iter().sum::<f64>(), trips),
    );
    row.number("std_total_distance", sample_std(&all_jumps));
    row.number("avg_avg_time_between_tweets_per_user", mean(&waiting_means));
    row.number("avg_time_between_tweets_total", safe_div(total_waiting, trips));
    row.number("avg_number_of_trips_per_user", safe_div(trips, users));
    row.number("mean_max_distance", mean(&max_distance));
    row.number("std_max_distance", sample_std(&max_distance));
    row.number("mean_number_of_locations", mean(&locations));
    row.number("std_number_of_locations", sample_std(&locations));
    row.number("mean_max_dist_from_home", mean(&from_home));
    row.number("std_max_dist_from_home", sample_std(&from_home));
    row.number(
        "mean_random_location_entropy_barrios",
        random_location_entropy(subset),
    );
    Some(row)
}

/// Skips windows without rows.
pub struct MobilityStage;

impl Aggregator for MobilityStage {
    fn stage(&self) -> Stage {
        Stage::Mobility
    }

    fn key_column(&self) -> KeyColumn {
        KeyColumn::StartDate
    }

    fn compute(
        &mut self,
        window: &WindowContext<'_>,
        _matrices: &mut MatrixStore,
    ) -> Result<Option<MetricsRow>> {
        Ok(mobility_metrics(&window.start_key, window.subset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsets::fixtures::{row, subset};

    #[test]
    fn test_empty_window_skipped() {
        assert!(mobility_metrics("20200406", &subset(Vec::new())).is_none());
    }

    #[test]
    fn test_trips_and_movement_only_means() {
        let s = subset(vec![
            row("1", "mover", "2020-04-06 08:00:00", 1, 0.0, 0.0),
            row("2", "mover", "2020-04-06 09:00:00", 2, 0.0, 1.0),
            row("3", "mover", "2020-04-06 10:00:00", 1, 0.0, 0.0),
            row("4", "still", "2020-04-06 08:00:00", 3, 1.0, 1.0),
            row("5", "still", "2020-04-06 12:00:00", 3, 1.0, 1.0),
        ]);
        let r = mobility_metrics("20200406", &s).unwrap();
        let deg = crate::geometry::haversine_km(
            geo::Point::new(0.0, 0.0),
            geo::Point::new(0.0, 1.0),
        );

        assert_eq!(r.get_f64("poi_number_of_total_trips"), Some(3.0));
        assert_eq!(r.get_f64("avg_number_of_trips_per_user"), Some(1.5));

        let over_all = r.get_f64("jl_simple_means_over_user_means").unwrap();
        assert!((over_all - deg / 2.0).abs() < 1e-9);
        let moving = r.get_f64("jl_simple_means_only_with_movement_user_means").unwrap();
        assert!((moving - deg).abs() < 1e-9);
        assert!(r.get_f64("jl_std_only_with_movement_user_means").unwrap().is_nan());

        let total = r.get_f64("mean_total_distance").unwrap();
        assert!((total - 2.0 * deg / 3.0).abs() < 1e-9);

        // waits: mover 3600, 3600; still 14400
        assert_eq!(r.get_f64("avg_time_between_tweets_total"), Some(21600.0 / 3.0));
        assert_eq!(r.get_f64("avg_avg_time_between_tweets_per_user"), Some((3600.0 + 14400.0) / 2.0));
        assert_eq!(r.get_f64("mean_number_of_locations"), Some(1.5));
    }

    #[test]
    fn test_single_tweet_users_have_no_trips() {
        let s = subset(vec![
            row("1", "a", "2020-04-06 08:00:00", 1, 0.0, 0.0),
            row("2", "b", "2020-04-06 08:00:00", 1, 0.0, 0.0),
        ]);
        let r = mobility_metrics("20200406", &s).unwrap();
        assert_eq!(r.get_f64("poi_number_of_total_trips"), Some(0.0));
        assert!(r.get_f64("mean_total_distance").unwrap().is_nan());
        assert!(r.get_f64("avg_time_between_tweets_total").unwrap().is_nan());
        assert_eq!(r.get_f64("jl_simple_means_over_user_means"), Some(0.0));
        assert!(r.get_f64("jl_simple_means_only_with_movement_user_means").unwrap().is_nan());
    }

    #[test]
    fn test_random_location_entropy() {
        let s = subset(vec![
            row("1", "a", "2020-04-06 08:00:00", 1, 0.0, 0.0),
            row("2", "b", "2020-04-06 08:00:00", 1, 0.0, 0.0),
            row("3", "c", "2020-04-06 08:00:00", 1, 0.0, 0.0),
            row("4", "d", "2020-04-06 08:00:00", 1, 0.0, 0.0),
            row("5", "a", "2020-04-06 09:00:00", 2, 0.0, 0.0),
            row("6", "a", "2020-04-06 10:00:00", 2, 0.0, 0.0),
        ]);
        // zone 1: log2(4) = 2, zone 2: log2(1) = 0
        assert_eq!(random_location_entropy(&s), 1.0);
    }
}
