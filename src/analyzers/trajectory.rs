//! Individual mobility measures over one user's time-ordered points.
//!
//! Distances are great-circle kilometres, waiting times seconds.

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use geo::Point;

use crate::geometry::haversine_km;
use crate::subsets::Observation;

/// Night hours used to find home: from 22:00 until 07:00.
const NIGHT_START_HOUR: u32 = 22;
const NIGHT_END_HOUR: u32 = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    points: Vec<(NaiveDateTime, Point<f64>)>,
}

fn same_location(a: Point<f64>, b: Point<f64>) -> bool {
    a.x() == b.x() && a.y() == b.y()
}

fn is_night(time: NaiveTime) -> bool {
    time.hour() >= NIGHT_START_HOUR || time.hour() < NIGHT_END_HOUR
}

impl Trajectory {
    /// Orders `rows` by timestamp; equal timestamps keep their order.
    pub fn new(rows: &[&Observation]) -> Self {
        let mut points: Vec<_> = rows.iter().map(|r| (r.timestamp, r.point)).collect();
        points.sort_by_key(|(ts, _)| *ts);
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Root mean square distance to the centre of mass.
    pub fn radius_of_gyration(&self) -> f64 {
        if self.points.is_empty() {
            return f64::NAN;
        }
        let n = self.points.len() as f64;
        let (sx, sy) = self
            .points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), (_, p)| (sx + p.x(), sy + p.y()));
        let centre = Point::new(sx / n, sy / n);
        let sq = self
            .points
            .iter()
            .map(|(_, p)| haversine_km(*p, centre).powi(2))
            .sum::<f64>();
        (sq / n).sqrt()
    }

    /// Distance between each pair of consecutive points.
    pub fn jump_lengths(&self) -> Vec<f64> {
        self.points
            .windows(2)
            .map(|pair| haversine_km(pair[0].1, pair[1].1))
            .collect()
    }

    /// Seconds between each pair of consecutive points.
    pub fn waiting_times(&self) -> Vec<f64> {
        self.points
            .windows(2)
            .map(|pair| (pair[1].0 - pair[0].0).num_seconds() as f64)
            .collect()
    }

    /// Longest single jump; zero for fewer than two points.
    pub fn maximum_distance(&self) -> f64 {
        self.jump_lengths().into_iter().fold(0.0, f64::max)
    }

    pub fn number_of_locations(&self) -> usize {
        let mut seen: Vec<Point<f64>> = Vec::new();
        for (_, p) in &self.points {
            if !seen.iter().any(|s| same_location(*s, *p)) {
                seen.push(*p);
            }
        }
        seen.len()
    }

    /// Most visited location at night, or overall when the user was never
    /// seen at night. Ties go to the location seen first.
    pub fn home(&self) -> Option<Point<f64>> {
        let night: Vec<Point<f64>> = self
            .points
            .iter()
            .filter(|(ts, _)| is_night(ts.time()))
            .map(|(_, p)| *p)
            .collect();
        let candidates = if night.is_empty() {
            self.points.iter().map(|(_, p)| *p).collect()
        } else {
            night
        };

        let mut counts: Vec<(Point<f64>, usize)> = Vec::new();
        for p in candidates {
            match counts.iter_mut().find(|(s, _)| same_location(*s, p)) {
                Some((_, n)) => *n += 1,
                None => counts.push((p, 1)),
            }
        }
        let best = counts.iter().map(|(_, n)| *n).max()?;
        counts.into_iter().find(|(_, n)| *n == best).map(|(p, _)| p)
    }

    pub fn max_distance_from_home(&self) -> f64 {
        match self.home() {
            Some(home) => self
                .points
                .iter()
                .map(|(_, p)| haversine_km(home, *p))
                .fold(0.0, f64::max),
            None => f64::NAN,
        }
    }
}
