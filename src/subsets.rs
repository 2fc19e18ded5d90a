//! Per-window slices of the preprocessed dataset.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDateTime;
use geo::Point;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::geometry::parse_point_wkt;
use crate::windows::Window;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let text = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&text, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// One row of the preprocessed dataset. Extra columns are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    #[serde(rename = "Tweet_ID")]
    pub tweet_id: String,
    #[serde(rename = "User_ID")]
    pub user_id: String,
    #[serde(rename = "Timestamp", with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub cod: u32,
    pub wkt: String,
}

/// A dataset row with its geometry parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub tweet_id: String,
    pub user_id: String,
    pub timestamp: NaiveDateTime,
    pub cod: u32,
    pub wkt: String,
    pub point: Point<f64>,
}

impl TryFrom<DatasetRow> for Observation {
    type Error = crate::error::Error;

    fn try_from(row: DatasetRow) -> Result<Self> {
        let point = parse_point_wkt(&row.wkt)?;
        Ok(Observation {
            tweet_id: row.tweet_id,
            user_id: row.user_id,
            timestamp: row.timestamp,
            cod: row.cod,
            wkt: row.wkt,
            point,
        })
    }
}

/// The full dataset, read once per run.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub rows: Vec<Observation>,
}

impl Dataset {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)?;
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            let row: DatasetRow = row?;
            rows.push(Observation::try_from(row)?);
        }
        info!(path = %path.display(), rows = rows.len(), "Dataset loaded");
        Ok(Self { rows })
    }

    pub fn from_rows(rows: Vec<DatasetRow>) -> Result<Self> {
        let rows = rows
            .into_iter()
            .map(Observation::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsetOptions {
    /// Drop users with exactly one row inside the window.
    pub drop_single_occurrence_users: bool,
    /// Down-sample each window to this many rows when it has more.
    pub sample_size: Option<usize>,
    /// Seed for sampling; entropy from the OS when absent.
    pub seed: Option<u64>,
}

/// The rows of one window, in dataset order.
#[derive(Debug, Clone)]
pub struct Subset {
    pub window: Window,
    pub rows: Vec<Observation>,
}

impl Subset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows per user, users in first-seen order.
    pub fn rows_by_user(&self) -> Vec<(&str, Vec<&Observation>)> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut users: Vec<(&str, Vec<&Observation>)> = Vec::new();
        for row in &self.rows {
            let slot = *index.entry(row.user_id.as_str()).or_insert_with(|| {
                users.push((row.user_id.as_str(), Vec::new()));
                users.len() - 1
            });
            users[slot].1.push(row);
        }
        users
    }

    pub fn unique_users(&self) -> usize {
        self.rows_by_user().len()
    }
}

fn select_window<'a>(dataset: &'a Dataset, window: &Window) -> Vec<&'a Observation> {
    dataset
        .rows
        .iter()
        .filter(|r| {
            let day = r.timestamp.date();
            day >= window.start && day < window.end
        })
        .collect()
}

fn drop_single_occurrence_users(rows: Vec<&Observation>) -> Vec<&Observation> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for r in &rows {
        *counts.entry(r.user_id.as_str()).or_default() += 1;
    }
    rows.into_iter()
        .filter(|r| counts.get(r.user_id.as_str()).is_some_and(|n| *n > 1))
        .collect()
}

fn sample_rows<'a>(rows: Vec<&'a Observation>, size: usize, rng: &mut StdRng) -> Vec<&'a Observation> {
    if size >= rows.len() {
        return rows;
    }
    let mut picked = rand::seq::index::sample(rng, rows.len(), size).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| rows[i]).collect()
}

/// Slices `dataset` into one [`Subset`] per window, comparing calendar days
/// against `[start, end)`.
pub fn load_windows(dataset: &Dataset, windows: &[Window], options: &SubsetOptions) -> Vec<Subset> {
    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    windows
        .iter()
        .map(|window| {
            let mut rows = select_window(dataset, window);
            let in_window = rows.len();
            if options.drop_single_occurrence_users {
                rows = drop_single_occurrence_users(rows);
            }
            if let Some(size) = options.sample_size {
                rows = sample_rows(rows, size, &mut rng);
            }
            debug!(
                start = %window.start,
                end = %window.end,
                in_window,
                kept = rows.len(),
                "Subset loaded"
            );
            Subset {
                window: window.clone(),
                rows: rows.into_iter().cloned().collect(),
            }
        })
        .collect()
}
