//! Run configuration for the metric pipeline.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analyzers::aggregate::{ResumePoint, Stage};
use crate::error::{Error, Result};
use crate::subsets::SubsetOptions;
use crate::windows::{WindowPlan, load_manual_windows, make_windows, preset};

/// Windows given explicitly instead of generated from a size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowSource {
    /// A built-in set, `on_offset` or `total`.
    Preset(String),
    /// A `start,end,label` CSV file.
    Table(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Preprocessed dataset CSV.
    pub dataset: PathBuf,
    /// Root for metrics tables and movement matrices.
    pub data_dir: PathBuf,
    /// Zones CSV (`cod,wkt`).
    pub zones: PathBuf,
    /// Land-use CSV (`lu_transl,wkt`).
    pub land_use: PathBuf,

    pub window_sizes: Vec<u32>,
    pub study_start: NaiveDate,
    pub study_end: NaiveDate,
    pub overlap: bool,
    /// Replaces `window_sizes` when set.
    pub windows: Option<WindowSource>,
    pub allow_even: bool,

    pub drop_single_occurrence_users: bool,
    pub sample_size: Option<usize>,
    pub seed: Option<u64>,

    pub checkpoint_every: usize,
    pub diag_to_zero: bool,
    pub zone_count: usize,
    pub stages: Vec<Stage>,
    pub resume: Option<ResumePoint>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("data/tweets/preprocessed_tweets_with_poi_location.csv"),
            data_dir: PathBuf::from("data"),
            zones: PathBuf::from("data/zones/neighborhoods.csv"),
            land_use: PathBuf::from("data/zones/land_use.csv"),
            window_sizes: (1..=31).step_by(2).collect(),
            study_start: NaiveDate::from_ymd_opt(2020, 4, 6).unwrap_or_default(),
            study_end: NaiveDate::from_ymd_opt(2020, 7, 1).unwrap_or_default(),
            overlap: true,
            windows: None,
            allow_even: false,
            drop_single_occurrence_users: true,
            sample_size: None,
            seed: None,
            checkpoint_every: 50,
            diag_to_zero: true,
            zone_count: 163,
            stages: Stage::ALL.to_vec(),
            resume: None,
        }
    }
}

impl RunConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: RunConfig = serde_json::from_slice(&fs::read(path)?)?;
        info!(path = %path.display(), "Run configuration loaded");
        Ok(config)
    }

    /// Checks everything that can be checked without touching the inputs.
    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_every == 0 {
            return Err(Error::Config("checkpoint_every must be positive".to_string()));
        }
        if self.zone_count == 0 {
            return Err(Error::Config("zone_count must be positive".to_string()));
        }
        if self.stages.is_empty() {
            return Err(Error::Config("no stages selected".to_string()));
        }
        if self.sample_size == Some(0) {
            return Err(Error::Config("sample_size must be positive".to_string()));
        }
        if let Some(resume) = self.resume {
            if !self.stages.contains(&resume.stage) {
                return Err(Error::Config(format!(
                    "resume stage {} is not among the selected stages",
                    resume.stage
                )));
            }
        }

        match &self.windows {
            Some(WindowSource::Preset(name)) => match preset(name) {
                Some(plan) => plan.check_midpoints(self.allow_even)?,
                None => return Err(Error::Config(format!("unknown window preset {name:?}"))),
            },
            Some(WindowSource::Table(_)) => {}
            None => {
                if self.study_end <= self.study_start {
                    return Err(Error::Config(format!(
                        "study period {} to {} is empty",
                        self.study_start, self.study_end
                    )));
                }
                if self.window_sizes.is_empty() {
                    return Err(Error::Config("no window sizes given".to_string()));
                }
                for size in &self.window_sizes {
                    if *size == 0 {
                        return Err(Error::Config("window size must be at least one day".to_string()));
                    }
                    if size % 2 == 0 && !self.allow_even {
                        return Err(Error::EvenWindow {
                            start: self.study_start,
                            end: self.study_start + TimeDelta::days(i64::from(*size)),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// One plan per window size, or the single manual plan.
    pub fn plans(&self) -> Result<Vec<WindowPlan>> {
        match &self.windows {
            Some(WindowSource::Preset(name)) => preset(name)
                .map(|plan| vec![plan])
                .ok_or_else(|| Error::Config(format!("unknown window preset {name:?}"))),
            Some(WindowSource::Table(path)) => Ok(vec![load_manual_windows(path)?]),
            None => self
                .window_sizes
                .iter()
                .map(|size| make_windows(*size, self.study_start, self.study_end, self.overlap))
                .collect(),
        }
    }

    /// [`plans`](Self::plans), with every window's middle date checked so an
    /// even window fails before the dataset is read.
    pub fn checked_plans(&self) -> Result<Vec<WindowPlan>> {
        let plans = self.plans()?;
        for plan in &plans {
            plan.check_midpoints(self.allow_even)?;
        }
        Ok(plans)
    }

    pub fn subset_options(&self) -> SubsetOptions {
        SubsetOptions {
            drop_single_occurrence_users: self.drop_single_occurrence_users,
            sample_size: self.sample_size,
            seed: self.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RunConfig::default();
        config.validate().unwrap();
        assert_eq!(config.window_sizes.len(), 16);
        assert_eq!(config.checkpoint_every, 50);
        assert_eq!(config.stages.len(), 5);
    }

    #[test]
    fn test_even_size_needs_override() {
        let mut config = RunConfig {
            window_sizes: vec![4],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::EvenWindow { .. })));
        config.allow_even = true;
        config.validate().unwrap();
    }

    #[test]
    fn test_even_preset_needs_override() {
        let mut config = RunConfig {
            windows: Some(WindowSource::Preset("total".to_string())),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::EvenWindow { .. })));
        config.allow_even = true;
        config.validate().unwrap();
        assert_eq!(config.checked_plans().unwrap()[0].len(), 1);
    }

    #[test]
    fn test_even_table_window_rejected_before_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waves.csv");
        std::fs::write(&path, "start,end,label\n20200406,20200409,a\n20200410,20200414,b\n").unwrap();

        let mut config = RunConfig {
            windows: Some(WindowSource::Table(path)),
            dataset: dir.path().join("missing.csv"),
            ..Default::default()
        };
        config.validate().unwrap();
        assert!(matches!(
            config.checked_plans(),
            Err(Error::EvenWindow { start, .. }) if start == NaiveDate::from_ymd_opt(2020, 4, 10).unwrap()
        ));
        config.allow_even = true;
        assert_eq!(config.checked_plans().unwrap()[0].len(), 2);
    }

    #[test]
    fn test_bad_values_rejected() {
        let cases = [
            RunConfig {
                checkpoint_every: 0,
                ..Default::default()
            },
            RunConfig {
                sample_size: Some(0),
                ..Default::default()
            },
            RunConfig {
                windows: Some(WindowSource::Preset("weekly".to_string())),
                ..Default::default()
            },
            RunConfig {
                stages: vec![Stage::Basic],
                resume: Some(ResumePoint {
                    stage: Stage::Flows,
                    index: 3,
                }),
                ..Default::default()
            },
        ];
        for config in cases {
            assert!(matches!(config.validate(), Err(Error::Config(_))), "{config:?}");
        }
    }

    #[test]
    fn test_load_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(
            &path,
            r#"{
                "window_sizes": [7],
                "sample_size": 1115,
                "windows": {"preset": "on_offset"},
                "resume": {"stage": "flows", "index": 10}
            }"#,
        )
        .unwrap();

        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.window_sizes, vec![7]);
        assert_eq!(config.sample_size, Some(1115));
        assert_eq!(config.zone_count, 163);
        assert_eq!(config.resume.unwrap().stage, Stage::Flows);
        let plans = config.plans().unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].denom, "on_offset");
    }

    #[test]
    fn test_plans_per_size() {
        let config = RunConfig {
            window_sizes: vec![1, 3],
            study_end: NaiveDate::from_ymd_opt(2020, 4, 16).unwrap(),
            ..Default::default()
        };
        let plans = config.plans().unwrap();
        assert_eq!(plans[0].denom, "1days_overlap");
        assert_eq!(plans[0].len(), 10);
        assert_eq!(plans[1].len(), 8);
    }
}
