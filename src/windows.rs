//! Rolling time windows over the study period.
//!
//! Dates are written as `YYYYMMDD` everywhere they leave the program: in
//! manual window tables, metrics table keys and matrix file names.

use std::path::Path;

use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

const KEY_FORMAT: &str = "%Y%m%d";

pub fn format_key(date: NaiveDate) -> String {
    date.format(KEY_FORMAT).to_string()
}

pub fn parse_key(key: &str) -> Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(key.trim(), KEY_FORMAT)?)
}

/// A `[start, end)` slice of the study period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub label: String,
}

impl Window {
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn midpoint(&self, allow_even: bool) -> Result<NaiveDate> {
        midpoint(self.start, self.end, allow_even)
    }
}

/// The windows of one run, plus the name that identifies the run's outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPlan {
    pub denom: String,
    pub windows: Vec<Window>,
}

impl WindowPlan {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Fails on the first window whose middle date cannot be taken.
    pub fn check_midpoints(&self, allow_even: bool) -> Result<()> {
        for window in &self.windows {
            window.midpoint(allow_even)?;
        }
        Ok(())
    }
}

/// Window `[start, end)`'s middle date: `start + ⌊span / 2⌋`.
///
/// # Errors
///
/// [`Error::EvenWindow`] when the span is an even number of days and
/// `allow_even` is false. With `allow_even` the later of the two central
/// days is returned.
pub fn midpoint(start: NaiveDate, end: NaiveDate, allow_even: bool) -> Result<NaiveDate> {
    let span = (end - start).num_days();
    if span % 2 == 0 {
        if !allow_even {
            return Err(Error::EvenWindow { start, end });
        }
        debug!(%start, %end, "Even window, rounding the middle date up");
    }
    Ok(start + TimeDelta::days(span.div_euclid(2)))
}

pub fn calendar_denom(size_days: u32, overlap: bool) -> String {
    if overlap {
        format!("{size_days}days_overlap")
    } else {
        format!("{size_days}days")
    }
}

/// Calendar windows of `size_days` over `[study_start, study_end]`.
///
/// With `overlap` a window starts on every day from `study_start` up to
/// `study_end - size_days`; without it windows tile the period and a last
/// partial tile is dropped.
pub fn make_windows(
    size_days: u32,
    study_start: NaiveDate,
    study_end: NaiveDate,
    overlap: bool,
) -> Result<WindowPlan> {
    if size_days == 0 {
        return Err(Error::Config("window size must be at least one day".to_string()));
    }
    if study_end <= study_start {
        return Err(Error::Config(format!(
            "study period {study_start} to {study_end} is empty"
        )));
    }

    let denom = calendar_denom(size_days, overlap);
    let size = TimeDelta::days(i64::from(size_days));
    let stride = if overlap { TimeDelta::days(1) } else { size };

    let mut windows = Vec::new();
    let mut start = study_start;
    while start + size <= study_end {
        windows.push(Window {
            start,
            end: start + size,
            label: denom.clone(),
        });
        start += stride;
    }

    if windows.is_empty() {
        warn!(size_days, %study_start, %study_end, "Window size exceeds the study period");
    }
    info!(denom = %denom, windows = windows.len(), "Windows generated");
    Ok(WindowPlan { denom, windows })
}

#[derive(Debug, Deserialize)]
struct WindowRow {
    start: String,
    end: String,
    label: String,
}

/// Windows listed verbatim under the run name `denom`.
///
/// # Errors
///
/// [`Error::WindowTable`] when a window does not end after it starts or the
/// starts go backwards.
pub fn manual_windows(denom: &str, windows: Vec<Window>) -> Result<WindowPlan> {
    for (i, w) in windows.iter().enumerate() {
        if w.start >= w.end {
            return Err(Error::WindowTable(format!(
                "row {i}: start {} is not before end {}",
                format_key(w.start),
                format_key(w.end)
            )));
        }
    }
    if let Some(i) = windows.windows(2).position(|pair| pair[1].start < pair[0].start) {
        return Err(Error::WindowTable(format!(
            "row {}: start dates must not decrease",
            i + 1
        )));
    }
    Ok(WindowPlan {
        denom: denom.to_string(),
        windows,
    })
}

/// Reads a `start,end,label` CSV with `YYYYMMDD` dates. The file stem
/// becomes the run name.
pub fn load_manual_windows(path: impl AsRef<Path>) -> Result<WindowPlan> {
    let path = path.as_ref();
    let denom = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::WindowTable(format!("no file name in {}", path.display())))?
        .to_string();

    let mut reader = csv::Reader::from_path(path)?;
    let mut windows = Vec::new();
    for row in reader.deserialize() {
        let row: WindowRow = row?;
        windows.push(Window {
            start: parse_key(&row.start)?,
            end: parse_key(&row.end)?,
            label: row.label,
        });
    }
    let plan = manual_windows(&denom, windows)?;
    info!(path = %path.display(), denom = %plan.denom, windows = plan.len(), "Manual windows loaded");
    Ok(plan)
}

/// Built-in manual window sets of the Rio de Janeiro study.
pub fn preset(name: &str) -> Option<WindowPlan> {
    let window = |s: (i32, u32, u32), e: (i32, u32, u32), label: &str| -> Option<Window> {
        Some(Window {
            start: NaiveDate::from_ymd_opt(s.0, s.1, s.2)?,
            end: NaiveDate::from_ymd_opt(e.0, e.1, e.2)?,
            label: label.to_string(),
        })
    };
    let windows = match name {
        "on_offset" => vec![
            window((2020, 4, 6), (2020, 6, 6), "onoffset")?,
            window((2021, 4, 6), (2021, 6, 6), "onoffset")?,
            window((2022, 4, 6), (2022, 6, 6), "onoffset")?,
        ],
        "total" => vec![window((2020, 4, 6), (2022, 7, 31), "total")?],
        _ => return None,
    };
    Some(WindowPlan {
        denom: name.to_string(),
        windows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(key: &str) -> NaiveDate {
        parse_key(key).unwrap()
    }

    #[test]
    fn test_overlap_count_and_span() {
        let (s, e) = (d("20200406"), d("20200701"));
        for size in [1u32, 5, 7, 31] {
            let plan = make_windows(size, s, e, true).unwrap();
            let expected = (e - s).num_days() - i64::from(size) + 1;
            assert_eq!(plan.len() as i64, expected);
            assert!(plan.windows.iter().all(|w| w.span_days() == i64::from(size)));
            assert_eq!(plan.windows[0].start, s);
            assert_eq!(plan.windows.last().unwrap().end, e);
        }
        assert_eq!(make_windows(5, s, e, true).unwrap().denom, "5days_overlap");
    }

    #[test]
    fn test_non_overlap_tiles() {
        let plan = make_windows(7, d("20200406"), d("20200501"), false).unwrap();
        assert_eq!(plan.denom, "7days");
        assert_eq!(plan.len(), 3);
        for pair in plan.windows.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_window_larger_than_period() {
        let plan = make_windows(30, d("20200406"), d("20200410"), true).unwrap();
        assert!(plan.is_empty());
        assert!(make_windows(0, d("20200406"), d("20200410"), true).is_err());
    }

    #[test]
    fn test_midpoint() {
        assert_eq!(midpoint(d("20200406"), d("20200411"), false).unwrap(), d("20200408"));
        assert!(matches!(
            midpoint(d("20200406"), d("20200410"), false),
            Err(Error::EvenWindow { .. })
        ));
        assert_eq!(midpoint(d("20200406"), d("20200410"), true).unwrap(), d("20200408"));
        assert_eq!(midpoint(d("20200406"), d("20200407"), false).unwrap(), d("20200406"));
    }

    #[test]
    fn test_presets() {
        let plan = preset("on_offset").unwrap();
        assert_eq!(plan.denom, "on_offset");
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.windows[1].label, "onoffset");
        assert_eq!(preset("total").unwrap().windows[0].end, d("20220731"));
        assert!(preset("unknown").is_none());
    }

    #[test]
    fn test_load_manual_windows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waves.csv");
        std::fs::write(
            &path,
            "start,end,label\n20200406,20200606,first\n20210406,20210606,second\n",
        )
        .unwrap();

        let plan = load_manual_windows(&path).unwrap();
        assert_eq!(plan.denom, "waves");
        assert_eq!(plan.windows[1].label, "second");

        std::fs::write(
            &path,
            "start,end,label\n20210406,20210606,a\n20200406,20200606,b\n",
        )
        .unwrap();
        assert!(matches!(
            load_manual_windows(&path),
            Err(Error::WindowTable(_))
        ));
    }
}
