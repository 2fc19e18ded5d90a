//! Origin-destination movement matrices.
//!
//! Cell `(i, j)` counts how often a user's consecutive observations moved
//! from zone `i + 1` to zone `j + 1`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use ndarray::Array2;
use ndarray_npy::{read_npy, write_npy};
use tracing::{debug, warn};

use crate::analyzers::aggregate::{Aggregator, Stage, WindowContext};
use crate::analyzers::types::{KeyColumn, MetricsRow};
use crate::error::Result;
use crate::subsets::Subset;
use crate::windows::format_key;

pub type MovementMatrix = Array2<f64>;

/// Builds the `zone_count × zone_count` matrix of `subset`.
///
/// Each user's rows are ordered by timestamp (ties keep dataset order) and
/// walked pairwise. A pair touching a code outside `1..=zone_count` is not
/// counted.
pub fn build_matrix(subset: &Subset, zone_count: usize, diag_to_zero: bool) -> MovementMatrix {
    let mut matrix = Array2::<f64>::zeros((zone_count, zone_count));
    let index = |cod: u32| -> Option<usize> {
        let i = (cod as usize).checked_sub(1)?;
        (i < zone_count).then_some(i)
    };

    let mut skipped = 0usize;
    for (_, mut rows) in subset.rows_by_user() {
        rows.sort_by_key(|r| r.timestamp);
        for pair in rows.windows(2) {
            match (index(pair[0].cod), index(pair[1].cod)) {
                (Some(from), Some(to)) => matrix[[from, to]] += 1.0,
                _ => skipped += 1,
            }
        }
    }
    if skipped > 0 {
        warn!(skipped, zone_count, "Movements with unknown zone codes were not counted");
    }

    if diag_to_zero {
        matrix.diag_mut().fill(0.0);
    }
    matrix
}

/// Identifies one window's matrix on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatrixKey {
    pub denom: String,
    pub middle: NaiveDate,
    pub sample: Option<usize>,
}

impl MatrixKey {
    /// `{data_dir}/movement_matrices/{denom}/mm_{middle}[_{sample}].npy`
    pub fn path(&self, data_dir: &Path) -> PathBuf {
        let middle = format_key(self.middle);
        let file = match self.sample {
            Some(sam) => format!("mm_{middle}_{sam}.npy"),
            None => format!("mm_{middle}.npy"),
        };
        data_dir.join("movement_matrices").join(&self.denom).join(file)
    }
}

/// Matrices written during the run are served from memory; anything else
/// is read back from its `.npy` file.
#[derive(Debug, Clone)]
pub struct MatrixStore {
    data_dir: PathBuf,
    cache: HashMap<MatrixKey, MovementMatrix>,
}

impl MatrixStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            cache: HashMap::new(),
        }
    }

    pub fn save(&mut self, key: MatrixKey, matrix: MovementMatrix) -> Result<()> {
        let path = key.path(&self.data_dir);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_npy(&path, &matrix)?;
        debug!(path = %path.display(), "Movement matrix written");
        self.cache.insert(key, matrix);
        Ok(())
    }

    pub fn load(&mut self, key: &MatrixKey) -> Result<MovementMatrix> {
        if let Some(matrix) = self.cache.get(key) {
            return Ok(matrix.clone());
        }
        let path = key.path(&self.data_dir);
        let matrix: MovementMatrix = read_npy(&path)?;
        debug!(path = %path.display(), "Movement matrix read");
        Ok(matrix)
    }
}

/// Writes each window's movement matrix; adds no table columns.
pub struct OdMatrixStage {
    pub zone_count: usize,
    pub diag_to_zero: bool,
}

impl Aggregator for OdMatrixStage {
    fn stage(&self) -> Stage {
        Stage::OdMatrix
    }

    fn key_column(&self) -> KeyColumn {
        KeyColumn::MiddleDate
    }

    fn compute(
        &mut self,
        window: &WindowContext<'_>,
        matrices: &mut MatrixStore,
    ) -> Result<Option<MetricsRow>> {
        let matrix = build_matrix(window.subset, self.zone_count, self.diag_to_zero);
        matrices.save(window.matrix_key.clone(), matrix)?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsets::fixtures::{row, subset};

    #[test]
    fn test_round_trip_counts_both_directions() {
        // A -> B -> A
        let s = subset(vec![
            row("1", "u", "2020-04-06 08:00:00", 1, 0.0, 0.0),
            row("2", "u", "2020-04-06 09:00:00", 2, 0.0, 0.0),
            row("3", "u", "2020-04-06 10:00:00", 1, 0.0, 0.0),
        ]);
        let m = build_matrix(&s, 3, true);
        assert_eq!(m[[0, 1]], 1.0);
        assert_eq!(m[[1, 0]], 1.0);
        assert_eq!(m.sum(), 2.0);
    }

    #[test]
    fn test_stays_only_on_diagonal() {
        let s = subset(vec![
            row("1", "u", "2020-04-06 08:00:00", 2, 0.0, 0.0),
            row("2", "u", "2020-04-06 09:00:00", 2, 0.0, 0.0),
        ]);
        assert_eq!(build_matrix(&s, 3, false)[[1, 1]], 1.0);
        assert_eq!(build_matrix(&s, 3, true).sum(), 0.0);
    }

    #[test]
    fn test_sequence_follows_time_not_file_order() {
        let s = subset(vec![
            row("1", "u", "2020-04-06 10:00:00", 3, 0.0, 0.0),
            row("2", "v", "2020-04-06 08:00:00", 1, 0.0, 0.0),
            row("3", "u", "2020-04-06 08:00:00", 1, 0.0, 0.0),
        ]);
        let m = build_matrix(&s, 3, true);
        assert_eq!(m[[0, 2]], 1.0);
        assert_eq!(m[[2, 0]], 0.0);
    }

    #[test]
    fn test_unknown_codes_are_skipped() {
        let s = subset(vec![
            row("1", "u", "2020-04-06 08:00:00", 1, 0.0, 0.0),
            row("2", "u", "2020-04-06 09:00:00", 9, 0.0, 0.0),
            row("3", "u", "2020-04-06 10:00:00", 0, 0.0, 0.0),
            row("4", "u", "2020-04-06 11:00:00", 2, 0.0, 0.0),
        ]);
        assert_eq!(build_matrix(&s, 3, true).sum(), 0.0);
    }

    #[test]
    fn test_matrix_key_path() {
        let key = MatrixKey {
            denom: "5days_overlap".to_string(),
            middle: NaiveDate::from_ymd_opt(2020, 4, 8).unwrap(),
            sample: None,
        };
        assert_eq!(
            key.path(Path::new("data")),
            Path::new("data/movement_matrices/5days_overlap/mm_20200408.npy")
        );
        let sampled = MatrixKey {
            sample: Some(1115),
            ..key
        };
        assert!(sampled.path(Path::new("data")).ends_with("mm_20200408_1115.npy"));
    }

    #[test]
    fn test_store_reads_back_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let key = MatrixKey {
            denom: "1days".to_string(),
            middle: NaiveDate::from_ymd_opt(2020, 4, 6).unwrap(),
            sample: None,
        };
        let mut matrix = Array2::<f64>::zeros((3, 3));
        matrix[[0, 2]] = 4.0;

        MatrixStore::new(dir.path()).save(key.clone(), matrix.clone()).unwrap();
        assert!(key.path(dir.path()).exists());

        let mut fresh = MatrixStore::new(dir.path());
        assert_eq!(fresh.load(&key).unwrap(), matrix);
    }
}
