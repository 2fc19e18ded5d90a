use geo::Point;

use crate::analyzers::aggregate::{Aggregator, Stage, WindowContext};
use crate::analyzers::od::MatrixStore;
use crate::analyzers::types::{KeyColumn, MetricsRow};
use crate::analyzers::utility::safe_div;
use crate::error::Result;
use crate::geometry::LandUse;
use crate::subsets::Subset;

/// Share of the window's rows falling in each land-use class. Every share
/// is NaN for an empty window.
pub fn land_use_metrics(key: &str, subset: &Subset, land_use: &LandUse) -> MetricsRow {
    let points: Vec<Point<f64>> = subset.rows.iter().map(|r| r.point).collect();
    let total = points.len() as f64;

    let mut row = MetricsRow::new(key);
    for (class, count) in land_use.count_points(&points) {
        row.number(format!("rel_tweets_in_{class}"), safe_div(count as f64, total));
    }
    row
}

pub struct LandUseStage<'a> {
    pub land_use: &'a LandUse,
}

impl Aggregator for LandUseStage<'_> {
    fn stage(&self) -> Stage {
        Stage::LandUse
    }

    fn key_column(&self) -> KeyColumn {
        KeyColumn::StartDate
    }

    fn compute(
        &mut self,
        window: &WindowContext<'_>,
        _matrices: &mut MatrixStore,
    ) -> Result<Option<MetricsRow>> {
        Ok(Some(land_use_metrics(
            &window.start_key,
            window.subset,
            self.land_use,
        )))
    }
}
