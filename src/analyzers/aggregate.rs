use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::analyzers::basic::BasicStage;
use crate::analyzers::flows::FlowStage;
use crate::analyzers::landuse::LandUseStage;
use crate::analyzers::mobility::MobilityStage;
use crate::analyzers::od::{MatrixKey, MatrixStore, OdMatrixStage};
use crate::analyzers::table::{MetricsTable, table_path};
use crate::analyzers::types::{KeyColumn, MetricsRow};
use crate::config::RunConfig;
use crate::error::Result;
use crate::geometry::{LandUse, Zones};
use crate::subsets::{Dataset, Subset, load_windows};
use crate::windows::{WindowPlan, format_key};

/// The metric stages in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Basic,
    OdMatrix,
    Mobility,
    Flows,
    LandUse,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Basic,
        Stage::OdMatrix,
        Stage::Mobility,
        Stage::Flows,
        Stage::LandUse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Basic => "basic",
            Stage::OdMatrix => "od_matrix",
            Stage::Mobility => "mobility",
            Stage::Flows => "flows",
            Stage::LandUse => "land_use",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an interrupted run picks up again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePoint {
    pub stage: Stage,
    /// Index of the first window to compute in `stage`.
    pub index: usize,
}

/// One window as seen by a stage.
#[derive(Debug)]
pub struct WindowContext<'a> {
    pub index: usize,
    pub subset: &'a Subset,
    pub middle: NaiveDate,
    pub start_key: String,
    pub end_key: String,
    pub middle_key: String,
    pub matrix_key: MatrixKey,
}

/// A metric stage. Returning `Ok(None)` leaves the table untouched for
/// that window.
pub trait Aggregator {
    fn stage(&self) -> Stage;

    /// Column the stage's rows are matched on.
    fn key_column(&self) -> KeyColumn;

    fn compute(
        &mut self,
        window: &WindowContext<'_>,
        matrices: &mut MatrixStore,
    ) -> Result<Option<MetricsRow>>;
}

/// Drives stages over the windows of one plan, saving the table as it goes.
pub struct Runner<'a> {
    contexts: Vec<WindowContext<'a>>,
    table: MetricsTable,
    matrices: MatrixStore,
    checkpoint_every: usize,
}

impl<'a> Runner<'a> {
    /// Computes every window's middle date up front, so an even window
    /// fails before any stage runs.
    pub fn new(
        plan: &WindowPlan,
        subsets: &'a [Subset],
        config: &RunConfig,
        table: MetricsTable,
    ) -> Result<Self> {
        let mut contexts = Vec::with_capacity(subsets.len());
        for (index, subset) in subsets.iter().enumerate() {
            let window = &subset.window;
            let middle = window.midpoint(config.allow_even)?;
            contexts.push(WindowContext {
                index,
                subset,
                middle,
                start_key: format_key(window.start),
                end_key: format_key(window.end),
                middle_key: format_key(middle),
                matrix_key: MatrixKey {
                    denom: plan.denom.clone(),
                    middle,
                    sample: config.sample_size,
                },
            });
        }
        Ok(Self {
            contexts,
            table,
            matrices: MatrixStore::new(config.data_dir.clone()),
            checkpoint_every: config.checkpoint_every.max(1),
        })
    }

    pub fn table(&self) -> &MetricsTable {
        &self.table
    }

    pub fn into_table(self) -> MetricsTable {
        self.table
    }

    /// Runs `aggregator` over windows `from..`, upserting each row and
    /// saving every `checkpoint_every` windows and once at the end.
    #[instrument(skip(self, aggregator), fields(stage = %aggregator.stage()))]
    pub fn run_stage(&mut self, aggregator: &mut dyn Aggregator, from: usize) -> Result<()> {
        let key_column = aggregator.key_column();
        let total = self.contexts.len();
        for ctx in self.contexts.iter().skip(from) {
            info!(
                start = %ctx.start_key,
                end = %ctx.end_key,
                window = ctx.index + 1,
                total,
                "Computing window"
            );
            if let Some(row) = aggregator.compute(ctx, &mut self.matrices)? {
                self.table.upsert(key_column, &row);
            }
            if (ctx.index + 1) % self.checkpoint_every == 0 {
                info!(window = ctx.index + 1, "Checkpoint");
                self.table.save()?;
            }
        }
        self.table.save()?;
        Ok(())
    }
}

/// Runs the configured stages of `plan`, returning the saved table.
///
/// With a resume point, stages before it are skipped and its stage starts at
/// the given window; matrices of skipped windows are read from disk.
#[instrument(skip_all, fields(denom = %plan.denom))]
pub fn run_plan(
    config: &RunConfig,
    plan: &WindowPlan,
    dataset: &Dataset,
    zones: &Zones,
    land_use: &LandUse,
) -> Result<MetricsTable> {
    let subsets = load_windows(dataset, &plan.windows, &config.subset_options());
    let table = MetricsTable::open(table_path(
        &config.data_dir,
        &plan.denom,
        config.sample_size,
    ))?;
    let mut runner = Runner::new(plan, &subsets, config, table)?;

    for stage in Stage::ALL {
        if !config.stages.contains(&stage) {
            continue;
        }
        let from = match config.resume {
            Some(resume) if stage < resume.stage => {
                info!(%stage, "Skipping stage before resume point");
                continue;
            }
            Some(resume) if stage == resume.stage => resume.index,
            _ => 0,
        };

        let mut aggregator: Box<dyn Aggregator + '_> = match stage {
            Stage::Basic => Box::new(BasicStage),
            Stage::OdMatrix => Box::new(OdMatrixStage {
                zone_count: config.zone_count,
                diag_to_zero: config.diag_to_zero,
            }),
            Stage::Mobility => Box::new(MobilityStage),
            Stage::Flows => Box::new(FlowStage { zones }),
            Stage::LandUse => Box::new(LandUseStage { land_use }),
        };
        runner.run_stage(aggregator.as_mut(), from)?;
    }

    let table = runner.into_table();
    info!(path = %table.path().display(), rows = table.len(), "Metrics table complete");
    Ok(table)
}
