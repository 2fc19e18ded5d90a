//! Record filter pipeline.
//!
//! Every filter is a pure function from a record slice to a [`Partition`];
//! [`RecordPipeline`] chains them, keeps the pre-filter collection around for
//! ratios that need the original denominator, and captures removed bot
//! records for auditing.

pub mod analysis;
pub mod bots;
pub mod geo;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::records::{Record, RecordRow, to_rows};

pub use bots::{
    AccountFilterOutcome, BotRules, detect_bot_by_account_ratio, detect_bot_by_content,
    eliminate_duplicate_texts, split_bot_content,
};

/// Records kept and removed by one filter pass, both in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub kept: Vec<Record>,
    pub removed: Vec<Record>,
}

impl Partition {
    pub fn split(records: &[Record], mut keep: impl FnMut(&Record) -> bool) -> Self {
        let mut partition = Partition::default();
        for record in records {
            if keep(record) {
                partition.kept.push(record.clone());
            } else {
                partition.removed.push(record.clone());
            }
        }
        partition
    }
}

/// Drops records whose only reference is a retweet.
pub fn filter_retweets(records: &[Record]) -> Partition {
    Partition::split(records, |r| !r.is_retweet())
}

/// One pass of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "stage")]
pub enum FilterStage {
    BotContent,
    BotAccounts { threshold: f64 },
    Duplicates,
    Retweets,
    Geo,
    Coordinates,
    NoPlaceType,
    Cities,
    CitiesAndBigger,
    OnlyPois,
    OnlyNeighborhoods,
}

impl FilterStage {
    pub fn name(&self) -> &'static str {
        match self {
            FilterStage::BotContent => "bot_content",
            FilterStage::BotAccounts { .. } => "bot_accounts",
            FilterStage::Duplicates => "duplicates",
            FilterStage::Retweets => "retweets",
            FilterStage::Geo => "geo",
            FilterStage::Coordinates => "coordinates",
            FilterStage::NoPlaceType => "no_place_type",
            FilterStage::Cities => "cities",
            FilterStage::CitiesAndBigger => "cities_and_bigger",
            FilterStage::OnlyPois => "only_pois",
            FilterStage::OnlyNeighborhoods => "only_neighborhoods",
        }
    }

    fn is_bot_stage(&self) -> bool {
        matches!(
            self,
            FilterStage::BotContent | FilterStage::BotAccounts { .. }
        )
    }
}

/// Which filters [`RecordPipeline::use_filters`] runs, in their fixed order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterOptions {
    pub retweets: bool,
    pub geo: bool,
    pub coordinates: bool,
    pub cities_or_bigger: bool,
    pub cities: bool,
    pub place_type: bool,
    pub pois: bool,
    pub neighborhoods: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            retweets: true,
            geo: true,
            coordinates: true,
            cities_or_bigger: true,
            cities: true,
            place_type: true,
            pois: false,
            neighborhoods: false,
        }
    }
}

impl FilterOptions {
    pub fn stages(&self) -> Vec<FilterStage> {
        let mut stages = Vec::new();
        if self.retweets {
            stages.push(FilterStage::Retweets);
        }
        if self.geo {
            stages.push(FilterStage::Geo);
        }
        if self.coordinates {
            stages.push(FilterStage::Coordinates);
        }
        if self.cities_or_bigger {
            stages.push(FilterStage::CitiesAndBigger);
        }
        if self.cities && !self.cities_or_bigger {
            stages.push(FilterStage::Cities);
        }
        if self.place_type {
            stages.push(FilterStage::NoPlaceType);
        }
        if self.pois {
            stages.push(FilterStage::OnlyPois);
        }
        if self.neighborhoods {
            stages.push(FilterStage::OnlyNeighborhoods);
        }
        stages
    }
}

/// Stateful driver over the pure filters.
#[derive(Debug, Clone)]
pub struct RecordPipeline {
    original: Vec<Record>,
    records: Vec<Record>,
    rows: Vec<RecordRow>,
    bots: Vec<Record>,
    bot_accounts: BTreeMap<String, f64>,
    rules: BotRules,
}

impl RecordPipeline {
    pub fn new(records: Vec<Record>) -> Self {
        Self::with_rules(records, BotRules::default())
    }

    pub fn with_rules(records: Vec<Record>, rules: BotRules) -> Self {
        let rows = to_rows(&records);
        Self {
            original: records.clone(),
            records,
            rows,
            bots: Vec::new(),
            bot_accounts: BTreeMap::new(),
            rules,
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn original(&self) -> &[Record] {
        &self.original
    }

    /// Tabular projection of the current records.
    pub fn rows(&self) -> &[RecordRow] {
        &self.rows
    }

    /// Records removed by the bot stages, in removal order.
    pub fn bots(&self) -> &[Record] {
        &self.bots
    }

    /// Blacklisted author id → share of the pre-filter total.
    pub fn bot_accounts(&self) -> &BTreeMap<String, f64> {
        &self.bot_accounts
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Restores the pre-filter collection and clears captured bots.
    pub fn reset(&mut self) {
        self.records = self.original.clone();
        self.bots.clear();
        self.bot_accounts.clear();
        self.rows = to_rows(&self.records);
        info!(records = self.records.len(), "Pipeline reset");
    }

    /// Runs one stage over the current records and returns the removed ones.
    #[instrument(skip(self), fields(stage = stage.name()))]
    pub fn apply(&mut self, stage: FilterStage) -> Vec<Record> {
        let before = self.records.len();
        let partition = match stage {
            FilterStage::BotContent => split_bot_content(&self.records, &self.rules),
            FilterStage::BotAccounts { threshold } => {
                let outcome =
                    detect_bot_by_account_ratio(&self.records, self.original.len(), threshold);
                self.bot_accounts.extend(outcome.blacklist);
                outcome.partition
            }
            FilterStage::Duplicates => eliminate_duplicate_texts(&self.records),
            FilterStage::Retweets => filter_retweets(&self.records),
            FilterStage::Geo => geo::filter_geo(&self.records),
            FilterStage::Coordinates => geo::filter_coordinates(&self.records),
            FilterStage::NoPlaceType => geo::filter_no_place_type(&self.records),
            FilterStage::Cities => geo::filter_cities(&self.records),
            FilterStage::CitiesAndBigger => geo::filter_cities_and_bigger(&self.records),
            FilterStage::OnlyPois => geo::only_pois(&self.records),
            FilterStage::OnlyNeighborhoods => geo::only_neighborhoods(&self.records),
        };

        let Partition { kept, removed } = partition;
        if stage.is_bot_stage() {
            self.bots.extend(removed.iter().cloned());
        }
        self.records = kept;
        self.rows = to_rows(&self.records);

        let kept_pct = if before == 0 {
            0.0
        } else {
            self.records.len() as f64 / before as f64 * 100.0
        };
        info!(
            before,
            removed = removed.len(),
            kept_pct,
            "Filter pass finished"
        );
        removed
    }

    /// Content bots, over-active accounts (share above 0.5 %), duplicates.
    pub fn use_all_bot_filters(&mut self) -> &[Record] {
        self.apply(FilterStage::BotContent);
        self.apply(FilterStage::BotAccounts { threshold: 0.005 });
        self.apply(FilterStage::Duplicates);
        &self.records
    }

    pub fn use_filters(&mut self, options: FilterOptions) -> &[Record] {
        for stage in options.stages() {
            self.apply(stage);
        }
        &self.records
    }
}
