//! Per-window mobility metrics.
//!
//! Each stage turns the subsets of a window plan into rows of the run's
//! metrics table. Stages run one after another over all windows; the OD
//! matrix stage writes the matrices the flow stage reads back.

pub mod aggregate;
pub mod basic;
pub mod flows;
pub mod landuse;
pub mod mobility;
pub mod network;
pub mod od;
pub mod table;
pub mod trajectory;
pub mod types;
pub mod utility;
