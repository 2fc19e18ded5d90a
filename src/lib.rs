pub mod analyzers;
pub mod config;
pub mod error;
pub mod fetch;
pub mod filters;
pub mod geometry;
pub mod infra;
pub mod output;
pub mod parser;
pub mod places;
pub mod query;
pub mod records;
pub mod services;
pub mod subsets;
pub mod windows;

pub use error::{Error, Result};
