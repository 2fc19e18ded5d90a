//! Error type shared by the library modules.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("query is {length} characters long, the maximum is 1024")]
    QueryTooLong { length: usize },

    #[error("results per page must be between 10 and 500, got {requested}")]
    PageSizeOutOfRange { requested: u32 },

    #[error("search radius {radius}{unit} exceeds the maximum of {max}{unit}")]
    RadiusTooLarge { radius: f64, unit: String, max: f64 },

    #[error(
        "window {start} to {end} spans an even number of days and has no middle date; \
         allow even windows or choose an odd window size"
    )]
    EvenWindow { start: NaiveDate, end: NaiveDate },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid window table: {0}")]
    WindowTable(String),

    #[error("search API returned status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("the last search returned no next_token, nothing more to fetch")]
    NoNextToken,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid geometry: {0}")]
    Geometry(String),

    #[error("graph has no links, modularity is undefined")]
    EmptyGraph,

    #[error("failed to read movement matrix: {0}")]
    ReadMatrix(#[from] ndarray_npy::ReadNpyError),

    #[error("failed to write movement matrix: {0}")]
    WriteMatrix(#[from] ndarray_npy::WriteNpyError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Date(#[from] chrono::ParseError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_mentions_values() {
        let err = Error::PageSizeOutOfRange { requested: 501 };
        assert!(err.to_string().contains("501"));

        let err = Error::Http {
            status: 429,
            body: "Too Many Requests".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("429"));
        assert!(msg.contains("Too Many Requests"));
    }

    #[test]
    fn test_even_window_display() {
        let start = NaiveDate::from_ymd_opt(2020, 4, 6).unwrap();
        let end = NaiveDate::from_ymd_opt(2020, 4, 10).unwrap();
        let err = Error::EvenWindow { start, end };
        assert!(err.to_string().contains("2020-04-06"));
    }
}
