use thiserror::Error;

/// A range selection that cannot be turned into query boundaries.
///
/// Raised before any request is issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRangeError {
    #[error("range is missing its `{0}` endpoint")]
    Missing(&'static str),
    #[error("cannot parse `{value}` as the `{end}` endpoint")]
    Unparseable { end: &'static str, value: String },
    #[error("range starts after it ends ({from_ms} > {to_ms})")]
    Reversed { from_ms: i64, to_ms: i64 },
    #[error("local midnight does not exist on {0}")]
    NoMidnight(chrono::NaiveDate),
    #[error("no calendar day follows {0}")]
    OutOfRange(chrono::NaiveDate),
}

/// Any failure surfaced by the data source.
///
/// Kept as owned strings so the error can be cloned into every view that
/// watches a binding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("backend reported `{0}`")]
    Backend(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Range(#[from] InvalidRangeError),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Malformed(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Malformed(err.to_string())
    }
}
