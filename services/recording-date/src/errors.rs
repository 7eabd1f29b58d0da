//!
//! src/errors.rs  Andrew Belles  Oct 19th, 2026
//!
//! Defines enums and methods of error conversion
//! for errors the resolver and its collaborators use
//!
//!

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordingDateError {
    #[error("config error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("db error: {0}")]
    Db(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error)
}

impl RecordingDateError {
    /// Network and rate-limit failures; a later attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, RecordingDateError::Http(_) | RecordingDateError::RateLimited(_))
    }
}

impl From<reqwest::Error> for RecordingDateError {
    fn from(e: reqwest::Error) -> Self { RecordingDateError::Http(e.to_string()) }
}

impl From<serde_json::Error> for RecordingDateError {
    fn from(e: serde_json::Error) -> Self { RecordingDateError::Parse(e.to_string()) }
}

impl From<sqlx::Error> for RecordingDateError {
    fn from(e: sqlx::Error) -> Self { RecordingDateError::Db(e.to_string()) }
}

impl From<url::ParseError> for RecordingDateError {
    fn from(e: url::ParseError) -> Self { RecordingDateError::Config(e.to_string()) }
}
