//! Adapter error types

use jobspec_engine::EngineError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AdapterError>;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status
    #[error("Service error {status}: {body}")]
    Status { status: u16, body: String },

    /// The service answered with a body of the wrong shape
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<AdapterError> for EngineError {
    fn from(err: AdapterError) -> Self {
        EngineError::collaborator(err.to_string())
    }
}
