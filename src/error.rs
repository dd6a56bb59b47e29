//! Error taxonomy for the scan engine.
//!
//! Request-shape errors (`InvalidTarget`, `InvalidPort`, `EmptyPlan`) are
//! returned before a job exists. `Probe` errors never leave the coordinator;
//! they are folded into a `PortOutcome` with status `error`. `JobSetup` is the
//! only error that turns a job into the terminal `Error` state.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("invalid port specification: {0}")]
    InvalidPort(String),

    #[error("empty scan plan: {0}")]
    EmptyPlan(String),

    #[error("scan not found: {0}")]
    NotFound(String),

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("job setup failed: {0}")]
    JobSetup(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScanError {
    /// True for errors caused by the caller's request rather than the engine.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            ScanError::InvalidTarget(_) | ScanError::InvalidPort(_) | ScanError::EmptyPlan(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
