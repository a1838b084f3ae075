//! Error types for Vigil.

use thiserror::Error;

use crate::safety::SafetyVeto;

#[derive(Error, Debug)]
pub enum VigilError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Unknown action type: {0}")]
    UnknownAction(String),

    #[error("Safety gate veto: {0}")]
    Safety(#[from] SafetyVeto),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type VigilResult<T> = Result<T, VigilError>;
