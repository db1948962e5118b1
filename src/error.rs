use thiserror::Error;

use crate::types::SeasonKey;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("prediction cache unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt cache entry: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        CacheError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Corrupt(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no usable matches for {key}")]
    NoMatches { key: SeasonKey },

    #[error(transparent)]
    CacheUnavailable(#[from] CacheError),

    #[error("analysis for {key} has not reported progress for {idle_secs}s")]
    StaleAnalysis { key: SeasonKey, idle_secs: i64 },

    #[error("match source failed: {0:#}")]
    Source(anyhow::Error),
}

impl AnalysisError {
    pub fn invalid_key(key: SeasonKey) -> Self {
        AnalysisError::InvalidInput(format!(
            "league id must be non-zero and season within range (got {key})"
        ))
    }
}
