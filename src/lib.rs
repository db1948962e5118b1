pub mod analyzer;
pub mod cache;
pub mod calibration;
pub mod clock;
pub mod config;
pub mod elo;
pub mod error;
pub mod export;
pub mod historical_dataset;
pub mod league_params;
pub mod orchestrator;
pub mod persist;
pub mod predictor;
pub mod source;
pub mod team_state;
pub mod types;

pub use analyzer::{AnalyzerConfig, HistoricalAnalyzer, validate_model};
pub use cache::{MemoryCache, PredictionCache};
pub use error::{AnalysisError, CacheError};
pub use orchestrator::{AnalysisReport, Orchestrator, PredictionsView, TriggerOutcome};
pub use types::{
    AnalysisProgress, MatchRecord, MatchStatus, Model, Prediction, ProgressLookup, SeasonKey,
    ValidationResult,
};
