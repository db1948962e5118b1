//! Per-season analysis lifecycle on top of the prediction cache.
//!
//! A key moves `Absent -> Running -> Complete`. The cache itself is the coordination point:
//! a run claims its key by writing a `Running` progress record before any expensive work, and
//! publishes the model as its very last result write. A trigger that finds a model serves it;
//! one that finds a live `Running` record reports progress instead of replaying again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::analyzer::{HistoricalAnalyzer, validate_model};
use crate::cache::PredictionCache;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::AnalysisError;
use crate::source::MatchSource;
use crate::types::{
    AnalysisProgress, Model, Prediction, ProgressLookup, ProgressStatus, SeasonKey,
    ValidationResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleAction {
    /// Treat the stuck run as dead and replay from scratch.
    Restart,
    /// Surface `AnalysisError::StaleAnalysis` and leave the record alone.
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalePolicy {
    pub stale_after: Duration,
    pub action: StaleAction,
}

impl Default for StalePolicy {
    fn default() -> Self {
        Self {
            stale_after: Duration::minutes(15),
            action: StaleAction::Restart,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub model: Model,
    pub predictions: Vec<Prediction>,
    pub validation: ValidationResult,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// A model already existed; nothing was recomputed.
    Cached(AnalysisReport),
    /// This call ran the replay and stored its results.
    Computed(AnalysisReport),
    /// Another run holds the key; its latest progress is returned.
    InProgress(AnalysisProgress),
}

impl TriggerOutcome {
    pub fn report(&self) -> Option<&AnalysisReport> {
        match self {
            TriggerOutcome::Cached(report) | TriggerOutcome::Computed(report) => Some(report),
            TriggerOutcome::InProgress(_) => None,
        }
    }

    pub fn into_report(self) -> Option<AnalysisReport> {
        match self {
            TriggerOutcome::Cached(report) | TriggerOutcome::Computed(report) => Some(report),
            TriggerOutcome::InProgress(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionsView {
    pub predictions: Vec<Prediction>,
    /// Present only once a model exists for the key; recomputed on every read.
    pub validation: Option<ValidationResult>,
    /// Served from this orchestrator's last known report because the cache was unreachable.
    pub stale: bool,
}

pub struct Orchestrator<C, S> {
    cache: C,
    source: S,
    analyzer: HistoricalAnalyzer,
    clock: Arc<dyn Clock>,
    warmup_seasons: u16,
    stale: StalePolicy,
    last_known: Mutex<HashMap<SeasonKey, AnalysisReport>>,
}

impl<C: PredictionCache, S: MatchSource> Orchestrator<C, S> {
    pub fn new(cache: C, source: S, analyzer: HistoricalAnalyzer) -> Self {
        Self {
            cache,
            source,
            analyzer,
            clock: Arc::new(SystemClock),
            warmup_seasons: 2,
            stale: StalePolicy::default(),
            last_known: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(cache: C, source: S, config: &Config) -> Self {
        Self::new(cache, source, HistoricalAnalyzer::new(config.analyzer))
            .with_warmup_seasons(config.warmup_seasons)
            .with_stale_policy(config.stale)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_warmup_seasons(mut self, warmup_seasons: u16) -> Self {
        self.warmup_seasons = warmup_seasons;
        self
    }

    pub fn with_stale_policy(mut self, stale: StalePolicy) -> Self {
        self.stale = stale;
        self
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Serves the cached analysis for `key`, or runs it if the key is absent.
    pub fn trigger_analysis(&self, key: SeasonKey) -> Result<TriggerOutcome, AnalysisError> {
        if !key.is_valid() {
            return Err(AnalysisError::invalid_key(key));
        }

        let cached = self
            .cache
            .get_model(key)
            .and_then(|model| match model {
                Some(model) => Ok(Some((model, self.cache.get_all_predictions(key)?))),
                None => Ok(None),
            });
        match cached {
            Ok(Some((model, predictions))) => {
                let report = self.remember(AnalysisReport {
                    validation: validate_model(&predictions),
                    model,
                    predictions,
                });
                return Ok(TriggerOutcome::Cached(report));
            }
            Ok(None) => {}
            Err(err) => {
                let Some(report) = self.recall(key) else {
                    return Err(err.into());
                };
                warn!("{key}: cache read failed ({err}), serving last known analysis");
                return Ok(TriggerOutcome::Cached(report));
            }
        }

        if let ProgressLookup::Found(progress) = self.cache.get_analysis_progress(key)?
            && progress.is_running()
        {
            let idle = self.clock.now() - progress.updated_at;
            if idle <= self.stale.stale_after {
                return Ok(TriggerOutcome::InProgress(progress));
            }
            match self.stale.action {
                StaleAction::Fail => {
                    return Err(AnalysisError::StaleAnalysis {
                        key,
                        idle_secs: idle.num_seconds(),
                    });
                }
                StaleAction::Restart => {
                    warn!(
                        "{key}: run started {} idle for {}s, restarting",
                        progress.started_at,
                        idle.num_seconds()
                    );
                }
            }
        }

        self.run(key).map(TriggerOutcome::Computed)
    }

    pub fn poll_progress(&self, key: SeasonKey) -> Result<ProgressLookup, AnalysisError> {
        if !key.is_valid() {
            return Err(AnalysisError::invalid_key(key));
        }
        Ok(self.cache.get_analysis_progress(key)?)
    }

    pub fn read_predictions(&self, key: SeasonKey) -> Result<PredictionsView, AnalysisError> {
        if !key.is_valid() {
            return Err(AnalysisError::invalid_key(key));
        }

        let read = self
            .cache
            .get_all_predictions(key)
            .and_then(|predictions| Ok((predictions, self.cache.get_model(key)?)));
        match read {
            Ok((predictions, model)) => {
                let validation = model.as_ref().map(|_| validate_model(&predictions));
                if let (Some(model), Some(validation)) = (model, validation) {
                    self.remember(AnalysisReport {
                        model,
                        predictions: predictions.clone(),
                        validation,
                    });
                }
                Ok(PredictionsView {
                    predictions,
                    validation,
                    stale: false,
                })
            }
            Err(err) => {
                let Some(report) = self.recall(key) else {
                    return Err(err.into());
                };
                warn!("{key}: cache read failed ({err}), serving last known predictions");
                Ok(PredictionsView {
                    validation: Some(validate_model(&report.predictions)),
                    predictions: report.predictions,
                    stale: true,
                })
            }
        }
    }

    pub fn read_prediction(&self, fixture_id: u64) -> Result<Option<Prediction>, AnalysisError> {
        if fixture_id == 0 {
            return Err(AnalysisError::InvalidInput(
                "fixture id must be non-zero".to_string(),
            ));
        }
        match self.cache.get_prediction(fixture_id) {
            Ok(prediction) => Ok(prediction),
            Err(err) => {
                let fallback = self.last_known.lock().ok().and_then(|known| {
                    known
                        .values()
                        .flat_map(|report| report.predictions.iter())
                        .find(|p| p.fixture_id == fixture_id)
                        .cloned()
                });
                match fallback {
                    Some(prediction) => {
                        warn!("fixture {fixture_id}: cache read failed ({err}), serving stale");
                        Ok(Some(prediction))
                    }
                    None => Err(err.into()),
                }
            }
        }
    }

    /// Drops everything cached for `key` so the next trigger recomputes it.
    pub fn invalidate(&self, key: SeasonKey) -> Result<(), AnalysisError> {
        if !key.is_valid() {
            return Err(AnalysisError::invalid_key(key));
        }
        self.cache.invalidate(key)?;
        if let Ok(mut known) = self.last_known.lock() {
            known.remove(&key);
        }
        info!("{key}: cache invalidated");
        Ok(())
    }

    fn run(&self, key: SeasonKey) -> Result<AnalysisReport, AnalysisError> {
        let claimed_at = self.clock.now();
        self.cache
            .store_analysis_progress(&AnalysisProgress::started(key, claimed_at))?;
        info!("{key}: analysis claimed");

        let matches = match self.source.load_season(key, self.warmup_seasons) {
            Ok(matches) => matches,
            Err(err) => {
                self.mark_failed(key, claimed_at, None, format!("match source failed: {err:#}"));
                return Err(AnalysisError::Source(err));
            }
        };

        let mut last_progress: Option<AnalysisProgress> = None;
        let mut failed_writes = 0usize;
        let analyzed = self.analyzer.analyze(key, &matches, |progress| {
            let mut progress = progress.clone();
            progress.started_at = claimed_at;
            progress.updated_at = self.clock.now();
            if let Err(err) = self.cache.store_analysis_progress(&progress) {
                failed_writes += 1;
                warn!("{key}: progress write failed: {err}");
            }
            last_progress = Some(progress);
        });
        let predictions = match analyzed {
            Ok(predictions) => predictions,
            Err(err) => {
                self.mark_failed(key, claimed_at, last_progress.as_ref(), err.to_string());
                return Err(err);
            }
        };
        if failed_writes > 0 {
            warn!("{key}: {failed_writes} progress writes failed during replay");
        }

        let model = self.analyzer.create_model(key, &predictions, &matches);
        let validation = validate_model(&predictions);

        let stored = self
            .cache
            .store_predictions(key, &predictions)
            .and_then(|_| self.cache.store_model(&model));
        if let Err(err) = stored {
            self.mark_failed(
                key,
                claimed_at,
                last_progress.as_ref(),
                format!("storing results failed: {err}"),
            );
            return Err(err.into());
        }

        let mut done = last_progress.unwrap_or_else(|| AnalysisProgress::started(key, claimed_at));
        done.status = ProgressStatus::Finished;
        done.total_matches = predictions.len();
        done.processed_matches = predictions.len();
        done.predictions_made = predictions.len();
        done.finished_matches = validation.finished_matches;
        done.correct_predictions = validation.correct_predictions;
        done.running_accuracy = validation.accuracy;
        done.percentage = 100.0;
        done.updated_at = self.clock.now();
        if let Err(err) = self.cache.store_analysis_progress(&done) {
            warn!("{key}: final progress write failed: {err}");
        }

        info!(
            "{key}: analysis stored, {} predictions, accuracy {:.3} over {} finished",
            predictions.len(),
            validation.accuracy,
            validation.finished_matches
        );
        Ok(self.remember(AnalysisReport {
            model,
            predictions,
            validation,
        }))
    }

    fn mark_failed(
        &self,
        key: SeasonKey,
        claimed_at: DateTime<Utc>,
        last: Option<&AnalysisProgress>,
        message: String,
    ) {
        warn!("{key}: analysis failed: {message}");
        let mut progress = last
            .cloned()
            .unwrap_or_else(|| AnalysisProgress::started(key, claimed_at));
        progress.status = ProgressStatus::Failed;
        progress.updated_at = self.clock.now();
        progress.message = Some(message);
        if let Err(err) = self.cache.store_analysis_progress(&progress) {
            warn!("{key}: failed to record failure: {err}");
        }
    }

    fn remember(&self, report: AnalysisReport) -> AnalysisReport {
        if let Ok(mut known) = self.last_known.lock() {
            known.insert(report.model.key(), report.clone());
        }
        report
    }

    fn recall(&self, key: SeasonKey) -> Option<AnalysisReport> {
        self.last_known.lock().ok()?.get(&key).cloned()
    }
}
