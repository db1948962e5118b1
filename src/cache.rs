//! Prediction cache: models, prediction collections and live progress, per season key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::CacheError;
use crate::types::{AnalysisProgress, Model, Prediction, ProgressLookup, SeasonKey};

pub trait PredictionCache: Send + Sync {
    fn get_model(&self, key: SeasonKey) -> Result<Option<Model>, CacheError>;

    /// Overwrites unconditionally; callers check `get_model` first.
    fn store_model(&self, model: &Model) -> Result<(), CacheError>;

    /// Stored predictions in replay order, empty when none were stored.
    fn get_all_predictions(&self, key: SeasonKey) -> Result<Vec<Prediction>, CacheError>;

    /// Replaces the whole collection for `key`.
    fn store_predictions(
        &self,
        key: SeasonKey,
        predictions: &[Prediction],
    ) -> Result<(), CacheError>;

    fn get_prediction(&self, fixture_id: u64) -> Result<Option<Prediction>, CacheError>;

    /// Writes the progress slot. A `Running` write from the same run (same `started_at`) with a
    /// lower processed count than the stored one is dropped.
    fn store_analysis_progress(&self, progress: &AnalysisProgress) -> Result<(), CacheError>;

    fn get_analysis_progress(&self, key: SeasonKey) -> Result<ProgressLookup, CacheError>;

    /// Drops model, predictions and progress for `key`.
    fn invalidate(&self, key: SeasonKey) -> Result<(), CacheError>;
}

impl<C: PredictionCache + ?Sized> PredictionCache for Arc<C> {
    fn get_model(&self, key: SeasonKey) -> Result<Option<Model>, CacheError> {
        (**self).get_model(key)
    }

    fn store_model(&self, model: &Model) -> Result<(), CacheError> {
        (**self).store_model(model)
    }

    fn get_all_predictions(&self, key: SeasonKey) -> Result<Vec<Prediction>, CacheError> {
        (**self).get_all_predictions(key)
    }

    fn store_predictions(
        &self,
        key: SeasonKey,
        predictions: &[Prediction],
    ) -> Result<(), CacheError> {
        (**self).store_predictions(key, predictions)
    }

    fn get_prediction(&self, fixture_id: u64) -> Result<Option<Prediction>, CacheError> {
        (**self).get_prediction(fixture_id)
    }

    fn store_analysis_progress(&self, progress: &AnalysisProgress) -> Result<(), CacheError> {
        (**self).store_analysis_progress(progress)
    }

    fn get_analysis_progress(&self, key: SeasonKey) -> Result<ProgressLookup, CacheError> {
        (**self).get_analysis_progress(key)
    }

    fn invalidate(&self, key: SeasonKey) -> Result<(), CacheError> {
        (**self).invalidate(key)
    }
}

/// Same-run `Running` writes only move forward. Anything else replaces the stored record.
pub(crate) fn progress_supersedes(
    existing: &AnalysisProgress,
    incoming: &AnalysisProgress,
) -> bool {
    existing.started_at != incoming.started_at
        || !incoming.is_running()
        || incoming.processed_matches >= existing.processed_matches
}

#[derive(Debug, Default)]
struct MemoryState {
    models: HashMap<SeasonKey, Model>,
    predictions: HashMap<SeasonKey, Vec<Prediction>>,
    fixture_index: HashMap<u64, (SeasonKey, usize)>,
    progress: HashMap<SeasonKey, AnalysisProgress>,
}

/// In-process cache. Cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryCache {
    state: Mutex<MemoryState>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, CacheError> {
        self.state
            .lock()
            .map_err(|_| CacheError::Unavailable("memory cache lock poisoned".to_string()))
    }
}

impl PredictionCache for MemoryCache {
    fn get_model(&self, key: SeasonKey) -> Result<Option<Model>, CacheError> {
        Ok(self.lock()?.models.get(&key).cloned())
    }

    fn store_model(&self, model: &Model) -> Result<(), CacheError> {
        self.lock()?.models.insert(model.key(), model.clone());
        Ok(())
    }

    fn get_all_predictions(&self, key: SeasonKey) -> Result<Vec<Prediction>, CacheError> {
        Ok(self
            .lock()?
            .predictions
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }

    fn store_predictions(
        &self,
        key: SeasonKey,
        predictions: &[Prediction],
    ) -> Result<(), CacheError> {
        let mut state = self.lock()?;
        state.fixture_index.retain(|_, (k, _)| *k != key);
        for (idx, p) in predictions.iter().enumerate() {
            state.fixture_index.insert(p.fixture_id, (key, idx));
        }
        state.predictions.insert(key, predictions.to_vec());
        Ok(())
    }

    fn get_prediction(&self, fixture_id: u64) -> Result<Option<Prediction>, CacheError> {
        let state = self.lock()?;
        let Some((key, idx)) = state.fixture_index.get(&fixture_id) else {
            return Ok(None);
        };
        Ok(state
            .predictions
            .get(key)
            .and_then(|list| list.get(*idx))
            .cloned())
    }

    fn store_analysis_progress(&self, progress: &AnalysisProgress) -> Result<(), CacheError> {
        let mut state = self.lock()?;
        let key = progress.key();
        if let Some(existing) = state.progress.get(&key)
            && !progress_supersedes(existing, progress)
        {
            return Ok(());
        }
        state.progress.insert(key, progress.clone());
        Ok(())
    }

    fn get_analysis_progress(&self, key: SeasonKey) -> Result<ProgressLookup, CacheError> {
        Ok(match self.lock()?.progress.get(&key) {
            Some(progress) => ProgressLookup::Found(progress.clone()),
            None => ProgressLookup::NotFound,
        })
    }

    fn invalidate(&self, key: SeasonKey) -> Result<(), CacheError> {
        let mut state = self.lock()?;
        state.models.remove(&key);
        state.predictions.remove(&key);
        state.progress.remove(&key);
        state.fixture_index.retain(|_, (k, _)| *k != key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::calibration::{Outcome, Prob3};
    use crate::types::ProgressStatus;

    fn prediction(fixture_id: u64, key: SeasonKey) -> Prediction {
        Prediction {
            fixture_id,
            league_id: key.league_id,
            season_year: key.season_year,
            kickoff: Utc.with_ymd_and_hms(2023, 8, 12, 15, 0, 0).unwrap(),
            round: None,
            home_team_id: 1,
            away_team_id: 2,
            home_team: "A".to_string(),
            away_team: "B".to_string(),
            predicted: Outcome::Home,
            probs: Prob3::uniform(),
            confidence: 1.0 / 3.0,
            home_elo: 1500.0,
            away_elo: 1500.0,
            actual_result: None,
            is_correct: None,
            generated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn fixture_lookup_follows_replaced_collections() {
        let cache = MemoryCache::new();
        let key = SeasonKey::new(47, 2023);
        cache
            .store_predictions(key, &[prediction(1, key), prediction(2, key)])
            .unwrap();
        assert_eq!(cache.get_prediction(2).unwrap().unwrap().fixture_id, 2);

        cache.store_predictions(key, &[prediction(3, key)]).unwrap();
        assert!(cache.get_prediction(2).unwrap().is_none());
        assert_eq!(cache.get_prediction(3).unwrap().unwrap().fixture_id, 3);
        assert_eq!(cache.get_all_predictions(key).unwrap().len(), 1);
    }

    #[test]
    fn progress_from_same_run_never_goes_backwards() {
        let cache = MemoryCache::new();
        let key = SeasonKey::new(47, 2023);
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            cache.get_analysis_progress(key).unwrap(),
            ProgressLookup::NotFound
        );

        let mut p = AnalysisProgress::started(key, t0);
        p.processed_matches = 5;
        cache.store_analysis_progress(&p).unwrap();
        let mut stale = p.clone();
        stale.processed_matches = 3;
        cache.store_analysis_progress(&stale).unwrap();
        let stored = cache.get_analysis_progress(key).unwrap().into_option().unwrap();
        assert_eq!(stored.processed_matches, 5);

        let restarted = AnalysisProgress::started(key, t0 + Duration::minutes(30));
        cache.store_analysis_progress(&restarted).unwrap();
        let stored = cache.get_analysis_progress(key).unwrap().into_option().unwrap();
        assert_eq!(stored.processed_matches, 0);
    }

    #[test]
    fn terminal_status_replaces_a_further_running_record() {
        let cache = MemoryCache::new();
        let key = SeasonKey::new(47, 2023);
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let mut running = AnalysisProgress::started(key, t0);
        running.processed_matches = 4;
        cache.store_analysis_progress(&running).unwrap();

        let mut failed = AnalysisProgress::started(key, t0);
        failed.status = ProgressStatus::Failed;
        cache.store_analysis_progress(&failed).unwrap();
        let stored = cache.get_analysis_progress(key).unwrap().into_option().unwrap();
        assert_eq!(stored.status, ProgressStatus::Failed);
        assert!(!stored.is_running());
    }

    #[test]
    fn invalidate_clears_every_slot() {
        let cache = MemoryCache::new();
        let key = SeasonKey::new(47, 2023);
        let other = SeasonKey::new(47, 2022);
        cache.store_predictions(key, &[prediction(1, key)]).unwrap();
        cache.store_predictions(other, &[prediction(9, other)]).unwrap();
        cache
            .store_analysis_progress(&AnalysisProgress::started(key, Utc::now()))
            .unwrap();
        cache.invalidate(key).unwrap();
        assert!(cache.get_prediction(1).unwrap().is_none());
        assert!(cache.get_prediction(9).unwrap().is_some());
        assert_eq!(
            cache.get_analysis_progress(key).unwrap(),
            ProgressLookup::NotFound
        );
    }
}
