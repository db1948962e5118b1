//! Chronological season replay.
//!
//! Records are replayed in `(kickoff, fixture_id)` order. Fixtures sharing a kickoff form one
//! group: every target fixture in the group is predicted from the state as it stood before the
//! group, and only then are the group's results applied. A prediction therefore never depends on
//! any record kicking off at or after its own fixture.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::calibration::{self, Outcome, Prob3};
use crate::clock::{Clock, SystemClock};
use crate::elo::EloConfig;
use crate::error::AnalysisError;
use crate::predictor::{EloPoissonPredictor, Predictor};
use crate::team_state::StateBook;
use crate::types::{
    AnalysisProgress, LeagueSnapshot, MatchRecord, Model, Prediction, SeasonKey, SkipReason,
    SkippedRecord, ValidationResult,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerConfig {
    pub elo: EloConfig,
    pub form_window: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            elo: EloConfig::default(),
            form_window: 5,
        }
    }
}

pub struct HistoricalAnalyzer {
    config: AnalyzerConfig,
    predictor: Arc<dyn Predictor>,
    clock: Arc<dyn Clock>,
}

/// A record that passed validation, with its team ids unwrapped.
#[derive(Debug, Clone, Copy)]
struct Fixture<'a> {
    record: &'a MatchRecord,
    home_id: u32,
    away_id: u32,
}

struct Prepared<'a> {
    fixtures: Vec<Fixture<'a>>,
    skipped: Vec<SkippedRecord>,
    target_count: usize,
}

impl HistoricalAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            predictor: Arc::new(EloPoissonPredictor::with_form_window(config.form_window)),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_predictor(mut self, predictor: Arc<dyn Predictor>) -> Self {
        self.predictor = predictor;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn predictor_name(&self) -> &str {
        self.predictor.name()
    }

    /// Replays `matches` and returns one prediction per fixture of `key`, in replay order.
    ///
    /// `matches` may be unsorted and may contain earlier seasons (and other competitions) as
    /// warm-up context. `on_progress` is called once per target fixture.
    pub fn analyze(
        &self,
        key: SeasonKey,
        matches: &[MatchRecord],
        mut on_progress: impl FnMut(&AnalysisProgress),
    ) -> Result<Vec<Prediction>, AnalysisError> {
        if !key.is_valid() {
            return Err(AnalysisError::invalid_key(key));
        }

        let prepared = prepare(key, matches);
        for skip in &prepared.skipped {
            warn!("{key}: skipping fixture {}: {}", skip.fixture_id, skip.reason);
        }
        if prepared.target_count == 0 {
            return Err(AnalysisError::NoMatches { key });
        }

        let started_at = self.clock.now();
        info!(
            "{key}: replaying {} records ({} target fixtures, {} skipped)",
            prepared.fixtures.len(),
            prepared.target_count,
            prepared.skipped.len()
        );

        let mut progress = AnalysisProgress::started(key, started_at);
        progress.total_matches = prepared.target_count;

        let mut book = StateBook::new(self.config.elo, self.config.form_window);
        let mut predictions: Vec<Prediction> = Vec::with_capacity(prepared.target_count);

        for group in kickoff_groups(&prepared.fixtures) {
            let league = book.league().snapshot();
            let first_new = predictions.len();

            for fixture in group.iter().filter(|f| f.record.key() == key) {
                predictions.push(self.predict_fixture(&book, &league, fixture, started_at));
            }
            for fixture in group {
                book.apply(fixture.record);
            }

            for prediction in &predictions[first_new..] {
                progress.processed_matches += 1;
                progress.predictions_made += 1;
                if let Some(correct) = prediction.is_correct {
                    progress.finished_matches += 1;
                    if correct {
                        progress.correct_predictions += 1;
                    }
                }
                progress.running_accuracy =
                    ratio(progress.correct_predictions, progress.finished_matches);
                progress.percentage =
                    100.0 * ratio(progress.processed_matches, progress.total_matches);
                progress.last_fixture_id = Some(prediction.fixture_id);
                progress.last_match =
                    Some(format!("{} vs {}", prediction.home_team, prediction.away_team));
                progress.updated_at = self.clock.now();
                debug!(
                    "{key}: processed {}/{}",
                    progress.processed_matches, progress.total_matches
                );
                on_progress(&progress);
            }
        }

        info!(
            "{key}: replay complete, {} predictions, running accuracy {:.3}",
            predictions.len(),
            progress.running_accuracy
        );
        Ok(predictions)
    }

    /// Aggregates one finished replay into a model. Pure: the same inputs give the same model.
    pub fn create_model(
        &self,
        key: SeasonKey,
        predictions: &[Prediction],
        matches: &[MatchRecord],
    ) -> Model {
        let prepared = prepare(key, matches);

        let mut book = StateBook::new(self.config.elo, self.config.form_window);
        let mut context_matches = 0usize;
        let mut hasher = Sha256::new();
        for fixture in &prepared.fixtures {
            book.apply(fixture.record);
            if fixture.record.key() != key {
                context_matches += 1;
            }
            hasher.update(digest_line(fixture.record).as_bytes());
        }

        let (probs, outcomes): (Vec<Prob3>, Vec<Outcome>) = predictions
            .iter()
            .filter_map(|p| p.actual_result.map(|actual| (p.probs, actual)))
            .unzip();

        let created_at = predictions
            .iter()
            .map(|p| p.generated_at)
            .max()
            .unwrap_or_default();

        Model {
            league_id: key.league_id,
            season_year: key.season_year,
            created_at,
            predictor: self.predictor.name().to_string(),
            prediction_count: predictions.len(),
            fixture_ids: predictions.iter().map(|p| p.fixture_id).collect(),
            context_matches,
            skipped: prepared.skipped,
            team_ratings: book.ratings(),
            league: book.league().snapshot(),
            metrics: calibration::evaluate_probs(&probs, &outcomes),
            input_digest: format!("{:x}", hasher.finalize()),
        }
    }

    fn predict_fixture(
        &self,
        book: &StateBook,
        league: &LeagueSnapshot,
        fixture: &Fixture<'_>,
        generated_at: DateTime<Utc>,
    ) -> Prediction {
        let record = fixture.record;
        let home = book.snapshot(fixture.home_id, &record.home_team, record.season_year);
        let away = book.snapshot(fixture.away_id, &record.away_team, record.season_year);
        let probs = self.predictor.predict(&home, &away, league);
        let predicted = calibration::argmax(probs);
        let actual_result = record.outcome();

        Prediction {
            fixture_id: record.fixture_id,
            league_id: record.league_id,
            season_year: record.season_year,
            kickoff: record.kickoff,
            round: record.round.clone(),
            home_team_id: fixture.home_id,
            away_team_id: fixture.away_id,
            home_team: record.home_team.clone(),
            away_team: record.away_team.clone(),
            predicted,
            probs,
            confidence: probs.of(predicted),
            home_elo: home.elo,
            away_elo: away.elo,
            actual_result,
            is_correct: actual_result.map(|actual| actual == predicted),
            generated_at,
        }
    }
}

impl Default for HistoricalAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

/// Accuracy over resolved predictions; unresolved ones are left out of the denominator.
pub fn validate_model(predictions: &[Prediction]) -> ValidationResult {
    let mut finished = 0usize;
    let mut correct = 0usize;
    let mut probs = Vec::new();
    let mut outcomes = Vec::new();

    for p in predictions {
        let Some(actual) = p.actual_result else {
            continue;
        };
        finished += 1;
        if p.is_correct == Some(true) {
            correct += 1;
        }
        probs.push(p.probs);
        outcomes.push(actual);
    }

    let metrics = calibration::evaluate_probs(&probs, &outcomes);
    ValidationResult {
        total_matches: predictions.len(),
        finished_matches: finished,
        correct_predictions: correct,
        accuracy: ratio(correct, finished),
        brier: metrics.brier,
        log_loss: metrics.log_loss,
    }
}

fn prepare(key: SeasonKey, matches: &[MatchRecord]) -> Prepared<'_> {
    let mut ordered: Vec<&MatchRecord> = matches
        .iter()
        .filter(|m| m.season_year <= key.season_year)
        .collect();
    ordered.sort_by(|a, b| a.kickoff.cmp(&b.kickoff).then(a.fixture_id.cmp(&b.fixture_id)));

    let mut seen = HashSet::new();
    let mut fixtures = Vec::with_capacity(ordered.len());
    let mut skipped = Vec::new();
    let mut target_count = 0usize;

    for record in ordered {
        let reason = match (record.home_team_id, record.away_team_id) {
            (Some(home_id), Some(away_id)) if home_id == away_id => Some(SkipReason::SameTeam),
            (Some(_), Some(_)) => None,
            _ => Some(SkipReason::MissingTeam),
        }
        .or_else(|| {
            (record.goals_home.is_some() != record.goals_away.is_some())
                .then_some(SkipReason::PartialScore)
        })
        .or_else(|| (!seen.insert(record.fixture_id)).then_some(SkipReason::DuplicateFixture));

        if let Some(reason) = reason {
            skipped.push(SkippedRecord {
                fixture_id: record.fixture_id,
                reason,
            });
            continue;
        }
        let (Some(home_id), Some(away_id)) = (record.home_team_id, record.away_team_id) else {
            continue;
        };
        if record.key() == key {
            target_count += 1;
        }
        fixtures.push(Fixture {
            record,
            home_id,
            away_id,
        });
    }

    Prepared {
        fixtures,
        skipped,
        target_count,
    }
}

fn kickoff_groups<'s, 'a>(fixtures: &'s [Fixture<'a>]) -> impl Iterator<Item = &'s [Fixture<'a>]> {
    fixtures.chunk_by(|a, b| a.record.kickoff == b.record.kickoff)
}

fn digest_line(m: &MatchRecord) -> String {
    format!(
        "{}|{}|{}|{}|{:?}|{:?}|{:?}|{:?}|{}\n",
        m.fixture_id,
        m.kickoff.to_rfc3339(),
        m.league_id,
        m.season_year,
        m.home_team_id,
        m.away_team_id,
        m.goals_home,
        m.goals_away,
        m.status.as_str()
    )
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::types::MatchStatus;

    fn prediction(actual: Option<Outcome>, predicted: Outcome) -> Prediction {
        Prediction {
            fixture_id: 1,
            league_id: 47,
            season_year: 2023,
            kickoff: Utc.with_ymd_and_hms(2023, 8, 12, 15, 0, 0).unwrap(),
            round: None,
            home_team_id: 1,
            away_team_id: 2,
            home_team: "A".to_string(),
            away_team: "B".to_string(),
            predicted,
            probs: Prob3::uniform(),
            confidence: 1.0 / 3.0,
            home_elo: 1500.0,
            away_elo: 1500.0,
            actual_result: actual,
            is_correct: actual.map(|a| a == predicted),
            generated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn validation_excludes_unresolved_from_denominator() {
        let preds = vec![
            prediction(Some(Outcome::Home), Outcome::Home),
            prediction(Some(Outcome::Away), Outcome::Home),
            prediction(None, Outcome::Home),
            prediction(Some(Outcome::Draw), Outcome::Draw),
        ];
        let v = validate_model(&preds);
        assert_eq!(v.total_matches, 4);
        assert_eq!(v.finished_matches, 3);
        assert_eq!(v.correct_predictions, 2);
        assert!((v.accuracy - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn validation_of_unresolved_only_is_zero_not_nan() {
        let v = validate_model(&[prediction(None, Outcome::Home)]);
        assert_eq!(v.finished_matches, 0);
        assert_eq!(v.accuracy, 0.0);
        let v = validate_model(&[]);
        assert_eq!(v.total_matches, 0);
        assert_eq!(v.accuracy, 0.0);
    }

    #[test]
    fn prepare_skips_malformed_and_duplicate_records() {
        let base = MatchRecord {
            fixture_id: 10,
            kickoff: Utc.with_ymd_and_hms(2023, 8, 12, 15, 0, 0).unwrap(),
            league_id: 47,
            season_year: 2023,
            home_team_id: Some(1),
            away_team_id: Some(2),
            home_team: "A".to_string(),
            away_team: "B".to_string(),
            round: None,
            goals_home: Some(1),
            goals_away: Some(0),
            status: MatchStatus::Finished,
        };
        let mut missing = base.clone();
        missing.fixture_id = 11;
        missing.away_team_id = None;
        let mut same = base.clone();
        same.fixture_id = 12;
        same.away_team_id = Some(1);
        let mut partial = base.clone();
        partial.fixture_id = 13;
        partial.goals_away = None;
        let duplicate = base.clone();
        let mut future = base.clone();
        future.fixture_id = 14;
        future.season_year = 2024;

        let matches = vec![base, missing, same, partial, duplicate, future];
        let prepared = prepare(SeasonKey::new(47, 2023), &matches);
        assert_eq!(prepared.fixtures.len(), 1);
        assert_eq!(prepared.target_count, 1);
        let reasons: Vec<SkipReason> = prepared.skipped.iter().map(|s| s.reason).collect();
        assert_eq!(
            reasons,
            vec![
                SkipReason::DuplicateFixture,
                SkipReason::MissingTeam,
                SkipReason::SameTeam,
                SkipReason::PartialScore
            ]
        );
    }
}
