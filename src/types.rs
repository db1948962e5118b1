use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calibration::{Metrics, Outcome, Prob3, classify_outcome};

pub const MIN_SEASON_YEAR: u16 = 1850;
pub const MAX_SEASON_YEAR: u16 = 2200;

/// Cache and analysis key: one league competition in one season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeasonKey {
    pub league_id: u32,
    pub season_year: u16,
}

impl SeasonKey {
    pub fn new(league_id: u32, season_year: u16) -> Self {
        Self {
            league_id,
            season_year,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.league_id != 0 && (MIN_SEASON_YEAR..=MAX_SEASON_YEAR).contains(&self.season_year)
    }
}

impl fmt::Display for SeasonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "league {} season {}", self.league_id, self.season_year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MatchStatus {
    #[default]
    Scheduled,
    InPlay,
    Finished,
    AfterExtraTime,
    Penalties,
    Postponed,
    Cancelled,
    Awarded,
}

impl MatchStatus {
    pub fn is_final(self) -> bool {
        matches!(
            self,
            MatchStatus::Finished
                | MatchStatus::AfterExtraTime
                | MatchStatus::Penalties
                | MatchStatus::Awarded
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::InPlay => "in_play",
            MatchStatus::Finished => "finished",
            MatchStatus::AfterExtraTime => "after_extra_time",
            MatchStatus::Penalties => "penalties",
            MatchStatus::Postponed => "postponed",
            MatchStatus::Cancelled => "cancelled",
            MatchStatus::Awarded => "awarded",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let status = match raw.trim().to_ascii_lowercase().as_str() {
            "scheduled" | "ns" | "tbd" => MatchStatus::Scheduled,
            "in_play" | "live" | "1h" | "2h" | "ht" => MatchStatus::InPlay,
            "finished" | "ft" => MatchStatus::Finished,
            "after_extra_time" | "aet" => MatchStatus::AfterExtraTime,
            "penalties" | "pen" => MatchStatus::Penalties,
            "postponed" | "pst" => MatchStatus::Postponed,
            "cancelled" | "canc" => MatchStatus::Cancelled,
            "awarded" | "awd" => MatchStatus::Awarded,
            _ => return None,
        };
        Some(status)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub fixture_id: u64,
    pub kickoff: DateTime<Utc>,
    pub league_id: u32,
    pub season_year: u16,
    pub home_team_id: Option<u32>,
    pub away_team_id: Option<u32>,
    #[serde(default)]
    pub home_team: String,
    #[serde(default)]
    pub away_team: String,
    #[serde(default)]
    pub round: Option<String>,
    #[serde(default)]
    pub goals_home: Option<u8>,
    #[serde(default)]
    pub goals_away: Option<u8>,
    #[serde(default)]
    pub status: MatchStatus,
}

impl MatchRecord {
    pub fn key(&self) -> SeasonKey {
        SeasonKey::new(self.league_id, self.season_year)
    }

    /// Observed result, only for matches that have actually been played out.
    pub fn outcome(&self) -> Option<Outcome> {
        let (Some(home), Some(away)) = (self.goals_home, self.goals_away) else {
            return None;
        };
        if !self.status.is_final() {
            return None;
        }
        Some(classify_outcome(home, away))
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    MissingTeam,
    SameTeam,
    PartialScore,
    DuplicateFixture,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::MissingTeam => "missing team id",
            SkipReason::SameTeam => "home and away team are identical",
            SkipReason::PartialScore => "only one side has a score",
            SkipReason::DuplicateFixture => "duplicate fixture id",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub fixture_id: u64,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub fixture_id: u64,
    pub league_id: u32,
    pub season_year: u16,
    pub kickoff: DateTime<Utc>,
    pub round: Option<String>,
    pub home_team_id: u32,
    pub away_team_id: u32,
    pub home_team: String,
    pub away_team: String,
    pub predicted: Outcome,
    pub probs: Prob3,
    pub confidence: f64,
    pub home_elo: f64,
    pub away_elo: f64,
    pub actual_result: Option<Outcome>,
    pub is_correct: Option<bool>,
    pub generated_at: DateTime<Utc>,
}

impl Prediction {
    pub fn key(&self) -> SeasonKey {
        SeasonKey::new(self.league_id, self.season_year)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRating {
    pub team_id: u32,
    pub name: String,
    pub elo: f64,
    pub played: u32,
    pub points: u32,
    pub goals_for: u32,
    pub goals_against: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeagueSnapshot {
    pub sample_matches: usize,
    pub goals_total_base: f64,
    pub home_adv_goals: f64,
    pub draw_rate: f64,
    pub dc_rho: f64,
}

/// Stored artifact of one completed season analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub league_id: u32,
    pub season_year: u16,
    pub created_at: DateTime<Utc>,
    pub predictor: String,
    pub prediction_count: usize,
    pub fixture_ids: Vec<u64>,
    pub context_matches: usize,
    pub skipped: Vec<SkippedRecord>,
    pub team_ratings: Vec<TeamRating>,
    pub league: LeagueSnapshot,
    pub metrics: Metrics,
    pub input_digest: String,
}

impl Model {
    pub fn key(&self) -> SeasonKey {
        SeasonKey::new(self.league_id, self.season_year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub total_matches: usize,
    pub finished_matches: usize,
    pub correct_predictions: usize,
    pub accuracy: f64,
    pub brier: f64,
    pub log_loss: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressStatus {
    Running,
    Finished,
    Failed,
}

impl ProgressStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::Running => "running",
            ProgressStatus::Finished => "finished",
            ProgressStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisProgress {
    pub league_id: u32,
    pub season_year: u16,
    pub status: ProgressStatus,
    pub total_matches: usize,
    pub processed_matches: usize,
    pub last_fixture_id: Option<u64>,
    pub last_match: Option<String>,
    pub predictions_made: usize,
    pub finished_matches: usize,
    pub correct_predictions: usize,
    pub running_accuracy: f64,
    pub percentage: f64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub message: Option<String>,
}

impl AnalysisProgress {
    pub fn started(key: SeasonKey, at: DateTime<Utc>) -> Self {
        Self {
            league_id: key.league_id,
            season_year: key.season_year,
            status: ProgressStatus::Running,
            total_matches: 0,
            processed_matches: 0,
            last_fixture_id: None,
            last_match: None,
            predictions_made: 0,
            finished_matches: 0,
            correct_predictions: 0,
            running_accuracy: 0.0,
            percentage: 0.0,
            started_at: at,
            updated_at: at,
            message: None,
        }
    }

    pub fn key(&self) -> SeasonKey {
        SeasonKey::new(self.league_id, self.season_year)
    }

    pub fn is_running(&self) -> bool {
        self.status == ProgressStatus::Running
    }
}

/// Result of a progress poll. `NotFound` means no analysis ever ran for the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProgressLookup {
    NotFound,
    Found(AnalysisProgress),
}

impl ProgressLookup {
    pub fn into_option(self) -> Option<AnalysisProgress> {
        match self {
            ProgressLookup::NotFound => None,
            ProgressLookup::Found(progress) => Some(progress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: MatchStatus, home: Option<u8>, away: Option<u8>) -> MatchRecord {
        MatchRecord {
            fixture_id: 1,
            kickoff: DateTime::<Utc>::default(),
            league_id: 47,
            season_year: 2023,
            home_team_id: Some(1),
            away_team_id: Some(2),
            home_team: "Home".to_string(),
            away_team: "Away".to_string(),
            round: None,
            goals_home: home,
            goals_away: away,
            status,
        }
    }

    #[test]
    fn outcome_requires_final_status_and_both_scores() {
        assert_eq!(
            record(MatchStatus::Finished, Some(2), Some(1)).outcome(),
            Some(Outcome::Home)
        );
        assert_eq!(record(MatchStatus::InPlay, Some(2), Some(1)).outcome(), None);
        assert_eq!(record(MatchStatus::Finished, None, None).outcome(), None);
        assert_eq!(
            record(MatchStatus::Penalties, Some(1), Some(1)).outcome(),
            Some(Outcome::Draw)
        );
    }

    #[test]
    fn season_key_validation() {
        assert!(SeasonKey::new(47, 2023).is_valid());
        assert!(!SeasonKey::new(0, 2023).is_valid());
        assert!(!SeasonKey::new(47, 1200).is_valid());
    }

    #[test]
    fn status_parse_accepts_short_codes() {
        assert_eq!(MatchStatus::parse("FT"), Some(MatchStatus::Finished));
        assert_eq!(MatchStatus::parse(" aet "), Some(MatchStatus::AfterExtraTime));
        assert_eq!(MatchStatus::parse("weird"), None);
    }
}
