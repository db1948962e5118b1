use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::types::{MatchRecord, SeasonKey};

/// Supplier of match records for a season plus its warm-up window.
pub trait MatchSource: Send + Sync {
    /// Records of `key` and of the `warmup_seasons` preceding seasons. Order is not required.
    fn load_season(&self, key: SeasonKey, warmup_seasons: u16) -> Result<Vec<MatchRecord>>;
}

pub fn in_window(record: &MatchRecord, key: SeasonKey, warmup_seasons: u16) -> bool {
    let first = key.season_year.saturating_sub(warmup_seasons);
    record.league_id == key.league_id && (first..=key.season_year).contains(&record.season_year)
}

/// A JSON array of match records on disk.
#[derive(Debug, Clone)]
pub struct JsonMatchSource {
    path: PathBuf,
}

impl JsonMatchSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_all(&self) -> Result<Vec<MatchRecord>> {
        read_records(&self.path)
    }
}

impl MatchSource for JsonMatchSource {
    fn load_season(&self, key: SeasonKey, warmup_seasons: u16) -> Result<Vec<MatchRecord>> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|m| in_window(m, key, warmup_seasons))
            .collect())
    }
}

pub fn read_records(path: &Path) -> Result<Vec<MatchRecord>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read match records {}", path.display()))?;
    serde_json::from_str::<Vec<MatchRecord>>(raw.trim())
        .with_context(|| format!("invalid match records json in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::types::MatchStatus;

    #[test]
    fn window_covers_target_and_warmup_seasons_of_the_league() {
        let mut m = MatchRecord {
            fixture_id: 1,
            kickoff: Utc.with_ymd_and_hms(2021, 8, 12, 15, 0, 0).unwrap(),
            league_id: 47,
            season_year: 2021,
            home_team_id: Some(1),
            away_team_id: Some(2),
            home_team: "A".to_string(),
            away_team: "B".to_string(),
            round: None,
            goals_home: None,
            goals_away: None,
            status: MatchStatus::Scheduled,
        };
        let key = SeasonKey::new(47, 2023);
        assert!(in_window(&m, key, 2));
        assert!(!in_window(&m, key, 1));
        m.season_year = 2024;
        assert!(!in_window(&m, key, 2));
        m.season_year = 2023;
        m.league_id = 87;
        assert!(!in_window(&m, key, 2));
    }

    #[test]
    fn records_parse_with_optional_fields_missing() {
        let raw = r#"[{"fixture_id":7,"kickoff":"2023-08-12T14:00:00Z","league_id":47,
            "season_year":2023,"home_team_id":1,"away_team_id":null}]"#;
        let records: Vec<MatchRecord> = serde_json::from_str(raw).unwrap();
        assert_eq!(records[0].away_team_id, None);
        assert_eq!(records[0].status, MatchStatus::Scheduled);
        assert!(!records[0].is_resolved());
    }

    #[test]
    fn json_source_filters_to_the_requested_window() {
        let path = std::env::temp_dir().join(format!("records_{}.json", std::process::id()));
        let raw = r#"[
            {"fixture_id":1,"kickoff":"2021-08-12T14:00:00Z","league_id":47,"season_year":2021,
             "home_team_id":1,"away_team_id":2,"goals_home":1,"goals_away":0,"status":"Finished"},
            {"fixture_id":2,"kickoff":"2023-08-12T14:00:00Z","league_id":47,"season_year":2023,
             "home_team_id":2,"away_team_id":1},
            {"fixture_id":3,"kickoff":"2023-08-12T14:00:00Z","league_id":87,"season_year":2023,
             "home_team_id":5,"away_team_id":6}
        ]"#;
        fs::write(&path, raw).unwrap();

        let source = JsonMatchSource::new(&path);
        assert_eq!(source.load_all().unwrap().len(), 3);
        let ids: Vec<u64> = source
            .load_season(SeasonKey::new(47, 2023), 1)
            .unwrap()
            .iter()
            .map(|m| m.fixture_id)
            .collect();
        assert_eq!(ids, vec![2]);
        let _ = fs::remove_file(&path);
    }
}
