//! Sqlite store of historical match records, usable as a [`MatchSource`].

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use crate::source::MatchSource;
use crate::types::{MatchRecord, MatchStatus, SeasonKey};

pub struct SqliteMatchSource {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteMatchSource {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_db(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Inserts or refreshes records in one transaction; returns the number written.
    pub fn upsert_matches(&self, records: &[MatchRecord]) -> Result<usize> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("match store lock poisoned"))?;
        let tx = conn.transaction().context("begin upsert transaction")?;
        for record in records {
            upsert_match(&tx, record)?;
        }
        tx.commit().context("commit upsert transaction")?;
        Ok(records.len())
    }
}

impl MatchSource for SqliteMatchSource {
    fn load_season(&self, key: SeasonKey, warmup_seasons: u16) -> Result<Vec<MatchRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("match store lock poisoned"))?;
        load_league_seasons(
            &conn,
            key.league_id,
            key.season_year.saturating_sub(warmup_seasons),
            key.season_year,
        )
    }
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS matches (
            fixture_id INTEGER PRIMARY KEY,
            league_id INTEGER NOT NULL,
            season_year INTEGER NOT NULL,
            round TEXT NULL,
            kickoff TEXT NOT NULL,
            home_team_id INTEGER NULL,
            away_team_id INTEGER NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            goals_home INTEGER NULL,
            goals_away INTEGER NULL,
            status TEXT NOT NULL,
            outcome TEXT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_matches_league ON matches(league_id);
        CREATE INDEX IF NOT EXISTS idx_matches_season ON matches(season_year);
        CREATE INDEX IF NOT EXISTS idx_matches_kickoff ON matches(kickoff);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn load_league_seasons(
    conn: &Connection,
    league_id: u32,
    first_season: u16,
    last_season: u16,
) -> Result<Vec<MatchRecord>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                fixture_id, league_id, season_year, round, kickoff,
                home_team_id, away_team_id, home_team, away_team,
                goals_home, goals_away, status
            FROM matches
            WHERE league_id = ?1
              AND season_year BETWEEN ?2 AND ?3
            ORDER BY kickoff ASC, fixture_id ASC
            "#,
        )
        .context("prepare load matches query")?;

    let rows = stmt
        .query_map(
            params![league_id as i64, first_season as i64, last_season as i64],
            |row| {
                Ok((
                    row.get::<_, u64>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, u16>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<u32>>(5)?,
                    row.get::<_, Option<u32>>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, Option<u8>>(9)?,
                    row.get::<_, Option<u8>>(10)?,
                    row.get::<_, String>(11)?,
                ))
            },
        )
        .context("query load matches")?;

    let mut out = Vec::new();
    for row in rows {
        let (
            fixture_id,
            league_id,
            season_year,
            round,
            kickoff,
            home_team_id,
            away_team_id,
            home_team,
            away_team,
            goals_home,
            goals_away,
            status,
        ) = row.context("decode match row")?;
        let kickoff = DateTime::parse_from_rfc3339(&kickoff)
            .with_context(|| format!("invalid kickoff for fixture {fixture_id}: {kickoff}"))?
            .with_timezone(&Utc);
        out.push(MatchRecord {
            fixture_id,
            kickoff,
            league_id,
            season_year,
            home_team_id,
            away_team_id,
            home_team,
            away_team,
            round,
            goals_home,
            goals_away,
            status: MatchStatus::parse(&status).unwrap_or_default(),
        });
    }
    Ok(out)
}

fn upsert_match(tx: &rusqlite::Transaction<'_>, m: &MatchRecord) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO matches (
            fixture_id, league_id, season_year, round, kickoff,
            home_team_id, away_team_id, home_team, away_team,
            goals_home, goals_away, status, outcome, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8, ?9,
            ?10, ?11, ?12, ?13, ?14
        )
        ON CONFLICT(fixture_id) DO UPDATE SET
            league_id = excluded.league_id,
            season_year = excluded.season_year,
            round = excluded.round,
            kickoff = excluded.kickoff,
            home_team_id = excluded.home_team_id,
            away_team_id = excluded.away_team_id,
            home_team = excluded.home_team,
            away_team = excluded.away_team,
            goals_home = excluded.goals_home,
            goals_away = excluded.goals_away,
            status = excluded.status,
            outcome = excluded.outcome,
            updated_at = excluded.updated_at
        "#,
        params![
            m.fixture_id as i64,
            m.league_id as i64,
            m.season_year as i64,
            m.round,
            m.kickoff.to_rfc3339(),
            m.home_team_id.map(|id| id as i64),
            m.away_team_id.map(|id| id as i64),
            m.home_team,
            m.away_team,
            m.goals_home.map(|g| g as i64),
            m.goals_away.map(|g| g as i64),
            m.status.as_str(),
            m.outcome().map(|o| o.code().to_string()),
            Utc::now().to_rfc3339(),
        ],
    )
    .context("upsert match")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn record(fixture_id: u64, season_year: u16, day: u32) -> MatchRecord {
        MatchRecord {
            fixture_id,
            kickoff: Utc.with_ymd_and_hms(season_year as i32, 9, day, 15, 0, 0).unwrap(),
            league_id: 47,
            season_year,
            home_team_id: Some(1),
            away_team_id: Some(2),
            home_team: "A".to_string(),
            away_team: "B".to_string(),
            round: Some("1".to_string()),
            goals_home: Some(2),
            goals_away: Some(2),
            status: MatchStatus::Finished,
        }
    }

    #[test]
    fn upsert_then_load_window_roundtrips_in_kickoff_order() {
        let store = SqliteMatchSource::open_in_memory().unwrap();
        let records = vec![
            record(3, 2023, 20),
            record(1, 2023, 2),
            record(2, 2021, 5),
            record(4, 2019, 5),
        ];
        assert_eq!(store.upsert_matches(&records).unwrap(), 4);

        let mut changed = record(1, 2023, 2);
        changed.goals_home = None;
        changed.goals_away = None;
        changed.status = MatchStatus::Postponed;
        store.upsert_matches(&[changed]).unwrap();

        let loaded = store.load_season(SeasonKey::new(47, 2023), 2).unwrap();
        let ids: Vec<u64> = loaded.iter().map(|m| m.fixture_id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert_eq!(loaded[1].status, MatchStatus::Postponed);
        assert_eq!(loaded[1].goals_home, None);
        assert_eq!(loaded[0], record(2, 2021, 5));
    }
}
