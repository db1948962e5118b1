//! Durable prediction cache on sqlite.
//!
//! Each slot stores its value as a JSON payload next to the columns needed for lookups, so the
//! schema does not change when the payload types grow fields.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};

use crate::cache::PredictionCache;
use crate::error::CacheError;
use crate::types::{AnalysisProgress, Model, Prediction, ProgressLookup, SeasonKey};

pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Unavailable("sqlite cache lock poisoned".to_string()))
    }
}

pub fn init_schema(conn: &Connection) -> Result<(), CacheError> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS models (
            league_id INTEGER NOT NULL,
            season_year INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            payload TEXT NOT NULL,
            PRIMARY KEY (league_id, season_year)
        );
        CREATE TABLE IF NOT EXISTS predictions (
            fixture_id INTEGER PRIMARY KEY,
            league_id INTEGER NOT NULL,
            season_year INTEGER NOT NULL,
            seq INTEGER NOT NULL,
            payload TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_predictions_season
            ON predictions(league_id, season_year, seq);
        CREATE TABLE IF NOT EXISTS analysis_progress (
            league_id INTEGER NOT NULL,
            season_year INTEGER NOT NULL,
            status TEXT NOT NULL,
            started_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            processed_matches INTEGER NOT NULL,
            payload TEXT NOT NULL,
            PRIMARY KEY (league_id, season_year)
        );
        "#,
    )?;
    Ok(())
}

impl PredictionCache for SqliteCache {
    fn get_model(&self, key: SeasonKey) -> Result<Option<Model>, CacheError> {
        let conn = self.conn()?;
        let payload = conn
            .query_row(
                "SELECT payload FROM models WHERE league_id = ?1 AND season_year = ?2",
                params![key.league_id as i64, key.season_year as i64],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        match payload {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn store_model(&self, model: &Model) -> Result<(), CacheError> {
        let payload = serde_json::to_string(model)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO models (league_id, season_year, created_at, payload)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(league_id, season_year) DO UPDATE SET
                created_at = excluded.created_at,
                payload = excluded.payload
            "#,
            params![
                model.league_id as i64,
                model.season_year as i64,
                model.created_at.to_rfc3339(),
                payload
            ],
        )?;
        Ok(())
    }

    fn get_all_predictions(&self, key: SeasonKey) -> Result<Vec<Prediction>, CacheError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT payload FROM predictions
            WHERE league_id = ?1 AND season_year = ?2
            ORDER BY seq ASC
            "#,
        )?;
        let rows = stmt.query_map(
            params![key.league_id as i64, key.season_year as i64],
            |row| row.get::<_, String>(0),
        )?;

        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    fn store_predictions(
        &self,
        key: SeasonKey,
        predictions: &[Prediction],
    ) -> Result<(), CacheError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM predictions WHERE league_id = ?1 AND season_year = ?2",
            params![key.league_id as i64, key.season_year as i64],
        )?;
        for (seq, p) in predictions.iter().enumerate() {
            let payload = serde_json::to_string(p)?;
            tx.execute(
                r#"
                INSERT OR REPLACE INTO predictions (fixture_id, league_id, season_year, seq, payload)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    p.fixture_id as i64,
                    key.league_id as i64,
                    key.season_year as i64,
                    seq as i64,
                    payload
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get_prediction(&self, fixture_id: u64) -> Result<Option<Prediction>, CacheError> {
        let conn = self.conn()?;
        let payload = conn
            .query_row(
                "SELECT payload FROM predictions WHERE fixture_id = ?1",
                params![fixture_id as i64],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        match payload {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn store_analysis_progress(&self, progress: &AnalysisProgress) -> Result<(), CacheError> {
        let payload = serde_json::to_string(progress)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO analysis_progress (
                league_id, season_year, status, started_at, updated_at, processed_matches, payload
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(league_id, season_year) DO UPDATE SET
                status = excluded.status,
                started_at = excluded.started_at,
                updated_at = excluded.updated_at,
                processed_matches = excluded.processed_matches,
                payload = excluded.payload
            WHERE analysis_progress.started_at != excluded.started_at
               OR excluded.status != 'running'
               OR excluded.processed_matches >= analysis_progress.processed_matches
            "#,
            params![
                progress.league_id as i64,
                progress.season_year as i64,
                progress.status.as_str(),
                progress.started_at.to_rfc3339(),
                progress.updated_at.to_rfc3339(),
                progress.processed_matches as i64,
                payload
            ],
        )?;
        Ok(())
    }

    fn get_analysis_progress(&self, key: SeasonKey) -> Result<ProgressLookup, CacheError> {
        let conn = self.conn()?;
        let payload = conn
            .query_row(
                "SELECT payload FROM analysis_progress WHERE league_id = ?1 AND season_year = ?2",
                params![key.league_id as i64, key.season_year as i64],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        match payload {
            Some(raw) => Ok(ProgressLookup::Found(serde_json::from_str(&raw)?)),
            None => Ok(ProgressLookup::NotFound),
        }
    }

    fn invalidate(&self, key: SeasonKey) -> Result<(), CacheError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for table in ["models", "predictions", "analysis_progress"] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE league_id = ?1 AND season_year = ?2"),
                params![key.league_id as i64, key.season_year as i64],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}
