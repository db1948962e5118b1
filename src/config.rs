use std::path::PathBuf;

use anyhow::{Result, anyhow};
use chrono::Duration;

use crate::analyzer::AnalyzerConfig;
use crate::elo::EloConfig;
use crate::orchestrator::{StaleAction, StalePolicy};

const APP_DIR: &str = "season_backtest";
const DB_FILE: &str = "backtest.sqlite";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub warmup_seasons: u16,
    pub stale: StalePolicy,
    pub analyzer: AnalyzerConfig,
}

impl Config {
    /// Reads `BACKTEST_*` variables from the process environment (after `.env`, if any).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let db_path = lookup("BACKTEST_DB_PATH")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| app_cache_dir(&lookup).map(|dir| dir.join(DB_FILE)))
            .ok_or_else(|| anyhow!("unable to resolve database path (set BACKTEST_DB_PATH)"))?;

        let warmup_seasons = parse_var::<u16>(&lookup, "BACKTEST_WARMUP_SEASONS")?
            .unwrap_or(2)
            .min(10);
        let stale_secs = parse_var::<i64>(&lookup, "BACKTEST_STALE_SECS")?
            .unwrap_or(900)
            .max(30);
        let action = match lookup("BACKTEST_STALE_ACTION")
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("") | Some("restart") => StaleAction::Restart,
            Some("fail") => StaleAction::Fail,
            Some(other) => {
                return Err(anyhow!(
                    "BACKTEST_STALE_ACTION must be `restart` or `fail`, got `{other}`"
                ));
            }
        };

        let defaults = EloConfig::default();
        let elo = EloConfig {
            k: parse_var::<f64>(&lookup, "BACKTEST_ELO_K")?
                .unwrap_or(defaults.k)
                .clamp(5.0, 60.0),
            home_adv_pts: parse_var::<f64>(&lookup, "BACKTEST_HOME_ADV_PTS")?
                .unwrap_or(defaults.home_adv_pts)
                .clamp(0.0, 150.0),
            season_carryover: parse_var::<f64>(&lookup, "BACKTEST_SEASON_CARRYOVER")?
                .unwrap_or(defaults.season_carryover)
                .clamp(0.0, 1.0),
        };
        let form_window = parse_var::<usize>(&lookup, "BACKTEST_FORM_WINDOW")?
            .unwrap_or(5)
            .clamp(1, 20);

        Ok(Self {
            db_path,
            warmup_seasons,
            stale: StalePolicy {
                stale_after: Duration::seconds(stale_secs),
                action,
            },
            analyzer: AnalyzerConfig { elo, form_window },
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>> {
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<T>()
        .map(Some)
        .map_err(|_| anyhow!("{name} has an unparseable value `{trimmed}`"))
}

fn app_cache_dir(lookup: &impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    // Prefer XDG cache.
    if let Some(base) = lookup("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(APP_DIR));
    }
    let home = lookup("HOME")?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_resolve_under_xdg_cache() {
        let cfg = Config::from_lookup(lookup(&[("XDG_CACHE_HOME", "/tmp/xdg")])).unwrap();
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/xdg/season_backtest/backtest.sqlite"));
        assert_eq!(cfg.warmup_seasons, 2);
        assert_eq!(cfg.stale.stale_after, Duration::seconds(900));
        assert_eq!(cfg.stale.action, StaleAction::Restart);
        assert_eq!(cfg.analyzer, AnalyzerConfig::default());
    }

    #[test]
    fn values_are_clamped() {
        let cfg = Config::from_lookup(lookup(&[
            ("BACKTEST_DB_PATH", "/data/bt.sqlite"),
            ("BACKTEST_STALE_SECS", "1"),
            ("BACKTEST_ELO_K", "500"),
            ("BACKTEST_FORM_WINDOW", "0"),
            ("BACKTEST_STALE_ACTION", "FAIL"),
        ]))
        .unwrap();
        assert_eq!(cfg.db_path, PathBuf::from("/data/bt.sqlite"));
        assert_eq!(cfg.stale.stale_after, Duration::seconds(30));
        assert_eq!(cfg.stale.action, StaleAction::Fail);
        assert_eq!(cfg.analyzer.elo.k, 60.0);
        assert_eq!(cfg.analyzer.form_window, 1);
    }

    #[test]
    fn garbage_values_are_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("HOME", "/home/u"),
            ("BACKTEST_WARMUP_SEASONS", "lots"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("BACKTEST_WARMUP_SEASONS"));
        assert!(
            Config::from_lookup(lookup(&[("HOME", "/home/u"), ("BACKTEST_STALE_ACTION", "x")]))
                .is_err()
        );
    }

    #[test]
    fn missing_home_and_path_is_an_error() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
    }
}
