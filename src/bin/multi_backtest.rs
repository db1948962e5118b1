use std::path::PathBuf;

use anyhow::{Result, anyhow};
use rayon::prelude::*;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use season_backtest::config::Config;
use season_backtest::historical_dataset::SqliteMatchSource;
use season_backtest::persist::SqliteCache;
use season_backtest::{AnalysisError, Orchestrator, SeasonKey, TriggerOutcome, ValidationResult};

const DEFAULT_LEAGUE_IDS: &[u32] = &[47, 87, 54, 55, 53];

#[derive(Debug, clap::Parser)]
struct Args {
    /// Season to analyse in every league
    #[arg(long)]
    season: u16,
    /// Comma separated league ids
    #[arg(long, value_delimiter = ',')]
    league_ids: Vec<u32>,
    /// Sqlite file (overrides BACKTEST_DB_PATH)
    #[arg(long)]
    db: Option<PathBuf>,
}

#[derive(Debug)]
enum LeagueResult {
    Done { cached: bool, validation: ValidationResult },
    Busy { processed: usize, total: usize },
    Failed(AnalysisError),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = <Args as clap::Parser>::parse();
    let mut league_ids = if args.league_ids.is_empty() {
        DEFAULT_LEAGUE_IDS.to_vec()
    } else {
        args.league_ids.clone()
    };
    league_ids.sort_unstable();
    league_ids.dedup();

    let mut config = Config::from_env()?;
    if let Some(db) = args.db {
        config.db_path = db;
    }

    let source = SqliteMatchSource::open(&config.db_path)?;
    let cache = SqliteCache::open(&config.db_path)?;
    let orchestrator = Orchestrator::from_config(cache, source, &config);

    let results: Vec<(u32, LeagueResult)> = league_ids
        .par_iter()
        .map(|&league_id| {
            let key = SeasonKey::new(league_id, args.season);
            let result = match orchestrator.trigger_analysis(key) {
                Ok(TriggerOutcome::Cached(report)) => LeagueResult::Done {
                    cached: true,
                    validation: report.validation,
                },
                Ok(TriggerOutcome::Computed(report)) => LeagueResult::Done {
                    cached: false,
                    validation: report.validation,
                },
                Ok(TriggerOutcome::InProgress(p)) => LeagueResult::Busy {
                    processed: p.processed_matches,
                    total: p.total_matches,
                },
                Err(err) => {
                    warn!("{key}: {err}");
                    LeagueResult::Failed(err)
                }
            };
            (league_id, result)
        })
        .collect();

    println!("Multi-league season backtest");
    println!("DB: {}", config.db_path.display());
    println!("Season: {}", args.season);
    println!();

    let mut total_finished = 0usize;
    let mut total_correct = 0usize;
    for (league_id, result) in &results {
        match result {
            LeagueResult::Done { cached, validation } => {
                total_finished += validation.finished_matches;
                total_correct += validation.correct_predictions;
                println!(
                    "league {league_id} predictions={} finished={} accuracy={:.4} brier={:.4} ll={:.4}{}",
                    validation.total_matches,
                    validation.finished_matches,
                    validation.accuracy,
                    validation.brier,
                    validation.log_loss,
                    if *cached { " (cached)" } else { "" }
                );
            }
            LeagueResult::Busy { processed, total } => {
                println!("league {league_id} in progress {processed}/{total}");
            }
            LeagueResult::Failed(err) => println!("league {league_id} failed: {err}"),
        }
    }

    if total_finished == 0 {
        return Err(anyhow!("no league produced resolved predictions"));
    }
    println!();
    println!(
        "aggregate finished={} correct={} accuracy={:.4}",
        total_finished,
        total_correct,
        total_correct as f64 / total_finished as f64
    );
    Ok(())
}
