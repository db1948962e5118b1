use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use season_backtest::config::Config;
use season_backtest::export::export_predictions_xlsx;
use season_backtest::historical_dataset::SqliteMatchSource;
use season_backtest::persist::SqliteCache;
use season_backtest::source::read_records;
use season_backtest::{
    AnalysisProgress, Orchestrator, Prediction, ProgressLookup, SeasonKey, TriggerOutcome,
};

#[derive(Debug, Parser)]
#[command(name = "season_backtest")]
#[command(about = "Leakage-free chronological backtests of football match predictions", long_about = None)]
struct Cli {
    /// Sqlite file holding matches and cached analyses (overrides BACKTEST_DB_PATH)
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load a JSON array of match records into the match store
    Import { file: PathBuf },
    /// Analyse one season, or serve the cached analysis
    Run {
        #[arg(long)]
        league: u32,
        #[arg(long)]
        season: u16,
        /// Drop the cached analysis first
        #[arg(long)]
        refresh: bool,
        /// Also write the predictions to an xlsx workbook
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Show the progress record of a season
    Progress {
        #[arg(long)]
        league: u32,
        #[arg(long)]
        season: u16,
    },
    /// Print stored predictions for a season or a single fixture
    Predictions {
        #[arg(long, required_unless_present = "fixture")]
        league: Option<u32>,
        #[arg(long, required_unless_present = "fixture")]
        season: Option<u16>,
        #[arg(long, conflicts_with_all = ["league", "season"])]
        fixture: Option<u64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    debug!("args: {cli:?}");

    let mut config = Config::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    info!("using {}", config.db_path.display());

    let source = SqliteMatchSource::open(&config.db_path)?;
    if let Command::Import { file } = &cli.command {
        let records = read_records(file)?;
        let written = source.upsert_matches(&records)?;
        println!("imported {written} match records from {}", file.display());
        return Ok(());
    }

    let cache = SqliteCache::open(&config.db_path)
        .with_context(|| format!("open prediction cache {}", config.db_path.display()))?;
    let orchestrator = Orchestrator::from_config(cache, source, &config);

    match cli.command {
        Command::Import { .. } => Ok(()),
        Command::Run {
            league,
            season,
            refresh,
            export,
        } => {
            let key = SeasonKey::new(league, season);
            if refresh {
                orchestrator.invalidate(key)?;
            }
            let outcome = orchestrator.trigger_analysis(key)?;
            let report = match outcome {
                TriggerOutcome::InProgress(progress) => {
                    println!("{key}: another run is in progress");
                    print_progress(&progress);
                    return Ok(());
                }
                TriggerOutcome::Cached(report) => {
                    println!("{key}: served from cache");
                    report
                }
                TriggerOutcome::Computed(report) => {
                    println!("{key}: computed");
                    report
                }
            };
            let v = &report.validation;
            println!(
                "predictions={} finished={} correct={} accuracy={:.4} brier={:.4} log_loss={:.4}",
                v.total_matches,
                v.finished_matches,
                v.correct_predictions,
                v.accuracy,
                v.brier,
                v.log_loss
            );
            if let Some(path) = export {
                let summary = export_predictions_xlsx(&path, &report)?;
                println!(
                    "exported {} predictions and {} ratings to {}",
                    summary.predictions,
                    summary.ratings,
                    path.display()
                );
            }
            Ok(())
        }
        Command::Progress { league, season } => {
            match orchestrator.poll_progress(SeasonKey::new(league, season))? {
                ProgressLookup::Found(progress) => print_progress(&progress),
                ProgressLookup::NotFound => println!("no analysis recorded"),
            }
            Ok(())
        }
        Command::Predictions {
            league,
            season,
            fixture,
        } => {
            if let Some(fixture_id) = fixture {
                match orchestrator.read_prediction(fixture_id)? {
                    Some(p) => print_prediction(&p),
                    None => println!("no prediction for fixture {fixture_id}"),
                }
                return Ok(());
            }
            let (Some(league), Some(season)) = (league, season) else {
                return Err(anyhow!("--league and --season are required without --fixture"));
            };
            let view = orchestrator.read_predictions(SeasonKey::new(league, season))?;
            if view.stale {
                println!("(cache unreachable, showing last known predictions)");
            }
            for p in &view.predictions {
                print_prediction(p);
            }
            match view.validation {
                Some(v) => println!(
                    "accuracy={:.4} over {} finished of {}",
                    v.accuracy, v.finished_matches, v.total_matches
                ),
                None => println!("no completed model for this season"),
            }
            Ok(())
        }
    }
}

fn print_progress(p: &AnalysisProgress) {
    println!(
        "{} {}/{} ({:.1}%) correct={}/{} accuracy={:.4} updated={}",
        p.status.as_str(),
        p.processed_matches,
        p.total_matches,
        p.percentage,
        p.correct_predictions,
        p.finished_matches,
        p.running_accuracy,
        p.updated_at.to_rfc3339()
    );
    if let Some(last) = &p.last_match {
        println!("last: {last}");
    }
    if let Some(message) = &p.message {
        println!("message: {message}");
    }
}

fn print_prediction(p: &Prediction) {
    let actual = p
        .actual_result
        .map(|o| o.code().to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{} {} {} vs {} H={:.3} D={:.3} A={:.3} pick={} actual={}",
        p.fixture_id,
        p.kickoff.format("%Y-%m-%d %H:%M"),
        p.home_team,
        p.away_team,
        p.probs.home,
        p.probs.draw,
        p.probs.away,
        p.predicted.code(),
        actual
    );
}
