use std::hint::black_box;

use chrono::{Duration, TimeZone, Utc};
use criterion::{Criterion, criterion_group, criterion_main};

use season_backtest::analyzer::HistoricalAnalyzer;
use season_backtest::{MatchRecord, MatchStatus, SeasonKey};

const TEAMS: u32 = 20;

/// Double round robin per season; scores come from a fixed mixing function.
fn synthetic_league(league_id: u32, seasons: std::ops::RangeInclusive<u16>) -> Vec<MatchRecord> {
    let mut out = Vec::new();
    let mut fixture_id = 1u64;
    for season in seasons {
        let mut kickoff = Utc.with_ymd_and_hms(season as i32, 8, 10, 15, 0, 0).unwrap();
        for home in 1..=TEAMS {
            for away in 1..=TEAMS {
                if home == away {
                    continue;
                }
                let mix = (home * 31 + away * 17 + season as u32 * 7) % 11;
                out.push(MatchRecord {
                    fixture_id,
                    kickoff,
                    league_id,
                    season_year: season,
                    home_team_id: Some(home),
                    away_team_id: Some(away),
                    home_team: format!("Team {home}"),
                    away_team: format!("Team {away}"),
                    round: None,
                    goals_home: Some((mix % 4) as u8),
                    goals_away: Some((mix % 3) as u8),
                    status: MatchStatus::Finished,
                });
                fixture_id += 1;
                if fixture_id % 10 == 0 {
                    kickoff += Duration::days(3);
                }
            }
        }
    }
    out
}

fn bench_season_replay(c: &mut Criterion) {
    let records = synthetic_league(47, 2021..=2023);
    let analyzer = HistoricalAnalyzer::default();
    let key = SeasonKey::new(47, 2023);
    c.bench_function("season_replay_3x380", |b| {
        b.iter(|| {
            let predictions = analyzer.analyze(key, black_box(&records), |_| {}).unwrap();
            black_box(predictions.len());
        })
    });
}

fn bench_create_model(c: &mut Criterion) {
    let records = synthetic_league(47, 2021..=2023);
    let analyzer = HistoricalAnalyzer::default();
    let key = SeasonKey::new(47, 2023);
    let predictions = analyzer.analyze(key, &records, |_| {}).unwrap();
    c.bench_function("create_model", |b| {
        b.iter(|| {
            let model = analyzer.create_model(key, black_box(&predictions), black_box(&records));
            black_box(model.input_digest.len());
        })
    });
}

criterion_group!(benches, bench_season_replay, bench_create_model);
criterion_main!(benches);
