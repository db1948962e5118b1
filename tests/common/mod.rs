#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};

use season_backtest::{MatchRecord, MatchStatus};

pub const LEAGUE: u32 = 47;

pub fn at(season: u16, day_offset: i64, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(season as i32, 8, 1, hour, 0, 0).unwrap() + Duration::days(day_offset)
}

pub fn played(
    fixture_id: u64,
    season: u16,
    kickoff: DateTime<Utc>,
    home: u32,
    away: u32,
    score: (u8, u8),
) -> MatchRecord {
    MatchRecord {
        fixture_id,
        kickoff,
        league_id: LEAGUE,
        season_year: season,
        home_team_id: Some(home),
        away_team_id: Some(away),
        home_team: format!("Team {home}"),
        away_team: format!("Team {away}"),
        round: Some(format!("R{}", fixture_id % 38 + 1)),
        goals_home: Some(score.0),
        goals_away: Some(score.1),
        status: MatchStatus::Finished,
    }
}

pub fn unplayed(
    fixture_id: u64,
    season: u16,
    kickoff: DateTime<Utc>,
    home: u32,
    away: u32,
) -> MatchRecord {
    MatchRecord {
        goals_home: None,
        goals_away: None,
        status: MatchStatus::Scheduled,
        ..played(fixture_id, season, kickoff, home, away, (0, 0))
    }
}

/// Three warm-up results in 2022 and four 2023 fixtures, the third not yet played.
pub fn three_plus_four() -> Vec<MatchRecord> {
    vec![
        played(1, 2022, at(2022, 0, 15), 1, 2, (2, 0)),
        played(2, 2022, at(2022, 7, 15), 3, 4, (1, 1)),
        played(3, 2022, at(2022, 14, 15), 2, 3, (0, 3)),
        played(11, 2023, at(2023, 0, 15), 1, 3, (1, 0)),
        played(12, 2023, at(2023, 7, 15), 4, 2, (2, 2)),
        unplayed(13, 2023, at(2023, 14, 15), 3, 1),
        played(14, 2023, at(2023, 21, 15), 2, 1, (0, 1)),
    ]
}

/// A full double round robin per season with deterministic scores.
pub fn round_robin(seasons: std::ops::RangeInclusive<u16>, teams: u32) -> Vec<MatchRecord> {
    let mut out = Vec::new();
    let mut fixture_id = 100u64;
    for season in seasons {
        let mut slot = 0i64;
        for home in 1..=teams {
            for away in 1..=teams {
                if home == away {
                    continue;
                }
                let mix = (home * 7 + away * 13 + season as u32) % 9;
                out.push(played(
                    fixture_id,
                    season,
                    at(season, slot / 3, 15),
                    home,
                    away,
                    ((mix % 4) as u8, (mix % 3) as u8),
                ));
                fixture_id += 1;
                slot += 1;
            }
        }
    }
    out
}
