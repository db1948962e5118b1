use serde::{Deserialize, Serialize};

use crate::calibration::Outcome;

pub const BASE_RATING: f64 = 1500.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EloConfig {
    pub k: f64,
    pub home_adv_pts: f64,
    // Share of a rating's distance from the base kept across a season boundary.
    pub season_carryover: f64,
}

impl Default for EloConfig {
    fn default() -> Self {
        Self {
            k: 20.0,
            home_adv_pts: 60.0,
            season_carryover: 0.80,
        }
    }
}

impl EloConfig {
    /// Rating points moved from away to home for one result.
    pub fn home_delta(&self, home: f64, away: f64, outcome: Outcome) -> f64 {
        let expected_home = expected_score(home + self.home_adv_pts, away);
        let s_home = match outcome {
            Outcome::Home => 1.0,
            Outcome::Draw => 0.5,
            Outcome::Away => 0.0,
        };
        self.k * (s_home - expected_home)
    }

    pub fn carry_over(&self, rating: f64) -> f64 {
        BASE_RATING + self.season_carryover.clamp(0.0, 1.0) * (rating - BASE_RATING)
    }
}

pub fn expected_score(r_a: f64, r_b: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf(-(r_a - r_b) / 400.0))
}
