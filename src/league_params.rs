use crate::calibration;
use crate::types::LeagueSnapshot;

const DEFAULT_GOALS_TOTAL: f64 = 2.60;
const DEFAULT_HOME_ADV_GOALS: f64 = 0.15;
const DEFAULT_DC_RHO: f64 = -0.10;
// Sample size at which observed league averages fully replace the defaults.
const MIN_N: f64 = 200.0;

/// Running league-wide aggregates over resolved matches seen so far in a replay.
#[derive(Debug, Clone, Default)]
pub struct LeagueState {
    sample_matches: usize,
    draws: usize,
    total_goals: f64,
    home_minus_away: f64,
}

impl LeagueState {
    pub fn record(&mut self, home_goals: u8, away_goals: u8) {
        self.total_goals += home_goals as f64 + away_goals as f64;
        self.home_minus_away += home_goals as f64 - away_goals as f64;
        if home_goals == away_goals {
            self.draws += 1;
        }
        self.sample_matches += 1;
    }

    pub fn sample_matches(&self) -> usize {
        self.sample_matches
    }

    /// League parameters shrunk toward defaults for small samples.
    pub fn snapshot(&self) -> LeagueSnapshot {
        let n = self.sample_matches;
        let mut goals_total_base = DEFAULT_GOALS_TOTAL;
        let mut home_adv_goals = DEFAULT_HOME_ADV_GOALS;
        let mut draw_rate = 0.0;
        if n > 0 {
            goals_total_base = self.total_goals / n as f64;
            home_adv_goals = self.home_minus_away / n as f64;
            draw_rate = self.draws as f64 / n as f64;
        }

        let w = (n as f64 / MIN_N).clamp(0.0, 1.0);
        goals_total_base = (1.0 - w) * DEFAULT_GOALS_TOTAL + w * goals_total_base;
        home_adv_goals = (1.0 - w) * DEFAULT_HOME_ADV_GOALS + w * home_adv_goals;

        let mut dc_rho = DEFAULT_DC_RHO;
        if n > 0 {
            dc_rho =
                calibration::fit_dc_rho_to_draw_rate(goals_total_base, home_adv_goals, draw_rate);
        }
        dc_rho = (1.0 - w) * DEFAULT_DC_RHO + w * dc_rho;

        LeagueSnapshot {
            sample_matches: n,
            goals_total_base,
            home_adv_goals,
            draw_rate,
            dc_rho,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_league_uses_defaults() {
        let s = LeagueState::default().snapshot();
        assert_eq!(s.sample_matches, 0);
        assert!((s.goals_total_base - DEFAULT_GOALS_TOTAL).abs() < 1e-12);
        assert!((s.dc_rho - DEFAULT_DC_RHO).abs() < 1e-12);
    }

    #[test]
    fn small_samples_are_shrunk_toward_defaults() {
        let mut league = LeagueState::default();
        for _ in 0..10 {
            league.record(5, 0);
        }
        let s = league.snapshot();
        assert_eq!(s.sample_matches, 10);
        // 10 / 200 of the way from 2.60 to 5.0.
        assert!((s.goals_total_base - 2.72).abs() < 1e-9);
        assert!((s.home_adv_goals - 0.3925).abs() < 1e-9);
        assert_eq!(s.draw_rate, 0.0);
    }
}
