use crate::calibration::{self, Prob3};
use crate::team_state::TeamState;
use crate::types::LeagueSnapshot;

/// Pre-match outcome model.
///
/// Implementations must be pure: the same team and league state always yields the same
/// distribution, and nothing beyond the arguments may be consulted.
pub trait Predictor: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, home: &TeamState, away: &TeamState, league: &LeagueSnapshot) -> Prob3;
}

/// Elo difference plus recent goal-difference form, mapped to Poisson goal rates with the
/// Dixon-Coles low-score correction.
#[derive(Debug, Clone, Copy)]
pub struct EloPoissonPredictor {
    pub goals_per_100_elo: f64,
    pub form_weight: f64,
    pub form_window: usize,
}

impl Default for EloPoissonPredictor {
    fn default() -> Self {
        Self {
            goals_per_100_elo: 0.30,
            form_weight: 0.15,
            form_window: 5,
        }
    }
}

impl EloPoissonPredictor {
    pub fn with_form_window(form_window: usize) -> Self {
        Self {
            form_window: form_window.max(1),
            ..Self::default()
        }
    }

    fn form_signal(&self, team: &TeamState) -> f64 {
        // Trust form in proportion to how full the window is.
        let fill = (team.recent.len() as f64 / self.form_window.max(1) as f64).clamp(0.0, 1.0);
        team.form_goal_diff().clamp(-3.0, 3.0) * fill
    }

    pub fn goal_rates(
        &self,
        home: &TeamState,
        away: &TeamState,
        league: &LeagueSnapshot,
    ) -> (f64, f64) {
        let elo_term = self.goals_per_100_elo * (home.elo - away.elo) / 100.0;
        let form_term = self.form_weight * (self.form_signal(home) - self.form_signal(away));
        let diff = league.home_adv_goals + elo_term + form_term;
        let lambda_home = ((league.goals_total_base / 2.0) + (diff / 2.0)).clamp(0.20, 3.80);
        let lambda_away = ((league.goals_total_base / 2.0) - (diff / 2.0)).clamp(0.20, 3.80);
        (lambda_home, lambda_away)
    }
}

impl Predictor for EloPoissonPredictor {
    fn name(&self) -> &str {
        "elo_poisson_dc"
    }

    fn predict(&self, home: &TeamState, away: &TeamState, league: &LeagueSnapshot) -> Prob3 {
        let (lambda_home, lambda_away) = self.goal_rates(home, away, league);
        calibration::outcome_probs_poisson_dc(lambda_home, lambda_away, 10, league.dc_rho)
    }
}
