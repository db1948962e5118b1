use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    pub fn code(self) -> char {
        match self {
            Outcome::Home => 'H',
            Outcome::Draw => 'D',
            Outcome::Away => 'A',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prob3 {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

impl Prob3 {
    pub fn uniform() -> Self {
        Self {
            home: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away: 1.0 / 3.0,
        }
    }

    pub fn of(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }
}

pub fn classify_outcome(home_goals: u8, away_goals: u8) -> Outcome {
    if home_goals > away_goals {
        Outcome::Home
    } else if home_goals < away_goals {
        Outcome::Away
    } else {
        Outcome::Draw
    }
}

pub fn evaluate_probs(predictions: &[Prob3], outcomes: &[Outcome]) -> Metrics {
    if predictions.is_empty() || outcomes.is_empty() || predictions.len() != outcomes.len() {
        return Metrics::default();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let y = one_hot(*outcome);
        brier_sum +=
            (p.home - y.home).powi(2) + (p.draw - y.draw).powi(2) + (p.away - y.away).powi(2);

        let actual_prob = p.of(*outcome).clamp(1e-12, 1.0);
        log_loss_sum += -actual_prob.ln();

        if argmax(*p) == *outcome {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

/// Grid search for the Dixon-Coles rho that reproduces an observed draw rate.
pub fn fit_dc_rho_to_draw_rate(goals_total_base: f64, home_adv_goals: f64, draw_rate: f64) -> f64 {
    let target = draw_rate.clamp(0.05, 0.60);
    let mut best_rho = -0.10;
    let mut best_err = f64::INFINITY;

    for rho_steps in -25..=5 {
        let rho = rho_steps as f64 / 100.0;
        let p = probs_from_params(goals_total_base, home_adv_goals, rho);
        let err = (p.draw - target).abs();
        if err < best_err {
            best_err = err;
            best_rho = rho;
        }
    }
    best_rho
}

pub fn probs_from_params(goals_total_base: f64, home_adv_goals: f64, rho: f64) -> Prob3 {
    let lambda_home = ((goals_total_base + home_adv_goals) / 2.0).clamp(0.20, 3.80);
    let lambda_away = ((goals_total_base - home_adv_goals) / 2.0).clamp(0.20, 3.80);
    outcome_probs_poisson_dc(lambda_home, lambda_away, 10, rho)
}

pub fn outcome_probs_poisson_dc(
    lambda_home: f64,
    lambda_away: f64,
    max_goals: u32,
    rho: f64,
) -> Prob3 {
    let mut p_home = 0.0_f64;
    let mut p_draw = 0.0_f64;
    let mut p_away = 0.0_f64;

    for h in 0..=max_goals {
        for a in 0..=max_goals {
            let base = poisson_pmf(h, lambda_home) * poisson_pmf(a, lambda_away);
            let p = (base * dc_tau(h, a, lambda_home, lambda_away, rho)).max(0.0);
            if h > a {
                p_home += p;
            } else if h == a {
                p_draw += p;
            } else {
                p_away += p;
            }
        }
    }

    let sum = (p_home + p_draw + p_away).max(1e-12);
    Prob3 {
        home: p_home / sum,
        draw: p_draw / sum,
        away: p_away / sum,
    }
}

/// Most likely outcome; ties go to home, then draw.
pub fn argmax(p: Prob3) -> Outcome {
    if p.home >= p.draw && p.home >= p.away {
        Outcome::Home
    } else if p.draw >= p.away {
        Outcome::Draw
    } else {
        Outcome::Away
    }
}

fn dc_tau(home_goals: u32, away_goals: u32, lambda_home: f64, lambda_away: f64, rho: f64) -> f64 {
    match (home_goals, away_goals) {
        (0, 0) => 1.0 - lambda_home * lambda_away * rho,
        (0, 1) => 1.0 + lambda_home * rho,
        (1, 0) => 1.0 + lambda_away * rho,
        (1, 1) => 1.0 - rho,
        _ => 1.0,
    }
}

fn poisson_pmf(goals: u32, lambda: f64) -> f64 {
    let numer = lambda.powi(goals as i32) * (-lambda).exp();
    let denom = (1..=goals).fold(1.0_f64, |acc, k| acc * k as f64).max(1.0);
    numer / denom
}

fn one_hot(outcome: Outcome) -> Prob3 {
    match outcome {
        Outcome::Home => Prob3 {
            home: 1.0,
            draw: 0.0,
            away: 0.0,
        },
        Outcome::Draw => Prob3 {
            home: 0.0,
            draw: 1.0,
            away: 0.0,
        },
        Outcome::Away => Prob3 {
            home: 0.0,
            draw: 0.0,
            away: 1.0,
        },
    }
}
