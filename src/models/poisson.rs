//! Poisson goal model.
//!
//! Expected goals per side are built from league-average scoring and each
//! team's recent attack/defense ratios, then two independent truncated
//! Poisson distributions give scoreline-derived probabilities (BTTS,
//! Over/Under at the fixed lines).

/// Fixed multiplicative home advantage applied to the home side's λ.
const HOME_ADVANTAGE: f64 = 1.1;

/// Goal counts beyond this are ignored in all sums. The tail above 6 goals
/// per side is negligible for football scorelines.
const MAX_GOALS: usize = 6;

/// Expected goals for both sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpectedGoals {
    pub lambda_home: f64,
    pub lambda_away: f64,
}

/// Scoreline-derived probabilities. `under_*` is always `1 − over_*`
/// (a total exactly on the line counts toward neither side here).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScorelineProbabilities {
    pub btts: f64,
    pub over15: f64,
    pub over25: f64,
    pub over35: f64,
    pub under15: f64,
    pub under25: f64,
    pub under35: f64,
}

impl ScorelineProbabilities {
    pub fn over(&self, line: f64) -> f64 {
        if line < 2.0 {
            self.over15
        } else if line < 3.0 {
            self.over25
        } else {
            self.over35
        }
    }
}

/// Poisson probability mass: λ^k · e^(−λ) / k!
pub fn poisson_pmf(k: usize, lambda: f64) -> f64 {
    let mut factorial = 1.0;
    for i in 2..=k {
        factorial *= i as f64;
    }
    lambda.powi(k as i32) * (-lambda).exp() / factorial
}

/// λhome = leagueAvg × homeAttack × awayDefenseWeakness × 1.1;
/// λaway = leagueAvg × awayAttack × homeDefenseWeakness (no advantage).
///
/// Attack/defense ratios are each team's recent per-match goals for/against
/// divided by half the league average, so 1.0 means league-average.
pub fn expected_goals(
    league_avg_goals: f64,
    home_attack: f64,
    away_defense_weakness: f64,
    away_attack: f64,
    home_defense_weakness: f64,
) -> ExpectedGoals {
    ExpectedGoals {
        lambda_home: league_avg_goals * home_attack * away_defense_weakness * HOME_ADVANTAGE,
        lambda_away: league_avg_goals * away_attack * home_defense_weakness,
    }
}

/// Joint scoreline probabilities from two independent Poisson sides,
/// truncated at 6 goals each.
pub fn scoreline_probabilities(lambda_home: f64, lambda_away: f64) -> ScorelineProbabilities {
    let mut p_home = [0.0; MAX_GOALS + 1];
    let mut p_away = [0.0; MAX_GOALS + 1];
    for k in 0..=MAX_GOALS {
        p_home[k] = poisson_pmf(k, lambda_home);
        p_away[k] = poisson_pmf(k, lambda_away);
    }

    // BTTS by inclusion-exclusion on the zero-goal events.
    let btts = 1.0 - p_home[0] - p_away[0] + p_home[0] * p_away[0];

    let mut over15 = 0.0;
    let mut over25 = 0.0;
    let mut over35 = 0.0;
    for i in 0..=MAX_GOALS {
        for j in 0..=MAX_GOALS {
            let joint = p_home[i] * p_away[j];
            let total = (i + j) as f64;
            if total > 1.5 {
                over15 += joint;
            }
            if total > 2.5 {
                over25 += joint;
            }
            if total > 3.5 {
                over35 += joint;
            }
        }
    }

    ScorelineProbabilities {
        btts,
        over15,
        over25,
        over35,
        under15: 1.0 - over15,
        under25: 1.0 - over25,
        under35: 1.0 - over35,
    }
}

/// Like [`scoreline_probabilities`] but with the low-scoring BTTS penalty:
/// ×0.90 when the weaker side's λ is below 0.90, and a further ×0.92 when the
/// league averages under 1.15 goals per team. Both penalties apply to the
/// finished btts value, not to the λs.
pub fn scoreline_probabilities_with_penalty(
    lambda_home: f64,
    lambda_away: f64,
    league_avg_goals_per_team: f64,
) -> ScorelineProbabilities {
    let mut probs = scoreline_probabilities(lambda_home, lambda_away);
    if lambda_home.min(lambda_away) < 0.90 {
        probs.btts *= 0.90;
    }
    if league_avg_goals_per_team < 1.15 {
        probs.btts *= 0.92;
    }
    probs
}
