//! Fractional-Kelly staking with multiplicative risk guards.
//!
//! The Kelly formula sizes a bet to maximise the expected logarithm of
//! wealth. We never feed it the raw model probability: the probability is
//! first blended toward 50%, given a fixed safety haircut, and clamped to
//! [0.50, 0.90], then the raw fraction is scaled down by a fractional
//! multiplier and three state-derived risk multipliers, and finally clamped
//! by three independent caps (per-bet, daily risk, open exposure).

use serde::{Deserialize, Serialize};

use super::{BetCandidate, KellyConfig};
use crate::db::models::{Bankroll, BetResult};

/// Every intermediate quantity of the stake computation. Persisted with the
/// placed bet so the sizing can be inspected after the fact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KellyBreakdown {
    pub p_used: f64,
    pub raw_kelly: f64,
    pub fractional_kelly: f64,
    pub drawdown_multiplier: f64,
    pub loss_streak_multiplier: f64,
    pub form_multiplier: f64,
    pub final_stake_pct: f64,
    pub final_stake_amount: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StakeDecision {
    pub should_bet: bool,
    pub stake_pct: f64,
    pub stake_amount: f64,
    pub breakdown: KellyBreakdown,
}

/// Blend toward 50%, subtract the 3-point safety margin, clamp to [0.50, 0.90].
fn safety_adjusted_probability(model_prob: f64) -> f64 {
    let blended = 0.7 * model_prob + 0.3 * 0.50;
    (blended - 0.03).clamp(0.50, 0.90)
}

/// `max(0, (b·p − (1−p)) / b)` with `b = odds − 1`; 0 when there is no payout.
fn raw_kelly_fraction(p_used: f64, odds_decimal: f64) -> f64 {
    let b = odds_decimal - 1.0;
    if b <= 0.0 {
        return 0.0;
    }
    ((b * p_used - (1.0 - p_used)) / b).max(0.0)
}

/// Drawdown guard: the deeper below peak, the smaller the stake.
fn drawdown_multiplier(bankroll: &Bankroll) -> f64 {
    if bankroll.peak_bankroll <= 0.0 {
        return 1.0;
    }
    let drawdown = (bankroll.peak_bankroll - bankroll.current_bankroll) / bankroll.peak_bankroll;
    if drawdown >= 0.18 {
        0.25
    } else if drawdown >= 0.12 {
        0.50
    } else if drawdown >= 0.08 {
        0.75
    } else {
        1.0
    }
}

/// Loss-streak guard. Two wins in the most recent three results override the
/// streak counter entirely.
fn loss_streak_multiplier(bankroll: &Bankroll) -> f64 {
    let wins_in_last_3 = bankroll
        .last_results
        .iter()
        .take(3)
        .filter(|r| **r == BetResult::Win)
        .count();
    if wins_in_last_3 >= 2 {
        return 1.0;
    }
    if bankroll.consecutive_losses >= 5 {
        0.50
    } else if bankroll.consecutive_losses >= 3 {
        0.75
    } else {
        1.0
    }
}

/// Form guard: halve stakes when the rolling win rate drops below 60%.
/// Fewer than 20 results is insufficient data and leaves the stake alone.
fn form_multiplier(bankroll: &Bankroll) -> f64 {
    let n = bankroll.last_results.len();
    if n < 20 {
        return 1.0;
    }
    let wins = bankroll
        .last_results
        .iter()
        .filter(|r| **r == BetResult::Win)
        .count();
    if (wins as f64 / n as f64) < 0.60 {
        0.50
    } else {
        1.0
    }
}

/// Compute the recommended stake for a candidate against the current
/// bankroll state. `today` is the current UTC calendar date ("YYYY-MM-DD"),
/// used to decide whether the bankroll's daily risk counter has rolled over.
///
/// A zero stake is an expected outcome of the risk model, not an error:
/// `should_bet` is false and the caller simply declines to bet.
pub fn compute_stake_decision(
    candidate: &BetCandidate,
    bankroll: &Bankroll,
    config: &KellyConfig,
    today: &str,
) -> StakeDecision {
    let p_used = safety_adjusted_probability(candidate.model_probability);
    let raw_kelly = raw_kelly_fraction(p_used, candidate.odds_decimal);
    let fractional_kelly = raw_kelly * config.kelly_fraction;

    let mut stake = fractional_kelly * bankroll.current_bankroll;

    let dd_mult = drawdown_multiplier(bankroll);
    let streak_mult = loss_streak_multiplier(bankroll);
    let form_mult = form_multiplier(bankroll);
    stake *= dd_mult * streak_mult * form_mult;

    // Cap sequence: per-bet, then remaining daily risk, then remaining
    // open-exposure headroom. Each clamps downward only.
    stake = stake.min(bankroll.current_bankroll * config.max_stake_pct);

    let day_risk_used = bankroll.effective_day_risk_used(today);
    let daily_remaining = bankroll.current_bankroll * config.max_daily_risk_pct - day_risk_used;
    stake = stake.min(daily_remaining);

    let exposure_remaining =
        bankroll.current_bankroll * config.max_open_exposure_pct - bankroll.open_exposure;
    stake = stake.min(exposure_remaining);

    // Whole currency units; anything below 1 is not worth placing.
    let mut stake = stake.round();
    if stake < 1.0 {
        stake = 0.0;
    }

    let final_stake_pct = if bankroll.current_bankroll > 0.0 {
        stake / bankroll.current_bankroll
    } else {
        0.0
    };

    StakeDecision {
        should_bet: stake > 0.0,
        stake_pct: final_stake_pct,
        stake_amount: stake,
        breakdown: KellyBreakdown {
            p_used,
            raw_kelly,
            fractional_kelly,
            drawdown_multiplier: dd_mult,
            loss_streak_multiplier: streak_mult,
            form_multiplier: form_mult,
            final_stake_pct,
            final_stake_amount: stake,
        },
    }
}
