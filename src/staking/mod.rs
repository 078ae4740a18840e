//! Stake-sizing policies. Both are pure functions of (candidate, bankroll
//! state, fixed config) with no I/O, so a recommendation can be recomputed
//! and audited at any time.

pub mod fixed;
pub mod kelly;

use serde::{Deserialize, Serialize};

pub use fixed::{calculate_fixed_stake, FixedStakeResult};
pub use kelly::{compute_stake_decision, KellyBreakdown, StakeDecision};

/// A published prediction being considered for a bet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetCandidate {
    pub prediction_id: i64,
    pub fixture_id: i64,
    pub market: String,
    pub selection: String,
    pub line: Option<f64>,
    pub odds_decimal: f64,
    pub model_probability: f64,
}

/// Fixed parameters of the fractional-Kelly policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KellyConfig {
    /// Fractional Kelly multiplier applied to the raw fraction.
    pub kelly_fraction: f64,
    /// Per-bet cap as a fraction of current bankroll.
    pub max_stake_pct: f64,
    /// Daily risk budget as a fraction of current bankroll.
    pub max_daily_risk_pct: f64,
    /// Open-exposure ceiling as a fraction of current bankroll.
    pub max_open_exposure_pct: f64,
}

impl Default for KellyConfig {
    fn default() -> Self {
        KellyConfig {
            kelly_fraction: 0.20,
            max_stake_pct: 0.015,
            max_daily_risk_pct: 0.05,
            max_open_exposure_pct: 0.08,
        }
    }
}

/// Which policy sizes a locked bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakePolicy {
    Kelly,
    Fixed,
}
