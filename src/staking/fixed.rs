//! Fixed-percentage staking with a loss-streak throttle.
//!
//! Base stake is 1.5% of the current bankroll. Three consecutive losses
//! switch the policy into REDUCED mode (half the base percentage); two wins
//! inside any trailing 3-result window switch it back. The mode is not
//! persisted; it is replayed from the rolling result history every time.

use serde::{Deserialize, Serialize};

use crate::db::models::BetResult;

pub const BASE_PCT: f64 = 0.015;
pub const REDUCED_MULTIPLIER: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StakeMode {
    Standard,
    Reduced,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FixedStakeResult {
    pub stake: f64,
    pub pct: f64,
    pub mode: StakeMode,
    pub bankroll: f64,
    pub consecutive_losses: i64,
}

/// Compute the fixed-percentage stake.
///
/// `last_results_newest_first` is the bankroll's rolling window as stored
/// (newest first); the replay runs oldest→newest with VOID/PUSH entries
/// filtered out. The stake is floored to the cent.
pub fn calculate_fixed_stake(
    bankroll: f64,
    consecutive_losses: i64,
    last_results_newest_first: &[BetResult],
) -> FixedStakeResult {
    let results: Vec<BetResult> = last_results_newest_first
        .iter()
        .rev()
        .copied()
        .filter(|r| !matches!(r, BetResult::Void | BetResult::Push))
        .collect();

    let mut mode = StakeMode::Standard;
    let mut streak = 0u32;

    for (i, r) in results.iter().enumerate() {
        match r {
            BetResult::Loss => streak += 1,
            BetResult::Win => streak = 0,
            _ => {}
        }

        if streak >= 3 {
            mode = StakeMode::Reduced;
        }

        if mode == StakeMode::Reduced {
            let window_start = i.saturating_sub(2);
            let wins_in_window = results[window_start..=i]
                .iter()
                .filter(|w| **w == BetResult::Win)
                .count();
            if wins_in_window >= 2 {
                mode = StakeMode::Standard;
            }
        }
    }

    let pct = match mode {
        StakeMode::Reduced => BASE_PCT * REDUCED_MULTIPLIER,
        StakeMode::Standard => BASE_PCT,
    };
    let stake = (bankroll * pct * 100.0).floor() / 100.0;

    FixedStakeResult {
        stake,
        pct,
        mode,
        bankroll,
        consecutive_losses,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use BetResult::{Loss, Push, Void, Win};

    #[test]
    fn standard_stake_is_base_pct() {
        let r = calculate_fixed_stake(1000.0, 0, &[]);
        assert_eq!(r.mode, StakeMode::Standard);
        assert_relative_eq!(r.stake, 15.0, epsilon = 1e-9);
        assert_relative_eq!(r.pct, 0.015, epsilon = 1e-12);
    }

    #[test]
    fn three_losses_activate_reduced_mode() {
        // Oldest→newest LOSS, LOSS, LOSS
        let r = calculate_fixed_stake(1000.0, 3, &[Loss, Loss, Loss]);
        assert_eq!(r.mode, StakeMode::Reduced);
        assert_relative_eq!(r.stake, 7.5, epsilon = 1e-9);
        assert_relative_eq!(r.pct, 0.0075, epsilon = 1e-12);
    }

    #[test]
    fn two_losses_stay_standard() {
        let r = calculate_fixed_stake(1000.0, 2, &[Loss, Loss]);
        assert_eq!(r.mode, StakeMode::Standard);
    }

    #[test]
    fn two_wins_in_trailing_window_recover() {
        // Oldest→newest: LOSS LOSS LOSS WIN WIN → stored newest first
        let r = calculate_fixed_stake(1000.0, 0, &[Win, Win, Loss, Loss, Loss]);
        assert_eq!(r.mode, StakeMode::Standard);
        assert_relative_eq!(r.stake, 15.0, epsilon = 1e-9);
    }

    #[test]
    fn one_win_does_not_recover() {
        // Oldest→newest: LOSS LOSS LOSS WIN LOSS
        let r = calculate_fixed_stake(1000.0, 1, &[Loss, Win, Loss, Loss, Loss]);
        assert_eq!(r.mode, StakeMode::Reduced);
    }

    #[test]
    fn voids_are_ignored_in_replay() {
        // Oldest→newest: LOSS VOID LOSS PUSH LOSS → still a 3-loss streak
        let r = calculate_fixed_stake(1000.0, 3, &[Loss, Push, Loss, Void, Loss]);
        assert_eq!(r.mode, StakeMode::Reduced);
    }

    #[test]
    fn stake_floored_to_cent() {
        // 333.33 × 0.015 = 4.99995 → 4.99
        let r = calculate_fixed_stake(333.33, 0, &[]);
        assert_relative_eq!(r.stake, 4.99, epsilon = 1e-9);
    }

    #[test]
    fn relapse_after_recovery() {
        // Oldest→newest: L L L W W L L L → reduced again at the end
        let r = calculate_fixed_stake(
            1000.0,
            3,
            &[Loss, Loss, Loss, Win, Win, Loss, Loss, Loss],
        );
        assert_eq!(r.mode, StakeMode::Reduced);
    }
}
