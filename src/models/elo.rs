//! Elo-style match-outcome model.
//!
//! Team strength is replayed fresh each cycle from the last 10 completed
//! matches rather than persisted: every team starts at 1500 and gains +20
//! per win, +5 per draw, −15 per loss. The rating is a replayable function
//! of the history window and carries no state between cycles.

/// Baseline rating for a team with no processed history.
pub const BASE_RATING: f64 = 1500.0;

/// Fixed home advantage expressed in Elo points.
const HOME_ADVANTAGE_ELO: f64 = 60.0;

/// Default draw rate before the mismatch decay is applied.
pub const BASE_DRAW_RATE: f64 = 0.26;

/// One completed match from a team's perspective-independent history.
#[derive(Debug, Clone, Copy)]
pub struct CompletedMatch {
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub home_goals: i64,
    pub away_goals: i64,
}

/// Home/Draw/Away probabilities, summing to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchProbabilities {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

/// Replay a rating for `team_id` over its matches, oldest first.
/// Matches where the team did not participate are skipped.
pub fn derive_rating(matches: &[CompletedMatch], team_id: i64) -> f64 {
    let mut rating = BASE_RATING;
    for m in matches {
        let (scored, conceded) = if m.home_team_id == team_id {
            (m.home_goals, m.away_goals)
        } else if m.away_team_id == team_id {
            (m.away_goals, m.home_goals)
        } else {
            continue;
        };
        if scored > conceded {
            rating += 20.0;
        } else if scored == conceded {
            rating += 5.0;
        } else {
            rating -= 15.0;
        }
    }
    rating
}

/// Convert a rating gap into 1X2 probabilities.
///
/// The effective gap includes a 60-point home bonus. The draw probability
/// shrinks as the mismatch grows, clamped to [0.10, 0.30]; what remains is
/// split between home and away by the standard logistic Elo win function.
pub fn match_probabilities(home_elo: f64, away_elo: f64, base_draw_rate: f64) -> MatchProbabilities {
    let gap = (home_elo + HOME_ADVANTAGE_ELO) - away_elo;

    let draw_rate = if base_draw_rate > 0.0 {
        base_draw_rate
    } else {
        BASE_DRAW_RATE
    };
    let p_draw = (draw_rate * (-gap.abs() / 400.0).exp()).clamp(0.10, 0.30);

    let p_home_no_draw = 1.0 / (1.0 + 10f64.powf(-gap / 400.0));

    MatchProbabilities {
        home: (1.0 - p_draw) * p_home_no_draw,
        draw: p_draw,
        away: (1.0 - p_draw) * (1.0 - p_home_no_draw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn m(home_id: i64, away_id: i64, hg: i64, ag: i64) -> CompletedMatch {
        CompletedMatch {
            home_team_id: home_id,
            away_team_id: away_id,
            home_goals: hg,
            away_goals: ag,
        }
    }

    #[test]
    fn rating_replay_win_draw_loss() {
        let history = vec![
            m(1, 2, 2, 0), // win  +20
            m(3, 1, 1, 1), // draw +5
            m(1, 4, 0, 3), // loss -15
        ];
        assert_relative_eq!(
            derive_rating(&history, 1),
            1500.0 + 20.0 + 5.0 - 15.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn rating_ignores_foreign_matches() {
        let history = vec![m(5, 6, 3, 0)];
        assert_relative_eq!(derive_rating(&history, 1), 1500.0, epsilon = 1e-9);
    }

    #[test]
    fn probabilities_sum_to_one() {
        for (h, a) in [(1500.0, 1500.0), (1700.0, 1400.0), (1400.0, 1700.0)] {
            let p = match_probabilities(h, a, BASE_DRAW_RATE);
            assert_relative_eq!(p.home + p.draw + p.away, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn home_advantage_breaks_equal_ratings() {
        let p = match_probabilities(1500.0, 1500.0, BASE_DRAW_RATE);
        assert!(p.home > p.away, "home {:.3} vs away {:.3}", p.home, p.away);
    }

    #[test]
    fn draw_rate_decays_with_mismatch() {
        let even = match_probabilities(1500.0, 1560.0, BASE_DRAW_RATE);
        let lopsided = match_probabilities(1900.0, 1400.0, BASE_DRAW_RATE);
        assert!(lopsided.draw < even.draw);
    }

    #[test]
    fn draw_rate_clamped_to_floor() {
        // Extreme gap: the exponential decay alone would push draw below 0.10
        let p = match_probabilities(3000.0, 1000.0, BASE_DRAW_RATE);
        assert_relative_eq!(p.draw, 0.10, epsilon = 1e-12);
    }

    #[test]
    fn zero_draw_rate_falls_back_to_default() {
        let p = match_probabilities(1500.0, 1560.0, 0.0);
        // gap = 0 with home advantage; draw = 0.26 · e^0 = 0.26
        assert_relative_eq!(p.draw, BASE_DRAW_RATE, epsilon = 1e-12);
    }

    #[test]
    fn stronger_team_favored() {
        let p = match_probabilities(1600.0, 1450.0, BASE_DRAW_RATE);
        assert!(p.home > 0.5, "got {:.3}", p.home);
    }
}
