//! Probability adjuster.
//!
//! Raw model probabilities trend overconfident at the extremes. Anchoring to
//! the market-implied probability and shrinking toward the 50% prior keeps
//! published estimates calibrated and bounded.

/// Blend weight given to the model (the rest goes to the implied probability).
const MODEL_WEIGHT: f64 = 0.60;
/// Retained fraction after shrinking toward 0.5.
const SHRINK_WEIGHT: f64 = 0.75;
/// Hard ceiling on any adjusted probability.
const MAX_ADJUSTED: f64 = 0.85;

/// `0.60·pModel + 0.40·pImplied`, shrunk 75/25 toward 0.5, capped at 0.85.
///
/// Only called when a valid average price exists; without a price the raw
/// model probability passes through unadjusted upstream.
pub fn adjust_probability(p_model: f64, p_implied: f64) -> f64 {
    let blend = MODEL_WEIGHT * p_model + (1.0 - MODEL_WEIGHT) * p_implied;
    let shrunk = SHRINK_WEIGHT * blend + (1.0 - SHRINK_WEIGHT) * 0.50;
    shrunk.min(MAX_ADJUSTED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn known_value() {
        // blend = 0.6·0.8 + 0.4·0.5 = 0.68; shrunk = 0.75·0.68 + 0.125 = 0.635
        assert_relative_eq!(adjust_probability(0.8, 0.5), 0.635, epsilon = 1e-12);
    }

    #[test]
    fn fifty_fifty_is_fixed_point() {
        assert_relative_eq!(adjust_probability(0.5, 0.5), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn cap_holds_for_every_input_pair() {
        for i in 0..=20 {
            for j in 0..=20 {
                let p = adjust_probability(i as f64 / 20.0, j as f64 / 20.0);
                assert!((0.0..=0.85).contains(&p), "p={:.4} for ({}, {})", p, i, j);
            }
        }
    }

    #[test]
    fn extreme_confidence_is_capped() {
        // blend = 0.6·1.0 + 0.4·1.0 = 1.0; shrunk = 0.875 → capped to 0.85
        assert_relative_eq!(adjust_probability(1.0, 1.0), 0.85, epsilon = 1e-12);
    }

    #[test]
    fn market_anchor_pulls_down_overconfident_model() {
        let anchored = adjust_probability(0.95, 0.55);
        let unanchored = adjust_probability(0.95, 0.95);
        assert!(anchored < unanchored);
    }
}
