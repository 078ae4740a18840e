//! Statistical models behind the prediction engine: a Poisson goal model,
//! an Elo-style match-outcome model, and the market-anchored probability
//! adjuster that sits between raw model output and publish gating.

pub mod adjust;
pub mod elo;
pub mod poisson;
