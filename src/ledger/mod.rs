//! Bankroll and bet ledger.
//!
//! The ledger owns the money state machine: it locks exposure when a bet is
//! placed and applies the settlement transition exactly once per bet. The
//! transition itself is a pure function; the service wraps it with the
//! transactional store operations.

use anyhow::Result;
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::models::{Bankroll, Bet, BetResult, Outcome, Prediction};
use crate::db::Database;
use crate::staking::{
    calculate_fixed_stake, compute_stake_decision, BetCandidate, KellyConfig, StakePolicy,
};

/// Rolling result-window depth kept on the bankroll.
const RESULT_WINDOW: usize = 50;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("prediction {0} not found")]
    PredictionNotFound(i64),
    #[error("prediction {0} is not published")]
    NotPublished(i64),
    #[error("bet {0} not found")]
    BetNotFound(i64),
    #[error("bet {0} is already settled")]
    AlreadySettled(i64),
    #[error("bankroll for user {0} not found")]
    BankrollNotFound(String),
    #[error("stake resolves to zero; nothing to place")]
    ZeroStake,
    #[error("invalid amount {0}")]
    InvalidAmount(f64),
}

/// Profit and loss for one settled bet. VOID and PUSH return the stake, so
/// the delta is zero.
pub fn calculate_pnl(stake: f64, odds_decimal: f64, result: BetResult) -> f64 {
    match result {
        BetResult::Win => stake * (odds_decimal - 1.0),
        BetResult::Loss => -stake,
        BetResult::Void | BetResult::Push => 0.0,
    }
}

/// Bankroll transition for placing a bet: exposure grows by the stake and
/// the daily risk counter accrues, rolling over when the UTC date changed.
pub fn lock_bankroll(bankroll: &Bankroll, stake: f64, today: &str) -> Bankroll {
    let mut next = bankroll.clone();
    next.open_exposure += stake;
    if next.day_key != today {
        next.day_key = today.to_string();
        next.day_risk_used = 0.0;
    }
    next.day_risk_used += stake;
    next.updated_at = Utc::now();
    next
}

/// Bankroll transition for settling a bet. Returns the updated bankroll and
/// the realized PnL.
pub fn settle_bankroll(
    bankroll: &Bankroll,
    stake: f64,
    odds_decimal: f64,
    result: BetResult,
) -> (Bankroll, f64) {
    let pnl = calculate_pnl(stake, odds_decimal, result);
    let mut next = bankroll.clone();
    next.current_bankroll += pnl;
    next.peak_bankroll = next.peak_bankroll.max(next.current_bankroll);
    next.open_exposure = (next.open_exposure - stake).max(0.0);
    match result {
        BetResult::Loss => next.consecutive_losses += 1,
        BetResult::Win => next.consecutive_losses = 0,
        BetResult::Void | BetResult::Push => {}
    }
    next.last_results.insert(0, result);
    next.last_results.truncate(RESULT_WINDOW);
    next.updated_at = Utc::now();
    (next, pnl)
}

/// What a staking policy recommends for one published prediction.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StakeRecommendation {
    pub policy: StakePolicy,
    pub should_bet: bool,
    pub stake: f64,
    pub stake_pct: f64,
    pub breakdown: serde_json::Value,
}

#[derive(Clone)]
pub struct Ledger {
    db: Database,
    kelly: KellyConfig,
    currency: String,
}

impl Ledger {
    pub fn new(db: Database, kelly: KellyConfig, currency: String) -> Self {
        Ledger { db, kelly, currency }
    }

    /// Fetch the user's bankroll, creating it at the given starting amount
    /// on first touch.
    pub fn ensure_bankroll(&self, user_id: &str, initial: f64) -> Result<Bankroll> {
        if let Some(bankroll) = self.db.get_bankroll(user_id)? {
            return Ok(bankroll);
        }
        let now = Utc::now();
        let bankroll = Bankroll {
            user_id: user_id.to_string(),
            currency: self.currency.clone(),
            initial_bankroll: initial,
            current_bankroll: initial,
            peak_bankroll: initial,
            open_exposure: 0.0,
            consecutive_losses: 0,
            last_results: vec![],
            day_key: today_utc(),
            day_risk_used: 0.0,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_bankroll(&bankroll)?;
        info!(user_id, initial, "bootstrapped bankroll");
        Ok(bankroll)
    }

    /// Wipe the bankroll back to a fresh starting amount. Open exposure,
    /// streaks and the result window all reset.
    pub fn reset_bankroll(&self, user_id: &str, amount: f64) -> Result<Bankroll> {
        if !(amount > 0.0) {
            return Err(LedgerError::InvalidAmount(amount).into());
        }
        let existing = self
            .db
            .get_bankroll(user_id)?
            .ok_or_else(|| LedgerError::BankrollNotFound(user_id.to_string()))?;
        let mut next = existing;
        next.initial_bankroll = amount;
        next.current_bankroll = amount;
        next.peak_bankroll = amount;
        next.open_exposure = 0.0;
        next.consecutive_losses = 0;
        next.last_results.clear();
        next.day_key = today_utc();
        next.day_risk_used = 0.0;
        next.updated_at = Utc::now();
        self.db.update_bankroll(&next)?;
        warn!(user_id, amount, "bankroll reset");
        Ok(next)
    }

    /// Size a stake for a published prediction without placing anything.
    pub fn recommend(
        &self,
        user_id: &str,
        prediction_id: i64,
        policy: StakePolicy,
    ) -> Result<StakeRecommendation> {
        let bankroll = self
            .db
            .get_bankroll(user_id)?
            .ok_or_else(|| LedgerError::BankrollNotFound(user_id.to_string()))?;
        let candidate = self.load_candidate(prediction_id)?;
        Ok(self.recommend_for(&candidate, &bankroll, policy))
    }

    fn recommend_for(
        &self,
        candidate: &BetCandidate,
        bankroll: &Bankroll,
        policy: StakePolicy,
    ) -> StakeRecommendation {
        match policy {
            StakePolicy::Kelly => {
                let decision =
                    compute_stake_decision(candidate, bankroll, &self.kelly, &today_utc());
                StakeRecommendation {
                    policy,
                    should_bet: decision.should_bet,
                    stake: decision.stake_amount,
                    stake_pct: decision.stake_pct,
                    breakdown: serde_json::to_value(decision.breakdown)
                        .unwrap_or(serde_json::Value::Null),
                }
            }
            StakePolicy::Fixed => {
                let result = calculate_fixed_stake(
                    bankroll.current_bankroll,
                    bankroll.consecutive_losses,
                    &bankroll.last_results,
                );
                StakeRecommendation {
                    policy,
                    should_bet: result.stake >= 0.01,
                    stake: result.stake,
                    stake_pct: result.pct,
                    breakdown: serde_json::to_value(result).unwrap_or(serde_json::Value::Null),
                }
            }
        }
    }

    /// Place a bet against a published prediction. The stake comes from the
    /// chosen policy unless a manual override is given; the odds come from
    /// the prediction's average price unless overridden with a real book
    /// price. Bet row and bankroll lock are written in one transaction.
    pub fn place_bet(
        &self,
        user_id: &str,
        prediction_id: i64,
        policy: StakePolicy,
        stake_override: Option<f64>,
        odds_override: Option<f64>,
    ) -> Result<Bet> {
        let bankroll = self
            .db
            .get_bankroll(user_id)?
            .ok_or_else(|| LedgerError::BankrollNotFound(user_id.to_string()))?;
        let mut candidate = self.load_candidate(prediction_id)?;
        if let Some(odds) = odds_override {
            if !(odds > 1.0) {
                return Err(LedgerError::InvalidAmount(odds).into());
            }
            candidate.odds_decimal = odds;
        }

        let recommendation = self.recommend_for(&candidate, &bankroll, policy);
        let stake = match stake_override {
            Some(s) if s > 0.0 => s,
            Some(s) => return Err(LedgerError::InvalidAmount(s).into()),
            None => recommendation.stake,
        };
        if stake <= 0.0 {
            return Err(LedgerError::ZeroStake.into());
        }

        let now = Utc::now();
        let stake_pct = if bankroll.current_bankroll > 0.0 {
            stake / bankroll.current_bankroll
        } else {
            0.0
        };
        let mut bet = Bet {
            id: None,
            user_id: user_id.to_string(),
            prediction_id,
            fixture_id: candidate.fixture_id,
            market: candidate.market.clone(),
            selection: candidate.selection.clone(),
            line: candidate.line,
            odds_decimal: candidate.odds_decimal,
            model_probability: candidate.model_probability,
            stake,
            stake_pct,
            currency: bankroll.currency.clone(),
            status: "OPEN".to_string(),
            pnl: None,
            locked_at: now,
            settled_at: None,
            stake_breakdown: Some(serde_json::json!({
                "policy": recommendation.policy,
                "recommended_stake": recommendation.stake,
                "stake_override": stake_override,
                "odds_override": odds_override,
                "detail": recommendation.breakdown,
            })),
        };

        let bankroll_after = lock_bankroll(&bankroll, stake, &today_utc());
        let bet_id = self.db.place_bet(&bet, &bankroll_after)?;
        bet.id = Some(bet_id);
        info!(
            bet_id,
            prediction_id,
            stake,
            odds = candidate.odds_decimal,
            "bet locked"
        );
        Ok(bet)
    }

    /// Settle one open bet. Fires at most once: a second call for the same
    /// bet fails with `AlreadySettled` and leaves the bankroll untouched.
    pub fn settle_bet(&self, bet_id: i64, result: BetResult) -> Result<Bet> {
        let bet = self
            .db
            .get_bet(bet_id)?
            .ok_or(LedgerError::BetNotFound(bet_id))?;
        if bet.status != "OPEN" {
            return Err(LedgerError::AlreadySettled(bet_id).into());
        }
        let bankroll = self
            .db
            .get_bankroll(&bet.user_id)?
            .ok_or_else(|| LedgerError::BankrollNotFound(bet.user_id.clone()))?;

        let (bankroll_after, pnl) =
            settle_bankroll(&bankroll, bet.stake, bet.odds_decimal, result);
        let status = match result {
            BetResult::Win => "WON",
            BetResult::Loss => "LOST",
            BetResult::Void => "VOID",
            BetResult::Push => "PUSH",
        };
        let now = Utc::now();
        let applied = self.db.settle_bet(bet_id, status, pnl, now, &bankroll_after)?;
        if !applied {
            return Err(LedgerError::AlreadySettled(bet_id).into());
        }
        info!(bet_id, status, pnl, "bet settled");

        let mut settled = bet;
        settled.status = status.to_string();
        settled.pnl = Some(pnl);
        settled.settled_at = Some(now);
        Ok(settled)
    }

    /// Settle every open bet whose prediction already has an outcome. Used
    /// by result sync; per-bet failures are logged and skipped.
    pub fn settle_due_bets(&self) -> Result<usize> {
        let due = self.db.list_open_bets_with_settled_predictions()?;
        let mut settled = 0;
        for (bet, outcome) in due {
            let Some(bet_id) = bet.id else { continue };
            let result = match outcome {
                Outcome::Won => BetResult::Win,
                Outcome::Lost => BetResult::Loss,
                Outcome::Push => BetResult::Push,
            };
            match self.settle_bet(bet_id, result) {
                Ok(_) => settled += 1,
                Err(e) => warn!(bet_id, error = %e, "bet settlement failed"),
            }
        }
        Ok(settled)
    }

    pub fn bankroll(&self, user_id: &str) -> Result<Option<Bankroll>> {
        self.db.get_bankroll(user_id)
    }

    pub fn list_bets(&self, user_id: &str, limit: i64) -> Result<Vec<Bet>> {
        self.db.list_bets(user_id, limit)
    }

    pub fn analytics(&self, user_id: &str) -> Result<crate::db::BetAnalytics> {
        self.db.bet_analytics(user_id)
    }

    fn load_candidate(&self, prediction_id: i64) -> Result<BetCandidate> {
        let prediction = self
            .db
            .get_prediction(prediction_id)?
            .ok_or(LedgerError::PredictionNotFound(prediction_id))?;
        candidate_from_prediction(&prediction)
    }
}

fn candidate_from_prediction(prediction: &Prediction) -> Result<BetCandidate> {
    let id = prediction
        .id
        .ok_or(LedgerError::PredictionNotFound(0))?;
    if prediction.decision != "PUBLISH" {
        return Err(LedgerError::NotPublished(id).into());
    }
    Ok(BetCandidate {
        prediction_id: id,
        fixture_id: prediction.fixture_id,
        market: prediction.market.clone(),
        selection: prediction.selection.clone(),
        line: prediction.line,
        odds_decimal: prediction.avg_odds,
        model_probability: prediction.adjusted_probability,
    })
}

fn today_utc() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{DateTime, TimeZone};
    use crate::db::models::Fixture;

    fn make_bankroll() -> Bankroll {
        let now = Utc::now();
        Bankroll {
            user_id: "u1".into(),
            currency: "EUR".into(),
            initial_bankroll: 1000.0,
            current_bankroll: 1000.0,
            peak_bankroll: 1000.0,
            open_exposure: 0.0,
            consecutive_losses: 0,
            last_results: vec![],
            day_key: "2026-08-26".into(),
            day_risk_used: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn pnl_rules() {
        assert_relative_eq!(calculate_pnl(10.0, 2.5, BetResult::Win), 15.0, epsilon = 1e-9);
        assert_relative_eq!(calculate_pnl(10.0, 2.5, BetResult::Loss), -10.0, epsilon = 1e-9);
        assert_relative_eq!(calculate_pnl(10.0, 2.5, BetResult::Void), 0.0, epsilon = 1e-9);
        assert_relative_eq!(calculate_pnl(10.0, 2.5, BetResult::Push), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn win_raises_peak_and_resets_streak() {
        let mut bankroll = make_bankroll();
        bankroll.consecutive_losses = 2;
        bankroll.open_exposure = 10.0;
        let (next, pnl) = settle_bankroll(&bankroll, 10.0, 2.0, BetResult::Win);
        assert_relative_eq!(pnl, 10.0, epsilon = 1e-9);
        assert_relative_eq!(next.current_bankroll, 1010.0, epsilon = 1e-9);
        assert_relative_eq!(next.peak_bankroll, 1010.0, epsilon = 1e-9);
        assert_relative_eq!(next.open_exposure, 0.0, epsilon = 1e-9);
        assert_eq!(next.consecutive_losses, 0);
        assert_eq!(next.last_results[0], BetResult::Win);
    }

    #[test]
    fn loss_keeps_peak_and_extends_streak() {
        let mut bankroll = make_bankroll();
        bankroll.consecutive_losses = 1;
        bankroll.open_exposure = 10.0;
        let (next, pnl) = settle_bankroll(&bankroll, 10.0, 2.0, BetResult::Loss);
        assert_relative_eq!(pnl, -10.0, epsilon = 1e-9);
        assert_relative_eq!(next.current_bankroll, 990.0, epsilon = 1e-9);
        assert_relative_eq!(next.peak_bankroll, 1000.0, epsilon = 1e-9);
        assert_eq!(next.consecutive_losses, 2);
    }

    #[test]
    fn void_leaves_streak_untouched() {
        let mut bankroll = make_bankroll();
        bankroll.consecutive_losses = 2;
        bankroll.open_exposure = 10.0;
        let (next, pnl) = settle_bankroll(&bankroll, 10.0, 2.0, BetResult::Void);
        assert_relative_eq!(pnl, 0.0, epsilon = 1e-9);
        assert_relative_eq!(next.current_bankroll, 1000.0, epsilon = 1e-9);
        assert_eq!(next.consecutive_losses, 2);
        assert_eq!(next.last_results[0], BetResult::Void);
    }

    #[test]
    fn exposure_never_goes_negative() {
        let mut bankroll = make_bankroll();
        bankroll.open_exposure = 5.0;
        let (next, _) = settle_bankroll(&bankroll, 10.0, 2.0, BetResult::Loss);
        assert_relative_eq!(next.open_exposure, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn result_window_truncates_at_50() {
        let mut bankroll = make_bankroll();
        bankroll.last_results = vec![BetResult::Win; 50];
        let (next, _) = settle_bankroll(&bankroll, 10.0, 2.0, BetResult::Loss);
        assert_eq!(next.last_results.len(), 50);
        assert_eq!(next.last_results[0], BetResult::Loss);
    }

    #[test]
    fn lock_rolls_the_day_over() {
        let mut bankroll = make_bankroll();
        bankroll.day_key = "2026-08-25".into();
        bankroll.day_risk_used = 40.0;
        let next = lock_bankroll(&bankroll, 15.0, "2026-08-26");
        assert_eq!(next.day_key, "2026-08-26");
        assert_relative_eq!(next.day_risk_used, 15.0, epsilon = 1e-9);
        assert_relative_eq!(next.open_exposure, 15.0, epsilon = 1e-9);
    }

    // ── Service round-trips against an in-memory store ────────────────────────

    fn seeded_ledger() -> (Ledger, i64) {
        let db = Database::open_in_memory().unwrap();
        let kickoff: DateTime<Utc> = Utc.with_ymd_and_hms(2026, 8, 27, 18, 0, 0).unwrap();
        db.upsert_fixture(&Fixture {
            id: 1,
            league_id: 8,
            home_team_id: 10,
            away_team_id: 20,
            home_team: Some("Home FC".into()),
            away_team: Some("Away FC".into()),
            kickoff_at: kickoff,
            status: "scheduled".into(),
            home_score: None,
            away_score: None,
        })
        .unwrap();
        db.supersede_and_insert_predictions(
            1,
            &[Prediction {
                id: None,
                fixture_id: 1,
                cycle_id: Some(1),
                market: "1X2".into(),
                line: None,
                selection: "HOME".into(),
                model_probability: 0.74,
                adjusted_probability: 0.72,
                avg_odds: 1.8,
                implied_probability: 1.0 / 1.8,
                decision: "PUBLISH".into(),
                reason: None,
                outcome: None,
                settled_at: None,
                created_at: Utc::now(),
            }],
        )
        .unwrap();
        let pred_id = db.list_predictions_for_fixture(1).unwrap()[0].id.unwrap();
        let ledger = Ledger::new(db, KellyConfig::default(), "EUR".into());
        ledger.ensure_bankroll("u1", 1000.0).unwrap();
        (ledger, pred_id)
    }

    #[test]
    fn place_then_settle_win_round_trip() {
        let (ledger, pred_id) = seeded_ledger();
        let bet = ledger
            .place_bet("u1", pred_id, StakePolicy::Kelly, None, None)
            .unwrap();
        assert!(bet.stake > 0.0);

        let bankroll = ledger.bankroll("u1").unwrap().unwrap();
        assert_relative_eq!(bankroll.open_exposure, bet.stake, epsilon = 1e-9);

        let settled = ledger.settle_bet(bet.id.unwrap(), BetResult::Win).unwrap();
        assert_eq!(settled.status, "WON");
        let expected_pnl = bet.stake * (bet.odds_decimal - 1.0);
        assert_relative_eq!(settled.pnl.unwrap(), expected_pnl, epsilon = 1e-9);

        let bankroll = ledger.bankroll("u1").unwrap().unwrap();
        assert_relative_eq!(bankroll.open_exposure, 0.0, epsilon = 1e-9);
        assert_relative_eq!(
            bankroll.current_bankroll,
            1000.0 + expected_pnl,
            epsilon = 1e-9
        );
    }

    #[test]
    fn double_settlement_is_rejected() {
        let (ledger, pred_id) = seeded_ledger();
        let bet = ledger
            .place_bet("u1", pred_id, StakePolicy::Kelly, None, None)
            .unwrap();
        let bet_id = bet.id.unwrap();
        ledger.settle_bet(bet_id, BetResult::Loss).unwrap();
        let err = ledger.settle_bet(bet_id, BetResult::Loss).unwrap_err();
        assert!(err.downcast_ref::<LedgerError>().is_some());
    }

    #[test]
    fn manual_stake_and_odds_override() {
        let (ledger, pred_id) = seeded_ledger();
        let bet = ledger
            .place_bet("u1", pred_id, StakePolicy::Fixed, Some(25.0), Some(1.95))
            .unwrap();
        assert_relative_eq!(bet.stake, 25.0, epsilon = 1e-9);
        assert_relative_eq!(bet.odds_decimal, 1.95, epsilon = 1e-9);
    }

    #[test]
    fn blocked_prediction_cannot_be_bet() {
        let (ledger, pred_id) = seeded_ledger();
        // Supersede the row so it flips to BLOCK.
        ledger
            .db
            .supersede_and_insert_predictions(1, &[])
            .unwrap();
        let err = ledger
            .place_bet("u1", pred_id, StakePolicy::Kelly, None, None)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LedgerError>(),
            Some(LedgerError::NotPublished(_))
        ));
    }

    #[test]
    fn settle_due_bets_uses_prediction_outcome() {
        let (ledger, pred_id) = seeded_ledger();
        let bet = ledger
            .place_bet("u1", pred_id, StakePolicy::Kelly, None, None)
            .unwrap();
        ledger.db.settle_prediction(pred_id, Outcome::Won).unwrap();

        let settled = ledger.settle_due_bets().unwrap();
        assert_eq!(settled, 1);
        let stored = ledger.db.get_bet(bet.id.unwrap()).unwrap().unwrap();
        assert_eq!(stored.status, "WON");
    }

    #[test]
    fn reset_clears_state() {
        let (ledger, pred_id) = seeded_ledger();
        let bet = ledger
            .place_bet("u1", pred_id, StakePolicy::Kelly, None, None)
            .unwrap();
        ledger.settle_bet(bet.id.unwrap(), BetResult::Loss).unwrap();

        let fresh = ledger.reset_bankroll("u1", 500.0).unwrap();
        assert_relative_eq!(fresh.current_bankroll, 500.0, epsilon = 1e-9);
        assert_relative_eq!(fresh.peak_bankroll, 500.0, epsilon = 1e-9);
        assert_eq!(fresh.consecutive_losses, 0);
        assert!(fresh.last_results.is_empty());
    }
}
