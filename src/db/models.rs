use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical betting market vocabulary. Raw provider strings are mapped into
/// these by the odds normalizer; everything downstream only sees this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    #[serde(rename = "1X2")]
    OneXTwo,
    #[serde(rename = "BTTS")]
    Btts,
    #[serde(rename = "OU")]
    OverUnder,
}

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::OneXTwo => "1X2",
            Market::Btts => "BTTS",
            Market::OverUnder => "OU",
        }
    }

    pub fn parse(s: &str) -> Option<Market> {
        match s {
            "1X2" => Some(Market::OneXTwo),
            "BTTS" => Some(Market::Btts),
            "OU" => Some(Market::OverUnder),
            _ => None,
        }
    }
}

/// A specific answer within a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Selection {
    Home,
    Draw,
    Away,
    Yes,
    No,
    Over,
    Under,
}

impl Selection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Selection::Home => "HOME",
            Selection::Draw => "DRAW",
            Selection::Away => "AWAY",
            Selection::Yes => "YES",
            Selection::No => "NO",
            Selection::Over => "OVER",
            Selection::Under => "UNDER",
        }
    }

    pub fn parse(s: &str) -> Option<Selection> {
        match s {
            "HOME" => Some(Selection::Home),
            "DRAW" => Some(Selection::Draw),
            "AWAY" => Some(Selection::Away),
            "YES" => Some(Selection::Yes),
            "NO" => Some(Selection::No),
            "OVER" => Some(Selection::Over),
            "UNDER" => Some(Selection::Under),
            _ => None,
        }
    }
}

/// Why a candidate was blocked instead of published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockReason {
    MissingOdds,
    LowOdds,
    LowProb,
    LowEdge,
    BetterPickExists,
    DailyLimit,
    InsufficientHistory,
    ReplacedByNewRun,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::MissingOdds => "MISSING_ODDS",
            BlockReason::LowOdds => "LOW_ODDS",
            BlockReason::LowProb => "LOW_PROB",
            BlockReason::LowEdge => "LOW_EDGE",
            BlockReason::BetterPickExists => "BETTER_PICK_EXISTS",
            BlockReason::DailyLimit => "DAILY_LIMIT",
            BlockReason::InsufficientHistory => "INSUFFICIENT_HISTORY",
            BlockReason::ReplacedByNewRun => "REPLACED_BY_NEW_RUN",
        }
    }
}

/// Settled result of a published prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Won,
    Lost,
    Push,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Won => "won",
            Outcome::Lost => "lost",
            Outcome::Push => "push",
        }
    }

    pub fn parse(s: &str) -> Option<Outcome> {
        match s {
            "won" => Some(Outcome::Won),
            "lost" => Some(Outcome::Lost),
            "push" => Some(Outcome::Push),
            _ => None,
        }
    }
}

/// Result fed into bankroll settlement. PUSH settles like VOID for PnL
/// but is kept distinct on the bet row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BetResult {
    Win,
    Loss,
    Void,
    Push,
}

/// A scheduled match between two teams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub id: i64,
    pub league_id: i64,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub kickoff_at: DateTime<Utc>,
    /// "scheduled" | "finished"
    pub status: String,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
}

/// One observed bookmaker price. Append-only; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsPoint {
    pub fixture_id: i64,
    pub bookmaker_id: i64,
    pub market: Market,
    pub selection: Selection,
    pub line: Option<f64>,
    pub odds_decimal: f64,
    pub ts_utc: DateTime<Utc>,
    pub source: String,
}

/// Cross-bookmaker average price for one (market, line, selection).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsAverage {
    pub fixture_id: i64,
    pub market: Market,
    pub line: Option<f64>,
    pub selection: Selection,
    pub avg_odds: f64,
    /// Number of bookmakers contributing (one vote each).
    pub bookmaker_count: i64,
    pub window_end_utc: DateTime<Utc>,
    pub source: String,
}

/// One evaluated (fixture, market, line, selection) row from an engine cycle.
///
/// Market/selection are stored as text because the INSUFFICIENT_HISTORY
/// sentinel row uses the out-of-vocabulary pair ("ALL", "N/A").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Option<i64>,
    pub fixture_id: i64,
    pub cycle_id: Option<i64>,
    pub market: String,
    pub line: Option<f64>,
    pub selection: String,
    pub model_probability: f64,
    pub adjusted_probability: f64,
    pub avg_odds: f64,
    pub implied_probability: f64,
    /// "PUBLISH" | "BLOCK"
    pub decision: String,
    pub reason: Option<String>,
    /// "won" | "lost" | "push", null until settled
    pub outcome: Option<String>,
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One run of the cycle orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineCycle {
    pub id: Option<i64>,
    /// "RUNNING" | "SUCCESS" | "FAILED"
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub fixtures_found: i64,
    pub fixtures_processed: i64,
    pub predictions_published: i64,
    pub predictions_blocked: i64,
    /// Per-reason block counts, serialized as a JSON object.
    pub block_reasons: serde_json::Value,
    pub error: Option<String>,
}

/// Bankroll state machine for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bankroll {
    pub user_id: String,
    pub currency: String,
    pub initial_bankroll: f64,
    pub current_bankroll: f64,
    pub peak_bankroll: f64,
    /// Sum of unsettled bet stakes; never negative.
    pub open_exposure: f64,
    pub consecutive_losses: i64,
    /// Rolling window of the last 50 settlement results, newest first.
    pub last_results: Vec<BetResult>,
    /// UTC calendar date the daily risk counter belongs to ("YYYY-MM-DD").
    pub day_key: String,
    pub day_risk_used: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bankroll {
    /// Daily risk already used, treating a stale day key as a fresh day.
    pub fn effective_day_risk_used(&self, today: &str) -> f64 {
        if self.day_key == today {
            self.day_risk_used
        } else {
            0.0
        }
    }
}

/// One staking decision materialized against a published prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub id: Option<i64>,
    pub user_id: String,
    pub prediction_id: i64,
    pub fixture_id: i64,
    pub market: String,
    pub selection: String,
    pub line: Option<f64>,
    pub odds_decimal: f64,
    pub model_probability: f64,
    pub stake: f64,
    /// Stake as a fraction of the bankroll at lock time.
    pub stake_pct: f64,
    pub currency: String,
    /// "OPEN" | "WON" | "LOST" | "VOID" | "PUSH"
    pub status: String,
    pub pnl: Option<f64>,
    pub locked_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    /// Snapshot of the staking computation that produced this bet.
    pub stake_breakdown: Option<serde_json::Value>,
}
