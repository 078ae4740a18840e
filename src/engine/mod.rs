//! Prediction engine: evaluates every tradable (market, line, selection)
//! for upcoming fixtures and publishes at most one pick per fixture,
//! subject to odds, probability, edge and daily-quota gates.

pub mod results;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::models::{
    BlockReason, EngineCycle, Fixture, Market, OddsAverage, Prediction, Selection,
};
use crate::db::Database;
use crate::models::adjust::adjust_probability;
use crate::models::elo::{self, CompletedMatch, MatchProbabilities};
use crate::models::poisson::{self, ScorelineProbabilities};
use crate::odds;
use crate::provider::SportsDataProvider;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How far ahead to look for fixtures, in hours.
    pub lookahead_hours: i64,
    /// Skip fixtures kicking off sooner than this, in hours.
    pub kickoff_buffer_hours: i64,
    /// Hard cap on fixtures evaluated per cycle.
    pub fixture_cap: usize,
    /// Odds observations older than this are ignored when averaging, in hours.
    pub odds_window_hours: i64,
    /// Completed matches per team fed into the models.
    pub history_window: usize,
    /// Both teams need at least this many completed matches; below it the
    /// fixture gets a single INSUFFICIENT_HISTORY row.
    pub min_history: usize,
    /// Maximum picks published per UTC kickoff date.
    pub daily_quota: usize,
    /// Minimum average price worth publishing.
    pub min_odds: f64,
    /// Minimum adjusted probability worth publishing.
    pub min_probability: f64,
    /// Minimum edge (adjusted minus implied) worth publishing.
    pub min_edge: f64,
    /// League-level prior draw rate for the outcome model.
    pub base_draw_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            lookahead_hours: 72,
            kickoff_buffer_hours: 2,
            fixture_cap: 100,
            odds_window_hours: 24,
            history_window: 10,
            min_history: 10,
            daily_quota: 20,
            min_odds: 1.50,
            min_probability: 0.70,
            min_edge: 0.05,
            base_draw_rate: 0.26,
        }
    }
}

/// Adjusted probabilities within this distance count as tied; the tie goes
/// to the higher price.
const TIE_EPSILON: f64 = 0.001;

/// Attack/defense multipliers relative to the league norm. 1.0 is average;
/// a defense_weakness above 1.0 concedes more than the norm.
#[derive(Debug, Clone, Copy)]
pub struct TeamStrength {
    pub attack: f64,
    pub defense_weakness: f64,
}

/// Scored/conceded averages over the recent window, normalized by the
/// league's per-team goals average.
pub fn team_strength(
    matches: &[CompletedMatch],
    team_id: i64,
    league_avg_per_team: f64,
) -> TeamStrength {
    let mut scored = 0i64;
    let mut conceded = 0i64;
    let mut played = 0usize;
    for m in matches {
        let (s, c) = if m.home_team_id == team_id {
            (m.home_goals, m.away_goals)
        } else if m.away_team_id == team_id {
            (m.away_goals, m.home_goals)
        } else {
            continue;
        };
        scored += s;
        conceded += c;
        played += 1;
    }
    if played == 0 || league_avg_per_team <= 0.0 {
        return TeamStrength {
            attack: 1.0,
            defense_weakness: 1.0,
        };
    }
    let n = played as f64;
    TeamStrength {
        attack: (scored as f64 / n) / league_avg_per_team,
        defense_weakness: (conceded as f64 / n) / league_avg_per_team,
    }
}

/// One evaluated (market, line, selection) row, after gating.
#[derive(Debug, Clone)]
pub struct EvaluatedCandidate {
    pub market: Market,
    pub selection: Selection,
    pub line: Option<f64>,
    pub model_probability: f64,
    pub avg_odds: f64,
    pub implied_probability: f64,
    pub adjusted_probability: f64,
    pub block: Option<BlockReason>,
}

/// Model probabilities for the full candidate grid: three 1X2 outcomes, two
/// BTTS sides, and over/under for each supported line.
pub fn build_candidates(
    outcome: &MatchProbabilities,
    score: &ScorelineProbabilities,
) -> Vec<(Market, Selection, Option<f64>, f64)> {
    let mut rows = vec![
        (Market::OneXTwo, Selection::Home, None, outcome.home),
        (Market::OneXTwo, Selection::Draw, None, outcome.draw),
        (Market::OneXTwo, Selection::Away, None, outcome.away),
        (Market::Btts, Selection::Yes, None, score.btts),
        (Market::Btts, Selection::No, None, 1.0 - score.btts),
    ];
    for line in odds::OU_LINES {
        let over = score.over(line);
        rows.push((Market::OverUnder, Selection::Over, Some(line), over));
        rows.push((Market::OverUnder, Selection::Under, Some(line), 1.0 - over));
    }
    rows
}

/// Apply the publication gates in order: a missing price blocks before a low
/// price, a low price before a low probability, and edge is checked last.
pub fn gate_candidate(
    market: Market,
    selection: Selection,
    line: Option<f64>,
    model_probability: f64,
    avg_odds: Option<f64>,
    config: &EngineConfig,
) -> EvaluatedCandidate {
    let Some(avg) = avg_odds else {
        return EvaluatedCandidate {
            market,
            selection,
            line,
            model_probability,
            avg_odds: 0.0,
            implied_probability: 0.0,
            adjusted_probability: model_probability,
            block: Some(BlockReason::MissingOdds),
        };
    };

    let implied = 1.0 / avg;
    let adjusted = adjust_probability(model_probability, implied);
    let block = if avg < config.min_odds {
        Some(BlockReason::LowOdds)
    } else if adjusted < config.min_probability {
        Some(BlockReason::LowProb)
    } else if adjusted - implied < config.min_edge {
        Some(BlockReason::LowEdge)
    } else {
        None
    };

    EvaluatedCandidate {
        market,
        selection,
        line,
        model_probability,
        avg_odds: avg,
        implied_probability: implied,
        adjusted_probability: adjusted,
        block,
    }
}

/// Pick the single best unblocked candidate: highest adjusted probability,
/// ties broken by the higher price. Every other survivor is blocked with
/// BETTER_PICK_EXISTS. Returns the winner's index.
pub fn select_winner(candidates: &mut [EvaluatedCandidate]) -> Option<usize> {
    let mut winner: Option<usize> = None;
    for i in 0..candidates.len() {
        if candidates[i].block.is_some() {
            continue;
        }
        match winner {
            None => winner = Some(i),
            Some(w) => {
                let best = &candidates[w];
                let challenger = &candidates[i];
                let diff = challenger.adjusted_probability - best.adjusted_probability;
                let better = diff > TIE_EPSILON
                    || (diff.abs() <= TIE_EPSILON && challenger.avg_odds > best.avg_odds);
                if better {
                    winner = Some(i);
                }
            }
        }
    }
    if let Some(w) = winner {
        for (i, c) in candidates.iter_mut().enumerate() {
            if i != w && c.block.is_none() {
                c.block = Some(BlockReason::BetterPickExists);
            }
        }
    }
    winner
}

/// Everything the cycle computed for one fixture.
#[derive(Debug, Clone)]
pub struct FixtureEvaluation {
    pub fixture: Fixture,
    pub candidates: Vec<EvaluatedCandidate>,
    pub winner: Option<usize>,
    pub insufficient_history: bool,
}

impl FixtureEvaluation {
    fn insufficient(fixture: Fixture) -> Self {
        FixtureEvaluation {
            fixture,
            candidates: vec![],
            winner: None,
            insufficient_history: true,
        }
    }
}

/// Enforce the per-UTC-date publication quota. Winners are ranked by
/// expected value (adjusted·odds − 1); everything past the quota flips to
/// DAILY_LIMIT.
pub fn apply_daily_quota(evaluations: &mut [FixtureEvaluation], quota: usize) {
    let mut by_day: HashMap<String, Vec<(usize, usize, f64)>> = HashMap::new();
    for (i, eval) in evaluations.iter().enumerate() {
        let Some(w) = eval.winner else { continue };
        let day = eval.fixture.kickoff_at.format("%Y-%m-%d").to_string();
        let c = &eval.candidates[w];
        let ev = c.adjusted_probability * c.avg_odds - 1.0;
        by_day.entry(day).or_default().push((i, w, ev));
    }

    for (_, mut winners) in by_day {
        winners.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        for (i, w, _) in winners.into_iter().skip(quota) {
            evaluations[i].candidates[w].block = Some(BlockReason::DailyLimit);
            evaluations[i].winner = None;
        }
    }
}

/// Prediction rows for one evaluated fixture. A fixture with too little
/// history produces a single sentinel row with the out-of-vocabulary
/// ("ALL", "N/A") pair.
pub fn to_predictions(
    evaluation: &FixtureEvaluation,
    cycle_id: i64,
    now: DateTime<Utc>,
) -> Vec<Prediction> {
    if evaluation.insufficient_history {
        return vec![Prediction {
            id: None,
            fixture_id: evaluation.fixture.id,
            cycle_id: Some(cycle_id),
            market: "ALL".to_string(),
            line: None,
            selection: "N/A".to_string(),
            model_probability: 0.0,
            adjusted_probability: 0.0,
            avg_odds: 0.0,
            implied_probability: 0.0,
            decision: "BLOCK".to_string(),
            reason: Some(BlockReason::InsufficientHistory.as_str().to_string()),
            outcome: None,
            settled_at: None,
            created_at: now,
        }];
    }

    evaluation
        .candidates
        .iter()
        .map(|c| Prediction {
            id: None,
            fixture_id: evaluation.fixture.id,
            cycle_id: Some(cycle_id),
            market: c.market.as_str().to_string(),
            line: c.line,
            selection: c.selection.as_str().to_string(),
            model_probability: c.model_probability,
            adjusted_probability: c.adjusted_probability,
            avg_odds: c.avg_odds,
            implied_probability: c.implied_probability,
            decision: if c.block.is_none() { "PUBLISH" } else { "BLOCK" }.to_string(),
            reason: c.block.map(|b| b.as_str().to_string()),
            outcome: None,
            settled_at: None,
            created_at: now,
        })
        .collect()
}

pub struct PredictionEngine {
    db: Database,
    provider: Arc<dyn SportsDataProvider>,
    config: EngineConfig,
    run_lock: Arc<tokio::sync::Mutex<()>>,
}

impl PredictionEngine {
    pub fn new(db: Database, provider: Arc<dyn SportsDataProvider>, config: EngineConfig) -> Self {
        PredictionEngine {
            db,
            provider,
            config,
            run_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Run one full cycle. At most one cycle runs at a time; a second call
    /// while one is in flight fails instead of queueing.
    pub async fn run_cycle(&self) -> Result<EngineCycle> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            anyhow::bail!("an engine cycle is already running");
        };

        let cycle_id = self.db.create_cycle()?;
        info!(cycle_id, "engine cycle started");
        match self.run_cycle_inner(cycle_id).await {
            Ok(cycle) => {
                self.db.finish_cycle(&cycle)?;
                info!(
                    cycle_id,
                    published = cycle.predictions_published,
                    blocked = cycle.predictions_blocked,
                    "engine cycle finished"
                );
                Ok(cycle)
            }
            Err(e) => {
                let failed = EngineCycle {
                    id: Some(cycle_id),
                    status: "FAILED".to_string(),
                    started_at: Utc::now(),
                    finished_at: Some(Utc::now()),
                    fixtures_found: 0,
                    fixtures_processed: 0,
                    predictions_published: 0,
                    predictions_blocked: 0,
                    block_reasons: serde_json::json!({}),
                    error: Some(e.to_string()),
                };
                if let Err(db_err) = self.db.finish_cycle(&failed) {
                    warn!(cycle_id, error = %db_err, "failed to record cycle failure");
                }
                Err(e)
            }
        }
    }

    async fn run_cycle_inner(&self, cycle_id: i64) -> Result<EngineCycle> {
        let started_at = Utc::now();
        let from = started_at + Duration::hours(self.config.kickoff_buffer_hours);
        let to = started_at + Duration::hours(self.config.lookahead_hours);

        let mut fixtures = match self.provider.upcoming_fixtures(from, to).await {
            Ok(fixtures) if !fixtures.is_empty() => fixtures,
            Ok(_) => {
                debug!("provider returned no fixtures, falling back to store");
                self.db
                    .list_scheduled_fixtures(from, to, self.config.fixture_cap as i64)?
            }
            Err(e) => {
                warn!(error = %e, "fixture discovery failed, falling back to store");
                self.db
                    .list_scheduled_fixtures(from, to, self.config.fixture_cap as i64)?
            }
        };
        fixtures.truncate(self.config.fixture_cap);
        for f in &fixtures {
            self.db.upsert_fixture(f)?;
        }
        let fixtures_found = fixtures.len() as i64;
        self.db.update_cycle_fixtures_found(cycle_id, fixtures_found)?;

        // Fixtures run strictly one at a time to stay inside provider rate
        // limits; only the per-fixture lookups fan out.
        let mut league_avgs: HashMap<i64, f64> = HashMap::new();
        let mut evaluations: Vec<FixtureEvaluation> = Vec::with_capacity(fixtures.len());
        let mut fixtures_processed = 0i64;

        for fixture in fixtures {
            let league_avg = match league_avgs.get(&fixture.league_id) {
                Some(avg) => *avg,
                None => {
                    let avg = self
                        .provider
                        .league_average_goals(fixture.league_id)
                        .await
                        .unwrap_or(crate::provider::DEFAULT_LEAGUE_AVG_GOALS);
                    league_avgs.insert(fixture.league_id, avg);
                    avg
                }
            };

            match self.evaluate_fixture(&fixture, league_avg).await {
                Ok(evaluation) => {
                    fixtures_processed += 1;
                    evaluations.push(evaluation);
                }
                Err(e) => {
                    warn!(fixture_id = fixture.id, error = %e, "fixture evaluation failed");
                }
            }
        }

        apply_daily_quota(&mut evaluations, self.config.daily_quota);

        let now = Utc::now();
        let mut published = 0i64;
        let mut blocked = 0i64;
        let mut reason_counts: HashMap<&'static str, i64> = HashMap::new();
        for evaluation in &evaluations {
            let rows = to_predictions(evaluation, cycle_id, now);
            for row in &rows {
                if row.decision == "PUBLISH" {
                    published += 1;
                } else {
                    blocked += 1;
                    if let Some(reason) = &row.reason {
                        if let Some(known) = BlockReason::from_str_static(reason) {
                            *reason_counts.entry(known).or_insert(0) += 1;
                        }
                    }
                }
            }
            self.db
                .supersede_and_insert_predictions(evaluation.fixture.id, &rows)?;
        }

        Ok(EngineCycle {
            id: Some(cycle_id),
            status: "SUCCESS".to_string(),
            started_at,
            finished_at: Some(Utc::now()),
            fixtures_found,
            fixtures_processed,
            predictions_published: published,
            predictions_blocked: blocked,
            block_reasons: serde_json::to_value(
                reason_counts
                    .into_iter()
                    .collect::<std::collections::BTreeMap<_, _>>(),
            )?,
            error: None,
        })
    }

    async fn evaluate_fixture(
        &self,
        fixture: &Fixture,
        league_avg_goals: f64,
    ) -> Result<FixtureEvaluation> {
        // Odds first: refresh points and recompute the windowed consensus.
        let now = Utc::now();
        match self.provider.odds_for_fixture(fixture.id).await {
            Ok(points) if !points.is_empty() => {
                self.db.insert_odds_points(&points)?;
            }
            Ok(_) => {}
            Err(e) => warn!(fixture_id = fixture.id, error = %e, "odds fetch failed"),
        }
        let window_start = now - Duration::hours(self.config.odds_window_hours);
        let recent = self.db.list_recent_odds_points(fixture.id, window_start)?;
        let averages = odds::compute_averages(&recent, now);
        self.db.upsert_odds_averages(&averages)?;
        let price_map = price_lookup(&averages);

        // Both histories in one round trip.
        let (home_matches, away_matches) = tokio::try_join!(
            self.provider
                .team_recent_matches(fixture.home_team_id, self.config.history_window),
            self.provider
                .team_recent_matches(fixture.away_team_id, self.config.history_window),
        )?;

        if home_matches.len() < self.config.min_history
            || away_matches.len() < self.config.min_history
        {
            debug!(
                fixture_id = fixture.id,
                home = home_matches.len(),
                away = away_matches.len(),
                "insufficient history"
            );
            return Ok(FixtureEvaluation::insufficient(fixture.clone()));
        }

        let league_avg_per_team = league_avg_goals / 2.0;
        let home = team_strength(&home_matches, fixture.home_team_id, league_avg_per_team);
        let away = team_strength(&away_matches, fixture.away_team_id, league_avg_per_team);

        let goals = poisson::expected_goals(
            league_avg_per_team,
            home.attack,
            away.defense_weakness,
            away.attack,
            home.defense_weakness,
        );
        let score = poisson::scoreline_probabilities_with_penalty(
            goals.lambda_home,
            goals.lambda_away,
            league_avg_per_team,
        );

        let home_elo = elo::derive_rating(&home_matches, fixture.home_team_id);
        let away_elo = elo::derive_rating(&away_matches, fixture.away_team_id);
        let outcome = elo::match_probabilities(home_elo, away_elo, self.config.base_draw_rate);

        let mut candidates: Vec<EvaluatedCandidate> = build_candidates(&outcome, &score)
            .into_iter()
            .map(|(market, selection, line, p)| {
                let avg = price_map
                    .get(&(market, line.map(line_key), selection))
                    .copied();
                gate_candidate(market, selection, line, p, avg, &self.config)
            })
            .collect();
        let winner = select_winner(&mut candidates);

        Ok(FixtureEvaluation {
            fixture: fixture.clone(),
            candidates,
            winner,
            insufficient_history: false,
        })
    }
}

fn line_key(line: f64) -> i64 {
    (line * 1000.0).round() as i64
}

fn price_lookup(averages: &[OddsAverage]) -> HashMap<(Market, Option<i64>, Selection), f64> {
    averages
        .iter()
        .map(|a| ((a.market, a.line.map(line_key), a.selection), a.avg_odds))
        .collect()
}

impl BlockReason {
    /// Reverse of `as_str`, restricted to the static vocabulary.
    fn from_str_static(s: &str) -> Option<&'static str> {
        [
            BlockReason::MissingOdds,
            BlockReason::LowOdds,
            BlockReason::LowProb,
            BlockReason::LowEdge,
            BlockReason::BetterPickExists,
            BlockReason::DailyLimit,
            BlockReason::InsufficientHistory,
            BlockReason::ReplacedByNewRun,
        ]
        .iter()
        .find(|b| b.as_str() == s)
        .map(|b| b.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    fn unblocked(adjusted: f64, odds: f64) -> EvaluatedCandidate {
        EvaluatedCandidate {
            market: Market::OneXTwo,
            selection: Selection::Home,
            line: None,
            model_probability: adjusted,
            avg_odds: odds,
            implied_probability: 1.0 / odds,
            adjusted_probability: adjusted,
            block: None,
        }
    }

    #[test]
    fn missing_odds_blocks_first() {
        let c = gate_candidate(Market::OneXTwo, Selection::Home, None, 0.95, None, &config());
        assert_eq!(c.block, Some(BlockReason::MissingOdds));
        // Without a price the raw model probability passes through.
        assert_relative_eq!(c.adjusted_probability, 0.95, epsilon = 1e-12);
    }

    #[test]
    fn low_odds_blocks_before_low_prob() {
        let c = gate_candidate(
            Market::OneXTwo,
            Selection::Home,
            None,
            0.40,
            Some(1.30),
            &config(),
        );
        assert_eq!(c.block, Some(BlockReason::LowOdds));
    }

    #[test]
    fn low_prob_blocks_before_low_edge() {
        // odds 1.60 → implied 0.625; model 0.60 → adjusted well below 0.70.
        let c = gate_candidate(
            Market::OneXTwo,
            Selection::Home,
            None,
            0.60,
            Some(1.60),
            &config(),
        );
        assert_eq!(c.block, Some(BlockReason::LowProb));
    }

    #[test]
    fn low_edge_blocks_last() {
        // model 0.85, odds 1.50: implied 0.6667, adjusted 0.7075,
        // edge 0.0408 < 0.05.
        let c = gate_candidate(
            Market::OneXTwo,
            Selection::Home,
            None,
            0.85,
            Some(1.50),
            &config(),
        );
        assert!(c.adjusted_probability >= 0.70);
        assert_eq!(c.block, Some(BlockReason::LowEdge));
    }

    #[test]
    fn publishable_candidate_passes_all_gates() {
        // model 0.95, odds 1.55 → implied 0.645, adjusted ≈ 0.746, edge ≈ 0.10
        let c = gate_candidate(
            Market::OneXTwo,
            Selection::Home,
            None,
            0.95,
            Some(1.55),
            &config(),
        );
        assert_eq!(c.block, None);
    }

    #[test]
    fn candidate_grid_has_eleven_rows() {
        let outcome = MatchProbabilities {
            home: 0.5,
            draw: 0.25,
            away: 0.25,
        };
        let score = poisson::scoreline_probabilities(1.4, 1.1);
        let rows = build_candidates(&outcome, &score);
        assert_eq!(rows.len(), 11);
        // BTTS sides are complementary.
        let yes = rows.iter().find(|r| r.1 == Selection::Yes).unwrap().3;
        let no = rows.iter().find(|r| r.1 == Selection::No).unwrap().3;
        assert_relative_eq!(yes + no, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn winner_is_highest_adjusted_probability() {
        let mut candidates = vec![unblocked(0.72, 1.8), unblocked(0.78, 1.6), unblocked(0.74, 2.0)];
        let w = select_winner(&mut candidates).unwrap();
        assert_eq!(w, 1);
        assert_eq!(candidates[0].block, Some(BlockReason::BetterPickExists));
        assert_eq!(candidates[2].block, Some(BlockReason::BetterPickExists));
        assert_eq!(candidates[1].block, None);
    }

    #[test]
    fn winner_tie_goes_to_higher_price() {
        let mut candidates = vec![unblocked(0.7501, 1.7), unblocked(0.7500, 2.1)];
        let w = select_winner(&mut candidates).unwrap();
        assert_eq!(w, 1);
    }

    #[test]
    fn no_winner_when_everything_blocked() {
        let mut candidates = vec![unblocked(0.72, 1.8)];
        candidates[0].block = Some(BlockReason::LowEdge);
        assert_eq!(select_winner(&mut candidates), None);
    }

    #[test]
    fn team_strength_normalizes_by_league_average() {
        let matches = vec![
            CompletedMatch {
                home_team_id: 10,
                away_team_id: 20,
                home_goals: 2,
                away_goals: 1,
            },
            CompletedMatch {
                home_team_id: 30,
                away_team_id: 10,
                home_goals: 0,
                away_goals: 2,
            },
        ];
        // Team 10 scored 4 and conceded 1 over 2 matches.
        let s = team_strength(&matches, 10, 1.25);
        assert_relative_eq!(s.attack, 2.0 / 1.25, epsilon = 1e-12);
        assert_relative_eq!(s.defense_weakness, 0.5 / 1.25, epsilon = 1e-12);
    }

    #[test]
    fn team_strength_defaults_without_matches() {
        let s = team_strength(&[], 10, 1.25);
        assert_relative_eq!(s.attack, 1.0, epsilon = 1e-12);
        assert_relative_eq!(s.defense_weakness, 1.0, epsilon = 1e-12);
    }

    fn eval_with_winner(fixture_id: i64, day: u32, ev_odds: f64) -> FixtureEvaluation {
        let kickoff = Utc.with_ymd_and_hms(2026, 8, day, 18, 0, 0).unwrap();
        let mut candidates = vec![unblocked(0.75, ev_odds)];
        let winner = select_winner(&mut candidates);
        FixtureEvaluation {
            fixture: Fixture {
                id: fixture_id,
                league_id: 8,
                home_team_id: 10,
                away_team_id: 20,
                home_team: None,
                away_team: None,
                kickoff_at: kickoff,
                status: "scheduled".into(),
                home_score: None,
                away_score: None,
            },
            candidates,
            winner,
            insufficient_history: false,
        }
    }

    #[test]
    fn daily_quota_keeps_highest_ev_picks() {
        // Three same-day winners, quota 2: the lowest EV gets cut.
        let mut evals = vec![
            eval_with_winner(1, 27, 1.6), // ev = 0.75·1.6 − 1 = 0.20
            eval_with_winner(2, 27, 1.9), // ev = 0.425
            eval_with_winner(3, 27, 1.7), // ev = 0.275
        ];
        apply_daily_quota(&mut evals, 2);
        assert!(evals[0].winner.is_none());
        assert_eq!(evals[0].candidates[0].block, Some(BlockReason::DailyLimit));
        assert!(evals[1].winner.is_some());
        assert!(evals[2].winner.is_some());
    }

    #[test]
    fn daily_quota_is_per_utc_date() {
        let mut evals = vec![
            eval_with_winner(1, 27, 1.6),
            eval_with_winner(2, 28, 1.6),
        ];
        apply_daily_quota(&mut evals, 1);
        assert!(evals[0].winner.is_some());
        assert!(evals[1].winner.is_some());
    }

    #[test]
    fn sentinel_row_for_insufficient_history() {
        let eval = FixtureEvaluation::insufficient(Fixture {
            id: 5,
            league_id: 8,
            home_team_id: 10,
            away_team_id: 20,
            home_team: None,
            away_team: None,
            kickoff_at: Utc::now(),
            status: "scheduled".into(),
            home_score: None,
            away_score: None,
        });
        let rows = to_predictions(&eval, 1, Utc::now());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].market, "ALL");
        assert_eq!(rows[0].selection, "N/A");
        assert_eq!(rows[0].decision, "BLOCK");
        assert_eq!(rows[0].reason.as_deref(), Some("INSUFFICIENT_HISTORY"));
    }

    #[test]
    fn predictions_carry_single_publish_row() {
        let eval = eval_with_winner(1, 27, 1.8);
        let rows = to_predictions(&eval, 1, Utc::now());
        let published = rows.iter().filter(|r| r.decision == "PUBLISH").count();
        assert_eq!(published, 1);
    }
}
