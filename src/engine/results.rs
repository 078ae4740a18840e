//! Result sync: pull final scores for fixtures with published predictions,
//! grade each prediction, and settle any bets riding on them.

use anyhow::Result;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::models::Outcome;
use crate::db::Database;
use crate::ledger::Ledger;
use crate::provider::SportsDataProvider;

const KICKOFF_SETTLE_BUFFER_HOURS: i64 = 2;

/// Grade one published prediction against a final score. Returns `None` for
/// rows that cannot be graded (unknown market vocabulary).
pub fn prediction_outcome(
    market: &str,
    selection: &str,
    line: Option<f64>,
    home_score: i64,
    away_score: i64,
) -> Option<Outcome> {
    match market {
        "1X2" => {
            let winner = if home_score > away_score {
                "HOME"
            } else if home_score < away_score {
                "AWAY"
            } else {
                "DRAW"
            };
            Some(if selection == winner {
                Outcome::Won
            } else {
                Outcome::Lost
            })
        }
        "BTTS" => {
            let both = home_score > 0 && away_score > 0;
            let hit = match selection {
                "YES" => both,
                "NO" => !both,
                _ => return None,
            };
            Some(if hit { Outcome::Won } else { Outcome::Lost })
        }
        "OU" => {
            let line = line?;
            let total = (home_score + away_score) as f64;
            // An exact hit on an integer line is a push.
            if (total - line).abs() < f64::EPSILON {
                return Some(Outcome::Push);
            }
            let over = total > line;
            let hit = match selection {
                "OVER" => over,
                "UNDER" => !over,
                _ => return None,
            };
            Some(if hit { Outcome::Won } else { Outcome::Lost })
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub predictions_checked: usize,
    pub fixtures_updated: usize,
    pub predictions_settled: usize,
    pub bets_settled: usize,
    pub errors: Vec<String>,
}

pub struct ResultsSyncer {
    db: Database,
    provider: Arc<dyn SportsDataProvider>,
    ledger: Ledger,
}

impl ResultsSyncer {
    pub fn new(db: Database, provider: Arc<dyn SportsDataProvider>, ledger: Ledger) -> Self {
        ResultsSyncer {
            db,
            provider,
            ledger,
        }
    }

    /// One sync pass. Partial failure is expected: a fixture that cannot be
    /// refreshed is reported and skipped, everything else still settles.
    pub async fn sync(&self) -> Result<SyncReport> {
        // Matches need time to finish; only look at fixtures that kicked
        // off at least this long ago.
        let cutoff = Utc::now() - Duration::hours(KICKOFF_SETTLE_BUFFER_HOURS);
        let due = self.db.list_unsettled_published(cutoff)?;
        let mut report = SyncReport {
            predictions_checked: due.len(),
            ..SyncReport::default()
        };
        if due.is_empty() {
            return Ok(report);
        }

        let mut fixture_ids: Vec<i64> = due.iter().map(|p| p.fixture_id).collect();
        fixture_ids.sort_unstable();
        fixture_ids.dedup();

        let fetched = match self.provider.fixtures_by_ids(&fixture_ids).await {
            Ok(fixtures) => fixtures,
            Err(e) => {
                report.errors.push(format!("fixture refresh failed: {e}"));
                return Ok(report);
            }
        };

        let mut finals: HashMap<i64, (i64, i64)> = HashMap::new();
        for fixture in fetched {
            let (Some(home), Some(away)) = (fixture.home_score, fixture.away_score) else {
                continue;
            };
            if fixture.status != "finished" {
                continue;
            }
            if let Err(e) = self.db.record_fixture_result(fixture.id, home, away) {
                report
                    .errors
                    .push(format!("fixture {} result write failed: {e}", fixture.id));
                continue;
            }
            finals.insert(fixture.id, (home, away));
            report.fixtures_updated += 1;
        }

        for prediction in due {
            let Some((home, away)) = finals.get(&prediction.fixture_id).copied() else {
                continue;
            };
            let Some(id) = prediction.id else { continue };
            match prediction_outcome(
                &prediction.market,
                &prediction.selection,
                prediction.line,
                home,
                away,
            ) {
                Some(outcome) => {
                    if let Err(e) = self.db.settle_prediction(id, outcome) {
                        report
                            .errors
                            .push(format!("prediction {id} settle failed: {e}"));
                        continue;
                    }
                    report.predictions_settled += 1;
                }
                None => {
                    warn!(
                        prediction_id = id,
                        market = %prediction.market,
                        "ungradable prediction"
                    );
                }
            }
        }

        report.bets_settled = self.ledger.settle_due_bets()?;
        info!(
            checked = report.predictions_checked,
            settled = report.predictions_settled,
            bets = report.bets_settled,
            "result sync finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Bankroll, BetResult, Fixture, Prediction};
    use crate::models::elo::CompletedMatch;
    use crate::db::models::OddsPoint;
    use crate::staking::{KellyConfig, StakePolicy};
    use async_trait::async_trait;
    use chrono::DateTime;

    #[test]
    fn one_x_two_grading() {
        assert_eq!(
            prediction_outcome("1X2", "HOME", None, 2, 1),
            Some(Outcome::Won)
        );
        assert_eq!(
            prediction_outcome("1X2", "HOME", None, 1, 1),
            Some(Outcome::Lost)
        );
        assert_eq!(
            prediction_outcome("1X2", "DRAW", None, 1, 1),
            Some(Outcome::Won)
        );
        assert_eq!(
            prediction_outcome("1X2", "AWAY", None, 0, 3),
            Some(Outcome::Won)
        );
    }

    #[test]
    fn btts_grading() {
        assert_eq!(
            prediction_outcome("BTTS", "YES", None, 1, 2),
            Some(Outcome::Won)
        );
        assert_eq!(
            prediction_outcome("BTTS", "YES", None, 0, 2),
            Some(Outcome::Lost)
        );
        assert_eq!(
            prediction_outcome("BTTS", "NO", None, 0, 0),
            Some(Outcome::Won)
        );
    }

    #[test]
    fn over_under_grading_with_push() {
        assert_eq!(
            prediction_outcome("OU", "OVER", Some(2.5), 2, 1),
            Some(Outcome::Won)
        );
        assert_eq!(
            prediction_outcome("OU", "UNDER", Some(2.5), 2, 1),
            Some(Outcome::Lost)
        );
        // Total exactly on an integer line pushes either side.
        assert_eq!(
            prediction_outcome("OU", "OVER", Some(3.0), 2, 1),
            Some(Outcome::Push)
        );
        assert_eq!(
            prediction_outcome("OU", "UNDER", Some(3.0), 1, 2),
            Some(Outcome::Push)
        );
    }

    #[test]
    fn sentinel_rows_are_ungradable() {
        assert_eq!(prediction_outcome("ALL", "N/A", None, 1, 0), None);
    }

    struct StubProvider {
        fixtures: Vec<Fixture>,
    }

    #[async_trait]
    impl SportsDataProvider for StubProvider {
        async fn upcoming_fixtures(
            &self,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<Vec<Fixture>> {
            Ok(vec![])
        }

        async fn team_recent_matches(
            &self,
            _team_id: i64,
            _limit: usize,
        ) -> Result<Vec<CompletedMatch>> {
            Ok(vec![])
        }

        async fn league_average_goals(&self, _league_id: i64) -> Result<f64> {
            Ok(2.5)
        }

        async fn odds_for_fixture(&self, _fixture_id: i64) -> Result<Vec<OddsPoint>> {
            Ok(vec![])
        }

        async fn fixtures_by_ids(&self, ids: &[i64]) -> Result<Vec<Fixture>> {
            Ok(self
                .fixtures
                .iter()
                .filter(|f| ids.contains(&f.id))
                .cloned()
                .collect())
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn fixture(id: i64, status: &str, score: Option<(i64, i64)>) -> Fixture {
        Fixture {
            id,
            league_id: 8,
            home_team_id: 10,
            away_team_id: 20,
            home_team: None,
            away_team: None,
            // Far enough in the past to clear the settle buffer.
            kickoff_at: Utc::now() - Duration::hours(48),
            status: status.into(),
            home_score: score.map(|(h, _)| h),
            away_score: score.map(|(_, a)| a),
        }
    }

    fn published(fixture_id: i64, market: &str, selection: &str, line: Option<f64>) -> Prediction {
        Prediction {
            id: None,
            fixture_id,
            cycle_id: Some(1),
            market: market.into(),
            line,
            selection: selection.into(),
            model_probability: 0.75,
            adjusted_probability: 0.73,
            avg_odds: 1.8,
            implied_probability: 1.0 / 1.8,
            decision: "PUBLISH".into(),
            reason: None,
            outcome: None,
            settled_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sync_settles_predictions_and_bets() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_fixture(&fixture(1, "scheduled", None)).unwrap();
        db.supersede_and_insert_predictions(1, &[published(1, "1X2", "HOME", None)])
            .unwrap();
        let pred_id = db.list_predictions_for_fixture(1).unwrap()[0].id.unwrap();

        let ledger = Ledger::new(db.clone(), KellyConfig::default(), "EUR".into());
        ledger.ensure_bankroll("u1", 1000.0).unwrap();
        let bet = ledger
            .place_bet("u1", pred_id, StakePolicy::Kelly, None, None)
            .unwrap();

        let provider = Arc::new(StubProvider {
            fixtures: vec![fixture(1, "finished", Some((2, 0)))],
        });
        let syncer = ResultsSyncer::new(db.clone(), provider, ledger.clone());
        let report = syncer.sync().await.unwrap();

        assert_eq!(report.fixtures_updated, 1);
        assert_eq!(report.predictions_settled, 1);
        assert_eq!(report.bets_settled, 1);
        assert!(report.errors.is_empty());

        let settled = db.get_prediction(pred_id).unwrap().unwrap();
        assert_eq!(settled.outcome.as_deref(), Some("won"));
        let stored_bet = db.get_bet(bet.id.unwrap()).unwrap().unwrap();
        assert_eq!(stored_bet.status, "WON");

        let bankroll = ledger.bankroll("u1").unwrap().unwrap();
        assert_eq!(bankroll.last_results[0], BetResult::Win);
    }

    #[tokio::test]
    async fn sync_skips_unfinished_fixtures() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_fixture(&fixture(1, "scheduled", None)).unwrap();
        db.supersede_and_insert_predictions(1, &[published(1, "OU", "OVER", Some(2.5))])
            .unwrap();

        let ledger = Ledger::new(db.clone(), KellyConfig::default(), "EUR".into());
        let provider = Arc::new(StubProvider {
            fixtures: vec![fixture(1, "scheduled", None)],
        });
        let syncer = ResultsSyncer::new(db.clone(), provider, ledger);
        let report = syncer.sync().await.unwrap();

        assert_eq!(report.predictions_checked, 1);
        assert_eq!(report.fixtures_updated, 0);
        assert_eq!(report.predictions_settled, 0);
    }
}
