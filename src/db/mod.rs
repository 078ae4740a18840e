use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

pub mod models;
use models::*;

/// Thread-safe SQLite handle (single connection behind a mutex).
///
/// Bet settlement and prediction supersession run inside explicit
/// transactions so the paired writes land as a unit.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// In-memory database for tests.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent).
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Fixtures ──────────────────────────────────────────────────────────────

    /// Upsert a fixture discovered from the provider (or the local fallback).
    pub fn upsert_fixture(&self, fixture: &Fixture) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO fixtures (id, league_id, home_team_id, away_team_id,
                                   home_team, away_team, kickoff_at, status,
                                   home_score, away_score)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
             ON CONFLICT(id) DO UPDATE SET
                league_id=excluded.league_id,
                home_team_id=excluded.home_team_id,
                away_team_id=excluded.away_team_id,
                home_team=COALESCE(excluded.home_team, fixtures.home_team),
                away_team=COALESCE(excluded.away_team, fixtures.away_team),
                kickoff_at=excluded.kickoff_at,
                status=excluded.status",
            params![
                fixture.id,
                fixture.league_id,
                fixture.home_team_id,
                fixture.away_team_id,
                fixture.home_team,
                fixture.away_team,
                fixture.kickoff_at,
                fixture.status,
                fixture.home_score,
                fixture.away_score,
            ],
        )?;
        Ok(())
    }

    /// Scheduled fixtures inside a kickoff window; local fallback when the
    /// provider returns nothing.
    pub fn list_scheduled_fixtures(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Fixture>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, league_id, home_team_id, away_team_id, home_team,
                    away_team, kickoff_at, status, home_score, away_score
             FROM fixtures
             WHERE status='scheduled' AND kickoff_at >= ?1 AND kickoff_at <= ?2
             ORDER BY kickoff_at ASC LIMIT ?3",
        )?;
        let fixtures = stmt
            .query_map(params![from, to, limit], map_fixture)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(fixtures)
    }

    /// Record a final score and flip the fixture to finished.
    pub fn record_fixture_result(&self, id: i64, home_score: i64, away_score: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE fixtures SET home_score=?1, away_score=?2, status='finished' WHERE id=?3",
            params![home_score, away_score, id],
        )?;
        Ok(())
    }

    // ── Odds points (append-only) ─────────────────────────────────────────────

    /// Append observed odds points. Duplicates on the natural key are ignored
    /// so re-runs stay idempotent.
    pub fn insert_odds_points(&self, points: &[OddsPoint]) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO odds_points
                    (fixture_id, bookmaker_id, market, line, selection,
                     odds_decimal, ts_utc, source)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
            )?;
            for p in points {
                inserted += stmt.execute(params![
                    p.fixture_id,
                    p.bookmaker_id,
                    p.market.as_str(),
                    p.line,
                    p.selection.as_str(),
                    p.odds_decimal,
                    p.ts_utc,
                    p.source,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// All points for a fixture observed since `window_start`.
    pub fn list_recent_odds_points(
        &self,
        fixture_id: i64,
        window_start: DateTime<Utc>,
    ) -> Result<Vec<OddsPoint>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT fixture_id, bookmaker_id, market, line, selection,
                    odds_decimal, ts_utc, source
             FROM odds_points
             WHERE fixture_id=?1 AND ts_utc >= ?2
             ORDER BY ts_utc ASC",
        )?;
        let points = stmt
            .query_map(params![fixture_id, window_start], map_odds_point)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(points)
    }

    // ── Odds averages ─────────────────────────────────────────────────────────

    pub fn upsert_odds_averages(&self, averages: &[OddsAverage]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO odds_averages
                    (fixture_id, market, line, selection, avg_odds,
                     bookmaker_count, window_end_utc, source)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
                 ON CONFLICT(fixture_id, market, line, selection, source, window_end_utc)
                 DO UPDATE SET
                    avg_odds=excluded.avg_odds,
                    bookmaker_count=excluded.bookmaker_count",
            )?;
            for a in averages {
                stmt.execute(params![
                    a.fixture_id,
                    a.market.as_str(),
                    a.line,
                    a.selection.as_str(),
                    a.avg_odds,
                    a.bookmaker_count,
                    a.window_end_utc,
                    a.source,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // ── Predictions ───────────────────────────────────────────────────────────

    /// Atomically supersede a fixture's unprotected PUBLISH rows and insert
    /// the new cycle's rows. Protected ids are re-read inside the transaction
    /// so a stale caller snapshot cannot unprotect a freshly placed bet.
    pub fn supersede_and_insert_predictions(
        &self,
        fixture_id: i64,
        rows: &[Prediction],
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut protected = HashSet::new();
            {
                let mut stmt =
                    tx.prepare("SELECT DISTINCT prediction_id FROM bets WHERE fixture_id=?1")?;
                for id in stmt.query_map(params![fixture_id], |r| r.get::<_, i64>(0))? {
                    protected.insert(id?);
                }
                let mut stmt = tx.prepare(
                    "SELECT id FROM predictions WHERE fixture_id=?1 AND outcome IS NOT NULL",
                )?;
                for id in stmt.query_map(params![fixture_id], |r| r.get::<_, i64>(0))? {
                    protected.insert(id?);
                }
            }

            let publish_ids: Vec<i64> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM predictions WHERE fixture_id=?1 AND decision='PUBLISH'",
                )?;
                let ids = stmt
                    .query_map(params![fixture_id], |r| r.get::<_, i64>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                ids
            };

            for id in publish_ids {
                if protected.contains(&id) {
                    continue;
                }
                tx.execute(
                    "UPDATE predictions SET decision='BLOCK', reason=?1 WHERE id=?2",
                    params![BlockReason::ReplacedByNewRun.as_str(), id],
                )?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO predictions
                    (fixture_id, cycle_id, market, line, selection,
                     model_probability, adjusted_probability, avg_odds,
                     implied_probability, decision, reason, outcome,
                     settled_at, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
            )?;
            for p in rows {
                stmt.execute(params![
                    p.fixture_id,
                    p.cycle_id,
                    p.market,
                    p.line,
                    p.selection,
                    p.model_probability,
                    p.adjusted_probability,
                    p.avg_odds,
                    p.implied_probability,
                    p.decision,
                    p.reason,
                    p.outcome,
                    p.settled_at,
                    p.created_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_prediction(&self, id: i64) -> Result<Option<Prediction>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                &format!("{PREDICTION_SELECT} WHERE id=?1"),
                params![id],
                map_prediction,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_published_predictions(&self, limit: i64) -> Result<Vec<Prediction>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{PREDICTION_SELECT} WHERE decision='PUBLISH' ORDER BY created_at DESC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map(params![limit], map_prediction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_predictions_for_fixture(&self, fixture_id: i64) -> Result<Vec<Prediction>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{PREDICTION_SELECT} WHERE fixture_id=?1 ORDER BY id ASC"
        ))?;
        let rows = stmt
            .query_map(params![fixture_id], map_prediction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Published, still-unsettled predictions whose fixture kicked off before
    /// the cutoff. This is the result-sync work queue.
    pub fn list_unsettled_published(&self, kicked_off_before: DateTime<Utc>) -> Result<Vec<Prediction>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT p.id, p.fixture_id, p.cycle_id, p.market, p.line, p.selection,
                    p.model_probability, p.adjusted_probability, p.avg_odds,
                    p.implied_probability, p.decision, p.reason, p.outcome,
                    p.settled_at, p.created_at
             FROM predictions p
             JOIN fixtures f ON f.id = p.fixture_id
             WHERE p.decision='PUBLISH' AND p.outcome IS NULL AND f.kickoff_at < ?1",
        )?;
        let rows = stmt
            .query_map(params![kicked_off_before], map_prediction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn settle_prediction(&self, id: i64, outcome: Outcome) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE predictions SET outcome=?1, settled_at=?2 WHERE id=?3",
            params![outcome.as_str(), Utc::now(), id],
        )?;
        Ok(())
    }

    // ── Engine cycles ─────────────────────────────────────────────────────────

    pub fn create_cycle(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO engine_cycles (status, started_at, fixtures_found,
                                        fixtures_processed, predictions_published,
                                        predictions_blocked, block_reasons)
             VALUES ('RUNNING', ?1, 0, 0, 0, 0, '{}')",
            params![Utc::now()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_cycle_fixtures_found(&self, cycle_id: i64, found: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE engine_cycles SET fixtures_found=?1 WHERE id=?2",
            params![found, cycle_id],
        )?;
        Ok(())
    }

    /// Terminal update, written once at cycle end.
    pub fn finish_cycle(&self, cycle: &EngineCycle) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE engine_cycles SET
                status=?1, finished_at=?2, fixtures_found=?3, fixtures_processed=?4,
                predictions_published=?5, predictions_blocked=?6, block_reasons=?7,
                error=?8
             WHERE id=?9",
            params![
                cycle.status,
                cycle.finished_at,
                cycle.fixtures_found,
                cycle.fixtures_processed,
                cycle.predictions_published,
                cycle.predictions_blocked,
                cycle.block_reasons.to_string(),
                cycle.error,
                cycle.id,
            ],
        )?;
        Ok(())
    }

    pub fn list_cycles(&self, limit: i64) -> Result<Vec<EngineCycle>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, status, started_at, finished_at, fixtures_found,
                    fixtures_processed, predictions_published, predictions_blocked,
                    block_reasons, error
             FROM engine_cycles ORDER BY started_at DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], map_cycle)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Bankrolls ─────────────────────────────────────────────────────────────

    pub fn get_bankroll(&self, user_id: &str) -> Result<Option<Bankroll>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT user_id, currency, initial_bankroll, current_bankroll,
                        peak_bankroll, open_exposure, consecutive_losses,
                        last_results, day_key, day_risk_used, created_at, updated_at
                 FROM bankrolls WHERE user_id=?1",
                params![user_id],
                map_bankroll,
            )
            .optional()?;
        Ok(row)
    }

    pub fn insert_bankroll(&self, bankroll: &Bankroll) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO bankrolls
                (user_id, currency, initial_bankroll, current_bankroll,
                 peak_bankroll, open_exposure, consecutive_losses, last_results,
                 day_key, day_risk_used, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                bankroll.user_id,
                bankroll.currency,
                bankroll.initial_bankroll,
                bankroll.current_bankroll,
                bankroll.peak_bankroll,
                bankroll.open_exposure,
                bankroll.consecutive_losses,
                serde_json::to_string(&bankroll.last_results)?,
                bankroll.day_key,
                bankroll.day_risk_used,
                bankroll.created_at,
                bankroll.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn update_bankroll(&self, bankroll: &Bankroll) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::update_bankroll_on(&conn, bankroll)
    }

    fn update_bankroll_on(conn: &Connection, bankroll: &Bankroll) -> Result<()> {
        conn.execute(
            "UPDATE bankrolls SET
                currency=?1, initial_bankroll=?2, current_bankroll=?3,
                peak_bankroll=?4, open_exposure=?5, consecutive_losses=?6,
                last_results=?7, day_key=?8, day_risk_used=?9, updated_at=?10
             WHERE user_id=?11",
            params![
                bankroll.currency,
                bankroll.initial_bankroll,
                bankroll.current_bankroll,
                bankroll.peak_bankroll,
                bankroll.open_exposure,
                bankroll.consecutive_losses,
                serde_json::to_string(&bankroll.last_results)?,
                bankroll.day_key,
                bankroll.day_risk_used,
                bankroll.updated_at,
                bankroll.user_id,
            ],
        )?;
        Ok(())
    }

    // ── Bets ──────────────────────────────────────────────────────────────────

    /// Insert an OPEN bet and apply the exposure/day-risk lock to the bankroll
    /// in one transaction.
    pub fn place_bet(&self, bet: &Bet, bankroll_after: &Bankroll) -> Result<i64> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO bets
                (user_id, prediction_id, fixture_id, market, selection, line,
                 odds_decimal, model_probability, stake, stake_pct, currency,
                 status, pnl, locked_at, settled_at, stake_breakdown)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
            params![
                bet.user_id,
                bet.prediction_id,
                bet.fixture_id,
                bet.market,
                bet.selection,
                bet.line,
                bet.odds_decimal,
                bet.model_probability,
                bet.stake,
                bet.stake_pct,
                bet.currency,
                bet.status,
                bet.pnl,
                bet.locked_at,
                bet.settled_at,
                bet.stake_breakdown.as_ref().map(|v| v.to_string()),
            ],
        )?;
        let bet_id = tx.last_insert_rowid();
        Self::update_bankroll_on(&tx, bankroll_after)?;
        tx.commit()?;
        Ok(bet_id)
    }

    /// Apply a settlement: flip the bet to its terminal state and write the
    /// updated bankroll as a unit. Returns false if the bet was no longer
    /// OPEN (already settled by someone else).
    pub fn settle_bet(
        &self,
        bet_id: i64,
        status: &str,
        pnl: f64,
        settled_at: DateTime<Utc>,
        bankroll_after: &Bankroll,
    ) -> Result<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE bets SET status=?1, pnl=?2, settled_at=?3
             WHERE id=?4 AND status='OPEN'",
            params![status, pnl, settled_at, bet_id],
        )?;
        if updated == 0 {
            return Ok(false);
        }
        Self::update_bankroll_on(&tx, bankroll_after)?;
        tx.commit()?;
        Ok(true)
    }

    pub fn get_bet(&self, id: i64) -> Result<Option<Bet>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(&format!("{BET_SELECT} WHERE id=?1"), params![id], map_bet)
            .optional()?;
        Ok(row)
    }

    pub fn list_bets(&self, user_id: &str, limit: i64) -> Result<Vec<Bet>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{BET_SELECT} WHERE user_id=?1 ORDER BY locked_at DESC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![user_id, limit], map_bet)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Open bets whose prediction has a settled outcome, ready for ledger
    /// settlement. Returns (bet, prediction outcome).
    pub fn list_open_bets_with_settled_predictions(&self) -> Result<Vec<(Bet, Outcome)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT b.id, b.user_id, b.prediction_id, b.fixture_id, b.market,
                    b.selection, b.line, b.odds_decimal, b.model_probability,
                    b.stake, b.stake_pct, b.currency, b.status, b.pnl,
                    b.locked_at, b.settled_at, b.stake_breakdown, p.outcome
             FROM bets b
             JOIN predictions p ON p.id = b.prediction_id
             WHERE b.status='OPEN' AND p.outcome IS NOT NULL",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let bet = map_bet(row)?;
                let outcome: String = row.get(17)?;
                Ok((bet, outcome))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|(bet, outcome)| Outcome::parse(&outcome).map(|o| (bet, o)))
            .collect())
    }

    // ── Stats ─────────────────────────────────────────────────────────────────

    /// Aggregate betting analytics over settled bets.
    pub fn bet_analytics(&self, user_id: &str) -> Result<BetAnalytics> {
        let bets = self.list_bets(user_id, 10_000)?;
        let settled: Vec<&Bet> = bets.iter().filter(|b| b.status != "OPEN").collect();
        let total_stake: f64 = settled.iter().map(|b| b.stake).sum();
        let total_pnl: f64 = settled.iter().filter_map(|b| b.pnl).sum();
        let wins = settled.iter().filter(|b| b.status == "WON").count() as i64;
        let losses = settled.iter().filter(|b| b.status == "LOST").count() as i64;
        let voids = settled
            .iter()
            .filter(|b| b.status == "VOID" || b.status == "PUSH")
            .count() as i64;
        let decided = wins + losses;

        let mut per_market: std::collections::BTreeMap<String, MarketAnalytics> =
            std::collections::BTreeMap::new();
        for b in &settled {
            let entry = per_market.entry(b.market.clone()).or_default();
            entry.pnl += b.pnl.unwrap_or(0.0);
            if b.status == "WON" {
                entry.wins += 1;
            }
            if b.status != "VOID" && b.status != "PUSH" {
                entry.total += 1;
            }
        }

        Ok(BetAnalytics {
            total_bets: bets.len() as i64,
            settled_bets: settled.len() as i64,
            total_stake,
            total_pnl,
            wins,
            losses,
            voids,
            win_rate: if decided > 0 {
                wins as f64 / decided as f64
            } else {
                0.0
            },
            yield_pct: if total_stake > 0.0 {
                total_pnl / total_stake
            } else {
                0.0
            },
            per_market,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketAnalytics {
    pub pnl: f64,
    pub wins: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetAnalytics {
    pub total_bets: i64,
    pub settled_bets: i64,
    pub total_stake: f64,
    pub total_pnl: f64,
    pub wins: i64,
    pub losses: i64,
    pub voids: i64,
    pub win_rate: f64,
    pub yield_pct: f64,
    pub per_market: std::collections::BTreeMap<String, MarketAnalytics>,
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

const PREDICTION_SELECT: &str = "SELECT id, fixture_id, cycle_id, market, line, selection,
        model_probability, adjusted_probability, avg_odds, implied_probability,
        decision, reason, outcome, settled_at, created_at
 FROM predictions";

const BET_SELECT: &str = "SELECT id, user_id, prediction_id, fixture_id, market, selection, line,
        odds_decimal, model_probability, stake, stake_pct, currency, status,
        pnl, locked_at, settled_at, stake_breakdown
 FROM bets";

fn map_fixture(row: &rusqlite::Row) -> rusqlite::Result<Fixture> {
    Ok(Fixture {
        id: row.get(0)?,
        league_id: row.get(1)?,
        home_team_id: row.get(2)?,
        away_team_id: row.get(3)?,
        home_team: row.get(4)?,
        away_team: row.get(5)?,
        kickoff_at: row.get(6)?,
        status: row.get(7)?,
        home_score: row.get(8)?,
        away_score: row.get(9)?,
    })
}

fn map_odds_point(row: &rusqlite::Row) -> rusqlite::Result<OddsPoint> {
    let market: String = row.get(2)?;
    let selection: String = row.get(4)?;
    Ok(OddsPoint {
        fixture_id: row.get(0)?,
        bookmaker_id: row.get(1)?,
        market: Market::parse(&market).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown market {market}").into(),
            )
        })?,
        line: row.get(3)?,
        selection: Selection::parse(&selection).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                format!("unknown selection {selection}").into(),
            )
        })?,
        odds_decimal: row.get(5)?,
        ts_utc: row.get(6)?,
        source: row.get(7)?,
    })
}

fn map_prediction(row: &rusqlite::Row) -> rusqlite::Result<Prediction> {
    Ok(Prediction {
        id: row.get(0)?,
        fixture_id: row.get(1)?,
        cycle_id: row.get(2)?,
        market: row.get(3)?,
        line: row.get(4)?,
        selection: row.get(5)?,
        model_probability: row.get(6)?,
        adjusted_probability: row.get(7)?,
        avg_odds: row.get(8)?,
        implied_probability: row.get(9)?,
        decision: row.get(10)?,
        reason: row.get(11)?,
        outcome: row.get(12)?,
        settled_at: row.get(13)?,
        created_at: row.get(14)?,
    })
}

fn map_cycle(row: &rusqlite::Row) -> rusqlite::Result<EngineCycle> {
    let reasons: String = row.get(8)?;
    Ok(EngineCycle {
        id: row.get(0)?,
        status: row.get(1)?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        fixtures_found: row.get(4)?,
        fixtures_processed: row.get(5)?,
        predictions_published: row.get(6)?,
        predictions_blocked: row.get(7)?,
        block_reasons: serde_json::from_str(&reasons)
            .unwrap_or(serde_json::Value::Object(Default::default())),
        error: row.get(9)?,
    })
}

fn map_bankroll(row: &rusqlite::Row) -> rusqlite::Result<Bankroll> {
    let results: String = row.get(7)?;
    Ok(Bankroll {
        user_id: row.get(0)?,
        currency: row.get(1)?,
        initial_bankroll: row.get(2)?,
        current_bankroll: row.get(3)?,
        peak_bankroll: row.get(4)?,
        open_exposure: row.get(5)?,
        consecutive_losses: row.get(6)?,
        last_results: serde_json::from_str(&results).unwrap_or_default(),
        day_key: row.get(8)?,
        day_risk_used: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn map_bet(row: &rusqlite::Row) -> rusqlite::Result<Bet> {
    let breakdown: Option<String> = row.get(16)?;
    Ok(Bet {
        id: row.get(0)?,
        user_id: row.get(1)?,
        prediction_id: row.get(2)?,
        fixture_id: row.get(3)?,
        market: row.get(4)?,
        selection: row.get(5)?,
        line: row.get(6)?,
        odds_decimal: row.get(7)?,
        model_probability: row.get(8)?,
        stake: row.get(9)?,
        stake_pct: row.get(10)?,
        currency: row.get(11)?,
        status: row.get(12)?,
        pnl: row.get(13)?,
        locked_at: row.get(14)?,
        settled_at: row.get(15)?,
        stake_breakdown: breakdown.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS fixtures (
    id            INTEGER PRIMARY KEY,
    league_id     INTEGER NOT NULL,
    home_team_id  INTEGER NOT NULL,
    away_team_id  INTEGER NOT NULL,
    home_team     TEXT,
    away_team     TEXT,
    kickoff_at    TEXT    NOT NULL,
    status        TEXT    NOT NULL DEFAULT 'scheduled',
    home_score    INTEGER,
    away_score    INTEGER
);

CREATE TABLE IF NOT EXISTS odds_points (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    fixture_id   INTEGER NOT NULL,
    bookmaker_id INTEGER NOT NULL,
    market       TEXT    NOT NULL,
    line         REAL,
    selection    TEXT    NOT NULL,
    odds_decimal REAL    NOT NULL,
    ts_utc       TEXT    NOT NULL,
    source       TEXT    NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_odds_points_key
    ON odds_points(fixture_id, market, IFNULL(line, -1), selection, source, ts_utc, bookmaker_id);

CREATE TABLE IF NOT EXISTS odds_averages (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    fixture_id      INTEGER NOT NULL,
    market          TEXT    NOT NULL,
    line            REAL,
    selection       TEXT    NOT NULL,
    avg_odds        REAL    NOT NULL,
    bookmaker_count INTEGER NOT NULL,
    window_end_utc  TEXT    NOT NULL,
    source          TEXT    NOT NULL,
    UNIQUE(fixture_id, market, line, selection, source, window_end_utc)
);

CREATE TABLE IF NOT EXISTS predictions (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    fixture_id           INTEGER NOT NULL,
    cycle_id             INTEGER,
    market               TEXT    NOT NULL,
    line                 REAL,
    selection            TEXT    NOT NULL,
    model_probability    REAL    NOT NULL,
    adjusted_probability REAL    NOT NULL,
    avg_odds             REAL    NOT NULL,
    implied_probability  REAL    NOT NULL,
    decision             TEXT    NOT NULL,
    reason               TEXT,
    outcome              TEXT,
    settled_at           TEXT,
    created_at           TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS engine_cycles (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    status                TEXT    NOT NULL DEFAULT 'RUNNING',
    started_at            TEXT    NOT NULL,
    finished_at           TEXT,
    fixtures_found        INTEGER NOT NULL DEFAULT 0,
    fixtures_processed    INTEGER NOT NULL DEFAULT 0,
    predictions_published INTEGER NOT NULL DEFAULT 0,
    predictions_blocked   INTEGER NOT NULL DEFAULT 0,
    block_reasons         TEXT    NOT NULL DEFAULT '{}',
    error                 TEXT
);

CREATE TABLE IF NOT EXISTS bankrolls (
    user_id            TEXT PRIMARY KEY,
    currency           TEXT NOT NULL,
    initial_bankroll   REAL NOT NULL,
    current_bankroll   REAL NOT NULL,
    peak_bankroll      REAL NOT NULL,
    open_exposure      REAL NOT NULL DEFAULT 0,
    consecutive_losses INTEGER NOT NULL DEFAULT 0,
    last_results       TEXT NOT NULL DEFAULT '[]',
    day_key            TEXT NOT NULL,
    day_risk_used      REAL NOT NULL DEFAULT 0,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bets (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id           TEXT    NOT NULL,
    prediction_id     INTEGER NOT NULL,
    fixture_id        INTEGER NOT NULL,
    market            TEXT    NOT NULL,
    selection         TEXT    NOT NULL,
    line              REAL,
    odds_decimal      REAL    NOT NULL,
    model_probability REAL    NOT NULL,
    stake             REAL    NOT NULL,
    stake_pct         REAL    NOT NULL,
    currency          TEXT    NOT NULL,
    status            TEXT    NOT NULL DEFAULT 'OPEN',
    pnl               REAL,
    locked_at         TEXT    NOT NULL,
    settled_at        TEXT,
    stake_breakdown   TEXT,
    FOREIGN KEY (prediction_id) REFERENCES predictions(id)
);

CREATE INDEX IF NOT EXISTS idx_fixtures_kickoff ON fixtures(status, kickoff_at);
CREATE INDEX IF NOT EXISTS idx_odds_points_fixture ON odds_points(fixture_id, ts_utc);
CREATE INDEX IF NOT EXISTS idx_odds_averages_lookup ON odds_averages(fixture_id, market, selection);
CREATE INDEX IF NOT EXISTS idx_predictions_fixture ON predictions(fixture_id, decision);
CREATE INDEX IF NOT EXISTS idx_bets_status ON bets(status);
CREATE INDEX IF NOT EXISTS idx_bets_user ON bets(user_id);
"#;
