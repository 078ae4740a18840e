//! Sports data provider: fixtures, match history, league stats and
//! bookmaker odds.
//!
//! The engine talks to the `SportsDataProvider` trait; the one concrete
//! implementation speaks the SportMonks v3 REST API. Responses are parsed
//! defensively from raw JSON since the upstream payloads drift.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::db::models::{Fixture, Market, OddsPoint};
use crate::models::elo::CompletedMatch;
use crate::odds;

/// Bookmakers whose prices enter the consensus average.
pub const BOOKMAKER_WHITELIST: [i64; 5] = [2, 5, 9, 20, 29];

/// Provider market ids carried downstream: fulltime result, both teams to
/// score, and the two goals over/under variants.
pub const TARGET_MARKET_IDS: [i64; 4] = [1, 14, 12, 80];

/// Provider state ids that mean the match has a final result.
pub const FINISHED_STATE_IDS: [i64; 3] = [5, 7, 8];

/// League average goals per match used when the stats lookup fails.
pub const DEFAULT_LEAGUE_AVG_GOALS: f64 = 2.5;

const MAX_RETRIES: u32 = 3;
const FIXTURE_BATCH_SIZE: usize = 50;

/// Everything the prediction engine needs from the outside world.
#[async_trait]
pub trait SportsDataProvider: Send + Sync {
    /// Scheduled fixtures kicking off inside `[from, to]`.
    async fn upcoming_fixtures(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Fixture>>;

    /// A team's finished matches, oldest first, capped at `limit`.
    async fn team_recent_matches(
        &self,
        team_id: i64,
        limit: usize,
    ) -> Result<Vec<CompletedMatch>>;

    /// Average total goals per match in the league.
    async fn league_average_goals(&self, league_id: i64) -> Result<f64>;

    /// Current pre-match odds points for one fixture, already normalized
    /// and filtered to whitelisted bookmakers and supported markets.
    async fn odds_for_fixture(&self, fixture_id: i64) -> Result<Vec<OddsPoint>>;

    /// Fixtures by id, with scores when finished. Used by result sync.
    async fn fixtures_by_ids(&self, ids: &[i64]) -> Result<Vec<Fixture>>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// SportMonks v3 client.
#[derive(Clone)]
pub struct SportMonksClient {
    http: Client,
    base_url: String,
    api_token: String,
}

impl SportMonksClient {
    pub fn new(base_url: &str, api_token: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(SportMonksClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        })
    }

    /// GET a JSON document with bounded retries. 429 and 5xx responses and
    /// transport errors back off exponentially with jitter; 4xx fails fast.
    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<serde_json::Value> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .with_context(|| format!("Invalid provider URL for {path}"))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("api_token", &self.api_token);
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }

        let mut attempt = 0;
        loop {
            debug!(path, attempt, "provider request");
            let result = self.http.get(url.clone()).send().await;
            match result {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<serde_json::Value>()
                        .await
                        .with_context(|| format!("Failed to parse provider response for {path}"));
                }
                Ok(resp) => {
                    let status = resp.status();
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if !retryable || attempt >= MAX_RETRIES {
                        let body = resp.text().await.unwrap_or_default();
                        anyhow::bail!("Provider error {status} for {path}: {body}");
                    }
                    warn!(path, %status, attempt, "provider request throttled, retrying");
                }
                Err(e) => {
                    if attempt >= MAX_RETRIES {
                        return Err(e).with_context(|| format!("Provider request failed for {path}"));
                    }
                    warn!(path, error = %e, attempt, "provider request failed, retrying");
                }
            }
            let jitter = rand::thread_rng().gen_range(0..250u64);
            let backoff = Duration::from_millis(500 * 2u64.pow(attempt) + jitter);
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl SportsDataProvider for SportMonksClient {
    async fn upcoming_fixtures(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Fixture>> {
        let path = format!(
            "/fixtures/between/{}/{}",
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );
        let raw = self
            .get_json(&path, &[("include", "participants".to_string())])
            .await?;
        let fixtures = data_array(&raw)
            .iter()
            .filter_map(parse_fixture)
            .filter(|f| f.status == "scheduled" && f.kickoff_at >= from && f.kickoff_at <= to)
            .collect();
        Ok(fixtures)
    }

    async fn team_recent_matches(
        &self,
        team_id: i64,
        limit: usize,
    ) -> Result<Vec<CompletedMatch>> {
        let path = format!("/fixtures/latest/{team_id}");
        let raw = self
            .get_json(&path, &[("include", "scores;participants".to_string())])
            .await?;
        let mut finished: Vec<(DateTime<Utc>, CompletedMatch)> = data_array(&raw)
            .iter()
            .filter(|item| {
                item["state_id"]
                    .as_i64()
                    .map(|s| FINISHED_STATE_IDS.contains(&s))
                    .unwrap_or(false)
            })
            .filter_map(|item| {
                let fixture = parse_fixture(item)?;
                let completed = CompletedMatch {
                    home_team_id: fixture.home_team_id,
                    away_team_id: fixture.away_team_id,
                    home_goals: fixture.home_score?,
                    away_goals: fixture.away_score?,
                };
                Some((fixture.kickoff_at, completed))
            })
            .collect();
        finished.sort_by_key(|(kickoff, _)| *kickoff);
        if finished.len() > limit {
            finished.drain(..finished.len() - limit);
        }
        Ok(finished.into_iter().map(|(_, m)| m).collect())
    }

    async fn league_average_goals(&self, league_id: i64) -> Result<f64> {
        let path = format!("/leagues/{league_id}");
        let raw = match self
            .get_json(&path, &[("include", "currentSeason.statistics".to_string())])
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(league_id, error = %e, "league stats fetch failed, using default");
                return Ok(DEFAULT_LEAGUE_AVG_GOALS);
            }
        };
        Ok(extract_goals_average(&raw).unwrap_or(DEFAULT_LEAGUE_AVG_GOALS))
    }

    async fn odds_for_fixture(&self, fixture_id: i64) -> Result<Vec<OddsPoint>> {
        let path = format!("/odds/pre-match/fixtures/{fixture_id}");
        let raw = self.get_json(&path, &[]).await?;
        Ok(data_array(&raw)
            .iter()
            .filter_map(|item| parse_odds_point(fixture_id, item))
            .collect())
    }

    async fn fixtures_by_ids(&self, ids: &[i64]) -> Result<Vec<Fixture>> {
        let mut fixtures = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(FIXTURE_BATCH_SIZE) {
            let csv = chunk
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            let path = format!("/fixtures/multi/{csv}");
            let raw = self
                .get_json(&path, &[("include", "scores;participants".to_string())])
                .await?;
            fixtures.extend(data_array(&raw).iter().filter_map(parse_fixture));
        }
        Ok(fixtures)
    }

    fn name(&self) -> &str {
        "sportmonks"
    }
}

// ── Parsing helpers ────────────────────────────────────────────────────────────

fn data_array(raw: &serde_json::Value) -> Vec<serde_json::Value> {
    match raw.get("data") {
        Some(serde_json::Value::Array(a)) => a.clone(),
        Some(v) if v.is_object() => vec![v.clone()],
        _ => vec![],
    }
}

fn parse_fixture(item: &serde_json::Value) -> Option<Fixture> {
    let id = item["id"].as_i64()?;
    let league_id = item["league_id"].as_i64()?;
    let kickoff_at = parse_provider_timestamp(item["starting_at"].as_str()?)?;

    let (home_team_id, home_team, away_team_id, away_team) = parse_participants(item)?;
    let state_id = item["state_id"].as_i64().unwrap_or(1);
    let status = if FINISHED_STATE_IDS.contains(&state_id) {
        "finished"
    } else {
        "scheduled"
    };
    let (home_score, away_score) = parse_scores(item);

    Some(Fixture {
        id,
        league_id,
        home_team_id,
        away_team_id,
        home_team,
        away_team,
        kickoff_at,
        status: status.to_string(),
        home_score,
        away_score,
    })
}

fn parse_participants(
    item: &serde_json::Value,
) -> Option<(i64, Option<String>, i64, Option<String>)> {
    let participants = item["participants"].as_array()?;
    let mut home = None;
    let mut away = None;
    for p in participants {
        let team_id = p["id"].as_i64()?;
        let name = p["name"].as_str().map(str::to_string);
        match p["meta"]["location"].as_str() {
            Some("home") => home = Some((team_id, name)),
            Some("away") => away = Some((team_id, name)),
            _ => {}
        }
    }
    let (home_id, home_name) = home?;
    let (away_id, away_name) = away?;
    Some((home_id, home_name, away_id, away_name))
}

/// Final score from the scores include: the CURRENT entries carry the
/// fulltime totals.
fn parse_scores(item: &serde_json::Value) -> (Option<i64>, Option<i64>) {
    let Some(scores) = item["scores"].as_array() else {
        return (None, None);
    };
    let mut home = None;
    let mut away = None;
    for s in scores {
        if s["description"].as_str() != Some("CURRENT") {
            continue;
        }
        let goals = s["score"]["goals"].as_i64();
        match s["score"]["participant"].as_str() {
            Some("home") => home = goals,
            Some("away") => away = goals,
            _ => {}
        }
    }
    (home, away)
}

/// One raw odds entry to a normalized point, or `None` when the bookmaker,
/// market, selection, line or price falls outside what we trade.
fn parse_odds_point(fixture_id: i64, item: &serde_json::Value) -> Option<OddsPoint> {
    let bookmaker_id = item["bookmaker_id"].as_i64()?;
    if !BOOKMAKER_WHITELIST.contains(&bookmaker_id) {
        return None;
    }
    let market_id = item["market_id"].as_i64()?;
    if !TARGET_MARKET_IDS.contains(&market_id) {
        return None;
    }
    let market = match market_id {
        1 => Market::OneXTwo,
        14 => Market::Btts,
        12 | 80 => Market::OverUnder,
        _ => return None,
    };

    let label = item["label"].as_str()?;
    let selection = odds::normalize_selection(market, label)?;

    let line = match market {
        Market::OverUnder => {
            let raw_line = item["total"]
                .as_str()
                .map(str::to_string)
                .or_else(|| item["total"].as_f64().map(|v| v.to_string()))?;
            let line = odds::normalize_line(&raw_line)?;
            if !odds::is_supported_line(line) {
                return None;
            }
            Some(line)
        }
        _ => None,
    };

    let odds_decimal = item["value"]
        .as_f64()
        .or_else(|| item["value"].as_str().and_then(|s| s.parse().ok()))
        .or_else(|| item["dp3"].as_str().and_then(|s| s.parse().ok()))?;
    if odds_decimal <= odds::MIN_VALID_PRICE || odds_decimal >= odds::MAX_VALID_PRICE {
        return None;
    }

    let ts_utc = item["latest_bookmaker_update"]
        .as_str()
        .and_then(parse_provider_timestamp)
        .unwrap_or_else(Utc::now);

    Some(OddsPoint {
        fixture_id,
        bookmaker_id,
        market,
        selection,
        line,
        odds_decimal,
        ts_utc,
        source: "sportmonks".to_string(),
    })
}

/// Provider timestamps are naive "YYYY-MM-DD HH:MM:SS" in UTC.
fn parse_provider_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Walk a league payload for a goals-per-match average. Seasons publish the
/// figure under details with a type code; accept a couple of shapes.
fn extract_goals_average(raw: &serde_json::Value) -> Option<f64> {
    let league = raw.get("data")?;
    let stats = league["currentseason"]["statistics"]
        .as_array()
        .or_else(|| league["currentSeason"]["statistics"].as_array())?;
    for s in stats {
        if let Some(avg) = s["details"]["goals_avg"].as_f64() {
            return Some(avg);
        }
        if s["type"]["code"].as_str() == Some("goals-avg") {
            if let Some(avg) = s["value"]
                .as_f64()
                .or_else(|| s["value"]["all"].as_f64())
            {
                return Some(avg);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Selection;
    use serde_json::json;

    fn fixture_payload() -> serde_json::Value {
        json!({
            "id": 19101, "league_id": 8, "state_id": 5,
            "starting_at": "2026-08-25 19:00:00",
            "participants": [
                { "id": 10, "name": "Home FC", "meta": { "location": "home" } },
                { "id": 20, "name": "Away FC", "meta": { "location": "away" } }
            ],
            "scores": [
                { "description": "CURRENT", "score": { "participant": "home", "goals": 2 } },
                { "description": "CURRENT", "score": { "participant": "away", "goals": 1 } },
                { "description": "1ST_HALF", "score": { "participant": "home", "goals": 1 } }
            ]
        })
    }

    #[test]
    fn parses_finished_fixture_with_fulltime_score() {
        let fixture = parse_fixture(&fixture_payload()).unwrap();
        assert_eq!(fixture.id, 19101);
        assert_eq!(fixture.status, "finished");
        assert_eq!(fixture.home_team_id, 10);
        assert_eq!(fixture.away_team_id, 20);
        assert_eq!(fixture.home_score, Some(2));
        assert_eq!(fixture.away_score, Some(1));
        assert_eq!(
            fixture.kickoff_at,
            parse_provider_timestamp("2026-08-25 19:00:00").unwrap()
        );
    }

    #[test]
    fn fixture_without_participants_is_dropped() {
        let mut payload = fixture_payload();
        payload["participants"] = json!([]);
        assert!(parse_fixture(&payload).is_none());
    }

    #[test]
    fn scheduled_state_maps_to_scheduled() {
        let mut payload = fixture_payload();
        payload["state_id"] = json!(1);
        let fixture = parse_fixture(&payload).unwrap();
        assert_eq!(fixture.status, "scheduled");
    }

    #[test]
    fn odds_point_filters_non_whitelisted_bookmaker() {
        let item = json!({
            "bookmaker_id": 99, "market_id": 1, "label": "Home", "value": "1.85"
        });
        assert!(parse_odds_point(1, &item).is_none());
    }

    #[test]
    fn odds_point_filters_foreign_market() {
        let item = json!({
            "bookmaker_id": 2, "market_id": 33, "label": "Home", "value": "1.85"
        });
        assert!(parse_odds_point(1, &item).is_none());
    }

    #[test]
    fn odds_point_parses_one_x_two() {
        let item = json!({
            "bookmaker_id": 2, "market_id": 1, "label": "Home", "value": "1.85",
            "latest_bookmaker_update": "2026-08-25 12:00:00"
        });
        let point = parse_odds_point(7, &item).unwrap();
        assert_eq!(point.fixture_id, 7);
        assert_eq!(point.market, Market::OneXTwo);
        assert_eq!(point.selection, Selection::Home);
        assert_eq!(point.line, None);
        assert!((point.odds_decimal - 1.85).abs() < 1e-9);
    }

    #[test]
    fn odds_point_requires_supported_total() {
        let supported = json!({
            "bookmaker_id": 5, "market_id": 80, "label": "Over", "total": "2.5", "value": 1.9
        });
        let point = parse_odds_point(7, &supported).unwrap();
        assert_eq!(point.market, Market::OverUnder);
        assert_eq!(point.line, Some(2.5));

        let unsupported = json!({
            "bookmaker_id": 5, "market_id": 80, "label": "Over", "total": "4.5", "value": 1.9
        });
        assert!(parse_odds_point(7, &unsupported).is_none());
    }

    #[test]
    fn odds_point_rejects_junk_price() {
        let item = json!({
            "bookmaker_id": 2, "market_id": 14, "label": "Yes", "value": "1.0"
        });
        assert!(parse_odds_point(1, &item).is_none());
    }

    #[test]
    fn goals_average_extraction_with_fallback_shapes() {
        let payload = json!({
            "data": {
                "currentseason": {
                    "statistics": [
                        { "details": { "goals_avg": 2.83 } }
                    ]
                }
            }
        });
        assert_eq!(extract_goals_average(&payload), Some(2.83));
        assert_eq!(extract_goals_average(&json!({ "data": {} })), None);
    }
}
