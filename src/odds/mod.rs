//! Odds normalization: maps heterogeneous raw market/selection/line strings
//! from the data provider into the canonical vocabulary and computes the
//! cross-bookmaker average price. All functions here are pure.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::db::models::{Market, OddsAverage, OddsPoint, Selection};

/// Decimal prices outside (1.01, 100) are treated as junk.
pub const MIN_VALID_PRICE: f64 = 1.01;
pub const MAX_VALID_PRICE: f64 = 100.0;

/// Over/Under lines retained downstream; everything else is dropped at ingest.
pub const OU_LINES: [f64; 3] = [1.5, 2.5, 3.5];

/// Map a raw provider market name to the canonical market, or `None` if the
/// market is not one we trade. Case- and separator-insensitive keyword match.
pub fn normalize_market(raw: &str) -> Option<Market> {
    let s: String = raw
        .to_lowercase()
        .chars()
        .map(|c| match c {
            '/' | '_' | '-' | '.' => ' ',
            c => c,
        })
        .collect();

    // Whitespace-free form so "full-time_result" and "Fulltime Result"
    // land on the same keyword.
    let compact: String = s.split_whitespace().collect();

    if s.contains("1x2")
        || s.contains("h2h")
        || s.contains("moneyline")
        || compact == "matchwinner"
        || compact.contains("fulltimeresult")
    {
        return Some(Market::OneXTwo);
    }
    if s.contains("btts") || s.contains("both teams to score") {
        return Some(Market::Btts);
    }
    if s.contains("over under")
        || s.contains("totals")
        || s.contains("total")
        || s.contains("goal line")
        || s.trim() == "ou"
    {
        return Some(Market::OverUnder);
    }
    None
}

/// Map a raw selection label/code to the canonical selection for the given
/// market. Returns `None` on unrecognized input; the caller must drop the point.
pub fn normalize_selection(market: Market, raw: &str) -> Option<Selection> {
    let s = raw.trim().to_lowercase();
    match market {
        Market::OneXTwo => match s.as_str() {
            "home" | "h" | "1" => Some(Selection::Home),
            "draw" | "d" | "x" => Some(Selection::Draw),
            "away" | "a" | "2" => Some(Selection::Away),
            _ => None,
        },
        Market::Btts => match s.as_str() {
            "yes" | "y" | "1" => Some(Selection::Yes),
            "no" | "n" | "0" => Some(Selection::No),
            _ => None,
        },
        Market::OverUnder => {
            if s.contains("over") || s == "o" {
                Some(Selection::Over)
            } else if s.contains("under") || s == "u" {
                Some(Selection::Under)
            } else {
                None
            }
        }
    }
}

/// Parse a numeric Over/Under line from a raw provider value.
pub fn normalize_line(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Whether a line is one of the supported Over/Under lines.
pub fn is_supported_line(line: f64) -> bool {
    OU_LINES.iter().any(|l| (l - line).abs() < f64::EPSILON)
}

/// Arithmetic mean over the valid-price subset, or `None` if nothing valid
/// remains. Callers are expected to pass one price per bookmaker (the latest
/// observation within the window) so no bookmaker is weighted by frequency.
pub fn average_price(prices: &[f64]) -> Option<f64> {
    let valid: Vec<f64> = prices
        .iter()
        .copied()
        .filter(|p| *p > MIN_VALID_PRICE && *p < MAX_VALID_PRICE)
        .collect();
    if valid.is_empty() {
        return None;
    }
    Some(valid.iter().sum::<f64>() / valid.len() as f64)
}

/// Every selection a market must quote before any of its averages count.
pub fn required_selections(market: Market) -> &'static [Selection] {
    match market {
        Market::OneXTwo => &[Selection::Home, Selection::Draw, Selection::Away],
        Market::Btts => &[Selection::Yes, Selection::No],
        Market::OverUnder => &[Selection::Over, Selection::Under],
    }
}

/// Consensus averages from a window of observed points: for each
/// (market, line, selection), keep only the latest observation per bookmaker,
/// then average. One bookmaker, one vote.
///
/// Averages are all-or-nothing per (market, line): unless every required
/// selection has a valid average, the whole group is dropped so a candidate
/// is never gated against one-sided market data.
pub fn compute_averages(points: &[OddsPoint], window_end: DateTime<Utc>) -> Vec<OddsAverage> {
    // Latest point per (market, line-in-millis, selection, bookmaker).
    let mut latest: HashMap<(Market, Option<i64>, Selection, i64), &OddsPoint> = HashMap::new();
    for p in points {
        let line_key = p.line.map(|l| (l * 1000.0).round() as i64);
        let key = (p.market, line_key, p.selection, p.bookmaker_id);
        match latest.get(&key) {
            Some(existing) if existing.ts_utc >= p.ts_utc => {}
            _ => {
                latest.insert(key, p);
            }
        }
    }

    let mut grouped: HashMap<(Market, Option<i64>, Selection), Vec<&OddsPoint>> = HashMap::new();
    for ((market, line_key, selection, _), p) in latest {
        grouped
            .entry((market, line_key, selection))
            .or_default()
            .push(p);
    }

    let mut by_market: HashMap<(Market, Option<i64>), Vec<OddsAverage>> = HashMap::new();
    for ((market, line_key, _), group) in grouped {
        let prices: Vec<f64> = group.iter().map(|p| p.odds_decimal).collect();
        let Some(avg_odds) = average_price(&prices) else {
            continue;
        };
        let first = group[0];
        by_market.entry((market, line_key)).or_default().push(OddsAverage {
            fixture_id: first.fixture_id,
            market: first.market,
            line: first.line,
            selection: first.selection,
            avg_odds,
            bookmaker_count: group.len() as i64,
            window_end_utc: window_end,
            source: first.source.clone(),
        });
    }

    let mut averages = Vec::new();
    for ((market, _), group) in by_market {
        let complete = required_selections(market)
            .iter()
            .all(|s| group.iter().any(|a| a.selection == *s));
        if complete {
            averages.extend(group);
        }
    }
    averages
}
