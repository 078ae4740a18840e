use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::db::models::BetResult;
use crate::db::Database;
use crate::engine::results::ResultsSyncer;
use crate::engine::PredictionEngine;
use crate::ledger::{Ledger, LedgerError};
use crate::staking::StakePolicy;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub engine: Arc<PredictionEngine>,
    pub syncer: Arc<ResultsSyncer>,
    pub ledger: Ledger,
    pub user_id: String,
    pub default_policy: StakePolicy,
    pub initial_bankroll: f64,
}

/// Build the Axum router for the API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/engine/run", post(run_engine_handler))
        .route("/api/engine/cycles", get(cycles_handler))
        .route("/api/results/sync", post(sync_results_handler))
        .route("/api/predictions", get(predictions_handler))
        .route("/api/bankroll", get(bankroll_handler).put(reset_bankroll_handler))
        .route("/api/bets", get(bets_handler).post(place_bet_handler))
        .route("/api/bets/recommend", post(recommend_handler))
        .route("/api/bets/:id/settle", post(settle_bet_handler))
        .route("/api/bets/analytics", get(analytics_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

type ApiError = (StatusCode, String);

/// Map domain errors onto HTTP statuses; anything unrecognized is a 500.
fn map_error(e: anyhow::Error) -> ApiError {
    let status = match e.downcast_ref::<LedgerError>() {
        Some(LedgerError::PredictionNotFound(_))
        | Some(LedgerError::BetNotFound(_))
        | Some(LedgerError::BankrollNotFound(_)) => StatusCode::NOT_FOUND,
        Some(LedgerError::AlreadySettled(_)) => StatusCode::CONFLICT,
        Some(LedgerError::NotPublished(_))
        | Some(LedgerError::ZeroStake)
        | Some(LedgerError::InvalidAmount(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        None => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

#[derive(Deserialize)]
struct LimitParams {
    limit: Option<i64>,
}

/// POST /api/engine/run
async fn run_engine_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let cycle = state.engine.run_cycle().await.map_err(|e| {
        if e.to_string().contains("already running") {
            (StatusCode::CONFLICT, e.to_string())
        } else {
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    })?;
    Ok(Json(cycle))
}

/// GET /api/engine/cycles?limit=20
async fn cycles_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .list_cycles(params.limit.unwrap_or(20))
        .map(Json)
        .map_err(map_error)
}

/// POST /api/results/sync
async fn sync_results_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    state.syncer.sync().await.map(Json).map_err(map_error)
}

/// GET /api/predictions?limit=50
async fn predictions_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .list_published_predictions(params.limit.unwrap_or(50))
        .map(Json)
        .map_err(map_error)
}

/// GET /api/bankroll
async fn bankroll_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .ledger
        .ensure_bankroll(&state.user_id, state.initial_bankroll)
        .map(Json)
        .map_err(map_error)
}

#[derive(Deserialize)]
struct ResetBankrollRequest {
    amount: f64,
}

/// PUT /api/bankroll
async fn reset_bankroll_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetBankrollRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .ledger
        .reset_bankroll(&state.user_id, req.amount)
        .map(Json)
        .map_err(map_error)
}

#[derive(Deserialize)]
struct RecommendRequest {
    prediction_id: i64,
    policy: Option<StakePolicy>,
}

/// POST /api/bets/recommend
async fn recommend_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecommendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let policy = req.policy.unwrap_or(state.default_policy);
    state
        .ledger
        .recommend(&state.user_id, req.prediction_id, policy)
        .map(Json)
        .map_err(map_error)
}

#[derive(Deserialize)]
struct PlaceBetRequest {
    prediction_id: i64,
    policy: Option<StakePolicy>,
    stake: Option<f64>,
    odds: Option<f64>,
}

/// POST /api/bets
async fn place_bet_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PlaceBetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let policy = req.policy.unwrap_or(state.default_policy);
    state
        .ledger
        .place_bet(&state.user_id, req.prediction_id, policy, req.stake, req.odds)
        .map(|bet| (StatusCode::CREATED, Json(bet)))
        .map_err(map_error)
}

#[derive(Deserialize)]
struct SettleBetRequest {
    result: BetResult,
}

/// POST /api/bets/:id/settle
async fn settle_bet_handler(
    State(state): State<Arc<AppState>>,
    Path(bet_id): Path<i64>,
    Json(req): Json<SettleBetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .ledger
        .settle_bet(bet_id, req.result)
        .map(Json)
        .map_err(map_error)
}

/// GET /api/bets?limit=50
async fn bets_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .ledger
        .list_bets(&state.user_id, params.limit.unwrap_or(50))
        .map(Json)
        .map_err(map_error)
}

/// GET /api/bets/analytics
async fn analytics_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .ledger
        .analytics(&state.user_id)
        .map(Json)
        .map_err(map_error)
}
