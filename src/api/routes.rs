//! API route handlers.
//!
//! Handlers never touch round state directly; they go through the
//! `EngineHandle` and return whatever snapshot the engine publishes.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::engine::driver::EngineHandle;
use crate::engine::round::RoundSnapshot;
use crate::types::{Direction, GameError};

pub type AppState = EngineHandle;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct BetRequest {
    pub direction: Direction,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Maps engine errors onto HTTP. The only one a handler can hit is the
/// engine having stopped.
pub struct ApiError(GameError);

impl From<GameError> for ApiError {
    fn from(e: GameError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            GameError::EngineStopped => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/round
pub async fn get_round(State(engine): State<AppState>) -> Json<RoundSnapshot> {
    Json(engine.snapshot())
}

/// POST /api/bet
///
/// Rejected bets are not reported; the caller sees the unchanged snapshot.
pub async fn place_bet(
    State(engine): State<AppState>,
    Json(req): Json<BetRequest>,
) -> Result<(StatusCode, Json<RoundSnapshot>), ApiError> {
    engine.place_bet(req.direction, req.amount).await?;
    Ok((StatusCode::ACCEPTED, Json(engine.snapshot())))
}

/// POST /api/acknowledge
pub async fn acknowledge(
    State(engine): State<AppState>,
) -> Result<(StatusCode, Json<RoundSnapshot>), ApiError> {
    engine.acknowledge_result().await?;
    Ok((StatusCode::ACCEPTED, Json(engine.snapshot())))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
