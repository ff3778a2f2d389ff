use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use gossip_counter::SyncError;
use serde::Deserialize;
use tracing::warn;

use crate::AppState;

#[derive(Deserialize)]
pub struct IncQuery {
    amount: Option<String>,
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn total(State(state): State<Arc<AppState>>) -> Response {
    state.coordinator.read().to_string().into_response()
}

pub async fn increment(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IncQuery>,
) -> Response {
    let raw = query.amount.unwrap_or_default();
    let amount: i64 = match raw.trim().parse() {
        Ok(amount) => amount,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("invalid amount {raw:?}: {e}"),
            )
        }
    };

    match state.coordinator.increment(amount) {
        Ok(total) => total.to_string().into_response(),
        Err(e @ SyncError::InvalidArgument(_)) => {
            error_response(StatusCode::NOT_IMPLEMENTED, e.to_string())
        }
        Err(e) => {
            warn!(error = %e, amount, "increment failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub async fn verbose(State(state): State<Arc<AppState>>) -> Response {
    match state.coordinator.snapshot() {
        Ok(bytes) => ([(header::CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn cluster(State(state): State<Arc<AppState>>) -> Response {
    Json(state.membership.members()).into_response()
}

// ── Helpers ─────────────────────────────────────────────────────────

fn error_response(status: StatusCode, msg: String) -> Response {
    (status, msg).into_response()
}
