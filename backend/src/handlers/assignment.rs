//! Assignment ledger HTTP handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::models::{AssignItemsInput, PeriodKey, RecordReturnInput};
use crate::services::assignment::{AssignmentService, RollForwardInput};
use crate::AppState;

/// Assign stock to a consignment customer or agent
pub async fn assign_items(
    State(state): State<AppState>,
    Json(input): Json<AssignItemsInput>,
) -> impl IntoResponse {
    let service = AssignmentService::new(state.store.clone());

    match service.assign_items(input).await {
        Ok(line) => (StatusCode::CREATED, Json(line)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Record units returned by a party
pub async fn record_return(
    State(state): State<AppState>,
    Json(input): Json<RecordReturnInput>,
) -> impl IntoResponse {
    let service = AssignmentService::new(state.store.clone());

    match service.record_return(input).await {
        Ok(line) => (StatusCode::OK, Json(line)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Running lines held by an agent
pub async fn list_agent_lines(
    State(state): State<AppState>,
    Path(party_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = AssignmentService::new(state.store.clone());

    match service.agent_lines(party_id).await {
        Ok(lines) => (StatusCode::OK, Json(serde_json::json!({ "lines": lines }))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Get a consignment period with its lines
pub async fn get_period(
    State(state): State<AppState>,
    Path((party_id, year, month)): Path<(Uuid, i32, u32)>,
) -> impl IntoResponse {
    let period = match PeriodKey::new(month, year) {
        Ok(period) => period,
        Err(e) => return crate::error::AppError::from(e).into_response(),
    };
    let service = AssignmentService::new(state.store.clone());

    match service.get_period(party_id, period).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Carry open balances into a later period
pub async fn roll_forward(
    State(state): State<AppState>,
    Path(party_id): Path<Uuid>,
    Json(input): Json<RollForwardInput>,
) -> impl IntoResponse {
    let service = AssignmentService::new(state.store.clone());

    match service.roll_forward(party_id, input).await {
        Ok(target) => (StatusCode::OK, Json(target)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Close a consignment period
pub async fn close_period(
    State(state): State<AppState>,
    Path((party_id, year, month)): Path<(Uuid, i32, u32)>,
) -> impl IntoResponse {
    let period = match PeriodKey::new(month, year) {
        Ok(period) => period,
        Err(e) => return crate::error::AppError::from(e).into_response(),
    };
    let service = AssignmentService::new(state.store.clone());

    match service.close_period(party_id, period).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => e.into_response(),
    }
}
