//! Sale HTTP handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::models::CreateSaleInput;
use crate::services::SaleService;
use crate::AppState;

fn sale_service(state: &AppState) -> SaleService {
    SaleService::new(state.store.clone(), state.config.ledger.clone())
}

/// Record a sale
pub async fn create_sale(
    State(state): State<AppState>,
    Json(input): Json<CreateSaleInput>,
) -> impl IntoResponse {
    match sale_service(&state).create_sale(input).await {
        Ok(sale) => (StatusCode::CREATED, Json(sale)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Get a sale transaction
pub async fn get_sale(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
) -> impl IntoResponse {
    match sale_service(&state).get_sale(sale_id).await {
        Ok(sale) => (StatusCode::OK, Json(sale)).into_response(),
        Err(e) => e.into_response(),
    }
}
