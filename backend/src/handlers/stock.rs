//! Stock pool HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::models::ReceiveBatchInput;
use crate::services::stock::{
    AllocateStockInput, BatchListQuery, RemoveStockInput, StockService, TransferStockInput,
};
use crate::AppState;

/// Receive a new batch
pub async fn receive_batch(
    State(state): State<AppState>,
    Json(input): Json<ReceiveBatchInput>,
) -> impl IntoResponse {
    let service = StockService::new(state.store.clone());

    match service.receive_batch(input).await {
        Ok(batch) => (StatusCode::CREATED, Json(batch)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// List batches of a product at a location in allocation order
pub async fn list_batches(
    State(state): State<AppState>,
    Path((product_id, location_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<BatchListQuery>,
) -> impl IntoResponse {
    let service = StockService::new(state.store.clone());

    match service
        .list_available(product_id, location_id, query.exclude_expired)
        .await
    {
        Ok(batches) => {
            (StatusCode::OK, Json(serde_json::json!({ "batches": batches }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Allocate stock FIFO without assigning it
pub async fn allocate_stock(
    State(state): State<AppState>,
    Json(input): Json<AllocateStockInput>,
) -> impl IntoResponse {
    let service = StockService::new(state.store.clone());

    match service.allocate(input).await {
        Ok(allocation) => (StatusCode::OK, Json(allocation)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Write stock off a batch
pub async fn remove_stock(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<RemoveStockInput>,
) -> impl IntoResponse {
    let service = StockService::new(state.store.clone());

    match service.remove(batch_id, input).await {
        Ok(batch) => (StatusCode::OK, Json(batch)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Move stock of a batch to another location
pub async fn transfer_stock(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<TransferStockInput>,
) -> impl IntoResponse {
    let service = StockService::new(state.store.clone());

    match service.transfer(batch_id, input).await {
        Ok(transfer) => (StatusCode::CREATED, Json(transfer)).into_response(),
        Err(e) => e.into_response(),
    }
}
