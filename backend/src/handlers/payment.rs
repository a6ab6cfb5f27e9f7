//! Payment HTTP handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::models::RecordPaymentInput;
use crate::services::PaymentService;
use crate::AppState;

/// Record a payment against a sale
pub async fn record_payment(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
    Json(input): Json<RecordPaymentInput>,
) -> impl IntoResponse {
    let service = PaymentService::new(state.store.clone());

    match service.record_payment(sale_id, input).await {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// List payments of a sale together with its current position
pub async fn list_payments(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = PaymentService::new(state.store.clone());

    let payments = match service.list_payments(sale_id).await {
        Ok(payments) => payments,
        Err(e) => return e.into_response(),
    };
    match service.payment_summary(sale_id).await {
        Ok(summary) => (
            StatusCode::OK,
            Json(serde_json::json!({ "payments": payments, "summary": summary })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Delete a payment
pub async fn remove_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = PaymentService::new(state.store.clone());

    match service.remove_payment(payment_id).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => e.into_response(),
    }
}
