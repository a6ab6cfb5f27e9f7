//! Route definitions for the pharmacy ledger API

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/stock", stock_routes())
        .nest("/assignments", assignment_routes())
        .nest("/parties", party_routes())
        .nest("/sales", sale_routes())
        .route("/payments/:id", delete(handlers::remove_payment))
}

/// Batch pool routes
fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/batches", post(handlers::receive_batch))
        .route(
            "/products/:product_id/locations/:location_id/batches",
            get(handlers::list_batches),
        )
        .route("/allocations", post(handlers::allocate_stock))
        .route("/batches/:id/removals", post(handlers::remove_stock))
        .route("/batches/:id/transfers", post(handlers::transfer_stock))
}

/// Assignment routes
fn assignment_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::assign_items))
        .route("/returns", post(handlers::record_return))
}

/// Per-party ledger views and period operations
fn party_routes() -> Router<AppState> {
    Router::new()
        .route("/:party_id/lines", get(handlers::list_agent_lines))
        .route("/:party_id/periods/roll-forward", post(handlers::roll_forward))
        .route("/:party_id/periods/:year/:month", get(handlers::get_period))
        .route("/:party_id/periods/:year/:month/close", post(handlers::close_period))
}

/// Sale and payment routes
fn sale_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_sale))
        .route("/:id", get(handlers::get_sale))
        .route(
            "/:id/payments",
            post(handlers::record_payment).get(handlers::list_payments),
        )
}
