//! HTTP routes
//!
//! Assembles the full router: truck endpoints, health check and the
//! tower-http layers.

pub mod truck_routes;

use axum::{extract::State, routing::get, Json, Router};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::dto::truck_dto::HealthResponse;
use crate::middleware::cors::cors_middleware;
use crate::state::AppState;

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    let cors = cors_middleware(&state.config.cors_origins);
    let timeout = TimeoutLayer::new(state.config.request_timeout);

    Router::new()
        .route("/health", get(health))
        .nest("/trucks", truck_routes::create_truck_router())
        .layer(TraceLayer::new_for_http())
        .layer(timeout)
        .layer(cors)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        backend: state.repository.backend_name(),
    })
}
