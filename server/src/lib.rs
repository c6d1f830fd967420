//! chainrelay-server: HTTP and WebSocket gateway over the live relay and the
//! history reconstructor.

pub mod api;
pub mod config;
pub mod gateway;
pub mod logging;
pub mod state;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws/monitor/:contract_address", get(gateway::monitor))
        .route("/api/v1/health", get(api::health))
        .route("/api/v1/monitor/status", get(api::monitor_status))
        .route("/api/v1/lotes/:contract_address", get(api::lot_info))
        .route("/api/v1/lotes/:contract_address/cadena", get(api::lot_history))
        .route("/", get(api::service_info))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
