//! REST handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use chainrelay_core::reader::ChainReader;
use chainrelay_core::types::is_contract_address;
use chainrelay_history::{ChainHistory, HistoryError, LotContract, LotInfo};

use crate::state::AppState;

pub const SERVICE_NAME: &str = "chainrelay";
pub const INVALID_ADDRESS: &str = "Invalid contract address format";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid contract address format")]
    InvalidAddress,

    #[error("{0}")]
    NotFound(String),

    /// The chain node failed or answered something unusable.
    #[error("{0}")]
    Upstream(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidAddress => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<HistoryError> for ApiError {
    fn from(e: HistoryError) -> Self {
        match e {
            HistoryError::ContractNotFound { .. } => Self::NotFound(e.to_string()),
            HistoryError::Call { .. } | HistoryError::Chain(_) => Self::Upstream(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "success": false, "error": self.to_string() }))).into_response()
    }
}

fn checked_address(address: String) -> Result<String, ApiError> {
    if is_contract_address(&address) {
        Ok(address)
    } else {
        Err(ApiError::InvalidAddress)
    }
}

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "message": "ChainRelay is up",
        "service": SERVICE_NAME,
    }))
}

pub async fn monitor_status(State(state): State<AppState>) -> impl IntoResponse {
    let subscriptions = state.relay.statuses();
    tracing::debug!(active = subscriptions.len(), "monitor status requested");
    Json(json!({
        "success": true,
        "message": "Monitor status retrieved",
        "activeMonitors": subscriptions.len(),
        "subscriptions": subscriptions,
        "upstream": state.relay.connection_state(),
    }))
}

pub async fn lot_history(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<ChainHistory>, ApiError> {
    let address = checked_address(address)?;
    let history = state.history.assemble(&address).await?;
    Ok(Json(history))
}

pub async fn lot_info(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<LotInfo>, ApiError> {
    let address = checked_address(address)?;
    let reader = state.history.reader();

    let code = reader.code_at(&address).await.map_err(HistoryError::from)?;
    if code.is_empty() {
        return Err(HistoryError::ContractNotFound { address }.into());
    }

    let info = LotContract::new(reader, &address).info().await?;
    Ok(Json(info))
}

pub async fn service_info(State(state): State<AppState>) -> impl IntoResponse {
    let port = state.port;
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Live lot monitoring and lot history over a shared upstream feed",
        "endpoints": {
            "health": "/api/v1/health",
            "websocket": "/ws/monitor/{contractAddress}",
            "status": "/api/v1/monitor/status",
            "lot": "/api/v1/lotes/{contractAddress}",
            "history": "/api/v1/lotes/{contractAddress}/cadena",
        },
        "usage": {
            "websocket": format!("ws://localhost:{port}/ws/monitor/0x1234567890123456789012345678901234567890"),
        },
    }))
}
