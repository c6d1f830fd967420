//! Downstream WebSocket endpoint: one socket watches one lot contract.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tracing::{debug, info, warn};

use chainrelay_core::types::{is_contract_address, DownstreamMessage, MessageType};
use chainrelay_ws::ListenerHandle;

use crate::api::INVALID_ADDRESS;
use crate::state::AppState;

pub async fn monitor(
    State(state): State<AppState>,
    Path(contract_address): Path<String>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    if !is_contract_address(&contract_address) {
        warn!(%contract_address, "rejected monitor request with invalid address");
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": INVALID_ADDRESS }))).into_response();
    }
    let Some(ws) = ws else {
        return (
            StatusCode::UPGRADE_REQUIRED,
            Json(json!({ "error": "WebSocket upgrade required" })),
        )
            .into_response();
    };
    ws.on_upgrade(move |socket| handle_monitor(socket, state, contract_address))
}

async fn handle_monitor(socket: WebSocket, state: AppState, contract_address: String) {
    let (mut sender, mut receiver) = socket.split();
    let (listener, mut outbound) = ListenerHandle::channel();
    let listener_id = listener.id();
    info!(%contract_address, %listener_id, "monitor client connected");

    match state.relay.subscribe(&contract_address, listener).await {
        Ok(outcome) => debug!(%contract_address, %listener_id, ?outcome, "listener registered"),
        Err(e) => {
            warn!(%contract_address, %listener_id, error = %e, "subscribe failed");
            send_envelope(&mut sender, &DownstreamMessage::error(&contract_address, &e)).await;
            state.relay.unsubscribe(listener_id).await;
            let _ = sender.close().await;
            return;
        }
    }

    if send_envelope(&mut sender, &DownstreamMessage::connected(&contract_address)).await {
        loop {
            tokio::select! {
                msg = outbound.recv() => {
                    let Some(msg) = msg else { break };
                    if !send_envelope(&mut sender, &msg).await {
                        break;
                    }
                    // The relay dropped this subscription.
                    if msg.kind == MessageType::Error {
                        let _ = sender.close().await;
                        break;
                    }
                }

                frame = receiver.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            debug!(%listener_id, %text, "client message");
                            let echo = DownstreamMessage::echo(&contract_address, &text);
                            if !send_envelope(&mut sender, &echo).await {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        _ => {}
                    }
                }
            }
        }
    }

    state.relay.unsubscribe(listener_id).await;
    info!(%contract_address, %listener_id, "monitor client disconnected");
}

/// Returns `false` once the socket can no longer be written.
async fn send_envelope(sender: &mut SplitSink<WebSocket, Message>, msg: &DownstreamMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(text) => sender.send(Message::Text(text)).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "could not serialize envelope");
            true
        }
    }
}
