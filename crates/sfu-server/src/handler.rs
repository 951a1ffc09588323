//! The signaling endpoint (C4): a WebSocket upgrade that decodes envelopes
//! and hands them to the coordinator, tearing the peer down on disconnect.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use sfu_common::SfuError;
use sfu_core::envelope::JoinRoomBody;
use sfu_core::{Coordinator, Envelope};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct AppState {
    coordinator: Arc<Coordinator>,
}

pub fn build_router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/signaling", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { coordinator })
}

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.coordinator))
}

/// One signaling channel for its whole lifetime. A single channel binds to
/// at most one peer (§6.1); the peer is created lazily on the first
/// `joinRoom` envelope and torn down when this loop exits for any reason.
async fn handle_socket(socket: WebSocket, coordinator: Arc<Coordinator>) {
    let (sink, mut stream) = socket.split();
    let mut sink = Some(sink);
    let mut joined: Option<(String, String)> = None;

    while let Some(received) = stream.next().await {
        let message = match received {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(error = %e, "signaling socket read error, closing");
                break;
            }
        };

        let Message::Text(text) = message else {
            continue;
        };

        let envelope: Envelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                let err = SfuError::DecodeError(e.to_string());
                tracing::warn!(kind = err.kind(), "{err}");
                continue;
            }
        };

        if envelope.event == "joinRoom" {
            let body: JoinRoomBody = match serde_json::from_value(envelope.data) {
                Ok(body) => body,
                Err(e) => {
                    let err = SfuError::DecodeError(e.to_string());
                    tracing::warn!(event = "joinRoom", kind = err.kind(), "{err}");
                    continue;
                }
            };
            let Some(write_half) = sink.take() else {
                tracing::warn!(self_id = %body.self_id, room_id = %body.room_id, "duplicate joinRoom on an already-bound channel, ignoring");
                continue;
            };
            joined = Some((body.self_id.clone(), body.room_id.clone()));
            coordinator.join_room(body.self_id, body.room_id, write_half).await;
        } else {
            coordinator.dispatch(envelope);
        }
    }

    if let Some((self_id, room_id)) = joined {
        tracing::info!(self_id = %self_id, room_id = %room_id, "signaling socket closed, leaving room");
        coordinator.leave_room(&self_id, &room_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn router_exposes_signaling_route() {
        let api = sfu_core::engine::build_api().expect("engine builds without ICE servers");
        let coordinator = Coordinator::new(api);
        let router = build_router(coordinator);
        let _ = router;
    }
}
