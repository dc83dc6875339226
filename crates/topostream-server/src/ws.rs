//! `WebSocket` handler for topology streaming.
//!
//! Clients connect to `GET /ws`, then send `SUBSCRIBE` and `UNSUBSCRIBE`
//! requests as text frames. Each connection gets a bounded outbox; a writer
//! task drains it into the socket while the reader loop feeds requests to
//! the [`BroadcastEngine`](crate::engine::BroadcastEngine).
//!
//! Protocol violations and undecodable requests are logged and rejected;
//! the connection stays open.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use topostream_types::{ConnectionId, Request, RequestAction};
use tracing::{debug, info, warn};

use crate::engine::Outbox;
use crate::state::AppState;

/// Upgrade an HTTP request to a streaming `WebSocket` connection.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_stream(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Handle the `WebSocket` lifecycle for one connection.
async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
    let conn = ConnectionId::new();
    info!(%conn, "WebSocket client connected");

    let (outbox, mut frames) = Outbox::channel(state.stream.outbox_capacity);
    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            // The socket rejected a frame.
            _ = &mut writer => {
                debug!(%conn, "WebSocket writer finished");
                break;
            }
            () = outbox.evicted() => {
                warn!(%conn, "Connection evicted by the engine, closing");
                break;
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_request(&state, conn, text.as_str(), &outbox).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(%conn, "WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(%conn, "WebSocket error: {e}");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary frames are not part of the protocol; pings
                        // are answered by the transport.
                    }
                }
            }
        }
    }

    state.engine.on_disconnect(conn);
    writer.abort();
    info!(%conn, "WebSocket connection closed");
}

/// Decode one request and hand it to the engine.
async fn handle_request(state: &AppState, conn: ConnectionId, text: &str, outbox: &Outbox) {
    let request = match Request::decode(text) {
        Ok(request) => request,
        Err(e) => {
            warn!(%conn, error = %e, "Dropping undecodable request");
            return;
        }
    };

    let result = match request.action {
        RequestAction::Subscribe => {
            state
                .engine
                .subscribe(conn, request.criteria, outbox.clone())
                .await
        }
        RequestAction::Unsubscribe => state.engine.unsubscribe(conn),
    };

    if let Err(e) = result {
        if e.is_protocol_violation() {
            warn!(%conn, action = ?request.action, error = %e, "Protocol violation, request rejected");
        } else {
            warn!(%conn, action = ?request.action, error = %e, "Request failed");
        }
    }
}
