//! Reconnecting `WebSocket` connection task.
//!
//! One session runs at a time. Each session owns the socket and selects
//! over shutdown, queued requests and inbound frames. When a session ends
//! for any reason other than shutdown, the task sleeps for the next backoff
//! delay and connects again. A successful open resets the backoff.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::service::Shared;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Requests buffered per connection.
const REQUEST_QUEUE: usize = 16;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// `stop()` was called.
    Shutdown,
    /// The server or the network closed the connection.
    Lost,
}

/// Run the connect / session / backoff loop until shutdown.
pub(crate) async fn run(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut backoff = Backoff::new(shared.config.backoff);

    loop {
        if *shutdown.borrow() {
            break;
        }

        match connect(&shared.config).await {
            Ok(ws) => {
                info!(url = %shared.config.url, "Connected to topology stream");
                backoff.reset();
                if session(&shared, ws, &mut shutdown).await == SessionEnd::Shutdown {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "Connection attempt failed");
            }
        }

        let delay = backoff.next_delay();
        info!(
            attempt = backoff.attempt(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Reconnecting after delay"
        );
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    info!("Consumer service stopped");
}

/// Open the socket, bounded by the connect timeout.
async fn connect(config: &ClientConfig) -> Result<WsStream, ClientError> {
    let attempt = connect_async(config.url.as_str());
    match tokio::time::timeout(config.connect_timeout(), attempt).await {
        Ok(Ok((ws, _response))) => Ok(ws),
        Ok(Err(e)) => Err(ClientError::Connect {
            url: config.url.clone(),
            reason: e.to_string(),
        }),
        Err(_elapsed) => Err(ClientError::ConnectTimeout {
            url: config.url.clone(),
            timeout_ms: config.connect_timeout_ms,
        }),
    }
}

/// Drive one open connection until it ends.
async fn session(
    shared: &Shared,
    ws: WsStream,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();
    let (requests, mut pending) = mpsc::channel::<String>(REQUEST_QUEUE);
    shared.on_open(requests);

    let end = loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    debug!(error = %e, "Close frame not sent");
                }
                break SessionEnd::Shutdown;
            }

            Some(frame) = pending.recv() => {
                if let Err(e) = sink.send(Message::Text(frame.into())).await {
                    warn!(error = %e, "Failed to send request");
                    break SessionEnd::Lost;
                }
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        // Decode failures are logged by the reconciler.
                        let _ = shared.reconciler.handle_text(text.as_str());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "Server closed the stream");
                        break SessionEnd::Lost;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Stream read failed");
                        break SessionEnd::Lost;
                    }
                    None => {
                        info!("Stream ended");
                        break SessionEnd::Lost;
                    }
                }
            }
        }
    };

    shared.on_close();
    end
}
