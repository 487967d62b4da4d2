use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::model::{ClientEnvelope, NewRecord, ServerEnvelope};
use super::state::{AppState, RecordEvent};

static NEXT_CLIENT_ID: AtomicUsize = AtomicUsize::new(1);

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-connection session. Inbound frames are ingestion commands; outbound
/// frames are record events fanned out from the broadcast channel.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
    log::info!("Client {} connected", client_id);

    let mut event_rx = state.subscribe();
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            inbound = ws_rx.next() => {
                if !handle_inbound(client_id, &state, inbound).await {
                    break;
                }
            }
            event = event_rx.recv() => {
                if !forward_event(client_id, &mut ws_tx, event).await {
                    break;
                }
            }
        }
    }

    log::info!("Client {} disconnected", client_id);
}

/// Process one inbound frame. Returns false when the connection should end.
async fn handle_inbound(
    client_id: usize,
    state: &AppState,
    inbound: Option<Result<Message, axum::Error>>,
) -> bool {
    match inbound {
        Some(Ok(Message::Text(text))) => {
            ingest_frame(client_id, state, &text).await;
            true
        }
        Some(Ok(Message::Close(_))) | None => false,
        // Ping/pong frames are answered by the library.
        Some(Ok(_)) => true,
        Some(Err(e)) => {
            log::warn!("Client {} socket error: {}", client_id, e);
            false
        }
    }
}

/// Ingestion is fire-and-forget: a frame that cannot be parsed or stored is
/// logged and dropped, and the producer is never answered directly.
async fn ingest_frame(client_id: usize, state: &AppState, text: &str) {
    let envelope: ClientEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            log::warn!("Client {} sent an unparseable frame: {}", client_id, e);
            return;
        }
    };

    match envelope.event.as_str() {
        "newReading" => {
            let reading: NewRecord = match serde_json::from_value(envelope.data) {
                Ok(reading) => reading,
                Err(e) => {
                    log::warn!("Client {} sent a malformed reading: {}", client_id, e);
                    return;
                }
            };
            match state.store.insert(reading).await {
                Ok(record) => {
                    log::info!("Stored record {} from client {}", record.id, client_id);
                    state.publish(RecordEvent::stored(record));
                }
                Err(e) => {
                    log::error!("Failed to store reading from client {}: {}", client_id, e);
                }
            }
        }
        other => {
            log::debug!("Client {} sent unknown event '{}'", client_id, other);
        }
    }
}

/// Push one record event to this client. Returns false when the connection
/// should end.
async fn forward_event(
    client_id: usize,
    ws_tx: &mut SplitSink<WebSocket, Message>,
    event: Result<RecordEvent, broadcast::error::RecvError>,
) -> bool {
    match event {
        Ok(event) => {
            let envelope = ServerEnvelope {
                event: event.name(),
                data: event.record(),
            };
            let text = match serde_json::to_string(&envelope) {
                Ok(text) => text,
                Err(e) => {
                    log::error!("Failed to serialize record event: {}", e);
                    return true;
                }
            };
            if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                log::warn!("Client {} send failed: {}", client_id, e);
                return false;
            }
            true
        }
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            log::warn!("Client {} lagged, {} events skipped", client_id, skipped);
            true
        }
        Err(broadcast::error::RecvError::Closed) => false,
    }
}
