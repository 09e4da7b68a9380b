use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State as AxumState,
    },
    http::{header::ORIGIN, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use sabong_types::{Envelope, Viewer};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{timeout, Duration};

use super::ApiError;
use crate::{hub, Service};

fn ws_send_timeout() -> Duration {
    let parsed = std::env::var("WS_SEND_TIMEOUT_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0);
    Duration::from_millis(parsed.unwrap_or(2_000))
}

type OutboundSender = mpsc::Sender<Message>;

enum OutboundSendError {
    Closed,
    Full,
}

/// Checks the Origin header against `ALLOWED_WS_ORIGINS`.
///
/// Requests without an Origin (non-browser clients) are allowed unless
/// `ALLOW_WS_NO_ORIGIN` is set to a false value. An unset or empty allow list
/// admits every origin.
fn validate_origin(headers: &HeaderMap) -> bool {
    let deny_no_origin = matches!(
        std::env::var("ALLOW_WS_NO_ORIGIN").as_deref(),
        Ok("0") | Ok("false") | Ok("FALSE") | Ok("no") | Ok("NO")
    );
    let origin = match headers.get(ORIGIN) {
        Some(value) => match value.to_str() {
            Ok(origin) => origin,
            Err(_) => {
                tracing::warn!("Invalid Origin header encoding");
                return false;
            }
        },
        None => return !deny_no_origin,
    };
    let Ok(allowed) = std::env::var("ALLOWED_WS_ORIGINS") else {
        return true;
    };
    let allowed_list: Vec<&str> = allowed
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if allowed_list.is_empty() || allowed_list.contains(&"*") || allowed_list.contains(&origin) {
        return true;
    }
    tracing::warn!(origin, "WebSocket origin rejected");
    false
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ObserveParams {
    token: Option<String>,
}

pub(super) async fn observe(
    AxumState(service): AxumState<Arc<Service>>,
    Query(params): Query<ObserveParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if !validate_origin(&headers) {
        return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
    }
    let viewer = match params.token.as_deref() {
        Some(token) => match service.authenticate(token) {
            Ok(actor) => actor.viewer(),
            Err(err) => return ApiError::from(err).into_response(),
        },
        None => Viewer::anonymous(),
    };

    let max_message_bytes = service.config().ws_max_message_bytes;
    ws.max_message_size(max_message_bytes)
        .max_frame_size(max_message_bytes)
        .on_upgrade(move |socket| handle_observer(socket, service, viewer))
        .into_response()
}

fn encode(envelope: &Envelope) -> Option<Message> {
    match serde_json::to_string(envelope) {
        Ok(text) => Some(Message::Text(text)),
        Err(err) => {
            tracing::warn!(seq = envelope.seq, %err, "failed to encode event");
            None
        }
    }
}

fn enqueue_message(
    sender: &OutboundSender,
    message: Message,
    service: &Service,
) -> Result<(), OutboundSendError> {
    match sender.try_send(message) {
        Ok(()) => Ok(()),
        Err(mpsc::error::TrySendError::Full(_)) => {
            service.ws_metrics().inc_queue_full();
            Err(OutboundSendError::Full)
        }
        Err(mpsc::error::TrySendError::Closed(_)) => Err(OutboundSendError::Closed),
    }
}

fn enqueue_envelope(
    sender: &OutboundSender,
    envelope: &Envelope,
    service: &Service,
) -> Result<(), OutboundSendError> {
    let Some(message) = encode(envelope) else {
        return Ok(());
    };
    enqueue_message(sender, message, service)?;
    service.ws_metrics().inc_sent();
    Ok(())
}

async fn handle_observer(socket: WebSocket, service: Arc<Service>, viewer: Viewer) {
    service.ws_metrics().inc_opened();
    tracing::info!(user = ?viewer.user_id, staff = viewer.staff, "observer connected");
    let (mut sender, mut receiver) = socket.split();

    let (snapshot, mut events) = service.subscribe(&viewer);
    let mut last_seq = snapshot.seq;

    let (out_tx, mut out_rx) = mpsc::channel(service.config().ws_outbound_buffer.max(1));
    let writer_service = service.clone();
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            match timeout(ws_send_timeout(), sender.send(msg)).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    writer_service.ws_metrics().inc_send_error();
                    tracing::warn!("Failed to send event, client disconnected");
                    break;
                }
                Err(_) => {
                    writer_service.ws_metrics().inc_send_timeout();
                    tracing::warn!("WebSocket send timed out, closing connection");
                    break;
                }
            }
        }
        let _ = sender.close().await;
    });

    if enqueue_envelope(&out_tx, &snapshot, &service).is_ok() {
        loop {
            tokio::select! {
                msg = receiver.next() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(Message::Ping(data))) => {
                            if enqueue_message(&out_tx, Message::Pong(data), &service).is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Text(text))) if text.trim() == "ping" => {
                            let pong = Message::Text("pong".to_string());
                            if enqueue_message(&out_tx, pong, &service).is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!("WebSocket error: {:?}", e);
                            break;
                        }
                        _ => {}
                    }
                }
                event = events.recv() => {
                    match event {
                        Ok(envelope) => {
                            // Already covered by the snapshot this stream started from.
                            if envelope.seq <= last_seq {
                                continue;
                            }
                            last_seq = envelope.seq;
                            let Some(view) = hub::view_for(&envelope, &viewer) else {
                                service.ws_metrics().inc_filtered();
                                continue;
                            };
                            if enqueue_envelope(&out_tx, &view, &service).is_err() {
                                tracing::warn!("Failed to enqueue event, closing connection");
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "observer lagged; resyncing with a snapshot");
                            service.ws_metrics().add_lagged(skipped);
                            service.ws_metrics().inc_resync();
                            let snapshot = service.snapshot(&viewer);
                            last_seq = snapshot.seq;
                            if enqueue_envelope(&out_tx, &snapshot, &service).is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }

    drop(out_tx);
    let _ = writer_handle.await;
    service.ws_metrics().inc_closed();
    tracing::info!(user = ?viewer.user_id, "observer disconnected");
}
