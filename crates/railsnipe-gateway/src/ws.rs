// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live task updates over WebSocket.
//!
//! Server -> Client (JSON):
//! ```json
//! {"type": "snapshot", "state": {...}}
//! {"type": "progress", "task_id": "...", "sequence": 4, "attempt_count": 2, "message": "..."}
//! {"type": "ping"}
//! {"type": "pong"}
//! ```
//!
//! Client -> Server: `{"type": "ping"}`, answered with a pong. The stream
//! closes after the task's final state was delivered.

use std::time::Duration;

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use railsnipe_core::{TaskId, TaskState};
use railsnipe_engine::{LiveUpdate, Subscription};
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, MissedTickBehavior};

use crate::handlers::ApiError;
use crate::server::GatewayState;

/// Frames the server sends besides progress events.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlFrame<'a> {
    Snapshot { state: &'a TaskState },
    Ping,
    Pong,
}

#[derive(Debug, Deserialize)]
struct ClientFrame {
    #[serde(rename = "type")]
    kind: String,
}

/// GET /v1/tasks/{id}/live
///
/// Unknown tasks are refused before the upgrade.
pub async fn live_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    let task_id = TaskId(id);
    let subscription = match state.supervisor.subscribe(&task_id).await {
        Ok(subscription) => subscription,
        Err(e) => return ApiError::from(e).into_response(),
    };
    let heartbeat = state.heartbeat;
    let shutdown = state.shutdown.clone();
    ws.on_upgrade(move |socket| async move {
        tokio::select! {
            () = handle_socket(socket, subscription, heartbeat) => {}
            () = shutdown.cancelled() => {}
        }
    })
}

/// Encodes one update as a text frame.
pub fn encode(update: &LiveUpdate) -> Result<String, serde_json::Error> {
    match update {
        LiveUpdate::Snapshot(state) => serde_json::to_string(&ControlFrame::Snapshot { state }),
        LiveUpdate::Event(event) => serde_json::to_string(event),
    }
}

fn control(frame: &ControlFrame<'_>) -> Message {
    // Control frames carry no data that can fail to serialize.
    let text = serde_json::to_string(frame).unwrap_or_default();
    Message::Text(text.into())
}

fn is_ping(text: &str) -> bool {
    serde_json::from_str::<ClientFrame>(text).is_ok_and(|f| f.kind == "ping")
}

/// Forwards the subscription to the socket with heartbeats.
async fn handle_socket(socket: WebSocket, mut subscription: Subscription, heartbeat: Duration) {
    let (mut sender, mut receiver) = socket.split();
    let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_heard = Instant::now();

    loop {
        tokio::select! {
            update = subscription.next() => {
                let Some(update) = update else {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                };
                let text = match encode(&update) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("failed to encode live update: {e}");
                        continue;
                    }
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    last_heard = Instant::now();
                    if is_ping(&text) && sender.send(control(&ControlFrame::Pong)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => last_heard = Instant::now(),
            },
            _ = ticker.tick() => {
                if last_heard.elapsed() >= heartbeat * 2 {
                    tracing::debug!("closing silent live connection");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                if sender.send(control(&ControlFrame::Ping)).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use railsnipe_core::{ProgressEvent, ProgressKind};
    use serde_json::Value;

    #[test]
    fn control_frames_are_tagged() {
        assert_eq!(
            serde_json::to_string(&ControlFrame::Ping).unwrap(),
            r#"{"type":"ping"}"#
        );
        assert_eq!(
            serde_json::to_string(&ControlFrame::Pong).unwrap(),
            r#"{"type":"pong"}"#
        );
    }

    #[test]
    fn events_carry_their_kind_as_type() {
        let event = ProgressEvent {
            task_id: TaskId("t-1".into()),
            sequence: 4,
            kind: ProgressKind::Progress,
            attempt_count: 2,
            message: "no seat on 301".into(),
            error: None,
            emitted_at: Utc::now(),
        };
        let json: Value = serde_json::from_str(&encode(&LiveUpdate::Event(event)).unwrap()).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["sequence"], 4);
        assert_eq!(json["attempt_count"], 2);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn client_pings_are_recognised() {
        assert!(is_ping(r#"{"type":"ping"}"#));
        assert!(!is_ping(r#"{"type":"pong"}"#));
        assert!(!is_ping("ping"));
    }
}
