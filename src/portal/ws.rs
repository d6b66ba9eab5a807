use std::time::Duration;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Instant, MissedTickBehavior};

use super::api::SharedState;
use super::models::{Grievance, MeetingRequest, NotificationRecord};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// A dashboard silent for this long is dropped.
const IDLE_TIMEOUT: Duration = Duration::from_secs(75);

// ── Back-office event types ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    GrievanceSubmitted {
        grievance: Grievance,
    },
    MeetingRequested {
        meeting: MeetingRequest,
    },
    GrievanceReviewed {
        grievance: Grievance,
        previous_status: String,
    },
    MeetingReviewed {
        meeting: MeetingRequest,
        previous_status: String,
    },
    NotificationAttempted {
        record: NotificationRecord,
    },
    /// Events were dropped for this client; its lists should be refetched.
    StreamLagged {
        skipped: u64,
    },
}

// ── WebSocket handler ────────────────────────────────────────────────

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    let events = state.ws_tx.subscribe();
    ws.on_upgrade(move |socket| forward_events(socket, events))
}

/// What to push to the dashboard for one broadcast receive result.
/// `None` ends the stream.
fn outbound_frame(event: Result<String, RecvError>) -> Option<Message> {
    match event {
        Ok(json) => Some(Message::Text(json.into())),
        Err(RecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "admin event stream lagged");
            let notice = serde_json::to_string(&WsMessage::StreamLagged { skipped }).ok()?;
            Some(Message::Text(notice.into()))
        }
        Err(RecvError::Closed) => None,
    }
}

/// Dashboards only listen. Any frame they send, Pong included, counts as a
/// sign of life.
async fn forward_events(socket: WebSocket, mut events: broadcast::Receiver<String>) {
    let (mut outbound, mut inbound) = socket.split();
    tracing::debug!("admin event stream connected");

    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    keepalive.reset();
    let mut last_seen = Instant::now();

    loop {
        let frame = tokio::select! {
            _ = keepalive.tick() => {
                if last_seen.elapsed() > IDLE_TIMEOUT {
                    tracing::debug!("admin event stream idle");
                    break;
                }
                Message::Ping(Default::default())
            }
            event = events.recv() => match outbound_frame(event) {
                Some(frame) => frame,
                None => break,
            },
            incoming = inbound.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {
                    last_seen = Instant::now();
                    continue;
                }
            },
        };
        if outbound.send(frame).await.is_err() {
            break;
        }
    }

    let _ = outbound.send(Message::Close(None)).await;
    tracing::debug!("admin event stream closed");
}

/// Serialize and broadcast a WsMessage to all connected admin clients.
/// Having no connected clients is not an error.
pub fn broadcast_message(tx: &broadcast::Sender<String>, msg: &WsMessage) {
    match serde_json::to_string(msg) {
        Ok(json) => {
            let _ = tx.send(json);
        }
        Err(e) => {
            tracing::error!("Failed to serialize WsMessage: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::models::{DeliveryStatus, GrievanceStatus, RecordKind};

    fn grievance() -> Grievance {
        Grievance {
            id: 7,
            first_name: "Marie".into(),
            last_name: "Curie".into(),
            email: "marie@example.fr".into(),
            phone: None,
            postal_code: Some("75005".into()),
            city: Some("Paris".into()),
            subject: "Voirie".into(),
            category: None,
            message: "Nid de poule".into(),
            status: GrievanceStatus::Completed,
            response: None,
            created_at: "2025-10-01 09:00:00".into(),
            updated_at: "2025-10-02 09:00:00".into(),
        }
    }

    #[test]
    fn grievance_reviewed_serializes_tagged() {
        let msg = WsMessage::GrievanceReviewed {
            grievance: grievance(),
            previous_status: "submitted".into(),
        };
        let parsed: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(parsed["type"], "GrievanceReviewed");
        assert_eq!(parsed["data"]["grievance"]["id"], 7);
        assert_eq!(parsed["data"]["grievance"]["status"], "completed");
        assert_eq!(parsed["data"]["previous_status"], "submitted");
    }

    #[test]
    fn notification_attempted_round_trips() {
        let msg = WsMessage::NotificationAttempted {
            record: NotificationRecord {
                id: 1,
                request_id: "req-1".into(),
                record_kind: RecordKind::Audience,
                record_id: 3,
                new_status: "approved".into(),
                recipient: "jean@example.fr".into(),
                delivery: DeliveryStatus::Failed,
                error: Some("timeout".into()),
                created_at: "2025-10-01 09:00:00".into(),
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"NotificationAttempted\""));
        assert!(json.contains("\"delivery\":\"failed\""));
        match serde_json::from_str::<WsMessage>(&json).unwrap() {
            WsMessage::NotificationAttempted { record } => {
                assert_eq!(record.record_kind, RecordKind::Audience);
                assert_eq!(record.error.as_deref(), Some("timeout"));
            }
            other => panic!("Expected NotificationAttempted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let (tx, _) = broadcast::channel::<String>(16);
        let mut rx1 = tx.subscribe();
        let mut rx2 = tx.subscribe();

        broadcast_message(&tx, &WsMessage::GrievanceSubmitted { grievance: grievance() });

        let a = rx1.recv().await.unwrap();
        let b = rx2.recv().await.unwrap();
        assert!(a.contains("GrievanceSubmitted"));
        assert_eq!(a, b);
    }

    #[test]
    fn broadcast_without_receivers_is_silent() {
        let (tx, _) = broadcast::channel::<String>(16);
        broadcast_message(&tx, &WsMessage::GrievanceSubmitted { grievance: grievance() });
    }

    #[test]
    fn idle_timeout_spans_two_keepalives() {
        assert!(IDLE_TIMEOUT > KEEPALIVE_INTERVAL * 2);
    }

    #[test]
    fn lagged_receiver_gets_a_resync_notice() {
        let frame = outbound_frame(Err(RecvError::Lagged(4))).unwrap();
        let Message::Text(text) = frame else {
            panic!("Expected a text frame");
        };
        let parsed: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(parsed["type"], "StreamLagged");
        assert_eq!(parsed["data"]["skipped"], 4);
    }

    #[test]
    fn closed_channel_ends_the_stream() {
        assert!(outbound_frame(Err(RecvError::Closed)).is_none());
        assert!(matches!(
            outbound_frame(Ok("{}".into())),
            Some(Message::Text(_))
        ));
    }
}
