//! # Live Events
//!
//! Fire-and-forget notifications for dashboards.
//!
//! Subscribers connected at publish time get the event, later ones see nothing. Publishing with
//! nobody listening is fine. A subscriber that falls more than the channel capacity behind skips
//! ahead instead of blocking publishers.
use std::sync::Arc;

use axum::{
    extract::{
        State as AxumState, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::broadcast::{self, Receiver, Sender, error::RecvError};
use tracing::{debug, info, warn};

use crate::{models::ValidationOutcome, state::State};

pub const RESULT_EVENT: &str = "puc_validation_result";
pub const ERROR_EVENT: &str = "puc_validation_error";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub event: String,
    pub payload: Value,
}

pub trait Broadcaster: Send + Sync {
    fn publish(&self, event: &str, payload: Value);

    fn publish_error(&self, message: &str) {
        self.publish(ERROR_EVENT, json!({ "error": message }));
    }

    fn publish_result(&self, outcomes: &[ValidationOutcome]) {
        self.publish(RESULT_EVENT, json!({ "data": outcomes }));
    }
}

pub struct ChannelBroadcaster {
    sender: Sender<Event>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));

        Self { sender }
    }

    pub fn subscribe(&self) -> Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn publish(&self, event: &str, payload: Value) {
        let event = Event {
            event: event.to_string(),
            payload,
        };

        if let Err(unsent) = self.sender.send(event) {
            debug!("No live subscribers for {}", unsent.0.event);
        }
    }
}

pub async fn events_handler(
    AxumState(state): AxumState<Arc<State>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let receiver = state.live.subscribe();

    ws.on_upgrade(move |socket| forward_events(socket, receiver))
}

async fn forward_events(mut socket: WebSocket, mut receiver: Receiver<Event>) {
    info!("Live subscriber connected");

    loop {
        tokio::select! {
            received = receiver.recv() => match received {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };

                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Live subscriber lagged, skipped {skipped} events");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    info!("Live subscriber disconnected");
}
