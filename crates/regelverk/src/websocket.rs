//! WebSocket stream of bus traffic

use axum::extract::ws::{Message, WebSocket};
use bus_protocol::{BusEvent, MessageBus};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::borrow::Cow;

use crate::AppState;

/// Frames sent to clients
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    Connected,
    Message {
        topic: String,
        /// JSON payloads are embedded as-is, anything else as text
        payload: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
}

impl From<&BusEvent> for WsEvent {
    fn from(event: &BusEvent) -> Self {
        let payload = event
            .payload
            .json()
            .map(Cow::into_owned)
            .unwrap_or_else(|_| serde_json::Value::String(event.payload.to_text_lossy()));
        WsEvent::Message {
            topic: event.topic.clone(),
            payload,
            timestamp: event.timestamp,
        }
    }
}

fn frame(event: &WsEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json)),
        Err(e) => {
            tracing::warn!("Failed to encode WebSocket frame: {}", e);
            None
        }
    }
}

/// Handle a WebSocket connection
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let mut subscription = match state.bus.subscribe("#") {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::error!("WebSocket client could not subscribe: {}", e);
            return;
        }
    };

    if let Some(connected) = frame(&WsEvent::Connected) {
        if sender.send(connected).await.is_err() {
            return;
        }
    }

    let send_task = tokio::spawn(async move {
        while let Ok(event) = subscription.recv().await {
            let Some(message) = frame(&WsEvent::from(event.as_ref())) else {
                continue;
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    // Clients only listen; drain until they go away
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    send_task.abort();
}
