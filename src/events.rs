//! Wire types: broker event payloads and the push frames streamed to
//! connected clients over SSE.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Alarm, AlarmType, Message};

/// Alarm event published to the `alarm-events` topic by domain producers
/// (new comment, group join, ...) and by the chat path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlarmEvent {
    pub receiver_id: Uuid,
    pub content: String,
    pub redirect_url: String,
    pub alarm_type: AlarmType,
    pub sent_at: DateTime<Utc>,
}

/// Chat message event published to the `chat-messages` topic. The message
/// id is assigned by the publisher; the consumer persists under that id so
/// redelivery cannot duplicate rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessageEvent {
    pub message_id: Uuid,
    pub chat_room_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub attachment_urls: Vec<String>,
    pub sent_at: DateTime<Utc>,
}

/// Account lifecycle event consumed from the `account-events` topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountEvent {
    pub user_id: Uuid,
}

/// Frame pushed to a live client connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    /// Sent once immediately after subscribing.
    Connected {
        connection_id: String,
        timestamp: i64,
    },

    /// Periodic heartbeat preventing intermediary timeouts.
    KeepAlive { timestamp: i64 },

    /// A persisted alarm for the connection's user.
    Alarm {
        id: Uuid,
        content: String,
        redirect_url: String,
        alarm_type: AlarmType,
        date: DateTime<Utc>,
    },

    /// A chat message in a room the connection's user belongs to.
    Chat {
        room_id: Uuid,
        message_id: Uuid,
        sender_id: Uuid,
        content: String,
        date: DateTime<Utc>,
    },
}

impl PushEvent {
    pub fn connected(connection_id: &str) -> Self {
        PushEvent::Connected {
            connection_id: connection_id.to_string(),
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn keep_alive() -> Self {
        PushEvent::KeepAlive {
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn alarm(alarm: &Alarm) -> Self {
        PushEvent::Alarm {
            id: alarm.id,
            content: alarm.content.clone(),
            redirect_url: alarm.redirect_url.clone(),
            alarm_type: alarm.alarm_type,
            date: alarm.created_at,
        }
    }

    pub fn chat(message: &Message) -> Self {
        PushEvent::Chat {
            room_id: message.chat_room_id,
            message_id: message.id,
            sender_id: message.sender_id,
            content: message.content.clone(),
            date: message.created_at,
        }
    }

    /// Render as a complete `text/event-stream` frame.
    pub fn to_sse_frame(&self) -> Result<String, serde_json::Error> {
        let data = serde_json::to_string(self)?;
        Ok(format!("event: sse\ndata: {data}\n\n"))
    }
}
