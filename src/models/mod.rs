use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Alarm category, carried alongside a generic content/redirect payload.
/// The set is closed; clients switch on it for display and routing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmType {
    /// New comment on the user's post
    Comment,
    /// Platform notice
    Notice,
    /// New chat message in one of the user's rooms
    Chatting,
    /// Answer to a question the user asked
    Answer,
    /// A new recurring meeting was scheduled in a group
    NewMeeting,
    /// A group meeting happens today
    TodayMeeting,
    /// Someone joined the user's group
    Join,
}

impl AlarmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmType::Comment => "COMMENT",
            AlarmType::Notice => "NOTICE",
            AlarmType::Chatting => "CHATTING",
            AlarmType::Answer => "ANSWER",
            AlarmType::NewMeeting => "NEW_MEETING",
            AlarmType::TodayMeeting => "TODAY_MEETING",
            AlarmType::Join => "JOIN",
        }
    }

    /// Parse the stored text form; unknown values degrade to `Notice`.
    pub fn parse(s: &str) -> AlarmType {
        match s.to_uppercase().as_str() {
            "COMMENT" => AlarmType::Comment,
            "NOTICE" => AlarmType::Notice,
            "CHATTING" => AlarmType::Chatting,
            "ANSWER" => AlarmType::Answer,
            "NEW_MEETING" => AlarmType::NewMeeting,
            "TODAY_MEETING" => AlarmType::TodayMeeting,
            "JOIN" => AlarmType::Join,
            _ => AlarmType::Notice,
        }
    }
}

/// Persisted user alarm. Content is immutable after creation; only the
/// `is_read`/`read_date` pair is ever updated, exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alarm {
    pub id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub redirect_url: String,
    pub alarm_type: AlarmType,
    pub is_read: bool,
    pub read_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the dispatcher when persisting a new alarm.
/// Alarms always start unread. The id is fixed by the caller: event-derived
/// alarms use a deterministic id so a redelivered event cannot create a
/// second row.
#[derive(Debug, Clone)]
pub struct NewAlarm {
    pub id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub redirect_url: String,
    pub alarm_type: AlarmType,
}

/// Role of a user inside a chat room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    Member,
    Admin,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::Member => "member",
            ChatRole::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> ChatRole {
        match s.to_lowercase().as_str() {
            "admin" => ChatRole::Admin,
            _ => ChatRole::Member,
        }
    }
}

/// A chat room is tied 1:1 to its owning group; deleting the group
/// cascades the room, memberships and messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: Uuid,
    pub group_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Membership row; at most one per (user, room) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatUser {
    pub user_id: Uuid,
    pub chat_room_id: Uuid,
    pub role: ChatRole,
    pub joined_at: DateTime<Utc>,
}

/// Append-only chat message, ordered by a per-room sequence assigned at
/// insert time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub chat_room_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub attachment_urls: Vec<String>,
    pub seq: i64,
    pub created_at: DateTime<Utc>,
}

/// Message fields fixed at publish time. The id is assigned by the
/// publisher so redelivered broker events stay idempotent.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Uuid,
    pub chat_room_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub attachment_urls: Vec<String>,
}

/// Page selector for message history.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: i64,
    pub size: i64,
    /// Newest-first by default, matching how clients render history.
    pub oldest_first: bool,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: 50,
            oldest_first: false,
        }
    }
}

impl PageRequest {
    pub fn offset(&self) -> i64 {
        self.page * self.size
    }
}
