//! Persistence traits for alarms and chat state. The Postgres
//! implementations live in this module; tests substitute in-memory doubles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    Alarm, ChatRole, ChatRoom, Message, NewAlarm, NewMessage, PageRequest,
};

mod alarm;
mod chat;

pub use alarm::PgAlarmStore;
pub use chat::PgChatStore;

/// Persistence and retention surface for alarm records.
#[async_trait]
pub trait AlarmStore: Send + Sync {
    /// Persist a new alarm. Always starts unread.
    async fn create(&self, new: NewAlarm) -> AppResult<Alarm>;

    async fn get(&self, id: Uuid) -> AppResult<Option<Alarm>>;

    /// Unread plus recently read alarms for a user, newest first.
    async fn find_by_receiver(&self, receiver_id: Uuid) -> AppResult<Vec<Alarm>>;

    /// Set `is_read`/`read_date`. Idempotent: returns `Ok(false)` when the
    /// alarm was already read, preserving the original `read_date`.
    async fn mark_read(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool>;

    /// Delete read alarms with `read_date <= cutoff`. Returns rows removed.
    async fn delete_read_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;

    /// Delete unread alarms with `created_at <= cutoff`. Returns rows removed.
    async fn delete_unread_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;

    /// Cascade cleanup on account deletion.
    async fn delete_all_for_receiver(&self, receiver_id: Uuid) -> AppResult<u64>;
}

/// Persistence surface for rooms, memberships and the ordered message log.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Create-if-absent: returns the existing room when the group already
    /// has one.
    async fn ensure_room_for_group(&self, group_id: Uuid, name: &str) -> AppResult<ChatRoom>;

    /// Add a membership. A repeated join is a no-op.
    async fn join(&self, user_id: Uuid, room_id: Uuid, role: ChatRole) -> AppResult<()>;

    async fn leave(&self, user_id: Uuid, room_id: Uuid) -> AppResult<()>;

    async fn is_member(&self, user_id: Uuid, room_id: Uuid) -> AppResult<bool>;

    async fn room_member_ids(&self, room_id: Uuid) -> AppResult<Vec<Uuid>>;

    /// Append a message with the next per-room sequence number. Idempotent
    /// on the message id: a redelivered event returns the existing row.
    async fn append_message(&self, new: NewMessage) -> AppResult<Message>;

    async fn list_messages(&self, room_id: Uuid, page: PageRequest) -> AppResult<Vec<Message>>;

    async fn list_rooms_for_user(&self, user_id: Uuid) -> AppResult<Vec<ChatRoom>>;

    /// Cascade-delete the group's room, its memberships and messages.
    async fn delete_room_for_group(&self, group_id: Uuid) -> AppResult<()>;
}
