use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use super::ChatStore;
use crate::error::{AppError, AppResult};
use crate::models::{ChatRole, ChatRoom, Message, NewMessage, PageRequest};

pub struct PgChatStore {
    db: PgPool,
}

impl PgChatStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    fn row_to_room(row: &sqlx::postgres::PgRow) -> ChatRoom {
        ChatRoom {
            id: row.get("id"),
            group_id: row.get("group_id"),
            name: row.get("name"),
            created_at: row.get("created_at"),
        }
    }

    fn row_to_message(row: &sqlx::postgres::PgRow) -> Message {
        Message {
            id: row.get("id"),
            chat_room_id: row.get("chat_room_id"),
            sender_id: row.get("sender_id"),
            content: row.get("content"),
            attachment_urls: row.get("attachment_urls"),
            seq: row.get("seq"),
            created_at: row.get("created_at"),
        }
    }
}

const MESSAGE_COLUMNS: &str =
    "id, chat_room_id, sender_id, content, attachment_urls, seq, created_at";

#[async_trait]
impl ChatStore for PgChatStore {
    async fn ensure_room_for_group(&self, group_id: Uuid, name: &str) -> AppResult<ChatRoom> {
        // The no-op DO UPDATE makes RETURNING yield the existing row on
        // conflict, so create-if-absent is a single round trip.
        let row = sqlx::query(
            r#"
            INSERT INTO chat_rooms (id, group_id, name, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (group_id) DO UPDATE SET name = chat_rooms.name
            RETURNING id, group_id, name, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(group_id)
        .bind(name)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        Ok(Self::row_to_room(&row))
    }

    async fn join(&self, user_id: Uuid, room_id: Uuid, role: ChatRole) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_users (user_id, chat_room_id, role, joined_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, chat_room_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(room_id)
        .bind(role.as_str())
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        debug!(%user_id, %room_id, "joined chat room");
        Ok(())
    }

    async fn leave(&self, user_id: Uuid, room_id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM chat_users WHERE user_id = $1 AND chat_room_id = $2")
            .bind(user_id)
            .bind(room_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn is_member(&self, user_id: Uuid, room_id: Uuid) -> AppResult<bool> {
        let row = sqlx::query(
            "SELECT 1 AS present FROM chat_users WHERE user_id = $1 AND chat_room_id = $2",
        )
        .bind(user_id)
        .bind(room_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.is_some())
    }

    async fn room_member_ids(&self, room_id: Uuid) -> AppResult<Vec<Uuid>> {
        let rows = sqlx::query("SELECT user_id FROM chat_users WHERE chat_room_id = $1")
            .bind(room_id)
            .fetch_all(&self.db)
            .await?;
        Ok(rows.iter().map(|r| r.get("user_id")).collect())
    }

    async fn append_message(&self, new: NewMessage) -> AppResult<Message> {
        // Redelivery check first: a duplicate must not advance the room
        // counter, or every redelivered event would leave a sequence gap.
        // Events for one room share a partition, so a duplicate always
        // arrives after its original and this check is race-free.
        let select = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
        if let Some(row) = sqlx::query(&select)
            .bind(new.id)
            .fetch_optional(&self.db)
            .await?
        {
            debug!(message_id = %new.id, "message already persisted, skipping");
            return Ok(Self::row_to_message(&row));
        }

        let query = format!(
            r#"
            WITH next AS (
                INSERT INTO room_counters (chat_room_id, last_seq)
                VALUES ($2, 1)
                ON CONFLICT (chat_room_id)
                DO UPDATE SET last_seq = room_counters.last_seq + 1
                RETURNING last_seq
            )
            INSERT INTO messages (id, chat_room_id, sender_id, content, attachment_urls, seq, created_at)
            SELECT $1, $2, $3, $4, $5, next.last_seq, $6 FROM next
            ON CONFLICT (id) DO NOTHING
            RETURNING {MESSAGE_COLUMNS}
            "#
        );

        let inserted = sqlx::query(&query)
            .bind(new.id)
            .bind(new.chat_room_id)
            .bind(new.sender_id)
            .bind(&new.content)
            .bind(&new.attachment_urls)
            .bind(Utc::now())
            .fetch_optional(&self.db)
            .await?;

        if let Some(row) = inserted {
            return Ok(Self::row_to_message(&row));
        }

        // Lost a race against a concurrent insert of the same id.
        let row = sqlx::query(&select)
            .bind(new.id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;
        Ok(Self::row_to_message(&row))
    }

    async fn list_messages(&self, room_id: Uuid, page: PageRequest) -> AppResult<Vec<Message>> {
        let direction = if page.oldest_first { "ASC" } else { "DESC" };
        let query = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_room_id = $1 \
             ORDER BY seq {direction} LIMIT $2 OFFSET $3"
        );

        let rows = sqlx::query(&query)
            .bind(room_id)
            .bind(page.size)
            .bind(page.offset())
            .fetch_all(&self.db)
            .await?;
        Ok(rows.iter().map(Self::row_to_message).collect())
    }

    async fn list_rooms_for_user(&self, user_id: Uuid) -> AppResult<Vec<ChatRoom>> {
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.group_id, r.name, r.created_at
            FROM chat_rooms r
            JOIN chat_users cu ON cu.chat_room_id = r.id
            WHERE cu.user_id = $1
            ORDER BY r.created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.iter().map(Self::row_to_room).collect())
    }

    async fn delete_room_for_group(&self, group_id: Uuid) -> AppResult<()> {
        // Memberships, messages and the sequence counter go with the room
        // via ON DELETE CASCADE.
        sqlx::query("DELETE FROM chat_rooms WHERE group_id = $1")
            .bind(group_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
