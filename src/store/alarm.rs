use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use super::AlarmStore;
use crate::error::{AppError, AppResult};
use crate::models::{Alarm, AlarmType, NewAlarm};

pub struct PgAlarmStore {
    db: PgPool,
}

impl PgAlarmStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    fn row_to_alarm(row: &sqlx::postgres::PgRow) -> Alarm {
        let alarm_type: String = row.get("alarm_type");
        Alarm {
            id: row.get("id"),
            receiver_id: row.get("receiver_id"),
            content: row.get("content"),
            redirect_url: row.get("redirect_url"),
            alarm_type: AlarmType::parse(&alarm_type),
            is_read: row.get("is_read"),
            read_date: row.get("read_date"),
            created_at: row.get("created_at"),
        }
    }
}

const ALARM_COLUMNS: &str =
    "id, receiver_id, content, redirect_url, alarm_type, is_read, read_date, created_at";

#[async_trait]
impl AlarmStore for PgAlarmStore {
    async fn create(&self, new: NewAlarm) -> AppResult<Alarm> {
        let now = Utc::now();

        let query = format!(
            r#"
            INSERT INTO alarms (id, receiver_id, content, redirect_url, alarm_type, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, false, $6)
            ON CONFLICT (id) DO NOTHING
            RETURNING {ALARM_COLUMNS}
            "#
        );

        let inserted = sqlx::query(&query)
            .bind(new.id)
            .bind(new.receiver_id)
            .bind(&new.content)
            .bind(&new.redirect_url)
            .bind(new.alarm_type.as_str())
            .bind(now)
            .fetch_optional(&self.db)
            .await?;

        if let Some(row) = inserted {
            debug!(alarm_id = %new.id, receiver_id = %new.receiver_id, "created alarm");
            return Ok(Self::row_to_alarm(&row));
        }

        // Same id seen before: the alarm's source event was redelivered.
        let query = format!("SELECT {ALARM_COLUMNS} FROM alarms WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(new.id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;
        Ok(Self::row_to_alarm(&row))
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Alarm>> {
        let query = format!("SELECT {ALARM_COLUMNS} FROM alarms WHERE id = $1");
        let row = sqlx::query(&query).bind(id).fetch_optional(&self.db).await?;
        Ok(row.as_ref().map(Self::row_to_alarm))
    }

    async fn find_by_receiver(&self, receiver_id: Uuid) -> AppResult<Vec<Alarm>> {
        let query = format!(
            "SELECT {ALARM_COLUMNS} FROM alarms WHERE receiver_id = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(receiver_id)
            .fetch_all(&self.db)
            .await?;
        Ok(rows.iter().map(Self::row_to_alarm).collect())
    }

    async fn mark_read(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        // The is_read guard makes a second call a no-op that keeps the
        // original read_date.
        let result = sqlx::query(
            "UPDATE alarms SET is_read = true, read_date = $2 WHERE id = $1 AND is_read = false",
        )
        .bind(id)
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_read_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM alarms WHERE is_read = true AND read_date <= $1")
            .bind(cutoff)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_unread_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM alarms WHERE is_read = false AND created_at <= $1")
            .bind(cutoff)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_all_for_receiver(&self, receiver_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM alarms WHERE receiver_id = $1")
            .bind(receiver_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
