use std::str::FromStr;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub broker: BrokerConfig,
    pub delivery: DeliveryConfig,
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub brokers: String,
    /// One logical consumer group per process type, so a multi-instance
    /// deployment processes each event once per group, not once per instance.
    pub chat_group_id: String,
    pub alarm_group_id: String,
    pub publish_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Keep-alive period for SSE connections; a failed keep-alive write is
    /// treated as a disconnect.
    pub keep_alive_secs: u64,
}

/// Retention policy. Read alarms expire counted from `read_date`; unread
/// alarms get the longer window counted from `created_at` since the user
/// has not seen them yet.
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub read_retention_days: i64,
    pub unread_retention_days: i64,
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> AppResult<Config> {
        Ok(Config {
            app: AppConfig {
                env: env_or("APP_ENV", "development"),
                port: parse_env("APP_PORT", "8000")?,
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .map_err(|_| AppError::Config("DATABASE_URL is not set".into()))?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10")?,
            },
            broker: BrokerConfig {
                brokers: env_or("KAFKA_BROKERS", "localhost:9092"),
                chat_group_id: env_or("CHAT_CONSUMER_GROUP", "chat-consumer"),
                alarm_group_id: env_or("ALARM_CONSUMER_GROUP", "alarm-consumer"),
                publish_timeout_ms: parse_env("BROKER_PUBLISH_TIMEOUT_MS", "5000")?,
            },
            delivery: DeliveryConfig {
                keep_alive_secs: parse_env("SSE_KEEP_ALIVE_SECS", "30")?,
            },
            retention: RetentionConfig {
                read_retention_days: parse_env("READ_RETENTION_DAYS", "7")?,
                unread_retention_days: parse_env("UNREAD_RETENTION_DAYS", "30")?,
                sweep_interval_secs: parse_env("RETENTION_SWEEP_INTERVAL_SECS", "86400")?,
            },
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: FromStr>(key: &str, default: &str) -> AppResult<T> {
    let raw = env_or(key, default);
    raw.parse()
        .map_err(|_| AppError::Config(format!("invalid value for {key}: {raw}")))
}
