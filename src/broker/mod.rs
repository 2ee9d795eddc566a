//! Broker gateway: owns topic topology, the publish path and the consumer
//! lifecycle for the chat and alarm channels.
//!
//! One logical consumer group per process type (`chat-consumer`,
//! `alarm-consumer`). Offsets are committed manually, only after the
//! dispatcher persisted the event; events that keep failing are routed to a
//! `.dlq` sibling topic instead of being dropped. Chat messages are keyed
//! by room id so per-room order is preserved within a partition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::{error, info, warn};

use crate::config::BrokerConfig;
use crate::dispatch::NotificationDispatcher;
use crate::error::{AppError, AppResult};
use crate::events::{AccountEvent, AlarmEvent, ChatMessageEvent};
use crate::metrics;

pub const TOPIC_CHAT_MESSAGES: &str = "chat-messages";
pub const TOPIC_ALARM_EVENTS: &str = "alarm-events";
pub const TOPIC_ACCOUNT_EVENTS: &str = "account-events";

pub fn dlq_topic(topic: &str) -> String {
    format!("{topic}.dlq")
}

/// Durable enqueue. Failure is retryable for the caller (503), never fatal
/// to the process.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> AppResult<()>;
}

pub struct KafkaPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> AppResult<()> {
        let record = FutureRecord::to(topic).key(key).payload(payload);
        self.producer
            .send(record, self.timeout)
            .await
            .map_err(|(e, _)| AppError::BrokerUnavailable(e.to_string()))?;
        Ok(())
    }
}

/// Backoff schedule for consumer (re)connection and event reprocessing.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 100,
            max_backoff_ms: 5000,
        }
    }
}

impl RetryPolicy {
    pub fn get_backoff(&self, attempt: u32) -> Duration {
        let backoff = self
            .backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt));
        Duration::from_millis(backoff.min(self.max_backoff_ms))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

pub struct BrokerGateway {
    config: BrokerConfig,
    publisher: Arc<KafkaPublisher>,
    chat_listener_started: AtomicBool,
    alarm_listener_started: AtomicBool,
}

impl BrokerGateway {
    pub fn new(config: BrokerConfig) -> AppResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", config.publish_timeout_ms.to_string())
            .create()
            .map_err(|e| AppError::Config(format!("failed to create producer: {e}")))?;

        Ok(Self {
            publisher: Arc::new(KafkaPublisher {
                producer,
                timeout: Duration::from_millis(config.publish_timeout_ms),
            }),
            config,
            chat_listener_started: AtomicBool::new(false),
            alarm_listener_started: AtomicBool::new(false),
        })
    }

    pub fn publisher(&self) -> Arc<dyn EventPublisher> {
        self.publisher.clone()
    }

    /// Spawn the chat consumer loop. Idempotent: a second call is a no-op.
    pub fn init_chat_listener(&self, dispatcher: Arc<NotificationDispatcher>) {
        if self.chat_listener_started.swap(true, Ordering::SeqCst) {
            warn!("chat listener already initialized, ignoring");
            return;
        }
        tokio::spawn(run_consumer(
            self.config.clone(),
            self.config.chat_group_id.clone(),
            vec![TOPIC_CHAT_MESSAGES.to_string()],
            dispatcher,
            self.publisher.clone() as Arc<dyn EventPublisher>,
            RetryPolicy::default(),
        ));
    }

    /// Spawn the alarm consumer loop (alarm and account topics).
    /// Idempotent: a second call is a no-op.
    pub fn init_alarm_listener(&self, dispatcher: Arc<NotificationDispatcher>) {
        if self.alarm_listener_started.swap(true, Ordering::SeqCst) {
            warn!("alarm listener already initialized, ignoring");
            return;
        }
        tokio::spawn(run_consumer(
            self.config.clone(),
            self.config.alarm_group_id.clone(),
            vec![
                TOPIC_ALARM_EVENTS.to_string(),
                TOPIC_ACCOUNT_EVENTS.to_string(),
            ],
            dispatcher,
            self.publisher.clone() as Arc<dyn EventPublisher>,
            RetryPolicy::default(),
        ));
    }
}

fn build_consumer(config: &BrokerConfig, group_id: &str) -> AppResult<StreamConsumer> {
    ClientConfig::new()
        .set("bootstrap.servers", &config.brokers)
        .set("group.id", group_id)
        .set("auto.offset.reset", "latest")
        // Manual commits: acknowledge only after the dispatcher persisted.
        .set("enable.auto.commit", "false")
        .set("session.timeout.ms", "30000")
        .set("heartbeat.interval.ms", "10000")
        .create()
        .map_err(|e| AppError::BrokerUnavailable(format!("failed to create consumer: {e}")))
}

/// Long-running consumer loop for one consumer group. Reconnects forever
/// with capped exponential backoff; the process never gives up on the
/// broker permanently.
async fn run_consumer(
    config: BrokerConfig,
    group_id: String,
    topics: Vec<String>,
    dispatcher: Arc<NotificationDispatcher>,
    publisher: Arc<dyn EventPublisher>,
    retry: RetryPolicy,
) {
    let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
    let mut connect_attempt: u32 = 0;

    loop {
        let consumer = match build_consumer(&config, &group_id) {
            Ok(c) => c,
            Err(e) => {
                warn!(%group_id, "consumer creation failed: {e}");
                tokio::time::sleep(retry.get_backoff(connect_attempt.min(6))).await;
                connect_attempt = connect_attempt.saturating_add(1);
                continue;
            }
        };
        if let Err(e) = consumer.subscribe(&topic_refs) {
            warn!(%group_id, "subscribe failed: {e}");
            tokio::time::sleep(retry.get_backoff(connect_attempt.min(6))).await;
            connect_attempt = connect_attempt.saturating_add(1);
            continue;
        }
        connect_attempt = 0;
        info!(%group_id, ?topics, "broker consumer subscribed");

        loop {
            match consumer.recv().await {
                Err(e) => {
                    warn!(%group_id, "broker consumer error: {e}");
                    tokio::time::sleep(retry.get_backoff(0)).await;
                }
                Ok(m) => {
                    let topic = m.topic().to_string();
                    let payload = m.payload().unwrap_or_default().to_vec();

                    match process_with_retry(&topic, &payload, &dispatcher, &publisher, &retry)
                        .await
                    {
                        Ok(()) => {
                            if let Err(e) = consumer.commit_message(&m, CommitMode::Async) {
                                warn!(%group_id, "offset commit failed: {e}");
                            }
                        }
                        Err(e) => {
                            // Dead-letter publish also failed; leave the
                            // offset alone so the broker redelivers.
                            error!(%group_id, topic, "could not resolve event, awaiting redelivery: {e}");
                        }
                    }
                }
            }
        }
    }
}

/// Process one broker record: retry retryable failures per policy, then
/// route to the dead-letter topic. `Err` means the event could not be
/// resolved at all (not even dead-lettered) and must not be acknowledged.
async fn process_with_retry(
    topic: &str,
    payload: &[u8],
    dispatcher: &NotificationDispatcher,
    publisher: &Arc<dyn EventPublisher>,
    retry: &RetryPolicy,
) -> AppResult<()> {
    let mut attempt: u32 = 0;
    loop {
        match handle_record(topic, payload, dispatcher).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && retry.should_retry(attempt) => {
                warn!(topic, attempt, "event processing failed, retrying: {e}");
                tokio::time::sleep(retry.get_backoff(attempt)).await;
                attempt += 1;
            }
            Err(e) => {
                error!(topic, "event processing failed, routing to dead letter: {e}");
                publisher.publish(&dlq_topic(topic), "", payload).await?;
                metrics::inc_dead_lettered(topic);
                return Ok(());
            }
        }
    }
}

async fn handle_record(
    topic: &str,
    payload: &[u8],
    dispatcher: &NotificationDispatcher,
) -> AppResult<()> {
    match topic {
        TOPIC_CHAT_MESSAGES => {
            let event: ChatMessageEvent = decode(payload)?;
            dispatcher.handle_chat_event(event).await?;
        }
        TOPIC_ALARM_EVENTS => {
            let event: AlarmEvent = decode(payload)?;
            dispatcher.handle_alarm_event(event).await?;
        }
        TOPIC_ACCOUNT_EVENTS => {
            let event: AccountEvent = decode(payload)?;
            dispatcher.handle_account_deleted(event).await?;
        }
        other => {
            return Err(AppError::BadRequest(format!("unexpected topic: {other}")));
        }
    }
    Ok(())
}

fn decode<T: serde::de::DeserializeOwned>(payload: &[u8]) -> AppResult<T> {
    serde_json::from_slice(payload)
        .map_err(|e| AppError::BadRequest(format!("undecodable event payload: {e}")))
}
