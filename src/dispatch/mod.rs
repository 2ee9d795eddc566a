//! Central state machine for incoming broker events:
//! RECEIVED -> PERSISTED -> DELIVERED(n), with n >= 0.
//!
//! Persistence failures propagate to the consumer loop, which withholds the
//! broker commit so the event is redelivered. Fan-out failures never do:
//! push is best-effort and the store is the guaranteed fallback.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppResult;
use crate::events::{AccountEvent, AlarmEvent, ChatMessageEvent, PushEvent};
use crate::metrics;
use crate::models::{AlarmType, NewAlarm, NewMessage};
use crate::registry::ConnectionRegistry;
use crate::store::{AlarmStore, ChatStore};

/// How one event moved through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Id of the persisted record.
    pub persisted: Uuid,
    /// Live connections reached. Zero means the recipient was offline and
    /// will fetch the persisted state later.
    pub delivered: usize,
}

pub struct NotificationDispatcher {
    alarms: Arc<dyn AlarmStore>,
    chats: Arc<dyn ChatStore>,
    registry: Arc<ConnectionRegistry>,
}

impl NotificationDispatcher {
    pub fn new(
        alarms: Arc<dyn AlarmStore>,
        chats: Arc<dyn ChatStore>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            alarms,
            chats,
            registry,
        }
    }

    /// Persist an alarm, then fan it out to every live connection of the
    /// receiver.
    pub async fn handle_alarm_event(&self, event: AlarmEvent) -> AppResult<DispatchOutcome> {
        let alarm = self
            .alarms
            .create(NewAlarm {
                id: Uuid::new_v4(),
                receiver_id: event.receiver_id,
                content: event.content,
                redirect_url: event.redirect_url,
                alarm_type: event.alarm_type,
            })
            .await?;
        metrics::inc_persisted("alarm");

        let delivered = self
            .registry
            .push_to_user(alarm.receiver_id, PushEvent::alarm(&alarm))
            .await;
        metrics::add_delivered("alarm", delivered);

        debug!(alarm_id = %alarm.id, receiver_id = %alarm.receiver_id, delivered, "dispatched alarm");
        Ok(DispatchOutcome {
            persisted: alarm.id,
            delivered,
        })
    }

    /// Persist a chat message, push it to every current room member, and
    /// raise a `Chatting` alarm for each member other than the sender so
    /// offline members find the message on their next fetch.
    pub async fn handle_chat_event(&self, event: ChatMessageEvent) -> AppResult<DispatchOutcome> {
        let message = self
            .chats
            .append_message(NewMessage {
                id: event.message_id,
                chat_room_id: event.chat_room_id,
                sender_id: event.sender_id,
                content: event.content,
                attachment_urls: event.attachment_urls,
            })
            .await?;
        metrics::inc_persisted("chat");

        let members = self.chats.room_member_ids(message.chat_room_id).await?;
        let frame = PushEvent::chat(&message);

        let mut delivered = 0;
        for member in &members {
            delivered += self.registry.push_to_user(*member, frame.clone()).await;
        }
        metrics::add_delivered("chat", delivered);

        for member in members.iter().filter(|m| **m != message.sender_id) {
            let alarm = self
                .alarms
                .create(NewAlarm {
                    id: chat_alarm_id(message.id, *member),
                    receiver_id: *member,
                    content: format!("New message: {}", preview(&message.content)),
                    redirect_url: format!("/chatting/{}", message.chat_room_id),
                    alarm_type: AlarmType::Chatting,
                })
                .await?;
            metrics::inc_persisted("alarm");
            self.registry
                .push_to_user(*member, PushEvent::alarm(&alarm))
                .await;
        }

        debug!(
            message_id = %message.id,
            room_id = %message.chat_room_id,
            members = members.len(),
            delivered,
            "dispatched chat message"
        );
        Ok(DispatchOutcome {
            persisted: message.id,
            delivered,
        })
    }

    /// Account-deletion cleanup: drop the user's alarm history and tear
    /// down any live connections.
    pub async fn handle_account_deleted(&self, event: AccountEvent) -> AppResult<()> {
        let alarms_removed = self.alarms.delete_all_for_receiver(event.user_id).await?;
        let connections_dropped = self.registry.remove_all_for_user(event.user_id).await;
        info!(
            user_id = %event.user_id,
            alarms_removed,
            connections_dropped,
            "account deleted, purged delivery state"
        );
        Ok(())
    }
}

const CHAT_ALARM_NAMESPACE: Uuid = Uuid::from_u128(0x6d4a_91c3_58f0_42b7_9ae2_0c75_13b8_44d1);

/// Deterministic alarm id per (message, member). A chat event that fails
/// partway through the member loop gets redelivered; the fixed id keeps the
/// already-created alarms from duplicating.
fn chat_alarm_id(message_id: Uuid, member: Uuid) -> Uuid {
    let mut name = [0u8; 32];
    name[..16].copy_from_slice(message_id.as_bytes());
    name[16..].copy_from_slice(member.as_bytes());
    Uuid::new_v5(&CHAT_ALARM_NAMESPACE, &name)
}

fn preview(content: &str) -> &str {
    let end = content
        .char_indices()
        .nth(40)
        .map(|(i, _)| i)
        .unwrap_or(content.len());
    &content[..end]
}
