//! In-memory test doubles for the persistence and broker seams.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use realtime_delivery_service::broker::EventPublisher;
use realtime_delivery_service::error::{AppError, AppResult};
use realtime_delivery_service::models::{
    Alarm, ChatRole, ChatRoom, Message, NewAlarm, NewMessage, PageRequest,
};
use realtime_delivery_service::store::{AlarmStore, ChatStore};

#[derive(Default)]
pub struct MemoryAlarmStore {
    alarms: Mutex<Vec<Alarm>>,
}

impl MemoryAlarmStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Alarm> {
        self.alarms.lock().unwrap().clone()
    }

    pub fn insert(&self, alarm: Alarm) {
        self.alarms.lock().unwrap().push(alarm);
    }
}

#[async_trait]
impl AlarmStore for MemoryAlarmStore {
    async fn create(&self, new: NewAlarm) -> AppResult<Alarm> {
        let mut alarms = self.alarms.lock().unwrap();
        if let Some(existing) = alarms.iter().find(|a| a.id == new.id) {
            return Ok(existing.clone());
        }
        let alarm = Alarm {
            id: new.id,
            receiver_id: new.receiver_id,
            content: new.content,
            redirect_url: new.redirect_url,
            alarm_type: new.alarm_type,
            is_read: false,
            read_date: None,
            created_at: Utc::now(),
        };
        alarms.push(alarm.clone());
        Ok(alarm)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Alarm>> {
        Ok(self
            .alarms
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn find_by_receiver(&self, receiver_id: Uuid) -> AppResult<Vec<Alarm>> {
        let mut found: Vec<Alarm> = self
            .alarms
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.receiver_id == receiver_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn mark_read(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let mut alarms = self.alarms.lock().unwrap();
        match alarms.iter_mut().find(|a| a.id == id && !a.is_read) {
            Some(alarm) => {
                alarm.is_read = true;
                alarm.read_date = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_read_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut alarms = self.alarms.lock().unwrap();
        let before = alarms.len();
        alarms.retain(|a| !(a.is_read && a.read_date.map_or(false, |d| d <= cutoff)));
        Ok((before - alarms.len()) as u64)
    }

    async fn delete_unread_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut alarms = self.alarms.lock().unwrap();
        let before = alarms.len();
        alarms.retain(|a| !(!a.is_read && a.created_at <= cutoff));
        Ok((before - alarms.len()) as u64)
    }

    async fn delete_all_for_receiver(&self, receiver_id: Uuid) -> AppResult<u64> {
        let mut alarms = self.alarms.lock().unwrap();
        let before = alarms.len();
        alarms.retain(|a| a.receiver_id != receiver_id);
        Ok((before - alarms.len()) as u64)
    }
}

#[derive(Default)]
struct ChatState {
    rooms: Vec<ChatRoom>,
    members: Vec<(Uuid, Uuid, ChatRole)>,
    messages: Vec<Message>,
    counters: HashMap<Uuid, i64>,
}

#[derive(Default)]
pub struct MemoryChatStore {
    state: Mutex<ChatState>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a room with the given members and return the room id.
    pub fn seed_room(&self, members: &[Uuid]) -> Uuid {
        let mut state = self.state.lock().unwrap();
        let room = ChatRoom {
            id: Uuid::new_v4(),
            group_id: Uuid::new_v4(),
            name: "room".into(),
            created_at: Utc::now(),
        };
        let room_id = room.id;
        state.rooms.push(room);
        for m in members {
            state.members.push((*m, room_id, ChatRole::Member));
        }
        room_id
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().unwrap().messages.clone()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn ensure_room_for_group(&self, group_id: Uuid, name: &str) -> AppResult<ChatRoom> {
        let mut state = self.state.lock().unwrap();
        if let Some(room) = state.rooms.iter().find(|r| r.group_id == group_id) {
            return Ok(room.clone());
        }
        let room = ChatRoom {
            id: Uuid::new_v4(),
            group_id,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        state.rooms.push(room.clone());
        Ok(room)
    }

    async fn join(&self, user_id: Uuid, room_id: Uuid, role: ChatRole) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state
            .members
            .iter()
            .any(|(u, r, _)| *u == user_id && *r == room_id)
        {
            state.members.push((user_id, room_id, role));
        }
        Ok(())
    }

    async fn leave(&self, user_id: Uuid, room_id: Uuid) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .members
            .retain(|(u, r, _)| !(*u == user_id && *r == room_id));
        Ok(())
    }

    async fn is_member(&self, user_id: Uuid, room_id: Uuid) -> AppResult<bool> {
        let state = self.state.lock().unwrap();
        Ok(state
            .members
            .iter()
            .any(|(u, r, _)| *u == user_id && *r == room_id))
    }

    async fn room_member_ids(&self, room_id: Uuid) -> AppResult<Vec<Uuid>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .members
            .iter()
            .filter(|(_, r, _)| *r == room_id)
            .map(|(u, _, _)| *u)
            .collect())
    }

    async fn append_message(&self, new: NewMessage) -> AppResult<Message> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.messages.iter().find(|m| m.id == new.id) {
            return Ok(existing.clone());
        }
        let seq = state
            .counters
            .entry(new.chat_room_id)
            .and_modify(|s| *s += 1)
            .or_insert(1);
        let message = Message {
            id: new.id,
            chat_room_id: new.chat_room_id,
            sender_id: new.sender_id,
            content: new.content,
            attachment_urls: new.attachment_urls,
            seq: *seq,
            created_at: Utc::now(),
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, room_id: Uuid, page: PageRequest) -> AppResult<Vec<Message>> {
        let state = self.state.lock().unwrap();
        let mut messages: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.chat_room_id == room_id)
            .cloned()
            .collect();
        if page.oldest_first {
            messages.sort_by_key(|m| m.seq);
        } else {
            messages.sort_by_key(|m| std::cmp::Reverse(m.seq));
        }
        Ok(messages
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size as usize)
            .collect())
    }

    async fn list_rooms_for_user(&self, user_id: Uuid) -> AppResult<Vec<ChatRoom>> {
        let state = self.state.lock().unwrap();
        let room_ids: Vec<Uuid> = state
            .members
            .iter()
            .filter(|(u, _, _)| *u == user_id)
            .map(|(_, r, _)| *r)
            .collect();
        Ok(state
            .rooms
            .iter()
            .filter(|r| room_ids.contains(&r.id))
            .cloned()
            .collect())
    }

    async fn delete_room_for_group(&self, group_id: Uuid) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        let Some(pos) = state.rooms.iter().position(|r| r.group_id == group_id) else {
            return Ok(());
        };
        let room_id = state.rooms.remove(pos).id;
        state.members.retain(|(_, r, _)| *r != room_id);
        state.messages.retain(|m| m.chat_room_id != room_id);
        state.counters.remove(&room_id);
        Ok(())
    }
}

/// Records every publish; always succeeds.
#[derive(Default)]
pub struct CapturingPublisher {
    pub published: Mutex<Vec<(String, String, Vec<u8>)>>,
}

#[async_trait]
impl EventPublisher for CapturingPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> AppResult<()> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), key.to_string(), payload.to_vec()));
        Ok(())
    }
}

/// Simulates a broker outage.
pub struct FailingPublisher;

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn publish(&self, _topic: &str, _key: &str, _payload: &[u8]) -> AppResult<()> {
        Err(AppError::BrokerUnavailable("broker down".into()))
    }
}
