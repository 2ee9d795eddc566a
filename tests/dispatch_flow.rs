//! Event pipeline behavior: persist first, then best-effort fan-out to
//! every live connection of the recipient.

mod common;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use common::{MemoryAlarmStore, MemoryChatStore};
use realtime_delivery_service::dispatch::NotificationDispatcher;
use realtime_delivery_service::events::{AccountEvent, AlarmEvent, ChatMessageEvent, PushEvent};
use realtime_delivery_service::models::AlarmType;
use realtime_delivery_service::registry::ConnectionRegistry;

struct Harness {
    alarms: Arc<MemoryAlarmStore>,
    chats: Arc<MemoryChatStore>,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<NotificationDispatcher>,
}

fn harness() -> Harness {
    let alarms = Arc::new(MemoryAlarmStore::new());
    let chats = Arc::new(MemoryChatStore::new());
    let registry = Arc::new(ConnectionRegistry::new());
    let dispatcher = Arc::new(NotificationDispatcher::new(
        alarms.clone(),
        chats.clone(),
        registry.clone(),
    ));
    Harness {
        alarms,
        chats,
        registry,
        dispatcher,
    }
}

fn alarm_event(receiver_id: Uuid) -> AlarmEvent {
    AlarmEvent {
        receiver_id,
        content: "someone commented on your post".into(),
        redirect_url: "/posts/1".into(),
        alarm_type: AlarmType::Comment,
        sent_at: Utc::now(),
    }
}

fn chat_event(room_id: Uuid, sender_id: Uuid) -> ChatMessageEvent {
    ChatMessageEvent {
        message_id: Uuid::new_v4(),
        chat_room_id: room_id,
        sender_id,
        content: "hello".into(),
        attachment_urls: vec![],
        sent_at: Utc::now(),
    }
}

#[actix_rt::test]
async fn alarm_reaches_every_device_of_the_receiver() {
    let h = harness();
    let user = Uuid::new_v4();

    let (tx1, mut rx1) = mpsc::unbounded_channel();
    let (tx2, mut rx2) = mpsc::unbounded_channel();
    h.registry.register(user, tx1).await;
    h.registry.register(user, tx2).await;

    let outcome = h.dispatcher.handle_alarm_event(alarm_event(user)).await.unwrap();
    assert_eq!(outcome.delivered, 2);

    for rx in [&mut rx1, &mut rx2] {
        match rx.recv().await.unwrap() {
            PushEvent::Alarm { id, .. } => assert_eq!(id, outcome.persisted),
            other => panic!("expected alarm frame, got {other:?}"),
        }
    }
}

#[actix_rt::test]
async fn offline_receiver_still_gets_a_persisted_alarm() {
    let h = harness();
    let user = Uuid::new_v4();

    let outcome = h.dispatcher.handle_alarm_event(alarm_event(user)).await.unwrap();

    assert_eq!(outcome.delivered, 0);
    let stored = h.alarms.all();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].receiver_id, user);
    assert!(!stored[0].is_read);
}

#[actix_rt::test]
async fn alarm_for_one_user_never_reaches_another() {
    let h = harness();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let (tx_bob, mut rx_bob) = mpsc::unbounded_channel();
    h.registry.register(bob, tx_bob).await;

    let outcome = h.dispatcher.handle_alarm_event(alarm_event(alice)).await.unwrap();

    assert_eq!(outcome.delivered, 0);
    assert!(rx_bob.try_recv().is_err());
}

#[actix_rt::test]
async fn chat_message_fans_out_and_raises_alarms_for_other_members() {
    let h = harness();
    let sender = Uuid::new_v4();
    let member = Uuid::new_v4();
    let room = h.chats.seed_room(&[sender, member]);

    let (tx_sender, mut rx_sender) = mpsc::unbounded_channel();
    let (tx_member, mut rx_member) = mpsc::unbounded_channel();
    h.registry.register(sender, tx_sender).await;
    h.registry.register(member, tx_member).await;

    let event = chat_event(room, sender);
    let outcome = h.dispatcher.handle_chat_event(event.clone()).await.unwrap();
    assert_eq!(outcome.persisted, event.message_id);
    assert_eq!(outcome.delivered, 2);

    // Both members get the chat frame.
    for rx in [&mut rx_sender, &mut rx_member] {
        match rx.recv().await.unwrap() {
            PushEvent::Chat { message_id, room_id, .. } => {
                assert_eq!(message_id, event.message_id);
                assert_eq!(room_id, room);
            }
            other => panic!("expected chat frame, got {other:?}"),
        }
    }

    // Only the non-sender gets a Chatting alarm.
    match rx_member.recv().await.unwrap() {
        PushEvent::Alarm { alarm_type, redirect_url, .. } => {
            assert_eq!(alarm_type, AlarmType::Chatting);
            assert_eq!(redirect_url, format!("/chatting/{room}"));
        }
        other => panic!("expected alarm frame, got {other:?}"),
    }
    assert!(rx_sender.try_recv().is_err());

    let alarms = h.alarms.all();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].receiver_id, member);
}

#[actix_rt::test]
async fn redelivered_chat_event_does_not_duplicate_the_message() {
    let h = harness();
    let sender = Uuid::new_v4();
    let room = h.chats.seed_room(&[sender]);

    let event = chat_event(room, sender);
    let first = h.dispatcher.handle_chat_event(event.clone()).await.unwrap();
    let second = h.dispatcher.handle_chat_event(event).await.unwrap();

    assert_eq!(first.persisted, second.persisted);
    assert_eq!(h.chats.messages().len(), 1);

    // The duplicate must not consume a sequence number either.
    h.dispatcher
        .handle_chat_event(chat_event(room, sender))
        .await
        .unwrap();
    let seqs: Vec<i64> = h.chats.messages().iter().map(|m| m.seq).collect();
    assert_eq!(seqs, vec![1, 2]);
}

#[actix_rt::test]
async fn redelivered_chat_event_does_not_duplicate_chatting_alarms() {
    let h = harness();
    let sender = Uuid::new_v4();
    let member = Uuid::new_v4();
    let room = h.chats.seed_room(&[sender, member]);

    let event = chat_event(room, sender);
    h.dispatcher.handle_chat_event(event.clone()).await.unwrap();
    h.dispatcher.handle_chat_event(event).await.unwrap();

    let alarms = h.alarms.all();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].receiver_id, member);
}

#[actix_rt::test]
async fn messages_keep_per_room_sequence_order() {
    let h = harness();
    let sender = Uuid::new_v4();
    let room = h.chats.seed_room(&[sender]);

    for _ in 0..5 {
        h.dispatcher
            .handle_chat_event(chat_event(room, sender))
            .await
            .unwrap();
    }

    let seqs: Vec<i64> = h.chats.messages().iter().map(|m| m.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
}

#[actix_rt::test]
async fn concurrent_publishers_share_one_gap_free_room_sequence() {
    let h = harness();
    let publishers: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
    let room = h.chats.seed_room(&publishers);

    let mut tasks = Vec::new();
    for publisher in publishers {
        let dispatcher = h.dispatcher.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..5 {
                dispatcher
                    .handle_chat_event(chat_event(room, publisher))
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Whatever the interleaving, the stored log carries sequence numbers
    // 1..=20 with no gaps or duplicates, in insertion order.
    let seqs: Vec<i64> = h.chats.messages().iter().map(|m| m.seq).collect();
    assert_eq!(seqs, (1..=20).collect::<Vec<i64>>());
}

#[actix_rt::test]
async fn account_deletion_purges_alarms_and_connections() {
    let h = harness();
    let user = Uuid::new_v4();

    h.dispatcher.handle_alarm_event(alarm_event(user)).await.unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    h.registry.register(user, tx).await;

    h.dispatcher
        .handle_account_deleted(AccountEvent { user_id: user })
        .await
        .unwrap();

    assert!(h.alarms.all().is_empty());
    assert!(h.registry.find_by_user(user).await.is_empty());
}
