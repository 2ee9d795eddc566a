use std::sync::Arc;
use std::time::Duration;

use crate::broker::EventPublisher;
use crate::dispatch::NotificationDispatcher;
use crate::registry::ConnectionRegistry;
use crate::store::{AlarmStore, ChatStore};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub alarms: Arc<dyn AlarmStore>,
    pub chats: Arc<dyn ChatStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub publisher: Arc<dyn EventPublisher>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub keep_alive: Duration,
}
