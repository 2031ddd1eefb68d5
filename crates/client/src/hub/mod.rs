// Global subscription hub: one transport subscription, N in-app
// subscribers.
//
// UI screens mount and unmount constantly; the transport connection
// must not care. The hub owns the single subscription for its whole
// lifetime once `initialize()` is called, performs default side
// effects exactly once per event (offline cache append, presence map
// update), then fans out to every registered subscriber in
// registration order. A panicking subscriber is caught and logged and
// never starves the rest.

use std::panic::{catch_unwind, AssertUnwindSafe};

use roomline_common::protocol::ws::ChatEvent;
use roomline_common::types::Message;
use tracing::{debug, error};
use uuid::Uuid;

use crate::cache::OfflineCache;
use crate::presence::PresenceMap;
use crate::session::SessionEvent;

/// Opaque handle returned by `subscribe`, scoped to whatever UI
/// component registered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Per-event-kind callbacks. Implement only the channels a screen
/// cares about; the defaults are no-ops. Callbacks run inline on the
/// delivery thread and must not block.
pub trait HubSubscriber {
    fn on_new_message(&self, _message: &Message) {}
    fn on_message_read(&self, _reader_id: Uuid, _count: u64) {}
    fn on_status_update(&self, _user_id: Uuid, _online: bool) {}
    fn on_connected(&self) {}
    fn on_disconnected(&self, _reason: &str) {}
    fn on_conversation_update(&self, _message: &Message) {}
    fn on_error(&self, _code: &str, _message: &str) {}
}

/// One typed event per logical occurrence, regardless of which wire
/// channel carried it.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    NewMessage(Message),
    MessageRead { reader_id: Uuid, count: u64 },
    StatusUpdate { user_id: Uuid, online: bool },
    Connected,
    Disconnected { reason: String },
    ConversationUpdate(Message),
    Error { code: String, message: String },
}

impl HubEvent {
    /// Map a raw wire event onto a hub event. Handshake and room
    /// control frames have no in-app audience and map to None.
    pub fn from_wire(event: ChatEvent) -> Option<Self> {
        match event {
            ChatEvent::NewMessage { message } | ChatEvent::NewUserMessage { message } => {
                Some(Self::NewMessage(message))
            }
            ChatEvent::NewConversation { message, .. } => Some(Self::ConversationUpdate(message)),
            ChatEvent::MessagesRead { reader_id, count } => {
                Some(Self::MessageRead { reader_id, count })
            }
            ChatEvent::Error { code, message, .. } => Some(Self::Error { code, message }),
            ChatEvent::Hello { .. }
            | ChatEvent::HelloAck { .. }
            | ChatEvent::JoinRoom { .. }
            | ChatEvent::LeaveRoom { .. } => None,
        }
    }

    /// Map a session lifecycle event onto a hub event.
    pub fn from_session(event: SessionEvent) -> Option<Self> {
        match event {
            SessionEvent::Connected { .. } => Some(Self::Connected),
            SessionEvent::Dropped { reason } => Some(Self::Disconnected { reason }),
            SessionEvent::Event(wire) => Self::from_wire(wire),
        }
    }
}

pub struct SubscriptionHub {
    initialized: bool,
    next_id: u64,
    subscribers: Vec<(SubscriberId, Box<dyn HubSubscriber>)>,
    cache: OfflineCache,
    presence: PresenceMap,
}

impl SubscriptionHub {
    pub fn new(cache: OfflineCache) -> Self {
        Self {
            initialized: false,
            next_id: 0,
            subscribers: Vec::new(),
            cache,
            presence: PresenceMap::new(),
        }
    }

    /// Arm the hub. Idempotent: repeat calls before `cleanup()` are
    /// no-ops. Returns whether this call did the arming.
    pub fn initialize(&mut self) -> bool {
        if self.initialized {
            return false;
        }
        self.initialized = true;
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Tear down the one underlying subscription and drop every
    /// registration. A subsequent `initialize()` re-arms cleanly.
    pub fn cleanup(&mut self) {
        self.initialized = false;
        self.subscribers.clear();
    }

    /// Register a subscriber. Fan-out order is registration order.
    pub fn subscribe(&mut self, subscriber: Box<dyn HubSubscriber>) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, subscriber));
        id
    }

    /// Synchronously stop all further callbacks to one subscriber.
    /// Other subscribers and the underlying connection are unaffected.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() < before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Feed one event through the hub: default side effects first,
    /// exactly once, then fan-out in registration order.
    pub fn deliver(&mut self, event: HubEvent) {
        if !self.initialized {
            debug!("hub not initialized, dropping event");
            return;
        }

        match &event {
            HubEvent::NewMessage(message) => {
                // Captured even while no chat screen is mounted; the
                // ring dedupes the redundant wire channels by id.
                self.cache.insert(message.clone());
            }
            HubEvent::StatusUpdate { user_id, online } => {
                self.presence.set_online(*user_id, *online);
            }
            HubEvent::Disconnected { .. } => {
                // Server-side presence resets with the connection.
                self.presence.clear();
            }
            _ => {}
        }

        for (id, subscriber) in &self.subscribers {
            let result = catch_unwind(AssertUnwindSafe(|| match &event {
                HubEvent::NewMessage(message) => subscriber.on_new_message(message),
                HubEvent::MessageRead { reader_id, count } => {
                    subscriber.on_message_read(*reader_id, *count)
                }
                HubEvent::StatusUpdate { user_id, online } => {
                    subscriber.on_status_update(*user_id, *online)
                }
                HubEvent::Connected => subscriber.on_connected(),
                HubEvent::Disconnected { reason } => subscriber.on_disconnected(reason),
                HubEvent::ConversationUpdate(message) => {
                    subscriber.on_conversation_update(message)
                }
                HubEvent::Error { code, message } => subscriber.on_error(code, message),
            }));
            if result.is_err() {
                error!(subscriber_id = id.0, "hub subscriber callback panicked");
            }
        }
    }

    pub fn cache(&self) -> &OfflineCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut OfflineCache {
        &mut self.cache
    }

    pub fn presence(&self) -> &PresenceMap {
        &self.presence
    }
}
