// Fanout dispatcher: push one persisted message to every live socket
// of both participants, over deliberately redundant channels.
//
// Persistence always happens before dispatch, and dispatch can only
// drop events (closed channels, offline users) — it can never fail the
// write. Clients dedupe by message id.

use std::sync::Arc;

use roomline_common::protocol::ws::ChatEvent;
use roomline_common::room::pair_room_id;
use roomline_common::types::Message;
use tracing::debug;
use uuid::Uuid;

use crate::registry::{ConnectionRegistry, ConnectionSender};

/// How many connections each delivery channel reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Connections reached through the conversation room.
    pub room: usize,
    /// Connections reached directly (counted once per connection, even
    /// though each receives the payload under two event names).
    pub direct: usize,
    /// Receiver connections that got the chat-list refresh event.
    pub conversation: usize,
}

impl DeliveryReport {
    pub fn total(&self) -> usize {
        self.room + self.direct + self.conversation
    }
}

pub struct FanoutDispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl FanoutDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver an already-persisted message.
    ///
    /// Three channels, best-effort and at-least-once each:
    /// 1. room-scoped `new-message` to every connection in the pair's room;
    /// 2. direct `new-message` + legacy `new-user-message` to every live
    ///    connection of receiver and sender;
    /// 3. receiver-only `new-conversation` for chat-list screens.
    ///
    /// Zero live connections is not an error — the message is already
    /// durable and will surface through history queries.
    pub async fn dispatch(&self, message: &Message) -> DeliveryReport {
        let room_id = pair_room_id(message.sender_id, message.receiver_id);
        let mut report = DeliveryReport::default();

        for sender in self.registry.room_senders(&room_id).await {
            if send(&sender, ChatEvent::NewMessage { message: message.clone() }) {
                report.room += 1;
            }
        }

        for participant in [message.receiver_id, message.sender_id] {
            for sender in self.registry.connections_for(participant).await {
                let delivered = send(&sender, ChatEvent::NewMessage { message: message.clone() });
                send(&sender, ChatEvent::NewUserMessage { message: message.clone() });
                if delivered {
                    report.direct += 1;
                }
            }
        }

        for sender in self.registry.connections_for(message.receiver_id).await {
            if send(&sender, ChatEvent::new_conversation(message.clone())) {
                report.conversation += 1;
            }
        }

        if report.total() == 0 {
            debug!(
                message_id = %message.id,
                receiver_id = %message.receiver_id,
                "no live connections for message, skipping fanout"
            );
        }

        report
    }

    /// Notify every live connection of `other_party` that `reader` has
    /// bulk-read their messages.
    pub async fn dispatch_read_receipt(
        &self,
        other_party: Uuid,
        reader: Uuid,
        count: u64,
    ) -> usize {
        let mut delivered = 0;
        for sender in self.registry.connections_for(other_party).await {
            if send(&sender, ChatEvent::MessagesRead { reader_id: reader, count }) {
                delivered += 1;
            }
        }
        delivered
    }
}

fn send(sender: &ConnectionSender, event: ChatEvent) -> bool {
    sender.send(event).is_ok()
}
