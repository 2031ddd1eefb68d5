// WebSocket event types for the Roomline chat transport.
//
// Event names are part of the wire contract shared with both client
// apps; they must not change without a coordinated client release.
// `new-message` and `new-user-message` carry the same payload on
// purpose: not every client build joins rooms consistently, so the
// server delivers on both channels and clients dedupe by message id.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Message;

/// Payload discriminator carried by `new-conversation` events.
pub const NEW_MESSAGE_RECEIVED: &str = "new_message_received";

/// All events on the Roomline chat WebSocket, tagged by event name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ChatEvent {
    /// Client -> Server: authenticate the freshly-opened socket.
    Hello { token: String },

    /// Server -> Client: the socket is registered and live.
    HelloAck { conn_id: Uuid, server_time: String },

    /// Client -> Server: join a conversation room (chat-detail screen).
    JoinRoom { room_id: String },

    /// Client -> Server: leave a conversation room.
    LeaveRoom { room_id: String },

    /// Server -> Client: a message was persisted; room-scoped and direct.
    NewMessage { message: Message },

    /// Server -> Client: same payload as `new-message`, legacy channel.
    NewUserMessage { message: Message },

    /// Server -> Client, receiver only: refresh the chat-list screen.
    NewConversation {
        message: Message,
        #[serde(rename = "type")]
        kind: String,
    },

    /// Server -> Client: the other party bulk-read the caller's messages.
    MessagesRead { reader_id: Uuid, count: u64 },

    /// Server -> Client: protocol or auth error.
    Error {
        code: String,
        message: String,
        retryable: bool,
    },
}

impl ChatEvent {
    /// Build the receiver-only chat-list refresh event for a message.
    pub fn new_conversation(message: Message) -> Self {
        ChatEvent::NewConversation { message, kind: NEW_MESSAGE_RECEIVED.to_string() }
    }
}
