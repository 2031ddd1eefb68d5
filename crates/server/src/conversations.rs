// Conversation aggregation: join message history, presence, and the
// user directory into per-counterpart chat-list summaries.
//
// O(total messages involving the reader); recomputed per request and
// never persisted. No pagination — acceptable for moderate history
// sizes, a known limitation at scale.

use std::collections::HashMap;

use anyhow::Result;
use roomline_common::types::{ConversationSummary, Message, UserProfile};
use uuid::Uuid;

use crate::registry::ConnectionRegistry;
use crate::store::{MessageStore, UserDirectory};

pub async fn conversations_for(
    reader: Uuid,
    store: &MessageStore,
    directory: &UserDirectory,
    registry: &ConnectionRegistry,
) -> Result<Vec<ConversationSummary>> {
    let messages = store.messages_involving(reader).await?;

    // Counterparts in first-contact order; every derived counterpart has
    // at least one message by construction.
    let mut order: Vec<Uuid> = Vec::new();
    let mut threads: HashMap<Uuid, ThreadStats> = HashMap::new();
    for message in &messages {
        let counterpart = message.counterpart_of(reader);
        if counterpart == reader {
            continue;
        }
        let stats = threads.entry(counterpart).or_insert_with(|| {
            order.push(counterpart);
            ThreadStats::default()
        });
        if message.receiver_id == reader && !message.is_read {
            stats.unread_count += 1;
        }
        match &stats.last_message {
            Some(last) if last.created_at > message.created_at => {}
            _ => stats.last_message = Some(message.clone()),
        }
    }

    let mut summaries = Vec::with_capacity(order.len());
    for counterpart in order {
        let Some(stats) = threads.remove(&counterpart) else {
            continue;
        };
        let Some(last_message) = stats.last_message else {
            continue;
        };
        let profile = directory
            .profile(counterpart)
            .await?
            .unwrap_or_else(|| placeholder_profile(counterpart));
        summaries.push(ConversationSummary {
            online: registry.is_online(counterpart).await,
            counterpart: profile,
            unread_count: stats.unread_count,
            last_message,
        });
    }

    summaries.sort_by(|a, b| b.last_message.created_at.cmp(&a.last_message.created_at));
    Ok(summaries)
}

// Directory rows can lag behind message traffic (e.g. a deactivated
// account); the chat list still has to render the thread.
fn placeholder_profile(user_id: Uuid) -> UserProfile {
    UserProfile { id: user_id, display_name: user_id.to_string(), avatar_url: None }
}

#[derive(Default)]
struct ThreadStats {
    unread_count: u64,
    last_message: Option<Message>,
}
