// Client-side presence map, fed by status events through the hub.

use std::collections::HashMap;

use uuid::Uuid;

/// Last-known online state per user. Absent means offline — presence is
/// derived, never stored, so an empty map after startup is correct.
#[derive(Debug, Clone, Default)]
pub struct PresenceMap {
    users: HashMap<Uuid, bool>,
}

impl PresenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&mut self, user_id: Uuid, online: bool) {
        if online {
            self.users.insert(user_id, true);
        } else {
            self.users.remove(&user_id);
        }
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.users.get(&user_id).copied().unwrap_or(false)
    }

    pub fn online_users(&self) -> Vec<Uuid> {
        self.users.keys().copied().collect()
    }

    pub fn clear(&mut self) {
        self.users.clear();
    }
}
