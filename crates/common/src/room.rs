// Deterministic pairing of two user identities into a room id.

use uuid::Uuid;

/// Separator between the two ordered ids in a room id.
pub const ROOM_ID_SEPARATOR: char = ':';

/// Compute the broadcast-room id for a conversation between two users.
///
/// The lower id always comes first, so `pair_room_id(a, b)` and
/// `pair_room_id(b, a)` name the same room regardless of who initiated
/// the conversation.
pub fn pair_room_id(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}{ROOM_ID_SEPARATOR}{hi}")
}
