use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, TimeDelta, Utc};

use hearth_types::models::PresenceView;

/// Last heartbeat of one identity in one room.
#[derive(Debug, Clone)]
pub struct PresenceEntry {
    pub nickname: String,
    pub avatar: String,
    pub last_seen: DateTime<Utc>,
}

/// identity -> latest heartbeat
pub type RoomPresence = HashMap<String, PresenceEntry>;

/// Identities whose last heartbeat is more than `ttl` before `now`.
pub fn stale_identities(entries: &RoomPresence, now: DateTime<Utc>, ttl: TimeDelta) -> Vec<String> {
    entries
        .iter()
        .filter(|(_, entry)| now.signed_duration_since(entry.last_seen) > ttl)
        .map(|(identity, _)| identity.clone())
        .collect()
}

pub fn visible(entries: &RoomPresence) -> BTreeMap<String, PresenceView> {
    entries
        .iter()
        .map(|(identity, entry)| {
            let view = PresenceView {
                nickname: entry.nickname.clone(),
                avatar: entry.avatar.clone(),
            };
            (identity.clone(), view)
        })
        .collect()
}
