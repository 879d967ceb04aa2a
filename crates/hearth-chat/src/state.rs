use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local, TimeDelta, Utc};
use tracing::{debug, info, warn};

use hearth_gateway::Hub;
use hearth_store::Store;
use hearth_types::DEFAULT_ROOM;
use hearth_types::models::{
    Message, MessageKind, MessageView, PresenceView, ReactionTable, ReceiptTable,
};

use crate::error::ChatError;
use crate::presence::{self, PresenceEntry, RoomPresence};

#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Total messages kept across all rooms. The oldest is evicted first.
    pub max_messages: usize,
    /// Presence entries older than this are dropped on read.
    pub presence_ttl: TimeDelta,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_messages: 1000,
            presence_ttl: TimeDelta::seconds(15),
        }
    }
}

/// Input for [`ChatState::post`].
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub room: String,
    pub author_name: String,
    pub author_avatar: String,
    pub text: String,
    pub kind: MessageKind,
    pub target_identity: Option<String>,
    pub origin_identity: String,
}

/// The authoritative chat tables.
///
/// Every operation runs under one lock. Mutations write the tables to the
/// store and wake the affected room after the lock is released, so anyone
/// woken sees the new state on their next read.
#[derive(Clone)]
pub struct ChatState {
    inner: Arc<ChatInner>,
}

struct ChatInner {
    tables: Mutex<Tables>,
    store: Store,
    hub: Hub,
    config: ChatConfig,
}

#[derive(Default)]
struct Tables {
    /// Ascending by id across all rooms.
    messages: VecDeque<Message>,
    reactions: ReactionTable,
    receipts: ReceiptTable,
    /// room -> identity -> heartbeat
    presence: HashMap<String, RoomPresence>,
    next_id: u64,
}

impl Tables {
    fn position(&self, id: u64) -> Option<usize> {
        self.messages.binary_search_by_key(&id, |m| m.id).ok()
    }

    fn room_of(&self, id: u64) -> Option<String> {
        self.position(id).map(|i| self.messages[i].room.clone())
    }

    /// Position of `id` if `requester` posted it.
    fn owned_position(&self, id: u64, requester: &str) -> Result<usize, ChatError> {
        self.position(id)
            .filter(|&i| self.messages[i].origin_identity == requester)
            .ok_or(ChatError::Unauthorized)
    }

    fn forget(&mut self, id: u64) {
        self.reactions.remove(&id);
        self.receipts.remove(&id);
    }
}

impl ChatState {
    /// Build chat state from whatever `store` holds on disk.
    pub fn open(store: Store, hub: Hub, config: ChatConfig) -> Self {
        let loaded = store.load();
        let mut tables = Tables {
            messages: loaded.messages.into(),
            reactions: loaded.reactions,
            receipts: loaded.receipts,
            presence: HashMap::new(),
            next_id: loaded.next_id,
        };

        while tables.messages.len() > config.max_messages {
            if let Some(evicted) = tables.messages.pop_front() {
                tables.forget(evicted.id);
            }
        }
        info!(
            "Chat state ready: {} messages, next id {}",
            tables.messages.len(),
            tables.next_id
        );

        Self {
            inner: Arc::new(ChatInner {
                tables: Mutex::new(tables),
                store,
                hub,
                config,
            }),
        }
    }

    pub fn hub(&self) -> &Hub {
        &self.inner.hub
    }

    // -- Messages --

    /// Append a message to its room. Blank text is rejected with
    /// [`ChatError::Validation`] and changes nothing.
    pub fn post(&self, new: NewMessage) -> Result<Message, ChatError> {
        if new.text.trim().is_empty() {
            return Err(ChatError::Validation("message text is empty"));
        }

        let mut tables = self.lock();
        let message = Message {
            id: tables.next_id,
            room: new.room,
            author_name: new.author_name,
            author_avatar: new.author_avatar,
            text: new.text,
            created_at: Local::now().format("%H:%M").to_string(),
            origin_identity: new.origin_identity,
            kind: new.kind,
            target_identity: new.target_identity,
            edited: false,
        };
        tables.next_id += 1;
        tables.messages.push_back(message.clone());

        while tables.messages.len() > self.inner.config.max_messages {
            if let Some(evicted) = tables.messages.pop_front() {
                debug!("Evicting message {} (retention cap)", evicted.id);
                tables.forget(evicted.id);
            }
        }

        self.commit(tables, &message.room);
        Ok(message)
    }

    /// Messages in `room` with an id above `after_id`, oldest first, each
    /// joined with its current reactions and receipts.
    pub fn list_since(&self, room: &str, after_id: i64) -> Vec<MessageView> {
        let tables = self.lock();
        tables
            .messages
            .iter()
            .filter(|m| m.room == room && i128::from(m.id) > i128::from(after_id))
            .map(|m| MessageView {
                message: m.clone(),
                reactions: tables.reactions.get(&m.id).cloned().unwrap_or_default(),
                read_by: tables.receipts.get(&m.id).cloned().unwrap_or_default(),
            })
            .collect()
    }

    pub fn edit(&self, id: u64, text: &str, requester: &str) -> Result<Message, ChatError> {
        let mut tables = self.lock();
        let pos = tables.owned_position(id, requester)?;

        let message = &mut tables.messages[pos];
        message.text = text.to_string();
        message.edited = true;
        let message = message.clone();

        self.commit(tables, &message.room);
        Ok(message)
    }

    /// Remove a message together with its reactions and receipts.
    pub fn delete(&self, id: u64, requester: &str) -> Result<(), ChatError> {
        let mut tables = self.lock();
        let pos = tables.owned_position(id, requester)?;

        let removed = tables.messages.remove(pos);
        tables.forget(id);

        let room = removed.map_or_else(|| DEFAULT_ROOM.to_string(), |m| m.room);
        self.commit(tables, &room);
        Ok(())
    }

    // -- Reactions & receipts --

    /// Flip `identity`'s `emoji` reaction on a message.
    ///
    /// Returns `Some(true)` if the reaction was added, `Some(false)` if it was
    /// removed, and `None` if the message does not exist. In that last case
    /// nothing is stored and the default room is woken.
    pub fn toggle_reaction(&self, id: u64, emoji: &str, identity: &str) -> Option<bool> {
        let mut tables = self.lock();
        let Some(room) = tables.room_of(id) else {
            drop(tables);
            debug!("Reaction on missing message {}", id);
            self.inner.hub.notify(DEFAULT_ROOM);
            return None;
        };

        let by_emoji = tables.reactions.entry(id).or_default();
        let reactors = by_emoji.entry(emoji.to_string()).or_default();
        let added = match reactors.iter().position(|r| r == identity) {
            Some(i) => {
                reactors.remove(i);
                false
            }
            None => {
                reactors.push(identity.to_string());
                true
            }
        };
        if reactors.is_empty() {
            by_emoji.remove(emoji);
        }
        if by_emoji.is_empty() {
            tables.reactions.remove(&id);
        }

        self.commit(tables, &room);
        Some(added)
    }

    /// Record that `identity` has read a message. Returns `true` only the first
    /// time; repeats and missing messages change nothing and wake no one.
    pub fn mark_read(&self, id: u64, identity: &str) -> bool {
        let mut tables = self.lock();
        let Some(room) = tables.room_of(id) else {
            return false;
        };

        let readers = tables.receipts.entry(id).or_default();
        if readers.iter().any(|r| r == identity) {
            return false;
        }
        readers.push(identity.to_string());

        self.commit(tables, &room);
        true
    }

    // -- Presence --

    pub fn heartbeat(&self, room: &str, identity: &str, nickname: &str, avatar: &str) {
        self.heartbeat_at(room, identity, nickname, avatar, Utc::now());
    }

    pub fn heartbeat_at(
        &self,
        room: &str,
        identity: &str,
        nickname: &str,
        avatar: &str,
        at: DateTime<Utc>,
    ) {
        let entry = PresenceEntry {
            nickname: nickname.to_string(),
            avatar: avatar.to_string(),
            last_seen: at,
        };
        self.lock()
            .presence
            .entry(room.to_string())
            .or_default()
            .insert(identity.to_string(), entry);
    }

    pub fn active_presence(&self, room: &str) -> BTreeMap<String, PresenceView> {
        self.active_presence_at(room, Utc::now())
    }

    /// Drop entries that went stale before `now`, then list the rest.
    pub fn active_presence_at(
        &self,
        room: &str,
        now: DateTime<Utc>,
    ) -> BTreeMap<String, PresenceView> {
        let mut tables = self.lock();
        let Some(entries) = tables.presence.get_mut(room) else {
            return BTreeMap::new();
        };

        for identity in presence::stale_identities(entries, now, self.inner.config.presence_ttl) {
            entries.remove(&identity);
        }
        let active = presence::visible(entries);
        if entries.is_empty() {
            tables.presence.remove(room);
        }
        active
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.inner.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist and wake `room`. The snapshot is taken under the lock; the
    /// write and the wake happen after it is released. A failed write is
    /// logged and leaves the in-memory change in place.
    fn commit(&self, tables: MutexGuard<'_, Tables>, room: &str) {
        let snapshot =
            self.inner
                .store
                .snapshot(&tables.messages, &tables.reactions, &tables.receipts);
        drop(tables);

        if let Err(e) = snapshot.and_then(|s| self.inner.store.write(&s)) {
            warn!("Error saving chat data: {}", e);
        }
        self.inner.hub.notify(room);
    }
}
