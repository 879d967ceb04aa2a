pub mod tables;

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, info};

use hearth_types::models::{Message, ReactionTable, ReceiptTable};

pub use tables::Loaded;

pub const MESSAGES_FILE: &str = "chat_messages.json";
pub const REACTIONS_FILE: &str = "chat_reactions.json";
pub const RECEIPTS_FILE: &str = "chat_receipts.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The three tables encoded at one point in time.
///
/// Revisions increase in the order snapshots are taken, so a writer can tell
/// an outdated snapshot from a current one.
pub struct Snapshot {
    revision: u64,
    messages: Vec<u8>,
    reactions: Vec<u8>,
    receipts: Vec<u8>,
}

impl Snapshot {
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// JSON-file persistence for messages, reactions and read receipts.
///
/// Each table lives in its own file under `dir` and is rewritten in full on
/// every save. Tables load independently of each other.
pub struct Store {
    dir: PathBuf,
    next_revision: AtomicU64,
    /// Revision of the last snapshot that reached disk.
    written: Mutex<u64>,
}

impl Store {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        info!("Chat data directory: {}", dir.display());
        Ok(Self {
            dir,
            next_revision: AtomicU64::new(1),
            written: Mutex::new(0),
        })
    }

    /// Encode the current tables. Call this while the tables are locked so the
    /// revision order matches the mutation order.
    pub fn snapshot<'a>(
        &self,
        messages: impl IntoIterator<Item = &'a Message>,
        reactions: &ReactionTable,
        receipts: &ReceiptTable,
    ) -> Result<Snapshot, StoreError> {
        let messages: Vec<&Message> = messages.into_iter().collect();
        let snapshot = Snapshot {
            revision: self.next_revision.fetch_add(1, Ordering::Relaxed),
            messages: serde_json::to_vec_pretty(&messages)?,
            reactions: serde_json::to_vec_pretty(reactions)?,
            receipts: serde_json::to_vec_pretty(receipts)?,
        };
        Ok(snapshot)
    }

    /// Write a snapshot to disk. Returns `Ok(false)` without touching any
    /// file if a newer snapshot has already been written.
    pub fn write(&self, snapshot: &Snapshot) -> Result<bool, StoreError> {
        let mut written = self.written.lock().unwrap_or_else(PoisonError::into_inner);
        if snapshot.revision <= *written {
            debug!(
                "Skipping stale snapshot r{} (r{} already on disk)",
                snapshot.revision, *written
            );
            return Ok(false);
        }

        self.replace_file(MESSAGES_FILE, &snapshot.messages)?;
        self.replace_file(REACTIONS_FILE, &snapshot.reactions)?;
        self.replace_file(RECEIPTS_FILE, &snapshot.receipts)?;

        *written = snapshot.revision;
        Ok(true)
    }

    /// Snapshot and write in one step.
    pub fn save<'a>(
        &self,
        messages: impl IntoIterator<Item = &'a Message>,
        reactions: &ReactionTable,
        receipts: &ReceiptTable,
    ) -> Result<(), StoreError> {
        let snapshot = self.snapshot(messages, reactions, receipts)?;
        self.write(&snapshot)?;
        Ok(())
    }

    /// Restore all tables. Never fails: a missing or unreadable table starts
    /// empty and does not affect the others.
    pub fn load(&self) -> Loaded {
        let messages = tables::read_table(&self.dir.join(MESSAGES_FILE)).unwrap_or_default();
        let reactions = tables::read_table(&self.dir.join(REACTIONS_FILE)).unwrap_or_default();
        let receipts = tables::read_table(&self.dir.join(RECEIPTS_FILE)).unwrap_or_default();

        let loaded = Loaded::sanitize(messages, reactions, receipts);
        info!(
            "Loaded {} messages, reactions on {}, receipts on {} (next id {})",
            loaded.messages.len(),
            loaded.reactions.len(),
            loaded.receipts.len(),
            loaded.next_id
        );
        loaded
    }

    /// Write to `<name>.tmp` then rename over `<name>`.
    fn replace_file(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{name}.tmp"));
        fs::write(&tmp, bytes).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_types::models::{MessageKind, ReactionMap};

    fn message(id: u64, room: &str, text: &str) -> Message {
        Message {
            id,
            room: room.into(),
            author_name: "ana".into(),
            author_avatar: String::new(),
            text: text.into(),
            created_at: "10:00".into(),
            origin_identity: "10.0.0.1".into(),
            kind: MessageKind::Chat,
            target_identity: None,
            edited: false,
        }
    }

    fn tables() -> (Vec<Message>, ReactionTable, ReceiptTable) {
        let mut edited = message(4, "public", "fixed typo");
        edited.edited = true;
        let messages = vec![message(2, "public", "hi"), edited, message(9, "den", "psst")];

        let mut reactions = ReactionTable::new();
        let mut on_two = ReactionMap::new();
        on_two.insert("👍".into(), vec!["b".into(), "c".into()]);
        reactions.insert(2, on_two);

        let mut receipts = ReceiptTable::new();
        receipts.insert(4, vec!["c".into()]);
        (messages, reactions, receipts)
    }

    #[test]
    fn save_then_load_reproduces_tables() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let (messages, reactions, receipts) = tables();

        store.save(&messages, &reactions, &receipts).unwrap();
        let loaded = store.load();

        assert_eq!(loaded.messages, messages);
        assert_eq!(loaded.reactions, reactions);
        assert_eq!(loaded.receipts, receipts);
        assert_eq!(loaded.next_id, 10);
    }

    #[test]
    fn empty_directory_loads_empty_tables() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Store::open(dir.path()).unwrap().load();
        assert!(loaded.messages.is_empty());
        assert!(loaded.reactions.is_empty());
        assert!(loaded.receipts.is_empty());
        assert_eq!(loaded.next_id, 0);
    }

    #[test]
    fn map_keys_are_written_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let (messages, reactions, receipts) = tables();
        store.save(&messages, &reactions, &receipts).unwrap();

        let raw = fs::read_to_string(dir.path().join(REACTIONS_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["2"]["👍"][1], "c");
        assert!(!dir.path().join(format!("{REACTIONS_FILE}.tmp")).exists());
    }

    #[test]
    fn corrupt_messages_do_not_block_reactions() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let (messages, reactions, receipts) = tables();
        store.save(&messages, &reactions, &receipts).unwrap();

        fs::write(dir.path().join(MESSAGES_FILE), "[{ not json").unwrap();
        let loaded = store.load();
        assert!(loaded.messages.is_empty());
        assert_eq!(loaded.next_id, 0);
        // Reactions and receipts parsed fine, but nothing references them any more.
        assert!(loaded.reactions.is_empty());

        store.save(&messages, &reactions, &receipts).unwrap();
        fs::write(dir.path().join(RECEIPTS_FILE), "garbage").unwrap();
        let loaded = store.load();
        assert_eq!(loaded.messages.len(), 3);
        assert_eq!(loaded.reactions, reactions);
        assert!(loaded.receipts.is_empty());
    }

    #[test]
    fn stale_snapshot_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let (messages, reactions, receipts) = tables();

        let older = store.snapshot(&messages[..1], &reactions, &receipts).unwrap();
        let newer = store.snapshot(&messages, &reactions, &receipts).unwrap();
        assert!(newer.revision() > older.revision());

        assert!(store.write(&newer).unwrap());
        assert!(!store.write(&older).unwrap());
        assert_eq!(store.load().messages.len(), 3);
    }

    #[test]
    fn reads_files_in_the_legacy_layout() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(MESSAGES_FILE),
            r#"[{"id": 0, "room": "public", "user": "Anonymous", "text": "hello",
                "time": "08:15", "ip": "127.0.0.1", "type": "chat", "target": null,
                "avatar": "", "edited": false}]"#,
        )
        .unwrap();
        fs::write(dir.path().join(RECEIPTS_FILE), r#"{"0": ["127.0.0.2"]}"#).unwrap();

        let loaded = Store::open(dir.path()).unwrap().load();
        assert_eq!(loaded.messages[0].text, "hello");
        assert_eq!(loaded.receipts[&0], vec!["127.0.0.2".to_string()]);
        assert_eq!(loaded.next_id, 1);
    }
}
