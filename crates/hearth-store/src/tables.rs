use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use hearth_types::models::{Message, ReactionTable, ReceiptTable};

/// Tables restored from disk, with the id the next message should take.
#[derive(Debug, Default)]
pub struct Loaded {
    pub messages: Vec<Message>,
    pub reactions: ReactionTable,
    pub receipts: ReceiptTable,
    pub next_id: u64,
}

impl Loaded {
    /// Restore the table invariants on data read from disk: messages in id
    /// order without duplicates, no reactions or receipts on missing messages,
    /// no empty emoji entries, no repeated identities.
    pub fn sanitize(
        mut messages: Vec<Message>,
        mut reactions: ReactionTable,
        mut receipts: ReceiptTable,
    ) -> Self {
        messages.sort_by_key(|m| m.id);
        messages.dedup_by_key(|m| m.id);
        // No id can follow u64::MAX, so a message holding it is unusable.
        if let Some(last) = messages.pop_if(|m| m.id.checked_add(1).is_none()) {
            warn!("Dropped message with id {} that leaves no next id", last.id);
        }

        let ids: HashSet<u64> = messages.iter().map(|m| m.id).collect();
        let before = reactions.len() + receipts.len();

        reactions.retain(|id, by_emoji| {
            by_emoji.retain(|_, identities| {
                dedup_in_order(identities);
                !identities.is_empty()
            });
            ids.contains(id) && !by_emoji.is_empty()
        });
        receipts.retain(|id, identities| {
            dedup_in_order(identities);
            ids.contains(id) && !identities.is_empty()
        });

        let dropped = before - (reactions.len() + receipts.len());
        if dropped > 0 {
            warn!("Dropped {} reaction/receipt entries without a live message", dropped);
        }

        let next_id = messages
            .last()
            .and_then(|m| m.id.checked_add(1))
            .unwrap_or(0);
        Self {
            messages,
            reactions,
            receipts,
            next_id,
        }
    }
}

/// Read one JSON table. `None` when the file is absent or unreadable.
pub(crate) fn read_table<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No table at {}, starting empty", path.display());
            return None;
        }
        Err(e) => {
            warn!("Error reading {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(table) => {
            info!("Loaded {}", path.display());
            Some(table)
        }
        Err(e) => {
            warn!("Error parsing {}: {}", path.display(), e);
            None
        }
    }
}

fn dedup_in_order(identities: &mut Vec<String>) {
    let mut seen = HashSet::new();
    identities.retain(|identity| seen.insert(identity.clone()));
}
