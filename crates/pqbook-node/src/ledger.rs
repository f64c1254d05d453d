//! Newest-first message ledger.
//!
//! Admitted messages are wrapped in `Arc` and pushed to the front of a
//! `VecDeque` under a write lock, so a listing is a cheap snapshot of
//! pointers and a reader never observes a half-inserted entry. Entries
//! are never removed or mutated.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use pqbook_types::{PqbookError, Result, StoredMessage};

/// In-memory store of admitted messages, newest first.
#[derive(Default)]
pub struct MessageLedger {
    entries: RwLock<VecDeque<Arc<StoredMessage>>>,
}

impl MessageLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `message` at the front and returns its 1-based append
    /// sequence together with the shared entry.
    ///
    /// The sequence is taken under the write lock, so a higher sequence
    /// always appears earlier in [`list_all`](Self::list_all).
    pub fn append(&self, message: StoredMessage) -> Result<(u64, Arc<StoredMessage>)> {
        let entry = Arc::new(message);
        let mut entries = self.entries.write().map_err(|_| PqbookError::Internal {
            reason: "message ledger lock poisoned".into(),
        })?;
        entries.push_front(Arc::clone(&entry));
        Ok((entries.len() as u64, entry))
    }

    /// Snapshot of every message in current order (newest first).
    pub fn list_all(&self) -> Result<Vec<Arc<StoredMessage>>> {
        let entries = self.entries.read().map_err(|_| PqbookError::Internal {
            reason: "message ledger lock poisoned".into(),
        })?;
        Ok(entries.iter().cloned().collect())
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Returns `true` if nothing has been admitted yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
