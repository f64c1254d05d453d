//! Per-public-key replay ledger.
//!
//! The [`ReplayGuard`] remembers every `(public key, timestamp)` pair
//! that has been admitted. Uniqueness is scoped per key: the same
//! timestamp signed by two different keys is **not** a replay.
//!
//! Implementation: `HashMap` keyed by the hex encoding of the public
//! key, each mapping to an ordered `BTreeSet` of timestamps so that
//! [`ReplayGuard::sweep`] can split off expired entries in one step.
//! The check and the insert happen under a single lock acquisition.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use pqbook_types::{PqbookError, Result};

type Ledger = HashMap<String, BTreeSet<i64>>;

// ---------------------------------------------------------------------------
// ReplayGuard
// ---------------------------------------------------------------------------

/// Thread-safe record of admitted `(public key, timestamp)` pairs.
pub struct ReplayGuard {
    /// Hex public key → timestamps already accepted for it.
    seen: Mutex<Ledger>,
    /// How long a timestamp is remembered, relative to sweep time.
    retention_ms: i64,
}

impl ReplayGuard {
    /// Creates an empty guard that remembers timestamps for
    /// `retention_ms` when swept.
    ///
    /// A negative retention is treated as zero.
    pub fn new(retention_ms: i64) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            retention_ms: retention_ms.max(0),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Ledger>> {
        self.seen.lock().map_err(|_| PqbookError::Internal {
            reason: "replay guard lock poisoned".into(),
        })
    }

    /// Records `(public_key, timestamp)` if it has not been seen.
    ///
    /// - If **not seen**: inserts the pair and returns `Ok(true)`.
    /// - If **already seen**: leaves state untouched and returns
    ///   `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns [`PqbookError::Internal`] if the lock is poisoned.
    pub fn check_and_record(&self, public_key: &[u8], timestamp: i64) -> Result<bool> {
        let key = hex::encode(public_key);
        let mut seen = self.lock()?;
        Ok(seen.entry(key).or_default().insert(timestamp))
    }

    /// Forgets a previously recorded pair.
    ///
    /// Used by the pipeline when a later gate rejects a request whose
    /// pair was already recorded. Releasing an unknown pair is a no-op.
    pub fn release(&self, public_key: &[u8], timestamp: i64) -> Result<()> {
        let key = hex::encode(public_key);
        let mut seen = self.lock()?;
        if let Some(timestamps) = seen.get_mut(&key) {
            timestamps.remove(&timestamp);
            if timestamps.is_empty() {
                seen.remove(&key);
            }
        }
        Ok(())
    }

    /// Drops every timestamp older than `now_ms - retention_ms` and any
    /// key left without timestamps.
    ///
    /// Returns the number of timestamps removed.
    pub fn sweep(&self, now_ms: i64) -> Result<usize> {
        let cutoff = now_ms.saturating_sub(self.retention_ms);
        let mut seen = self.lock()?;
        let mut removed = 0usize;

        seen.retain(|_, timestamps| {
            let kept = timestamps.split_off(&cutoff);
            removed += timestamps.len();
            *timestamps = kept;
            !timestamps.is_empty()
        });

        Ok(removed)
    }

    /// Number of distinct public keys with at least one recorded timestamp.
    pub fn tracked_keys(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// Total number of recorded `(public key, timestamp)` pairs.
    pub fn tracked_entries(&self) -> Result<usize> {
        Ok(self.lock()?.values().map(BTreeSet::len).sum())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
