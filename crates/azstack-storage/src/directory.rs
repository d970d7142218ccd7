//! In-memory account directory.
//!
//! A name → [`AccountDetails`] map behind one async read-write lock. Reads
//! run in parallel, writes are exclusive, and nothing here performs I/O.
//!
//! # Generations
//!
//! Every explicit mutation (`put`, `delete`, `clear`) bumps a monotonic
//! generation and records it against the affected name. A bulk populate
//! carries the generation it observed before it started enumerating, and
//! skips every name mutated after that point:
//!
//! ```text
//! snapshot() = 7 ──► list_accounts() ... ──► populate(7, [a, b, c])
//!                     delete("b") = 8               └─ "b" skipped (8 > 7)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::account::AccountDetails;

/// Directory generation observed at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Result of a bulk populate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulateOutcome {
    /// Entries newly inserted.
    pub inserted: usize,

    /// Entries already present and left untouched.
    pub retained: usize,

    /// Entries dropped because the name was mutated after the snapshot.
    pub stale: usize,
}

/// Directory statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryStats {
    /// Cached accounts.
    pub entries: usize,

    /// Cached accounts whose key has been fetched.
    pub keys_cached: usize,

    /// Current generation.
    pub generation: u64,
}

/// Thread-safe account directory.
#[derive(Debug, Default)]
pub struct AccountDirectory {
    inner: RwLock<DirectoryInner>,
}

#[derive(Debug, Default)]
struct DirectoryInner {
    /// Account name -> details
    accounts: HashMap<String, Arc<AccountDetails>>,

    /// Current generation
    generation: u64,

    /// Account name -> generation of its last explicit mutation
    mutated: HashMap<String, u64>,

    /// Generation of the last `clear`; older snapshots commit nothing
    cleared: u64,
}

impl DirectoryInner {
    fn bump(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}

impl AccountDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an account by name.
    pub async fn get(&self, name: &str) -> Option<Arc<AccountDetails>> {
        self.inner.read().await.accounts.get(name).cloned()
    }

    /// Insert or replace the entry for `name`.
    pub async fn put(&self, name: impl Into<String>, details: AccountDetails) -> Arc<AccountDetails> {
        let name = name.into();
        let details = Arc::new(details);

        let mut inner = self.inner.write().await;
        let generation = inner.bump();
        inner.mutated.insert(name.clone(), generation);
        inner.accounts.insert(name, Arc::clone(&details));

        details
    }

    /// Remove the entry for `name`, returning it if present.
    ///
    /// Bumps the generation even when nothing was cached, so an enumeration
    /// already in flight cannot bring the name back.
    pub async fn delete(&self, name: &str) -> Option<Arc<AccountDetails>> {
        let mut inner = self.inner.write().await;
        let generation = inner.bump();
        inner.mutated.insert(name.to_string(), generation);
        inner.accounts.remove(name)
    }

    /// Drop every entry and invalidate any populate already in flight.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        let generation = inner.bump();
        inner.cleared = generation;
        inner.accounts.clear();
        inner.mutated.clear();
    }

    /// Current generation, to be passed to [`AccountDirectory::populate`].
    pub async fn snapshot(&self) -> Generation {
        Generation(self.inner.read().await.generation)
    }

    /// Commit a batch of enumerated entries atomically.
    ///
    /// Names mutated after `since` are skipped. Names already present keep
    /// their existing entry (and any key cached on it).
    pub async fn populate<I>(&self, since: Generation, entries: I) -> PopulateOutcome
    where
        I: IntoIterator<Item = (String, AccountDetails)>,
    {
        let mut outcome = PopulateOutcome::default();
        let mut inner = self.inner.write().await;

        if inner.cleared > since.0 {
            outcome.stale = entries.into_iter().count();
            return outcome;
        }

        for (name, details) in entries {
            if inner.mutated.get(&name).is_some_and(|&g| g > since.0) {
                outcome.stale += 1;
                continue;
            }

            if inner.accounts.contains_key(&name) {
                outcome.retained += 1;
                continue;
            }

            inner.accounts.insert(name, Arc::new(details));
            outcome.inserted += 1;
        }

        outcome
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.accounts.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.accounts.is_empty()
    }

    /// Cached account names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().await.accounts.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn stats(&self) -> DirectoryStats {
        let inner = self.inner.read().await;
        DirectoryStats {
            entries: inner.accounts.len(),
            keys_cached: inner
                .accounts
                .values()
                .filter(|d| d.has_cached_key())
                .count(),
            generation: inner.generation,
        }
    }
}
