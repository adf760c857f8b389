//! In-memory presence store with atomic snapshot publication.
//!
//! # Thread Safety
//!
//! Readers call [`PresenceStore::current_snapshot`] and get an `Arc` to a
//! frozen [`PresenceSnapshot`]. A snapshot never changes after publication, so
//! readers can hold old and new snapshots side by side without locking.
//!
//! Writers ([`PresenceStore::merge`] and [`PresenceStore::forget`]) are
//! serialized by one mutex that also owns the forgotten set. A new snapshot is
//! built completely before it replaces the published one; the publication slot
//! is only locked for the pointer swap.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::sample::{Appended, Sample, UserHistory};
use crate::types::UserId;

/// The samples reported by one upstream poll, keyed by user.
pub type Roster = HashMap<UserId, Sample>;

/// An immutable, point-in-time view of every user's history.
#[derive(Debug, Clone, Default)]
pub struct PresenceSnapshot {
    generation: u64,
    users: HashMap<UserId, Arc<UserHistory>>,
}

impl PresenceSnapshot {
    /// Publication counter; 0 for the initial empty snapshot.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, user_id: &UserId) -> Option<&UserHistory> {
        self.users.get(user_id).map(AsRef::as_ref)
    }

    pub fn contains(&self, user_id: &UserId) -> bool {
        self.users.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UserId, &UserHistory)> {
        self.users.iter().map(|(id, history)| (id, history.as_ref()))
    }

    /// Histories as a plain map, for the multi-user queries.
    pub fn histories(&self) -> HashMap<UserId, &UserHistory> {
        self.iter().map(|(id, history)| (*id, history)).collect()
    }
}

/// Counts from one merge, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub appended: usize,
    pub duplicates: usize,
    pub forgotten: usize,
    pub new_users: usize,
}

/// State owned by the writer lock.
#[derive(Debug, Default)]
struct WriterState {
    forgotten: HashSet<UserId>,
}

/// Owns per-user sample history and publishes it as snapshots.
#[derive(Debug, Default)]
pub struct PresenceStore {
    current: RwLock<Arc<PresenceSnapshot>>,
    writer: Mutex<WriterState>,
}

impl PresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the latest published snapshot.
    pub fn current_snapshot(&self) -> Arc<PresenceSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Merges one roster into the store and publishes the result.
    ///
    /// Forgotten users are skipped. Users absent from `roster` keep their
    /// history (shared with the previous snapshot, not copied).
    pub fn merge(&self, roster: &Roster) -> Arc<PresenceSnapshot> {
        self.merge_with_stats(roster).0
    }

    /// Like [`merge`](Self::merge), also returning what changed.
    pub fn merge_with_stats(&self, roster: &Roster) -> (Arc<PresenceSnapshot>, MergeStats) {
        let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = self.current_snapshot();

        let mut stats = MergeStats::default();
        let mut users = previous.users.clone();
        for (user_id, sample) in roster {
            if writer.forgotten.contains(user_id) {
                stats.forgotten += 1;
                continue;
            }

            let entry = users.entry(*user_id).or_insert_with(|| {
                stats.new_users += 1;
                Arc::new(UserHistory::new())
            });
            match Arc::make_mut(entry).append(*sample) {
                Appended::Stored => stats.appended += 1,
                Appended::Duplicate => stats.duplicates += 1,
            }
        }

        let snapshot = Arc::new(PresenceSnapshot {
            generation: previous.generation + 1,
            users,
        });
        self.publish(Arc::clone(&snapshot));
        drop(writer);

        tracing::debug!(
            generation = snapshot.generation,
            users = snapshot.len(),
            appended = stats.appended,
            duplicates = stats.duplicates,
            new_users = stats.new_users,
            skipped_forgotten = stats.forgotten,
            "merged roster"
        );
        (snapshot, stats)
    }

    /// Permanently erases a user.
    ///
    /// The id is excluded from every later merge. Returns whether the user had
    /// history in the current snapshot.
    pub fn forget(&self, user_id: &UserId) -> bool {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.forgotten.insert(*user_id);

        let previous = self.current_snapshot();
        if !previous.contains(user_id) {
            tracing::debug!(%user_id, "forgot unknown user");
            return false;
        }

        let mut users = previous.users.clone();
        users.remove(user_id);
        self.publish(Arc::new(PresenceSnapshot {
            generation: previous.generation + 1,
            users,
        }));
        drop(writer);

        tracing::info!(%user_id, "forgot user");
        true
    }

    /// Whether `user_id` has been erased.
    pub fn is_forgotten(&self, user_id: &UserId) -> bool {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .forgotten
            .contains(user_id)
    }

    fn publish(&self, snapshot: Arc<PresenceSnapshot>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}
