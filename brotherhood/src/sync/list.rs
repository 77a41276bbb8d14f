//! Optimistic list with per-mutation state
//!
//! The list keeps the last server snapshot untouched and overlays local
//! mutations on top of it, keyed by document id. A mutation moves
//! `Pending -> Confirmed | Failed`. Confirmed overlays stay until a snapshot
//! shows the server state they produced, so a stale snapshot arriving in
//! between never reverts the view. A failed mutation is dropped on the spot,
//! which rolls the view back to whatever the server last said.

use chrono::{DateTime, Utc};

/// Anything held in a synced list
pub trait Keyed: Clone {
    fn key(&self) -> &str;
    /// Server-side modification time
    fn version(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationState {
    Pending,
    Confirmed,
    Failed(String),
}

#[derive(Debug, Clone)]
enum Change<T> {
    Upsert(T),
    Remove,
}

#[derive(Debug, Clone)]
struct Mutation<T> {
    id: MutationId,
    key: String,
    change: Change<T>,
    state: MutationState,
}

impl<T: Keyed> Mutation<T> {
    /// Whether the snapshot already reflects this confirmed mutation
    fn settled_by(&self, snapshot: &[T]) -> bool {
        let current = snapshot.iter().find(|item| item.key() == self.key);
        match (&self.change, current) {
            (Change::Upsert(expected), Some(item)) => item.version() >= expected.version(),
            (Change::Upsert(_), None) => false,
            (Change::Remove, found) => found.is_none(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncedList<T> {
    snapshot: Vec<T>,
    mutations: Vec<Mutation<T>>,
    next_id: u64,
}

impl<T: Keyed> Default for SyncedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Keyed> SyncedList<T> {
    pub fn new() -> Self {
        Self {
            snapshot: Vec::new(),
            mutations: Vec::new(),
            next_id: 0,
        }
    }

    /// Replace the server view and retire confirmed mutations it reflects
    pub fn apply_snapshot(&mut self, items: Vec<T>) {
        self.snapshot = items;
        let snapshot = &self.snapshot;
        self.mutations.retain(|m| match m.state {
            MutationState::Confirmed => !m.settled_by(snapshot),
            _ => true,
        });
    }

    fn begin(&mut self, key: String, change: Change<T>) -> MutationId {
        self.next_id += 1;
        let id = MutationId(self.next_id);
        self.mutations.push(Mutation {
            id,
            key,
            change,
            state: MutationState::Pending,
        });
        id
    }

    /// Show an item that does not exist on the server yet
    pub fn begin_insert(&mut self, item: T) -> MutationId {
        self.begin(item.key().to_string(), Change::Upsert(item))
    }

    /// Show a locally edited copy of an item
    pub fn begin_replace(&mut self, item: T) -> MutationId {
        self.begin(item.key().to_string(), Change::Upsert(item))
    }

    /// Hide an item pending its deletion
    pub fn begin_remove(&mut self, key: &str) -> MutationId {
        self.begin(key.to_string(), Change::Remove)
    }

    /// Mark a mutation confirmed.
    ///
    /// `server` is the stored item the write produced; it replaces the
    /// optimistic value (and, for inserts, the temporary key).
    pub fn confirm(&mut self, id: MutationId, server: Option<T>) {
        let Some(index) = self.mutations.iter().position(|m| m.id == id) else {
            return;
        };

        {
            let mutation = &mut self.mutations[index];
            mutation.state = MutationState::Confirmed;
            if let Some(item) = server {
                mutation.key = item.key().to_string();
                mutation.change = Change::Upsert(item);
            }
        }

        if self.mutations[index].settled_by(&self.snapshot) {
            self.mutations.remove(index);
        }
    }

    /// Fail a mutation and forget it; returns its final state
    pub fn fail(&mut self, id: MutationId, error: impl Into<String>) -> Option<MutationState> {
        let index = self.mutations.iter().position(|m| m.id == id)?;
        self.mutations.remove(index);
        Some(MutationState::Failed(error.into()))
    }

    /// State of a mutation still tracked by the list.
    ///
    /// Confirmed mutations are forgotten once a snapshot reflects them.
    pub fn state_of(&self, id: MutationId) -> Option<MutationState> {
        self.mutations
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.state.clone())
    }

    /// Mutations still tracked, pending or awaiting a snapshot
    pub fn tracked_count(&self) -> usize {
        self.mutations.len()
    }

    pub fn pending_count(&self) -> usize {
        self.mutations
            .iter()
            .filter(|m| m.state == MutationState::Pending)
            .count()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.mutations
            .iter()
            .any(|m| m.key == key && m.state == MutationState::Pending)
    }

    /// Snapshot with live overlays applied in mutation order
    pub fn items(&self) -> Vec<T> {
        let mut items = self.snapshot.clone();

        for mutation in &self.mutations {
            let position = items.iter().position(|i| i.key() == mutation.key);
            match (&mutation.change, position) {
                (Change::Upsert(item), Some(index)) => items[index] = item.clone(),
                (Change::Upsert(item), None) => items.push(item.clone()),
                (Change::Remove, Some(index)) => {
                    items.remove(index);
                }
                (Change::Remove, None) => {}
            }
        }

        items
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.items().into_iter().find(|i| i.key() == key)
    }

    pub fn clear(&mut self) {
        self.snapshot.clear();
        self.mutations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: String,
        label: String,
        version: DateTime<Utc>,
    }

    impl Keyed for Item {
        fn key(&self) -> &str {
            &self.id
        }

        fn version(&self) -> DateTime<Utc> {
            self.version
        }
    }

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn item(id: &str, label: &str, version: i64) -> Item {
        Item {
            id: id.to_string(),
            label: label.to_string(),
            version: t(version),
        }
    }

    fn labels(list: &SyncedList<Item>) -> Vec<String> {
        list.items().into_iter().map(|i| i.label).collect()
    }

    #[test]
    fn test_pending_insert_survives_snapshots_until_confirmed() {
        let mut list = SyncedList::new();
        list.apply_snapshot(vec![item("a", "Ali", 0)]);

        let m = list.begin_insert(item("tmp-1", "Bilal", 1));
        assert_eq!(list.state_of(m), Some(MutationState::Pending));

        // A snapshot without the new item does not erase the optimistic one
        list.apply_snapshot(vec![item("a", "Ali", 0)]);
        assert_eq!(labels(&list), vec!["Ali", "Bilal"]);

        list.confirm(m, Some(item("b", "Bilal", 2)));
        assert_eq!(list.state_of(m), Some(MutationState::Confirmed));
        assert!(list.get("tmp-1").is_none());
        assert!(list.get("b").is_some());

        list.apply_snapshot(vec![item("a", "Ali", 0), item("b", "Bilal", 2)]);
        assert_eq!(list.state_of(m), None);
        assert_eq!(labels(&list), vec!["Ali", "Bilal"]);
    }

    #[test]
    fn test_stale_snapshot_does_not_revert_confirmed_edit() {
        let mut list = SyncedList::new();
        list.apply_snapshot(vec![item("a", "Ali", 0)]);

        let m = list.begin_replace(item("a", "Ali Khan", 0));
        list.confirm(m, Some(item("a", "Ali Khan", 5)));

        // Snapshot taken before the write landed
        list.apply_snapshot(vec![item("a", "Ali", 0)]);
        assert_eq!(labels(&list), vec!["Ali Khan"]);

        list.apply_snapshot(vec![item("a", "Ali Khan", 5)]);
        assert_eq!(list.state_of(m), None);
    }

    #[test]
    fn test_failed_mutation_rolls_back() {
        let mut list = SyncedList::new();
        list.apply_snapshot(vec![item("a", "Ali", 0), item("b", "Bilal", 0)]);

        let m = list.begin_remove("b");
        assert_eq!(labels(&list), vec!["Ali"]);
        assert!(list.is_pending("b"));

        assert_eq!(
            list.fail(m, "permission denied"),
            Some(MutationState::Failed("permission denied".to_string()))
        );
        assert_eq!(labels(&list), vec!["Ali", "Bilal"]);
        assert_eq!(list.state_of(m), None);
        assert_eq!(list.tracked_count(), 0);

        // Failing twice is a no-op
        assert_eq!(list.fail(m, "permission denied"), None);
    }

    #[test]
    fn test_confirmed_remove_settles_when_snapshot_drops_item() {
        let mut list = SyncedList::new();
        list.apply_snapshot(vec![item("a", "Ali", 0)]);

        let m = list.begin_remove("a");
        list.confirm(m, None);
        assert!(list.items().is_empty());
        assert_eq!(list.pending_count(), 0);

        list.apply_snapshot(vec![]);
        assert_eq!(list.state_of(m), None);
    }
}
