//! Live-bound collection state
//!
//! Each domain service owns one `LiveCollection`: the synced list, a
//! loading flag and an error slot, fed by a live subscription plus a
//! one-shot fetch. Re-binding (user change) bumps a generation counter so
//! results belonging to the previous binding are dropped on arrival.

use super::list::{Keyed, MutationId, MutationState, SyncedList};
use crate::database::{Document, DocumentStore, Query, Snapshot, Subscription};
use crate::error::{AppError, Result};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::watch;

/// What a view renders
#[derive(Debug, Clone, PartialEq)]
pub struct ListState<T> {
    pub items: Vec<T>,
    pub loading: bool,
    pub error: Option<String>,
}

struct Inner<T> {
    list: SyncedList<T>,
    loading: bool,
    error: Option<String>,
    generation: u64,
    query: Option<Query>,
    /// Set once the subscription delivered for this generation; later
    /// one-shot fetches then yield to it.
    live_seen: bool,
    subscription: Option<Subscription>,
}

pub struct LiveCollection<T> {
    store: DocumentStore,
    inner: Arc<Mutex<Inner<T>>>,
    revision: Arc<watch::Sender<u64>>,
}

impl<T> Clone for LiveCollection<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            inner: Arc::clone(&self.inner),
            revision: Arc::clone(&self.revision),
        }
    }
}

/// Handle captured by subscription callbacks; it does not keep the
/// collection alive.
struct WeakCollection<T> {
    store: DocumentStore,
    inner: Weak<Mutex<Inner<T>>>,
    revision: Arc<watch::Sender<u64>>,
}

impl<T> WeakCollection<T> {
    fn upgrade(&self) -> Option<LiveCollection<T>> {
        self.inner.upgrade().map(|inner| LiveCollection {
            store: self.store.clone(),
            inner,
            revision: Arc::clone(&self.revision),
        })
    }
}

fn decode_all<T: DeserializeOwned>(documents: &[Document]) -> Vec<T> {
    documents
        .iter()
        .filter_map(|doc| match doc.decode::<T>() {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("Skipping malformed document {}: {}", doc.path(), e);
                None
            }
        })
        .collect()
}

impl<T> LiveCollection<T>
where
    T: Keyed + DeserializeOwned + Send + 'static,
{
    pub fn new(store: DocumentStore) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            store,
            inner: Arc::new(Mutex::new(Inner {
                list: SyncedList::new(),
                loading: false,
                error: None,
                generation: 0,
                query: None,
                live_seen: false,
                subscription: None,
            })),
            revision: Arc::new(revision),
        }
    }

    fn downgrade(&self) -> WeakCollection<T> {
        WeakCollection {
            store: self.store.clone(),
            inner: Arc::downgrade(&self.inner),
            revision: Arc::clone(&self.revision),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    /// Receiver that wakes whenever the state changes
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn state(&self) -> ListState<T> {
        let inner = self.lock();
        ListState {
            items: inner.list.items(),
            loading: inner.loading,
            error: inner.error.clone(),
        }
    }

    pub fn items(&self) -> Vec<T> {
        self.lock().list.items()
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.lock().list.get(key)
    }

    pub fn is_bound(&self) -> bool {
        self.lock().query.is_some()
    }

    /// Point the collection at a new query, or at nothing.
    ///
    /// Tears down the previous subscription, opens a live one for `query`
    /// and runs a one-shot fetch alongside it.
    pub async fn bind(&self, query: Option<Query>) {
        let (generation, previous) = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.list.clear();
            inner.error = None;
            inner.loading = query.is_some();
            inner.live_seen = false;
            inner.query = query.clone();
            (inner.generation, inner.subscription.take())
        };
        // Teardown waits for an in-flight callback, which needs our lock
        if let Some(previous) = previous {
            previous.unsubscribe();
        }
        self.bump();

        let Some(query) = query else {
            return;
        };

        tracing::debug!("Binding live collection to {}", query.collection);

        let on_snapshot = {
            let weak = self.downgrade();
            move |snapshot: Snapshot| {
                if let Some(this) = weak.upgrade() {
                    this.apply(generation, &snapshot.documents, true);
                }
            }
        };
        let on_error = {
            let weak = self.downgrade();
            move |error: AppError| {
                if let Some(this) = weak.upgrade() {
                    this.record_error(generation, &error);
                }
            }
        };
        let subscription = self.store.subscribe(query.clone(), on_snapshot, on_error);

        let stale = {
            let mut inner = self.lock();
            if inner.generation == generation {
                inner.subscription = Some(subscription);
                None
            } else {
                Some(subscription)
            }
        };
        if let Some(stale) = stale {
            stale.unsubscribe();
        }

        match self.store.query(&query).await {
            Ok(documents) => self.apply(generation, &documents, false),
            Err(e) => self.record_error(generation, &e),
        }
    }

    /// Re-request a fresh view of the bound query
    pub async fn refresh(&self) {
        let (generation, query) = {
            let inner = self.lock();
            (inner.generation, inner.query.clone())
        };
        let Some(query) = query else {
            return;
        };

        match self.store.query(&query).await {
            Ok(documents) => self.apply_refresh(generation, &documents),
            Err(e) => self.record_error(generation, &e),
        }
    }

    fn apply(&self, generation: u64, documents: &[Document], from_live: bool) {
        let items = decode_all::<T>(documents);
        {
            let mut inner = self.lock();
            if inner.generation != generation {
                return;
            }
            if !from_live && inner.live_seen {
                tracing::debug!("Discarding one-shot fetch superseded by live snapshot");
                return;
            }
            inner.live_seen |= from_live;
            inner.list.apply_snapshot(items);
            inner.loading = false;
        }
        self.bump();
    }

    fn apply_refresh(&self, generation: u64, documents: &[Document]) {
        let items = decode_all::<T>(documents);
        {
            let mut inner = self.lock();
            if inner.generation != generation {
                return;
            }
            inner.list.apply_snapshot(items);
            inner.loading = false;
        }
        self.bump();
    }

    fn record_error(&self, generation: u64, error: &AppError) {
        {
            let mut inner = self.lock();
            if inner.generation != generation {
                return;
            }
            inner.loading = false;
            inner.error = Some(error.user_message());
        }
        self.bump();
    }

    pub fn begin_insert(&self, item: T) -> MutationId {
        let id = self.lock().list.begin_insert(item);
        self.bump();
        id
    }

    pub fn begin_replace(&self, item: T) -> MutationId {
        let id = self.lock().list.begin_replace(item);
        self.bump();
        id
    }

    pub fn begin_remove(&self, key: &str) -> MutationId {
        let id = self.lock().list.begin_remove(key);
        self.bump();
        id
    }

    pub fn mutation_state(&self, id: MutationId) -> Option<MutationState> {
        self.lock().list.state_of(id)
    }

    /// Optimistic mutations not yet retired
    pub fn tracked_mutations(&self) -> usize {
        self.lock().list.tracked_count()
    }

    fn settle(
        &self,
        mutation: Option<MutationId>,
        outcome: std::result::Result<Option<T>, &AppError>,
    ) {
        {
            let mut inner = self.lock();
            match (mutation, outcome) {
                (Some(id), Ok(server)) => {
                    inner.list.confirm(id, server);
                    inner.error = None;
                }
                (Some(id), Err(e)) => {
                    if let Some(MutationState::Failed(message)) =
                        inner.list.fail(id, e.user_message())
                    {
                        tracing::warn!("Optimistic change rolled back: {}", message);
                    }
                    inner.error = Some(e.user_message());
                }
                (None, Ok(_)) => inner.error = None,
                (None, Err(e)) => inner.error = Some(e.user_message()),
            }
        }
        self.bump();
    }

    /// Await a write that yields the stored item, settle the optimistic
    /// mutation (if any), then re-request the view.
    pub async fn commit_upsert<F>(&self, mutation: Option<MutationId>, write: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match write.await {
            Ok(item) => {
                self.settle(mutation, Ok(Some(item.clone())));
                self.refresh().await;
                Ok(item)
            }
            Err(e) => {
                self.settle(mutation, Err(&e));
                Err(e)
            }
        }
    }

    /// Await a delete, settle the optimistic removal, then re-request the view.
    pub async fn commit_remove<F>(&self, mutation: Option<MutationId>, write: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        match write.await {
            Ok(()) => {
                self.settle(mutation, Ok(None));
                self.refresh().await;
                Ok(())
            }
            Err(e) => {
                self.settle(mutation, Err(&e));
                Err(e)
            }
        }
    }
}
