//! Live queries
//!
//! A subscription re-runs its query whenever its collection changes and
//! hands the full ordered result set to the snapshot callback. A failed
//! query goes to the error callback and ends the subscription; there is
//! no automatic retry.

use super::paths::CollectionPath;
use super::store::{Document, DocumentStore, Query};
use crate::error::AppError;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;

/// Full result set of a live query at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub collection: CollectionPath,
    pub documents: Vec<Document>,
}

/// Handle to a running live query.
///
/// Once `unsubscribe` returns the callbacks are never invoked again.
/// `unsubscribe` must not be called from inside a callback; dropping the
/// handle there is fine.
pub struct Subscription {
    active: Arc<Mutex<bool>>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stop the live query, waiting out any callback in flight
    pub fn unsubscribe(self) {
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = false;
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) && !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // The handle may be dropped from inside its own callback, so only
        // flip the flag when nobody holds it. Aborting still guarantees the
        // task is never polled again.
        if let Ok(mut active) = self.active.try_lock() {
            *active = false;
        }
        self.task.abort();
    }
}

impl DocumentStore {
    /// Open a live query.
    ///
    /// The first snapshot is delivered as soon as the initial query
    /// completes; later ones follow each change to the collection. Bursts of
    /// changes that arrive while a query runs collapse into one re-run.
    pub fn subscribe<S, E>(&self, query: Query, on_snapshot: S, on_error: E) -> Subscription
    where
        S: Fn(Snapshot) + Send + Sync + 'static,
        E: Fn(AppError) + Send + Sync + 'static,
    {
        let active = Arc::new(Mutex::new(true));
        let store = self.clone();
        let flag = Arc::clone(&active);
        // Subscribe before the first query so no change slips between them
        let mut changes = self.watch_changes();

        let task = tokio::spawn(async move {
            tracing::debug!("Live query opened on {}", query.collection);

            loop {
                match store.query(&query).await {
                    Ok(documents) => {
                        let active = flag.lock().unwrap_or_else(|e| e.into_inner());
                        if !*active {
                            return;
                        }
                        on_snapshot(Snapshot {
                            collection: query.collection.clone(),
                            documents,
                        });
                    }
                    Err(e) => {
                        tracing::error!("Live query on {} failed: {}", query.collection, e);
                        let active = flag.lock().unwrap_or_else(|e| e.into_inner());
                        if *active {
                            on_error(e);
                        }
                        return;
                    }
                }

                // Wait for a change to our collection
                loop {
                    match changes.recv().await {
                        Ok(collection) if collection == query.collection => break,
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(
                                "Live query on {} lagged by {} changes, re-running",
                                query.collection,
                                skipped
                            );
                            break;
                        }
                        Err(RecvError::Closed) => {
                            let active = flag.lock().unwrap_or_else(|e| e.into_inner());
                            if *active {
                                on_error(AppError::SubscriptionClosed);
                            }
                            return;
                        }
                    }
                }

                // Coalesce whatever else is already queued
                loop {
                    match changes.try_recv() {
                        Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                    }
                }
            }
        });

        Subscription { active, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{create_memory_pool, Direction};
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn create_test_store() -> DocumentStore {
        DocumentStore::new(create_memory_pool().await.unwrap())
    }

    async fn next_snapshot(rx: &mut mpsc::UnboundedReceiver<Snapshot>) -> Snapshot {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for snapshot")
            .expect("subscription ended")
    }

    #[tokio::test]
    async fn test_delivers_initial_and_changed_snapshots() {
        let store = create_test_store().await;
        let brothers = CollectionPath::brothers("u1");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _sub = store.subscribe(
            Query::collection(brothers.clone()).order_by("name", Direction::Ascending),
            move |snapshot| {
                let _ = tx.send(snapshot);
            },
            |_| {},
        );

        let initial = next_snapshot(&mut rx).await;
        assert!(initial.documents.is_empty());

        store
            .create(&brothers, json!({"name": "Zaid"}).as_object().unwrap().clone())
            .await
            .unwrap();

        let mut latest = next_snapshot(&mut rx).await;
        while latest.documents.is_empty() {
            latest = next_snapshot(&mut rx).await;
        }
        assert_eq!(latest.documents.len(), 1);
        assert_eq!(latest.documents[0].str_field("name"), Some("Zaid"));
    }

    #[tokio::test]
    async fn test_ignores_other_collections() {
        let store = create_test_store().await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _sub = store.subscribe(
            Query::collection(CollectionPath::goals("u1")),
            move |snapshot| {
                let _ = tx.send(snapshot);
            },
            |_| {},
        );
        next_snapshot(&mut rx).await;

        store
            .create(
                &CollectionPath::dua_requests(),
                json!({"text": "unrelated"}).as_object().unwrap().clone(),
            )
            .await
            .unwrap();

        let result = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(result.is_err(), "no snapshot expected for other collections");
    }

    #[tokio::test]
    async fn test_no_callbacks_after_unsubscribe() {
        let store = create_test_store().await;
        let goals = CollectionPath::goals("u1");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let sub = store.subscribe(
            Query::collection(goals.clone()),
            move |snapshot| {
                let _ = tx.send(snapshot);
            },
            |_| {},
        );
        next_snapshot(&mut rx).await;
        assert!(sub.is_active());

        sub.unsubscribe();

        store
            .create(&goals, json!({"title": "Fajr"}).as_object().unwrap().clone())
            .await
            .unwrap();

        // The sender lives in the aborted task, so the channel closes
        let result = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("channel should close after unsubscribe");
        assert!(result.is_none());
    }

    /// Store whose brothers collection holds a row with an unreadable body
    async fn create_corrupt_store() -> DocumentStore {
        let pool = create_memory_pool().await.unwrap();
        let now = chrono::Utc::now();
        sqlx::query(
            "INSERT INTO documents (collection, id, data, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(CollectionPath::brothers("u1").as_str())
        .bind("broken")
        .bind("{not json")
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();
        DocumentStore::new(pool)
    }

    #[tokio::test]
    async fn test_failed_query_reports_once_and_ends() {
        let store = create_corrupt_store().await;
        let brothers = CollectionPath::brothers("u1");
        let (tx, mut rx) = mpsc::unbounded_channel::<Snapshot>();
        let (err_tx, mut err_rx) = mpsc::unbounded_channel::<AppError>();

        let sub = store.subscribe(
            Query::collection(brothers.clone()),
            move |snapshot| {
                let _ = tx.send(snapshot);
            },
            move |e| {
                let _ = err_tx.send(e);
            },
        );

        let error = tokio::time::timeout(Duration::from_secs(5), err_rx.recv())
            .await
            .expect("timed out waiting for error")
            .expect("error channel closed");
        assert_eq!(error.code(), "internal");

        // No retry on later changes
        store
            .create(&brothers, json!({"name": "Zaid"}).as_object().unwrap().clone())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(rx.try_recv().is_err());
        assert!(err_rx.try_recv().is_err());
        assert!(!sub.is_active());
    }
}
