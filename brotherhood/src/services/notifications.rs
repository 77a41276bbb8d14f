//! Notification center
//!
//! Local mirror of push messages and app-generated reminders. Items go
//! `unread -> read -> removed`: a read item stays visible for
//! `READ_NOTIFICATION_TTL` and is swept on the next access after that.
//! The list is capped, persisted on every change and rehydrated by `load`.

use crate::clock::Clock;
use crate::config::{MAX_NOTIFICATIONS, READ_NOTIFICATION_TTL};
use crate::error::Result;
use crate::services::settings::SettingsService;
use crate::storage::LocalStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

const NOTIFICATIONS_KEY: &str = "notifications";

/// Notification category, matching the push payload's `type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DuaRequest,
    GoalReminder,
    ContactReminder,
    Announcement,
    #[serde(other)]
    General,
}

impl NotificationKind {
    /// Parse a push `type` field; `None` for types this client does not know
    pub fn from_type(value: &str) -> Option<Self> {
        match value {
            "dua_request" => Some(NotificationKind::DuaRequest),
            "goal_reminder" => Some(NotificationKind::GoalReminder),
            "contact_reminder" => Some(NotificationKind::ContactReminder),
            "announcement" => Some(NotificationKind::Announcement),
            "general" => Some(NotificationKind::General),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub read: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

/// Content of a notification about to be added
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub title: String,
    pub body: String,
    pub kind: NotificationKind,
    pub data: Map<String, Value>,
}

impl NewNotification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            kind,
            data: Map::new(),
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }
}

fn read_ttl() -> Duration {
    Duration::milliseconds(READ_NOTIFICATION_TTL.as_millis() as i64)
}

/// Drop read items whose grace period has passed; true if any went
fn sweep(items: &mut Vec<Notification>, now: DateTime<Utc>) -> bool {
    let before = items.len();
    items.retain(|n| n.read_at.map_or(true, |read_at| now < read_at + read_ttl()));
    items.len() != before
}

#[derive(Clone)]
pub struct NotificationCenter {
    store: LocalStore,
    settings: SettingsService,
    clock: Arc<dyn Clock>,
    items: Arc<Mutex<Vec<Notification>>>,
    revision: Arc<watch::Sender<u64>>,
}

impl NotificationCenter {
    pub fn new(store: LocalStore, settings: SettingsService, clock: Arc<dyn Clock>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            store,
            settings,
            clock,
            items: Arc::new(Mutex::new(Vec::new())),
            revision: Arc::new(revision),
        }
    }

    /// Receiver that wakes whenever the list changes
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    async fn persist(&self, items: &[Notification]) -> Result<()> {
        self.store.set(NOTIFICATIONS_KEY, &items).await
    }

    /// Rehydrate the list saved by a previous run
    pub async fn load(&self) -> Result<usize> {
        let mut stored = self
            .store
            .get::<Vec<Notification>>(NOTIFICATIONS_KEY)
            .await?
            .unwrap_or_default();
        sweep(&mut stored, self.clock.now());
        stored.truncate(MAX_NOTIFICATIONS);

        let count = stored.len();
        *self.items.lock().await = stored;
        self.bump();

        tracing::info!("Loaded {} notifications", count);
        Ok(count)
    }

    /// Apply `change` to a copy of the list, persist the copy and only then
    /// swap it in. Nothing is written when `change` reports no change.
    async fn commit<R>(
        &self,
        change: impl FnOnce(&mut Vec<Notification>) -> Option<R>,
    ) -> Result<Option<R>> {
        let result = {
            let mut items = self.items.lock().await;
            let mut next = items.clone();
            let swept = sweep(&mut next, self.clock.now());
            let result = change(&mut next);
            if result.is_none() && !swept {
                return Ok(None);
            }
            self.persist(&next).await?;
            *items = next;
            result
        };
        self.bump();
        Ok(result)
    }

    async fn insert(&self, new: NewNotification) -> Result<Notification> {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            title: new.title,
            body: new.body,
            kind: new.kind,
            read: false,
            timestamp: self.clock.now(),
            data: new.data,
            read_at: None,
        };

        let added = notification.clone();
        self.commit(move |items| {
            items.insert(0, added);
            items.truncate(MAX_NOTIFICATIONS);
            Some(())
        })
        .await?;

        tracing::debug!("Notification added: {:?} {}", notification.kind, notification.id);
        Ok(notification)
    }

    /// Mirror a push received while the app is in the foreground.
    ///
    /// Not subject to the user's notification settings.
    pub async fn receive_foreground(&self, new: NewNotification) -> Result<Notification> {
        self.insert(new).await
    }

    /// Add an app-generated notification if the user's settings allow it.
    ///
    /// Urgent dua requests are always shown.
    pub async fn notify(&self, new: NewNotification, urgent: bool) -> Result<Option<Notification>> {
        let settings = self.settings.get_notifications().await?;
        if !settings.allows(new.kind, urgent) {
            tracing::debug!("Notification of kind {:?} suppressed by settings", new.kind);
            return Ok(None);
        }
        self.insert(new).await.map(Some)
    }

    /// Spawn a sweep for when the grace period of items read now ends
    fn schedule_sweep(&self) {
        let center = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(READ_NOTIFICATION_TTL).await;
            if let Err(e) = center.sweep_expired().await {
                tracing::warn!("Failed to sweep read notifications: {}", e);
            }
        });
    }

    /// Mark one notification read; false if it no longer exists
    pub async fn mark_as_read(&self, id: &str) -> Result<bool> {
        let now = self.clock.now();
        let outcome = self
            .commit(|items| {
                let item = items.iter_mut().find(|n| n.id == id)?;
                if item.read {
                    return None;
                }
                item.read = true;
                item.read_at = Some(now);
                Some(())
            })
            .await?;

        match outcome {
            Some(()) => {
                self.schedule_sweep();
                Ok(true)
            }
            None => Ok(self.items.lock().await.iter().any(|n| n.id == id)),
        }
    }

    /// Mark every unread item read; returns how many changed
    pub async fn mark_all_as_read(&self) -> Result<usize> {
        let now = self.clock.now();
        let changed = self
            .commit(|items| {
                let mut changed = 0;
                for item in items.iter_mut().filter(|n| !n.read) {
                    item.read = true;
                    item.read_at = Some(now);
                    changed += 1;
                }
                (changed > 0).then_some(changed)
            })
            .await?
            .unwrap_or(0);

        if changed > 0 {
            self.schedule_sweep();
        }
        tracing::debug!("Marked {} notifications read", changed);
        Ok(changed)
    }

    /// Dismiss immediately
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let removed = self
            .commit(|items| {
                let index = items.iter().position(|n| n.id == id)?;
                items.remove(index);
                Some(())
            })
            .await?;
        Ok(removed.is_some())
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.commit(|items| {
            items.clear();
            Some(())
        })
        .await?;
        tracing::info!("Cleared all notifications");
        Ok(())
    }

    /// Remove read items past their grace period
    pub async fn sweep_expired(&self) -> Result<bool> {
        let before = self.items.lock().await.len();
        self.commit(|_| None::<()>).await?;
        Ok(self.items.lock().await.len() != before)
    }

    /// Current list, newest first
    pub async fn list(&self) -> Result<Vec<Notification>> {
        self.sweep_expired().await?;
        Ok(self.items.lock().await.clone())
    }

    pub async fn unread_count(&self) -> Result<usize> {
        Ok(self.list().await?.iter().filter(|n| !n.read).count())
    }
}
