//! Push message handling
//!
//! Messages arrive in the push gateway's shape: an optional display block
//! (`notification.title`, `notification.body`) and a string-keyed `data`
//! map whose `type` names the category. Foreground messages are mirrored
//! as they are; background messages are routed by type through the
//! settings gate.

use crate::error::{AppError, Result};
use crate::services::notifications::{
    NewNotification, Notification, NotificationCenter, NotificationKind,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushNotification {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    #[serde(default)]
    pub notification: Option<PushNotification>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl PushMessage {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| AppError::Validation(format!("Malformed push message: {}", e)))
    }

    pub fn message_type(&self) -> Option<&str> {
        self.data.get("type").and_then(Value::as_str)
    }

    fn text(&self, field: &str) -> Option<String> {
        let display = self.notification.as_ref().and_then(|n| match field {
            "title" => n.title.clone(),
            _ => n.body.clone(),
        });
        display.or_else(|| self.data.get(field).and_then(Value::as_str).map(str::to_string))
    }

    /// Data values travel as strings, so `"true"` counts too
    pub fn is_urgent(&self) -> bool {
        match self.data.get("isUrgent") {
            Some(Value::Bool(urgent)) => *urgent,
            Some(Value::String(urgent)) => urgent == "true",
            _ => false,
        }
    }

    fn into_notification(self, kind: NotificationKind) -> NewNotification {
        let title = self.text("title").unwrap_or_else(|| default_title(kind).to_string());
        let body = self.text("body").unwrap_or_default();
        NewNotification::new(kind, title, body).with_data(self.data)
    }
}

fn default_title(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::DuaRequest => "New dua request",
        NotificationKind::GoalReminder => "Goal reminder",
        NotificationKind::ContactReminder => "Time to reach out",
        NotificationKind::Announcement => "New announcement",
        NotificationKind::General => "Brotherhood",
    }
}

#[derive(Clone)]
pub struct PushRouter {
    notifications: NotificationCenter,
}

impl PushRouter {
    pub fn new(notifications: NotificationCenter) -> Self {
        Self { notifications }
    }

    /// Mirror a message received while the app is open, whatever its type
    pub async fn handle_foreground(&self, message: PushMessage) -> Result<Notification> {
        let kind = message
            .message_type()
            .and_then(NotificationKind::from_type)
            .unwrap_or(NotificationKind::General);
        self.notifications
            .receive_foreground(message.into_notification(kind))
            .await
    }

    /// Route a background message by type; unknown types are dropped
    pub async fn handle_background(&self, message: PushMessage) -> Result<Option<Notification>> {
        let kind = match message.message_type().and_then(NotificationKind::from_type) {
            Some(kind @ NotificationKind::DuaRequest)
            | Some(kind @ NotificationKind::GoalReminder)
            | Some(kind @ NotificationKind::ContactReminder)
            | Some(kind @ NotificationKind::Announcement) => kind,
            _ => {
                tracing::warn!(
                    "Dropping background push with unhandled type: {:?}",
                    message.message_type()
                );
                return Ok(None);
            }
        };

        let urgent = kind == NotificationKind::DuaRequest && message.is_urgent();
        tracing::debug!("Routing background push: {:?} (urgent: {})", kind, urgent);
        self.notifications
            .notify(message.into_notification(kind), urgent)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::services::settings::{NotificationSettings, SettingsService};
    use crate::storage::LocalStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_router(temp: &TempDir) -> (PushRouter, NotificationCenter, SettingsService) {
        let store = LocalStore::new(temp.path().to_path_buf());
        let settings = SettingsService::new(store.clone());
        let center = NotificationCenter::new(store, settings.clone(), Arc::new(SystemClock));
        (PushRouter::new(center.clone()), center, settings)
    }

    #[test]
    fn test_parse_gateway_shape() {
        let message = PushMessage::from_json(
            r#"{"notification": {"title": "Urgent dua", "body": "Please pray"},
                "data": {"type": "dua_request", "isUrgent": "true", "duaId": "d1"}}"#,
        )
        .unwrap();

        assert_eq!(message.message_type(), Some("dua_request"));
        assert!(message.is_urgent());
        assert!(PushMessage::from_json("not json").is_err());
    }

    #[tokio::test]
    async fn test_background_routing_and_gate() {
        let temp = TempDir::new().unwrap();
        let (router, center, settings) = create_test_router(&temp);
        settings
            .update_notifications(NotificationSettings {
                dua_requests: false,
                ..Default::default()
            })
            .await
            .unwrap();

        let quiet = PushMessage::from_json(r#"{"data": {"type": "dua_request"}}"#).unwrap();
        assert!(router.handle_background(quiet).await.unwrap().is_none());

        let urgent =
            PushMessage::from_json(r#"{"data": {"type": "dua_request", "isUrgent": true}}"#)
                .unwrap();
        let shown = router.handle_background(urgent).await.unwrap().unwrap();
        assert_eq!(shown.title, "New dua request");

        let unknown = PushMessage::from_json(r#"{"data": {"type": "marketing"}}"#).unwrap();
        assert!(router.handle_background(unknown).await.unwrap().is_none());

        assert_eq!(center.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_foreground_ignores_settings() {
        let temp = TempDir::new().unwrap();
        let (router, _center, settings) = create_test_router(&temp);
        settings
            .update_notifications(NotificationSettings {
                announcements: false,
                ..Default::default()
            })
            .await
            .unwrap();

        let message = PushMessage::from_json(
            r#"{"notification": {"title": "Eid picnic", "body": "Sunday 2pm"},
                "data": {"type": "announcement", "announcementId": "a1"}}"#,
        )
        .unwrap();
        let shown = router.handle_foreground(message).await.unwrap();

        assert_eq!(shown.kind, NotificationKind::Announcement);
        assert_eq!(shown.title, "Eid picnic");
        assert_eq!(shown.data["announcementId"], "a1");
    }
}
