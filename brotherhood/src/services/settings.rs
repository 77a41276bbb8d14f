//! Settings service
//!
//! Manages user settings persistence through the local key-value store.

use crate::error::Result;
use crate::services::notifications::NotificationKind;
use crate::storage::LocalStore;
use serde::{Deserialize, Serialize};

const SETTINGS_KEY: &str = "settings";

fn default_true() -> bool {
    true
}

/// Which locally created notification categories are shown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    /// Weekly "reach out to your brothers" reminder
    #[serde(default = "default_true")]
    pub weekly_reminders: bool,
    /// New non-urgent dua requests (urgent ones are always shown)
    #[serde(default = "default_true")]
    pub dua_requests: bool,
    #[serde(default = "default_true")]
    pub goal_reminders: bool,
    #[serde(default = "default_true")]
    pub announcements: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            weekly_reminders: true,
            dua_requests: true,
            goal_reminders: true,
            announcements: true,
        }
    }
}

impl NotificationSettings {
    /// Whether a notification of `kind` passes the user's gate
    pub fn allows(&self, kind: NotificationKind, urgent: bool) -> bool {
        match kind {
            NotificationKind::DuaRequest => urgent || self.dua_requests,
            NotificationKind::ContactReminder => self.weekly_reminders,
            NotificationKind::GoalReminder => self.goal_reminders,
            NotificationKind::Announcement => self.announcements,
            NotificationKind::General => true,
        }
    }
}

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub onboarding_complete: bool,
}

/// Service for managing user settings
#[derive(Clone)]
pub struct SettingsService {
    store: LocalStore,
}

impl SettingsService {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Load settings from disk or create default if not exists
    pub async fn load(&self) -> Result<AppSettings> {
        match self.store.get::<AppSettings>(SETTINGS_KEY).await? {
            Some(settings) => Ok(settings),
            None => {
                tracing::info!("Settings not found, creating default settings");
                let default = AppSettings::default();
                self.save(&default).await?;
                Ok(default)
            }
        }
    }

    /// Save settings to disk
    pub async fn save(&self, settings: &AppSettings) -> Result<()> {
        self.store.set(SETTINGS_KEY, settings).await?;
        tracing::info!("Settings saved");
        Ok(())
    }

    pub async fn get_notifications(&self) -> Result<NotificationSettings> {
        Ok(self.load().await?.notifications)
    }

    pub async fn update_notifications(&self, notifications: NotificationSettings) -> Result<()> {
        let mut settings = self.load().await?;
        settings.notifications = notifications;
        self.save(&settings).await
    }

    pub async fn is_onboarding_complete(&self) -> Result<bool> {
        Ok(self.load().await?.onboarding_complete)
    }

    pub async fn complete_onboarding(&self) -> Result<()> {
        let mut settings = self.load().await?;
        settings.onboarding_complete = true;
        self.save(&settings).await
    }

    /// Show onboarding again on next start
    pub async fn reset_onboarding(&self) -> Result<()> {
        let mut settings = self.load().await?;
        settings.onboarding_complete = false;
        self.save(&settings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_service() -> (SettingsService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let service = SettingsService::new(LocalStore::new(temp_dir.path().to_path_buf()));
        (service, temp_dir)
    }

    #[tokio::test]
    async fn test_default_settings_created_on_load() {
        let (service, _temp) = create_test_service();

        let settings = service.load().await.unwrap();

        assert!(settings.notifications.weekly_reminders);
        assert!(settings.notifications.dua_requests);
        assert!(settings.notifications.goal_reminders);
        assert!(settings.notifications.announcements);
        assert!(!settings.onboarding_complete);
    }

    #[tokio::test]
    async fn test_settings_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();

        {
            let service = SettingsService::new(LocalStore::new(root.clone()));
            service
                .update_notifications(NotificationSettings {
                    dua_requests: false,
                    ..Default::default()
                })
                .await
                .unwrap();
            service.complete_onboarding().await.unwrap();
        }

        {
            let service = SettingsService::new(LocalStore::new(root));
            let loaded = service.load().await.unwrap();
            assert!(!loaded.notifications.dua_requests);
            assert!(loaded.notifications.announcements);
            assert!(loaded.onboarding_complete);
        }
    }

    #[tokio::test]
    async fn test_missing_fields_take_defaults() {
        let (service, temp) = create_test_service();
        tokio::fs::write(
            temp.path().join("settings.json"),
            r#"{"notifications": {"goalReminders": false}}"#,
        )
        .await
        .unwrap();

        let loaded = service.load().await.unwrap();
        assert!(!loaded.notifications.goal_reminders);
        assert!(loaded.notifications.weekly_reminders);
        assert!(!loaded.onboarding_complete);
    }

    #[test]
    fn test_urgent_dua_bypasses_gate() {
        let settings = NotificationSettings {
            dua_requests: false,
            weekly_reminders: false,
            ..Default::default()
        };

        assert!(!settings.allows(NotificationKind::DuaRequest, false));
        assert!(settings.allows(NotificationKind::DuaRequest, true));
        assert!(!settings.allows(NotificationKind::ContactReminder, true));
        assert!(settings.allows(NotificationKind::Announcement, false));
    }
}
