//! Reminders service
//!
//! Cron jobs that nudge the signed-in user: a weekly reminder to reach
//! out to brothers who are overdue for contact, and a daily reminder for
//! goals not yet met this period. Both go through the notification gate.

use crate::auth::AuthSession;
use crate::clock::Clock;
use crate::config::{CONTACT_REMINDER_CRON, GOAL_REMINDER_CRON};
use crate::database::Repository;
use crate::error::{AppError, Result};
use crate::services::notifications::{
    NewNotification, Notification, NotificationCenter, NotificationKind,
};
use crate::views::ContactStatus;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};

fn payload(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Reminders service with background scheduler
#[derive(Clone)]
pub struct RemindersService {
    repo: Repository,
    auth: AuthSession,
    clock: Arc<dyn Clock>,
    notifications: NotificationCenter,
    scheduler: Arc<RwLock<Option<JobScheduler>>>,
}

impl RemindersService {
    pub fn new(
        repo: Repository,
        auth: AuthSession,
        clock: Arc<dyn Clock>,
        notifications: NotificationCenter,
    ) -> Self {
        Self {
            repo,
            auth,
            clock,
            notifications,
            scheduler: Arc::new(RwLock::new(None)),
        }
    }

    /// Tell the user how many brothers are overdue for contact
    pub async fn send_contact_reminder(&self) -> Result<Option<Notification>> {
        let Some(user) = self.auth.current() else {
            tracing::debug!("Skipping contact reminder: nobody signed in");
            return Ok(None);
        };

        let now = self.clock.now();
        let overdue: Vec<_> = self
            .repo
            .list_brothers(Some(&user), &user.uid)
            .await?
            .into_iter()
            .filter(|b| ContactStatus::of(b, now).is_overdue())
            .collect();

        let body = match overdue.as_slice() {
            [] => return Ok(None),
            [only] => format!("{} could use a call this week", only.name),
            many => format!("{} brothers could use a call this week", many.len()),
        };

        tracing::info!("Sending contact reminder for {} brothers", overdue.len());
        self.notifications
            .notify(
                NewNotification::new(NotificationKind::ContactReminder, "Time to reach out", body)
                    .with_data(payload(json!({ "count": overdue.len() }))),
                false,
            )
            .await
    }

    /// Tell the user how many goals are still open this period
    pub async fn send_goal_reminder(&self) -> Result<Option<Notification>> {
        let Some(user) = self.auth.current() else {
            tracing::debug!("Skipping goal reminder: nobody signed in");
            return Ok(None);
        };

        let now = self.clock.now();
        let open = self
            .repo
            .list_goals(Some(&user), &user.uid)
            .await?
            .into_iter()
            .filter(|g| !g.is_complete_at(now))
            .count();

        if open == 0 {
            return Ok(None);
        }

        let body = if open == 1 {
            "You have 1 goal still open. Keep going!".to_string()
        } else {
            format!("You have {} goals still open. Keep going!", open)
        };

        tracing::info!("Sending goal reminder for {} goals", open);
        self.notifications
            .notify(
                NewNotification::new(NotificationKind::GoalReminder, "Keep your goals going", body)
                    .with_data(payload(json!({ "count": open }))),
                false,
            )
            .await
    }

    fn job<F, Fut>(cron: &str, name: &'static str, run: F) -> Result<Job>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Notification>>> + Send + 'static,
    {
        let run = Arc::new(run);
        Job::new_async(cron.to_string(), move |_uuid, _l| {
            let run = Arc::clone(&run);
            Box::pin(async move {
                tracing::info!("Running scheduled {}", name);
                if let Err(e) = run().await {
                    tracing::error!("Scheduled {} failed: {}", name, e);
                }
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        })
        .map_err(|e| AppError::Scheduler(format!("Failed to create {} job: {}", name, e)))
    }

    /// Start the background scheduler
    pub async fn start(&self) -> Result<()> {
        let mut slot = self.scheduler.write().await;
        if slot.is_some() {
            return Ok(());
        }

        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to create scheduler: {}", e)))?;

        let contact = {
            let service = self.clone();
            Self::job(CONTACT_REMINDER_CRON, "contact reminder", move || {
                let service = service.clone();
                async move { service.send_contact_reminder().await }
            })?
        };
        let goals = {
            let service = self.clone();
            Self::job(GOAL_REMINDER_CRON, "goal reminder", move || {
                let service = service.clone();
                async move { service.send_goal_reminder().await }
            })?
        };

        for job in [contact, goals] {
            scheduler
                .add(job)
                .await
                .map_err(|e| AppError::Scheduler(format!("Failed to schedule job: {}", e)))?;
        }

        scheduler
            .start()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to start scheduler: {}", e)))?;

        *slot = Some(scheduler);

        tracing::info!(
            "Reminder scheduler started ({}, {})",
            CONTACT_REMINDER_CRON,
            GOAL_REMINDER_CRON
        );
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.scheduler.read().await.is_some()
    }

    /// Shutdown scheduler gracefully
    pub async fn shutdown(&self) -> Result<()> {
        let mut slot = self.scheduler.write().await;
        if let Some(mut scheduler) = slot.take() {
            scheduler
                .shutdown()
                .await
                .map_err(|e| AppError::Scheduler(format!("Failed to shutdown scheduler: {}", e)))?;
            tracing::info!("Reminder scheduler shutdown");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CurrentUser;
    use crate::clock::ManualClock;
    use crate::database::{create_memory_pool, DocumentStore, Frequency, GoalType, NewGoal};
    use crate::services::settings::{NotificationSettings, SettingsService};
    use crate::storage::LocalStore;
    use crate::validation::BrotherForm;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    struct Fixture {
        service: RemindersService,
        repo: Repository,
        auth: AuthSession,
        settings: SettingsService,
        _temp: TempDir,
    }

    async fn create_fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 3, 9, 0, 0).unwrap());
        let store = DocumentStore::with_clock(
            create_memory_pool().await.unwrap(),
            Arc::new(clock.clone()),
        );
        let repo = Repository::new(store);
        let local = LocalStore::new(temp.path().to_path_buf());
        let settings = SettingsService::new(local.clone());
        let notifications =
            NotificationCenter::new(local, settings.clone(), Arc::new(clock.clone()));
        let auth = AuthSession::new();
        let service = RemindersService::new(
            repo.clone(),
            auth.clone(),
            Arc::new(clock),
            notifications,
        );
        Fixture {
            service,
            repo,
            auth,
            settings,
            _temp: temp,
        }
    }

    #[tokio::test]
    async fn test_contact_reminder_counts_overdue_brothers() {
        let f = create_fixture().await;
        assert!(f.service.send_contact_reminder().await.unwrap().is_none());

        let me = CurrentUser::new("u1", "Yusuf");
        f.auth.sign_in(me.clone());
        assert!(f.service.send_contact_reminder().await.unwrap().is_none());

        for name in ["Ali", "Bilal"] {
            f.repo
                .create_brother(Some(&me), "u1", BrotherForm::named(name).validate().unwrap())
                .await
                .unwrap();
        }

        let sent = f.service.send_contact_reminder().await.unwrap().unwrap();
        assert_eq!(sent.kind, NotificationKind::ContactReminder);
        assert_eq!(sent.body, "2 brothers could use a call this week");
        assert_eq!(sent.data["count"], 2);
    }

    #[tokio::test]
    async fn test_goal_reminder_respects_settings() {
        let f = create_fixture().await;
        let me = CurrentUser::new("u1", "Yusuf");
        f.auth.sign_in(me.clone());

        f.repo
            .create_goal(
                Some(&me),
                "u1",
                NewGoal {
                    goal_type: GoalType::Quran,
                    title: "Read a juz".to_string(),
                    description: None,
                    target: 1,
                    frequency: Frequency::Weekly,
                },
            )
            .await
            .unwrap();

        let sent = f.service.send_goal_reminder().await.unwrap().unwrap();
        assert_eq!(sent.body, "You have 1 goal still open. Keep going!");

        f.settings
            .update_notifications(NotificationSettings {
                goal_reminders: false,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(f.service.send_goal_reminder().await.unwrap().is_none());
    }
}
