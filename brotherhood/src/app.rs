//! Application state and initialization
//!
//! This module manages the central application state and lifecycle.
//! All services are initialized here and made available through AppState.

use crate::auth::AuthSession;
use crate::clock::{Clock, SystemClock};
use crate::database::{create_pool, DocumentStore, Repository};
use crate::error::Result;
use crate::push::PushRouter;
use crate::services::{
    AnnouncementsService, BrothersService, DuaService, GoalsService, InteractionsService,
    NotificationCenter, RemindersService, SettingsService,
};
use crate::storage::LocalStore;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub app_data_dir: PathBuf,
    pub clock: Arc<dyn Clock>,
    pub auth: AuthSession,
    pub store: DocumentStore,
    pub repo: Repository,
    pub local_store: LocalStore,
    pub settings: SettingsService,
    pub notifications: NotificationCenter,
    pub brothers: BrothersService,
    pub interactions: InteractionsService,
    pub duas: DuaService,
    pub goals: GoalsService,
    pub announcements: AnnouncementsService,
    pub reminders: RemindersService,
    pub push: PushRouter,
}

impl AppState {
    /// Open the database and local storage under `app_data_dir`
    pub async fn initialize(app_data_dir: PathBuf) -> Result<Self> {
        tracing::info!("App data directory: {:?}", app_data_dir);

        std::fs::create_dir_all(&app_data_dir)?;
        std::fs::create_dir_all(app_data_dir.join("local"))?;

        let pool = create_pool(&app_data_dir.join("brotherhood.db")).await?;
        let local_store = LocalStore::new(app_data_dir.join("local"));
        local_store.initialize().await?;

        let state = Self::assemble(app_data_dir, pool, local_store, Arc::new(SystemClock));
        tracing::info!("Application initialized successfully");
        Ok(state)
    }

    /// Wire every service over an open pool
    pub fn assemble(
        app_data_dir: PathBuf,
        pool: SqlitePool,
        local_store: LocalStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let auth = AuthSession::new();
        let store = DocumentStore::with_clock(pool, Arc::clone(&clock));
        let repo = Repository::new(store.clone());

        let settings = SettingsService::new(local_store.clone());
        let notifications =
            NotificationCenter::new(local_store.clone(), settings.clone(), Arc::clone(&clock));

        let brothers = BrothersService::new(repo.clone(), auth.clone(), Arc::clone(&clock));
        let interactions =
            InteractionsService::new(repo.clone(), auth.clone(), Arc::clone(&clock));
        let duas = DuaService::new(repo.clone(), auth.clone(), Arc::clone(&clock));
        let goals = GoalsService::new(repo.clone(), auth.clone(), Arc::clone(&clock));
        let announcements =
            AnnouncementsService::new(repo.clone(), auth.clone(), Arc::clone(&clock));
        let reminders = RemindersService::new(
            repo.clone(),
            auth.clone(),
            Arc::clone(&clock),
            notifications.clone(),
        );
        let push = PushRouter::new(notifications.clone());

        Self {
            app_data_dir,
            clock,
            auth,
            store,
            repo,
            local_store,
            settings,
            notifications,
            brothers,
            interactions,
            duas,
            goals,
            announcements,
            reminders,
            push,
        }
    }

    /// Re-bind every live list to the current user
    pub async fn bind_all(&self) {
        tokio::join!(
            self.brothers.bind_current_user(),
            self.interactions.bind_current_user(),
            self.duas.bind_current_user(),
            self.goals.bind_current_user(),
            self.announcements.bind_current_user(),
        );
    }

    /// Bind now, then re-bind whenever the signed-in user changes
    pub async fn follow_auth(&self) -> JoinHandle<()> {
        self.bind_all().await;

        let state = self.clone();
        let mut users = self.auth.watch();
        tokio::spawn(async move {
            while users.changed().await.is_ok() {
                let uid = users.borrow_and_update().as_ref().map(|u| u.uid.clone());
                tracing::info!("Current user changed: {:?}", uid);
                state.bind_all().await;
            }
        })
    }

    /// Stop background work before exit
    pub async fn shutdown(&self) -> Result<()> {
        self.reminders.shutdown().await?;
        self.auth.sign_out();
        // Signed out, every list unbinds and its subscription is dropped
        self.bind_all().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CurrentUser;
    use crate::validation::BrotherForm;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_initialize_and_follow_auth() {
        let temp = TempDir::new().unwrap();
        let state = AppState::initialize(temp.path().join("data")).await.unwrap();
        assert!(temp.path().join("data").join("brotherhood.db").exists());

        state.auth.sign_in(CurrentUser::new("u1", "Yusuf"));
        let follower = state.follow_auth().await;
        assert!(state.brothers.state().items.is_empty());

        state
            .brothers
            .add_brother(&BrotherForm::named("Ali"))
            .await
            .unwrap();
        assert_eq!(state.brothers.state().items.len(), 1);

        state.shutdown().await.unwrap();
        assert!(state.auth.current().is_none());
        follower.abort();
    }
}
