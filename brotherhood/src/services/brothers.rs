//! Brothers service
//!
//! The signed-in user's contact directory: a live-bound list plus
//! optimistic add, edit and delete, and the directory views.

use crate::auth::AuthSession;
use crate::clock::Clock;
use crate::database::{Brother, BrotherUpdate, Repository};
use crate::error::{AppError, Result};
use crate::sync::{ListState, LiveCollection};
use crate::validation::BrotherForm;
use crate::views::{filter_brothers, BrotherFilter, ContactStatus, StatusCounts};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Clone)]
pub struct BrothersService {
    repo: Repository,
    auth: AuthSession,
    clock: Arc<dyn Clock>,
    brothers: LiveCollection<Brother>,
}

impl BrothersService {
    pub fn new(repo: Repository, auth: AuthSession, clock: Arc<dyn Clock>) -> Self {
        let brothers = LiveCollection::new(repo.store().clone());
        Self {
            repo,
            auth,
            clock,
            brothers,
        }
    }

    /// Re-bind to the signed-in user's directory, or clear it when signed out
    pub async fn bind_current_user(&self) {
        let query = self
            .auth
            .current()
            .map(|user| Repository::brothers_query(&user.uid));
        self.brothers.bind(query).await;
    }

    pub fn state(&self) -> ListState<Brother> {
        self.brothers.state()
    }

    pub fn watch(&self) -> watch::Receiver<u64> {
        self.brothers.watch()
    }

    pub fn get(&self, id: &str) -> Option<Brother> {
        self.brothers.get(id)
    }

    pub async fn add_brother(&self, form: &BrotherForm) -> Result<Brother> {
        let user = self.auth.require_user()?;
        let new = form.validate()?;

        let now = self.clock.now();
        let optimistic = Brother {
            id: format!("pending-{}", Uuid::new_v4()),
            name: new.name.clone(),
            email: new.email.clone(),
            phone: new.phone.clone(),
            location: new.location.clone(),
            notes: new.notes.clone(),
            contact_preferences: new.contact_preferences.clone(),
            last_contact: None,
            last_contact_method: None,
            created_at: now,
            updated_at: now,
        };
        let mutation = self.brothers.begin_insert(optimistic);

        tracing::info!("Adding brother: {}", new.name);
        self.brothers
            .commit_upsert(
                Some(mutation),
                self.repo.create_brother(Some(&user), &user.uid, new),
            )
            .await
    }

    pub async fn update_brother(&self, id: &str, update: &BrotherUpdate) -> Result<Brother> {
        let user = self.auth.require_user()?;

        let mutation = self.brothers.get(id).map(|mut brother| {
            update.apply_to(&mut brother);
            self.brothers.begin_replace(brother)
        });

        tracing::info!("Updating brother: {}", id);
        self.brothers
            .commit_upsert(
                mutation,
                self.repo.update_brother(Some(&user), &user.uid, id, update),
            )
            .await
    }

    /// Delete a brother; `confirmation` must be the brother's exact name
    pub async fn delete_brother(&self, id: &str, confirmation: &str) -> Result<()> {
        let user = self.auth.require_user()?;

        let brother = match self.brothers.get(id) {
            Some(brother) => brother,
            None => self.repo.get_brother(Some(&user), &user.uid, id).await?,
        };
        if confirmation != brother.name {
            return Err(AppError::Validation(format!(
                "Type \"{}\" exactly to confirm deletion",
                brother.name
            )));
        }

        let mutation = self.brothers.begin_remove(id);

        tracing::info!("Deleting brother: {}", id);
        self.brothers
            .commit_remove(
                Some(mutation),
                self.repo.delete_brother(Some(&user), &user.uid, id),
            )
            .await
    }

    pub fn filtered(&self, filter: &BrotherFilter) -> Vec<Brother> {
        filter_brothers(&self.brothers.items(), filter, self.clock.now())
    }

    pub fn search(&self, query: &str) -> Vec<Brother> {
        self.filtered(&BrotherFilter::search(query))
    }

    pub fn status_of(&self, brother: &Brother) -> ContactStatus {
        ContactStatus::of(brother, self.clock.now())
    }

    pub fn statistics(&self) -> StatusCounts {
        StatusCounts::from_brothers(&self.brothers.items(), self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CurrentUser;
    use crate::clock::ManualClock;
    use crate::database::{create_memory_pool, DocumentStore};
    use chrono::{TimeZone, Utc};

    async fn create_test_service() -> (BrothersService, AuthSession) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let store = DocumentStore::with_clock(
            create_memory_pool().await.unwrap(),
            Arc::new(clock.clone()),
        );
        let auth = AuthSession::new();
        auth.sign_in(CurrentUser::new("u1", "Yusuf"));
        let service = BrothersService::new(Repository::new(store), auth.clone(), Arc::new(clock));
        service.bind_current_user().await;
        (service, auth)
    }

    #[tokio::test]
    async fn test_add_update_and_statistics() {
        let (service, _auth) = create_test_service().await;

        let ali = service.add_brother(&BrotherForm::named("Ali")).await.unwrap();
        assert!(!ali.id.starts_with("pending-"));
        assert_eq!(service.state().items, vec![ali.clone()]);

        let updated = service
            .update_brother(
                &ali.id,
                &BrotherUpdate {
                    location: Some("Leeds".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.location.as_deref(), Some("Leeds"));
        assert_eq!(service.search("leeds").len(), 1);

        let stats = service.statistics();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.urgent, 1);
    }

    #[tokio::test]
    async fn test_invalid_form_leaves_list_untouched() {
        let (service, _auth) = create_test_service().await;

        let err = service
            .add_brother(&BrotherForm::named("   "))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid-argument");
        assert!(service.state().items.is_empty());
    }

    #[tokio::test]
    async fn test_delete_requires_exact_name() {
        let (service, _auth) = create_test_service().await;
        let ali = service.add_brother(&BrotherForm::named("Ali Khan")).await.unwrap();

        let err = service.delete_brother(&ali.id, "ali khan").await.unwrap_err();
        assert_eq!(err.code(), "invalid-argument");
        assert_eq!(service.state().items.len(), 1);

        service.delete_brother(&ali.id, "Ali Khan").await.unwrap();
        assert!(service.state().items.is_empty());
    }

    #[tokio::test]
    async fn test_signed_out_user_cannot_add() {
        let (service, auth) = create_test_service().await;
        auth.sign_out();
        service.bind_current_user().await;

        let err = service
            .add_brother(&BrotherForm::named("Ali"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "unauthenticated");
        assert!(!service.state().loading);
    }
}
