//! Interactions service
//!
//! Logs contacts with brothers and keeps the contact history of the
//! brother currently on screen live.

use crate::auth::AuthSession;
use crate::clock::Clock;
use crate::database::{Interaction, NewInteraction, Repository};
use crate::error::Result;
use crate::sync::{ListState, LiveCollection};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Clone)]
pub struct InteractionsService {
    repo: Repository,
    auth: AuthSession,
    clock: Arc<dyn Clock>,
    history: LiveCollection<Interaction>,
    /// Brother whose history is bound
    brother_id: Arc<Mutex<Option<String>>>,
}

impl InteractionsService {
    pub fn new(repo: Repository, auth: AuthSession, clock: Arc<dyn Clock>) -> Self {
        let history = LiveCollection::new(repo.store().clone());
        Self {
            repo,
            auth,
            clock,
            history,
            brother_id: Arc::new(Mutex::new(None)),
        }
    }

    fn bound_brother(&self) -> Option<String> {
        self.brother_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Show the contact history of one brother, newest first
    pub async fn bind_history(&self, brother_id: Option<&str>) {
        *self.brother_id.lock().unwrap_or_else(|e| e.into_inner()) =
            brother_id.map(str::to_string);

        let query = match (self.auth.current(), brother_id) {
            (Some(user), Some(brother_id)) => {
                Some(Repository::interactions_query(&user.uid, brother_id))
            }
            _ => None,
        };
        self.history.bind(query).await;
    }

    /// Re-bind the same brother for whoever is signed in now
    pub async fn bind_current_user(&self) {
        let brother_id = self.bound_brother();
        self.bind_history(brother_id.as_deref()).await;
    }

    pub fn state(&self) -> ListState<Interaction> {
        self.history.state()
    }

    pub fn watch(&self) -> watch::Receiver<u64> {
        self.history.watch()
    }

    /// Log a contact; the brother's last-contact stamp follows
    pub async fn record(&self, interaction: NewInteraction) -> Result<Interaction> {
        let user = self.auth.require_user()?;

        let mutation = (self.bound_brother().as_deref() == Some(interaction.brother_id.as_str()))
            .then(|| {
                let now = self.clock.now();
                self.history.begin_insert(Interaction {
                    id: format!("pending-{}", Uuid::new_v4()),
                    brother_id: interaction.brother_id.clone(),
                    method: interaction.method,
                    date: interaction.date.unwrap_or(now),
                    notes: interaction.notes.clone(),
                    rating: interaction.rating,
                    created_at: now,
                    updated_at: now,
                })
            });

        tracing::info!(
            "Recording {} with brother {}",
            interaction.method,
            interaction.brother_id
        );
        self.history
            .commit_upsert(
                mutation,
                self.repo
                    .record_interaction(Some(&user), &user.uid, interaction),
            )
            .await
    }

    /// One-shot history fetch, independent of the bound view
    pub async fn list_for(&self, brother_id: &str) -> Result<Vec<Interaction>> {
        let user = self.auth.require_user()?;
        self.repo
            .list_interactions(Some(&user), &user.uid, brother_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CurrentUser;
    use crate::clock::ManualClock;
    use crate::database::{create_memory_pool, ContactMethod, DocumentStore};
    use crate::validation::BrotherForm;
    use chrono::{Duration, TimeZone, Utc};

    #[tokio::test]
    async fn test_record_updates_history_and_last_contact() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let store = DocumentStore::with_clock(
            create_memory_pool().await.unwrap(),
            Arc::new(clock.clone()),
        );
        let repo = Repository::new(store);
        let auth = AuthSession::new();
        let me = CurrentUser::new("u1", "Yusuf");
        auth.sign_in(me.clone());

        let ali = repo
            .create_brother(Some(&me), "u1", BrotherForm::named("Ali").validate().unwrap())
            .await
            .unwrap();

        let service = InteractionsService::new(repo.clone(), auth, Arc::new(clock.clone()));
        service.bind_history(Some(&ali.id)).await;
        assert!(service.state().items.is_empty());

        clock.advance(Duration::hours(1));
        let logged = service
            .record(NewInteraction {
                brother_id: ali.id.clone(),
                method: ContactMethod::Whatsapp,
                date: None,
                notes: None,
                rating: Some(4),
            })
            .await
            .unwrap();

        assert_eq!(service.state().items, vec![logged.clone()]);
        assert_eq!(service.list_for(&ali.id).await.unwrap().len(), 1);

        let ali = repo.get_brother(Some(&me), "u1", &ali.id).await.unwrap();
        assert_eq!(ali.last_contact, Some(logged.date));
        assert_eq!(ali.last_contact_method, Some(ContactMethod::Whatsapp));
    }
}
