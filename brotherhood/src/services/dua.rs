//! Dua requests service
//!
//! The shared prayer-request feed with optimistic submit, edit, delete,
//! Ameen responses and marking answered.

use crate::auth::AuthSession;
use crate::clock::Clock;
use crate::database::{DuaRequest, NewDuaRequest, Repository};
use crate::error::{AppError, Result};
use crate::sync::{ListState, LiveCollection};
use crate::validation::validate_dua_text;
use crate::views::DuaCard;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Slice of the feed a view shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuaView {
    All,
    Urgent,
    Mine,
    Answered,
}

#[derive(Clone)]
pub struct DuaService {
    repo: Repository,
    auth: AuthSession,
    clock: Arc<dyn Clock>,
    requests: LiveCollection<DuaRequest>,
}

impl DuaService {
    pub fn new(repo: Repository, auth: AuthSession, clock: Arc<dyn Clock>) -> Self {
        let requests = LiveCollection::new(repo.store().clone());
        Self {
            repo,
            auth,
            clock,
            requests,
        }
    }

    /// The feed is shared, but only signed-in users may read it
    pub async fn bind_current_user(&self) {
        let query = self.auth.current().map(|_| Repository::duas_query());
        self.requests.bind(query).await;
    }

    pub fn state(&self) -> ListState<DuaRequest> {
        self.requests.state()
    }

    pub fn watch(&self) -> watch::Receiver<u64> {
        self.requests.watch()
    }

    pub async fn submit(&self, request: NewDuaRequest) -> Result<DuaRequest> {
        let user = self.auth.require_user()?;
        let text = validate_dua_text(&request.text)?;

        let now = self.clock.now();
        let mutation = self.requests.begin_insert(DuaRequest {
            id: format!("pending-{}", Uuid::new_v4()),
            text,
            is_urgent: request.is_urgent,
            is_anonymous: request.is_anonymous,
            author_id: user.uid.clone(),
            author_name: user.name().to_string(),
            responses: Vec::new(),
            response_count: 0,
            is_answered: false,
            answered_at: None,
            answer_note: None,
            edit_count: 0,
            last_edited_at: None,
            created_at: now,
            updated_at: now,
        });

        tracing::info!("Submitting dua request (urgent: {})", request.is_urgent);
        self.requests
            .commit_upsert(Some(mutation), self.repo.create_dua(Some(&user), request))
            .await
    }

    pub async fn edit(&self, id: &str, text: &str, is_urgent: Option<bool>) -> Result<DuaRequest> {
        let user = self.auth.require_user()?;

        let mutation = match (self.requests.get(id), validate_dua_text(text)) {
            (Some(mut dua), Ok(trimmed)) if dua.author_id == user.uid && !dua.is_answered => {
                dua.text = trimmed;
                dua.edit_count += 1;
                dua.last_edited_at = Some(self.clock.now());
                if let Some(urgent) = is_urgent {
                    dua.is_urgent = urgent;
                }
                Some(self.requests.begin_replace(dua))
            }
            _ => None,
        };

        tracing::info!("Editing dua request: {}", id);
        self.requests
            .commit_upsert(mutation, self.repo.edit_dua(Some(&user), id, text, is_urgent))
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let user = self.auth.require_user()?;

        let mutation = self
            .requests
            .get(id)
            .filter(|dua| dua.author_id == user.uid)
            .map(|_| self.requests.begin_remove(id));

        tracing::info!("Deleting dua request: {}", id);
        self.requests
            .commit_remove(mutation, self.repo.delete_dua(Some(&user), id))
            .await
    }

    /// Say Ameen; a second response from the same user is rejected
    pub async fn respond(&self, id: &str) -> Result<DuaRequest> {
        let user = self.auth.require_user()?;

        let mutation = match self.requests.get(id) {
            Some(dua) if dua.has_responded(&user.uid) => {
                return Err(AppError::AlreadyExists(
                    "You have already said Ameen for this request".to_string(),
                ));
            }
            Some(mut dua) => {
                dua.responses.push(user.uid.clone());
                dua.response_count += 1;
                Some(self.requests.begin_replace(dua))
            }
            None => None,
        };

        self.requests
            .commit_upsert(mutation, self.repo.respond_dua(Some(&user), id))
            .await
    }

    pub async fn mark_answered(&self, id: &str, note: Option<&str>) -> Result<DuaRequest> {
        let user = self.auth.require_user()?;

        let mutation = self
            .requests
            .get(id)
            .filter(|dua| dua.author_id == user.uid && !dua.is_answered)
            .map(|mut dua| {
                dua.is_answered = true;
                dua.answered_at = Some(self.clock.now());
                dua.answer_note = note
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string);
                self.requests.begin_replace(dua)
            });

        tracing::info!("Marking dua request answered: {}", id);
        self.requests
            .commit_upsert(mutation, self.repo.mark_dua_answered(Some(&user), id, note))
            .await
    }

    /// Requests in one view, newest first
    pub fn view(&self, view: DuaView) -> Vec<DuaRequest> {
        let uid = self.auth.current().map(|u| u.uid);
        self.requests
            .items()
            .into_iter()
            .filter(|dua| match view {
                DuaView::All => true,
                DuaView::Urgent => dua.is_urgent && !dua.is_answered,
                DuaView::Mine => uid.as_deref() == Some(dua.author_id.as_str()),
                DuaView::Answered => dua.is_answered,
            })
            .collect()
    }

    /// Render a view for the signed-in user
    pub fn cards(&self, view: DuaView) -> Vec<DuaCard> {
        let uid = self.auth.current().map(|u| u.uid);
        self.view(view)
            .iter()
            .map(|dua| DuaCard::render(dua, uid.as_deref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CurrentUser;
    use crate::clock::ManualClock;
    use crate::database::{create_memory_pool, DocumentStore};
    use chrono::{Duration, TimeZone, Utc};

    struct Fixture {
        service: DuaService,
        auth: AuthSession,
        clock: ManualClock,
    }

    async fn create_fixture() -> Fixture {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let store = DocumentStore::with_clock(
            create_memory_pool().await.unwrap(),
            Arc::new(clock.clone()),
        );
        let auth = AuthSession::new();
        auth.sign_in(CurrentUser::new("u1", "Yusuf"));
        let service =
            DuaService::new(Repository::new(store), auth.clone(), Arc::new(clock.clone()));
        service.bind_current_user().await;
        Fixture {
            service,
            auth,
            clock,
        }
    }

    fn request(text: &str, is_urgent: bool) -> NewDuaRequest {
        NewDuaRequest {
            text: text.to_string(),
            is_urgent,
            is_anonymous: false,
        }
    }

    #[tokio::test]
    async fn test_submit_rejects_short_text_without_overlay() {
        let f = create_fixture().await;

        let err = f.service.submit(request("short", false)).await.unwrap_err();
        assert_eq!(err.code(), "invalid-argument");
        assert!(f.service.state().items.is_empty());
    }

    #[tokio::test]
    async fn test_views_and_cards() {
        let f = create_fixture().await;

        f.service
            .submit(request("Please pray for my father's surgery", true))
            .await
            .unwrap();
        f.clock.advance(Duration::minutes(1));
        let mine = f
            .service
            .submit(NewDuaRequest {
                is_anonymous: true,
                ..request("Please pray I find work soon", false)
            })
            .await
            .unwrap();

        assert_eq!(f.service.view(DuaView::All).len(), 2);
        assert_eq!(f.service.view(DuaView::Urgent).len(), 1);
        assert_eq!(f.service.view(DuaView::Mine).len(), 2);

        f.service
            .mark_answered(&mine.id, Some("Got the job, alhamdulillah"))
            .await
            .unwrap();
        let answered = f.service.view(DuaView::Answered);
        assert_eq!(answered.len(), 1);
        assert_eq!(
            answered[0].answer_note.as_deref(),
            Some("Got the job, alhamdulillah")
        );

        let cards = f.service.cards(DuaView::All);
        assert_eq!(cards[0].author, "Anonymous");
        assert_eq!(cards[1].author, "Yusuf");
    }

    #[tokio::test]
    async fn test_other_user_edit_rolls_back() {
        let f = create_fixture().await;
        let dua = f
            .service
            .submit(request("Please pray for my family", false))
            .await
            .unwrap();

        f.auth.sign_in(CurrentUser::new("u2", "Idris"));

        let err = f
            .service
            .edit(&dua.id, "Hijacked text for this dua", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "permission-denied");
        assert_eq!(f.service.state().items[0].text, "Please pray for my family");
        assert_eq!(
            f.service.state().error.as_deref(),
            Some("You don't have permission to do that.")
        );

        let err = f.service.delete(&dua.id).await.unwrap_err();
        assert_eq!(err.code(), "permission-denied");
        assert_eq!(f.service.state().items.len(), 1);
    }

    #[tokio::test]
    async fn test_respond_once() {
        let f = create_fixture().await;
        let dua = f
            .service
            .submit(request("Please pray for my exams", false))
            .await
            .unwrap();

        f.auth.sign_in(CurrentUser::new("u2", "Idris"));
        let updated = f.service.respond(&dua.id).await.unwrap();
        assert_eq!(updated.response_count, 1);

        let err = f.service.respond(&dua.id).await.unwrap_err();
        assert_eq!(err.code(), "already-exists");
        assert_eq!(f.service.state().items[0].response_count, 1);
    }
}
