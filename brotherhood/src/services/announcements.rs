//! Announcements service
//!
//! The community board: posts, likes and comments.

use crate::auth::AuthSession;
use crate::clock::Clock;
use crate::database::{Announcement, AnnouncementUpdate, Comment, NewAnnouncement, Repository};
use crate::error::Result;
use crate::sync::{ListState, LiveCollection};
use crate::validation::{validate_announcement, validate_comment};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Clone)]
pub struct AnnouncementsService {
    repo: Repository,
    auth: AuthSession,
    clock: Arc<dyn Clock>,
    posts: LiveCollection<Announcement>,
}

impl AnnouncementsService {
    pub fn new(repo: Repository, auth: AuthSession, clock: Arc<dyn Clock>) -> Self {
        let posts = LiveCollection::new(repo.store().clone());
        Self {
            repo,
            auth,
            clock,
            posts,
        }
    }

    pub async fn bind_current_user(&self) {
        let query = self.auth.current().map(|_| Repository::announcements_query());
        self.posts.bind(query).await;
    }

    pub fn state(&self) -> ListState<Announcement> {
        self.posts.state()
    }

    pub fn watch(&self) -> watch::Receiver<u64> {
        self.posts.watch()
    }

    pub async fn post(&self, announcement: NewAnnouncement) -> Result<Announcement> {
        let user = self.auth.require_user()?;
        let (title, content) = validate_announcement(&announcement.title, &announcement.content)?;

        let now = self.clock.now();
        let mutation = self.posts.begin_insert(Announcement {
            id: format!("pending-{}", Uuid::new_v4()),
            title,
            content,
            kind: announcement.kind,
            author_id: user.uid.clone(),
            author_name: user.name().to_string(),
            likes: 0,
            liked_by: Vec::new(),
            comments: Vec::new(),
            created_at: now,
            updated_at: now,
        });

        tracing::info!("Posting announcement");
        self.posts
            .commit_upsert(
                Some(mutation),
                self.repo.create_announcement(Some(&user), announcement),
            )
            .await
    }

    pub async fn edit(&self, id: &str, update: &AnnouncementUpdate) -> Result<Announcement> {
        let user = self.auth.require_user()?;

        let mutation = self
            .posts
            .get(id)
            .filter(|post| post.author_id == user.uid)
            .map(|mut post| {
                update.apply_to(&mut post);
                self.posts.begin_replace(post)
            });

        tracing::info!("Editing announcement: {}", id);
        self.posts
            .commit_upsert(mutation, self.repo.update_announcement(Some(&user), id, update))
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let user = self.auth.require_user()?;

        let mutation = self
            .posts
            .get(id)
            .filter(|post| post.author_id == user.uid)
            .map(|_| self.posts.begin_remove(id));

        tracing::info!("Deleting announcement: {}", id);
        self.posts
            .commit_remove(mutation, self.repo.delete_announcement(Some(&user), id))
            .await
    }

    pub async fn toggle_like(&self, id: &str) -> Result<Announcement> {
        let user = self.auth.require_user()?;

        let mutation = self.posts.get(id).map(|mut post| {
            if post.is_liked_by(&user.uid) {
                post.liked_by.retain(|uid| uid != &user.uid);
                post.likes = post.likes.saturating_sub(1);
            } else {
                post.liked_by.push(user.uid.clone());
                post.likes += 1;
            }
            self.posts.begin_replace(post)
        });

        self.posts
            .commit_upsert(mutation, self.repo.toggle_like(Some(&user), id))
            .await
    }

    pub async fn add_comment(&self, id: &str, text: &str) -> Result<Announcement> {
        let user = self.auth.require_user()?;
        let text = validate_comment(text)?;

        let mutation = self.posts.get(id).map(|mut post| {
            post.comments.push(Comment {
                id: format!("pending-{}", Uuid::new_v4()),
                author_id: user.uid.clone(),
                author_name: user.name().to_string(),
                text: text.clone(),
                timestamp: self.clock.now(),
            });
            self.posts.begin_replace(post)
        });

        self.posts
            .commit_upsert(mutation, self.repo.add_comment(Some(&user), id, &text))
            .await
    }

    pub async fn delete_comment(&self, id: &str, comment_id: &str) -> Result<Announcement> {
        let user = self.auth.require_user()?;

        let mutation = self
            .posts
            .get(id)
            .filter(|post| {
                post.author_id == user.uid
                    || post
                        .comments
                        .iter()
                        .any(|c| c.id == comment_id && c.author_id == user.uid)
            })
            .map(|mut post| {
                post.comments.retain(|c| c.id != comment_id);
                self.posts.begin_replace(post)
            });

        self.posts
            .commit_upsert(
                mutation,
                self.repo.delete_comment(Some(&user), id, comment_id),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CurrentUser;
    use crate::database::{create_memory_pool, AnnouncementType, DocumentStore};
    use crate::clock::SystemClock;

    #[tokio::test]
    async fn test_like_toggle_and_comment() {
        let store = DocumentStore::new(create_memory_pool().await.unwrap());
        let auth = AuthSession::new();
        auth.sign_in(CurrentUser::new("u1", "Yusuf"));
        let service =
            AnnouncementsService::new(Repository::new(store), auth.clone(), Arc::new(SystemClock));
        service.bind_current_user().await;

        let post = service
            .post(NewAnnouncement {
                title: "Halaqa on Thursday".to_string(),
                content: "After Isha at the community centre".to_string(),
                kind: AnnouncementType::Event,
            })
            .await
            .unwrap();

        auth.sign_in(CurrentUser::new("u2", "Idris"));
        assert_eq!(service.toggle_like(&post.id).await.unwrap().likes, 1);
        assert_eq!(service.toggle_like(&post.id).await.unwrap().likes, 0);

        let err = service.add_comment(&post.id, "   ").await.unwrap_err();
        assert_eq!(err.code(), "invalid-argument");

        let commented = service.add_comment(&post.id, "I'll be there").await.unwrap();
        assert_eq!(commented.comments.len(), 1);
        assert_eq!(service.state().items[0].comments[0].text, "I'll be there");

        let err = service.delete(&post.id).await.unwrap_err();
        assert_eq!(err.code(), "permission-denied");
        assert_eq!(service.state().items.len(), 1);
    }
}
