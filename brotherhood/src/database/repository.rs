//! Repository layer for typed document access
//!
//! Every operation takes the acting user and is checked against the access
//! policy before anything is read or written. Read-check-write sequences
//! (responding to a dua, liking a post, recording goal progress) run inside
//! a single store transaction.

use super::models::*;
use super::paths::{CollectionPath, DocPath};
use super::store::{to_fields, Direction, Document, DocumentStore, Patch, Query};
use crate::auth::CurrentUser;
use crate::error::{AppError, Result};
use crate::policy::{authorize, require_user, Action, Resource};
use crate::validation::{
    validate_announcement, validate_answer_note, validate_brother_update, validate_comment,
    validate_dua_text, validate_goal_update, validate_interaction, validate_new_goal,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

fn timestamp(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Report a document the store could not find under its model name
fn missing<'a>(kind: &'static str, id: &'a str) -> impl FnOnce(AppError) -> AppError + 'a {
    move |e| match e {
        AppError::NotFound { kind: "Document", .. } => AppError::not_found(kind, id),
        other => other,
    }
}

fn decode_all<T: DeserializeOwned>(docs: Vec<Document>) -> Result<Vec<T>> {
    docs.iter().map(|doc| doc.decode()).collect()
}

fn owned<'u>(
    actor: Option<&'u CurrentUser>,
    action: Action,
    owner_id: &str,
) -> Result<&'u CurrentUser> {
    authorize(actor, action, Resource::Owned { owner_id })
}

/// Repository for policy-checked document operations
#[derive(Clone)]
pub struct Repository {
    store: DocumentStore,
}

impl Repository {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    async fn fetch<T: DeserializeOwned>(&self, kind: &'static str, path: &DocPath) -> Result<T> {
        self.store
            .get(path)
            .await?
            .ok_or_else(|| AppError::not_found(kind, path.id.clone()))?
            .decode()
    }

    // ===== Queries for live bindings =====

    /// A user's brothers, alphabetical
    pub fn brothers_query(owner_id: &str) -> Query {
        Query::collection(CollectionPath::brothers(owner_id)).order_by("name", Direction::Ascending)
    }

    /// Contact history with one brother, newest first
    pub fn interactions_query(owner_id: &str, brother_id: &str) -> Query {
        Query::collection(CollectionPath::interactions(owner_id))
            .where_eq("brotherId", brother_id)
            .order_by("date", Direction::Descending)
    }

    pub fn goals_query(owner_id: &str) -> Query {
        Query::collection(CollectionPath::goals(owner_id))
            .order_by("createdAt", Direction::Ascending)
    }

    /// The shared dua feed, newest first
    pub fn duas_query() -> Query {
        Query::collection(CollectionPath::dua_requests())
            .order_by("createdAt", Direction::Descending)
    }

    pub fn announcements_query() -> Query {
        Query::collection(CollectionPath::announcements())
            .order_by("createdAt", Direction::Descending)
    }

    // ===== Brother Operations =====

    /// Add a brother to the owner's directory
    pub async fn create_brother(
        &self,
        actor: Option<&CurrentUser>,
        owner_id: &str,
        brother: NewBrother,
    ) -> Result<Brother> {
        owned(actor, Action::Create, owner_id)?;

        if brother.name.trim().is_empty() {
            return Err(AppError::Validation("Name is required".to_string()));
        }

        let collection = CollectionPath::brothers(owner_id);
        let id = self.store.create(&collection, to_fields(&brother)?).await?;

        tracing::debug!("Created brother: {}", id);
        self.fetch("Brother", &collection.doc(&id)).await
    }

    pub async fn get_brother(
        &self,
        actor: Option<&CurrentUser>,
        owner_id: &str,
        id: &str,
    ) -> Result<Brother> {
        owned(actor, Action::Read, owner_id)?;
        self.fetch("Brother", &CollectionPath::brothers(owner_id).doc(id))
            .await
    }

    pub async fn list_brothers(
        &self,
        actor: Option<&CurrentUser>,
        owner_id: &str,
    ) -> Result<Vec<Brother>> {
        owned(actor, Action::Read, owner_id)?;
        decode_all(self.store.query(&Self::brothers_query(owner_id)).await?)
    }

    /// Apply a partial edit; empty strings clear optional fields
    pub async fn update_brother(
        &self,
        actor: Option<&CurrentUser>,
        owner_id: &str,
        id: &str,
        update: &BrotherUpdate,
    ) -> Result<Brother> {
        owned(actor, Action::Update, owner_id)?;
        validate_brother_update(update)?;

        let mut patch = Patch::new();
        if let Some(name) = &update.name {
            patch = patch.set("name", name.trim());
        }
        for (field, value) in [
            ("email", &update.email),
            ("phone", &update.phone),
            ("location", &update.location),
            ("notes", &update.notes),
        ] {
            match value.as_deref().map(str::trim) {
                Some("") => patch = patch.delete(field),
                Some(value) => patch = patch.set(field, value),
                None => {}
            }
        }
        if let Some(prefs) = &update.contact_preferences {
            patch = patch.set("contactPreferences", serde_json::to_value(prefs)?);
        }

        let doc = self
            .store
            .update(&CollectionPath::brothers(owner_id).doc(id), patch)
            .await
            .map_err(missing("Brother", id))?;

        tracing::debug!("Updated brother: {}", id);
        doc.decode()
    }

    /// Delete a brother together with their contact history
    pub async fn delete_brother(
        &self,
        actor: Option<&CurrentUser>,
        owner_id: &str,
        id: &str,
    ) -> Result<()> {
        owned(actor, Action::Delete, owner_id)?;

        self.store
            .delete(&CollectionPath::brothers(owner_id).doc(id))
            .await
            .map_err(missing("Brother", id))?;

        let history = self
            .store
            .query(
                &Query::collection(CollectionPath::interactions(owner_id))
                    .where_eq("brotherId", id),
            )
            .await?;
        for doc in &history {
            self.store.delete(&doc.path()).await?;
        }

        tracing::debug!(
            "Deleted brother: {} ({} interactions removed)",
            id,
            history.len()
        );
        Ok(())
    }

    // ===== Interaction Operations =====

    /// Log a contact and advance the brother's last-contact stamp when the
    /// new entry is the most recent one.
    pub async fn record_interaction(
        &self,
        actor: Option<&CurrentUser>,
        owner_id: &str,
        interaction: NewInteraction,
    ) -> Result<Interaction> {
        owned(actor, Action::Create, owner_id)?;
        validate_interaction(&interaction)?;

        let brother_path = CollectionPath::brothers(owner_id).doc(&interaction.brother_id);
        if self.store.get(&brother_path).await?.is_none() {
            return Err(AppError::not_found("Brother", interaction.brother_id.clone()));
        }

        let date = interaction.date.unwrap_or_else(|| self.store.now());
        let method = interaction.method;
        let record = NewInteraction {
            date: Some(date),
            notes: interaction
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            ..interaction
        };

        let collection = CollectionPath::interactions(owner_id);
        let id = self.store.create(&collection, to_fields(&record)?).await?;

        self.store
            .transact(&brother_path, |doc| {
                let brother: Brother = doc.decode()?;
                if brother.last_contact.map_or(true, |last| date >= last) {
                    Ok(Patch::new()
                        .set("lastContact", timestamp(date))
                        .set("lastContactMethod", method.as_str()))
                } else {
                    Ok(Patch::new())
                }
            })
            .await
            .map_err(missing("Brother", &record.brother_id))?;

        tracing::debug!("Recorded interaction {} for brother {}", id, record.brother_id);
        self.fetch("Interaction", &collection.doc(&id)).await
    }

    pub async fn list_interactions(
        &self,
        actor: Option<&CurrentUser>,
        owner_id: &str,
        brother_id: &str,
    ) -> Result<Vec<Interaction>> {
        owned(actor, Action::Read, owner_id)?;
        decode_all(
            self.store
                .query(&Self::interactions_query(owner_id, brother_id))
                .await?,
        )
    }

    // ===== Goal Operations =====

    pub async fn create_goal(
        &self,
        actor: Option<&CurrentUser>,
        owner_id: &str,
        goal: NewGoal,
    ) -> Result<Goal> {
        owned(actor, Action::Create, owner_id)?;
        validate_new_goal(&goal)?;

        let goal = NewGoal {
            title: goal.title.trim().to_string(),
            description: goal
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            ..goal
        };
        let mut fields = to_fields(&goal)?;
        fields.insert("progress".to_string(), Value::from(0));
        fields.insert("streak".to_string(), Value::from(0));

        let collection = CollectionPath::goals(owner_id);
        let id = self.store.create(&collection, fields).await?;

        tracing::debug!("Created goal: {}", id);
        self.fetch("Goal", &collection.doc(&id)).await
    }

    pub async fn get_goal(
        &self,
        actor: Option<&CurrentUser>,
        owner_id: &str,
        id: &str,
    ) -> Result<Goal> {
        owned(actor, Action::Read, owner_id)?;
        self.fetch("Goal", &CollectionPath::goals(owner_id).doc(id)).await
    }

    pub async fn list_goals(
        &self,
        actor: Option<&CurrentUser>,
        owner_id: &str,
    ) -> Result<Vec<Goal>> {
        owned(actor, Action::Read, owner_id)?;
        decode_all(self.store.query(&Self::goals_query(owner_id)).await?)
    }

    /// Edit a goal; the new target may not drop below stored progress
    pub async fn update_goal(
        &self,
        actor: Option<&CurrentUser>,
        owner_id: &str,
        id: &str,
        update: &GoalUpdate,
    ) -> Result<Goal> {
        owned(actor, Action::Update, owner_id)?;

        let doc = self
            .store
            .transact(&CollectionPath::goals(owner_id).doc(id), |doc| {
                let goal: Goal = doc.decode()?;
                validate_goal_update(update, goal.progress)?;

                let mut patch = Patch::new();
                if let Some(title) = &update.title {
                    patch = patch.set("title", title.trim());
                }
                match update.description.as_deref().map(str::trim) {
                    Some("") => patch = patch.delete("description"),
                    Some(description) => patch = patch.set("description", description),
                    None => {}
                }
                if let Some(target) = update.target {
                    patch = patch.set("target", target);
                }
                if let Some(frequency) = update.frequency {
                    patch = patch.set("frequency", serde_json::to_value(frequency)?);
                }
                Ok(patch)
            })
            .await
            .map_err(missing("Goal", id))?;

        tracing::debug!("Updated goal: {}", id);
        doc.decode()
    }

    pub async fn delete_goal(
        &self,
        actor: Option<&CurrentUser>,
        owner_id: &str,
        id: &str,
    ) -> Result<()> {
        owned(actor, Action::Delete, owner_id)?;
        self.store
            .delete(&CollectionPath::goals(owner_id).doc(id))
            .await
            .map_err(missing("Goal", id))?;
        tracing::debug!("Deleted goal: {}", id);
        Ok(())
    }

    /// Record one unit of progress for the current period
    pub async fn record_goal_progress(
        &self,
        actor: Option<&CurrentUser>,
        owner_id: &str,
        id: &str,
    ) -> Result<Goal> {
        owned(actor, Action::Update, owner_id)?;
        let now = self.store.now();

        let doc = self
            .store
            .transact(&CollectionPath::goals(owner_id).doc(id), |doc| {
                let goal: Goal = doc.decode()?;
                let next = goal.next_progress(now).ok_or_else(|| {
                    AppError::FailedPrecondition(
                        "This goal is already complete for this period".to_string(),
                    )
                })?;
                Ok(Patch::new()
                    .set("progress", next.progress)
                    .set("streak", next.streak)
                    .set("lastCompleted", timestamp(now)))
            })
            .await
            .map_err(missing("Goal", id))?;

        tracing::debug!("Recorded progress on goal: {}", id);
        doc.decode()
    }

    // ===== Dua Request Operations =====

    /// Post a dua request to the shared feed
    pub async fn create_dua(
        &self,
        actor: Option<&CurrentUser>,
        request: NewDuaRequest,
    ) -> Result<DuaRequest> {
        let user = require_user(actor)?;
        let text = validate_dua_text(&request.text)?;

        let fields = to_fields(&serde_json::json!({
            "text": text,
            "isUrgent": request.is_urgent,
            "isAnonymous": request.is_anonymous,
            "authorId": user.uid,
            "authorName": user.name(),
            "responses": [],
            "responseCount": 0,
            "isAnswered": false,
            "editCount": 0,
        }))?;

        let collection = CollectionPath::dua_requests();
        let id = self.store.create(&collection, fields).await?;

        tracing::debug!("Created dua request: {}", id);
        self.fetch("Dua request", &collection.doc(&id)).await
    }

    pub async fn get_dua(&self, actor: Option<&CurrentUser>, id: &str) -> Result<DuaRequest> {
        require_user(actor)?;
        self.fetch("Dua request", &CollectionPath::dua_requests().doc(id))
            .await
    }

    pub async fn list_duas(&self, actor: Option<&CurrentUser>) -> Result<Vec<DuaRequest>> {
        require_user(actor)?;
        decode_all(self.store.query(&Self::duas_query()).await?)
    }

    /// Author-only edit of an unanswered request
    pub async fn edit_dua(
        &self,
        actor: Option<&CurrentUser>,
        id: &str,
        text: &str,
        is_urgent: Option<bool>,
    ) -> Result<DuaRequest> {
        require_user(actor)?;
        let now = self.store.now();

        let doc = self
            .store
            .transact(&CollectionPath::dua_requests().doc(id), |doc| {
                let dua: DuaRequest = doc.decode()?;
                authorize(
                    actor,
                    Action::Update,
                    Resource::Authored {
                        author_id: &dua.author_id,
                    },
                )?;
                if dua.is_answered {
                    return Err(AppError::FailedPrecondition(
                        "Answered dua requests can no longer be edited".to_string(),
                    ));
                }
                let text = validate_dua_text(text)?;

                let mut patch = Patch::new()
                    .set("text", text)
                    .increment("editCount", 1)
                    .set("lastEditedAt", timestamp(now));
                if let Some(urgent) = is_urgent {
                    patch = patch.set("isUrgent", urgent);
                }
                Ok(patch)
            })
            .await
            .map_err(missing("Dua request", id))?;

        tracing::debug!("Edited dua request: {}", id);
        doc.decode()
    }

    pub async fn delete_dua(&self, actor: Option<&CurrentUser>, id: &str) -> Result<()> {
        require_user(actor)?;
        let path = CollectionPath::dua_requests().doc(id);
        let dua: DuaRequest = self.fetch("Dua request", &path).await?;
        authorize(
            actor,
            Action::Delete,
            Resource::Authored {
                author_id: &dua.author_id,
            },
        )?;

        self.store.delete(&path).await.map_err(missing("Dua request", id))?;
        tracing::debug!("Deleted dua request: {}", id);
        Ok(())
    }

    /// Say Ameen to a request, at most once per user
    pub async fn respond_dua(&self, actor: Option<&CurrentUser>, id: &str) -> Result<DuaRequest> {
        let user = require_user(actor)?;

        let doc = self
            .store
            .transact(&CollectionPath::dua_requests().doc(id), |doc| {
                let dua: DuaRequest = doc.decode()?;
                authorize(
                    actor,
                    Action::Respond,
                    Resource::Authored {
                        author_id: &dua.author_id,
                    },
                )?;
                if dua.has_responded(&user.uid) {
                    return Err(AppError::AlreadyExists(
                        "You have already said Ameen for this request".to_string(),
                    ));
                }
                Ok(Patch::new()
                    .array_union("responses", user.uid.as_str())
                    .increment("responseCount", 1))
            })
            .await
            .map_err(missing("Dua request", id))?;

        tracing::debug!("User {} responded to dua request {}", user.uid, id);
        doc.decode()
    }

    /// Author marks their request answered, with an optional note
    pub async fn mark_dua_answered(
        &self,
        actor: Option<&CurrentUser>,
        id: &str,
        note: Option<&str>,
    ) -> Result<DuaRequest> {
        require_user(actor)?;
        let note = validate_answer_note(note)?;
        let now = self.store.now();

        let doc = self
            .store
            .transact(&CollectionPath::dua_requests().doc(id), |doc| {
                let dua: DuaRequest = doc.decode()?;
                authorize(
                    actor,
                    Action::Update,
                    Resource::Authored {
                        author_id: &dua.author_id,
                    },
                )?;
                if dua.is_answered {
                    return Err(AppError::FailedPrecondition(
                        "This dua request is already marked answered".to_string(),
                    ));
                }

                let mut patch = Patch::new()
                    .set("isAnswered", true)
                    .set("answeredAt", timestamp(now));
                if let Some(note) = note {
                    patch = patch.set("answerNote", note);
                }
                Ok(patch)
            })
            .await
            .map_err(missing("Dua request", id))?;

        tracing::info!("Dua request answered: {}", id);
        doc.decode()
    }

    // ===== Announcement Operations =====

    pub async fn create_announcement(
        &self,
        actor: Option<&CurrentUser>,
        announcement: NewAnnouncement,
    ) -> Result<Announcement> {
        let user = require_user(actor)?;
        let (title, content) = validate_announcement(&announcement.title, &announcement.content)?;

        let fields = to_fields(&serde_json::json!({
            "title": title,
            "content": content,
            "type": announcement.kind,
            "authorId": user.uid,
            "authorName": user.name(),
            "likes": 0,
            "likedBy": [],
            "comments": [],
        }))?;

        let collection = CollectionPath::announcements();
        let id = self.store.create(&collection, fields).await?;

        tracing::debug!("Created announcement: {}", id);
        self.fetch("Announcement", &collection.doc(&id)).await
    }

    pub async fn list_announcements(
        &self,
        actor: Option<&CurrentUser>,
    ) -> Result<Vec<Announcement>> {
        require_user(actor)?;
        decode_all(self.store.query(&Self::announcements_query()).await?)
    }

    pub async fn update_announcement(
        &self,
        actor: Option<&CurrentUser>,
        id: &str,
        update: &AnnouncementUpdate,
    ) -> Result<Announcement> {
        require_user(actor)?;

        let doc = self
            .store
            .transact(&CollectionPath::announcements().doc(id), |doc| {
                let current: Announcement = doc.decode()?;
                authorize(
                    actor,
                    Action::Update,
                    Resource::Authored {
                        author_id: &current.author_id,
                    },
                )?;

                let (title, content) = validate_announcement(
                    update.title.as_deref().unwrap_or(&current.title),
                    update.content.as_deref().unwrap_or(&current.content),
                )?;
                let mut patch = Patch::new().set("title", title).set("content", content);
                if let Some(kind) = update.kind {
                    patch = patch.set("type", serde_json::to_value(kind)?);
                }
                Ok(patch)
            })
            .await
            .map_err(missing("Announcement", id))?;

        tracing::debug!("Updated announcement: {}", id);
        doc.decode()
    }

    pub async fn delete_announcement(&self, actor: Option<&CurrentUser>, id: &str) -> Result<()> {
        require_user(actor)?;
        let path = CollectionPath::announcements().doc(id);
        let announcement: Announcement = self.fetch("Announcement", &path).await?;
        authorize(
            actor,
            Action::Delete,
            Resource::Authored {
                author_id: &announcement.author_id,
            },
        )?;

        self.store.delete(&path).await.map_err(missing("Announcement", id))?;
        tracing::debug!("Deleted announcement: {}", id);
        Ok(())
    }

    /// Like the post, or take the like back if already given
    pub async fn toggle_like(&self, actor: Option<&CurrentUser>, id: &str) -> Result<Announcement> {
        let user = require_user(actor)?;

        let doc = self
            .store
            .transact(&CollectionPath::announcements().doc(id), |doc| {
                let announcement: Announcement = doc.decode()?;
                authorize(
                    actor,
                    Action::React,
                    Resource::Authored {
                        author_id: &announcement.author_id,
                    },
                )?;
                if announcement.is_liked_by(&user.uid) {
                    Ok(Patch::new()
                        .array_remove("likedBy", user.uid.as_str())
                        .increment("likes", -1))
                } else {
                    Ok(Patch::new()
                        .array_union("likedBy", user.uid.as_str())
                        .increment("likes", 1))
                }
            })
            .await
            .map_err(missing("Announcement", id))?;

        doc.decode()
    }

    pub async fn add_comment(
        &self,
        actor: Option<&CurrentUser>,
        id: &str,
        text: &str,
    ) -> Result<Announcement> {
        let user = require_user(actor)?;
        let text = validate_comment(text)?;
        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            author_id: user.uid.clone(),
            author_name: user.name().to_string(),
            text,
            timestamp: self.store.now(),
        };
        let value = serde_json::to_value(&comment)?;

        let doc = self
            .store
            .transact(&CollectionPath::announcements().doc(id), |doc| {
                let author_id = doc.str_field("authorId").unwrap_or_default();
                authorize(actor, Action::Comment, Resource::Authored { author_id })?;
                Ok(Patch::new().array_union("comments", value))
            })
            .await
            .map_err(missing("Announcement", id))?;

        tracing::debug!("Comment {} added to announcement {}", comment.id, id);
        doc.decode()
    }

    /// Remove a comment; allowed for its author and the post's author
    pub async fn delete_comment(
        &self,
        actor: Option<&CurrentUser>,
        announcement_id: &str,
        comment_id: &str,
    ) -> Result<Announcement> {
        require_user(actor)?;

        let doc = self
            .store
            .transact(&CollectionPath::announcements().doc(announcement_id), |doc| {
                let announcement: Announcement = doc.decode()?;
                let comment = announcement
                    .comments
                    .iter()
                    .find(|c| c.id == comment_id)
                    .ok_or_else(|| AppError::not_found("Comment", comment_id))?;

                authorize(
                    actor,
                    Action::Delete,
                    Resource::Authored {
                        author_id: &comment.author_id,
                    },
                )
                .or_else(|_| {
                    authorize(
                        actor,
                        Action::Delete,
                        Resource::Authored {
                            author_id: &announcement.author_id,
                        },
                    )
                })?;

                // Filter the stored values so the removal never depends on
                // re-serializing the decoded comment
                let remaining: Vec<Value> = doc
                    .data
                    .get("comments")
                    .and_then(Value::as_array)
                    .map(|all| {
                        all.iter()
                            .filter(|c| c.get("id").and_then(Value::as_str) != Some(comment_id))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(Patch::new().set("comments", remaining))
            })
            .await
            .map_err(missing("Announcement", announcement_id))?;

        tracing::debug!("Comment {} removed from announcement {}", comment_id, announcement_id);
        doc.decode()
    }
}
