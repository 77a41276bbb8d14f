//! Integration tests for Brotherhood
//!
//! These tests verify end-to-end functionality including:
//! - On-disk document store and live snapshots
//! - Dua feed rules across users
//! - Goal progress bounds
//! - Notification read and dismissal lifecycle

use brotherhood::app::AppState;
use brotherhood::auth::CurrentUser;
use brotherhood::clock::ManualClock;
use brotherhood::database::{
    create_pool, Brother, Frequency, GoalType, GoalUpdate, NewDuaRequest, NewGoal, Repository,
    Snapshot,
};
use brotherhood::services::{NewNotification, NotificationKind};
use brotherhood::storage::LocalStore;
use brotherhood::validation::BrotherForm;
use brotherhood::views::ContactStatus;
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Helper to build the whole application over a temp directory
async fn create_test_app() -> (AppState, ManualClock, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap());

    let pool = create_pool(&temp_dir.path().join("test.db")).await.unwrap();
    let local_store = LocalStore::new(temp_dir.path().join("local"));
    local_store.initialize().await.unwrap();

    let state = AppState::assemble(
        temp_dir.path().to_path_buf(),
        pool,
        local_store,
        Arc::new(clock.clone()),
    );
    state.auth.sign_in(CurrentUser::new("u1", "Yusuf"));
    state.bind_all().await;

    (state, clock, temp_dir)
}

fn dua(text: &str) -> NewDuaRequest {
    NewDuaRequest {
        text: text.to_string(),
        is_urgent: false,
        is_anonymous: false,
    }
}

#[tokio::test]
async fn test_added_brother_appears_in_next_snapshot() {
    let (state, _clock, _temp) = create_test_app().await;

    let (tx, mut rx) = mpsc::unbounded_channel::<Snapshot>();
    let subscription = state.store.subscribe(
        Repository::brothers_query("u1"),
        move |snapshot| {
            let _ = tx.send(snapshot);
        },
        |e| panic!("subscription failed: {}", e),
    );

    let created = state
        .brothers
        .add_brother(&BrotherForm::named("Test Brother"))
        .await
        .unwrap();
    assert!(created.email.is_none());

    let seen = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            let snapshot = rx.recv().await.unwrap();
            if let Some(doc) = snapshot.documents.into_iter().next() {
                return doc;
            }
        }
    })
    .await
    .unwrap();

    let brother: Brother = seen.decode().unwrap();
    assert_eq!(brother.name, "Test Brother");
    assert_eq!(brother.id, created.id);
    assert!(!brother.id.is_empty());
    assert!(seen.field("createdAt").is_some());
    assert!(seen.field("updatedAt").is_some());
    assert!(seen.field("email").is_none());

    subscription.unsubscribe();
}

#[tokio::test]
async fn test_dua_text_rules() {
    let (state, _clock, _temp) = create_test_app().await;

    let too_long = "x".repeat(501);
    for text in [
        "too short",
        too_long.as_str(),
        "<script>alert(1)</script>Please pray for my mother",
    ] {
        let err = state.duas.submit(dua(text)).await.unwrap_err();
        assert_eq!(err.code(), "invalid-argument");
    }
    assert!(state.duas.state().items.is_empty());

    let longest = state.duas.submit(dua(&"y".repeat(500))).await.unwrap();
    assert_eq!(longest.text.len(), 500);
}

#[tokio::test]
async fn test_dua_author_rules_and_single_response() {
    let (state, _clock, _temp) = create_test_app().await;
    let request = state
        .duas
        .submit(dua("Please pray for my brother's recovery"))
        .await
        .unwrap();

    state.auth.sign_in(CurrentUser::new("u2", "Idris"));
    state.bind_all().await;

    let err = state
        .duas
        .edit(&request.id, "Someone else's words here", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "permission-denied");
    let err = state.duas.delete(&request.id).await.unwrap_err();
    assert_eq!(err.code(), "permission-denied");

    let idris = state.auth.require_user().unwrap();
    let stored = state.repo.get_dua(Some(&idris), &request.id).await.unwrap();
    assert_eq!(stored.text, "Please pray for my brother's recovery");
    assert_eq!(stored.edit_count, 0);

    state.duas.respond(&request.id).await.unwrap();
    let err = state.duas.respond(&request.id).await.unwrap_err();
    assert_eq!(err.code(), "already-exists");

    let stored = state.repo.get_dua(Some(&idris), &request.id).await.unwrap();
    assert_eq!(stored.response_count, 1);
    assert_eq!(stored.responses, vec!["u2".to_string()]);
}

#[tokio::test]
async fn test_goal_target_cannot_drop_below_progress() {
    let (state, _clock, _temp) = create_test_app().await;
    let goal = state
        .goals
        .add_goal(NewGoal {
            goal_type: GoalType::Dhikr,
            title: "Morning adhkar".to_string(),
            description: None,
            target: 10,
            frequency: Frequency::Daily,
        })
        .await
        .unwrap();

    for _ in 0..5 {
        state.goals.record_progress(&goal.id).await.unwrap();
    }

    let err = state
        .goals
        .update_goal(
            &goal.id,
            &GoalUpdate {
                target: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid-argument");

    let stored = state
        .repo
        .get_goal(Some(&state.auth.require_user().unwrap()), "u1", &goal.id)
        .await
        .unwrap();
    assert_eq!(stored.target, 10);
    assert_eq!(stored.progress, 5);
}

#[tokio::test]
async fn test_notification_read_then_removed() {
    let (state, clock, _temp) = create_test_app().await;
    let shown = state
        .notifications
        .receive_foreground(NewNotification::new(
            NotificationKind::Announcement,
            "Jumu'ah",
            "Khutbah starts at 1:15",
        ))
        .await
        .unwrap();
    assert_eq!(state.notifications.unread_count().await.unwrap(), 1);

    assert!(state.notifications.mark_as_read(&shown.id).await.unwrap());
    assert_eq!(state.notifications.unread_count().await.unwrap(), 0);
    assert_eq!(state.notifications.list().await.unwrap().len(), 1);

    clock.advance(Duration::seconds(3));
    assert!(state.notifications.list().await.unwrap().is_empty());

    // Survives a restart as an empty list
    assert_eq!(state.notifications.load().await.unwrap(), 0);
}

#[tokio::test]
async fn test_contact_status_buckets() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
    let cases = [
        (35, ContactStatus::Urgent),
        (21, ContactStatus::Good),
        (5, ContactStatus::Recent),
    ];
    for (days, expected) in cases {
        assert_eq!(
            ContactStatus::classify(Some(now - Duration::days(days)), now),
            expected
        );
    }
    assert_eq!(ContactStatus::classify(None, now), ContactStatus::Urgent);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_responses_and_likes_all_land() {
    let (state, _clock, _temp) = create_test_app().await;
    let request = state
        .duas
        .submit(dua("Please pray for the sick in our community"))
        .await
        .unwrap();
    let post = state
        .repo
        .create_announcement(
            Some(&CurrentUser::new("u1", "Yusuf")),
            brotherhood::database::NewAnnouncement {
                title: "Community clean-up".to_string(),
                content: "Saturday morning at the park".to_string(),
                kind: brotherhood::database::AnnouncementType::Event,
            },
        )
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for n in 0..16 {
        let repo = state.repo.clone();
        let dua_id = request.id.clone();
        let post_id = post.id.clone();
        tasks.push(tokio::spawn(async move {
            let brother = CurrentUser::new(format!("b{}", n), format!("Brother {}", n));
            repo.respond_dua(Some(&brother), &dua_id).await?;
            repo.toggle_like(Some(&brother), &post_id).await?;
            Ok::<_, brotherhood::error::AppError>(())
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let me = CurrentUser::new("u1", "Yusuf");
    let stored = state.repo.get_dua(Some(&me), &request.id).await.unwrap();
    assert_eq!(stored.response_count, 16);
    assert_eq!(stored.responses.len(), 16);

    let liked = state.repo.list_announcements(Some(&me)).await.unwrap();
    assert_eq!(liked[0].likes, 16);
    assert_eq!(liked[0].liked_by.len(), 16);
}
