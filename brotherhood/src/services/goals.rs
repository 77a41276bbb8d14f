//! Goals service
//!
//! Recurring spiritual goals with period-aware progress and streaks.

use crate::auth::AuthSession;
use crate::clock::Clock;
use crate::database::{Frequency, Goal, GoalUpdate, NewGoal, Repository};
use crate::error::Result;
use crate::sync::{ListState, LiveCollection};
use crate::validation::{validate_goal_update, validate_new_goal};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Clone)]
pub struct GoalsService {
    repo: Repository,
    auth: AuthSession,
    clock: Arc<dyn Clock>,
    goals: LiveCollection<Goal>,
}

impl GoalsService {
    pub fn new(repo: Repository, auth: AuthSession, clock: Arc<dyn Clock>) -> Self {
        let goals = LiveCollection::new(repo.store().clone());
        Self {
            repo,
            auth,
            clock,
            goals,
        }
    }

    pub async fn bind_current_user(&self) {
        let query = self.auth.current().map(|user| Repository::goals_query(&user.uid));
        self.goals.bind(query).await;
    }

    pub fn state(&self) -> ListState<Goal> {
        self.goals.state()
    }

    pub fn watch(&self) -> watch::Receiver<u64> {
        self.goals.watch()
    }

    pub async fn add_goal(&self, goal: NewGoal) -> Result<Goal> {
        let user = self.auth.require_user()?;
        validate_new_goal(&goal)?;

        let now = self.clock.now();
        let mutation = self.goals.begin_insert(Goal {
            id: format!("pending-{}", Uuid::new_v4()),
            goal_type: goal.goal_type,
            title: goal.title.trim().to_string(),
            description: goal.description.clone(),
            target: goal.target,
            frequency: goal.frequency,
            progress: 0,
            streak: 0,
            last_completed: None,
            created_at: now,
            updated_at: now,
        });

        tracing::info!("Adding goal: {}", goal.title.trim());
        self.goals
            .commit_upsert(Some(mutation), self.repo.create_goal(Some(&user), &user.uid, goal))
            .await
    }

    pub async fn update_goal(&self, id: &str, update: &GoalUpdate) -> Result<Goal> {
        let user = self.auth.require_user()?;

        let mutation = self
            .goals
            .get(id)
            .filter(|goal| validate_goal_update(update, goal.progress).is_ok())
            .map(|mut goal| {
                update.apply_to(&mut goal);
                self.goals.begin_replace(goal)
            });

        tracing::info!("Updating goal: {}", id);
        self.goals
            .commit_upsert(
                mutation,
                self.repo.update_goal(Some(&user), &user.uid, id, update),
            )
            .await
    }

    pub async fn delete_goal(&self, id: &str) -> Result<()> {
        let user = self.auth.require_user()?;
        let mutation = self.goals.get(id).map(|_| self.goals.begin_remove(id));

        tracing::info!("Deleting goal: {}", id);
        self.goals
            .commit_remove(mutation, self.repo.delete_goal(Some(&user), &user.uid, id))
            .await
    }

    /// Record one unit of progress for the current period
    pub async fn record_progress(&self, id: &str) -> Result<Goal> {
        let user = self.auth.require_user()?;
        let now = self.clock.now();

        let mutation = self.goals.get(id).and_then(|mut goal| {
            let next = goal.next_progress(now)?;
            goal.progress = next.progress;
            goal.streak = next.streak;
            goal.last_completed = Some(now);
            Some(self.goals.begin_replace(goal))
        });

        self.goals
            .commit_upsert(
                mutation,
                self.repo.record_goal_progress(Some(&user), &user.uid, id),
            )
            .await
    }

    pub fn by_frequency(&self, frequency: Frequency) -> Vec<Goal> {
        self.goals
            .items()
            .into_iter()
            .filter(|goal| goal.frequency == frequency)
            .collect()
    }

    /// Goals whose target for the current period is not met yet
    pub fn incomplete(&self) -> Vec<Goal> {
        let now = self.clock.now();
        self.goals
            .items()
            .into_iter()
            .filter(|goal| !goal.is_complete_at(now))
            .collect()
    }
}
