//! Task service
//!
//! Admins assign tasks to employees; assignees (or admins) complete them.

use crate::db::repositories::{TaskRepository, UserRepository};
use crate::models::{CreateTaskInput, Task, TaskStatus, User};
use crate::services::clock::DynClock;
use std::sync::Arc;

/// Error types for task operations
#[derive(Debug, thiserror::Error)]
pub enum TaskServiceError {
    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Task not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct TaskService {
    task_repo: Arc<dyn TaskRepository>,
    user_repo: Arc<dyn UserRepository>,
    clock: DynClock,
}

impl TaskService {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        user_repo: Arc<dyn UserRepository>,
        clock: DynClock,
    ) -> Self {
        Self {
            task_repo,
            user_repo,
            clock,
        }
    }

    /// Create a task on behalf of `admin`. Every assignee must exist.
    pub async fn create(&self, admin: &User, input: CreateTaskInput) -> Result<Task, TaskServiceError> {
        if !admin.is_admin() {
            return Err(TaskServiceError::Forbidden(
                "Only admins can assign tasks".to_string(),
            ));
        }
        for user_id in &input.assignees {
            if self.user_repo.get_by_id(*user_id).await?.is_none() {
                return Err(TaskServiceError::ValidationError(format!(
                    "Unknown assignee: {}",
                    user_id
                )));
            }
        }

        let task = self
            .task_repo
            .create(&input, admin.id, self.clock.now())
            .await?;
        tracing::info!(task_id = task.id, assigned_by = admin.id, "Task created");
        Ok(task)
    }

    /// In-progress tasks of a user, newest assignment first
    pub async fn list_open(&self, user_id: i64) -> Result<Vec<Task>, TaskServiceError> {
        Ok(self.task_repo.list_for_user(user_id, TaskStatus::InProgress).await?)
    }

    /// Completed tasks of a user, newest completion first
    pub async fn list_past(&self, user_id: i64) -> Result<Vec<Task>, TaskServiceError> {
        Ok(self.task_repo.list_for_user(user_id, TaskStatus::Completed).await?)
    }

    /// The user's most recently assigned in-progress task
    pub async fn current(&self, user_id: i64) -> Result<Option<Task>, TaskServiceError> {
        Ok(self.list_open(user_id).await?.into_iter().next())
    }

    pub async fn list_all(&self) -> Result<Vec<Task>, TaskServiceError> {
        Ok(self.task_repo.list_all().await?)
    }

    /// Set a task's status, stamping or clearing its completion time
    pub async fn update_status(&self, id: i64, status: TaskStatus) -> Result<Task, TaskServiceError> {
        let completed_at = match status {
            TaskStatus::Completed => Some(self.clock.now()),
            TaskStatus::InProgress => None,
        };
        if !self.task_repo.set_status(id, status, completed_at).await? {
            return Err(TaskServiceError::NotFound);
        }
        self.task_repo
            .get_by_id(id)
            .await?
            .ok_or(TaskServiceError::NotFound)
    }

    /// Mark a task completed. Only an assignee or an admin may.
    pub async fn complete(&self, user: &User, id: i64) -> Result<Task, TaskServiceError> {
        let task = self
            .task_repo
            .get_by_id(id)
            .await?
            .ok_or(TaskServiceError::NotFound)?;

        if !user.is_admin() && !task.is_assigned_to(user.id) {
            return Err(TaskServiceError::Forbidden(
                "Task is not assigned to you".to_string(),
            ));
        }

        let completed = self.update_status(id, TaskStatus::Completed).await?;
        tracing::info!(task_id = id, user_id = user.id, "Task completed");
        Ok(completed)
    }

    pub async fn count_by_status(&self, status: TaskStatus) -> Result<i64, TaskServiceError> {
        Ok(self.task_repo.count_by_status(status).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxTaskRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::UserRole;
    use crate::services::clock::{Clock, ManualClock};
    use chrono::{Duration, TimeZone, Utc};

    struct Harness {
        clock: Arc<ManualClock>,
        service: TaskService,
        admin: User,
        ann: User,
        ben: User,
    }

    async fn setup() -> Harness {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::boxed(pool.clone());
        let mut created = Vec::new();
        for (name, role) in [("admin", UserRole::Admin), ("ann", UserRole::User), ("ben", UserRole::User)] {
            created.push(
                users
                    .create(&User::new(name.into(), format!("{}@test.com", name), "h".into(), role))
                    .await
                    .unwrap(),
            );
        }
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap()));
        let service = TaskService::new(SqlxTaskRepository::boxed(pool), users, clock.clone());
        let mut created = created.into_iter();
        Harness {
            clock,
            service,
            admin: created.next().unwrap(),
            ann: created.next().unwrap(),
            ben: created.next().unwrap(),
        }
    }

    fn task_for(title: &str, assignees: Vec<i64>) -> CreateTaskInput {
        CreateTaskInput {
            title: Some(title.to_string()),
            assignees,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_validates_assignees_and_role() {
        let h = setup().await;

        let task = h.service.create(&h.admin, task_for("a", vec![h.ann.id])).await.unwrap();
        assert_eq!(task.assigned_by, Some(h.admin.id));
        assert_eq!(task.assigned_at, h.clock.now());

        assert!(matches!(
            h.service.create(&h.admin, task_for("b", vec![h.ann.id, 999])).await,
            Err(TaskServiceError::ValidationError(_))
        ));
        let unassigned = h.service.create(&h.admin, task_for("c", vec![])).await.unwrap();
        assert!(unassigned.assignees.is_empty());
        assert!(matches!(
            h.service.create(&h.ann, task_for("d", vec![h.ann.id])).await,
            Err(TaskServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_current_and_past() {
        let h = setup().await;
        h.service.create(&h.admin, task_for("first", vec![h.ann.id])).await.unwrap();
        h.clock.advance(Duration::minutes(1));
        let second = h.service.create(&h.admin, task_for("second", vec![h.ann.id])).await.unwrap();

        let current = h.service.current(h.ann.id).await.unwrap().unwrap();
        assert_eq!(current.id, second.id);
        assert!(h.service.current(h.ben.id).await.unwrap().is_none());

        h.clock.advance(Duration::minutes(1));
        let done = h.service.complete(&h.ann, second.id).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.completed_at, Some(h.clock.now()));

        let past = h.service.list_past(h.ann.id).await.unwrap();
        assert_eq!(past.len(), 1);
        assert_eq!(h.service.list_open(h.ann.id).await.unwrap().len(), 1);
        assert_eq!(h.service.count_by_status(TaskStatus::Completed).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_complete_requires_assignee_or_admin() {
        let h = setup().await;
        let task = h.service.create(&h.admin, task_for("t", vec![h.ann.id])).await.unwrap();

        assert!(matches!(
            h.service.complete(&h.ben, task.id).await,
            Err(TaskServiceError::Forbidden(_))
        ));
        assert!(h.service.complete(&h.admin, task.id).await.is_ok());
        assert!(matches!(
            h.service.complete(&h.admin, 999).await,
            Err(TaskServiceError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_update_status_round_trip() {
        let h = setup().await;
        let task = h.service.create(&h.admin, task_for("t", vec![h.ben.id])).await.unwrap();

        let done = h.service.update_status(task.id, TaskStatus::Completed).await.unwrap();
        assert!(done.completed_at.is_some());

        let reopened = h.service.update_status(task.id, TaskStatus::InProgress).await.unwrap();
        assert!(reopened.completed_at.is_none());
        assert_eq!(reopened.status, TaskStatus::InProgress);

        assert!(matches!(
            h.service.update_status(999, TaskStatus::Completed).await,
            Err(TaskServiceError::NotFound)
        ));
        assert_eq!(h.service.list_all().await.unwrap().len(), 1);
    }
}
