//! Dashboard statistics for administrators

use crate::models::{SessionStatus, TaskStatus};
use crate::services::task::TaskService;
use crate::services::time_entry::TimeEntryService;
use crate::services::user::UserService;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub employees: i64,
    pub active_now: i64,
    pub on_break_now: i64,
    pub tasks_in_progress: i64,
    pub tasks_completed: i64,
    /// Net seconds worked this UTC month across everyone
    pub month_net_duration: i64,
}

pub struct StatsService {
    users: Arc<UserService>,
    time_entries: Arc<TimeEntryService>,
    tasks: Arc<TaskService>,
}

impl StatsService {
    pub fn new(
        users: Arc<UserService>,
        time_entries: Arc<TimeEntryService>,
        tasks: Arc<TaskService>,
    ) -> Self {
        Self {
            users,
            time_entries,
            tasks,
        }
    }

    pub async fn snapshot(&self) -> anyhow::Result<AdminStats> {
        let open = self.time_entries.open_sessions().await?;
        let count = |status: SessionStatus| open.iter().filter(|s| s.status == status).count() as i64;

        Ok(AdminStats {
            employees: self.users.count_employees().await?,
            active_now: count(SessionStatus::Active),
            on_break_now: count(SessionStatus::OnBreak),
            tasks_in_progress: self.tasks.count_by_status(TaskStatus::InProgress).await?,
            tasks_completed: self.tasks.count_by_status(TaskStatus::Completed).await?,
            month_net_duration: self.time_entries.month_summary(None).await?.net_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, TimeEntryConfig};
    use crate::db::repositories::{
        SqlxAuthTokenRepository, SqlxTaskRepository, SqlxUserRepository,
        SqlxWorkSessionRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{CreateTaskInput, CreateUserInput, UserRole};
    use crate::services::clock::ManualClock;
    use chrono::{Duration, TimeZone, Utc};

    #[tokio::test]
    async fn test_snapshot_counts_everything() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 4, 2, 8, 0, 0).unwrap()));

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxWorkSessionRepository::boxed(pool.clone());
        let users = Arc::new(UserService::new(
            user_repo.clone(),
            SqlxAuthTokenRepository::boxed(pool.clone()),
            session_repo.clone(),
            clock.clone(),
            AuthConfig::default(),
        ));
        let time_entries = Arc::new(TimeEntryService::new(
            session_repo,
            clock.clone(),
            TimeEntryConfig::default(),
        ));
        let tasks = Arc::new(TaskService::new(
            SqlxTaskRepository::boxed(pool.clone()),
            user_repo,
            clock.clone(),
        ));
        let stats = StatsService::new(users.clone(), time_entries.clone(), tasks.clone());

        let mut ids = Vec::new();
        for name in ["a", "b", "c"] {
            let registered = users
                .signup(CreateUserInput {
                    username: name.to_string(),
                    email: format!("{}@test.com", name),
                    password: "pw".to_string(),
                })
                .await
                .unwrap();
            ids.push(registered.user);
        }
        let mut admin = ids[0].clone();
        admin.role = UserRole::Admin;

        // a: one finished hour with a 10 minute break
        time_entries.clock_in(ids[0].id).await.unwrap();
        clock.advance(Duration::minutes(30));
        time_entries.start_break(ids[0].id).await.unwrap();
        clock.advance(Duration::minutes(10));
        time_entries.end_break(ids[0].id).await.unwrap();
        clock.advance(Duration::minutes(20));
        time_entries.clock_out(ids[0].id).await.unwrap();

        // b: working, c: on break
        time_entries.clock_in(ids[1].id).await.unwrap();
        time_entries.clock_in(ids[2].id).await.unwrap();
        time_entries.start_break(ids[2].id).await.unwrap();

        let task = tasks
            .create(
                &admin,
                CreateTaskInput {
                    assignees: vec![ids[1].id],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        tasks
            .create(
                &admin,
                CreateTaskInput {
                    assignees: vec![ids[2].id],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        tasks.complete(&admin, task.id).await.unwrap();

        assert_eq!(
            stats.snapshot().await.unwrap(),
            AdminStats {
                employees: 3,
                active_now: 1,
                on_break_now: 1,
                tasks_in_progress: 1,
                tasks_completed: 1,
                month_net_duration: 3000,
            }
        );
    }
}
