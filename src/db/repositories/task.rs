//! Task repository
//!
//! Tasks and their assignee rows.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{CreateTaskInput, Task, TaskStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Task repository trait
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(
        &self,
        input: &CreateTaskInput,
        assigned_by: i64,
        assigned_at: DateTime<Utc>,
    ) -> Result<Task>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Task>>;

    /// Tasks assigned to a user with the given status. In-progress tasks come
    /// newest assignment first, completed ones newest completion first.
    async fn list_for_user(&self, user_id: i64, status: TaskStatus) -> Result<Vec<Task>>;

    /// Every task, newest assignment first
    async fn list_all(&self) -> Result<Vec<Task>>;

    /// Returns false when the task does not exist
    async fn set_status(
        &self,
        id: i64,
        status: TaskStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    async fn count_by_status(&self, status: TaskStatus) -> Result<i64>;
}

/// SQLx-based task repository implementation
pub struct SqlxTaskRepository {
    pool: DynDatabasePool,
}

impl SqlxTaskRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TaskRepository> {
        Arc::new(Self::new(pool))
    }
}

const TASK_COLUMNS: &str = "t.id, t.title, t.client, t.assigned_by, t.assigned_at, t.due_at, t.high_priority, t.note, t.status, t.created_at, t.completed_at";

fn user_task_query(status: TaskStatus) -> String {
    let order = match status {
        TaskStatus::InProgress => "t.assigned_at DESC, t.id DESC",
        TaskStatus::Completed => "t.completed_at DESC, t.id DESC",
    };
    format!(
        r#"
        SELECT {} FROM tasks t
        JOIN task_assignees a ON a.task_id = t.id
        WHERE a.user_id = ? AND t.status = ?
        ORDER BY {}
        "#,
        TASK_COLUMNS, order
    )
}

#[async_trait]
impl TaskRepository for SqlxTaskRepository {
    async fn create(
        &self,
        input: &CreateTaskInput,
        assigned_by: i64,
        assigned_at: DateTime<Utc>,
    ) -> Result<Task> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_task_sqlite(self.pool.sqlite()?, input, assigned_by, assigned_at).await
            }
            DatabaseDriver::Mysql => {
                create_task_mysql(self.pool.mysql()?, input, assigned_by, assigned_at).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Task>> {
        let sql = format!("SELECT {} FROM tasks t WHERE t.id = ?", TASK_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get task by ID")?;
                match row {
                    Some(row) => Ok(Some(with_assignees_sqlite(pool, row_to_task_sqlite(&row)?).await?)),
                    None => Ok(None),
                }
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get task by ID")?;
                match row {
                    Some(row) => Ok(Some(with_assignees_mysql(pool, row_to_task_mysql(&row)?).await?)),
                    None => Ok(None),
                }
            }
        }
    }

    async fn list_for_user(&self, user_id: i64, status: TaskStatus) -> Result<Vec<Task>> {
        let sql = user_task_query(status);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let rows = sqlx::query(&sql)
                    .bind(user_id)
                    .bind(status.as_str())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list tasks for user")?;
                let mut tasks = Vec::with_capacity(rows.len());
                for row in rows {
                    tasks.push(with_assignees_sqlite(pool, row_to_task_sqlite(&row)?).await?);
                }
                Ok(tasks)
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                let rows = sqlx::query(&sql)
                    .bind(user_id)
                    .bind(status.as_str())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list tasks for user")?;
                let mut tasks = Vec::with_capacity(rows.len());
                for row in rows {
                    tasks.push(with_assignees_mysql(pool, row_to_task_mysql(&row)?).await?);
                }
                Ok(tasks)
            }
        }
    }

    async fn list_all(&self) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks t ORDER BY t.assigned_at DESC, t.id DESC",
            TASK_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let rows = sqlx::query(&sql)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list tasks")?;
                let mut tasks = Vec::with_capacity(rows.len());
                for row in rows {
                    tasks.push(with_assignees_sqlite(pool, row_to_task_sqlite(&row)?).await?);
                }
                Ok(tasks)
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                let rows = sqlx::query(&sql)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list tasks")?;
                let mut tasks = Vec::with_capacity(rows.len());
                for row in rows {
                    tasks.push(with_assignees_mysql(pool, row_to_task_mysql(&row)?).await?);
                }
                Ok(tasks)
            }
        }
    }

    async fn set_status(
        &self,
        id: i64,
        status: TaskStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let update = "UPDATE tasks SET status = ?, completed_at = ? WHERE id = ?";
        let exists = "SELECT COUNT(*) FROM tasks WHERE id = ?";
        // Checked separately: MySQL counts unchanged rows as unaffected
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                sqlx::query(update)
                    .bind(status.as_str())
                    .bind(completed_at)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update task status")?;
                sqlx::query_scalar(exists)
                    .bind(id)
                    .fetch_one(pool)
                    .await
                    .context("Failed to check task")?
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                sqlx::query(update)
                    .bind(status.as_str())
                    .bind(completed_at)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update task status")?;
                sqlx::query_scalar(exists)
                    .bind(id)
                    .fetch_one(pool)
                    .await
                    .context("Failed to check task")?
            }
        };
        Ok(count > 0)
    }

    async fn count_by_status(&self, status: TaskStatus) -> Result<i64> {
        let sql = "SELECT COUNT(*) FROM tasks WHERE status = ?";
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar(sql)
                .bind(status.as_str())
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count tasks")?,
            DatabaseDriver::Mysql => sqlx::query_scalar(sql)
                .bind(status.as_str())
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count tasks")?,
        };
        Ok(count)
    }
}

fn new_task(id: i64, input: &CreateTaskInput, assigned_by: i64, assigned_at: DateTime<Utc>) -> Task {
    let mut assignees = input.assignees.clone();
    assignees.sort_unstable();
    assignees.dedup();
    Task {
        id,
        title: input.title.clone(),
        client: input.client.clone(),
        assigned_by: Some(assigned_by),
        assigned_at,
        due_at: input.due_at,
        assignees,
        high_priority: input.high_priority,
        note: input.note.clone(),
        status: TaskStatus::InProgress,
        created_at: assigned_at,
        completed_at: None,
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_task_sqlite(
    pool: &SqlitePool,
    input: &CreateTaskInput,
    assigned_by: i64,
    assigned_at: DateTime<Utc>,
) -> Result<Task> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(
        r#"
        INSERT INTO tasks (title, client, assigned_by, assigned_at, due_at, high_priority, note, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.title)
    .bind(&input.client)
    .bind(assigned_by)
    .bind(assigned_at)
    .bind(input.due_at)
    .bind(input.high_priority)
    .bind(&input.note)
    .bind(TaskStatus::InProgress.as_str())
    .bind(assigned_at)
    .execute(&mut *tx)
    .await
    .context("Failed to create task")?;

    let task = new_task(result.last_insert_rowid(), input, assigned_by, assigned_at);
    for user_id in &task.assignees {
        sqlx::query("INSERT INTO task_assignees (task_id, user_id) VALUES (?, ?)")
            .bind(task.id)
            .bind(*user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to assign task")?;
    }

    tx.commit().await.context("Failed to commit task")?;
    Ok(task)
}

async fn with_assignees_sqlite(pool: &SqlitePool, mut task: Task) -> Result<Task> {
    task.assignees = sqlx::query_scalar("SELECT user_id FROM task_assignees WHERE task_id = ? ORDER BY user_id")
        .bind(task.id)
        .fetch_all(pool)
        .await
        .context("Failed to load task assignees")?;
    Ok(task)
}

fn row_to_task_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Task> {
    let status_str: String = row.get("status");
    let status = TaskStatus::from_str(&status_str)
        .with_context(|| format!("Invalid task status in database: {}", status_str))?;

    Ok(Task {
        id: row.get("id"),
        title: row.get("title"),
        client: row.get("client"),
        assigned_by: row.get("assigned_by"),
        assigned_at: row.get("assigned_at"),
        due_at: row.get("due_at"),
        assignees: Vec::new(),
        high_priority: row.get("high_priority"),
        note: row.get("note"),
        status,
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_task_mysql(
    pool: &MySqlPool,
    input: &CreateTaskInput,
    assigned_by: i64,
    assigned_at: DateTime<Utc>,
) -> Result<Task> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(
        r#"
        INSERT INTO tasks (title, client, assigned_by, assigned_at, due_at, high_priority, note, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.title)
    .bind(&input.client)
    .bind(assigned_by)
    .bind(assigned_at)
    .bind(input.due_at)
    .bind(input.high_priority)
    .bind(&input.note)
    .bind(TaskStatus::InProgress.as_str())
    .bind(assigned_at)
    .execute(&mut *tx)
    .await
    .context("Failed to create task")?;

    let task = new_task(result.last_insert_id() as i64, input, assigned_by, assigned_at);
    for user_id in &task.assignees {
        sqlx::query("INSERT INTO task_assignees (task_id, user_id) VALUES (?, ?)")
            .bind(task.id)
            .bind(*user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to assign task")?;
    }

    tx.commit().await.context("Failed to commit task")?;
    Ok(task)
}

async fn with_assignees_mysql(pool: &MySqlPool, mut task: Task) -> Result<Task> {
    task.assignees = sqlx::query_scalar("SELECT user_id FROM task_assignees WHERE task_id = ? ORDER BY user_id")
        .bind(task.id)
        .fetch_all(pool)
        .await
        .context("Failed to load task assignees")?;
    Ok(task)
}

fn row_to_task_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Task> {
    let status_str: String = row.get("status");
    let status = TaskStatus::from_str(&status_str)
        .with_context(|| format!("Invalid task status in database: {}", status_str))?;

    Ok(Task {
        id: row.get("id"),
        title: row.get("title"),
        client: row.get("client"),
        assigned_by: row.get("assigned_by"),
        assigned_at: row.get("assigned_at"),
        due_at: row.get("due_at"),
        assignees: Vec::new(),
        high_priority: row.get("high_priority"),
        note: row.get("note"),
        status,
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
    })
}
