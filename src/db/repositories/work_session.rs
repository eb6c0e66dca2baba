//! Work session repository
//!
//! Persistence for work sessions and their break rows.
//!
//! Every state change is a conditional write: the `UPDATE` names the status
//! the caller observed, and a zero row count means another request moved the
//! session first. Multi-row changes run in a transaction that starts with its
//! write so SQLite takes the write lock up front.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Break, SessionStatus, WorkSession};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Work session repository trait
#[async_trait]
pub trait WorkSessionRepository: Send + Sync {
    /// Abandon the user's open sessions and insert `session` in one
    /// transaction. Returns the ids of the abandoned sessions.
    ///
    /// A concurrent clock-in for the same user surfaces as a unique
    /// violation from the open-session index.
    async fn clock_in(&self, session: &WorkSession) -> Result<Vec<String>>;

    /// The user's open (`active` or `on-break`) session, with its breaks
    async fn get_open(&self, user_id: i64) -> Result<Option<WorkSession>>;

    async fn get_by_id(&self, id: &str) -> Result<Option<WorkSession>>;

    /// `active` → `on-break`. Returns false if the session was not active.
    async fn begin_break(
        &self,
        session_id: &str,
        break_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// `on-break` → `active`, appending `finished`. Returns false if the
    /// session was not on that break.
    async fn finish_break(&self, session_id: &str, finished: &Break) -> Result<bool>;

    /// Persist a completed session. `previous` is the status the session had
    /// before completion; `closed_break` is a break the clock-out ended.
    /// Returns false if the session had already moved on.
    async fn complete(
        &self,
        session: &WorkSession,
        previous: SessionStatus,
        closed_break: Option<&Break>,
    ) -> Result<bool>;

    /// Sessions of a user that started at or after `since`, newest first,
    /// plus the total count of such sessions
    async fn list_recent(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WorkSession>, i64)>;

    /// Completed sessions that started in `[from, to)`, optionally for one user
    async fn list_completed_between(
        &self,
        user_id: Option<i64>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WorkSession>>;

    /// Every open session, without breaks
    async fn list_open(&self) -> Result<Vec<WorkSession>>;

    /// Remove all sessions (and their breaks) of a user
    async fn delete_by_user(&self, user_id: i64) -> Result<u64>;
}

/// SQLx-based work session repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxWorkSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxWorkSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn WorkSessionRepository> {
        Arc::new(Self::new(pool))
    }
}

const SESSION_COLUMNS: &str = "id, user_id, start_time, end_time, status, duration, current_break_id, current_break_start";

const OPEN_STATUSES: &str = "('active', 'on-break')";

#[async_trait]
impl WorkSessionRepository for SqlxWorkSessionRepository {
    async fn clock_in(&self, session: &WorkSession) -> Result<Vec<String>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => clock_in_sqlite(self.pool.sqlite()?, session).await,
            DatabaseDriver::Mysql => clock_in_mysql(self.pool.mysql()?, session).await,
        }
    }

    async fn get_open(&self, user_id: i64) -> Result<Option<WorkSession>> {
        let sql = format!(
            "SELECT {} FROM work_sessions WHERE user_id = ? AND status IN {} ORDER BY start_time DESC LIMIT 1",
            SESSION_COLUMNS, OPEN_STATUSES
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let row = sqlx::query(&sql)
                    .bind(user_id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get open session")?;
                match row {
                    Some(row) => Ok(Some(with_breaks_sqlite(pool, row_to_session_sqlite(&row)?).await?)),
                    None => Ok(None),
                }
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                let row = sqlx::query(&sql)
                    .bind(user_id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get open session")?;
                match row {
                    Some(row) => Ok(Some(with_breaks_mysql(pool, row_to_session_mysql(&row)?).await?)),
                    None => Ok(None),
                }
            }
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<WorkSession>> {
        let sql = format!("SELECT {} FROM work_sessions WHERE id = ?", SESSION_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get session by ID")?;
                match row {
                    Some(row) => Ok(Some(with_breaks_sqlite(pool, row_to_session_sqlite(&row)?).await?)),
                    None => Ok(None),
                }
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get session by ID")?;
                match row {
                    Some(row) => Ok(Some(with_breaks_mysql(pool, row_to_session_mysql(&row)?).await?)),
                    None => Ok(None),
                }
            }
        }
    }

    async fn begin_break(
        &self,
        session_id: &str,
        break_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<bool> {
        let sql = r#"
            UPDATE work_sessions
            SET status = 'on-break', current_break_id = ?, current_break_start = ?
            WHERE id = ? AND status = 'active'
        "#;
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(break_id)
                .bind(started_at)
                .bind(session_id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to start break")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(break_id)
                .bind(started_at)
                .bind(session_id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to start break")?
                .rows_affected(),
        };
        Ok(affected == 1)
    }

    async fn finish_break(&self, session_id: &str, finished: &Break) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => finish_break_sqlite(self.pool.sqlite()?, session_id, finished).await,
            DatabaseDriver::Mysql => finish_break_mysql(self.pool.mysql()?, session_id, finished).await,
        }
    }

    async fn complete(
        &self,
        session: &WorkSession,
        previous: SessionStatus,
        closed_break: Option<&Break>,
    ) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                complete_sqlite(self.pool.sqlite()?, session, previous, closed_break).await
            }
            DatabaseDriver::Mysql => {
                complete_mysql(self.pool.mysql()?, session, previous, closed_break).await
            }
        }
    }

    async fn list_recent(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WorkSession>, i64)> {
        let sql = format!(
            r#"
            SELECT {} FROM work_sessions
            WHERE user_id = ? AND start_time >= ?
            ORDER BY start_time DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
            SESSION_COLUMNS
        );
        let count_sql = "SELECT COUNT(*) FROM work_sessions WHERE user_id = ? AND start_time >= ?";

        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let rows = sqlx::query(&sql)
                    .bind(user_id)
                    .bind(since)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list sessions")?;
                let total: i64 = sqlx::query_scalar(count_sql)
                    .bind(user_id)
                    .bind(since)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count sessions")?;

                let mut sessions = Vec::with_capacity(rows.len());
                for row in rows {
                    sessions.push(with_breaks_sqlite(pool, row_to_session_sqlite(&row)?).await?);
                }
                Ok((sessions, total))
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                let rows = sqlx::query(&sql)
                    .bind(user_id)
                    .bind(since)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list sessions")?;
                let total: i64 = sqlx::query_scalar(count_sql)
                    .bind(user_id)
                    .bind(since)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count sessions")?;

                let mut sessions = Vec::with_capacity(rows.len());
                for row in rows {
                    sessions.push(with_breaks_mysql(pool, row_to_session_mysql(&row)?).await?);
                }
                Ok((sessions, total))
            }
        }
    }

    async fn list_completed_between(
        &self,
        user_id: Option<i64>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WorkSession>> {
        let user_filter = if user_id.is_some() { "AND user_id = ?" } else { "" };
        let sql = format!(
            r#"
            SELECT {} FROM work_sessions
            WHERE status = 'completed' AND start_time >= ? AND start_time < ? {}
            ORDER BY start_time
            "#,
            SESSION_COLUMNS, user_filter
        );

        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let mut query = sqlx::query(&sql).bind(from).bind(to);
                if let Some(user_id) = user_id {
                    query = query.bind(user_id);
                }
                let rows = query
                    .fetch_all(pool)
                    .await
                    .context("Failed to list completed sessions")?;

                let mut sessions = Vec::with_capacity(rows.len());
                for row in rows {
                    sessions.push(with_breaks_sqlite(pool, row_to_session_sqlite(&row)?).await?);
                }
                Ok(sessions)
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                let mut query = sqlx::query(&sql).bind(from).bind(to);
                if let Some(user_id) = user_id {
                    query = query.bind(user_id);
                }
                let rows = query
                    .fetch_all(pool)
                    .await
                    .context("Failed to list completed sessions")?;

                let mut sessions = Vec::with_capacity(rows.len());
                for row in rows {
                    sessions.push(with_breaks_mysql(pool, row_to_session_mysql(&row)?).await?);
                }
                Ok(sessions)
            }
        }
    }

    async fn list_open(&self) -> Result<Vec<WorkSession>> {
        let sql = format!(
            "SELECT {} FROM work_sessions WHERE status IN {}",
            SESSION_COLUMNS, OPEN_STATUSES
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list open sessions")?;
                rows.iter().map(row_to_session_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list open sessions")?;
                rows.iter().map(row_to_session_mysql).collect()
            }
        }
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<u64> {
        let sql = "DELETE FROM work_sessions WHERE user_id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(user_id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete sessions by user")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(user_id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete sessions by user")?
                .rows_affected(),
        };
        Ok(affected)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn clock_in_sqlite(pool: &SqlitePool, session: &WorkSession) -> Result<Vec<String>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    // Stamping end_time first takes the write lock and hands back the rows
    // with their break bookkeeping intact.
    let rows = sqlx::query(&format!(
        "UPDATE work_sessions SET end_time = ? WHERE user_id = ? AND status IN {} RETURNING {}",
        OPEN_STATUSES, SESSION_COLUMNS
    ))
    .bind(session.start_time)
    .bind(session.user_id)
    .fetch_all(&mut *tx)
    .await
    .context("Failed to lock open sessions")?;

    let mut abandoned = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut open = row_to_session_sqlite(row)?;
        if let Some(closed) = open.abandon(session.start_time) {
            insert_break_sqlite(&mut tx, &open.id, &closed).await?;
        }
        mark_abandoned_sqlite(&mut tx, &open).await?;
        abandoned.push(open.id);
    }

    insert_session_sqlite(&mut tx, session).await?;

    tx.commit().await.context("Failed to commit clock-in")?;
    Ok(abandoned)
}

async fn mark_abandoned_sqlite(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    session: &WorkSession,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE work_sessions
        SET status = ?, end_time = ?, current_break_id = NULL, current_break_start = NULL
        WHERE id = ?
        "#,
    )
    .bind(session.status.as_str())
    .bind(session.end_time)
    .bind(&session.id)
    .execute(&mut **tx)
    .await
    .context("Failed to abandon open session")?;
    Ok(())
}

async fn insert_session_sqlite(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    session: &WorkSession,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO work_sessions (id, user_id, start_time, end_time, status, duration, current_break_id, current_break_start)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.id)
    .bind(session.user_id)
    .bind(session.start_time)
    .bind(session.end_time)
    .bind(session.status.as_str())
    .bind(session.duration)
    .bind(&session.current_break_id)
    .bind(session.current_break_start)
    .execute(&mut **tx)
    .await
    .context("Failed to create work session")?;
    Ok(())
}

async fn insert_break_sqlite(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    session_id: &str,
    finished: &Break,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO session_breaks (id, session_id, start_time, end_time, duration) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&finished.id)
    .bind(session_id)
    .bind(finished.start_time)
    .bind(finished.end_time)
    .bind(finished.duration)
    .execute(&mut **tx)
    .await
    .context("Failed to record break")?;
    Ok(())
}

async fn finish_break_sqlite(pool: &SqlitePool, session_id: &str, finished: &Break) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let affected = sqlx::query(
        r#"
        UPDATE work_sessions
        SET status = 'active', current_break_id = NULL, current_break_start = NULL
        WHERE id = ? AND status = 'on-break' AND current_break_id = ?
        "#,
    )
    .bind(session_id)
    .bind(&finished.id)
    .execute(&mut *tx)
    .await
    .context("Failed to end break")?
    .rows_affected();

    if affected != 1 {
        tx.rollback().await.context("Failed to roll back")?;
        return Ok(false);
    }

    insert_break_sqlite(&mut tx, session_id, finished).await?;
    tx.commit().await.context("Failed to commit break")?;
    Ok(true)
}

async fn complete_sqlite(
    pool: &SqlitePool,
    session: &WorkSession,
    previous: SessionStatus,
    closed_break: Option<&Break>,
) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let affected = sqlx::query(
        r#"
        UPDATE work_sessions
        SET status = ?, end_time = ?, duration = ?, current_break_id = NULL, current_break_start = NULL
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(session.status.as_str())
    .bind(session.end_time)
    .bind(session.duration)
    .bind(&session.id)
    .bind(previous.as_str())
    .execute(&mut *tx)
    .await
    .context("Failed to complete session")?
    .rows_affected();

    if affected != 1 {
        tx.rollback().await.context("Failed to roll back")?;
        return Ok(false);
    }

    if let Some(finished) = closed_break {
        insert_break_sqlite(&mut tx, &session.id, finished).await?;
    }
    tx.commit().await.context("Failed to commit clock-out")?;
    Ok(true)
}

async fn with_breaks_sqlite(pool: &SqlitePool, mut session: WorkSession) -> Result<WorkSession> {
    let rows = sqlx::query(
        "SELECT id, start_time, end_time, duration FROM session_breaks WHERE session_id = ? ORDER BY start_time, id",
    )
    .bind(&session.id)
    .fetch_all(pool)
    .await
    .context("Failed to load breaks")?;

    session.breaks = rows
        .iter()
        .map(|row| Break {
            id: row.get("id"),
            start_time: row.get("start_time"),
            end_time: row.get("end_time"),
            duration: row.get("duration"),
        })
        .collect();
    Ok(session)
}

fn row_to_session_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<WorkSession> {
    let status_str: String = row.get("status");
    let status = SessionStatus::from_str(&status_str)
        .with_context(|| format!("Invalid session status in database: {}", status_str))?;

    Ok(WorkSession {
        id: row.get("id"),
        user_id: row.get("user_id"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        status,
        duration: row.get("duration"),
        breaks: Vec::new(),
        current_break_id: row.get("current_break_id"),
        current_break_start: row.get("current_break_start"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn clock_in_mysql(pool: &MySqlPool, session: &WorkSession) -> Result<Vec<String>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let rows = sqlx::query(&format!(
        "SELECT {} FROM work_sessions WHERE user_id = ? AND status IN {} FOR UPDATE",
        SESSION_COLUMNS, OPEN_STATUSES
    ))
    .bind(session.user_id)
    .fetch_all(&mut *tx)
    .await
    .context("Failed to lock open sessions")?;

    let mut abandoned = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut open = row_to_session_mysql(row)?;
        if let Some(closed) = open.abandon(session.start_time) {
            insert_break_mysql(&mut tx, &open.id, &closed).await?;
        }
        sqlx::query(
            r#"
            UPDATE work_sessions
            SET status = ?, end_time = ?, current_break_id = NULL, current_break_start = NULL
            WHERE id = ?
            "#,
        )
        .bind(open.status.as_str())
        .bind(open.end_time)
        .bind(&open.id)
        .execute(&mut *tx)
        .await
        .context("Failed to abandon open session")?;
        abandoned.push(open.id);
    }

    sqlx::query(
        r#"
        INSERT INTO work_sessions (id, user_id, start_time, end_time, status, duration, current_break_id, current_break_start)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.id)
    .bind(session.user_id)
    .bind(session.start_time)
    .bind(session.end_time)
    .bind(session.status.as_str())
    .bind(session.duration)
    .bind(&session.current_break_id)
    .bind(session.current_break_start)
    .execute(&mut *tx)
    .await
    .context("Failed to create work session")?;

    tx.commit().await.context("Failed to commit clock-in")?;
    Ok(abandoned)
}

async fn insert_break_mysql(
    tx: &mut sqlx::Transaction<'_, sqlx::MySql>,
    session_id: &str,
    finished: &Break,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO session_breaks (id, session_id, start_time, end_time, duration) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&finished.id)
    .bind(session_id)
    .bind(finished.start_time)
    .bind(finished.end_time)
    .bind(finished.duration)
    .execute(&mut **tx)
    .await
    .context("Failed to record break")?;
    Ok(())
}

async fn finish_break_mysql(pool: &MySqlPool, session_id: &str, finished: &Break) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let affected = sqlx::query(
        r#"
        UPDATE work_sessions
        SET status = 'active', current_break_id = NULL, current_break_start = NULL
        WHERE id = ? AND status = 'on-break' AND current_break_id = ?
        "#,
    )
    .bind(session_id)
    .bind(&finished.id)
    .execute(&mut *tx)
    .await
    .context("Failed to end break")?
    .rows_affected();

    if affected != 1 {
        tx.rollback().await.context("Failed to roll back")?;
        return Ok(false);
    }

    insert_break_mysql(&mut tx, session_id, finished).await?;
    tx.commit().await.context("Failed to commit break")?;
    Ok(true)
}

async fn complete_mysql(
    pool: &MySqlPool,
    session: &WorkSession,
    previous: SessionStatus,
    closed_break: Option<&Break>,
) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let affected = sqlx::query(
        r#"
        UPDATE work_sessions
        SET status = ?, end_time = ?, duration = ?, current_break_id = NULL, current_break_start = NULL
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(session.status.as_str())
    .bind(session.end_time)
    .bind(session.duration)
    .bind(&session.id)
    .bind(previous.as_str())
    .execute(&mut *tx)
    .await
    .context("Failed to complete session")?
    .rows_affected();

    if affected != 1 {
        tx.rollback().await.context("Failed to roll back")?;
        return Ok(false);
    }

    if let Some(finished) = closed_break {
        insert_break_mysql(&mut tx, &session.id, finished).await?;
    }
    tx.commit().await.context("Failed to commit clock-out")?;
    Ok(true)
}

async fn with_breaks_mysql(pool: &MySqlPool, mut session: WorkSession) -> Result<WorkSession> {
    let rows = sqlx::query(
        "SELECT id, start_time, end_time, duration FROM session_breaks WHERE session_id = ? ORDER BY start_time, id",
    )
    .bind(&session.id)
    .fetch_all(pool)
    .await
    .context("Failed to load breaks")?;

    session.breaks = rows
        .iter()
        .map(|row| Break {
            id: row.get("id"),
            start_time: row.get("start_time"),
            end_time: row.get("end_time"),
            duration: row.get("duration"),
        })
        .collect();
    Ok(session)
}

fn row_to_session_mysql(row: &sqlx::mysql::MySqlRow) -> Result<WorkSession> {
    let status_str: String = row.get("status");
    let status = SessionStatus::from_str(&status_str)
        .with_context(|| format!("Invalid session status in database: {}", status_str))?;

    Ok(WorkSession {
        id: row.get("id"),
        user_id: row.get("user_id"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        status,
        duration: row.get("duration"),
        breaks: Vec::new(),
        current_break_id: row.get("current_break_id"),
        current_break_start: row.get("current_break_start"),
    })
}
