//! User repository
//!
//! Database operations for accounts.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{User, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user. Fails with a unique violation on a taken
    /// username or email.
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Most recently issued account holding this PIN
    async fn get_by_pin(&self, pin: &str) -> Result<Option<User>>;

    async fn pin_in_use(&self, pin: &str) -> Result<bool>;

    /// Replace a user's PIN. Returns false when the user does not exist.
    async fn update_pin(&self, id: i64, pin: &str, issued_at: DateTime<Utc>) -> Result<bool>;

    /// Returns false when the user does not exist
    async fn rename(&self, id: i64, username: &str) -> Result<bool>;

    /// Returns false when the user does not exist
    async fn delete(&self, id: i64) -> Result<bool>;

    /// All users with the given role, by username
    async fn list_by_role(&self, role: UserRole) -> Result<Vec<User>>;

    async fn count_by_role(&self, role: UserRole) -> Result<i64>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, pin, pin_created_at, created_at, updated_at";

/// Role values stored for a role. Employees created before roles existed
/// carry an empty string.
fn role_values(role: UserRole) -> (&'static str, &'static str) {
    match role {
        UserRole::Admin => ("admin", "admin"),
        UserRole::User => ("user", ""),
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, user).await,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.mysql()?, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get user by ID")?;
                row.as_ref().map(row_to_user_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get user by ID")?;
                row.as_ref().map(row_to_user_mysql).transpose()
            }
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(email)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get user by email")?;
                row.as_ref().map(row_to_user_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(email)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get user by email")?;
                row.as_ref().map(row_to_user_mysql).transpose()
            }
        }
    }

    async fn get_by_pin(&self, pin: &str) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE pin = ? ORDER BY pin_created_at DESC LIMIT 1",
            USER_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(pin)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get user by PIN")?;
                row.as_ref().map(row_to_user_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(pin)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get user by PIN")?;
                row.as_ref().map(row_to_user_mysql).transpose()
            }
        }
    }

    async fn pin_in_use(&self, pin: &str) -> Result<bool> {
        let sql = "SELECT COUNT(*) FROM users WHERE pin = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar(sql)
                .bind(pin)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to check PIN")?,
            DatabaseDriver::Mysql => sqlx::query_scalar(sql)
                .bind(pin)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to check PIN")?,
        };
        Ok(count > 0)
    }

    async fn update_pin(&self, id: i64, pin: &str, issued_at: DateTime<Utc>) -> Result<bool> {
        let sql = "UPDATE users SET pin = ?, pin_created_at = ?, updated_at = ? WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(pin)
                .bind(issued_at)
                .bind(Utc::now())
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to update PIN")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(pin)
                .bind(issued_at)
                .bind(Utc::now())
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to update PIN")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn rename(&self, id: i64, username: &str) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => rename_user_sqlite(self.pool.sqlite()?, id, username).await,
            DatabaseDriver::Mysql => rename_user_mysql(self.pool.mysql()?, id, username).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM users WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete user")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete user")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn list_by_role(&self, role: UserRole) -> Result<Vec<User>> {
        let (primary, legacy) = role_values(role);
        let sql = format!(
            "SELECT {} FROM users WHERE role IN (?, ?) ORDER BY username",
            USER_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .bind(primary)
                    .bind(legacy)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list users")?;
                rows.iter().map(row_to_user_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .bind(primary)
                    .bind(legacy)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list users")?;
                rows.iter().map(row_to_user_mysql).collect()
            }
        }
    }

    async fn count_by_role(&self, role: UserRole) -> Result<i64> {
        let (primary, legacy) = role_values(role);
        let sql = "SELECT COUNT(*) FROM users WHERE role IN (?, ?)";
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar(sql)
                .bind(primary)
                .bind(legacy)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count users")?,
            DatabaseDriver::Mysql => sqlx::query_scalar(sql)
                .bind(primary)
                .bind(legacy)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count users")?,
        };
        Ok(count)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, role, pin, pin_created_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(&user.pin)
    .bind(user.pin_created_at)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn rename_user_sqlite(pool: &SqlitePool, id: i64, username: &str) -> Result<bool> {
    let result = sqlx::query("UPDATE users SET username = ?, updated_at = ? WHERE id = ?")
        .bind(username)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to rename user")?;
    Ok(result.rows_affected() > 0)
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role,
        pin: row.get("pin"),
        pin_created_at: row.get("pin_created_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, role, pin, pin_created_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(&user.pin)
    .bind(user.pin_created_at)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn rename_user_mysql(pool: &MySqlPool, id: i64, username: &str) -> Result<bool> {
    // MySQL reports zero affected rows when the value is unchanged, so check
    // existence separately.
    sqlx::query("UPDATE users SET username = ?, updated_at = ? WHERE id = ?")
        .bind(username)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to rename user")?;

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to check user")?;
    Ok(count > 0)
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role,
        pin: row.get("pin"),
        pin_created_at: row.get("pin_created_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
