//! Auth token repository
//!
//! Bearer tokens issued at login. Tokens die with their user through the
//! foreign key cascade.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::AuthToken;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Auth token repository trait
#[async_trait]
pub trait AuthTokenRepository: Send + Sync {
    async fn create(&self, token: &AuthToken) -> Result<AuthToken>;

    async fn get_by_id(&self, id: &str) -> Result<Option<AuthToken>>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete tokens that expired before `now`, returning how many
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// SQLx-based auth token repository implementation
pub struct SqlxAuthTokenRepository {
    pool: DynDatabasePool,
}

impl SqlxAuthTokenRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AuthTokenRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AuthTokenRepository for SqlxAuthTokenRepository {
    async fn create(&self, token: &AuthToken) -> Result<AuthToken> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_token_sqlite(self.pool.sqlite()?, token).await,
            DatabaseDriver::Mysql => create_token_mysql(self.pool.mysql()?, token).await,
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<AuthToken>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_token_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_token_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let sql = "DELETE FROM auth_tokens WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to delete auth token")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to delete auth token")?;
            }
        }
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let sql = "DELETE FROM auth_tokens WHERE expires_at < ?";
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete expired auth tokens")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete expired auth tokens")?
                .rows_affected(),
        };
        Ok(result)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_token_sqlite(pool: &SqlitePool, token: &AuthToken) -> Result<AuthToken> {
    sqlx::query("INSERT INTO auth_tokens (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)")
        .bind(&token.id)
        .bind(token.user_id)
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(pool)
        .await
        .context("Failed to create auth token")?;

    Ok(token.clone())
}

async fn get_token_sqlite(pool: &SqlitePool, id: &str) -> Result<Option<AuthToken>> {
    let row = sqlx::query("SELECT id, user_id, expires_at, created_at FROM auth_tokens WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get auth token")?;

    Ok(row.map(|row| AuthToken {
        id: row.get("id"),
        user_id: row.get("user_id"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }))
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_token_mysql(pool: &MySqlPool, token: &AuthToken) -> Result<AuthToken> {
    sqlx::query("INSERT INTO auth_tokens (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)")
        .bind(&token.id)
        .bind(token.user_id)
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(pool)
        .await
        .context("Failed to create auth token")?;

    Ok(token.clone())
}

async fn get_token_mysql(pool: &MySqlPool, id: &str) -> Result<Option<AuthToken>> {
    let row = sqlx::query("SELECT id, user_id, expires_at, created_at FROM auth_tokens WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get auth token")?;

    Ok(row.map(|row| AuthToken {
        id: row.get("id"),
        user_id: row.get("user_id"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }))
}
