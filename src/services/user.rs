//! User service
//!
//! Accounts and authentication:
//! - signup and admin creation, each issuing a fresh PIN
//! - login by PIN or by email and password, returning a bearer token
//! - token validation and logout
//! - PIN regeneration
//! - employee listing with live clock status, rename and delete

use crate::config::AuthConfig;
use crate::db::is_unique_violation;
use crate::db::repositories::{AuthTokenRepository, UserRepository, WorkSessionRepository};
use crate::models::{AuthToken, CreateUserInput, User, UserRole};
use crate::services::clock::DynClock;
use crate::services::credentials::{
    generate_pin, generate_token, hash_password, is_pin_shaped, verify_password,
};
use anyhow::{anyhow, Context};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Attempts at drawing a PIN no other account holds
const PIN_ALLOCATION_ATTEMPTS: usize = 32;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("{0}")]
    ValidationError(String),

    /// Duplicate username or email on self-service signup
    #[error("That email/username is already taken")]
    AlreadyTaken,

    /// Duplicate username or email on admin creation
    #[error("{0}")]
    Conflict(String),

    #[error("Invalid PIN")]
    InvalidPin,

    #[error("PIN expired")]
    PinExpired,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// A newly created account and its first PIN
#[derive(Debug, Clone)]
pub struct Registered {
    pub user: User,
    pub pin: String,
}

/// Successful login
#[derive(Debug, Clone)]
pub struct LoggedIn {
    pub user: User,
    pub token: AuthToken,
}

/// Employee row for the admin dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmployeeView {
    #[serde(with = "crate::models::id_string")]
    pub id: i64,
    pub username: String,
    pub email: String,
    /// `off`, or the status of the open session
    pub status: String,
}

/// User service for accounts and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    token_repo: Arc<dyn AuthTokenRepository>,
    session_repo: Arc<dyn WorkSessionRepository>,
    clock: DynClock,
    config: AuthConfig,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        token_repo: Arc<dyn AuthTokenRepository>,
        session_repo: Arc<dyn WorkSessionRepository>,
        clock: DynClock,
        config: AuthConfig,
    ) -> Self {
        Self {
            user_repo,
            token_repo,
            session_repo,
            clock,
            config,
        }
    }

    /// Self-service employee signup
    pub async fn signup(&self, input: CreateUserInput) -> Result<Registered, UserServiceError> {
        match self.create_account(input, UserRole::User).await {
            Err(UserServiceError::Conflict(_)) => Err(UserServiceError::AlreadyTaken),
            other => other,
        }
    }

    /// Create another administrator. Only admins may do this.
    pub async fn create_admin(
        &self,
        creator: &User,
        input: CreateUserInput,
    ) -> Result<Registered, UserServiceError> {
        if !creator.is_admin() {
            return Err(UserServiceError::Forbidden(
                "Only admins can create admin accounts".to_string(),
            ));
        }
        let registered = self.create_account(input, UserRole::Admin).await?;
        tracing::info!(
            admin_id = registered.user.id,
            created_by = creator.id,
            "Admin account created"
        );
        Ok(registered)
    }

    /// Create `input` as an admin unless some admin already exists
    pub async fn ensure_admin(
        &self,
        input: CreateUserInput,
    ) -> Result<Option<Registered>, UserServiceError> {
        if self.user_repo.count_by_role(UserRole::Admin).await? > 0 {
            return Ok(None);
        }
        let registered = self.create_account(input, UserRole::Admin).await?;
        tracing::info!(
            admin_id = registered.user.id,
            email = %registered.user.email,
            "Bootstrap admin created"
        );
        Ok(Some(registered))
    }

    async fn create_account(
        &self,
        input: CreateUserInput,
        role: UserRole,
    ) -> Result<Registered, UserServiceError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_lowercase();
        if username.is_empty() || email.is_empty() || input.password.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Missing required fields".to_string(),
            ));
        }
        if !email.contains('@') {
            return Err(UserServiceError::ValidationError(
                "Invalid email format".to_string(),
            ));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let pin = self.allocate_pin().await?;

        let mut user = User::new(username, email, password_hash, role);
        user.pin = Some(pin.clone());
        user.pin_created_at = Some(self.clock.now());

        let created = match self.user_repo.create(&user).await {
            Ok(created) => created,
            Err(e) if is_unique_violation(&e) => {
                return Err(UserServiceError::Conflict(
                    "A user with that email or username already exists".to_string(),
                ))
            }
            Err(e) => return Err(e.context("Failed to create user").into()),
        };

        tracing::info!(user_id = created.id, role = %created.role, "Account created");
        Ok(Registered { user: created, pin })
    }

    /// Draw a PIN that no account currently holds
    async fn allocate_pin(&self) -> Result<String, UserServiceError> {
        for _ in 0..PIN_ALLOCATION_ATTEMPTS {
            let pin = generate_pin();
            if !self.user_repo.pin_in_use(&pin).await? {
                return Ok(pin);
            }
        }
        Err(anyhow!("Could not allocate an unused PIN").into())
    }

    pub async fn login_with_pin(&self, pin: &str) -> Result<LoggedIn, UserServiceError> {
        let pin = pin.trim();
        if !is_pin_shaped(pin) {
            return Err(UserServiceError::InvalidPin);
        }

        let user = self
            .user_repo
            .get_by_pin(pin)
            .await?
            .ok_or(UserServiceError::InvalidPin)?;

        if !user.pin_is_fresh(self.clock.now(), self.config.pin_lifespan_days) {
            return Err(UserServiceError::PinExpired);
        }

        self.issue_token(user).await
    }

    pub async fn login_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<LoggedIn, UserServiceError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || password.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Email and password are required".to_string(),
            ));
        }

        let user = self
            .user_repo
            .get_by_email(&email)
            .await?
            .ok_or(UserServiceError::InvalidCredentials)?;

        let valid = verify_password(password, &user.password_hash)
            .context("Failed to verify password")?;
        if !valid {
            return Err(UserServiceError::InvalidCredentials);
        }

        self.issue_token(user).await
    }

    async fn issue_token(&self, user: User) -> Result<LoggedIn, UserServiceError> {
        let now = self.clock.now();
        let token = AuthToken {
            id: generate_token(),
            user_id: user.id,
            expires_at: now + Duration::days(self.config.token_lifespan_days),
            created_at: now,
        };
        let token = self
            .token_repo
            .create(&token)
            .await
            .context("Failed to create auth token")?;

        tracing::info!(user_id = user.id, "User logged in");
        Ok(LoggedIn { user, token })
    }

    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.token_repo
            .delete(token)
            .await
            .context("Failed to delete auth token")?;
        Ok(())
    }

    /// The user behind a bearer token, if the token is live
    pub async fn validate_token(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(stored) = self.token_repo.get_by_id(token).await? else {
            return Ok(None);
        };

        if stored.is_expired_at(self.clock.now()) {
            self.token_repo.delete(token).await?;
            return Ok(None);
        }

        Ok(self.user_repo.get_by_id(stored.user_id).await?)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self.user_repo.get_by_id(id).await?)
    }

    /// Issue a new PIN, restarting its lifespan
    pub async fn regenerate_pin(
        &self,
        user_id: i64,
    ) -> Result<(String, DateTime<Utc>), UserServiceError> {
        let pin = self.allocate_pin().await?;
        let issued_at = self.clock.now();

        if !self.user_repo.update_pin(user_id, &pin, issued_at).await? {
            return Err(UserServiceError::NotFound("User not found".to_string()));
        }

        tracing::info!(user_id, "PIN regenerated");
        Ok((pin, issued_at))
    }

    /// Employees with their current clock status
    pub async fn list_employees(&self) -> Result<Vec<EmployeeView>, UserServiceError> {
        let employees = self.user_repo.list_by_role(UserRole::User).await?;
        let open: HashMap<i64, String> = self
            .session_repo
            .list_open()
            .await?
            .into_iter()
            .map(|s| (s.user_id, s.status.to_string()))
            .collect();

        Ok(employees
            .into_iter()
            .map(|user| EmployeeView {
                status: open.get(&user.id).cloned().unwrap_or_else(|| "off".to_string()),
                id: user.id,
                username: user.username,
                email: user.email,
            })
            .collect())
    }

    pub async fn rename_employee(&self, id: i64, username: &str) -> Result<(), UserServiceError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Username is required".to_string(),
            ));
        }

        match self.user_repo.rename(id, username).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(UserServiceError::NotFound("Employee not found".to_string())),
            Err(e) if is_unique_violation(&e) => Err(UserServiceError::AlreadyTaken),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove an employee together with their sessions, breaks and tokens
    pub async fn delete_employee(&self, id: i64) -> Result<(), UserServiceError> {
        if self.user_repo.get_by_id(id).await?.is_none() {
            return Err(UserServiceError::NotFound("Employee not found".to_string()));
        }

        let sessions = self.session_repo.delete_by_user(id).await?;
        self.user_repo.delete(id).await?;

        tracing::info!(user_id = id, sessions, "Employee deleted");
        Ok(())
    }

    pub async fn count_employees(&self) -> Result<i64, UserServiceError> {
        Ok(self.user_repo.count_by_role(UserRole::User).await?)
    }

    /// Drop expired bearer tokens
    pub async fn cleanup_expired_tokens(&self) -> Result<u64, UserServiceError> {
        Ok(self.token_repo.delete_expired(self.clock.now()).await?)
    }
}
