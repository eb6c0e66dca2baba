//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for one entity.

pub mod auth_token;
pub mod task;
pub mod user;
pub mod work_session;

pub use auth_token::{AuthTokenRepository, SqlxAuthTokenRepository};
pub use task::{SqlxTaskRepository, TaskRepository};
pub use user::{SqlxUserRepository, UserRepository};
pub use work_session::{SqlxWorkSessionRepository, WorkSessionRepository};
