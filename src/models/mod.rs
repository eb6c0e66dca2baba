//! Data models
//!
//! Database entities and the pure logic attached to them. The work session
//! state machine lives in [`work_session`].

mod auth_token;
pub mod id_string;
mod pagination;
mod task;
mod user;
pub mod work_session;

pub use auth_token::AuthToken;
pub use id_string::Id;
pub use pagination::{ListParams, Pagination};
pub use task::{CreateTaskInput, Task, TaskStatus};
pub use user::{CreateUserInput, User, UserRole};
pub use work_session::{
    Break, Completion, SessionState, SessionStatus, TransitionError, WorkSession,
};
