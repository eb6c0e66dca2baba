//! Services layer - Business logic
//!
//! Services own the rules of the timeclock:
//! - the work session lifecycle and its duration accounting
//! - accounts, PINs and bearer tokens
//! - task assignment
//!
//! Each service holds its repositories as trait objects and reads time from
//! an injected [`clock::Clock`].

pub mod clock;
pub mod credentials;
pub mod rate_limiter;
pub mod stats;
pub mod task;
pub mod time_entry;
pub mod user;

pub use clock::{Clock, DynClock, ManualClock, SystemClock};
pub use credentials::{hash_password, verify_password};
pub use rate_limiter::LoginRateLimiter;
pub use stats::{AdminStats, StatsService};
pub use task::{TaskService, TaskServiceError};
pub use time_entry::{TimeEntryAction, TimeEntryError, TimeEntryService};
pub use user::{EmployeeView, UserService, UserServiceError};
