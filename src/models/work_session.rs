//! Work session model
//!
//! A work session covers one clock-in period of a user. While it is open it
//! moves between `active` and `on-break`; it ends either `completed` (clock-out)
//! or `abandoned` (superseded by a later clock-in).
//!
//! Transitions are methods on [`WorkSession`]. Each one checks the current
//! [`SessionState`] and either mutates the session or returns a
//! [`TransitionError`], so callers never have to interpret status strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stored status of a work session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Active,
    OnBreak,
    Completed,
    Abandoned,
}

impl SessionStatus {
    /// Open sessions count against the one-per-user limit
    pub fn is_open(self) -> bool {
        matches!(self, SessionStatus::Active | SessionStatus::OnBreak)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::OnBreak => "on-break",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "on-break" => Ok(SessionStatus::OnBreak),
            "completed" => Ok(SessionStatus::Completed),
            "abandoned" => Ok(SessionStatus::Abandoned),
            _ => Err(anyhow::anyhow!("Invalid session status: {}", s)),
        }
    }
}

/// Where a user currently stands in the clock-in/break cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No open session
    Off,
    /// Clocked in and working
    Active,
    /// Clocked in, on the given break
    OnBreak {
        break_id: String,
        started_at: DateTime<Utc>,
    },
}

impl SessionState {
    /// Label shown in employee listings
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Off => "off",
            SessionState::Active => "active",
            SessionState::OnBreak { .. } => "on-break",
        }
    }
}

/// A finished break. Never modified after it is appended to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Break {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Whole seconds between start and end
    pub duration: i64,
}

impl Break {
    fn closed(id: String, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            id,
            start_time,
            end_time,
            duration: elapsed_seconds(start_time, end_time),
        }
    }
}

/// Transition rejected because the session is in the wrong state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("No active session found")]
    NoActiveSession,

    #[error("Not currently on break")]
    NotOnBreak,
}

/// Result of a successful clock-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Gross seconds from clock-in to clock-out
    pub duration: i64,
    /// Break that was still running and got closed by the clock-out
    pub closed_break: Option<Break>,
}

/// One clock-in period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkSession {
    pub id: String,
    pub user_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    /// Gross seconds, set on completion only
    pub duration: Option<i64>,
    pub breaks: Vec<Break>,
    pub current_break_id: Option<String>,
    pub current_break_start: Option<DateTime<Utc>>,
}

impl WorkSession {
    /// A freshly clocked-in session
    pub fn start(user_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            start_time: now,
            end_time: None,
            status: SessionStatus::Active,
            duration: None,
            breaks: Vec::new(),
            current_break_id: None,
            current_break_start: None,
        }
    }

    /// Derive the state machine position from the stored fields
    pub fn state(&self) -> SessionState {
        match self.status {
            SessionStatus::Active => SessionState::Active,
            SessionStatus::OnBreak => match (&self.current_break_id, self.current_break_start) {
                (Some(id), Some(started_at)) => SessionState::OnBreak {
                    break_id: id.clone(),
                    started_at,
                },
                // A break without bookkeeping cannot be closed; treat the
                // session as working so it can still be clocked out.
                _ => SessionState::Active,
            },
            SessionStatus::Completed | SessionStatus::Abandoned => SessionState::Off,
        }
    }

    /// active → on-break
    pub fn start_break(&mut self, now: DateTime<Utc>) -> Result<String, TransitionError> {
        match self.state() {
            SessionState::Active => {
                let break_id = Uuid::new_v4().to_string();
                self.status = SessionStatus::OnBreak;
                self.current_break_id = Some(break_id.clone());
                self.current_break_start = Some(now);
                Ok(break_id)
            }
            SessionState::OnBreak { .. } | SessionState::Off => {
                Err(TransitionError::NoActiveSession)
            }
        }
    }

    /// on-break → active, appending the finished break
    pub fn end_break(&mut self, now: DateTime<Utc>) -> Result<Break, TransitionError> {
        match self.state() {
            SessionState::OnBreak {
                break_id,
                started_at,
            } => {
                let finished = Break::closed(break_id, started_at, now);
                self.breaks.push(finished.clone());
                self.status = SessionStatus::Active;
                self.current_break_id = None;
                self.current_break_start = None;
                Ok(finished)
            }
            SessionState::Active | SessionState::Off => Err(TransitionError::NotOnBreak),
        }
    }

    /// active | on-break → completed
    ///
    /// A running break is closed at `now` before the session is finalized.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<Completion, TransitionError> {
        let closed_break = match self.state() {
            SessionState::Off => return Err(TransitionError::NoActiveSession),
            SessionState::Active => {
                self.current_break_id = None;
                self.current_break_start = None;
                None
            }
            SessionState::OnBreak { .. } => Some(self.end_break(now).map_err(|_| TransitionError::NoActiveSession)?),
        };

        let duration = elapsed_seconds(self.start_time, now);
        self.status = SessionStatus::Completed;
        self.end_time = Some(now);
        self.duration = Some(duration);

        Ok(Completion {
            duration,
            closed_break,
        })
    }

    /// Mark an open session as superseded by a newer clock-in.
    ///
    /// A running break is closed at `now` and returned so it can be stored
    /// with the session.
    pub fn abandon(&mut self, now: DateTime<Utc>) -> Option<Break> {
        let closed_break = match self.state() {
            SessionState::Off => return None,
            SessionState::Active => None,
            SessionState::OnBreak {
                break_id,
                started_at,
            } => {
                let finished = Break::closed(break_id, started_at, now);
                self.breaks.push(finished.clone());
                Some(finished)
            }
        };

        self.status = SessionStatus::Abandoned;
        self.end_time = Some(now);
        self.current_break_id = None;
        self.current_break_start = None;
        closed_break
    }

    /// Sum of all finished breaks, in seconds
    pub fn break_duration(&self) -> i64 {
        self.breaks.iter().map(|b| b.duration).sum()
    }

    /// Seconds spent so far on the break that is still running
    pub fn running_break_duration(&self, now: DateTime<Utc>) -> i64 {
        match self.state() {
            SessionState::OnBreak { started_at, .. } => {
                elapsed_seconds(started_at, self.end_time.unwrap_or(now))
            }
            SessionState::Active | SessionState::Off => 0,
        }
    }

    /// Gross seconds: the stored duration once completed, otherwise the time
    /// elapsed so far (up to `end_time` for abandoned sessions).
    pub fn gross_duration(&self, now: DateTime<Utc>) -> i64 {
        match self.duration {
            Some(duration) => duration,
            None => elapsed_seconds(self.start_time, self.end_time.unwrap_or(now)),
        }
    }

    /// Net working seconds, never negative. A running break does not count
    /// as work.
    pub fn net_duration(&self, now: DateTime<Utc>) -> i64 {
        net_seconds(
            self.gross_duration(now),
            self.break_duration() + self.running_break_duration(now),
        )
    }
}

/// Whole seconds from `from` to `to`, floored and clamped at zero
pub fn elapsed_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds().max(0)
}

/// Gross minus breaks, floored at zero
pub fn net_seconds(gross: i64, breaks: i64) -> i64 {
    (gross - breaks).max(0)
}
