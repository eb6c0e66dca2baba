//! Time-entry service
//!
//! Drives a user's work session through clock-in, breaks and clock-out.
//!
//! The session model decides whether a transition is legal; this service
//! loads the open session, applies the transition in memory and persists it
//! with a conditional write. If the write finds the session already moved by
//! another request, the caller gets the same precondition error they would
//! have seen had they arrived second.

use crate::config::TimeEntryConfig;
use crate::db::is_unique_violation;
use crate::db::repositories::WorkSessionRepository;
use crate::models::{
    Break, ListParams, Pagination, SessionState, SessionStatus, TransitionError, WorkSession,
};
use crate::services::clock::DynClock;
use anyhow::{anyhow, Context};
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;

/// Error types for time-entry operations
#[derive(Debug, thiserror::Error)]
pub enum TimeEntryError {
    #[error("No active session found")]
    NoActiveSession,

    #[error("Not currently on break")]
    NotOnBreak,

    /// Another clock-in for the same user won the race
    #[error("A clock-in is already in progress for this user")]
    ClockInConflict,

    #[error("Invalid action")]
    InvalidAction,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<TransitionError> for TimeEntryError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::NoActiveSession => TimeEntryError::NoActiveSession,
            TransitionError::NotOnBreak => TimeEntryError::NotOnBreak,
        }
    }
}

/// Actions accepted by the time-entries endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeEntryAction {
    ClockIn,
    ClockOut,
    StartBreak,
    EndBreak,
    GetSessions,
    GetMonthlyDuration,
    GetStatus,
}

impl FromStr for TimeEntryAction {
    type Err = TimeEntryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clock-in" => Ok(Self::ClockIn),
            "clock-out" => Ok(Self::ClockOut),
            "start-break" => Ok(Self::StartBreak),
            "end-break" => Ok(Self::EndBreak),
            "get-sessions" => Ok(Self::GetSessions),
            "get-monthly-duration" => Ok(Self::GetMonthlyDuration),
            "get-status" => Ok(Self::GetStatus),
            _ => Err(TimeEntryError::InvalidAction),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockedIn {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    /// Open sessions this clock-in superseded
    #[serde(skip)]
    pub abandoned: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockedOut {
    pub session_id: String,
    pub duration: i64,
    pub break_duration: i64,
    pub net_duration: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakStarted {
    pub session_id: String,
    pub break_id: String,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakEnded {
    pub session_id: String,
    pub break_id: String,
    pub duration: i64,
}

/// A session as shown to clients, with derived durations
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: String,
    #[serde(with = "crate::models::id_string")]
    pub user_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub duration: Option<i64>,
    pub breaks: Vec<Break>,
    pub current_break_id: Option<String>,
    pub current_break_start: Option<DateTime<Utc>>,
    pub break_duration: i64,
    pub net_duration: i64,
}

impl SessionView {
    pub fn new(session: WorkSession, now: DateTime<Utc>) -> Self {
        let break_duration = session.break_duration();
        let net_duration = session.net_duration(now);
        Self {
            id: session.id,
            user_id: session.user_id,
            start_time: session.start_time,
            end_time: session.end_time,
            status: session.status,
            duration: session.duration,
            breaks: session.breaks,
            current_break_id: session.current_break_id,
            current_break_start: session.current_break_start,
            break_duration,
            net_duration,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionPage {
    pub sessions: Vec<SessionView>,
    pub pagination: Pagination,
}

/// Totals over completed sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationSummary {
    pub total_duration: i64,
    pub break_duration: i64,
    pub net_duration: i64,
    pub session_count: i64,
}

impl DurationSummary {
    fn add(&mut self, session: &WorkSession, now: DateTime<Utc>) {
        self.total_duration += session.gross_duration(now);
        self.break_duration += session.break_duration();
        self.net_duration += session.net_duration(now);
        self.session_count += 1;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    /// `off`, `active` or `on-break`
    pub status: &'static str,
    pub session: Option<SessionView>,
}

/// Time-entry service
pub struct TimeEntryService {
    repo: Arc<dyn WorkSessionRepository>,
    clock: DynClock,
    config: TimeEntryConfig,
}

impl TimeEntryService {
    pub fn new(
        repo: Arc<dyn WorkSessionRepository>,
        clock: DynClock,
        config: TimeEntryConfig,
    ) -> Self {
        Self {
            repo,
            clock,
            config,
        }
    }

    /// Start a new session, abandoning whatever was left open
    pub async fn clock_in(&self, user_id: i64) -> Result<ClockedIn, TimeEntryError> {
        let session = WorkSession::start(user_id, self.clock.now());

        let abandoned = match self.repo.clock_in(&session).await {
            Ok(abandoned) => abandoned,
            Err(e) if is_unique_violation(&e) => {
                tracing::warn!(user_id, "Concurrent clock-in rejected");
                return Err(TimeEntryError::ClockInConflict);
            }
            Err(e) => return Err(e.context("Failed to clock in").into()),
        };

        if !abandoned.is_empty() {
            tracing::warn!(user_id, ?abandoned, "Abandoned open sessions on clock-in");
        }
        tracing::info!(user_id, session_id = %session.id, "Clocked in");

        Ok(ClockedIn {
            session_id: session.id,
            start_time: session.start_time,
            abandoned,
        })
    }

    /// Complete the open session, closing a running break first
    pub async fn clock_out(&self, user_id: i64) -> Result<ClockedOut, TimeEntryError> {
        let now = self.clock.now();
        let mut session = self
            .repo
            .get_open(user_id)
            .await?
            .ok_or(TimeEntryError::NoActiveSession)?;

        let previous = session.status;
        let completion = session.complete(now)?;

        if !self
            .repo
            .complete(&session, previous, completion.closed_break.as_ref())
            .await?
        {
            return Err(TimeEntryError::NoActiveSession);
        }

        tracing::info!(
            user_id,
            session_id = %session.id,
            duration = completion.duration,
            "Clocked out"
        );

        Ok(ClockedOut {
            duration: completion.duration,
            break_duration: session.break_duration(),
            net_duration: session.net_duration(now),
            session_id: session.id,
        })
    }

    pub async fn start_break(&self, user_id: i64) -> Result<BreakStarted, TimeEntryError> {
        let now = self.clock.now();
        let mut session = self
            .repo
            .get_open(user_id)
            .await?
            .ok_or(TimeEntryError::NoActiveSession)?;

        let break_id = session.start_break(now)?;

        if !self.repo.begin_break(&session.id, &break_id, now).await? {
            return Err(TimeEntryError::NoActiveSession);
        }

        tracing::debug!(user_id, session_id = %session.id, %break_id, "Break started");

        Ok(BreakStarted {
            session_id: session.id,
            break_id,
            start_time: now,
        })
    }

    pub async fn end_break(&self, user_id: i64) -> Result<BreakEnded, TimeEntryError> {
        let now = self.clock.now();
        let mut session = self
            .repo
            .get_open(user_id)
            .await?
            .ok_or(TimeEntryError::NotOnBreak)?;

        let finished = session.end_break(now)?;

        if !self.repo.finish_break(&session.id, &finished).await? {
            return Err(TimeEntryError::NotOnBreak);
        }

        tracing::debug!(user_id, session_id = %session.id, break_id = %finished.id, "Break ended");

        Ok(BreakEnded {
            session_id: session.id,
            break_id: finished.id,
            duration: finished.duration,
        })
    }

    /// Recent sessions, newest first
    pub async fn sessions(
        &self,
        user_id: i64,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<SessionPage, TimeEntryError> {
        let now = self.clock.now();
        let params = ListParams::new(
            page,
            page_size,
            self.config.default_page_size,
            self.config.max_page_size,
        );
        let since = now - Duration::days(self.config.window_days);

        let (sessions, total) = self
            .repo
            .list_recent(user_id, since, params.limit(), params.offset())
            .await?;

        Ok(SessionPage {
            sessions: sessions
                .into_iter()
                .map(|s| SessionView::new(s, now))
                .collect(),
            pagination: Pagination::new(&params, total),
        })
    }

    /// Totals over the user's completed sessions of the current UTC month
    pub async fn monthly_duration(&self, user_id: i64) -> Result<DurationSummary, TimeEntryError> {
        self.month_summary(Some(user_id)).await
    }

    /// Same as [`Self::monthly_duration`], across one user or everyone
    pub async fn month_summary(
        &self,
        user_id: Option<i64>,
    ) -> Result<DurationSummary, TimeEntryError> {
        let now = self.clock.now();
        let (from, to) = month_bounds(now)?;

        let sessions = self.repo.list_completed_between(user_id, from, to).await?;

        let mut summary = DurationSummary::default();
        for session in &sessions {
            summary.add(session, now);
        }
        Ok(summary)
    }

    pub async fn status(&self, user_id: i64) -> Result<StatusView, TimeEntryError> {
        let now = self.clock.now();
        let open = self.repo.get_open(user_id).await?;

        Ok(match open {
            Some(session) => StatusView {
                status: session.state().label(),
                session: Some(SessionView::new(session, now)),
            },
            None => StatusView {
                status: SessionState::Off.label(),
                session: None,
            },
        })
    }

    /// Every open session, without breaks
    pub async fn open_sessions(&self) -> Result<Vec<WorkSession>, TimeEntryError> {
        Ok(self
            .repo
            .list_open()
            .await
            .context("Failed to load open sessions")?)
    }
}

/// `[first instant of the month, first instant of the next month)`
fn month_bounds(now: DateTime<Utc>) -> anyhow::Result<(DateTime<Utc>, DateTime<Utc>)> {
    let (next_year, next_month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };

    let from = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .ok_or_else(|| anyhow!("Invalid month start for {}", now))?;
    let to = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| anyhow!("Invalid month end for {}", now))?;
    Ok((from, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, SqlxWorkSessionRepository, UserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{User, UserRole};
    use crate::services::clock::{Clock, ManualClock};
    use proptest::prelude::*;

    struct Harness {
        pool: DynDatabasePool,
        clock: Arc<ManualClock>,
        service: TimeEntryService,
        repo: Arc<dyn WorkSessionRepository>,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 8, 0, 0).unwrap()
    }

    async fn setup() -> Harness {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let clock = Arc::new(ManualClock::new(t0()));
        let repo = SqlxWorkSessionRepository::boxed(pool.clone());
        let service = TimeEntryService::new(repo.clone(), clock.clone(), TimeEntryConfig::default());
        Harness {
            pool,
            clock,
            service,
            repo,
        }
    }

    async fn create_user(pool: &DynDatabasePool, name: &str) -> i64 {
        SqlxUserRepository::new(pool.clone())
            .create(&User::new(
                name.to_string(),
                format!("{}@test.com", name),
                "hash".to_string(),
                UserRole::User,
            ))
            .await
            .unwrap()
            .id
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!(TimeEntryAction::from_str("clock-in").unwrap(), TimeEntryAction::ClockIn);
        assert_eq!(
            TimeEntryAction::from_str("get-monthly-duration").unwrap(),
            TimeEntryAction::GetMonthlyDuration
        );
        assert!(matches!(
            TimeEntryAction::from_str("clock_in"),
            Err(TimeEntryError::InvalidAction)
        ));
    }

    #[test]
    fn test_month_bounds() {
        let (from, to) = month_bounds(Utc.with_ymd_and_hms(2024, 12, 15, 10, 0, 0).unwrap()).unwrap();
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_full_day_scenario() {
        let h = setup().await;
        let user = create_user(&h.pool, "alice").await;

        let clocked_in = h.service.clock_in(user).await.unwrap();
        assert_eq!(clocked_in.start_time, t0());

        h.clock.advance(Duration::seconds(3600));
        let started = h.service.start_break(user).await.unwrap();
        assert_eq!(started.session_id, clocked_in.session_id);

        h.clock.advance(Duration::seconds(600));
        let ended = h.service.end_break(user).await.unwrap();
        assert_eq!(ended.break_id, started.break_id);
        assert_eq!(ended.duration, 600);

        h.clock.advance(Duration::seconds(1800));
        let out = h.service.clock_out(user).await.unwrap();
        assert_eq!(
            out,
            ClockedOut {
                session_id: clocked_in.session_id.clone(),
                duration: 6000,
                break_duration: 600,
                net_duration: 5400,
            }
        );

        let stored = h.repo.get_by_id(&clocked_in.session_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Completed);
        assert_eq!(stored.breaks.len(), 1);
        assert_eq!(stored.breaks[0].duration, 600);
    }

    #[tokio::test]
    async fn test_clock_out_without_session() {
        let h = setup().await;
        let user = create_user(&h.pool, "bob").await;

        let err = h.service.clock_out(user).await.unwrap_err();
        assert!(matches!(err, TimeEntryError::NoActiveSession));
        assert_eq!(err.to_string(), "No active session found");
    }

    #[tokio::test]
    async fn test_clock_in_abandons_active_session() {
        let h = setup().await;
        let user = create_user(&h.pool, "carol").await;

        let first = h.service.clock_in(user).await.unwrap();
        h.clock.advance(Duration::minutes(30));
        let second = h.service.clock_in(user).await.unwrap();
        assert_eq!(second.abandoned, vec![first.session_id.clone()]);

        let old = h.repo.get_by_id(&first.session_id).await.unwrap().unwrap();
        assert_eq!(old.status, SessionStatus::Abandoned);
        assert_eq!(old.end_time, Some(t0() + Duration::minutes(30)));
        assert!(old.duration.is_none());
    }

    #[tokio::test]
    async fn test_break_preconditions() {
        let h = setup().await;
        let user = create_user(&h.pool, "dan").await;

        assert!(matches!(
            h.service.start_break(user).await,
            Err(TimeEntryError::NoActiveSession)
        ));
        assert!(matches!(
            h.service.end_break(user).await,
            Err(TimeEntryError::NotOnBreak)
        ));

        h.service.clock_in(user).await.unwrap();
        assert!(matches!(
            h.service.end_break(user).await,
            Err(TimeEntryError::NotOnBreak)
        ));

        h.service.start_break(user).await.unwrap();
        // Already on break: no active session to start another from
        assert!(matches!(
            h.service.start_break(user).await,
            Err(TimeEntryError::NoActiveSession)
        ));
    }

    #[tokio::test]
    async fn test_end_break_appends_once() {
        let h = setup().await;
        let user = create_user(&h.pool, "erin").await;
        h.service.clock_in(user).await.unwrap();
        h.service.start_break(user).await.unwrap();
        h.clock.advance(Duration::seconds(125));
        h.service.end_break(user).await.unwrap();
        assert!(h.service.end_break(user).await.is_err());

        let open = h.repo.get_open(user).await.unwrap().unwrap();
        assert_eq!(open.breaks.len(), 1);
        assert_eq!(open.breaks[0].duration, 125);
        assert_eq!(
            open.breaks[0].end_time - open.breaks[0].start_time,
            Duration::seconds(125)
        );
    }

    #[tokio::test]
    async fn test_clock_out_on_break_closes_break() {
        let h = setup().await;
        let user = create_user(&h.pool, "fay").await;
        h.service.clock_in(user).await.unwrap();
        h.clock.advance(Duration::seconds(1000));
        h.service.start_break(user).await.unwrap();
        h.clock.advance(Duration::seconds(200));

        let out = h.service.clock_out(user).await.unwrap();
        assert_eq!(out.duration, 1200);
        assert_eq!(out.break_duration, 200);
        assert_eq!(out.net_duration, 1000);

        let stored = h.repo.get_by_id(&out.session_id).await.unwrap().unwrap();
        assert_eq!(stored.breaks.len(), 1);
        assert!(stored.current_break_id.is_none());
    }

    #[tokio::test]
    async fn test_sessions_window_order_and_paging() {
        let h = setup().await;
        let user = create_user(&h.pool, "gus").await;

        // One session per day for 35 days, each 1 hour long
        for _ in 0..35 {
            h.service.clock_in(user).await.unwrap();
            h.clock.advance(Duration::hours(1));
            h.service.clock_out(user).await.unwrap();
            h.clock.advance(Duration::hours(23));
        }

        let page = h.service.sessions(user, None, None).await.unwrap();
        assert_eq!(page.sessions.len(), 10);
        assert_eq!(page.pagination.page, 1);
        assert_eq!(page.pagination.page_size, 10);
        assert_eq!(page.pagination.total, 30);
        assert_eq!(page.pagination.total_pages, 3);

        for pair in page.sessions.windows(2) {
            assert!(pair[0].start_time > pair[1].start_time);
        }
        let cutoff = h.clock.now() - Duration::days(30);
        assert!(page.sessions.iter().all(|s| s.start_time >= cutoff));
        assert_eq!(page.sessions[0].net_duration, 3600);

        let last = h.service.sessions(user, Some(3), Some(10)).await.unwrap();
        assert_eq!(last.sessions.len(), 10);
        let capped = h.service.sessions(user, Some(1), Some(1000)).await.unwrap();
        assert_eq!(capped.pagination.page_size, 100);
        assert_eq!(capped.sessions.len(), 30);
    }

    #[tokio::test]
    async fn test_monthly_duration() {
        let h = setup().await;
        let user = create_user(&h.pool, "hal").await;

        // Last month: excluded
        h.clock.set(Utc.with_ymd_and_hms(2024, 5, 31, 20, 0, 0).unwrap());
        h.service.clock_in(user).await.unwrap();
        h.clock.advance(Duration::hours(2));
        h.service.clock_out(user).await.unwrap();

        h.clock.set(t0());
        h.service.clock_in(user).await.unwrap();
        h.clock.advance(Duration::seconds(3000));
        h.service.start_break(user).await.unwrap();
        h.clock.advance(Duration::seconds(300));
        h.service.end_break(user).await.unwrap();
        h.clock.advance(Duration::seconds(700));
        h.service.clock_out(user).await.unwrap();

        // Still open: excluded
        h.service.clock_in(user).await.unwrap();

        let summary = h.service.monthly_duration(user).await.unwrap();
        assert_eq!(
            summary,
            DurationSummary {
                total_duration: 4000,
                break_duration: 300,
                net_duration: 3700,
                session_count: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_status_reports_state() {
        let h = setup().await;
        let user = create_user(&h.pool, "ivy").await;

        let off = h.service.status(user).await.unwrap();
        assert_eq!(off.status, "off");
        assert!(off.session.is_none());

        h.service.clock_in(user).await.unwrap();
        assert_eq!(h.service.status(user).await.unwrap().status, "active");

        h.clock.advance(Duration::seconds(100));
        h.service.start_break(user).await.unwrap();
        h.clock.advance(Duration::seconds(500));
        let on_break = h.service.status(user).await.unwrap();
        assert_eq!(on_break.status, "on-break");
        let view = on_break.session.unwrap();
        assert!(view.current_break_id.is_some());
        assert_eq!(view.net_duration, 100);

        let listed = h.service.sessions(user, None, None).await.unwrap();
        assert_eq!(listed.sessions[0].net_duration, 100);

        assert_eq!(h.service.open_sessions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clock_in_during_break_keeps_break_out_of_work_time() {
        let h = setup().await;
        let user = create_user(&h.pool, "jo").await;

        let first = h.service.clock_in(user).await.unwrap();
        h.clock.advance(Duration::seconds(100));
        h.service.start_break(user).await.unwrap();
        h.clock.advance(Duration::seconds(500));
        h.service.clock_in(user).await.unwrap();

        let page = h.service.sessions(user, None, None).await.unwrap();
        let old = page
            .sessions
            .iter()
            .find(|s| s.id == first.session_id)
            .unwrap();
        assert_eq!(old.status, SessionStatus::Abandoned);
        assert_eq!(old.breaks.len(), 1);
        assert_eq!(old.break_duration, 500);
        assert_eq!(old.net_duration, 100);
    }

    #[derive(Debug, Clone)]
    enum Op {
        ClockIn(usize),
        ClockOut(usize),
        StartBreak(usize),
        EndBreak(usize),
        Wait(i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..2usize).prop_map(Op::ClockIn),
            (0..2usize).prop_map(Op::ClockOut),
            (0..2usize).prop_map(Op::StartBreak),
            (0..2usize).prop_map(Op::EndBreak),
            (1..5000i64).prop_map(Op::Wait),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// Whatever the action sequence, no user ever has more than one open
        /// session, and completed sessions never report negative net time.
        #[test]
        fn prop_at_most_one_open_session(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let h = setup().await;
                let users = [
                    create_user(&h.pool, "p0").await,
                    create_user(&h.pool, "p1").await,
                ];

                for op in &ops {
                    // Precondition failures are expected; only internal errors are bugs
                    let outcome = match op {
                        Op::ClockIn(u) => h.service.clock_in(users[*u]).await.map(|_| ()),
                        Op::ClockOut(u) => h.service.clock_out(users[*u]).await.map(|_| ()),
                        Op::StartBreak(u) => h.service.start_break(users[*u]).await.map(|_| ()),
                        Op::EndBreak(u) => h.service.end_break(users[*u]).await.map(|_| ()),
                        Op::Wait(secs) => {
                            h.clock.advance(Duration::seconds(*secs));
                            Ok(())
                        }
                    };
                    if let Err(TimeEntryError::InternalError(e)) = outcome {
                        return Err(TestCaseError::fail(format!("internal error: {:#}", e)));
                    }

                    let open = h.repo.list_open().await.unwrap();
                    for user in users {
                        let count = open.iter().filter(|s| s.user_id == user).count();
                        prop_assert!(count <= 1, "user {} has {} open sessions", user, count);
                    }
                }

                for user in users {
                    let page = h.service.sessions(user, Some(1), Some(100)).await.unwrap();
                    for s in &page.sessions {
                        prop_assert!(s.net_duration >= 0);
                        if s.status == SessionStatus::Completed {
                            prop_assert_eq!(s.net_duration, (s.duration.unwrap() - s.break_duration).max(0));
                        }
                    }
                }
                Ok(())
            });
            result?;
        }
    }
}
