use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use simulado_core::Clock;
use simulado_core::model::{
    Answers, ChoiceId, ExamDocument, ExamId, FinishReason, ItemId, Results, SessionId,
    SessionMetadata, SessionProgress, SessionSnapshot, SessionStatus, SessionTime, is_expired,
};
use tracing::debug;

use crate::remote::{AuthorityError, RemoteAuthority, RpcMethod};

/// In-process authority with the reference backend behaviour.
///
/// Intended for tests, demos and prototyping. Time comes from a `Clock`, so a
/// `Clock::Fixed` makes every elapsed value deterministic.
#[derive(Clone)]
pub struct InMemoryAuthority {
    state: Arc<Mutex<State>>,
}

struct State {
    clock: Clock,
    allow_overtime: bool,
    exams: BTreeMap<ExamId, ExamDocument>,
    sessions: BTreeMap<SessionId, SessionRecord>,
    next_session: i64,
    faults: VecDeque<(RpcMethod, AuthorityError)>,
    calls: Vec<RpcMethod>,
}

struct SessionRecord {
    exam_id: ExamId,
    status: SessionStatus,
    limit_seconds: u32,
    elapsed_seconds: u32,
    /// Base for the next elapsed accrual; `None` while not running.
    last_tick: Option<DateTime<Utc>>,
    started_at: DateTime<Utc>,
    paused_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    finish_reason: Option<FinishReason>,
    current: usize,
    answers: Answers,
}

impl SessionRecord {
    fn accrue(&mut self, clock: &Clock) {
        if self.status != SessionStatus::Running {
            return;
        }
        if let Some(last) = self.last_tick {
            let delta = clock.seconds_since(last);
            self.elapsed_seconds = self.elapsed_seconds.saturating_add(delta);
            // Keep the sub-second remainder for the next accrual.
            self.last_tick = Some(last + Duration::seconds(i64::from(delta)));
        }
    }

    fn finish(&mut self, now: DateTime<Utc>, reason: FinishReason) {
        self.status = SessionStatus::Finished;
        self.finished_at = Some(now);
        self.finish_reason = Some(reason);
        self.last_tick = None;
        self.paused_at = None;
    }

    fn ensure_open(&self) -> Result<(), AuthorityError> {
        match self.status {
            SessionStatus::Running | SessionStatus::Paused => Ok(()),
            SessionStatus::Finished => Err(AuthorityError::SessionFinished),
        }
    }
}

impl Default for InMemoryAuthority {
    fn default() -> Self {
        Self::new(Clock::System)
    }
}

impl InMemoryAuthority {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                clock,
                allow_overtime: true,
                exams: BTreeMap::new(),
                sessions: BTreeMap::new(),
                next_session: 1,
                faults: VecDeque::new(),
                calls: Vec::new(),
            })),
        }
    }

    /// Register an exam under its derived id.
    #[must_use]
    pub fn with_exam(self, exam: ExamDocument) -> Self {
        self.insert_exam(exam.exam_id(), exam);
        self
    }

    /// Register an exam under an explicit id.
    #[must_use]
    pub fn with_exam_id(self, id: ExamId, exam: ExamDocument) -> Self {
        self.insert_exam(id, exam);
        self
    }

    /// When `false`, a tick that reaches the limit finishes the session with
    /// `FinishReason::TimeExpired`. Defaults to `true`.
    #[must_use]
    pub fn with_overtime(self, allow: bool) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.allow_overtime = allow;
        }
        self
    }

    fn insert_exam(&self, id: ExamId, exam: ExamDocument) {
        if let Ok(mut state) = self.state.lock() {
            state.exams.insert(id, exam);
        }
    }

    /// Move a fixed clock forward. No effect on `Clock::System`.
    pub fn advance_clock(&self, delta: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.clock.advance(delta);
        }
    }

    /// Make the next call to `method` fail with `error`.
    ///
    /// Faults queue up; each one is consumed by a single matching call.
    pub fn fail_next(&self, method: RpcMethod, error: AuthorityError) {
        if let Ok(mut state) = self.state.lock() {
            state.faults.push_back((method, error));
        }
    }

    /// Every call received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RpcMethod> {
        self.state
            .lock()
            .map(|state| state.calls.clone())
            .unwrap_or_default()
    }

    /// Number of calls to `method` received so far.
    #[must_use]
    pub fn call_count(&self, method: RpcMethod) -> usize {
        self.calls().iter().filter(|m| **m == method).count()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.calls.clear();
        }
    }

    /// Record the call, then surface a queued fault for it if any.
    fn enter(&self, method: RpcMethod) -> Result<MutexGuard<'_, State>, AuthorityError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| AuthorityError::Transient(e.to_string()))?;
        state.calls.push(method);
        if let Some(pos) = state.faults.iter().position(|(m, _)| *m == method) {
            if let Some((_, error)) = state.faults.remove(pos) {
                debug!(method = %method, error = %error, "injected authority fault");
                return Err(error);
            }
        }
        Ok(state)
    }
}

impl State {
    fn session_mut(&mut self, id: SessionId) -> Result<&mut SessionRecord, AuthorityError> {
        self.sessions
            .get_mut(&id)
            .ok_or_else(|| AuthorityError::NotFound(format!("session {id}")))
    }

    fn exam_for(&self, record: &SessionRecord) -> Result<&ExamDocument, AuthorityError> {
        self.exams
            .get(&record.exam_id)
            .ok_or_else(|| AuthorityError::NotFound(format!("exam {}", record.exam_id)))
    }

    /// Borrow a session together with its exam document.
    fn session_with_exam(
        &mut self,
        id: SessionId,
    ) -> Result<(&mut SessionRecord, &ExamDocument), AuthorityError> {
        let record = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| AuthorityError::NotFound(format!("session {id}")))?;
        let exam = self
            .exams
            .get(&record.exam_id)
            .ok_or_else(|| AuthorityError::NotFound(format!("exam {}", record.exam_id)))?;
        Ok((record, exam))
    }
}

#[async_trait]
impl RemoteAuthority for InMemoryAuthority {
    async fn list_exams(&self) -> Result<Vec<ExamId>, AuthorityError> {
        let state = self.enter(RpcMethod::ListExams)?;
        Ok(state.exams.keys().cloned().collect())
    }

    async fn load_exam(&self, exam_id: &ExamId) -> Result<ExamDocument, AuthorityError> {
        let state = self.enter(RpcMethod::LoadExam)?;
        state
            .exams
            .get(exam_id)
            .cloned()
            .ok_or_else(|| AuthorityError::NotFound(format!("exam {exam_id}")))
    }

    async fn start_session(
        &self,
        exam_id: &ExamId,
        metadata: &SessionMetadata,
    ) -> Result<SessionId, AuthorityError> {
        let mut state = self.enter(RpcMethod::StartSession)?;
        let exam = state
            .exams
            .get(exam_id)
            .ok_or_else(|| AuthorityError::NotFound(format!("exam {exam_id}")))?;
        if exam.duration_minutes != metadata.duration_minutes {
            debug!(
                exam_id = %exam_id,
                declared = metadata.duration_minutes,
                stored = exam.duration_minutes,
                "client declared a different duration, using the stored exam"
            );
        }
        let limit_seconds = exam.time_limit_seconds();

        let now = state.clock.now();
        let id = SessionId::new(state.next_session);
        state.next_session += 1;
        state.sessions.insert(
            id,
            SessionRecord {
                exam_id: exam_id.clone(),
                status: SessionStatus::Running,
                limit_seconds,
                elapsed_seconds: 0,
                last_tick: Some(now),
                started_at: now,
                paused_at: None,
                finished_at: None,
                finish_reason: None,
                current: 0,
                answers: Answers::new(),
            },
        );
        debug!(session_id = %id, exam_id = %exam_id, "session started");
        Ok(id)
    }

    async fn get_session_state(
        &self,
        session_id: SessionId,
    ) -> Result<SessionSnapshot, AuthorityError> {
        let mut state = self.enter(RpcMethod::GetSessionState)?;
        let (record, exam) = state.session_with_exam(session_id)?;
        let current_item = exam
            .items
            .get(record.current)
            .map(|item| item.id.clone())
            .ok_or_else(|| AuthorityError::NotFound(format!("item #{}", record.current)))?;

        Ok(SessionSnapshot {
            status: record.status,
            time: SessionTime {
                limit_seconds: record.limit_seconds,
                elapsed_seconds: record.elapsed_seconds,
                started_at: Some(record.started_at),
                paused_at: record.paused_at,
                finished_at: record.finished_at,
                finish_reason: record.finish_reason,
            },
            progress: SessionProgress {
                current_item,
                answered: record.answers.values().filter(|a| a.is_some()).count(),
                total: exam.items.len(),
            },
            answers: record.answers.clone(),
        })
    }

    async fn record_answer(
        &self,
        session_id: SessionId,
        item_id: &ItemId,
        choice: Option<&ChoiceId>,
    ) -> Result<(), AuthorityError> {
        let mut state = self.enter(RpcMethod::RecordAnswer)?;
        let (record, exam) = state.session_with_exam(session_id)?;
        record.ensure_open()?;

        let item = exam
            .item(item_id)
            .ok_or_else(|| AuthorityError::InvalidTarget(format!("item {item_id}")))?;
        if let Some(choice) = choice {
            if !item.has_choice(choice) {
                return Err(AuthorityError::InvalidTarget(format!(
                    "choice {choice} of item {item_id}"
                )));
            }
        }

        record.answers.insert(item_id.clone(), choice.cloned());
        Ok(())
    }

    async fn advance_item(&self, session_id: SessionId) -> Result<(), AuthorityError> {
        let mut state = self.enter(RpcMethod::AdvanceItem)?;
        let (record, exam) = state.session_with_exam(session_id)?;
        record.ensure_open()?;

        if record.current + 1 >= exam.items.len() {
            return Err(AuthorityError::NavigationBlocked("already at the last item".into()));
        }
        let current = &exam.items[record.current].id;
        if record.answers.get(current).and_then(Option::as_ref).is_none() {
            return Err(AuthorityError::NavigationBlocked(format!(
                "item {current} has no answer"
            )));
        }
        record.current += 1;
        Ok(())
    }

    async fn retreat_item(&self, session_id: SessionId) -> Result<(), AuthorityError> {
        let mut state = self.enter(RpcMethod::RetreatItem)?;
        let record = state.session_mut(session_id)?;
        record.ensure_open()?;

        if record.current == 0 {
            return Err(AuthorityError::NavigationBlocked("already at the first item".into()));
        }
        record.current -= 1;
        Ok(())
    }

    async fn pause_session(&self, session_id: SessionId) -> Result<(), AuthorityError> {
        let mut state = self.enter(RpcMethod::PauseSession)?;
        let clock = state.clock;
        let record = state.session_mut(session_id)?;
        if record.status != SessionStatus::Running {
            return Err(AuthorityError::InvalidTransition(format!(
                "cannot pause from {}",
                record.status
            )));
        }

        record.accrue(&clock);
        record.status = SessionStatus::Paused;
        record.paused_at = Some(clock.now());
        record.last_tick = None;
        Ok(())
    }

    async fn resume_session(&self, session_id: SessionId) -> Result<(), AuthorityError> {
        let mut state = self.enter(RpcMethod::ResumeSession)?;
        let clock = state.clock;
        let record = state.session_mut(session_id)?;
        if record.status != SessionStatus::Paused {
            return Err(AuthorityError::InvalidTransition(format!(
                "cannot resume from {}",
                record.status
            )));
        }

        record.status = SessionStatus::Running;
        record.paused_at = None;
        record.last_tick = Some(clock.now());
        Ok(())
    }

    async fn finish_session(&self, session_id: SessionId) -> Result<(), AuthorityError> {
        let mut state = self.enter(RpcMethod::FinishSession)?;
        let clock = state.clock;
        let record = state.session_mut(session_id)?;
        if record.status.is_terminal() {
            return Ok(());
        }

        record.accrue(&clock);
        record.finish(clock.now(), FinishReason::Manual);
        debug!(session_id = %session_id, elapsed = record.elapsed_seconds, "session finished");
        Ok(())
    }

    async fn tick_session(&self, session_id: SessionId) -> Result<(), AuthorityError> {
        let mut state = self.enter(RpcMethod::TickSession)?;
        let clock = state.clock;
        let allow_overtime = state.allow_overtime;
        let record = state.session_mut(session_id)?;
        if record.status != SessionStatus::Running {
            return Ok(());
        }

        record.accrue(&clock);
        if is_expired(record.limit_seconds, record.elapsed_seconds) && !allow_overtime {
            record.finish(clock.now(), FinishReason::TimeExpired);
            debug!(session_id = %session_id, "session finished by time");
        }
        Ok(())
    }

    async fn get_results(&self, session_id: SessionId) -> Result<Results, AuthorityError> {
        let state = self.enter(RpcMethod::GetResults)?;
        let record = state
            .sessions
            .get(&session_id)
            .ok_or_else(|| AuthorityError::NotFound(format!("session {session_id}")))?;
        if !record.status.is_terminal() {
            return Err(AuthorityError::NotReady);
        }
        let exam = state.exam_for(record)?;
        Ok(Results::grade(exam, &record.answers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simulado_core::fixtures::sample_exam;
    use simulado_core::time::fixed_clock;

    fn metadata() -> SessionMetadata {
        SessionMetadata {
            board: "ENEM".into(),
            year: 2023,
            duration_minutes: 1,
        }
    }

    async fn started(authority: &InMemoryAuthority) -> SessionId {
        authority
            .start_session(&ExamId::new("enem_2023_dia1"), &metadata())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn tick_accrues_wall_clock_delta_and_keeps_remainder() {
        let authority = InMemoryAuthority::new(fixed_clock()).with_exam(sample_exam(2));
        let id = started(&authority).await;

        authority.advance_clock(Duration::milliseconds(1_500));
        authority.tick_session(id).await.unwrap();
        assert_eq!(authority.get_session_state(id).await.unwrap().elapsed_seconds(), 1);

        authority.advance_clock(Duration::milliseconds(500));
        authority.tick_session(id).await.unwrap();
        assert_eq!(authority.get_session_state(id).await.unwrap().elapsed_seconds(), 2);
    }

    #[tokio::test]
    async fn time_limit_comes_from_the_stored_exam() {
        let authority = InMemoryAuthority::new(fixed_clock()).with_exam(sample_exam(2));
        let declared = SessionMetadata {
            duration_minutes: 90,
            ..metadata()
        };
        let id = authority
            .start_session(&ExamId::new("enem_2023_dia1"), &declared)
            .await
            .unwrap();

        let snapshot = authority.get_session_state(id).await.unwrap();
        assert_eq!(snapshot.time.limit_seconds, 60);
    }

    #[tokio::test]
    async fn pause_freezes_elapsed_until_resume() {
        let authority = InMemoryAuthority::new(fixed_clock()).with_exam(sample_exam(2));
        let id = started(&authority).await;

        authority.advance_clock(Duration::seconds(30));
        authority.pause_session(id).await.unwrap();
        authority.advance_clock(Duration::seconds(100));
        authority.tick_session(id).await.unwrap();

        let snapshot = authority.get_session_state(id).await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Paused);
        assert_eq!(snapshot.elapsed_seconds(), 30);

        authority.resume_session(id).await.unwrap();
        authority.advance_clock(Duration::seconds(5));
        authority.tick_session(id).await.unwrap();
        assert_eq!(authority.get_session_state(id).await.unwrap().elapsed_seconds(), 35);
    }

    #[tokio::test]
    async fn wrong_status_transitions_are_rejected() {
        let authority = InMemoryAuthority::new(fixed_clock()).with_exam(sample_exam(2));
        let id = started(&authority).await;

        let err = authority.resume_session(id).await.unwrap_err();
        assert!(matches!(err, AuthorityError::InvalidTransition(_)));

        authority.pause_session(id).await.unwrap();
        let err = authority.pause_session(id).await.unwrap_err();
        assert!(matches!(err, AuthorityError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn overtime_disabled_finishes_by_time() {
        let authority = InMemoryAuthority::new(fixed_clock())
            .with_exam(sample_exam(1))
            .with_overtime(false);
        let id = started(&authority).await;

        authority.advance_clock(Duration::seconds(61));
        authority.tick_session(id).await.unwrap();

        let snapshot = authority.get_session_state(id).await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Finished);
        assert_eq!(snapshot.time.finish_reason, Some(FinishReason::TimeExpired));
    }

    #[tokio::test]
    async fn finish_is_idempotent_and_unlocks_results() {
        let authority = InMemoryAuthority::new(fixed_clock()).with_exam(sample_exam(2));
        let id = started(&authority).await;

        assert_eq!(authority.get_results(id).await.unwrap_err(), AuthorityError::NotReady);

        authority
            .record_answer(id, &ItemId::new("Q01"), Some(&ChoiceId::new("A")))
            .await
            .unwrap();
        authority.finish_session(id).await.unwrap();
        authority.finish_session(id).await.unwrap();

        let results = authority.get_results(id).await.unwrap();
        assert_eq!(results.correct_count, 1);
        assert_eq!(results.incorrect_count, 1);

        let err = authority
            .record_answer(id, &ItemId::new("Q02"), None)
            .await
            .unwrap_err();
        assert_eq!(err, AuthorityError::SessionFinished);
    }

    #[tokio::test]
    async fn injected_fault_is_consumed_once() {
        let authority = InMemoryAuthority::new(fixed_clock()).with_exam(sample_exam(2));
        let id = started(&authority).await;

        authority.fail_next(
            RpcMethod::GetSessionState,
            AuthorityError::Transient("offline".into()),
        );
        assert!(authority.get_session_state(id).await.unwrap_err().is_transient());
        assert!(authority.get_session_state(id).await.is_ok());
        assert_eq!(authority.call_count(RpcMethod::GetSessionState), 2);
    }
}
