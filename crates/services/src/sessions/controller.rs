use std::sync::Arc;

use authority::{AuthorityError, ErrorKind, RemoteAuthority};
use simulado_core::model::{
    ChoiceId, ExamDocument, ExamId, ItemId, SessionId, SessionSnapshot, SessionStatus,
};
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::error::ControllerError;

use super::cadence::{Cadence, Firing};
use super::command::{Operation, SessionCommand};
use super::observer::SessionObserver;
use super::reconcile::{ClockCommand, Reconciliation, reconcile};
use super::runtime::Liveness;
use super::view::{LocalView, NavigationAvailability};

/// Remote mutations issued by user operations.
enum Mutation<'a> {
    Answer(&'a ItemId, Option<&'a ChoiceId>),
    Advance,
    Retreat,
    Pause,
    Resume,
    Finish,
}

async fn dispatch(
    authority: &dyn RemoteAuthority,
    session_id: SessionId,
    mutation: Mutation<'_>,
) -> Result<(), AuthorityError> {
    match mutation {
        Mutation::Answer(item, choice) => authority.record_answer(session_id, item, choice).await,
        Mutation::Advance => authority.advance_item(session_id).await,
        Mutation::Retreat => authority.retreat_item(session_id).await,
        Mutation::Pause => authority.pause_session(session_id).await,
        Mutation::Resume => authority.resume_session(session_id).await,
        Mutation::Finish => authority.finish_session(session_id).await,
    }
}

/// Client-side state machine of one exam session.
///
/// Every operation runs a local gate, then the remote mutation, then a
/// refresh whose snapshot is reconciled into the view. The controller is
/// owned by a single task; see [`crate::sessions::spawn`].
pub struct SessionController {
    exam_id: ExamId,
    session_id: SessionId,
    exam: Arc<ExamDocument>,
    authority: Arc<dyn RemoteAuthority>,
    observer: Arc<dyn SessionObserver>,
    cadence: Cadence,
    view: LocalView,
    finished_notified: bool,
    liveness: Liveness,
}

impl SessionController {
    /// Fetch the first snapshot of `session_id` and build a controller on it.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::Exam` for an invalid document,
    /// `ControllerError::NotFound` when the session does not exist and
    /// `ControllerError::InconsistentSnapshot` when the snapshot does not
    /// match the document.
    pub async fn attach(
        exam_id: ExamId,
        exam: Arc<ExamDocument>,
        session_id: SessionId,
        authority: Arc<dyn RemoteAuthority>,
        observer: Arc<dyn SessionObserver>,
        config: &ControllerConfig,
    ) -> Result<Self, ControllerError> {
        exam.validate()?;
        let snapshot = authority
            .get_session_state(session_id)
            .await
            .map_err(|err| {
                let err = ControllerError::from(err);
                if matches!(err, ControllerError::NotFound(_)) {
                    observer.on_fatal_error(&err.to_string());
                }
                err
            })?;
        let reconciliation = reconcile(None, &snapshot, &exam, false)
            .map_err(|err| ControllerError::InconsistentSnapshot(err.to_string()))?;

        info!(
            session_id = %session_id,
            exam_id = %exam_id,
            status = %snapshot.status,
            "attached to session"
        );
        let mut controller = Self {
            exam_id,
            session_id,
            exam,
            authority,
            observer,
            cadence: Cadence::new(config.tick_interval, config.refresh_retry_limit),
            view: reconciliation.view.clone(),
            finished_notified: false,
            liveness: Liveness::new(),
        };
        controller.apply(reconciliation);
        Ok(controller)
    }

    #[must_use]
    pub fn exam_id(&self) -> &ExamId {
        &self.exam_id
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn exam(&self) -> &Arc<ExamDocument> {
        &self.exam
    }

    #[must_use]
    pub fn view(&self) -> &LocalView {
        &self.view
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.view.status
    }

    #[must_use]
    pub fn navigation(&self) -> NavigationAvailability {
        self.view.navigation(&self.exam)
    }

    #[must_use]
    pub fn is_cadence_running(&self) -> bool {
        self.cadence.is_running()
    }

    #[must_use]
    pub fn observer(&self) -> Arc<dyn SessionObserver> {
        Arc::clone(&self.observer)
    }

    #[must_use]
    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    pub(crate) fn cadence_mut(&mut self) -> &mut Cadence {
        &mut self.cadence
    }

    /// Stop the cadence and mark the view dead; later results are dropped.
    pub fn detach(&mut self) {
        self.liveness.kill();
        self.cadence.halt();
        debug!(session_id = %self.session_id, "session view detached");
    }

    /// Record, replace or (with `None`) clear the answer to `item`.
    ///
    /// Re-recording the answer already in the view does nothing.
    ///
    /// # Errors
    ///
    /// `SessionFinished` once finished, `InvalidTarget` for an item or choice
    /// outside the exam, or the authority's rejection.
    pub async fn record_answer(
        &mut self,
        item: ItemId,
        choice: Option<ChoiceId>,
    ) -> Result<(), ControllerError> {
        self.ensure_open()?;
        let entry = self
            .exam
            .item(&item)
            .ok_or_else(|| ControllerError::InvalidTarget(format!("item {item}")))?;
        if let Some(choice) = &choice {
            if !entry.has_choice(choice) {
                return Err(ControllerError::InvalidTarget(format!(
                    "choice {choice} of item {item}"
                )));
            }
        }
        if self.view.answers.get(&item) == Some(&choice) {
            debug!(session_id = %self.session_id, item = %item, "answer unchanged");
            return Ok(());
        }
        self.round_trip(
            Operation::RecordAnswer,
            Mutation::Answer(&item, choice.as_ref()),
        )
        .await
    }

    /// Move to the next item.
    ///
    /// # Errors
    ///
    /// `NavigationBlocked` on the last item or while the current item is
    /// unanswered; `SessionFinished` once finished.
    pub async fn advance(&mut self) -> Result<(), ControllerError> {
        self.ensure_open()?;
        let current = &self.view.current_item;
        if self.exam.is_last(current) {
            return Err(ControllerError::NavigationBlocked(format!(
                "{current} is the last item"
            )));
        }
        if !self.view.is_answered(current) {
            return Err(ControllerError::NavigationBlocked(format!(
                "{current} has no answer"
            )));
        }
        self.round_trip(Operation::Advance, Mutation::Advance).await
    }

    /// Move to the previous item.
    ///
    /// # Errors
    ///
    /// `NavigationBlocked` on the first item; `SessionFinished` once finished.
    pub async fn retreat(&mut self) -> Result<(), ControllerError> {
        self.ensure_open()?;
        let current = &self.view.current_item;
        if self.exam.is_first(current) {
            return Err(ControllerError::NavigationBlocked(format!(
                "{current} is the first item"
            )));
        }
        self.round_trip(Operation::Retreat, Mutation::Retreat).await
    }

    /// Pause a running session. The cadence stops before the remote call.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless running, `SessionFinished` once finished.
    pub async fn pause(&mut self) -> Result<(), ControllerError> {
        self.ensure_status(SessionStatus::Running, Operation::Pause)?;
        self.cadence.stop();
        self.round_trip(Operation::Pause, Mutation::Pause).await
    }

    /// Resume a paused session. The cadence restarts before the remote call.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless paused, `SessionFinished` once finished.
    pub async fn resume(&mut self) -> Result<(), ControllerError> {
        self.ensure_status(SessionStatus::Paused, Operation::Resume)?;
        self.cadence.start();
        self.round_trip(Operation::Resume, Mutation::Resume).await
    }

    /// Pause when running, resume when paused.
    ///
    /// # Errors
    ///
    /// See [`SessionController::pause`] and [`SessionController::resume`].
    pub async fn toggle_pause(&mut self) -> Result<(), ControllerError> {
        self.ensure_open()?;
        match self.view.status {
            SessionStatus::Running => self.pause().await,
            SessionStatus::Paused => self.resume().await,
            SessionStatus::Finished => Err(ControllerError::SessionFinished),
        }
    }

    /// Finish the session and notify completion.
    ///
    /// Finishing a finished session succeeds; either way the observer hears
    /// about completion exactly once.
    ///
    /// # Errors
    ///
    /// Transient or fatal authority failures; the view is left unchanged.
    pub async fn finish(&mut self) -> Result<(), ControllerError> {
        self.ensure_live()?;
        if self.is_finished() {
            self.notify_finished();
            return Ok(());
        }

        self.cadence.stop();
        let sent = dispatch(self.authority.as_ref(), self.session_id, Mutation::Finish).await;
        self.ensure_live()?;
        match sent {
            Ok(()) | Err(AuthorityError::SessionFinished) => {}
            Err(err) => {
                self.sync_cadence();
                return Err(self.rejected(Operation::Finish, err));
            }
        }

        self.refresh_after(Operation::Finish).await?;
        self.notify_finished();
        Ok(())
    }

    /// One cadence firing.
    ///
    /// Running sessions push elapsed time to the authority, refresh, and
    /// finish themselves once the limit is reached. Paused sessions only
    /// refresh. Finished sessions do nothing.
    ///
    /// # Errors
    ///
    /// Transient failures are returned for logging only; the next firing
    /// retries.
    pub async fn tick(&mut self) -> Result<(), ControllerError> {
        self.ensure_live()?;
        if self.finished_notified {
            return Ok(());
        }
        match self.view.status {
            SessionStatus::Finished => return Ok(()),
            SessionStatus::Paused => return self.refresh().await,
            SessionStatus::Running => {}
        }

        let pushed = self.authority.tick_session(self.session_id).await;
        self.ensure_live()?;
        match pushed {
            Ok(()) | Err(AuthorityError::SessionFinished) => {}
            Err(AuthorityError::NotFound(message)) => {
                let err = ControllerError::NotFound(message);
                self.fail(&err);
                return Err(err);
            }
            Err(err) => {
                debug!(session_id = %self.session_id, error = %err, "tick failed, waiting for next firing");
                return Err(err.into());
            }
        }

        self.refresh().await?;
        if self.view.status == SessionStatus::Running && self.view.is_expired() {
            info!(
                session_id = %self.session_id,
                elapsed = self.view.elapsed_seconds,
                limit = self.view.time_limit_seconds,
                "time limit reached"
            );
            self.finish().await?;
        }
        Ok(())
    }

    /// Fetch a snapshot and reconcile it into the view.
    ///
    /// # Errors
    ///
    /// `Transient` when the fetch fails (a bounded retry is scheduled while
    /// the cadence is stopped), `NotFound` when the session disappeared,
    /// `InconsistentSnapshot` when the snapshot does not match the exam.
    pub async fn refresh(&mut self) -> Result<(), ControllerError> {
        self.ensure_live()?;
        let fetched = self.authority.get_session_state(self.session_id).await;
        self.ensure_live()?;
        match fetched {
            Ok(snapshot) => self.apply_snapshot(&snapshot),
            Err(err) => {
                let err = ControllerError::from(err);
                if matches!(err, ControllerError::NotFound(_)) {
                    self.fail(&err);
                } else if self.cadence.schedule_retry() {
                    debug!(session_id = %self.session_id, error = %err, "refresh failed, retry scheduled");
                } else {
                    debug!(session_id = %self.session_id, error = %err, "refresh failed");
                }
                Err(err)
            }
        }
    }

    /// Run a user command.
    ///
    /// # Errors
    ///
    /// Whatever the underlying operation returns.
    pub async fn execute(&mut self, command: SessionCommand) -> Result<(), ControllerError> {
        match command {
            SessionCommand::RecordAnswer { item, choice } => self.record_answer(item, choice).await,
            SessionCommand::Advance => self.advance().await,
            SessionCommand::Retreat => self.retreat().await,
            SessionCommand::Pause => self.pause().await,
            SessionCommand::Resume => self.resume().await,
            SessionCommand::TogglePause => self.toggle_pause().await,
            SessionCommand::Finish => self.finish().await,
            SessionCommand::Refresh => self.refresh().await,
        }
    }

    /// Handle a cadence firing.
    ///
    /// # Errors
    ///
    /// See [`SessionController::tick`] and [`SessionController::refresh`].
    pub async fn on_firing(&mut self, firing: Firing) -> Result<(), ControllerError> {
        match firing {
            Firing::Tick => self.tick().await,
            Firing::Retry => self.refresh().await,
        }
    }

    async fn round_trip(
        &mut self,
        operation: Operation,
        mutation: Mutation<'_>,
    ) -> Result<(), ControllerError> {
        debug!(session_id = %self.session_id, operation = %operation, "sending operation");
        let sent = dispatch(self.authority.as_ref(), self.session_id, mutation).await;
        self.ensure_live()?;
        if let Err(err) = sent {
            self.sync_cadence();
            return Err(self.rejected(operation, err));
        }
        self.refresh_after(operation).await
    }

    /// Refresh after an accepted mutation.
    ///
    /// A failed fetch is not the operation's failure: the mutation already
    /// happened, so only fatal errors propagate.
    async fn refresh_after(&mut self, operation: Operation) -> Result<(), ControllerError> {
        match self.refresh().await {
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                warn!(
                    session_id = %self.session_id,
                    operation = %operation,
                    error = %err,
                    "operation accepted but refresh failed"
                );
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    fn apply_snapshot(&mut self, snapshot: &SessionSnapshot) -> Result<(), ControllerError> {
        match reconcile(
            Some(&self.view),
            snapshot,
            &self.exam,
            self.cadence.is_running(),
        ) {
            Ok(reconciliation) => {
                self.apply(reconciliation);
                Ok(())
            }
            Err(err) if err.is_stale() => {
                debug!(session_id = %self.session_id, reason = %err, "discarded snapshot");
                Ok(())
            }
            Err(err) => {
                warn!(session_id = %self.session_id, reason = %err, "rejected snapshot");
                Err(ControllerError::InconsistentSnapshot(err.to_string()))
            }
        }
    }

    fn apply(&mut self, reconciliation: Reconciliation) {
        let Reconciliation {
            view,
            clock,
            render,
            conflict,
        } = reconciliation;

        if let Some(conflict) = conflict {
            debug!(
                session_id = %self.session_id,
                authority = %conflict.authority,
                cadence_running = conflict.cadence_running,
                "cadence corrected by snapshot"
            );
        }
        match clock {
            ClockCommand::Start if self.finished_notified => {}
            ClockCommand::Start => {
                self.cadence.start();
            }
            ClockCommand::Stop => {
                self.cadence.stop();
            }
            ClockCommand::Keep => {}
        }
        self.cadence.reset_retries();
        self.view = view;

        if !render.is_empty() {
            self.observer.on_snapshot_applied(&self.view, render);
        }
        if render.navigation {
            self.observer
                .on_navigation_availability(self.view.navigation(&self.exam));
        }
        if self.view.status.is_terminal() {
            self.notify_finished();
        }
    }

    fn notify_finished(&mut self) {
        self.cadence.stop();
        if self.finished_notified {
            return;
        }
        self.finished_notified = true;
        info!(
            session_id = %self.session_id,
            exam_id = %self.exam_id,
            elapsed = self.view.elapsed_seconds,
            "session finished"
        );
        self.observer.on_finished(&self.exam_id, self.session_id);
    }

    /// Surface an authority rejection and convert it.
    fn rejected(&mut self, operation: Operation, err: AuthorityError) -> ControllerError {
        let err = ControllerError::from(err);
        match err.kind() {
            Some(ErrorKind::NotFound) => self.fail(&err),
            Some(kind) if kind.is_business_rule() => {
                warn!(
                    session_id = %self.session_id,
                    operation = %operation,
                    error = %err,
                    "operation rejected"
                );
                self.observer.on_transient_error(kind, &err.to_string());
            }
            Some(kind) => {
                debug!(
                    session_id = %self.session_id,
                    operation = %operation,
                    error = %err,
                    "operation failed"
                );
                self.observer.on_transient_error(kind, &err.to_string());
            }
            None => {}
        }
        err
    }

    fn fail(&mut self, err: &ControllerError) {
        warn!(session_id = %self.session_id, error = %err, "session lost");
        self.cadence.halt();
        self.observer.on_fatal_error(&err.to_string());
    }

    /// Undo optimistic cadence changes after a rejected call.
    fn sync_cadence(&mut self) {
        if !self.finished_notified && self.view.status.runs_clock() {
            self.cadence.start();
        } else {
            self.cadence.stop();
        }
    }

    fn ensure_live(&self) -> Result<(), ControllerError> {
        if self.liveness.is_alive() {
            Ok(())
        } else {
            Err(ControllerError::Detached)
        }
    }

    /// Terminal in the view, or completion already announced while the
    /// view still waits for the finishing snapshot.
    fn is_finished(&self) -> bool {
        self.finished_notified || self.view.status.is_terminal()
    }

    fn ensure_open(&self) -> Result<(), ControllerError> {
        self.ensure_live()?;
        if self.is_finished() {
            return Err(ControllerError::SessionFinished);
        }
        Ok(())
    }

    fn ensure_status(
        &self,
        expected: SessionStatus,
        operation: Operation,
    ) -> Result<(), ControllerError> {
        self.ensure_open()?;
        if self.view.status != expected {
            return Err(ControllerError::InvalidTransition(format!(
                "cannot {operation} while {}",
                self.view.status
            )));
        }
        Ok(())
    }
}
