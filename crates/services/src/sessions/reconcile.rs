//! Snapshot reconciliation.
//!
//! Every authoritative snapshot, whether it follows a user operation, a
//! cadence tick or the initial load, goes through [`reconcile`]. The snapshot
//! always wins for status, current item, answers and elapsed time; the result
//! tells the controller what to do with its cadence and what to repaint.

use thiserror::Error;
use tracing::warn;

use simulado_core::model::{ExamDocument, ItemId, SessionSnapshot, SessionStatus};

use super::view::{LocalView, RenderPlan};

/// What the cadence should do after a snapshot is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockCommand {
    Start,
    Stop,
    Keep,
}

/// Local cadence disagreed with the authority's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusConflict {
    pub authority: SessionStatus,
    pub cadence_running: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub view: LocalView,
    pub clock: ClockCommand,
    pub render: RenderPlan,
    pub conflict: Option<StatusConflict>,
}

/// Reasons a snapshot is not applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReconcileError {
    #[error("current item {0} is not part of the exam")]
    UnknownCurrentItem(ItemId),
    #[error("answer recorded for unknown item {0}")]
    UnknownAnswerItem(ItemId),
    #[error("{0} snapshot arrived after the session finished")]
    AfterFinish(SessionStatus),
}

impl ReconcileError {
    /// Stale snapshots are dropped quietly; the others are inconsistencies.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self, ReconcileError::AfterFinish(_))
    }
}

/// Merge `snapshot` into the view.
///
/// `previous` is `None` for the first snapshot of a session, in which case
/// everything is repainted and no conflict is reported.
///
/// # Errors
///
/// Returns `ReconcileError` when the snapshot references items outside
/// `exam`, or when a non-finished snapshot follows a finished view.
pub fn reconcile(
    previous: Option<&LocalView>,
    snapshot: &SessionSnapshot,
    exam: &ExamDocument,
    cadence_running: bool,
) -> Result<Reconciliation, ReconcileError> {
    if !exam.contains_item(snapshot.current_item()) {
        return Err(ReconcileError::UnknownCurrentItem(
            snapshot.current_item().clone(),
        ));
    }
    if let Some(unknown) = snapshot.answers.keys().find(|id| !exam.contains_item(id)) {
        return Err(ReconcileError::UnknownAnswerItem(unknown.clone()));
    }
    if let Some(prev) = previous {
        if prev.status.is_terminal() && !snapshot.status.is_terminal() {
            return Err(ReconcileError::AfterFinish(snapshot.status));
        }
        if prev.status == SessionStatus::Running
            && snapshot.elapsed_seconds() < prev.elapsed_seconds
        {
            warn!(
                previous = prev.elapsed_seconds,
                reported = snapshot.elapsed_seconds(),
                "authority reported a lower elapsed time"
            );
        }
    }

    let view = LocalView::from_snapshot(snapshot);
    let wants_clock = view.status.runs_clock();
    let clock = match (wants_clock, cadence_running) {
        (true, false) => ClockCommand::Start,
        (false, true) => ClockCommand::Stop,
        _ => ClockCommand::Keep,
    };
    let conflict = (previous.is_some() && wants_clock != cadence_running).then_some(
        StatusConflict {
            authority: view.status,
            cadence_running,
        },
    );
    let render = match previous {
        None => RenderPlan::everything(),
        Some(prev) => render_plan(prev, &view, exam),
    };

    Ok(Reconciliation {
        view,
        clock,
        render,
        conflict,
    })
}

fn render_plan(prev: &LocalView, next: &LocalView, exam: &ExamDocument) -> RenderPlan {
    let header = prev.status != next.status
        || prev.elapsed_seconds != next.elapsed_seconds
        || prev.time_limit_seconds != next.time_limit_seconds
        || prev.finish_reason != next.finish_reason;
    let item = prev.current_item != next.current_item
        || prev.answer_for(&next.current_item) != next.answer_for(&next.current_item);
    let navigation = prev.status != next.status || prev.navigation(exam) != next.navigation(exam);
    RenderPlan {
        header,
        item,
        navigation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simulado_core::fixtures::sample_exam;
    use simulado_core::model::{ChoiceId, SessionProgress, SessionTime};

    fn snapshot(status: SessionStatus, elapsed: u32, current: &str) -> SessionSnapshot {
        SessionSnapshot {
            status,
            time: SessionTime {
                limit_seconds: 60,
                elapsed_seconds: elapsed,
                ..SessionTime::default()
            },
            progress: SessionProgress {
                current_item: ItemId::new(current),
                answered: 0,
                total: 3,
            },
            answers: Default::default(),
        }
    }

    fn view(status: SessionStatus, elapsed: u32, current: &str) -> LocalView {
        LocalView::from_snapshot(&snapshot(status, elapsed, current))
    }

    #[test]
    fn first_snapshot_repaints_everything_and_starts_clock() {
        let exam = sample_exam(3);
        let result = reconcile(None, &snapshot(SessionStatus::Running, 0, "Q01"), &exam, false)
            .unwrap();
        assert_eq!(result.clock, ClockCommand::Start);
        assert_eq!(result.render, RenderPlan::everything());
        assert_eq!(result.conflict, None);
    }

    #[test]
    fn elapsed_change_only_repaints_header() {
        let exam = sample_exam(3);
        let prev = view(SessionStatus::Running, 10, "Q01");
        let result = reconcile(
            Some(&prev),
            &snapshot(SessionStatus::Running, 11, "Q01"),
            &exam,
            true,
        )
        .unwrap();
        assert_eq!(result.clock, ClockCommand::Keep);
        assert_eq!(
            result.render,
            RenderPlan {
                header: true,
                item: false,
                navigation: false
            }
        );
        assert_eq!(result.view.elapsed_seconds, 11);
    }

    #[test]
    fn answering_current_item_repaints_item_and_navigation() {
        let exam = sample_exam(3);
        let prev = view(SessionStatus::Running, 10, "Q01");
        let mut next = snapshot(SessionStatus::Running, 10, "Q01");
        next.answers
            .insert(ItemId::new("Q01"), Some(ChoiceId::new("B")));

        let result = reconcile(Some(&prev), &next, &exam, true).unwrap();
        assert!(!result.render.header);
        assert!(result.render.item);
        assert!(result.render.navigation);
        assert!(result.view.navigation(&exam).can_advance);
    }

    #[test]
    fn paused_snapshot_stops_running_cadence_and_reports_conflict() {
        let exam = sample_exam(3);
        let prev = view(SessionStatus::Running, 30, "Q01");
        let result = reconcile(
            Some(&prev),
            &snapshot(SessionStatus::Paused, 30, "Q01"),
            &exam,
            true,
        )
        .unwrap();
        assert_eq!(result.clock, ClockCommand::Stop);
        assert_eq!(
            result.conflict,
            Some(StatusConflict {
                authority: SessionStatus::Paused,
                cadence_running: true
            })
        );
    }

    #[test]
    fn confirmed_optimistic_pause_is_not_a_conflict() {
        let exam = sample_exam(3);
        let prev = view(SessionStatus::Running, 30, "Q01");
        let result = reconcile(
            Some(&prev),
            &snapshot(SessionStatus::Paused, 30, "Q01"),
            &exam,
            false,
        )
        .unwrap();
        assert_eq!(result.clock, ClockCommand::Keep);
        assert_eq!(result.conflict, None);
    }

    #[test]
    fn unknown_items_are_rejected() {
        let exam = sample_exam(3);
        let err = reconcile(None, &snapshot(SessionStatus::Running, 0, "Q99"), &exam, false)
            .unwrap_err();
        assert_eq!(err, ReconcileError::UnknownCurrentItem(ItemId::new("Q99")));

        let mut bad = snapshot(SessionStatus::Running, 0, "Q01");
        bad.answers.insert(ItemId::new("X1"), None);
        let err = reconcile(None, &bad, &exam, false).unwrap_err();
        assert!(matches!(err, ReconcileError::UnknownAnswerItem(_)));
        assert!(!err.is_stale());
    }

    #[test]
    fn finished_view_is_sticky() {
        let exam = sample_exam(3);
        let prev = view(SessionStatus::Finished, 42, "Q02");
        let err = reconcile(
            Some(&prev),
            &snapshot(SessionStatus::Running, 43, "Q02"),
            &exam,
            false,
        )
        .unwrap_err();
        assert!(err.is_stale());

        let again = reconcile(
            Some(&prev),
            &snapshot(SessionStatus::Finished, 42, "Q02"),
            &exam,
            false,
        )
        .unwrap();
        assert!(again.render.is_empty());
        assert_eq!(again.clock, ClockCommand::Keep);
    }
}
