use std::sync::{Arc, Mutex};

use authority::ErrorKind;
use simulado_core::model::{ExamId, SessionId};

use super::command::Operation;
use super::view::{LocalView, NavigationAvailability, RenderPlan};

/// One-way rendering collaborator of a session controller.
///
/// Calls happen on the controller's task, in order, and must not block.
/// The exception is `on_pending(Some(..))`, which
/// [`SessionHandle::submit`](crate::sessions::SessionHandle::submit) delivers
/// from the submitting thread before the command is queued.
pub trait SessionObserver: Send + Sync {
    fn on_snapshot_applied(&self, view: &LocalView, render: RenderPlan);

    fn on_navigation_availability(&self, availability: NavigationAvailability);

    /// Delivered at most once per controller.
    fn on_finished(&self, exam_id: &ExamId, session_id: SessionId);

    /// A recoverable failure the user may want to see, e.g. a rejected
    /// operation or an unreachable authority.
    fn on_transient_error(&self, kind: ErrorKind, message: &str);

    /// `Some` while a user operation is in flight, `None` once it settles.
    fn on_pending(&self, _operation: Option<Operation>) {}

    /// The session can no longer be driven from this view.
    fn on_fatal_error(&self, _message: &str) {}
}

/// Notification captured by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SnapshotApplied { view: LocalView, render: RenderPlan },
    Navigation(NavigationAvailability),
    Finished { exam_id: ExamId, session_id: SessionId },
    TransientError { kind: ErrorKind, message: String },
    Pending(Option<Operation>),
    Fatal(String),
}

/// Observer that stores every notification, for tests and headless use.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl RecordingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    #[must_use]
    pub fn finished_count(&self) -> usize {
        self.count(|event| matches!(event, SessionEvent::Finished { .. }))
    }

    #[must_use]
    pub fn transient_errors(&self) -> Vec<ErrorKind> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::TransientError { kind, .. } => Some(kind),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn last_view(&self) -> Option<LocalView> {
        self.events().into_iter().rev().find_map(|event| match event {
            SessionEvent::SnapshotApplied { view, .. } => Some(view),
            _ => None,
        })
    }

    #[must_use]
    pub fn last_navigation(&self) -> Option<NavigationAvailability> {
        self.events().into_iter().rev().find_map(|event| match event {
            SessionEvent::Navigation(availability) => Some(availability),
            _ => None,
        })
    }

    fn count(&self, predicate: impl Fn(&SessionEvent) -> bool) -> usize {
        self.events
            .lock()
            .map(|events| events.iter().filter(|e| predicate(e)).count())
            .unwrap_or_default()
    }

    fn push(&self, event: SessionEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl SessionObserver for RecordingObserver {
    fn on_snapshot_applied(&self, view: &LocalView, render: RenderPlan) {
        self.push(SessionEvent::SnapshotApplied {
            view: view.clone(),
            render,
        });
    }

    fn on_navigation_availability(&self, availability: NavigationAvailability) {
        self.push(SessionEvent::Navigation(availability));
    }

    fn on_finished(&self, exam_id: &ExamId, session_id: SessionId) {
        self.push(SessionEvent::Finished {
            exam_id: exam_id.clone(),
            session_id,
        });
    }

    fn on_transient_error(&self, kind: ErrorKind, message: &str) {
        self.push(SessionEvent::TransientError {
            kind,
            message: message.to_string(),
        });
    }

    fn on_pending(&self, operation: Option<Operation>) {
        self.push(SessionEvent::Pending(operation));
    }

    fn on_fatal_error(&self, message: &str) {
        self.push(SessionEvent::Fatal(message.to_string()));
    }
}
