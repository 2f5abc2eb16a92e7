//! Plain-text rendering of a session on stdout.

use std::sync::{Arc, Mutex};

use authority::ErrorKind;
use services::{LocalView, NavigationAvailability, Operation, RenderPlan, SessionObserver};
use simulado_core::model::{ExamDocument, ExamId, ItemId, SessionId};
use tokio::sync::Notify;

pub struct ConsoleObserver {
    exam: Arc<ExamDocument>,
    current: Mutex<Option<ItemId>>,
    finished: Arc<Notify>,
}

impl ConsoleObserver {
    pub fn new(exam: Arc<ExamDocument>) -> Self {
        Self {
            exam,
            current: Mutex::new(None),
            finished: Arc::new(Notify::new()),
        }
    }

    /// Item the user is looking at, once the first snapshot arrived.
    pub fn current_item(&self) -> Option<ItemId> {
        self.current.lock().ok().and_then(|current| current.clone())
    }

    pub fn finished(&self) -> Arc<Notify> {
        Arc::clone(&self.finished)
    }
}

impl SessionObserver for ConsoleObserver {
    fn on_snapshot_applied(&self, view: &LocalView, render: RenderPlan) {
        if let Ok(mut current) = self.current.lock() {
            *current = Some(view.current_item.clone());
        }
        if render.header {
            let remaining = view
                .remaining_seconds()
                .map(|left| format!(" ({left}s left)"))
                .unwrap_or_default();
            println!(
                "[{}] {} {}/{} answered{remaining}",
                view.status,
                view.elapsed_label(),
                view.answered_count(),
                self.exam.len()
            );
        }
        if render.item {
            let Some(item) = self.exam.item(&view.current_item) else {
                return;
            };
            println!();
            println!("{}. {}", item.ordinal, item.prompt);
            let selected = view.answer_for(&item.id);
            for choice in &item.choices {
                let mark = if selected == Some(&choice.id) { '*' } else { ' ' };
                println!(" {mark} {}) {}", choice.id, choice.label);
            }
        }
    }

    fn on_navigation_availability(&self, availability: NavigationAvailability) {
        let prev = if availability.can_retreat { "p=previous" } else { "-" };
        let next = if availability.can_advance { "n=next" } else { "-" };
        println!("    {prev}  {next}");
    }

    fn on_finished(&self, exam_id: &ExamId, session_id: SessionId) {
        println!("session {session_id} of {exam_id} finished");
        self.finished.notify_one();
    }

    fn on_transient_error(&self, kind: ErrorKind, message: &str) {
        println!("! {kind:?}: {message}");
    }

    fn on_pending(&self, operation: Option<Operation>) {
        if let Some(operation) = operation {
            println!("... {operation}");
        }
    }

    fn on_fatal_error(&self, message: &str) {
        eprintln!("session lost: {message}");
        self.finished.notify_one();
    }
}
