use simulado_core::model::{
    Answers, ChoiceId, ExamDocument, FinishReason, ItemId, SessionSnapshot, SessionStatus,
    is_expired,
};
use simulado_core::time::format_elapsed;

/// What the session view currently shows.
///
/// Built only from authoritative snapshots; the controller never guesses a
/// field locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalView {
    pub status: SessionStatus,
    pub elapsed_seconds: u32,
    /// Zero means unlimited.
    pub time_limit_seconds: u32,
    pub current_item: ItemId,
    pub answers: Answers,
    pub finish_reason: Option<FinishReason>,
}

impl LocalView {
    #[must_use]
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        Self {
            status: snapshot.status,
            elapsed_seconds: snapshot.time.elapsed_seconds,
            time_limit_seconds: snapshot.time.limit_seconds,
            current_item: snapshot.progress.current_item.clone(),
            answers: snapshot.answers.clone(),
            finish_reason: snapshot.time.finish_reason,
        }
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.values().filter(|choice| choice.is_some()).count()
    }

    #[must_use]
    pub fn answer_for(&self, item: &ItemId) -> Option<&ChoiceId> {
        self.answers.get(item).and_then(Option::as_ref)
    }

    #[must_use]
    pub fn is_answered(&self, item: &ItemId) -> bool {
        self.answer_for(item).is_some()
    }

    /// Seconds left before the limit, or `None` for unlimited sessions.
    #[must_use]
    pub fn remaining_seconds(&self) -> Option<u32> {
        (self.time_limit_seconds > 0)
            .then(|| self.time_limit_seconds.saturating_sub(self.elapsed_seconds))
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        is_expired(self.time_limit_seconds, self.elapsed_seconds)
    }

    /// Elapsed time as `MM:SS`.
    #[must_use]
    pub fn elapsed_label(&self) -> String {
        format_elapsed(self.elapsed_seconds)
    }

    #[must_use]
    pub fn navigation(&self, exam: &ExamDocument) -> NavigationAvailability {
        NavigationAvailability::for_view(exam, self)
    }
}

/// Enabled state of the previous/next controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NavigationAvailability {
    pub can_retreat: bool,
    pub can_advance: bool,
}

impl NavigationAvailability {
    /// Advance needs an answered, non-last item; retreat needs a non-first item.
    #[must_use]
    pub fn for_view(exam: &ExamDocument, view: &LocalView) -> Self {
        let current = &view.current_item;
        Self {
            can_retreat: !exam.is_first(current),
            can_advance: !exam.is_last(current) && view.is_answered(current),
        }
    }
}

/// Which regions of the session view need repainting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderPlan {
    /// Status, elapsed counter and time limit.
    pub header: bool,
    /// Current item and its selected choice.
    pub item: bool,
    pub navigation: bool,
}

impl RenderPlan {
    #[must_use]
    pub fn everything() -> Self {
        Self {
            header: true,
            item: true,
            navigation: true,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.header || self.item || self.navigation)
    }
}
