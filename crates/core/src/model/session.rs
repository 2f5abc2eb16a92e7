use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ChoiceId, ItemId};

/// Authoritative status of a session.
///
/// `Finished` is terminal: no transition leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Running,
    Paused,
    Finished,
}

impl SessionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Finished)
    }

    /// Whether the local cadence should be running for this status.
    #[must_use]
    pub fn runs_clock(self) -> bool {
        match self {
            SessionStatus::Running => true,
            SessionStatus::Paused | SessionStatus::Finished => false,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Running => "RUNNING",
            SessionStatus::Paused => "PAUSED",
            SessionStatus::Finished => "FINISHED",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session reached `Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    Manual,
    TimeExpired,
}

/// Answer ledger: `Some(choice)` when answered, `None` when explicitly cleared.
pub type Answers = BTreeMap<ItemId, Option<ChoiceId>>;

/// Timing block of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionTime {
    /// Zero means unlimited.
    pub limit_seconds: u32,
    pub elapsed_seconds: u32,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// Returns true when `limit_seconds > 0` and `elapsed_seconds` reached it.
#[must_use]
pub fn is_expired(limit_seconds: u32, elapsed_seconds: u32) -> bool {
    limit_seconds > 0 && elapsed_seconds >= limit_seconds
}

/// Progress block of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub current_item: ItemId,
    pub answered: usize,
    pub total: usize,
}

/// Point-in-time copy of a session as reported by the remote authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub time: SessionTime,
    pub progress: SessionProgress,
    #[serde(default)]
    pub answers: Answers,
}

impl SessionSnapshot {
    #[must_use]
    pub fn current_item(&self) -> &ItemId {
        &self.progress.current_item
    }

    #[must_use]
    pub fn elapsed_seconds(&self) -> u32 {
        self.time.elapsed_seconds
    }

    /// Recorded choice for an item; `None` when unanswered or cleared.
    #[must_use]
    pub fn answer_for(&self, item: &ItemId) -> Option<&ChoiceId> {
        self.answers.get(item).and_then(Option::as_ref)
    }
}

/// Metadata sent along with a start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub board: String,
    pub year: u16,
    pub duration_minutes: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_screaming_case() {
        let json = serde_json::to_string(&SessionStatus::Paused).unwrap();
        assert_eq!(json, "\"PAUSED\"");
        let back: FinishReason = serde_json::from_str("\"TIME_EXPIRED\"").unwrap();
        assert_eq!(back, FinishReason::TimeExpired);
    }

    #[test]
    fn only_running_runs_the_clock() {
        assert!(SessionStatus::Running.runs_clock());
        assert!(!SessionStatus::Paused.runs_clock());
        assert!(!SessionStatus::Finished.runs_clock());
        assert!(SessionStatus::Finished.is_terminal());
    }

    #[test]
    fn expiry_needs_a_limit() {
        assert!(!is_expired(0, 10_000));
        assert!(!is_expired(60, 59));
        assert!(is_expired(60, 60));
        assert!(is_expired(60, 61));
    }

    #[test]
    fn snapshot_parses_with_cleared_answers() {
        let raw = r#"{
            "status": "RUNNING",
            "time": {"limit_seconds": 60, "elapsed_seconds": 12},
            "progress": {"current_item": "Q02", "answered": 1, "total": 3},
            "answers": {"Q01": "B", "Q02": null}
        }"#;
        let snapshot: SessionSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snapshot.status, SessionStatus::Running);
        assert_eq!(snapshot.elapsed_seconds(), 12);
        assert_eq!(
            snapshot.answer_for(&ItemId::new("Q01")),
            Some(&ChoiceId::new("B"))
        );
        assert_eq!(snapshot.answer_for(&ItemId::new("Q02")), None);
        assert!(snapshot.answers.contains_key(&ItemId::new("Q02")));
        assert!(snapshot.time.finish_reason.is_none());
    }
}
