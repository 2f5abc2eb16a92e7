use std::fmt;

use simulado_core::model::{ChoiceId, ItemId};

/// Operations the controller performs, for pending state and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    RecordAnswer,
    Advance,
    Retreat,
    Pause,
    Resume,
    /// Pause or resume, decided by the status when the command runs.
    TogglePause,
    Finish,
    Tick,
    Refresh,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::RecordAnswer => "record_answer",
            Operation::Advance => "advance",
            Operation::Retreat => "retreat",
            Operation::Pause => "pause",
            Operation::Resume => "resume",
            Operation::TogglePause => "toggle_pause",
            Operation::Finish => "finish",
            Operation::Tick => "tick",
            Operation::Refresh => "refresh",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User intent sent to a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// `choice: None` clears the answer.
    RecordAnswer {
        item: ItemId,
        choice: Option<ChoiceId>,
    },
    Advance,
    Retreat,
    Pause,
    Resume,
    /// Pause when running, resume when paused.
    TogglePause,
    Finish,
    Refresh,
}

impl SessionCommand {
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            SessionCommand::RecordAnswer { .. } => Operation::RecordAnswer,
            SessionCommand::Advance => Operation::Advance,
            SessionCommand::Retreat => Operation::Retreat,
            SessionCommand::Pause => Operation::Pause,
            SessionCommand::Resume => Operation::Resume,
            SessionCommand::TogglePause => Operation::TogglePause,
            SessionCommand::Finish => Operation::Finish,
            SessionCommand::Refresh => Operation::Refresh,
        }
    }

    /// Mutating commands disable further mutating commands until they finish.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        !matches!(self, SessionCommand::Refresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_is_reported_as_its_own_operation() {
        assert_eq!(SessionCommand::TogglePause.operation(), Operation::TogglePause);
        assert_eq!(SessionCommand::Pause.operation(), Operation::Pause);
        assert_eq!(SessionCommand::Resume.operation(), Operation::Resume);
        assert_eq!(Operation::TogglePause.to_string(), "toggle_pause");
    }

    #[test]
    fn only_refresh_is_not_a_mutation() {
        assert!(SessionCommand::TogglePause.is_mutation());
        assert!(SessionCommand::Finish.is_mutation());
        assert!(!SessionCommand::Refresh.is_mutation());
    }
}
