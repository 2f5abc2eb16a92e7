//! Shared error types for the services crate.

use thiserror::Error;

use authority::{AuthorityError, ErrorKind};
use simulado_core::model::ExamError;

/// Errors emitted by the session controller and the services around it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ControllerError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("navigation blocked: {0}")]
    NavigationBlocked(String),
    #[error("session already finished")]
    SessionFinished,
    #[error("results are not ready")]
    NotReady,
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("another operation is still in flight")]
    Busy,
    #[error("session view has been disposed")]
    Detached,
    #[error("inconsistent snapshot: {0}")]
    InconsistentSnapshot(String),
    #[error(transparent)]
    Exam(#[from] ExamError),
}

impl ControllerError {
    /// Taxonomy kind, for errors that belong to the shared taxonomy.
    ///
    /// `Busy`, `Detached`, `InconsistentSnapshot` and `Exam` are local to the
    /// controller and have no kind.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ControllerError::NotFound(_) => Some(ErrorKind::NotFound),
            ControllerError::InvalidTarget(_) => Some(ErrorKind::InvalidTarget),
            ControllerError::InvalidTransition(_) => Some(ErrorKind::InvalidTransition),
            ControllerError::NavigationBlocked(_) => Some(ErrorKind::NavigationBlocked),
            ControllerError::SessionFinished => Some(ErrorKind::SessionFinished),
            ControllerError::NotReady => Some(ErrorKind::NotReady),
            ControllerError::Transient(_) => Some(ErrorKind::Transient),
            ControllerError::Busy
            | ControllerError::Detached
            | ControllerError::InconsistentSnapshot(_)
            | ControllerError::Exam(_) => None,
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, ControllerError::Transient(_))
    }

    /// Errors after which the session view cannot continue.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, ControllerError::NotFound(_) | ControllerError::Detached)
    }
}

impl From<AuthorityError> for ControllerError {
    fn from(err: AuthorityError) -> Self {
        match err {
            AuthorityError::NotFound(m) => ControllerError::NotFound(m),
            AuthorityError::InvalidTarget(m) => ControllerError::InvalidTarget(m),
            AuthorityError::InvalidTransition(m) => ControllerError::InvalidTransition(m),
            AuthorityError::NavigationBlocked(m) => ControllerError::NavigationBlocked(m),
            AuthorityError::SessionFinished => ControllerError::SessionFinished,
            AuthorityError::NotReady => ControllerError::NotReady,
            AuthorityError::Transient(m) => ControllerError::Transient(m),
            other => ControllerError::Transient(other.to_string()),
        }
    }
}
