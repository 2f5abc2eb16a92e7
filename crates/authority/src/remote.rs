use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use simulado_core::model::{
    ChoiceId, ExamDocument, ExamId, ItemId, Results, SessionId, SessionMetadata, SessionSnapshot,
};
use thiserror::Error;

/// Classification shared by remote rejections and controller errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    InvalidTarget,
    InvalidTransition,
    NavigationBlocked,
    SessionFinished,
    Transient,
    NotReady,
}

impl ErrorKind {
    /// Business-rule kinds the controller is expected to prevent locally.
    #[must_use]
    pub fn is_business_rule(self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidTarget
                | ErrorKind::InvalidTransition
                | ErrorKind::NavigationBlocked
                | ErrorKind::SessionFinished
        )
    }
}

/// Errors surfaced by the remote authority.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthorityError {
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
}

impl AuthorityError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthorityError::NotFound(_) => ErrorKind::NotFound,
            AuthorityError::InvalidTarget(_) => ErrorKind::InvalidTarget,
            AuthorityError::InvalidTransition(_) => ErrorKind::InvalidTransition,
            AuthorityError::NavigationBlocked(_) => ErrorKind::NavigationBlocked,
            AuthorityError::SessionFinished => ErrorKind::SessionFinished,
            AuthorityError::NotReady => ErrorKind::NotReady,
            AuthorityError::Transient(_) => ErrorKind::Transient,
        }
    }

    /// Rebuild an error from its wire classification.
    #[must_use]
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::NotFound => AuthorityError::NotFound(message),
            ErrorKind::InvalidTarget => AuthorityError::InvalidTarget(message),
            ErrorKind::InvalidTransition => AuthorityError::InvalidTransition(message),
            ErrorKind::NavigationBlocked => AuthorityError::NavigationBlocked(message),
            ErrorKind::SessionFinished => AuthorityError::SessionFinished,
            ErrorKind::NotReady => AuthorityError::NotReady,
            ErrorKind::Transient => AuthorityError::Transient(message),
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthorityError::Transient(_))
    }
}

impl From<reqwest::Error> for AuthorityError {
    fn from(err: reqwest::Error) -> Self {
        AuthorityError::Transient(err.to_string())
    }
}

/// The fixed RPC surface, used for routing, logging and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    ListExams,
    LoadExam,
    StartSession,
    GetSessionState,
    RecordAnswer,
    AdvanceItem,
    RetreatItem,
    PauseSession,
    ResumeSession,
    FinishSession,
    TickSession,
    GetResults,
}

impl RpcMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RpcMethod::ListExams => "list_exams",
            RpcMethod::LoadExam => "load_exam",
            RpcMethod::StartSession => "start_session",
            RpcMethod::GetSessionState => "get_session_state",
            RpcMethod::RecordAnswer => "record_answer",
            RpcMethod::AdvanceItem => "advance_item",
            RpcMethod::RetreatItem => "retreat_item",
            RpcMethod::PauseSession => "pause_session",
            RpcMethod::ResumeSession => "resume_session",
            RpcMethod::FinishSession => "finish_session",
            RpcMethod::TickSession => "tick_session",
            RpcMethod::GetResults => "get_results",
        }
    }
}

impl std::fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contract for the authoritative exam backend.
///
/// Implementations do marshaling only; every business rule lives on the
/// authority side and is reported back as an `AuthorityError`.
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// List identifiers of the exams that can be started.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError::Transient` if the authority cannot be reached.
    async fn list_exams(&self) -> Result<Vec<ExamId>, AuthorityError>;

    /// Load the content of an exam.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError::NotFound` if the exam is unknown.
    async fn load_exam(&self, exam_id: &ExamId) -> Result<ExamDocument, AuthorityError>;

    /// Create a new session in `RUNNING`.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError::NotFound` if the exam is unknown.
    async fn start_session(
        &self,
        exam_id: &ExamId,
        metadata: &SessionMetadata,
    ) -> Result<SessionId, AuthorityError>;

    /// Fetch an authoritative snapshot.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError::NotFound` if the session does not exist.
    async fn get_session_state(
        &self,
        session_id: SessionId,
    ) -> Result<SessionSnapshot, AuthorityError>;

    /// Record (or, with `None`, explicitly clear) the answer to an item.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError::SessionFinished` or `AuthorityError::InvalidTarget`.
    async fn record_answer(
        &self,
        session_id: SessionId,
        item_id: &ItemId,
        choice: Option<&ChoiceId>,
    ) -> Result<(), AuthorityError>;

    /// Move to the next item.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError::NavigationBlocked` at the last item or when the
    /// current item is unanswered.
    async fn advance_item(&self, session_id: SessionId) -> Result<(), AuthorityError>;

    /// Move to the previous item.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError::NavigationBlocked` at the first item.
    async fn retreat_item(&self, session_id: SessionId) -> Result<(), AuthorityError>;

    /// # Errors
    ///
    /// Returns `AuthorityError::InvalidTransition` unless the session is running.
    async fn pause_session(&self, session_id: SessionId) -> Result<(), AuthorityError>;

    /// # Errors
    ///
    /// Returns `AuthorityError::InvalidTransition` unless the session is paused.
    async fn resume_session(&self, session_id: SessionId) -> Result<(), AuthorityError>;

    /// Finish the session. A second call on a finished session succeeds.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError::NotFound` or `AuthorityError::Transient`.
    async fn finish_session(&self, session_id: SessionId) -> Result<(), AuthorityError>;

    /// Advance authoritative elapsed time by the wall-clock delta since the last tick.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError::NotFound` or `AuthorityError::Transient`.
    async fn tick_session(&self, session_id: SessionId) -> Result<(), AuthorityError>;

    /// Score report of a finished session.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError::NotReady` if the session has not finished.
    async fn get_results(&self, session_id: SessionId) -> Result<Results, AuthorityError>;
}
