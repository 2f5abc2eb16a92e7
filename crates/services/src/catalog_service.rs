use std::sync::Arc;

use authority::RemoteAuthority;
use simulado_core::model::{ExamDocument, ExamId, SessionId, SessionMetadata};
use tracing::info;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::sessions::{SessionController, SessionObserver};

/// Entry point for choosing an exam and opening a session on it.
#[derive(Clone)]
pub struct ExamCatalogService {
    authority: Arc<dyn RemoteAuthority>,
    config: ControllerConfig,
}

impl ExamCatalogService {
    #[must_use]
    pub fn new(authority: Arc<dyn RemoteAuthority>) -> Self {
        Self {
            authority,
            config: ControllerConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// # Errors
    ///
    /// Returns `ControllerError::Transient` if the authority cannot be reached.
    pub async fn list_exams(&self) -> Result<Vec<ExamId>, ControllerError> {
        Ok(self.authority.list_exams().await?)
    }

    /// Load and validate an exam document.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown exams, `Exam` when the document is invalid.
    pub async fn load_exam(&self, exam_id: &ExamId) -> Result<Arc<ExamDocument>, ControllerError> {
        let exam = self.authority.load_exam(exam_id).await?;
        exam.validate()?;
        Ok(Arc::new(exam))
    }

    /// Start a new session on `exam_id` and attach a controller to it.
    ///
    /// # Errors
    ///
    /// Any error from loading the exam, starting the session or attaching.
    pub async fn start_session(
        &self,
        exam_id: &ExamId,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<SessionController, ControllerError> {
        let exam = self.load_exam(exam_id).await?;
        let metadata = SessionMetadata {
            board: exam.board.clone(),
            year: exam.year,
            duration_minutes: exam.duration_minutes,
        };
        let session_id = self.authority.start_session(exam_id, &metadata).await?;
        info!(
            session_id = %session_id,
            exam = %exam.display_name(),
            "session started"
        );
        self.open(exam_id.clone(), exam, session_id, observer).await
    }

    /// Attach to an existing session, e.g. after the view was rebuilt.
    ///
    /// # Errors
    ///
    /// `NotFound` when the exam or the session is unknown.
    pub async fn resume_session(
        &self,
        exam_id: &ExamId,
        session_id: SessionId,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<SessionController, ControllerError> {
        let exam = self.load_exam(exam_id).await?;
        self.open(exam_id.clone(), exam, session_id, observer).await
    }

    async fn open(
        &self,
        exam_id: ExamId,
        exam: Arc<ExamDocument>,
        session_id: SessionId,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<SessionController, ControllerError> {
        SessionController::attach(
            exam_id,
            exam,
            session_id,
            Arc::clone(&self.authority),
            observer,
            &self.config,
        )
        .await
    }
}
