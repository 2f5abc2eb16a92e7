use std::sync::Arc;

use authority::RemoteAuthority;
use simulado_core::model::{Results, SessionId};

use crate::error::ControllerError;

/// Fetches score reports of finished sessions.
#[derive(Clone)]
pub struct ResultsService {
    authority: Arc<dyn RemoteAuthority>,
}

impl ResultsService {
    #[must_use]
    pub fn new(authority: Arc<dyn RemoteAuthority>) -> Self {
        Self { authority }
    }

    /// # Errors
    ///
    /// `NotReady` until the session has finished, `NotFound` for unknown
    /// sessions.
    pub async fn fetch(&self, session_id: SessionId) -> Result<Results, ControllerError> {
        Ok(self.authority.get_results(session_id).await?)
    }
}
