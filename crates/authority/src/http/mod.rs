use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use simulado_core::model::{
    ChoiceId, ExamDocument, ExamId, ItemId, Results, SessionId, SessionMetadata, SessionSnapshot,
};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::remote::{AuthorityError, RemoteAuthority, RpcMethod};

mod wire;

use wire::{AnswerParams, ExamParams, NoParams, SessionParams, StartParams};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised while configuring the HTTP authority.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HttpConfigError {
    #[error("SIMULADO_AUTHORITY_URL is not set")]
    MissingUrl,
    #[error("invalid authority url {raw:?}: {source}")]
    InvalidUrl {
        raw: String,
        source: url::ParseError,
    },
    #[error("invalid SIMULADO_HTTP_TIMEOUT_MS value: {0:?}")]
    InvalidTimeout(String),
    #[error(transparent)]
    Client(#[from] reqwest::Error),
}

#[derive(Clone, Debug)]
pub struct HttpAuthorityConfig {
    pub base_url: Url,
    pub timeout: Duration,
}

impl HttpAuthorityConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url: with_trailing_slash(base_url),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Parse a base URL such as `http://localhost:8080/api`.
    ///
    /// # Errors
    ///
    /// Returns `HttpConfigError::InvalidUrl` when `raw` is not an absolute URL.
    pub fn parse(raw: &str) -> Result<Self, HttpConfigError> {
        let url = Url::parse(raw.trim()).map_err(|source| HttpConfigError::InvalidUrl {
            raw: raw.to_string(),
            source,
        })?;
        Ok(Self::new(url))
    }

    /// Read `SIMULADO_AUTHORITY_URL` and the optional `SIMULADO_HTTP_TIMEOUT_MS`.
    ///
    /// # Errors
    ///
    /// Returns `HttpConfigError` when the URL is missing/invalid or the timeout
    /// is not a positive integer.
    pub fn from_env() -> Result<Self, HttpConfigError> {
        let raw = env::var("SIMULADO_AUTHORITY_URL").map_err(|_| HttpConfigError::MissingUrl)?;
        let mut config = Self::parse(&raw)?;
        if let Ok(value) = env::var("SIMULADO_HTTP_TIMEOUT_MS") {
            config.timeout = parse_timeout_ms(&value)?;
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, method: RpcMethod) -> Result<Url, AuthorityError> {
        self.base_url
            .join(&format!("rpc/{}", method.as_str()))
            .map_err(|e| AuthorityError::Transient(format!("bad endpoint for {method}: {e}")))
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn parse_timeout_ms(value: &str) -> Result<Duration, HttpConfigError> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .ok_or_else(|| HttpConfigError::InvalidTimeout(value.to_string()))
}

/// `RemoteAuthority` over JSON-over-HTTP.
#[derive(Clone)]
pub struct HttpAuthority {
    client: Client,
    config: HttpAuthorityConfig,
}

impl HttpAuthority {
    /// # Errors
    ///
    /// Returns `HttpConfigError::Client` if the HTTP client cannot be built.
    pub fn new(config: HttpAuthorityConfig) -> Result<Self, HttpConfigError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// # Errors
    ///
    /// See [`HttpAuthorityConfig::from_env`] and [`HttpAuthority::new`].
    pub fn from_env() -> Result<Self, HttpConfigError> {
        Self::new(HttpAuthorityConfig::from_env()?)
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.config.base_url
    }

    async fn call<P, T>(&self, method: RpcMethod, params: &P) -> Result<T, AuthorityError>
    where
        P: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.config.endpoint(method)?;
        debug!(method = %method, %url, "authority request");

        let response = self.client.post(url).json(params).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        let result = wire::decode(status, &body);
        if let Err(err) = &result {
            if err.is_transient() {
                warn!(method = %method, %status, error = %err, "authority call failed");
            } else {
                debug!(method = %method, error = %err, "authority rejected call");
            }
        }
        result
    }
}

#[async_trait]
impl RemoteAuthority for HttpAuthority {
    async fn list_exams(&self) -> Result<Vec<ExamId>, AuthorityError> {
        self.call(RpcMethod::ListExams, &NoParams {}).await
    }

    async fn load_exam(&self, exam_id: &ExamId) -> Result<ExamDocument, AuthorityError> {
        self.call(RpcMethod::LoadExam, &ExamParams { exam_id }).await
    }

    async fn start_session(
        &self,
        exam_id: &ExamId,
        metadata: &SessionMetadata,
    ) -> Result<SessionId, AuthorityError> {
        self.call(RpcMethod::StartSession, &StartParams { exam_id, metadata })
            .await
    }

    async fn get_session_state(
        &self,
        session_id: SessionId,
    ) -> Result<SessionSnapshot, AuthorityError> {
        self.call(RpcMethod::GetSessionState, &SessionParams { session_id })
            .await
    }

    async fn record_answer(
        &self,
        session_id: SessionId,
        item_id: &ItemId,
        choice: Option<&ChoiceId>,
    ) -> Result<(), AuthorityError> {
        let params = AnswerParams {
            session_id,
            item_id,
            choice,
        };
        self.call(RpcMethod::RecordAnswer, &params).await
    }

    async fn advance_item(&self, session_id: SessionId) -> Result<(), AuthorityError> {
        self.call(RpcMethod::AdvanceItem, &SessionParams { session_id })
            .await
    }

    async fn retreat_item(&self, session_id: SessionId) -> Result<(), AuthorityError> {
        self.call(RpcMethod::RetreatItem, &SessionParams { session_id })
            .await
    }

    async fn pause_session(&self, session_id: SessionId) -> Result<(), AuthorityError> {
        self.call(RpcMethod::PauseSession, &SessionParams { session_id })
            .await
    }

    async fn resume_session(&self, session_id: SessionId) -> Result<(), AuthorityError> {
        self.call(RpcMethod::ResumeSession, &SessionParams { session_id })
            .await
    }

    async fn finish_session(&self, session_id: SessionId) -> Result<(), AuthorityError> {
        self.call(RpcMethod::FinishSession, &SessionParams { session_id })
            .await
    }

    async fn tick_session(&self, session_id: SessionId) -> Result<(), AuthorityError> {
        self.call(RpcMethod::TickSession, &SessionParams { session_id })
            .await
    }

    async fn get_results(&self, session_id: SessionId) -> Result<Results, AuthorityError> {
        self.call(RpcMethod::GetResults, &SessionParams { session_id })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_keep_the_base_path() {
        let config = HttpAuthorityConfig::parse("http://localhost:8080/api").unwrap();
        let url = config.endpoint(RpcMethod::TickSession).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/rpc/tick_session");

        let config = HttpAuthorityConfig::parse("http://localhost:8080/").unwrap();
        let url = config.endpoint(RpcMethod::ListExams).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/rpc/list_exams");
    }

    #[test]
    fn relative_url_is_rejected() {
        let err = HttpAuthorityConfig::parse("localhost/api").unwrap_err();
        assert!(matches!(err, HttpConfigError::InvalidUrl { .. }));
    }

    #[test]
    fn timeout_must_be_positive() {
        assert_eq!(parse_timeout_ms("250").unwrap(), Duration::from_millis(250));
        assert!(parse_timeout_ms("0").is_err());
        assert!(parse_timeout_ms("soon").is_err());
    }

    #[tokio::test]
    async fn unreachable_authority_is_transient() {
        // Port 9 (discard) on localhost is expected to refuse connections.
        let config = HttpAuthorityConfig::parse("http://127.0.0.1:9/")
            .unwrap()
            .with_timeout(Duration::from_millis(500));
        let authority = HttpAuthority::new(config).unwrap();

        let err = authority.list_exams().await.unwrap_err();
        assert!(err.is_transient());
    }
}
