//! JSON shapes exchanged with the HTTP authority.
//!
//! Requests are flat objects of snake_case parameters. Responses use an
//! externally tagged envelope: `{"ok": <value>}` or
//! `{"error": {"kind": "NOT_FOUND", "message": "..."}}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use simulado_core::model::{ChoiceId, ExamId, ItemId, SessionId, SessionMetadata};

use crate::remote::{AuthorityError, ErrorKind};

#[derive(Debug, Serialize)]
pub(crate) struct NoParams {}

#[derive(Debug, Serialize)]
pub(crate) struct ExamParams<'a> {
    pub exam_id: &'a ExamId,
}

#[derive(Debug, Serialize)]
pub(crate) struct StartParams<'a> {
    pub exam_id: &'a ExamId,
    #[serde(flatten)]
    pub metadata: &'a SessionMetadata,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionParams {
    pub session_id: SessionId,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerParams<'a> {
    pub session_id: SessionId,
    pub item_id: &'a ItemId,
    pub choice: Option<&'a ChoiceId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Envelope<T> {
    Ok(T),
    Error(WireError),
}

#[derive(Debug, Deserialize)]
struct WireError {
    kind: ErrorKind,
    #[serde(default)]
    message: String,
}

/// Decode a response body into the call's result.
///
/// Bodies that are not a valid envelope become `Transient`, whatever the
/// HTTP status.
pub(crate) fn decode<T: DeserializeOwned>(
    status: reqwest::StatusCode,
    body: &[u8],
) -> Result<T, AuthorityError> {
    match serde_json::from_slice::<Envelope<T>>(body) {
        Ok(Envelope::Ok(value)) => Ok(value),
        Ok(Envelope::Error(err)) => Err(AuthorityError::from_kind(err.kind, err.message)),
        Err(_) if !status.is_success() => Err(AuthorityError::Transient(format!(
            "authority answered HTTP {status}"
        ))),
        Err(e) => Err(AuthorityError::Transient(format!(
            "malformed authority response: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use simulado_core::model::{SessionSnapshot, SessionStatus};

    #[test]
    fn unit_result_decodes_from_null() {
        let decoded: Result<(), _> = decode(StatusCode::OK, br#"{"ok": null}"#);
        assert_eq!(decoded, Ok(()));
    }

    #[test]
    fn snapshot_decodes() {
        let body = br#"{"ok": {
            "status": "PAUSED",
            "time": {"limit_seconds": 0, "elapsed_seconds": 30},
            "progress": {"current_item": "Q01", "answered": 0, "total": 1}
        }}"#;
        let snapshot: SessionSnapshot = decode(StatusCode::OK, body).unwrap();
        assert_eq!(snapshot.status, SessionStatus::Paused);
        assert!(snapshot.answers.is_empty());
    }

    #[test]
    fn error_envelope_maps_to_taxonomy() {
        let body = br#"{"error": {"kind": "NAVIGATION_BLOCKED", "message": "last item"}}"#;
        let err = decode::<()>(StatusCode::CONFLICT, body).unwrap_err();
        assert_eq!(err, AuthorityError::NavigationBlocked("last item".into()));

        let body = br#"{"error": {"kind": "NOT_READY"}}"#;
        let err = decode::<()>(StatusCode::OK, body).unwrap_err();
        assert_eq!(err, AuthorityError::NotReady);
    }

    #[test]
    fn garbage_is_transient() {
        let err = decode::<()>(StatusCode::BAD_GATEWAY, b"<html>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.to_string().contains("502"));

        let err = decode::<u32>(StatusCode::OK, br#"{"ok": "nope"}"#).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn start_params_flatten_metadata() {
        let exam_id = ExamId::new("enem_2023");
        let metadata = SessionMetadata {
            board: "ENEM".into(),
            year: 2023,
            duration_minutes: 300,
        };
        let json = serde_json::to_value(StartParams {
            exam_id: &exam_id,
            metadata: &metadata,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "exam_id": "enem_2023",
                "board": "ENEM",
                "year": 2023,
                "duration_minutes": 300
            })
        );
    }

    #[test]
    fn cleared_answer_serializes_null_choice() {
        let item = ItemId::new("Q03");
        let json = serde_json::to_value(AnswerParams {
            session_id: SessionId::new(9),
            item_id: &item,
            choice: None,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"session_id": 9, "item_id": "Q03", "choice": null})
        );
    }
}
