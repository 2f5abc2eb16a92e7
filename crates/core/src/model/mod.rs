mod exam;
mod ids;
mod results;
mod session;

pub use ids::{ChoiceId, ExamId, ItemId, ParseIdError, SessionId};

pub use exam::{Choice, ExamDocument, ExamError, Item, SUPPORTED_SCHEMA_VERSION};
pub use results::{ItemResult, Results};
pub use session::{
    Answers, FinishReason, SessionMetadata, SessionProgress, SessionSnapshot, SessionStatus,
    SessionTime, is_expired,
};
