use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{ChoiceId, ExamId, ItemId};

/// The only document schema this crate understands.
pub const SUPPORTED_SCHEMA_VERSION: &str = "1.0";

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamError {
    #[error("unsupported schema version: {0} (expected {SUPPORTED_SCHEMA_VERSION})")]
    UnsupportedSchema(String),

    #[error("exam has no items")]
    Empty,

    #[error("inconsistent item count: expected {expected}, found {actual}")]
    InconsistentItemCount { expected: usize, actual: usize },

    #[error("invalid item id: {0:?}")]
    InvalidItemId(String),

    #[error("duplicate item id: {0}")]
    DuplicateItemId(ItemId),

    #[error("item {id} has ordinal {actual}, expected {expected}")]
    OrdinalMismatch { id: ItemId, expected: u32, actual: u32 },

    #[error("item {0} has no choices")]
    NoChoices(ItemId),

    #[error("item {item} repeats choice {choice}")]
    DuplicateChoice { item: ItemId, choice: ChoiceId },
}

//
// ─── DOCUMENT ──────────────────────────────────────────────────────────────────
//

/// One selectable option for an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: ChoiceId,
    pub label: String,
}

/// One exam question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(default)]
    pub area: String,
    pub ordinal: u32,
    pub prompt: String,
    /// Paths relative to the exam's asset directory.
    #[serde(default)]
    pub images: Vec<String>,
    pub choices: Vec<Choice>,
    pub answer_key: ChoiceId,
}

impl Item {
    #[must_use]
    pub fn choice(&self, id: &ChoiceId) -> Option<&Choice> {
        self.choices.iter().find(|choice| &choice.id == id)
    }

    #[must_use]
    pub fn has_choice(&self, id: &ChoiceId) -> bool {
        self.choice(id).is_some()
    }
}

/// Read-only exam content, loaded once per session view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamDocument {
    pub schema_version: String,
    pub content_version: String,
    pub board: String,
    pub year: u16,
    #[serde(default)]
    pub day: Option<u8>,
    pub duration_minutes: u16,
    pub total_items: usize,
    pub items: Vec<Item>,
}

impl ExamDocument {
    /// Check the structural rules every loaded document must satisfy.
    ///
    /// # Errors
    ///
    /// Returns the first `ExamError` found: unsupported schema, empty or
    /// inconsistent item list, bad/duplicate item ids, ordinals that do not
    /// follow the sequence order, or items without (unique) choices.
    pub fn validate(&self) -> Result<(), ExamError> {
        if self.schema_version != SUPPORTED_SCHEMA_VERSION {
            return Err(ExamError::UnsupportedSchema(self.schema_version.clone()));
        }
        if self.items.is_empty() {
            return Err(ExamError::Empty);
        }
        if self.items.len() != self.total_items {
            return Err(ExamError::InconsistentItemCount {
                expected: self.total_items,
                actual: self.items.len(),
            });
        }

        let mut ids = HashSet::with_capacity(self.items.len());
        for (index, item) in self.items.iter().enumerate() {
            if item.id.as_str().trim().is_empty() {
                return Err(ExamError::InvalidItemId(item.id.to_string()));
            }
            if !ids.insert(&item.id) {
                return Err(ExamError::DuplicateItemId(item.id.clone()));
            }

            let expected = u32::try_from(index + 1).unwrap_or(u32::MAX);
            if item.ordinal != expected {
                return Err(ExamError::OrdinalMismatch {
                    id: item.id.clone(),
                    expected,
                    actual: item.ordinal,
                });
            }

            if item.choices.is_empty() {
                return Err(ExamError::NoChoices(item.id.clone()));
            }
            let mut choices = HashSet::with_capacity(item.choices.len());
            for choice in &item.choices {
                if !choices.insert(&choice.id) {
                    return Err(ExamError::DuplicateChoice {
                        item: item.id.clone(),
                        choice: choice.id.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Identifier derived from board, year and day: `enem_2023_dia1`.
    #[must_use]
    pub fn exam_id(&self) -> ExamId {
        let mut id = format!("{}_{}", self.board.to_lowercase(), self.year);
        if let Some(day) = self.day {
            id.push_str(&format!("_dia{day}"));
        }
        ExamId::new(id)
    }

    /// Human-readable name: `ENEM 2023 (Dia 1)`.
    #[must_use]
    pub fn display_name(&self) -> String {
        let mut name = format!("{} {}", self.board, self.year);
        if let Some(day) = self.day {
            name.push_str(&format!(" (Dia {day})"));
        }
        name
    }

    /// Time limit in seconds; zero means unlimited.
    #[must_use]
    pub fn time_limit_seconds(&self) -> u32 {
        u32::from(self.duration_minutes) * 60
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn item(&self, id: &ItemId) -> Option<&Item> {
        self.items.iter().find(|item| &item.id == id)
    }

    #[must_use]
    pub fn contains_item(&self, id: &ItemId) -> bool {
        self.item(id).is_some()
    }

    /// Zero-based position of an item in sequence order.
    #[must_use]
    pub fn position(&self, id: &ItemId) -> Option<usize> {
        self.items.iter().position(|item| &item.id == id)
    }

    #[must_use]
    pub fn first_item(&self) -> Option<&Item> {
        self.items.first()
    }

    #[must_use]
    pub fn is_first(&self, id: &ItemId) -> bool {
        self.position(id) == Some(0)
    }

    #[must_use]
    pub fn is_last(&self, id: &ItemId) -> bool {
        self.position(id)
            .is_some_and(|pos| pos + 1 == self.items.len())
    }
}
