//! Deterministic exam documents for tests, demos and doc examples.

use crate::model::{Choice, ChoiceId, ExamDocument, Item, ItemId};

/// Labels used for the choices of every generated item.
const CHOICES: [&str; 4] = ["A", "B", "C", "D"];

/// Builds a valid one-minute exam with `items` questions (`Q01`, `Q02`, ...).
///
/// Every item offers choices `A` to `D` and has `A` as its answer key.
#[must_use]
pub fn sample_exam(items: usize) -> ExamDocument {
    let items: Vec<Item> = (1..=items)
        .map(|n| Item {
            id: ItemId::new(format!("Q{n:02}")),
            area: "matematica".into(),
            ordinal: u32::try_from(n).unwrap_or(u32::MAX),
            prompt: format!("Question {n}"),
            images: Vec::new(),
            choices: CHOICES
                .iter()
                .map(|label| Choice {
                    id: ChoiceId::new(*label),
                    label: format!("Option {label}"),
                })
                .collect(),
            answer_key: ChoiceId::new("A"),
        })
        .collect();

    ExamDocument {
        schema_version: crate::model::SUPPORTED_SCHEMA_VERSION.into(),
        content_version: "test".into(),
        board: "ENEM".into(),
        year: 2023,
        day: Some(1),
        duration_minutes: 1,
        total_items: items.len(),
        items,
    }
}
