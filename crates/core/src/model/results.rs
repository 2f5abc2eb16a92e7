use serde::{Deserialize, Serialize};

use crate::model::{Answers, ChoiceId, ExamDocument, ItemId};

/// Per-item line of a results report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub item_id: ItemId,
    pub ordinal: u32,
    pub user_choice: Option<ChoiceId>,
    pub correct_choice: ChoiceId,
    pub is_correct: bool,
}

/// Score report for a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Results {
    pub total_items: usize,
    pub correct_count: usize,
    pub incorrect_count: usize,
    pub score_percent: f64,
    pub per_item: Vec<ItemResult>,
}

impl Results {
    /// Grade an answer ledger against the document's answer keys.
    ///
    /// Unanswered and cleared items count as incorrect.
    #[must_use]
    pub fn grade(exam: &ExamDocument, answers: &Answers) -> Self {
        let per_item: Vec<ItemResult> = exam
            .items
            .iter()
            .map(|item| {
                let user_choice = answers.get(&item.id).cloned().flatten();
                let is_correct = user_choice.as_ref() == Some(&item.answer_key);
                ItemResult {
                    item_id: item.id.clone(),
                    ordinal: item.ordinal,
                    user_choice,
                    correct_choice: item.answer_key.clone(),
                    is_correct,
                }
            })
            .collect();

        let total_items = per_item.len();
        let correct_count = per_item.iter().filter(|r| r.is_correct).count();
        #[allow(clippy::cast_precision_loss)]
        let score_percent = if total_items > 0 {
            correct_count as f64 / total_items as f64 * 100.0
        } else {
            0.0
        };

        Self {
            total_items,
            correct_count,
            incorrect_count: total_items - correct_count,
            score_percent,
            per_item,
        }
    }
}
