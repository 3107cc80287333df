//! Combining per-sensor score lists into one decision.
//!
//! Each classifier contributes one score per class. Scores are averaged per
//! class label and the label with the highest average wins; ties go to the
//! class listed first by the first score list.

use crate::classifier::{best_label, ClassScore};
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome of fusing several score lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedDecision {
    pub label: String,
    /// Averaged score per class, in the first list's order
    pub combined: Vec<ClassScore>,
}

/// Average `score_lists` per class and pick the best class.
///
/// Every list must name the same set of classes exactly once.
pub fn fuse<L: AsRef<[ClassScore]>>(score_lists: &[L]) -> Result<FusedDecision> {
    let reference = score_lists
        .first()
        .map(|list| list.as_ref())
        .ok_or_else(|| PipelineError::InputValidation("nothing to fuse".to_string()))?;
    if reference.is_empty() {
        return Err(PipelineError::InputValidation(
            "score lists name no classes".to_string(),
        ));
    }

    let expected = sorted_labels(reference);
    if expected.windows(2).any(|pair| pair[0] == pair[1]) {
        return Err(PipelineError::InputValidation(format!(
            "a score list repeats a class: {expected:?}"
        )));
    }

    let mut totals: HashMap<&str, f64> = HashMap::new();
    for list in score_lists {
        let list = list.as_ref();
        let found = sorted_labels(list);
        if found != expected {
            return Err(PipelineError::ClassOrderingInconsistency { expected, found });
        }
        for entry in list {
            *totals.entry(entry.label.as_str()).or_insert(0.0) += entry.score;
        }
    }

    let count = score_lists.len() as f64;
    let combined: Vec<ClassScore> = reference
        .iter()
        .map(|entry| {
            let total = totals.get(entry.label.as_str()).copied().unwrap_or(0.0);
            ClassScore::new(total / count, entry.label.clone())
        })
        .collect();

    let label = best_label(&combined)
        .map(str::to_string)
        .ok_or_else(|| PipelineError::Numerical("no fused score".to_string()))?;

    Ok(FusedDecision { label, combined })
}

fn sorted_labels(list: &[ClassScore]) -> Vec<String> {
    let mut labels: Vec<String> = list.iter().map(|s| s.label.clone()).collect();
    labels.sort();
    labels
}
