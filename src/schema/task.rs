//! Task and solution records exchanged with the surrounding loader and
//! reporting code.
//!
//! These are the only wire shapes the engine consumes or produces. File and
//! JSON handling lives entirely outside the core.

use serde::{Deserialize, Serialize};

use super::Grid;

/// One puzzle: training pairs plus test inputs.
///
/// A test case may carry a withheld expected output; it is used only for
/// offline validation inside the scorer, never for hypothesis selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: String,
    pub train: Vec<TrainingPair>,
    pub test: Vec<TestCase>,
}

/// One (input, output) training example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPair {
    pub input: Grid,
    pub output: Grid,
}

/// One test input, optionally with a withheld expected output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: Grid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Grid>,
}

/// Result record for one test input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    /// The predicted output grid. Falls back to the test input unchanged
    /// when no hypothesis cleared its threshold.
    pub solution: Grid,
    /// Calibrated confidence in [0, 1]; 0 for fallback solutions.
    pub confidence: f32,
    /// Name of the winning pattern family, or "fallback".
    pub method: String,
    pub validation: ValidationSummary,
    pub diagnostics: Diagnostics,
}

/// Outcome of re-applying the winning rule to every training pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    /// Training pairs reproduced exactly.
    pub matched: usize,
    /// Total training pairs.
    pub total: usize,
    /// mismatched / total; 1.0 when there are no pairs to validate against.
    pub error_rate: f32,
}

impl ValidationSummary {
    /// Summary for `matched` exact reproductions out of `total` pairs.
    pub fn new(matched: usize, total: usize) -> Self {
        let error_rate = if total == 0 {
            1.0
        } else {
            (total - matched) as f32 / total as f32
        };
        Self {
            matched,
            total,
            error_rate,
        }
    }
}

/// Non-fatal observations collected during a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    /// One entry per caught detector failure, formatted as
    /// "<detector> on pair <i>: <cause>".
    pub detector_failures: Vec<String>,
    /// Total hypotheses proposed across all detectors and pairs.
    pub patterns_detected: usize,
}
