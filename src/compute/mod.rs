//! Compute module - pattern detection, scoring, and orchestration.

pub mod detect;
mod history;
mod hypothesis;
mod scoring;
mod solver;
mod zones;

pub use detect::DetectorError;
pub use history::{EvaluationHistory, HistoryEntry};
pub use hypothesis::{ConditionalRule, Hypothesis, Motif, NeighborRule, PatternKind, Rule};
pub use scoring::{HypothesisEvaluator, RiskLevel, ScoreReport, ScoringInput};
pub use solver::{FALLBACK_METHOD, Solver};
pub use zones::{Zone, ZoneKey, ZoneMap, find_enclosed_zones};
