//! Bounded per-pattern evaluation history.
//!
//! One ring per pattern family keeps the most recent score summaries so the
//! scorer can detect historical instability. Appends truncate from the
//! oldest end once the ring is full. The store is process-wide mutable
//! state; the solver wraps it in a mutex so concurrent tasks serialize
//! their read-modify-append (a lost update would silently corrupt the
//! ring rather than fail loudly).

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use super::hypothesis::PatternKind;

/// Summary of one past evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Monotonic sequence number standing in for a wall-clock stamp, so
    /// identical runs produce identical records.
    pub sequence: u64,
    pub final_score: f32,
    pub generalization: f32,
    pub overfitting_risk: f32,
}

/// Process-wide bounded history, keyed by pattern family.
#[derive(Debug)]
pub struct EvaluationHistory {
    capacity: usize,
    next_sequence: u64,
    rings: HashMap<PatternKind, VecDeque<HistoryEntry>>,
}

impl EvaluationHistory {
    /// Create a history keeping at most `capacity` entries per pattern.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_sequence: 0,
            rings: HashMap::new(),
        }
    }

    /// Append one evaluation summary, truncating the oldest on overflow.
    pub fn record(
        &mut self,
        kind: PatternKind,
        final_score: f32,
        generalization: f32,
        overfitting_risk: f32,
    ) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let ring = self.rings.entry(kind).or_default();
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(HistoryEntry {
            sequence,
            final_score,
            generalization,
            overfitting_risk,
        });
    }

    /// Number of retained entries for a pattern.
    pub fn len(&self, kind: PatternKind) -> usize {
        self.rings.get(&kind).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, kind: PatternKind) -> bool {
        self.len(kind) == 0
    }

    /// Retained entries, oldest first.
    pub fn entries(&self, kind: PatternKind) -> impl Iterator<Item = &HistoryEntry> {
        self.rings.get(&kind).into_iter().flatten()
    }

    /// Mean of retained final scores.
    pub fn mean_final_score(&self, kind: PatternKind) -> Option<f32> {
        let ring = self.rings.get(&kind)?;
        if ring.is_empty() {
            return None;
        }
        Some(ring.iter().map(|e| e.final_score).sum::<f32>() / ring.len() as f32)
    }

    /// Population variance of retained final scores; needs two entries.
    pub fn final_score_variance(&self, kind: PatternKind) -> Option<f32> {
        let ring = self.rings.get(&kind)?;
        if ring.len() < 2 {
            return None;
        }
        let mean = ring.iter().map(|e| e.final_score).sum::<f32>() / ring.len() as f32;
        Some(
            ring.iter()
                .map(|e| (e.final_score - mean).powi(2))
                .sum::<f32>()
                / ring.len() as f32,
        )
    }

    /// Best final score seen for a pattern.
    pub fn best_final_score(&self, kind: PatternKind) -> Option<f32> {
        self.rings
            .get(&kind)?
            .iter()
            .map(|e| e.final_score)
            .fold(None, |best, v| {
                Some(best.map_or(v, |b: f32| b.max(v)))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_is_bounded() {
        let mut history = EvaluationHistory::new(3);
        for i in 0..5 {
            history.record(PatternKind::Rotation, i as f32 / 10.0, 0.5, 0.1);
        }
        assert_eq!(history.len(PatternKind::Rotation), 3);
        // Oldest entries were truncated.
        let sequences: Vec<u64> = history
            .entries(PatternKind::Rotation)
            .map(|e| e.sequence)
            .collect();
        assert_eq!(sequences, vec![2, 3, 4]);
    }

    #[test]
    fn test_sequence_is_global() {
        let mut history = EvaluationHistory::new(10);
        history.record(PatternKind::Symmetry, 0.5, 0.5, 0.1);
        history.record(PatternKind::Rotation, 0.6, 0.5, 0.1);
        let seq: Vec<u64> = history
            .entries(PatternKind::Rotation)
            .map(|e| e.sequence)
            .collect();
        assert_eq!(seq, vec![1]);
    }

    #[test]
    fn test_statistics() {
        let mut history = EvaluationHistory::new(10);
        assert_eq!(history.mean_final_score(PatternKind::ZoneFill), None);
        assert_eq!(history.final_score_variance(PatternKind::ZoneFill), None);

        history.record(PatternKind::ZoneFill, 0.4, 0.5, 0.1);
        assert_eq!(history.final_score_variance(PatternKind::ZoneFill), None);

        history.record(PatternKind::ZoneFill, 0.8, 0.5, 0.1);
        let mean = history.mean_final_score(PatternKind::ZoneFill).unwrap();
        assert!((mean - 0.6).abs() < 1e-6);
        let variance = history.final_score_variance(PatternKind::ZoneFill).unwrap();
        assert!((variance - 0.04).abs() < 1e-6);
        assert_eq!(history.best_final_score(PatternKind::ZoneFill), Some(0.8));
    }
}
