//! Solver - orchestrates one task end to end.
//!
//! Per task the pipeline is: analyze every training pair with every
//! detector, aggregate the hypotheses by family, select a winner, apply it
//! to the test inputs, re-validate against the training pairs, and emit a
//! solution record. Every failure short of a malformed grid degrades to
//! the identity fallback instead of aborting.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use rayon::prelude::*;

use super::detect;
use super::history::EvaluationHistory;
use super::hypothesis::{ConditionalRule, Hypothesis, Motif, PatternKind, Rule};
use super::scoring::{HypothesisEvaluator, ScoringInput};
use super::zones::ZoneMap;
use crate::schema::{
    ConfigError, Diagnostics, EngineConfig, Solution, Task, TestCase, TrainingPair,
    ValidationSummary,
};

/// Method name reported when no hypothesis cleared its threshold.
pub const FALLBACK_METHOD: &str = "fallback";

/// Task orchestrator. Cheap to share; the only mutable state is the
/// bounded evaluation history behind a mutex, so concurrent `solve` calls
/// serialize their history updates and nothing else.
pub struct Solver {
    config: EngineConfig,
    evaluator: HypothesisEvaluator,
    history: Arc<Mutex<EvaluationHistory>>,
}

impl Solver {
    /// Create a solver from a validated configuration.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let history = Arc::new(Mutex::new(EvaluationHistory::new(config.history_capacity)));
        let evaluator = HypothesisEvaluator::new(config.clone(), Arc::clone(&history));
        Ok(Self {
            config,
            evaluator,
            history,
        })
    }

    /// Shared handle to the process-wide evaluation history.
    pub fn history(&self) -> Arc<Mutex<EvaluationHistory>> {
        Arc::clone(&self.history)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Solve one task, producing one solution per test input.
    pub fn solve(&self, task: &Task) -> Vec<Solution> {
        let mut diagnostics = Diagnostics::default();

        if task.train.is_empty() {
            log::warn!(
                "task {}: no training pairs, emitting identity fallback",
                task.task_id
            );
            return fallback_solutions(&task.test, &task.train, &diagnostics);
        }

        // AnalyzePairs: every detector on every pair; failures become
        // diagnostics, never aborts.
        let mut proposals: Vec<(usize, Hypothesis)> = Vec::new();
        for (pair_index, pair) in task.train.iter().enumerate() {
            for kind in PatternKind::ALL {
                match detect::run(kind, &pair.input, &pair.output, &self.config.detectors) {
                    Ok(hypotheses) => {
                        proposals.extend(hypotheses.into_iter().map(|h| (pair_index, h)));
                    }
                    Err(error) => {
                        log::warn!(
                            "task {}: {} detector failed on pair {}: {}",
                            task.task_id,
                            kind.name(),
                            pair_index,
                            error
                        );
                        diagnostics
                            .detector_failures
                            .push(format!("{} on pair {}: {}", kind.name(), pair_index, error));
                    }
                }
            }
        }
        diagnostics.patterns_detected = proposals.len();

        // AggregateHypotheses + SelectWinner.
        let aggregates = aggregate(proposals);
        let Some(winner) = select_winner(&aggregates) else {
            log::debug!("task {}: no hypothesis cleared its threshold", task.task_id);
            return fallback_solutions(&task.test, &task.train, &diagnostics);
        };
        let rule = merge_rule(winner);

        // Score the winner. Withheld test outputs feed only this step.
        let validation_pairs: Vec<TrainingPair> = task
            .test
            .iter()
            .filter_map(|case| {
                case.output.as_ref().map(|output| TrainingPair {
                    input: case.input.clone(),
                    output: output.clone(),
                })
            })
            .collect();
        let report = self.evaluator.evaluate(&ScoringInput {
            kind: winner.kind,
            rule: &rule,
            base_score: winner.base_score(),
            confidence: winner.peak_evidence(),
            evidences: &winner.evidences,
            train: &task.train,
            validation: &validation_pairs,
        });

        // CrossValidate: the winning rule must reproduce the training pairs.
        let matched = task
            .train
            .iter()
            .filter(|pair| rule.apply(&pair.input) == pair.output)
            .count();
        let validation = ValidationSummary::new(matched, task.train.len());
        let confidence =
            (report.final_score * (1.0 - validation.error_rate)).clamp(0.0, 1.0);

        log::debug!(
            "task {}: {} wins with final score {:.3}, error rate {:.3}",
            task.task_id,
            winner.kind.name(),
            report.final_score,
            validation.error_rate
        );

        // Emit one solution per test input.
        task.test
            .iter()
            .map(|case| Solution {
                solution: rule.apply(&case.input),
                confidence,
                method: winner.kind.name().to_string(),
                validation: validation.clone(),
                diagnostics: diagnostics.clone(),
            })
            .collect()
    }

    /// Solve independent tasks in parallel, one worker per task.
    ///
    /// History appends are serialized by the mutex, but their interleaving
    /// follows task completion order; solving a single task with a fresh
    /// solver is what the determinism guarantee covers.
    pub fn solve_batch(&self, tasks: &[Task]) -> Vec<Vec<Solution>> {
        tasks.par_iter().map(|task| self.solve(task)).collect()
    }
}

fn fallback_solutions(
    test: &[TestCase],
    train: &[TrainingPair],
    diagnostics: &Diagnostics,
) -> Vec<Solution> {
    // The identity still gets an honest validation count.
    let matched = train.iter().filter(|pair| pair.input == pair.output).count();
    test.iter()
        .map(|case| Solution {
            solution: case.input.clone(),
            confidence: 0.0,
            method: FALLBACK_METHOD.to_string(),
            validation: ValidationSummary::new(matched, train.len()),
            diagnostics: diagnostics.clone(),
        })
        .collect()
}

/// Hypotheses for one pattern family, accumulated across training pairs.
#[derive(Debug)]
struct Aggregate {
    kind: PatternKind,
    /// Number of pairs proposing this family.
    frequency: usize,
    /// Sum of all evidence scores.
    cumulative: f32,
    /// Best evidence per proposing pair, in pair order.
    evidences: Vec<f32>,
    hypotheses: Vec<Hypothesis>,
}

impl Aggregate {
    fn base_score(&self) -> f32 {
        if self.evidences.is_empty() {
            0.0
        } else {
            self.evidences.iter().sum::<f32>() / self.evidences.len() as f32
        }
    }

    fn peak_evidence(&self) -> f32 {
        self.evidences.iter().copied().fold(0.0, f32::max)
    }
}

/// Group proposals by family; frequency counts pairs, not hypotheses.
fn aggregate(proposals: Vec<(usize, Hypothesis)>) -> BTreeMap<PatternKind, Aggregate> {
    let mut per_pair_best: BTreeMap<PatternKind, BTreeMap<usize, f32>> = BTreeMap::new();
    let mut aggregates: BTreeMap<PatternKind, Aggregate> = BTreeMap::new();

    for (pair_index, hypothesis) in proposals {
        let kind = hypothesis.rule.kind();
        let entry = aggregates.entry(kind).or_insert_with(|| Aggregate {
            kind,
            frequency: 0,
            cumulative: 0.0,
            evidences: Vec::new(),
            hypotheses: Vec::new(),
        });
        entry.cumulative += hypothesis.evidence;
        let best = per_pair_best
            .entry(kind)
            .or_default()
            .entry(pair_index)
            .or_insert(0.0);
        *best = best.max(hypothesis.evidence);
        entry.hypotheses.push(hypothesis);
    }

    for (kind, best_per_pair) in per_pair_best {
        if let Some(entry) = aggregates.get_mut(&kind) {
            entry.frequency = best_per_pair.len();
            entry.evidences = best_per_pair.into_values().collect();
        }
    }
    aggregates
}

/// Highest cumulative score wins; ties break by frequency, then by catalog
/// declaration order (the map iterates in that order).
fn select_winner(aggregates: &BTreeMap<PatternKind, Aggregate>) -> Option<&Aggregate> {
    let mut winner: Option<&Aggregate> = None;
    for candidate in aggregates.values() {
        let better = match winner {
            None => true,
            Some(current) => {
                candidate.cumulative > current.cumulative
                    || (candidate.cumulative == current.cumulative
                        && candidate.frequency > current.frequency)
            }
        };
        if better {
            winner = Some(candidate);
        }
    }
    winner
}

/// Merge an aggregate's hypotheses into one applicable rule.
///
/// Discrete parameters are chosen by evidence-weighted vote with the
/// smallest value winning ties; map-type parameters are unioned with
/// conflicting entries dropped, never overwritten.
fn merge_rule(aggregate: &Aggregate) -> Rule {
    match aggregate.kind {
        PatternKind::Symmetry => {
            let mut votes = BTreeMap::new();
            for h in &aggregate.hypotheses {
                if let Rule::Symmetry { axis } = h.rule {
                    *votes.entry(axis).or_insert(0.0f32) += h.evidence;
                }
            }
            let axis = vote_winner(&votes).expect("aggregate is never empty");
            Rule::Symmetry { axis }
        }
        PatternKind::Rotation => {
            let mut votes = BTreeMap::new();
            for h in &aggregate.hypotheses {
                if let Rule::Rotation { quarter_turns } = h.rule {
                    *votes.entry(quarter_turns).or_insert(0.0f32) += h.evidence;
                }
            }
            let quarter_turns = vote_winner(&votes).expect("aggregate is never empty");
            Rule::Rotation { quarter_turns }
        }
        PatternKind::Repetition => merge_repetition(aggregate),
        PatternKind::ZoneFill => merge_zone_fill(aggregate),
        PatternKind::ColorMap => merge_color_map(aggregate),
        PatternKind::Conditional => merge_conditional(aggregate),
    }
}

/// Key with the highest accumulated vote; ties go to the smallest key.
fn vote_winner<K: Copy + Ord>(votes: &BTreeMap<K, f32>) -> Option<K> {
    let mut winner: Option<(K, f32)> = None;
    for (&key, &weight) in votes {
        match winner {
            None => winner = Some((key, weight)),
            Some((_, best)) if weight > best => winner = Some((key, weight)),
            Some(_) => {}
        }
    }
    winner.map(|(key, _)| key)
}

fn merge_repetition(aggregate: &Aggregate) -> Rule {
    let mut factor_votes = BTreeMap::new();
    let mut best_motif: Option<(f32, &Motif)> = None;
    for h in &aggregate.hypotheses {
        if let Rule::Repetition {
            factor_rows,
            factor_cols,
            motif,
        } = &h.rule
        {
            *factor_votes
                .entry((*factor_rows, *factor_cols))
                .or_insert(0.0f32) += h.evidence;
            if let Some(motif) = motif
                && best_motif.is_none_or(|(best, _)| h.evidence > best)
            {
                best_motif = Some((h.evidence, motif));
            }
        }
    }
    let (factor_rows, factor_cols) =
        vote_winner(&factor_votes).expect("aggregate is never empty");
    Rule::Repetition {
        factor_rows,
        factor_cols,
        motif: best_motif.map(|(_, motif)| motif.clone()),
    }
}

fn merge_zone_fill(aggregate: &Aggregate) -> Rule {
    let mut boundary_votes = BTreeMap::new();
    for h in &aggregate.hypotheses {
        if let Rule::ZoneFill { boundary_color, .. } = &h.rule {
            *boundary_votes.entry(*boundary_color).or_insert(0.0f32) += h.evidence;
        }
    }
    let boundary_color = vote_winner(&boundary_votes).expect("aggregate is never empty");

    // Only maps learned against the winning boundary are comparable.
    let mut merged = ZoneMap::new();
    for h in &aggregate.hypotheses {
        if let Rule::ZoneFill {
            boundary_color: color,
            map,
        } = &h.rule
            && *color == boundary_color
        {
            merged.merge(map);
        }
    }
    Rule::ZoneFill {
        boundary_color,
        map: merged,
    }
}

fn merge_color_map(aggregate: &Aggregate) -> Rule {
    let mut mapping: BTreeMap<u8, u8> = BTreeMap::new();
    let mut dropped: std::collections::BTreeSet<u8> = std::collections::BTreeSet::new();
    let mut carried_conflicts = 0usize;
    for h in &aggregate.hypotheses {
        if let Rule::ColorMap {
            mapping: pair_mapping,
            conflicts,
        } = &h.rule
        {
            carried_conflicts += conflicts;
            for (&from, &to) in pair_mapping {
                if dropped.contains(&from) {
                    continue;
                }
                match mapping.get(&from) {
                    None => {
                        mapping.insert(from, to);
                    }
                    Some(&existing) if existing != to => {
                        mapping.remove(&from);
                        dropped.insert(from);
                    }
                    Some(_) => {}
                }
            }
        }
    }
    Rule::ColorMap {
        mapping,
        conflicts: carried_conflicts + dropped.len(),
    }
}

fn merge_conditional(aggregate: &Aggregate) -> Rule {
    // Padding and neighbor rules are separate sub-families; the one with
    // more accumulated evidence carries the merged rule.
    let mut padding_votes: BTreeMap<(usize, usize, usize, usize, u8), f32> = BTreeMap::new();
    let mut padding_total = 0.0f32;
    let mut neighbor_total = 0.0f32;
    let mut learned: BTreeMap<(u8, u8), u8> = BTreeMap::new();
    let mut dropped: std::collections::BTreeSet<(u8, u8)> = std::collections::BTreeSet::new();

    for h in &aggregate.hypotheses {
        let Rule::Conditional { rule } = &h.rule else {
            continue;
        };
        match rule {
            ConditionalRule::Padding {
                top,
                bottom,
                left,
                right,
                color,
            } => {
                padding_total += h.evidence;
                *padding_votes
                    .entry((*top, *bottom, *left, *right, *color))
                    .or_insert(0.0) += h.evidence;
            }
            ConditionalRule::NeighborUniform { rules } => {
                neighbor_total += h.evidence;
                for rule in rules {
                    let key = (rule.center, rule.neighbor);
                    if dropped.contains(&key) {
                        continue;
                    }
                    match learned.get(&key) {
                        None => {
                            learned.insert(key, rule.replacement);
                        }
                        Some(&existing) if existing != rule.replacement => {
                            learned.remove(&key);
                            dropped.insert(key);
                        }
                        Some(_) => {}
                    }
                }
            }
        }
    }

    if padding_total >= neighbor_total
        && let Some((top, bottom, left, right, color)) = vote_winner(&padding_votes)
    {
        return Rule::Conditional {
            rule: ConditionalRule::Padding {
                top,
                bottom,
                left,
                right,
                color,
            },
        };
    }
    Rule::Conditional {
        rule: ConditionalRule::NeighborUniform {
            rules: learned
                .into_iter()
                .map(
                    |((center, neighbor), replacement)| super::hypothesis::NeighborRule {
                        center,
                        neighbor,
                        replacement,
                    },
                )
                .collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Grid;

    fn grid(rows: &[&[u8]]) -> Grid {
        Grid::from_rows(rows.iter().map(|r| r.to_vec()).collect()).unwrap()
    }

    fn solver() -> Solver {
        Solver::new(EngineConfig::default()).unwrap()
    }

    fn task(id: &str, train: Vec<(Grid, Grid)>, test: Vec<Grid>) -> Task {
        Task {
            task_id: id.to_string(),
            train: train
                .into_iter()
                .map(|(input, output)| TrainingPair { input, output })
                .collect(),
            test: test
                .into_iter()
                .map(|input| TestCase {
                    input,
                    output: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_rotation_task_end_to_end() {
        let t = task(
            "rotation",
            vec![(grid(&[&[1, 2], &[3, 4]]), grid(&[&[3, 1], &[4, 2]]))],
            vec![grid(&[&[5, 6], &[7, 8]])],
        );
        let solutions = solver().solve(&t);
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].solution, grid(&[&[7, 5], &[8, 6]]));
        assert_eq!(solutions[0].method, "rotation");
        assert!(solutions[0].confidence > 0.0);
        assert_eq!(solutions[0].validation.matched, 1);
    }

    #[test]
    fn test_zone_fill_generalizes_to_unseen_loop() {
        let input = grid(&[
            &[3, 3, 3, 0, 0, 0],
            &[3, 0, 3, 0, 0, 0],
            &[3, 3, 3, 0, 0, 0],
            &[0, 0, 0, 3, 3, 3],
            &[0, 0, 0, 3, 0, 3],
            &[0, 0, 0, 3, 3, 3],
        ]);
        let output = grid(&[
            &[3, 3, 3, 0, 0, 0],
            &[3, 4, 3, 0, 0, 0],
            &[3, 3, 3, 0, 0, 0],
            &[0, 0, 0, 3, 3, 3],
            &[0, 0, 0, 3, 4, 3],
            &[0, 0, 0, 3, 3, 3],
        ]);
        // The test loop has a different size and position than any trained zone.
        let unseen = grid(&[
            &[0, 0, 0, 0, 0, 0],
            &[0, 3, 3, 3, 3, 0],
            &[0, 3, 0, 0, 3, 0],
            &[0, 3, 3, 3, 3, 0],
            &[0, 0, 0, 0, 0, 0],
            &[0, 0, 0, 0, 0, 0],
        ]);
        let t = task("zones", vec![(input, output)], vec![unseen]);
        let solutions = solver().solve(&t);
        assert_eq!(solutions[0].method, "zone_fill");
        assert_eq!(solutions[0].solution.get(2, 2), 4);
        assert_eq!(solutions[0].solution.get(2, 3), 4);
        assert_eq!(solutions[0].solution.get(1, 1), 3);
        assert!(solutions[0].confidence > 0.0);
    }

    #[test]
    fn test_repetition_task_reproduces_tiling() {
        let base = grid(&[&[7, 9], &[4, 3]]);
        let t = task(
            "tiling",
            vec![(base.clone(), base.tile(3, 3))],
            vec![grid(&[&[1, 2], &[3, 4]])],
        );
        let solutions = solver().solve(&t);
        assert_eq!(solutions[0].method, "repetition");
        assert_eq!(solutions[0].solution, grid(&[&[1, 2], &[3, 4]]).tile(3, 3));
        assert!(solutions[0].confidence > 0.0);
    }

    #[test]
    fn test_color_map_conflict_is_left_unmapped() {
        // Value 2 maps to 5 in one pair and 6 in the other; the merged
        // mapping must leave 2 alone instead of picking either target.
        let t = task(
            "conflict",
            vec![
                (grid(&[&[2, 1], &[1, 2]]), grid(&[&[5, 3], &[3, 5]])),
                (grid(&[&[2, 1], &[1, 2]]), grid(&[&[6, 3], &[3, 6]])),
            ],
            vec![grid(&[&[1, 2]])],
        );
        let solutions = solver().solve(&t);
        assert_eq!(solutions[0].method, "color_map");
        assert_eq!(solutions[0].solution, grid(&[&[3, 2]]));
    }

    #[test]
    fn test_no_pattern_falls_back_to_identity() {
        let t = task(
            "noise",
            vec![(
                grid(&[&[1, 0, 2], &[0, 3, 0], &[4, 0, 5]]),
                grid(&[&[0, 6], &[7, 0]]),
            )],
            vec![grid(&[&[9, 8], &[7, 6]])],
        );
        let solutions = solver().solve(&t);
        assert_eq!(solutions[0].method, FALLBACK_METHOD);
        assert_eq!(solutions[0].solution, grid(&[&[9, 8], &[7, 6]]));
        assert_eq!(solutions[0].confidence, 0.0);
    }

    #[test]
    fn test_empty_training_set_falls_back() {
        let t = task("empty", vec![], vec![grid(&[&[1, 2]])]);
        let solutions = solver().solve(&t);
        assert_eq!(solutions[0].method, FALLBACK_METHOD);
        assert_eq!(solutions[0].confidence, 0.0);
        assert_eq!(solutions[0].solution, grid(&[&[1, 2]]));
        assert_eq!(solutions[0].validation.total, 0);
    }

    #[test]
    fn test_solver_is_deterministic() {
        let make = || {
            task(
                "determinism",
                vec![(grid(&[&[1, 2], &[3, 4]]), grid(&[&[3, 1], &[4, 2]]))],
                vec![grid(&[&[5, 6], &[7, 8]])],
            )
        };
        let a = solver().solve(&make());
        let b = solver().solve(&make());
        assert_eq!(a, b);
    }

    #[test]
    fn test_confidence_always_in_bounds() {
        let tasks = vec![
            task(
                "flip",
                vec![(grid(&[&[1, 2], &[3, 4]]), grid(&[&[2, 1], &[4, 3]]))],
                vec![grid(&[&[5, 6], &[7, 8]])],
            ),
            task("empty", vec![], vec![grid(&[&[1]])]),
        ];
        for t in &tasks {
            for solution in solver().solve(t) {
                assert!(
                    (0.0..=1.0).contains(&solution.confidence),
                    "confidence {} out of bounds",
                    solution.confidence
                );
            }
        }
    }

    #[test]
    fn test_solve_batch_matches_task_count() {
        let tasks: Vec<Task> = (0..4)
            .map(|i| {
                task(
                    &format!("batch-{i}"),
                    vec![(grid(&[&[1, 2], &[3, 4]]), grid(&[&[3, 1], &[4, 2]]))],
                    vec![grid(&[&[5, 6], &[7, 8]]), grid(&[&[0, 1], &[2, 3]])],
                )
            })
            .collect();
        let results = solver().solve_batch(&tasks);
        assert_eq!(results.len(), 4);
        for solutions in &results {
            assert_eq!(solutions.len(), 2);
            for solution in solutions {
                assert_eq!(solution.method, "rotation");
            }
        }
    }

    #[test]
    fn test_multiple_pairs_strengthen_selection() {
        let t = task(
            "multi",
            vec![
                (grid(&[&[1, 2], &[3, 4]]), grid(&[&[3, 1], &[4, 2]])),
                (grid(&[&[5, 0], &[0, 5]]), grid(&[&[0, 5], &[5, 0]])),
                (grid(&[&[9, 8], &[7, 6]]), grid(&[&[7, 9], &[6, 8]])),
            ],
            vec![grid(&[&[1, 1], &[2, 3]])],
        );
        let solutions = solver().solve(&t);
        assert_eq!(solutions[0].method, "rotation");
        assert_eq!(solutions[0].solution, grid(&[&[2, 1], &[3, 1]]));
        assert_eq!(solutions[0].validation.matched, 3);
    }
}
