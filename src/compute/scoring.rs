//! Hypothesis scoring - calibrated metrics with an explicit overfitting
//! penalty.
//!
//! Raw detector evidence says how well a rule fits the training pairs it
//! was learned from; the scorer estimates how much of that fit is real.
//! All weights and thresholds come from the configuration and keep the
//! empirically chosen values as defaults.

use std::sync::{Arc, Mutex, PoisonError};

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use super::history::EvaluationHistory;
use super::hypothesis::{PatternKind, Rule};
use crate::schema::{EngineConfig, Grid, MAX_COLOR, TrainingPair};

/// Discrete overfitting-risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Calibrated metrics for one aggregated hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub generalization: f32,
    pub simplicity: f32,
    pub robustness: f32,
    /// Variance of the per-pair evidence scores.
    pub score_variance: f32,
    /// (base score + confidence) / 2.
    pub reliability: f32,
    /// Headroom left above this pattern's historical best.
    pub improvement_potential: f32,
    pub overfitting_risk: f32,
    pub risk_level: RiskLevel,
    pub final_score: f32,
}

/// Everything the scorer needs to know about one aggregated hypothesis.
#[derive(Debug)]
pub struct ScoringInput<'a> {
    pub kind: PatternKind,
    pub rule: &'a Rule,
    /// Mean raw evidence across proposing pairs.
    pub base_score: f32,
    /// Highest raw evidence any single pair produced.
    pub confidence: f32,
    /// Per-pair evidence scores.
    pub evidences: &'a [f32],
    pub train: &'a [TrainingPair],
    /// Held-out pairs from test cases that carried expected outputs.
    pub validation: &'a [TrainingPair],
}

/// Turns raw evidence into calibrated metrics and appends a summary to the
/// shared bounded history.
pub struct HypothesisEvaluator {
    config: EngineConfig,
    history: Arc<Mutex<EvaluationHistory>>,
}

impl HypothesisEvaluator {
    pub fn new(config: EngineConfig, history: Arc<Mutex<EvaluationHistory>>) -> Self {
        Self { config, history }
    }

    /// Score one aggregated hypothesis and record the result in history.
    pub fn evaluate(&self, input: &ScoringInput) -> ScoreReport {
        // Read the history statistics up front so the lock is held briefly
        // and exactly twice per evaluation (read, then append).
        let (history_mean, history_variance, history_best) = {
            let history = self
                .history
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            (
                history.mean_final_score(input.kind),
                history.final_score_variance(input.kind),
                history.best_final_score(input.kind),
            )
        };

        let generalization = self.generalization(input, history_mean);
        let simplicity = self.simplicity(input);
        let robustness = self.robustness(input, history_variance);
        let score_variance = variance(input.evidences);
        let reliability = (input.base_score + input.confidence) / 2.0;
        let improvement_potential =
            history_best.map_or(1.0, |best| (1.0 - best).clamp(0.0, 1.0));

        let overfitting_risk = self.overfitting_risk(
            input,
            generalization,
            simplicity,
            score_variance,
            improvement_potential,
        );
        let risk_level = self.risk_level(overfitting_risk);

        let [w_gen, w_simp, w_rob, w_risk, w_rel] = self.config.scoring.final_weights;
        let final_score = (w_gen * generalization + w_simp * simplicity + w_rob * robustness
            - w_risk * overfitting_risk
            + w_rel * reliability)
            .clamp(0.0, 1.0);

        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(input.kind, final_score, generalization, overfitting_risk);

        ScoreReport {
            generalization,
            simplicity,
            robustness,
            score_variance,
            reliability,
            improvement_potential,
            overfitting_risk,
            risk_level,
            final_score,
        }
    }

    /// Blend of held-out validation and simulated k-fold cross-validation,
    /// scaled down when the fit looks coincidentally narrow and nudged by
    /// agreement with the pattern's own history.
    fn generalization(&self, input: &ScoringInput, history_mean: Option<f32>) -> f32 {
        let scoring = &self.config.scoring;
        let cv = cross_validation_score(input.rule, input.train);
        let mut generalization = if input.validation.is_empty() {
            cv
        } else {
            let validation = mean_similarity(input.rule, input.validation);
            scoring.validation_weight * validation + scoring.cross_validation_weight * cv
        };

        if input.base_score > scoring.specificity_cutoff {
            generalization *= 1.0 - scoring.specificity_penalty;
        }
        if input.rule.parameter_count() > scoring.narrow_parameter_limit {
            generalization *= 1.0 - scoring.specificity_penalty;
        }
        if let Some(mean) = history_mean {
            let agreement = 1.0 - (generalization - mean).abs();
            generalization += scoring.history_agreement_bonus * agreement;
        }
        generalization.clamp(0.0, 1.0)
    }

    /// Parameter-count penalty, overfit-signature penalty, fundamental bonus.
    fn simplicity(&self, input: &ScoringInput) -> f32 {
        let scoring = &self.config.scoring;
        let mut simplicity =
            1.0 - scoring.parameter_penalty * input.rule.parameter_count() as f32;
        if input.confidence > 0.9 && input.base_score > 0.8 {
            simplicity -= scoring.overfit_signature_penalty;
        }
        if input.kind.is_fundamental() {
            simplicity += scoring.fundamental_bonus;
        }
        simplicity.clamp(0.0, 1.0)
    }

    /// Weighted blend of noise resistance, dimension resistance, internal
    /// consistency, and temporal stability.
    fn robustness(&self, input: &ScoringInput, history_variance: Option<f32>) -> f32 {
        let scoring = &self.config.scoring;
        let noise = self.noise_resistance(input.rule, input.train);
        let dimension = input.kind.dimension_resistance();
        let consistency = input.rule.internal_consistency();
        let stability = history_variance.map_or(scoring.neutral_stability, |v| {
            (1.0 - 4.0 * v).clamp(0.0, 1.0)
        });

        let [w_noise, w_dim, w_cons, w_stab] = scoring.robustness_weights;
        let total = w_noise + w_dim + w_cons + w_stab;
        if total <= 0.0 {
            return 0.0;
        }
        (w_noise * noise + w_dim * dimension + w_cons * consistency + w_stab * stability)
            / total
    }

    /// Re-apply the rule to noise-perturbed training inputs; the measured
    /// score at each level is discounted by the noise fraction, then the
    /// levels are averaged. Deterministic for a fixed seed.
    fn noise_resistance(&self, rule: &Rule, train: &[TrainingPair]) -> f32 {
        if train.is_empty() {
            return 0.0;
        }
        let mut rng = StdRng::seed_from_u64(self.config.random_seed);
        let levels = &self.config.scoring.noise_levels;
        if levels.is_empty() {
            return 0.0;
        }
        let mut sum = 0.0;
        for &level in levels {
            let mut level_sum = 0.0;
            for pair in train {
                let noisy = perturb(&pair.input, level, &mut rng);
                level_sum += rule.apply(&noisy).similarity(&pair.output);
            }
            sum += (level_sum / train.len() as f32) * (1.0 - level);
        }
        sum / levels.len() as f32
    }

    /// Accumulate the five independent risk factors, capped at 1.0.
    fn overfitting_risk(
        &self,
        input: &ScoringInput,
        generalization: f32,
        simplicity: f32,
        score_variance: f32,
        improvement_potential: f32,
    ) -> f32 {
        let risk_config = &self.config.risk;
        let mut risk = 0.0;
        if input.base_score - generalization > risk_config.gap_threshold {
            risk += risk_config.generalization_gap;
        }
        if simplicity < risk_config.simplicity_floor {
            risk += risk_config.low_simplicity;
        }
        if input.train.len() < risk_config.min_examples {
            risk += risk_config.few_examples;
        }
        if score_variance > risk_config.variance_threshold {
            risk += risk_config.score_variance;
        }
        if improvement_potential < risk_config.improvement_floor {
            risk += risk_config.no_improvement;
        }
        risk.min(1.0)
    }

    fn risk_level(&self, risk: f32) -> RiskLevel {
        let [low, medium, high] = self.config.risk.level_boundaries;
        if risk < low {
            RiskLevel::Low
        } else if risk < medium {
            RiskLevel::Medium
        } else if risk < high {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

/// Simulated k-fold cross-validation over the training pairs, k = min(3, n).
///
/// Folds are assigned round-robin; each fold is scored by applying the rule
/// to its inputs, and the fold scores are averaged.
fn cross_validation_score(rule: &Rule, train: &[TrainingPair]) -> f32 {
    if train.is_empty() {
        return 0.0;
    }
    let k = train.len().min(3);
    let mut fold_scores = Vec::with_capacity(k);
    for fold in 0..k {
        let members: Vec<&TrainingPair> = train
            .iter()
            .enumerate()
            .filter(|(i, _)| i % k == fold)
            .map(|(_, pair)| pair)
            .collect();
        let score = members
            .iter()
            .map(|pair| rule.apply(&pair.input).similarity(&pair.output))
            .sum::<f32>()
            / members.len() as f32;
        fold_scores.push(score);
    }
    fold_scores.iter().sum::<f32>() / k as f32
}

fn mean_similarity(rule: &Rule, pairs: &[TrainingPair]) -> f32 {
    if pairs.is_empty() {
        return 0.0;
    }
    pairs
        .iter()
        .map(|pair| rule.apply(&pair.input).similarity(&pair.output))
        .sum::<f32>()
        / pairs.len() as f32
}

fn variance(values: &[f32]) -> f32 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32
}

/// Reassign a fraction of cells to random colors.
fn perturb(grid: &Grid, fraction: f32, rng: &mut StdRng) -> Grid {
    let mut cells = grid.cells().to_vec();
    let flips = ((cells.len() as f32 * fraction).ceil() as usize).min(cells.len());
    for _ in 0..flips {
        let index = rng.gen_range(0..cells.len());
        cells[index] = rng.gen_range(0..=MAX_COLOR);
    }
    Grid::from_flat(cells, grid.height(), grid.width())
}
