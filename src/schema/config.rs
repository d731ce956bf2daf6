//! Engine configuration: detector thresholds and scoring weights.
//!
//! Every empirically chosen constant from the scoring model lives here as a
//! configurable field with its original value as the serde default, rather
//! than being baked into the code.

use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-detector acceptance thresholds and search budgets.
    #[serde(default)]
    pub detectors: DetectorConfig,
    /// Scoring model weights.
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Overfitting-risk factor weights and thresholds.
    #[serde(default)]
    pub risk: RiskConfig,
    /// Bounded per-pattern history length.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Seed for the noise simulation; the engine is a pure function of it.
    #[serde(default)]
    pub random_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            detectors: DetectorConfig::default(),
            scoring: ScoringConfig::default(),
            risk: RiskConfig::default(),
            history_capacity: default_history_capacity(),
            random_seed: 0,
        }
    }
}

fn default_history_capacity() -> usize {
    10
}

/// Acceptance thresholds per detector family.
///
/// Stricter thresholds reduce false positives at the cost of recall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_symmetry_threshold")]
    pub symmetry_threshold: f32,
    #[serde(default = "default_rotation_threshold")]
    pub rotation_threshold: f32,
    #[serde(default = "default_repetition_threshold")]
    pub repetition_threshold: f32,
    #[serde(default = "default_color_map_threshold")]
    pub color_map_threshold: f32,
    #[serde(default = "default_zone_fill_threshold")]
    pub zone_fill_threshold: f32,
    #[serde(default = "default_conditional_threshold")]
    pub conditional_threshold: f32,
    /// Step budget for the combinatorial motif search.
    #[serde(default = "default_motif_budget")]
    pub motif_budget: usize,
    /// Largest motif side length to scan for.
    #[serde(default = "default_motif_max_side")]
    pub motif_max_side: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            symmetry_threshold: default_symmetry_threshold(),
            rotation_threshold: default_rotation_threshold(),
            repetition_threshold: default_repetition_threshold(),
            color_map_threshold: default_color_map_threshold(),
            zone_fill_threshold: default_zone_fill_threshold(),
            conditional_threshold: default_conditional_threshold(),
            motif_budget: default_motif_budget(),
            motif_max_side: default_motif_max_side(),
        }
    }
}

fn default_symmetry_threshold() -> f32 {
    0.7
}
fn default_rotation_threshold() -> f32 {
    0.7
}
fn default_repetition_threshold() -> f32 {
    0.6
}
fn default_color_map_threshold() -> f32 {
    0.6
}
fn default_zone_fill_threshold() -> f32 {
    0.5
}
fn default_conditional_threshold() -> f32 {
    0.5
}
fn default_motif_budget() -> usize {
    200_000
}
fn default_motif_max_side() -> usize {
    4
}

/// Weights for the calibrated metrics and the final blend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Weight of the held-out validation split in generalization.
    #[serde(default = "default_validation_weight")]
    pub validation_weight: f32,
    /// Weight of the simulated k-fold score in generalization.
    #[serde(default = "default_cross_validation_weight")]
    pub cross_validation_weight: f32,
    /// Raw similarity above this looks coincidental and is penalized.
    #[serde(default = "default_specificity_cutoff")]
    pub specificity_cutoff: f32,
    /// Multiplicative penalty applied on the specificity signature.
    #[serde(default = "default_specificity_penalty")]
    pub specificity_penalty: f32,
    /// Parameter count above which a rule counts as overly narrow.
    #[serde(default = "default_narrow_parameter_limit")]
    pub narrow_parameter_limit: usize,
    /// Bonus scale for agreement with the pattern's own history.
    #[serde(default = "default_history_agreement_bonus")]
    pub history_agreement_bonus: f32,
    /// Simplicity penalty per recorded parameter.
    #[serde(default = "default_parameter_penalty")]
    pub parameter_penalty: f32,
    /// Penalty for the classic overfit signature (confidence > 0.9 with
    /// base score > 0.8).
    #[serde(default = "default_overfit_signature_penalty")]
    pub overfit_signature_penalty: f32,
    /// Bonus for the fundamental canonical families.
    #[serde(default = "default_fundamental_bonus")]
    pub fundamental_bonus: f32,
    /// Robustness blend: noise, dimension, consistency, stability.
    #[serde(default = "default_robustness_weights")]
    pub robustness_weights: [f32; 4],
    /// Synthetic noise fractions applied during robustness simulation.
    #[serde(default = "default_noise_levels")]
    pub noise_levels: Vec<f32>,
    /// Temporal stability assigned to patterns with no history yet.
    #[serde(default = "default_neutral_stability")]
    pub neutral_stability: f32,
    /// Final blend: generalization, simplicity, robustness, risk, reliability.
    #[serde(default = "default_final_weights")]
    pub final_weights: [f32; 5],
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            validation_weight: default_validation_weight(),
            cross_validation_weight: default_cross_validation_weight(),
            specificity_cutoff: default_specificity_cutoff(),
            specificity_penalty: default_specificity_penalty(),
            narrow_parameter_limit: default_narrow_parameter_limit(),
            history_agreement_bonus: default_history_agreement_bonus(),
            parameter_penalty: default_parameter_penalty(),
            overfit_signature_penalty: default_overfit_signature_penalty(),
            fundamental_bonus: default_fundamental_bonus(),
            robustness_weights: default_robustness_weights(),
            noise_levels: default_noise_levels(),
            neutral_stability: default_neutral_stability(),
            final_weights: default_final_weights(),
        }
    }
}

fn default_validation_weight() -> f32 {
    0.6
}
fn default_cross_validation_weight() -> f32 {
    0.4
}
fn default_specificity_cutoff() -> f32 {
    0.95
}
fn default_specificity_penalty() -> f32 {
    0.1
}
fn default_narrow_parameter_limit() -> usize {
    12
}
fn default_history_agreement_bonus() -> f32 {
    0.05
}
fn default_parameter_penalty() -> f32 {
    0.02
}
fn default_overfit_signature_penalty() -> f32 {
    0.15
}
fn default_fundamental_bonus() -> f32 {
    0.1
}
fn default_robustness_weights() -> [f32; 4] {
    [0.3, 0.25, 0.25, 0.2]
}
fn default_noise_levels() -> Vec<f32> {
    vec![0.1, 0.2, 0.3]
}
fn default_neutral_stability() -> f32 {
    0.8
}
fn default_final_weights() -> [f32; 5] {
    [0.4, 0.3, 0.3, 0.4, 0.1]
}

/// Overfitting-risk accumulation weights and the discrete level boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Added when raw score exceeds generalization by more than `gap_threshold`.
    #[serde(default = "default_risk_gap")]
    pub generalization_gap: f32,
    #[serde(default = "default_gap_threshold")]
    pub gap_threshold: f32,
    /// Added when simplicity falls below `simplicity_floor`.
    #[serde(default = "default_risk_simplicity")]
    pub low_simplicity: f32,
    #[serde(default = "default_simplicity_floor")]
    pub simplicity_floor: f32,
    /// Added when fewer than `min_examples` training pairs exist.
    #[serde(default = "default_risk_few_examples")]
    pub few_examples: f32,
    #[serde(default = "default_min_examples")]
    pub min_examples: usize,
    /// Added when per-pair evidence variance exceeds `variance_threshold`.
    #[serde(default = "default_risk_variance")]
    pub score_variance: f32,
    #[serde(default = "default_variance_threshold")]
    pub variance_threshold: f32,
    /// Added when improvement potential versus the historical best is
    /// below `improvement_floor`.
    #[serde(default = "default_risk_improvement")]
    pub no_improvement: f32,
    #[serde(default = "default_improvement_floor")]
    pub improvement_floor: f32,
    /// Boundaries for low/medium/high/critical levels.
    #[serde(default = "default_level_boundaries")]
    pub level_boundaries: [f32; 3],
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            generalization_gap: default_risk_gap(),
            gap_threshold: default_gap_threshold(),
            low_simplicity: default_risk_simplicity(),
            simplicity_floor: default_simplicity_floor(),
            few_examples: default_risk_few_examples(),
            min_examples: default_min_examples(),
            score_variance: default_risk_variance(),
            variance_threshold: default_variance_threshold(),
            no_improvement: default_risk_improvement(),
            improvement_floor: default_improvement_floor(),
            level_boundaries: default_level_boundaries(),
        }
    }
}

fn default_risk_gap() -> f32 {
    0.4
}
fn default_gap_threshold() -> f32 {
    0.3
}
fn default_risk_simplicity() -> f32 {
    0.3
}
fn default_simplicity_floor() -> f32 {
    0.5
}
fn default_risk_few_examples() -> f32 {
    0.2
}
fn default_min_examples() -> usize {
    3
}
fn default_risk_variance() -> f32 {
    0.2
}
fn default_variance_threshold() -> f32 {
    0.05
}
fn default_risk_improvement() -> f32 {
    0.1
}
fn default_improvement_floor() -> f32 {
    0.1
}
fn default_level_boundaries() -> [f32; 3] {
    [0.3, 0.5, 0.7]
}

impl EngineConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = [
            ("symmetry", self.detectors.symmetry_threshold),
            ("rotation", self.detectors.rotation_threshold),
            ("repetition", self.detectors.repetition_threshold),
            ("color_map", self.detectors.color_map_threshold),
            ("zone_fill", self.detectors.zone_fill_threshold),
            ("conditional", self.detectors.conditional_threshold),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange {
                    detector: name,
                    value,
                });
            }
        }
        if self.detectors.motif_budget == 0 {
            return Err(ConfigError::ZeroMotifBudget);
        }
        if self.detectors.motif_max_side < 2 {
            return Err(ConfigError::MotifSideTooSmall(self.detectors.motif_max_side));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroHistoryCapacity);
        }
        for &level in &self.scoring.noise_levels {
            if !(0.0..1.0).contains(&level) {
                return Err(ConfigError::InvalidNoiseLevel(level));
            }
        }
        let weights = self
            .scoring
            .robustness_weights
            .iter()
            .chain(self.scoring.final_weights.iter());
        for &w in weights {
            if w < 0.0 {
                return Err(ConfigError::NegativeWeight(w));
            }
        }
        if self.risk.min_examples == 0 {
            return Err(ConfigError::ZeroMinExamples);
        }
        let [low, medium, high] = self.risk.level_boundaries;
        if !(low < medium && medium < high) {
            return Err(ConfigError::UnorderedLevelBoundaries);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{detector} threshold {value} outside [0, 1]")]
    ThresholdOutOfRange { detector: &'static str, value: f32 },
    #[error("motif search budget must be non-zero")]
    ZeroMotifBudget,
    #[error("motif max side {0} must be at least 2")]
    MotifSideTooSmall(usize),
    #[error("history capacity must be non-zero")]
    ZeroHistoryCapacity,
    #[error("noise level {0} outside [0, 1)")]
    InvalidNoiseLevel(f32),
    #[error("scoring weight {0} must be non-negative")]
    NegativeWeight(f32),
    #[error("minimum example count must be non-zero")]
    ZeroMinExamples,
    #[error("risk level boundaries must be strictly increasing")]
    UnorderedLevelBoundaries,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let mut config = EngineConfig::default();
        config.detectors.symmetry_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ThresholdOutOfRange { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_history() {
        let config = EngineConfig {
            history_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroHistoryCapacity)
        ));
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.history_capacity, 10);
        assert!((config.detectors.symmetry_threshold - 0.7).abs() < 1e-6);
        assert_eq!(config.scoring.noise_levels, vec![0.1, 0.2, 0.3]);
        assert_eq!(config.risk.min_examples, 3);
    }
}
