//! Pattern detectors - stateless strategies proposing typed hypotheses.
//!
//! Each detector inspects one (input, output) training pair and returns the
//! hypotheses whose evidence clears its configured threshold. An empty
//! vector means "this pattern does not apply here"; an error is a caught
//! failure the orchestrator records as a diagnostic, never a panic.

use std::collections::{BTreeMap, BTreeSet};

use super::hypothesis::{
    ConditionalRule, Hypothesis, Motif, NeighborRule, PatternKind, Rule, uniform_neighbor,
};
use super::zones::{ZoneMap, find_enclosed_zones};
use crate::schema::{Axis, BACKGROUND, DetectorConfig, Grid};

/// Caught detector failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DetectorError {
    #[error("motif search budget of {budget} steps exhausted")]
    BudgetExhausted { budget: usize },
}

/// Run the detector for one catalog family on one training pair.
pub fn run(
    kind: PatternKind,
    input: &Grid,
    output: &Grid,
    config: &DetectorConfig,
) -> Result<Vec<Hypothesis>, DetectorError> {
    match kind {
        PatternKind::Symmetry => Ok(symmetry(input, output, config)),
        PatternKind::Rotation => Ok(rotation(input, output, config)),
        PatternKind::Repetition => repetition(input, output, config),
        PatternKind::ZoneFill => Ok(zone_fill(input, output, config)),
        PatternKind::ColorMap => Ok(color_map(input, output, config)),
        PatternKind::Conditional => Ok(conditional(input, output, config)),
    }
}

/// Compare the output against each flip of the input.
pub fn symmetry(input: &Grid, output: &Grid, config: &DetectorConfig) -> Vec<Hypothesis> {
    if !input.same_dimensions(output) {
        return Vec::new();
    }
    let mut hypotheses = Vec::new();
    for axis in [Axis::Horizontal, Axis::Vertical, Axis::Both] {
        let evidence = input.flip(axis).similarity(output);
        if evidence >= config.symmetry_threshold {
            hypotheses.push(Hypothesis::new(Rule::Symmetry { axis }, evidence));
        }
    }
    hypotheses
}

/// Compare the output against each quarter-turn rotation of the input.
pub fn rotation(input: &Grid, output: &Grid, config: &DetectorConfig) -> Vec<Hypothesis> {
    let mut hypotheses = Vec::new();
    for quarter_turns in 1..=3 {
        let rotated = input.rotate(quarter_turns);
        if !rotated.same_dimensions(output) {
            continue;
        }
        let evidence = rotated.similarity(output);
        if evidence >= config.rotation_threshold {
            hypotheses.push(Hypothesis::new(Rule::Rotation { quarter_turns }, evidence));
        }
    }
    hypotheses
}

/// Detect integer tilings of the input and repeating motifs in the output.
pub fn repetition(
    input: &Grid,
    output: &Grid,
    config: &DetectorConfig,
) -> Result<Vec<Hypothesis>, DetectorError> {
    let mut hypotheses = Vec::new();

    // (a) Output dimensions are an integer multiple of the input's.
    if output.height() % input.height() == 0 && output.width() % input.width() == 0 {
        let factor_rows = output.height() / input.height();
        let factor_cols = output.width() / input.width();
        if factor_rows * factor_cols > 1 {
            let evidence = input.tile(factor_rows, factor_cols).similarity(output);
            if evidence >= config.repetition_threshold {
                hypotheses.push(Hypothesis::new(
                    Rule::Repetition {
                        factor_rows,
                        factor_cols,
                        motif: None,
                    },
                    evidence,
                ));
            }
        }
    }

    // (b) Smallest repeating motif inside the output, budget-bounded.
    if let Some(hypothesis) = find_motif(output, config)? {
        hypotheses.push(hypothesis);
    }

    Ok(hypotheses)
}

/// Scan for the smallest motif (sizes 2..=max per side, smallest area
/// first) anchored at the origin and occurring at least twice.
fn find_motif(
    output: &Grid,
    config: &DetectorConfig,
) -> Result<Option<Hypothesis>, DetectorError> {
    let mut budget = config.motif_budget;
    let mut sizes: Vec<(usize, usize)> = (2..=config.motif_max_side)
        .flat_map(|h| (2..=config.motif_max_side).map(move |w| (h, w)))
        .collect();
    sizes.sort_unstable_by_key(|&(h, w)| (h * w, h));

    for (mh, mw) in sizes {
        let Some(motif) = output.subgrid(0, 0, mh, mw) else {
            continue;
        };
        let mut occurrences = 0usize;
        for r in 0..=(output.height() - mh) {
            for c in 0..=(output.width() - mw) {
                let cost = mh * mw;
                if budget < cost {
                    return Err(DetectorError::BudgetExhausted {
                        budget: config.motif_budget,
                    });
                }
                budget -= cost;
                if output.subgrid(r, c, mh, mw).as_ref() == Some(&motif) {
                    occurrences += 1;
                }
            }
        }
        if occurrences >= 2 {
            let factor_rows = if output.height() % mh == 0 {
                output.height() / mh
            } else {
                1
            };
            let factor_cols = if output.width() % mw == 0 {
                output.width() / mw
            } else {
                1
            };
            let coverage =
                (occurrences * mh * mw) as f32 / output.len() as f32;
            let evidence = coverage.min(1.0);
            if evidence >= config.repetition_threshold {
                return Ok(Some(Hypothesis::new(
                    Rule::Repetition {
                        factor_rows,
                        factor_cols,
                        motif: Some(Motif {
                            grid: motif,
                            occurrences,
                        }),
                    },
                    evidence,
                )));
            }
        }
    }
    Ok(None)
}

/// Learn a per-value color substitution over the overlapping region.
///
/// A source value that ever maps to two different targets is dropped from
/// the mapping and counted as a conflict; the consistent sub-mapping is
/// still reported.
pub fn color_map(input: &Grid, output: &Grid, config: &DetectorConfig) -> Vec<Hypothesis> {
    let height = input.height().min(output.height());
    let width = input.width().min(output.width());
    let mut mapping: BTreeMap<u8, u8> = BTreeMap::new();
    let mut conflicted: BTreeSet<u8> = BTreeSet::new();

    for r in 0..height {
        for c in 0..width {
            let from = input.get(r, c);
            let to = output.get(r, c);
            if conflicted.contains(&from) {
                continue;
            }
            match mapping.get(&from) {
                None => {
                    mapping.insert(from, to);
                }
                Some(&existing) if existing != to => {
                    mapping.remove(&from);
                    conflicted.insert(from);
                }
                Some(_) => {}
            }
        }
    }

    // A mapping where nothing changes is the identity, not a color map.
    if !mapping.iter().any(|(from, to)| from != to) {
        return Vec::new();
    }

    let mut explained = 0usize;
    for r in 0..height {
        for c in 0..width {
            if mapping.get(&input.get(r, c)) == Some(&output.get(r, c)) {
                explained += 1;
            }
        }
    }
    let evidence = explained as f32 / (height * width) as f32;
    if evidence < config.color_map_threshold {
        return Vec::new();
    }
    vec![Hypothesis::new(
        Rule::ColorMap {
            mapping,
            conflicts: conflicted.len(),
        },
        evidence,
    )]
}

/// Learn fill colors for enclosed zones of the input.
pub fn zone_fill(input: &Grid, output: &Grid, config: &DetectorConfig) -> Vec<Hypothesis> {
    if !input.same_dimensions(output) {
        return Vec::new();
    }
    let Some(boundary_color) = input.most_frequent_non_background() else {
        return Vec::new();
    };
    let zones = find_enclosed_zones(input, boundary_color);
    if zones.is_empty() {
        return Vec::new();
    }

    let mut map = ZoneMap::new();
    let mut filled = 0usize;
    let mut fill_colors: BTreeSet<u8> = BTreeSet::new();
    for zone in &zones {
        let mut colors = zone.cells.iter().map(|&(r, c)| output.get(r, c));
        let first = colors.next().expect("zones are never empty");
        if first != BACKGROUND && colors.all(|v| v == first) {
            map.insert(zone.key, first);
            fill_colors.insert(first);
            filled += 1;
        }
    }
    if filled == 0 {
        return Vec::new();
    }
    // All zones agreeing on one color: keep a degenerate fallback so the
    // rule survives zones of unseen shapes and sizes.
    if fill_colors.len() == 1 {
        map.set_fallback(*fill_colors.iter().next().expect("non-empty"));
    }

    let evidence = filled as f32 / zones.len() as f32;
    if evidence < config.zone_fill_threshold {
        return Vec::new();
    }
    vec![Hypothesis::new(
        Rule::ZoneFill {
            boundary_color,
            map,
        },
        evidence,
    )]
}

/// Positional and neighbor-based conditionals.
pub fn conditional(input: &Grid, output: &Grid, config: &DetectorConfig) -> Vec<Hypothesis> {
    let mut hypotheses = Vec::new();
    if let Some(h) = padding(input, output, config) {
        hypotheses.push(h);
    }
    if let Some(h) = neighbor_uniform(input, output, config) {
        hypotheses.push(h);
    }
    hypotheses
}

/// Output strictly larger with the input embedded intact: a border was added.
fn padding(input: &Grid, output: &Grid, config: &DetectorConfig) -> Option<Hypothesis> {
    if output.height() <= input.height() || output.width() <= input.width() {
        return None;
    }
    let max_top = output.height() - input.height();
    let max_left = output.width() - input.width();
    let (top, left) = (0..=max_top)
        .flat_map(|t| (0..=max_left).map(move |l| (t, l)))
        .find(|&(t, l)| {
            output.subgrid(t, l, input.height(), input.width()).as_ref() == Some(input)
        })?;
    let bottom = max_top - top;
    let right = max_left - left;

    // Border cells are everything outside the embedded input.
    let mut border_hist = [0usize; 10];
    let mut border_total = 0usize;
    for r in 0..output.height() {
        for c in 0..output.width() {
            let inside = r >= top
                && r < top + input.height()
                && c >= left
                && c < left + input.width();
            if !inside {
                border_hist[output.get(r, c) as usize] += 1;
                border_total += 1;
            }
        }
    }
    let (color, count) = border_hist
        .iter()
        .enumerate()
        .max_by(|(ca, a), (cb, b)| a.cmp(b).then(cb.cmp(ca)))
        .map(|(color, &count)| (color as u8, count))?;

    let evidence = count as f32 / border_total as f32;
    if evidence < config.conditional_threshold {
        return None;
    }
    Some(Hypothesis::new(
        Rule::Conditional {
            rule: ConditionalRule::Padding {
                top,
                bottom,
                left,
                right,
                color,
            },
        },
        evidence,
    ))
}

/// Cells with a uniform 8-neighborhood that changed value: learn the
/// (center, neighbor) -> replacement rules, dropping conflicting pairs.
///
/// Distinct from a plain color map because the replacement depends on the
/// surrounding context, not the cell value alone.
fn neighbor_uniform(
    input: &Grid,
    output: &Grid,
    config: &DetectorConfig,
) -> Option<Hypothesis> {
    if !input.same_dimensions(output) {
        return None;
    }
    let mut learned: BTreeMap<(u8, u8), u8> = BTreeMap::new();
    let mut conflicted: BTreeSet<(u8, u8)> = BTreeSet::new();
    for r in 0..input.height() {
        for c in 0..input.width() {
            let from = input.get(r, c);
            let to = output.get(r, c);
            if from == to {
                continue;
            }
            let Some(neighbor) = uniform_neighbor(input, r, c) else {
                continue;
            };
            let key = (from, neighbor);
            if conflicted.contains(&key) {
                continue;
            }
            match learned.get(&key) {
                None => {
                    learned.insert(key, to);
                }
                Some(&existing) if existing != to => {
                    learned.remove(&key);
                    conflicted.insert(key);
                }
                Some(_) => {}
            }
        }
    }
    if learned.is_empty() {
        return None;
    }
    let rules: Vec<NeighborRule> = learned
        .into_iter()
        .map(|((center, neighbor), replacement)| NeighborRule {
            center,
            neighbor,
            replacement,
        })
        .collect();

    let rule = Rule::Conditional {
        rule: ConditionalRule::NeighborUniform { rules },
    };
    let evidence = rule.apply(input).similarity(output);
    if evidence < config.conditional_threshold {
        return None;
    }
    Some(Hypothesis {
        rule,
        evidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[u8]]) -> Grid {
        Grid::from_rows(rows.iter().map(|r| r.to_vec()).collect()).unwrap()
    }

    fn config() -> DetectorConfig {
        DetectorConfig::default()
    }

    #[test]
    fn test_symmetry_detects_horizontal_flip() {
        let input = grid(&[&[1, 2], &[3, 4]]);
        let output = grid(&[&[2, 1], &[4, 3]]);
        let hypotheses = symmetry(&input, &output, &config());
        assert!(hypotheses.iter().any(|h| matches!(
            h.rule,
            Rule::Symmetry {
                axis: Axis::Horizontal
            }
        ) && h.evidence == 1.0));
    }

    #[test]
    fn test_rotation_detects_quarter_turn() {
        let input = grid(&[&[1, 2], &[3, 4]]);
        let output = grid(&[&[3, 1], &[4, 2]]);
        let hypotheses = rotation(&input, &output, &config());
        assert_eq!(hypotheses.len(), 1);
        assert!(matches!(
            hypotheses[0].rule,
            Rule::Rotation { quarter_turns: 1 }
        ));
        assert_eq!(hypotheses[0].evidence, 1.0);
    }

    #[test]
    fn test_rotation_skips_mismatched_dimensions() {
        let input = grid(&[&[1, 2, 3], &[4, 5, 6]]);
        let output = grid(&[&[1, 2], &[3, 4]]);
        assert!(rotation(&input, &output, &config()).is_empty());
    }

    #[test]
    fn test_repetition_reports_tiling_factor() {
        let input = grid(&[&[7, 9], &[4, 3]]);
        let output = input.tile(3, 3);
        let hypotheses = repetition(&input, &output, &config()).unwrap();
        let factor = hypotheses
            .iter()
            .find(|h| matches!(
                h.rule,
                Rule::Repetition {
                    factor_rows: 3,
                    factor_cols: 3,
                    ..
                }
            ))
            .expect("factor hypothesis");
        assert_eq!(factor.evidence, 1.0);
    }

    #[test]
    fn test_repetition_finds_motif() {
        let motif = grid(&[&[1, 2], &[3, 4]]);
        let output = motif.tile(2, 2);
        let input = grid(&[&[5]]);
        let hypotheses = repetition(&input, &output, &config()).unwrap();
        let found = hypotheses
            .iter()
            .find_map(|h| match &h.rule {
                Rule::Repetition {
                    motif: Some(m), ..
                } => Some(m),
                _ => None,
            })
            .expect("motif hypothesis");
        assert_eq!(found.grid, motif);
        assert_eq!(found.occurrences, 4);
    }

    #[test]
    fn test_motif_budget_exhaustion_is_reported() {
        let output = grid(&[&[1, 2], &[3, 4]]).tile(4, 4);
        let input = grid(&[&[5]]);
        let tight = DetectorConfig {
            motif_budget: 3,
            ..DetectorConfig::default()
        };
        assert_eq!(
            repetition(&input, &output, &tight),
            Err(DetectorError::BudgetExhausted { budget: 3 })
        );
    }

    #[test]
    fn test_color_map_drops_conflicting_entry() {
        // Value 2 maps to 5 at one position and 6 at another.
        let input = grid(&[&[2, 2, 1], &[1, 1, 1]]);
        let output = grid(&[&[5, 6, 3], &[3, 3, 3]]);
        let hypotheses = color_map(&input, &output, &config());
        assert_eq!(hypotheses.len(), 1);
        let Rule::ColorMap { mapping, conflicts } = &hypotheses[0].rule else {
            panic!("expected color map rule");
        };
        assert_eq!(conflicts, &1);
        assert!(!mapping.contains_key(&2));
        assert_eq!(mapping.get(&1), Some(&3));
    }

    #[test]
    fn test_color_map_ignores_identity() {
        let input = grid(&[&[1, 2], &[3, 4]]);
        assert!(color_map(&input, &input, &config()).is_empty());
    }

    #[test]
    fn test_zone_fill_learns_fill_color() {
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
        let hypotheses = zone_fill(&input, &output, &config());
        assert_eq!(hypotheses.len(), 1);
        let Rule::ZoneFill {
            boundary_color,
            map,
        } = &hypotheses[0].rule
        else {
            panic!("expected zone fill rule");
        };
        assert_eq!(*boundary_color, 3);
        assert_eq!(map.fallback(), Some(4));
        assert_eq!(hypotheses[0].evidence, 1.0);
    }

    #[test]
    fn test_zone_fill_without_zones() {
        let input = grid(&[&[0, 1], &[1, 0]]);
        let output = grid(&[&[0, 1], &[1, 0]]);
        assert!(zone_fill(&input, &output, &config()).is_empty());
    }

    #[test]
    fn test_conditional_detects_padding() {
        let input = grid(&[&[1, 2], &[3, 4]]);
        let output = grid(&[
            &[8, 8, 8, 8],
            &[8, 1, 2, 8],
            &[8, 3, 4, 8],
            &[8, 8, 8, 8],
        ]);
        let hypotheses = conditional(&input, &output, &config());
        let padding = hypotheses
            .iter()
            .find_map(|h| match &h.rule {
                Rule::Conditional {
                    rule: ConditionalRule::Padding {
                        top,
                        bottom,
                        left,
                        right,
                        color,
                    },
                } => Some((*top, *bottom, *left, *right, *color)),
                _ => None,
            })
            .expect("padding hypothesis");
        assert_eq!(padding, (1, 1, 1, 1, 8));
    }

    #[test]
    fn test_conditional_learns_neighbor_rule() {
        let input = grid(&[&[1, 1, 1], &[1, 0, 1], &[1, 1, 1]]);
        let output = grid(&[&[1, 1, 1], &[1, 2, 1], &[1, 1, 1]]);
        let hypotheses = conditional(&input, &output, &config());
        let rules = hypotheses
            .iter()
            .find_map(|h| match &h.rule {
                Rule::Conditional {
                    rule: ConditionalRule::NeighborUniform { rules },
                } => Some(rules.clone()),
                _ => None,
            })
            .expect("neighbor hypothesis");
        assert_eq!(
            rules,
            vec![NeighborRule {
                center: 0,
                neighbor: 1,
                replacement: 2
            }]
        );
    }

    #[test]
    fn test_detectors_return_nothing_on_unrelated_grids() {
        let input = grid(&[&[1, 0, 2], &[0, 3, 0], &[4, 0, 5]]);
        let output = grid(&[&[0, 6], &[7, 0]]);
        for kind in PatternKind::ALL {
            let hypotheses = run(kind, &input, &output, &config()).unwrap();
            assert!(
                hypotheses.is_empty(),
                "{} fired unexpectedly",
                kind.name()
            );
        }
    }
}
