//! Hypothesis catalog - typed transformation rules with raw evidence.
//!
//! Each detector family has one parameter record, carried as a variant of
//! the [`Rule`] tagged union. Application is an exhaustive match, so an
//! unknown variant is a compile error rather than a runtime surprise.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::zones::{ZoneMap, find_enclosed_zones};
use crate::schema::{Axis, Grid, MAX_COLOR};

/// The detector catalog, in declaration order.
///
/// Declaration order doubles as the deterministic tie-break order during
/// winner selection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum PatternKind {
    Symmetry,
    Rotation,
    Repetition,
    ZoneFill,
    ColorMap,
    Conditional,
}

impl PatternKind {
    /// Every catalog family, in declaration order.
    pub const ALL: [PatternKind; 6] = [
        PatternKind::Symmetry,
        PatternKind::Rotation,
        PatternKind::Repetition,
        PatternKind::ZoneFill,
        PatternKind::ColorMap,
        PatternKind::Conditional,
    ];

    /// Stable name used in solution records and history keys.
    pub fn name(self) -> &'static str {
        match self {
            PatternKind::Symmetry => "symmetry",
            PatternKind::Rotation => "rotation",
            PatternKind::Repetition => "repetition",
            PatternKind::ZoneFill => "zone_fill",
            PatternKind::ColorMap => "color_map",
            PatternKind::Conditional => "conditional",
        }
    }

    /// The canonical families get a simplicity bonus.
    pub fn is_fundamental(self) -> bool {
        !matches!(self, PatternKind::Conditional)
    }

    /// How well the family tolerates grid-dimension changes.
    pub fn dimension_resistance(self) -> f32 {
        match self {
            PatternKind::ColorMap
            | PatternKind::Repetition
            | PatternKind::ZoneFill
            | PatternKind::Symmetry => 0.9,
            PatternKind::Rotation => 0.6,
            PatternKind::Conditional => 0.3,
        }
    }
}

/// A repeating sub-grid found inside an output grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Motif {
    pub grid: Grid,
    pub occurrences: usize,
}

/// One learned neighbor-conditional replacement.
///
/// Applies to cells whose in-bounds 8-neighborhood uniformly carries
/// `neighbor` while the cell itself carries `center`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborRule {
    pub center: u8,
    pub neighbor: u8,
    pub replacement: u8,
}

/// Context-dependent rule variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ConditionalRule {
    /// Output is the input surrounded by a uniform border.
    Padding {
        top: usize,
        bottom: usize,
        left: usize,
        right: usize,
        color: u8,
    },
    /// Cells change based on a uniform neighborhood, not their value alone.
    NeighborUniform { rules: Vec<NeighborRule> },
}

/// A transformation rule with its family-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Rule {
    Symmetry {
        axis: Axis,
    },
    Rotation {
        quarter_turns: u32,
    },
    Repetition {
        factor_rows: usize,
        factor_cols: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        motif: Option<Motif>,
    },
    ZoneFill {
        boundary_color: u8,
        map: ZoneMap,
    },
    ColorMap {
        mapping: BTreeMap<u8, u8>,
        /// Source values dropped because they mapped inconsistently.
        conflicts: usize,
    },
    Conditional {
        rule: ConditionalRule,
    },
}

impl Rule {
    /// The catalog family this rule belongs to.
    pub fn kind(&self) -> PatternKind {
        match self {
            Rule::Symmetry { .. } => PatternKind::Symmetry,
            Rule::Rotation { .. } => PatternKind::Rotation,
            Rule::Repetition { .. } => PatternKind::Repetition,
            Rule::ZoneFill { .. } => PatternKind::ZoneFill,
            Rule::ColorMap { .. } => PatternKind::ColorMap,
            Rule::Conditional { .. } => PatternKind::Conditional,
        }
    }

    /// Number of recorded parameters/details, the simplicity currency.
    pub fn parameter_count(&self) -> usize {
        match self {
            Rule::Symmetry { .. } | Rule::Rotation { .. } => 1,
            Rule::Repetition { motif, .. } => 2 + if motif.is_some() { 2 } else { 0 },
            Rule::ZoneFill { map, .. } => {
                1 + map.len() + usize::from(map.fallback().is_some())
            }
            Rule::ColorMap { mapping, conflicts } => mapping.len() + conflicts,
            Rule::Conditional { rule } => match rule {
                ConditionalRule::Padding { .. } => 5,
                ConditionalRule::NeighborUniform { rules } => rules.len(),
            },
        }
    }

    /// Typed sanity check of the recorded parameters, in [0, 1].
    pub fn internal_consistency(&self) -> f32 {
        match self {
            Rule::Symmetry { .. } | Rule::Rotation { .. } => 1.0,
            Rule::Repetition {
                factor_rows,
                factor_cols,
                motif,
            } => {
                let sane =
                    |f: usize| (2..=6).contains(&f) || (f == 1 && motif.is_some());
                if sane(*factor_rows) || sane(*factor_cols) {
                    1.0
                } else {
                    0.4
                }
            }
            Rule::ZoneFill { map, .. } => {
                if map.is_empty() && map.fallback().is_none() {
                    return 0.2;
                }
                let total = map.len() + map.conflicts();
                let conflict_ratio = if total == 0 {
                    0.0
                } else {
                    map.conflicts() as f32 / total as f32
                };
                1.0 - 0.5 * conflict_ratio
            }
            Rule::ColorMap { mapping, conflicts } => {
                if mapping.is_empty() {
                    return 0.2;
                }
                let total = mapping.len() + conflicts;
                1.0 - 0.5 * (*conflicts as f32 / total as f32)
            }
            Rule::Conditional { rule } => match rule {
                ConditionalRule::Padding {
                    top,
                    bottom,
                    left,
                    right,
                    ..
                } => {
                    if [*top, *bottom, *left, *right].iter().all(|&p| p <= 10) {
                        1.0
                    } else {
                        0.4
                    }
                }
                ConditionalRule::NeighborUniform { rules } => {
                    if rules.is_empty() { 0.2 } else { 0.8 }
                }
            },
        }
    }

    /// Apply the rule to a grid. Pure; the input grid is never modified.
    pub fn apply(&self, grid: &Grid) -> Grid {
        match self {
            Rule::Symmetry { axis } => grid.flip(*axis),
            Rule::Rotation { quarter_turns } => grid.rotate(*quarter_turns),
            Rule::Repetition {
                factor_rows,
                factor_cols,
                ..
            } => grid.tile(*factor_rows, *factor_cols),
            Rule::ZoneFill {
                boundary_color,
                map,
            } => apply_zone_fill(grid, *boundary_color, map),
            Rule::ColorMap { mapping, .. } => {
                grid.map_cells(|v| mapping.get(&v).copied().unwrap_or(v))
            }
            Rule::Conditional { rule } => match rule {
                ConditionalRule::Padding {
                    top,
                    bottom,
                    left,
                    right,
                    color,
                } => apply_padding(grid, *top, *bottom, *left, *right, *color),
                ConditionalRule::NeighborUniform { rules } => {
                    apply_neighbor_rules(grid, rules)
                }
            },
        }
    }
}

fn apply_zone_fill(grid: &Grid, boundary_color: u8, map: &ZoneMap) -> Grid {
    let mut cells = grid.cells().to_vec();
    for zone in find_enclosed_zones(grid, boundary_color) {
        if let Some(color) = map.resolve(&zone.key) {
            for &(r, c) in &zone.cells {
                cells[r * grid.width() + c] = color.min(MAX_COLOR);
            }
        }
    }
    Grid::from_flat(cells, grid.height(), grid.width())
}

fn apply_padding(
    grid: &Grid,
    top: usize,
    bottom: usize,
    left: usize,
    right: usize,
    color: u8,
) -> Grid {
    let height = grid.height() + top + bottom;
    let width = grid.width() + left + right;
    let mut cells = vec![color.min(MAX_COLOR); height * width];
    for r in 0..grid.height() {
        for c in 0..grid.width() {
            cells[(r + top) * width + (c + left)] = grid.get(r, c);
        }
    }
    Grid::from_flat(cells, height, width)
}

fn apply_neighbor_rules(grid: &Grid, rules: &[NeighborRule]) -> Grid {
    let mut cells = grid.cells().to_vec();
    for r in 0..grid.height() {
        for c in 0..grid.width() {
            let Some(neighbor) = uniform_neighbor(grid, r, c) else {
                continue;
            };
            let center = grid.get(r, c);
            if let Some(rule) = rules
                .iter()
                .find(|rule| rule.center == center && rule.neighbor == neighbor)
            {
                cells[r * grid.width() + c] = rule.replacement.min(MAX_COLOR);
            }
        }
    }
    Grid::from_flat(cells, grid.height(), grid.width())
}

/// The single value shared by all in-bounds cells of the 8-neighborhood,
/// if there is one.
pub(crate) fn uniform_neighbor(grid: &Grid, row: usize, col: usize) -> Option<u8> {
    let mut uniform: Option<u8> = None;
    for dr in -1i32..=1 {
        for dc in -1i32..=1 {
            if dr == 0 && dc == 0 {
                continue;
            }
            let nr = row as i32 + dr;
            let nc = col as i32 + dc;
            if nr < 0 || nc < 0 || nr >= grid.height() as i32 || nc >= grid.width() as i32 {
                continue;
            }
            let value = grid.get(nr as usize, nc as usize);
            match uniform {
                None => uniform = Some(value),
                Some(u) if u != value => return None,
                Some(_) => {}
            }
        }
    }
    uniform
}

/// A candidate rule with its raw evidence score in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub rule: Rule,
    pub evidence: f32,
}

impl Hypothesis {
    pub fn new(rule: Rule, evidence: f32) -> Self {
        Self {
            rule,
            evidence: evidence.clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::zones::ZoneKey;
    use crate::schema::BACKGROUND;

    fn grid(rows: &[&[u8]]) -> Grid {
        Grid::from_rows(rows.iter().map(|r| r.to_vec()).collect()).unwrap()
    }

    #[test]
    fn test_kind_order_matches_catalog() {
        for window in PatternKind::ALL.windows(2) {
            assert!(window[0] < window[1]);
        }
    }

    #[test]
    fn test_apply_symmetry_and_rotation() {
        let g = grid(&[&[1, 2], &[3, 4]]);
        let flip = Rule::Symmetry {
            axis: Axis::Horizontal,
        };
        assert_eq!(flip.apply(&g), grid(&[&[2, 1], &[4, 3]]));

        let quarter = Rule::Rotation { quarter_turns: 1 };
        assert_eq!(quarter.apply(&g), grid(&[&[3, 1], &[4, 2]]));
    }

    #[test]
    fn test_apply_repetition() {
        let g = grid(&[&[7, 9], &[4, 3]]);
        let rule = Rule::Repetition {
            factor_rows: 3,
            factor_cols: 3,
            motif: None,
        };
        let tiled = rule.apply(&g);
        assert_eq!(tiled.height(), 6);
        assert_eq!(tiled.get(5, 5), 3);
        assert_eq!(tiled.get(0, 2), 7);
    }

    #[test]
    fn test_apply_color_map_identity_for_unmapped() {
        let g = grid(&[&[1, 2], &[3, 1]]);
        let mut mapping = BTreeMap::new();
        mapping.insert(1u8, 5u8);
        let rule = Rule::ColorMap {
            mapping,
            conflicts: 0,
        };
        assert_eq!(rule.apply(&g), grid(&[&[5, 2], &[3, 5]]));
    }

    #[test]
    fn test_apply_zone_fill_uses_fallback_for_unseen_keys() {
        let g = grid(&[
            &[3, 3, 3, 3, 3],
            &[3, 0, 0, 0, 3],
            &[3, 0, 0, 0, 3],
            &[3, 3, 3, 3, 3],
        ]);
        let mut map = ZoneMap::new();
        // Train on some other shape; only the fallback can cover this one.
        map.insert(
            ZoneKey {
                area: 1,
                bbox_height: 1,
                bbox_width: 1,
            },
            4,
        );
        map.set_fallback(4);
        let rule = Rule::ZoneFill {
            boundary_color: 3,
            map,
        };
        let filled = rule.apply(&g);
        assert_eq!(filled.get(1, 1), 4);
        assert_eq!(filled.get(2, 3), 4);
        assert_eq!(filled.get(0, 0), 3);
    }

    #[test]
    fn test_apply_padding() {
        let g = grid(&[&[1, 2]]);
        let rule = Rule::Conditional {
            rule: ConditionalRule::Padding {
                top: 1,
                bottom: 1,
                left: 1,
                right: 1,
                color: 8,
            },
        };
        let padded = rule.apply(&g);
        assert_eq!(padded, grid(&[&[8, 8, 8, 8], &[8, 1, 2, 8], &[8, 8, 8, 8]]));
    }

    #[test]
    fn test_apply_neighbor_rules() {
        let g = grid(&[&[1, 1, 1], &[1, 0, 1], &[1, 1, 1]]);
        let rule = Rule::Conditional {
            rule: ConditionalRule::NeighborUniform {
                rules: vec![NeighborRule {
                    center: BACKGROUND,
                    neighbor: 1,
                    replacement: 2,
                }],
            },
        };
        let out = rule.apply(&g);
        assert_eq!(out.get(1, 1), 2);
        assert_eq!(out.get(0, 0), 1);
    }

    #[test]
    fn test_uniform_neighbor() {
        let g = grid(&[&[1, 1, 1], &[1, 0, 1], &[1, 1, 1]]);
        assert_eq!(uniform_neighbor(&g, 1, 1), Some(1));
        // Corner sees the 0 at the center: not uniform.
        assert_eq!(uniform_neighbor(&g, 0, 0), None);
    }

    #[test]
    fn test_rule_serde_tagged() {
        let rule = Rule::Rotation { quarter_turns: 2 };
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains("\"type\":\"Rotation\""));
        let parsed: Rule = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, rule);
    }

    #[test]
    fn test_evidence_clamped() {
        let h = Hypothesis::new(Rule::Rotation { quarter_turns: 1 }, 1.7);
        assert_eq!(h.evidence, 1.0);
    }
}
