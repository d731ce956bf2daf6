//! Enclosed-zone detection - flood fill of background regions sealed off by
//! a boundary color.
//!
//! A zone is a maximal 4-connected background region that never touches the
//! grid border and whose surrounding cells all carry the requested boundary
//! color. Regions that reach the border are open and discarded.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::schema::{BACKGROUND, Grid};

/// Identity of an enclosed zone, independent of its position and of the
/// grid it was found in.
///
/// The key is the zone's intrinsic extent: cell count plus bounding-box
/// size. The normalized centroid stays on [`Zone`] and is deliberately not
/// part of the identity, so a uniformly translated zone keeps its key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ZoneKey {
    pub area: u32,
    pub bbox_height: u16,
    pub bbox_width: u16,
}

/// One enclosed background region.
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub key: ZoneKey,
    /// Member cells as (row, col), in row-major discovery order.
    pub cells: Vec<(usize, usize)>,
    /// Centroid divided by grid extent, for diagnostics and ordering.
    pub centroid: (f32, f32),
}

/// Lookup table from zone identity to fill color.
///
/// Entries stay sorted by key. A key that ever received two different
/// colors is dropped and tombstoned so later inserts cannot resurrect it;
/// conflicts are never silently overwritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneMap {
    entries: Vec<(ZoneKey, u8)>,
    dropped: Vec<ZoneKey>,
    /// Degenerate single-color fallback, recorded when every zone of a
    /// pair mapped to one color. Used for keys unseen during training.
    fallback: Option<u8>,
}

impl ZoneMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key/color association, dropping the key on conflict.
    pub fn insert(&mut self, key: ZoneKey, color: u8) {
        if self.dropped.binary_search(&key).is_ok() {
            return;
        }
        match self.entries.binary_search_by_key(&key, |(k, _)| *k) {
            Ok(i) => {
                if self.entries[i].1 != color {
                    self.entries.remove(i);
                    let at = self.dropped.binary_search(&key).unwrap_err();
                    self.dropped.insert(at, key);
                }
            }
            Err(i) => self.entries.insert(i, (key, color)),
        }
    }

    /// Fill color for a key, not consulting the fallback.
    pub fn lookup(&self, key: &ZoneKey) -> Option<u8> {
        self.entries
            .binary_search_by_key(key, |(k, _)| *k)
            .ok()
            .map(|i| self.entries[i].1)
    }

    /// Fill color for a key, falling back to the degenerate single color.
    pub fn resolve(&self, key: &ZoneKey) -> Option<u8> {
        self.lookup(key).or(self.fallback)
    }

    pub fn fallback(&self) -> Option<u8> {
        self.fallback
    }

    pub fn set_fallback(&mut self, color: u8) {
        self.fallback = Some(color);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(ZoneKey, u8)] {
        &self.entries
    }

    /// Count of keys dropped due to conflicting colors.
    pub fn conflicts(&self) -> usize {
        self.dropped.len()
    }

    /// Union with another map. Conflicting keys are dropped on both sides;
    /// fallbacks must agree or are cleared.
    pub fn merge(&mut self, other: &ZoneMap) {
        for key in &other.dropped {
            if let Ok(i) = self.entries.binary_search_by_key(key, |(k, _)| *k) {
                self.entries.remove(i);
            }
            if let Err(at) = self.dropped.binary_search(key) {
                self.dropped.insert(at, *key);
            }
        }
        for &(key, color) in &other.entries {
            self.insert(key, color);
        }
        self.fallback = match (self.fallback, other.fallback) {
            (Some(a), Some(b)) if a == b => Some(a),
            (Some(_), Some(_)) => None,
            (a, b) => a.or(b),
        };
    }
}

/// Find every enclosed background zone given a boundary color.
///
/// A grid with no boundary-color cell yields no zones; a fully background
/// grid has only open regions and also yields none. Neither is an error.
pub fn find_enclosed_zones(grid: &Grid, boundary_color: u8) -> Vec<Zone> {
    let height = grid.height();
    let width = grid.width();
    let mut visited = vec![false; height * width];
    let mut zones = Vec::new();

    for start_row in 0..height {
        for start_col in 0..width {
            let start = start_row * width + start_col;
            if visited[start] || grid.get(start_row, start_col) != BACKGROUND {
                continue;
            }

            // Flood the connected background region from this cell.
            let mut cells = Vec::new();
            let mut open = false;
            let mut sealed_by_boundary = true;
            let mut queue = VecDeque::new();
            visited[start] = true;
            queue.push_back((start_row, start_col));

            while let Some((r, c)) = queue.pop_front() {
                cells.push((r, c));
                if r == 0 || c == 0 || r == height - 1 || c == width - 1 {
                    open = true;
                }
                let neighbors = [
                    (r.wrapping_sub(1), c),
                    (r + 1, c),
                    (r, c.wrapping_sub(1)),
                    (r, c + 1),
                ];
                for (nr, nc) in neighbors {
                    if nr >= height || nc >= width {
                        continue;
                    }
                    let value = grid.get(nr, nc);
                    if value == BACKGROUND {
                        let idx = nr * width + nc;
                        if !visited[idx] {
                            visited[idx] = true;
                            queue.push_back((nr, nc));
                        }
                    } else if value != boundary_color {
                        sealed_by_boundary = false;
                    }
                }
            }

            if open || !sealed_by_boundary {
                continue;
            }

            zones.push(make_zone(cells, height, width));
        }
    }

    zones
}

fn make_zone(mut cells: Vec<(usize, usize)>, grid_height: usize, grid_width: usize) -> Zone {
    cells.sort_unstable();
    let (mut min_r, mut max_r) = (usize::MAX, 0);
    let (mut min_c, mut max_c) = (usize::MAX, 0);
    let (mut sum_r, mut sum_c) = (0usize, 0usize);
    for &(r, c) in &cells {
        min_r = min_r.min(r);
        max_r = max_r.max(r);
        min_c = min_c.min(c);
        max_c = max_c.max(c);
        sum_r += r;
        sum_c += c;
    }
    let area = cells.len();
    let centroid = (
        sum_r as f32 / area as f32 / grid_height as f32,
        sum_c as f32 / area as f32 / grid_width as f32,
    );
    Zone {
        key: ZoneKey {
            area: area as u32,
            bbox_height: (max_r - min_r + 1) as u16,
            bbox_width: (max_c - min_c + 1) as u16,
        },
        cells,
        centroid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[u8]]) -> Grid {
        Grid::from_rows(rows.iter().map(|r| r.to_vec()).collect()).unwrap()
    }

    #[test]
    fn test_two_loops() {
        let g = grid(&[
            &[3, 3, 3, 0, 0, 0],
            &[3, 0, 3, 0, 0, 0],
            &[3, 3, 3, 0, 0, 0],
            &[0, 0, 0, 3, 3, 3],
            &[0, 0, 0, 3, 0, 3],
            &[0, 0, 0, 3, 3, 3],
        ]);
        let zones = find_enclosed_zones(&g, 3);
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0].cells, vec![(1, 1)]);
        assert_eq!(zones[1].cells, vec![(4, 4)]);
        // Same shape, same key regardless of position.
        assert_eq!(zones[0].key, zones[1].key);
    }

    #[test]
    fn test_open_region_discarded() {
        // The surrounding background touches the border everywhere.
        let g = grid(&[&[0, 0, 0], &[0, 3, 0], &[0, 0, 0]]);
        assert!(find_enclosed_zones(&g, 3).is_empty());
    }

    #[test]
    fn test_fully_background_yields_nothing() {
        let g = grid(&[&[0, 0], &[0, 0]]);
        assert!(find_enclosed_zones(&g, 3).is_empty());
    }

    #[test]
    fn test_wrong_boundary_color_rejected() {
        let g = grid(&[
            &[5, 5, 5],
            &[5, 0, 5],
            &[5, 5, 5],
        ]);
        assert!(find_enclosed_zones(&g, 3).is_empty());
        assert_eq!(find_enclosed_zones(&g, 5).len(), 1);
    }

    #[test]
    fn test_key_translation_invariant() {
        let a = grid(&[
            &[3, 3, 3, 3, 0],
            &[3, 0, 0, 3, 0],
            &[3, 3, 3, 3, 0],
            &[0, 0, 0, 0, 0],
            &[0, 0, 0, 0, 0],
        ]);
        let b = grid(&[
            &[0, 0, 0, 0, 0],
            &[0, 0, 0, 0, 0],
            &[0, 3, 3, 3, 3],
            &[0, 3, 0, 0, 3],
            &[0, 3, 3, 3, 3],
        ]);
        let za = find_enclosed_zones(&a, 3);
        let zb = find_enclosed_zones(&b, 3);
        assert_eq!(za.len(), 1);
        assert_eq!(zb.len(), 1);
        assert_eq!(za[0].key, zb[0].key);
        assert_ne!(za[0].centroid, zb[0].centroid);
    }

    #[test]
    fn test_zone_map_conflict_drops_key() {
        let key = ZoneKey {
            area: 1,
            bbox_height: 1,
            bbox_width: 1,
        };
        let mut map = ZoneMap::new();
        map.insert(key, 4);
        assert_eq!(map.lookup(&key), Some(4));

        map.insert(key, 6);
        assert_eq!(map.lookup(&key), None);
        assert_eq!(map.conflicts(), 1);

        // Tombstoned: cannot be re-inserted.
        map.insert(key, 4);
        assert_eq!(map.lookup(&key), None);
    }

    #[test]
    fn test_zone_map_merge_and_fallback() {
        let k1 = ZoneKey {
            area: 1,
            bbox_height: 1,
            bbox_width: 1,
        };
        let k2 = ZoneKey {
            area: 2,
            bbox_height: 1,
            bbox_width: 2,
        };
        let mut a = ZoneMap::new();
        a.insert(k1, 4);
        a.set_fallback(4);

        let mut b = ZoneMap::new();
        b.insert(k1, 4);
        b.insert(k2, 7);
        b.set_fallback(7);

        a.merge(&b);
        assert_eq!(a.lookup(&k1), Some(4));
        assert_eq!(a.lookup(&k2), Some(7));
        // Disagreeing fallbacks are cleared rather than overwritten.
        assert_eq!(a.fallback(), None);
        // Unseen key resolves through the fallback only when one exists.
        let unseen = ZoneKey {
            area: 9,
            bbox_height: 3,
            bbox_width: 3,
        };
        assert_eq!(a.resolve(&unseen), None);
    }
}
