//! Spatial hash grid for tolerance-based point lookup.
//!
//! The point pool uses this index to find already-registered points within the
//! merge tolerance. The grid cell size equals the tolerance, so every stored
//! point within tolerance of a query lies in the 3×3×3 Moore neighbourhood of
//! the query cell.
//!
//! The index is a pure acceleration structure: when a coordinate cannot be
//! keyed robustly (non-finite, or too large for unit cell resolution) the index
//! disables itself and callers fall back to a linear scan.

use super::{FastHashMap, SmallBuffer};

const BUCKET_INLINE_CAPACITY: usize = 8;

/// Largest absolute cell coordinate that still has unit resolution in `f64`.
const MAX_CELL_COORDINATE: f64 = 4_503_599_627_370_496.0; // 2^52

/// Integer grid-cell key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct GridKey([i64; 3]);

/// A 3D spatial hash grid mapping grid cells to the keys stored in them.
#[derive(Clone, Debug)]
pub(crate) struct HashGridIndex<K> {
    cell_size: f64,
    usable: bool,
    cells: FastHashMap<GridKey, SmallBuffer<K, BUCKET_INLINE_CAPACITY>>,
}

impl<K> HashGridIndex<K>
where
    K: Copy,
{
    /// Create a new grid index with the given cell size.
    pub(crate) fn new(cell_size: f64) -> Self {
        let usable = cell_size.is_finite() && cell_size > 0.0;
        Self {
            cell_size,
            usable,
            cells: FastHashMap::default(),
        }
    }

    #[cfg(test)]
    pub(crate) const fn is_usable(&self) -> bool {
        self.usable
    }

    pub(crate) fn clear(&mut self) {
        self.cells.clear();
        self.usable = self.cell_size.is_finite() && self.cell_size > 0.0;
    }

    const fn disable(&mut self) {
        self.usable = false;
    }

    /// Insert a key into the grid cell containing `coords`.
    ///
    /// If the coordinates cannot be keyed, the index is disabled.
    pub(crate) fn insert(&mut self, key: K, coords: &[f64; 3]) {
        if !self.usable {
            return;
        }

        let Some(cell) = self.key_for_coords(coords) else {
            self.disable();
            return;
        };

        self.cells.entry(cell).or_default().push(key);
    }

    /// Visit all candidate keys in the 3×3×3 neighbourhood around `coords`.
    ///
    /// The visitor returns `false` to stop early. Returns `true` if the index
    /// was used for the query (even if it yielded zero candidates) and `false`
    /// if the caller must fall back to a linear scan.
    pub(crate) fn for_each_candidate<F>(&self, coords: &[f64; 3], mut f: F) -> bool
    where
        F: FnMut(K) -> bool,
    {
        if !self.usable {
            return false;
        }

        let Some(GridKey(base)) = self.key_for_coords(coords) else {
            return false;
        };

        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let neighbor = GridKey([base[0] + dx, base[1] + dy, base[2] + dz]);
                    if let Some(bucket) = self.cells.get(&neighbor) {
                        for &key in bucket {
                            if !f(key) {
                                return true;
                            }
                        }
                    }
                }
            }
        }

        true
    }

    fn key_for_coords(&self, coords: &[f64; 3]) -> Option<GridKey> {
        if !self.usable {
            return None;
        }

        let mut key = [0_i64; 3];
        for (slot, coord) in key.iter_mut().zip(coords) {
            if !coord.is_finite() {
                return None;
            }
            let cell_coord = (coord / self.cell_size).floor();
            // Beyond 2^52 neighbouring cells collapse onto each other.
            if !cell_coord.is_finite() || cell_coord.abs() >= MAX_CELL_COORDINATE {
                return None;
            }
            *slot = num_traits::cast::<f64, i64>(cell_coord)?;
        }

        Some(GridKey(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collections::FastHashSet;

    #[test]
    fn test_hash_grid_candidate_lookup_across_cell_boundary() {
        let mut grid: HashGridIndex<u32> = HashGridIndex::new(1.0);
        grid.insert(1, &[0.2, 0.2, 0.2]);
        grid.insert(2, &[-0.2, 0.2, 0.2]);
        grid.insert(3, &[5.0, 5.0, 5.0]);

        let mut found: FastHashSet<u32> = FastHashSet::default();
        let used = grid.for_each_candidate(&[0.9, 0.1, 0.1], |key| {
            found.insert(key);
            true
        });

        assert!(used);
        assert!(found.contains(&1));
        assert!(found.contains(&2));
        assert!(!found.contains(&3));
    }

    #[test]
    fn test_hash_grid_visits_full_moore_neighbourhood() {
        let mut grid: HashGridIndex<usize> = HashGridIndex::new(1.0);
        let mut next = 0;
        for x in [-1.0, 0.0, 1.0] {
            for y in [-1.0, 0.0, 1.0] {
                for z in [-1.0, 0.0, 1.0] {
                    grid.insert(next, &[x + 0.5, y + 0.5, z + 0.5]);
                    next += 1;
                }
            }
        }

        let mut count = 0;
        assert!(grid.for_each_candidate(&[0.5, 0.5, 0.5], |_| {
            count += 1;
            true
        }));
        assert_eq!(count, 27);
    }

    #[test]
    fn test_hash_grid_disables_on_non_finite_input() {
        let mut grid: HashGridIndex<u32> = HashGridIndex::new(1e-3);
        grid.insert(1, &[f64::NAN, 0.0, 0.0]);
        assert!(!grid.is_usable());
        assert!(!grid.for_each_candidate(&[0.0, 0.0, 0.0], |_| true));

        grid.clear();
        assert!(grid.is_usable());
    }

    #[test]
    fn test_hash_grid_unusable_with_zero_cell_size() {
        let grid: HashGridIndex<u32> = HashGridIndex::new(0.0);
        assert!(!grid.is_usable());
    }
}
