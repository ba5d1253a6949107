//! Tolerance-based point deduplication.
//!
//! Every geometric point produced during a cut (element corners, edge cut
//! points, polyhedron split points, face and body centres) is registered in the
//! [`PointPool`]. Coordinates within `tolerance` of an existing point resolve to
//! that point's [`PointKey`], which gives all later topology a canonical point
//! identity.

use nalgebra::Point3;
use slotmap::new_key_type;

use crate::core::collections::StorageMap;
use crate::core::collections::spatial_hash_grid::HashGridIndex;

new_key_type! {
    /// Key of a point stored in a [`PointPool`].
    pub struct PointKey;
}

/// Deduplicating point arena with a spatial hash index.
#[derive(Clone, Debug)]
pub struct PointPool {
    points: StorageMap<PointKey, Point3<f64>>,
    grid: HashGridIndex<PointKey>,
    tolerance: f64,
}

impl PointPool {
    /// Create an empty pool merging points closer than `tolerance`.
    #[must_use]
    pub fn new(tolerance: f64) -> Self {
        Self {
            points: StorageMap::with_key(),
            grid: HashGridIndex::new(tolerance),
            tolerance,
        }
    }

    /// Merge tolerance.
    #[must_use]
    pub const fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Number of distinct points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Remove all points; keys handed out before become invalid.
    pub fn clear(&mut self) {
        self.points.clear();
        self.grid.clear();
    }

    /// Coordinates of a stored point.
    #[must_use]
    pub fn coords(&self, key: PointKey) -> Option<&Point3<f64>> {
        self.points.get(key)
    }

    /// Iterate over all stored points.
    pub fn iter(&self) -> impl Iterator<Item = (PointKey, &Point3<f64>)> {
        self.points.iter()
    }

    /// Key of the nearest stored point within tolerance of `x`, if any.
    #[must_use]
    pub fn find(&self, x: &Point3<f64>) -> Option<PointKey> {
        let tol2 = self.tolerance * self.tolerance;
        let mut best: Option<(PointKey, f64)> = None;
        let mut consider = |key: PointKey, p: &Point3<f64>| {
            let d2 = (p - x).norm_squared();
            if d2 <= tol2 && best.is_none_or(|(_, b)| d2 < b) {
                best = Some((key, d2));
            }
        };

        let coords = [x.x, x.y, x.z];
        let used_grid = self.grid.for_each_candidate(&coords, |key| {
            if let Some(p) = self.points.get(key) {
                consider(key, p);
            }
            true
        });
        if !used_grid {
            for (key, p) in &self.points {
                consider(key, p);
            }
        }
        best.map(|(key, _)| key)
    }

    /// Key of the point at `x`, inserting it if no stored point is within
    /// tolerance.
    pub fn get_or_insert(&mut self, x: Point3<f64>) -> PointKey {
        if let Some(key) = self.find(&x) {
            return key;
        }
        let key = self.points.insert(x);
        self.grid.insert(key, &[x.x, x.y, x.z]);
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_pool_merges_within_tolerance() {
        let mut pool = PointPool::new(1e-8);
        let a = pool.get_or_insert(Point3::new(0.5, 0.5, 0.5));
        let b = pool.get_or_insert(Point3::new(0.5 + 5e-9, 0.5, 0.5 - 5e-9));
        let c = pool.get_or_insert(Point3::new(0.5 + 2e-8, 0.5, 0.5));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.coords(a), Some(&Point3::new(0.5, 0.5, 0.5)));
    }

    #[test]
    fn test_point_pool_picks_nearest_candidate() {
        let mut pool = PointPool::new(1.0);
        let far = pool.get_or_insert(Point3::new(0.0, 0.0, 0.0));
        let near = pool.get_or_insert(Point3::new(1.5, 0.0, 0.0));
        assert_eq!(pool.find(&Point3::new(0.9, 0.0, 0.0)), Some(near));
        assert_eq!(pool.find(&Point3::new(0.2, 0.0, 0.0)), Some(far));
    }

    #[test]
    fn test_point_pool_linear_fallback_for_huge_coordinates() {
        let mut pool = PointPool::new(1e-12);
        let a = pool.get_or_insert(Point3::new(1e300, 0.0, 0.0));
        let b = pool.get_or_insert(Point3::new(1e300, 0.0, 0.0));
        assert_eq!(a, b);
        let c = pool.get_or_insert(Point3::new(0.0, 0.0, 0.0));
        assert_ne!(a, c);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_point_pool_clear() {
        let mut pool = PointPool::new(1e-10);
        pool.get_or_insert(Point3::new(1.0, 2.0, 3.0));
        assert!(!pool.is_empty());
        pool.clear();
        assert!(pool.is_empty());
        assert!(pool.find(&Point3::new(1.0, 2.0, 3.0)).is_none());
    }
}
