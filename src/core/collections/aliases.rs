//! Collection aliases shared by the cut kernel.
//!
//! The kernel hashes only internal keys (slotmap keys, node ids, point-key
//! pairs), so the fast non-cryptographic `rustc_hash` hasher is used
//! throughout.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

#[cfg(not(feature = "dense-slotmap"))]
use slotmap::SlotMap;

#[cfg(feature = "dense-slotmap")]
use slotmap::DenseSlotMap;

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Arena backend for points, facets, volume cells and boundary cells.
///
/// # Feature Flags
///
/// - **default**: `DenseSlotMap` (enabled via the default `dense-slotmap` feature)
/// - **--no-default-features**: `SlotMap`
///
/// Only the API common to both maps (`insert`, `get`, `get_mut`, `iter`,
/// `keys`, `values`, `len`, `clear`, `contains_key`) is used by the crate.
#[cfg(not(feature = "dense-slotmap"))]
pub type StorageMap<K, V> = SlotMap<K, V>;

/// Storage for mesh entities, dense variant selected by `dense-slotmap`.
#[cfg(feature = "dense-slotmap")]
pub type StorageMap<K, V> = DenseSlotMap<K, V>;

// =============================================================================
// HASHED COLLECTIONS
// =============================================================================

/// `HashMap` with the `rustc_hash` hasher.
///
/// ⚠️ **Not DoS-resistant**: only used with keys produced by the kernel itself.
///
/// # Examples
///
/// ```rust
/// use xfem_cut::core::collections::FastHashMap;
///
/// let mut map: FastHashMap<i32, usize> = FastHashMap::default();
/// map.insert(7, 1);
/// assert_eq!(map.get(&7), Some(&1));
/// ```
pub type FastHashMap<K, V> = FxHashMap<K, V>;

/// `HashSet` with the `rustc_hash` hasher.
pub type FastHashSet<T> = FxHashSet<T>;

/// Re-export of the entry API used together with [`FastHashMap`].
pub use std::collections::hash_map::Entry;

/// Small-optimized vector: inline storage for up to `N` elements.
///
/// # Size Guidelines
///
/// - **N=2**: cells sharing a facet
/// - **N=4**: tetrahedron corners, point-key pairs
/// - **N=8**: polygon corners of a facet
/// - **N=16**: element-local scratch buffers
pub type SmallBuffer<T, const N: usize> = SmallVec<[T; N]>;

/// Inline capacity for facet polygons; a tetrahedron cut by a handful of planes
/// rarely produces faces with more corners than this.
pub const POLYGON_INLINE_CAPACITY: usize = 8;

/// Creates a [`FastHashMap`] with pre-allocated capacity.
#[must_use]
pub fn fast_hash_map_with_capacity<K, V>(capacity: usize) -> FastHashMap<K, V> {
    FastHashMap::with_capacity_and_hasher(capacity, rustc_hash::FxBuildHasher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_collections_basic_operations() {
        let mut map: FastHashMap<(i32, i32), usize> = fast_hash_map_with_capacity(4);
        assert!(map.capacity() >= 4);
        map.insert((1, 2), 3);
        assert_eq!(map.get(&(1, 2)), Some(&3));

        let mut set: FastHashSet<i32> = FastHashSet::default();
        set.insert(-1);
        assert!(set.contains(&-1));
        assert!(!set.contains(&1));
    }

    #[test]
    fn test_storage_map_common_api() {
        slotmap::new_key_type! { struct Key; }
        let mut map: StorageMap<Key, f64> = StorageMap::with_key();
        let a = map.insert(1.0);
        let b = map.insert(2.0);
        if let Some(value) = map.get_mut(b) {
            *value += 1.0;
        }
        assert!(map.contains_key(a));
        assert_eq!(map.len(), 2);
        assert_eq!(map.values().sum::<f64>(), 4.0);
        assert_eq!(map.keys().count(), map.iter().count());
        map.clear();
        assert!(map.get(a).is_none());
    }

    #[test]
    fn test_small_buffer_spills_past_inline_capacity() {
        let mut buffer: SmallBuffer<u32, POLYGON_INLINE_CAPACITY> = SmallBuffer::new();
        for i in 0..8 {
            buffer.push(i);
        }
        assert!(!buffer.spilled());
        buffer.push(8);
        assert!(buffer.spilled());
    }
}
