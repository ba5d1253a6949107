//! Connected components of small undirected graphs.

use std::hash::Hash;

use crate::core::collections::{FastHashMap, FastHashSet, SmallBuffer};

/// Adjacency lists of an undirected graph.
pub type Adjacency<K> = FastHashMap<K, SmallBuffer<K, 8>>;

/// Add the undirected edge `a`–`b`.
pub fn connect<K: Copy + Eq + Hash>(adjacency: &mut Adjacency<K>, a: K, b: K) {
    if a == b {
        adjacency.entry(a).or_default();
        return;
    }
    let from_a = adjacency.entry(a).or_default();
    if !from_a.contains(&b) {
        from_a.push(b);
    }
    let from_b = adjacency.entry(b).or_default();
    if !from_b.contains(&a) {
        from_b.push(a);
    }
}

/// Connected components of the subgraph induced by `members`.
///
/// Components come out in the order of their first member in `members`;
/// inside a component, vertices keep the order of `members` as well.
pub fn components_among<K: Copy + Eq + Hash>(members: &[K], adjacency: &Adjacency<K>) -> Vec<Vec<K>> {
    let allowed: FastHashSet<K> = members.iter().copied().collect();
    let mut component_of: FastHashMap<K, usize> = FastHashMap::default();
    let mut count = 0;
    for &start in members {
        if component_of.contains_key(&start) {
            continue;
        }
        let mut stack: SmallBuffer<K, 16> = SmallBuffer::new();
        stack.push(start);
        while let Some(v) = stack.pop() {
            if component_of.contains_key(&v) {
                continue;
            }
            component_of.insert(v, count);
            let Some(neighbors) = adjacency.get(&v) else {
                continue;
            };
            for &n in neighbors {
                if allowed.contains(&n) && !component_of.contains_key(&n) {
                    stack.push(n);
                }
            }
        }
        count += 1;
    }

    let mut components = vec![Vec::new(); count];
    for &k in members {
        if let Some(&c) = component_of.get(&k) {
            if !components[c].contains(&k) {
                components[c].push(k);
            }
        }
    }
    components
}
