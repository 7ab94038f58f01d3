//! Disjoint-set over normalized names

use std::collections::HashMap;

/// Union-find with path compression and union by rank.
///
/// `find` is iterative, so arbitrarily long chains of aliases cannot
/// overflow the stack.
#[derive(Debug, Default)]
pub struct DisjointSet {
    index: HashMap<String, usize>,
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Insert a key (no-op if present) and return its slot.
    pub fn insert(&mut self, key: &str) -> usize {
        if let Some(&slot) = self.index.get(key) {
            return slot;
        }
        let slot = self.parent.len();
        self.parent.push(slot);
        self.rank.push(0);
        self.index.insert(key.to_string(), slot);
        slot
    }

    pub fn slot(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Root of the set containing `slot`.
    pub fn find(&mut self, slot: usize) -> usize {
        let mut root = slot;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // compress
        let mut current = slot;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    pub fn find_key(&mut self, key: &str) -> Option<usize> {
        let slot = self.slot(key)?;
        Some(self.find(slot))
    }

    /// Merge the sets containing `a` and `b`. Returns false if they were
    /// already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return false;
        }
        match self.rank[root_a].cmp(&self.rank[root_b]) {
            std::cmp::Ordering::Less => self.parent[root_a] = root_b,
            std::cmp::Ordering::Greater => self.parent[root_b] = root_a,
            std::cmp::Ordering::Equal => {
                self.parent[root_b] = root_a;
                self.rank[root_a] = self.rank[root_a].saturating_add(1);
            }
        }
        true
    }

    pub fn union_keys(&mut self, a: &str, b: &str) -> bool {
        let a = self.insert(a);
        let b = self.insert(b);
        self.union(a, b)
    }

    pub fn connected(&mut self, a: &str, b: &str) -> bool {
        match (self.find_key(a), self.find_key(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }
}
