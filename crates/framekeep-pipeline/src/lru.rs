//! Least-recently-used cache tier.
//!
//! Recency is an index-linked doubly linked list stored in a dense
//! arena (`Vec` of nodes carrying `prev`/`next` indices), and a key map
//! points into that arena. Promotion, insertion, eviction, and removal
//! are all constant time: nothing ever scans the list.
//!
//! Removal uses `swap_remove` to keep the arena dense, so the node that
//! was last in the arena moves into the vacated slot. Its neighbours'
//! links, the list ends, and its map entry are re-pointed at the new
//! slot as part of the same operation.
//!
//! Invariants (checked by the tests after every operation):
//!
//! - The arena, the key map, and the recency list hold the same key set.
//! - `len() <= capacity` at all times.
//! - Eviction only happens when inserting a new key at full capacity,
//!   and removes exactly the tail.

use std::collections::HashMap;

use crate::cache::Cache;
use crate::types::PipelineError;

/// Link value meaning "no node".
const NIL: usize = usize::MAX;

#[derive(Debug, Clone)]
struct Node<T> {
    key: String,
    item: T,
    prev: usize,
    next: usize,
}

/// Bounded cache tier evicting the least recently used item.
///
/// [`keys`](Cache::keys) lists keys from most to least recently used.
/// Both [`put`](Cache::put) and [`get`](Cache::get) promote;
/// [`contains`](Cache::contains) does not.
///
/// A capacity of zero is valid and retains nothing: every `put` of a
/// new key is dropped immediately.
#[derive(Debug, Clone)]
pub struct LruCache<T> {
    capacity: usize,
    nodes: Vec<Node<T>>,
    index: HashMap<String, usize>,
    head: usize,
    tail: usize,
}

impl<T> LruCache<T> {
    /// Create an empty cache holding at most `capacity` items.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            nodes: Vec::with_capacity(capacity.min(1024)),
            index: HashMap::with_capacity(capacity.min(1024)),
            head: NIL,
            tail: NIL,
        }
    }

    /// Maximum number of items retained.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Unlink node `i` from the recency list.
    fn detach(&mut self, i: usize) {
        let (prev, next) = (self.nodes[i].prev, self.nodes[i].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.nodes[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.nodes[next].prev = prev;
        }
        self.nodes[i].prev = NIL;
        self.nodes[i].next = NIL;
    }

    /// Link an unlinked node `i` in as the most recently used.
    fn push_front(&mut self, i: usize) {
        self.nodes[i].prev = NIL;
        self.nodes[i].next = self.head;
        if self.head == NIL {
            self.tail = i;
        } else {
            self.nodes[self.head].prev = i;
        }
        self.head = i;
    }

    fn promote(&mut self, i: usize) {
        if self.head != i {
            self.detach(i);
            self.push_front(i);
        }
    }

    /// Remove node `i` from the arena and the list, keeping the arena
    /// dense. The caller is responsible for the removed key's map entry.
    fn remove_at(&mut self, i: usize) -> Node<T> {
        self.detach(i);
        let removed = self.nodes.swap_remove(i);

        // The former last node now lives at `i`.
        if i < self.nodes.len() {
            let (prev, next) = (self.nodes[i].prev, self.nodes[i].next);
            if prev == NIL {
                self.head = i;
            } else {
                self.nodes[prev].next = i;
            }
            if next == NIL {
                self.tail = i;
            } else {
                self.nodes[next].prev = i;
            }
            if let Some(slot) = self.index.get_mut(&self.nodes[i].key) {
                *slot = i;
            }
        }

        removed
    }

    fn evict_tail(&mut self) {
        if self.tail == NIL {
            return;
        }
        let evicted = self.remove_at(self.tail);
        self.index.remove(&evicted.key);
        tracing::debug!(key = %evicted.key, capacity = self.capacity, "evicted from lru cache");
    }
}

impl<T: Clone> Cache<T> for LruCache<T> {
    fn put(&mut self, key: &str, item: T) {
        if let Some(&i) = self.index.get(key) {
            self.nodes[i].item = item;
            self.promote(i);
            return;
        }

        if self.capacity == 0 {
            tracing::debug!(key, "lru cache has zero capacity, item not retained");
            return;
        }

        if self.nodes.len() >= self.capacity {
            self.evict_tail();
        }

        let i = self.nodes.len();
        self.nodes.push(Node {
            key: key.to_string(),
            item,
            prev: NIL,
            next: NIL,
        });
        self.push_front(i);
        self.index.insert(key.to_string(), i);
    }

    fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    fn get(&mut self, key: &str) -> Result<T, PipelineError> {
        let i = *self
            .index
            .get(key)
            .ok_or_else(|| PipelineError::NotCached(key.to_string()))?;
        self.promote(i);
        Ok(self.nodes[i].item.clone())
    }

    fn remove(&mut self, key: &str) {
        if let Some(i) = self.index.remove(key) {
            self.remove_at(i);
        }
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.nodes.len());
        let mut cursor = self.head;
        while cursor != NIL {
            let node = &self.nodes[cursor];
            keys.push(node.key.clone());
            cursor = node.next;
        }
        keys
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    /// Walk the list in both directions and compare against the map.
    fn assert_consistent<T: Clone>(cache: &LruCache<T>) {
        assert!(cache.nodes.len() <= cache.capacity);
        assert_eq!(cache.nodes.len(), cache.index.len());

        let forward = cache.keys();
        assert_eq!(forward.len(), cache.nodes.len());

        let mut backward = Vec::new();
        let mut cursor = cache.tail;
        while cursor != NIL {
            backward.push(cache.nodes[cursor].key.clone());
            cursor = cache.nodes[cursor].prev;
        }
        backward.reverse();
        assert_eq!(forward, backward);

        for (key, &i) in &cache.index {
            assert_eq!(&cache.nodes[i].key, key);
        }
    }

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| (*k).to_string()).collect()
    }

    #[test]
    fn evicts_least_recent_on_new_key() {
        let mut cache = LruCache::new(2);
        cache.put("A", 1);
        cache.put("B", 2);
        cache.put("C", 3);
        assert!(!cache.contains("A"));
        assert!(cache.contains("B"));
        assert!(cache.contains("C"));
        assert_consistent(&cache);
    }

    #[test]
    fn get_promotes() {
        let mut cache = LruCache::new(2);
        cache.put("A", 1);
        cache.put("B", 2);
        assert_eq!(cache.get("A").unwrap(), 1);
        cache.put("C", 3);
        assert!(!cache.contains("B"));
        assert!(cache.contains("A"));
        assert!(cache.contains("C"));
        assert_consistent(&cache);
    }

    #[test]
    fn get_shallow_promotes() {
        let mut cache = LruCache::new(2);
        cache.put("A", 1);
        cache.put("B", 2);
        assert_eq!(cache.get_shallow("A").unwrap(), 1);
        cache.put("C", 3);
        assert!(!cache.contains("B"));
        assert!(cache.contains("A"));
    }

    #[test]
    fn contains_does_not_promote() {
        let mut cache = LruCache::new(2);
        cache.put("A", 1);
        cache.put("B", 2);
        assert!(cache.contains("A"));
        cache.put("C", 3);
        assert!(!cache.contains("A"));
    }

    #[test]
    fn overwrite_does_not_evict() {
        let mut cache = LruCache::new(1);
        cache.put("A", "v1");
        cache.put("A", "v2");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("A").unwrap(), "v2");
        assert_consistent(&cache);
    }

    #[test]
    fn overwrite_promotes() {
        let mut cache = LruCache::new(2);
        cache.put("A", 1);
        cache.put("B", 2);
        cache.put("A", 10);
        assert_eq!(cache.keys(), keys(&["A", "B"]));
        cache.put("C", 3);
        assert!(!cache.contains("B"));
        assert_eq!(cache.get("A").unwrap(), 10);
    }

    #[test]
    fn keys_are_most_recent_first() {
        let mut cache = LruCache::new(3);
        cache.put("A", 1);
        cache.put("B", 2);
        cache.put("C", 3);
        assert_eq!(cache.keys(), keys(&["C", "B", "A"]));
        cache.get("A").unwrap();
        assert_eq!(cache.keys(), keys(&["A", "C", "B"]));
    }

    #[test]
    fn get_missing_is_not_cached() {
        let mut cache: LruCache<u8> = LruCache::new(2);
        assert!(matches!(cache.get("A"), Err(PipelineError::NotCached(_))));
    }

    #[test]
    fn zero_capacity_retains_nothing() {
        let mut cache = LruCache::new(0);
        cache.put("A", 1);
        assert!(!cache.contains("A"));
        assert!(cache.is_empty());
        assert!(cache.keys().is_empty());
        assert!(matches!(cache.get("A"), Err(PipelineError::NotCached(_))));
        assert_consistent(&cache);
    }

    #[test]
    fn remove_head_middle_tail() {
        let mut cache = LruCache::new(4);
        for (k, v) in [("A", 1), ("B", 2), ("C", 3), ("D", 4)] {
            cache.put(k, v);
        }
        // Recency: D C B A.
        cache.remove("C");
        assert_eq!(cache.keys(), keys(&["D", "B", "A"]));
        assert_consistent(&cache);

        cache.remove("D");
        assert_eq!(cache.keys(), keys(&["B", "A"]));
        assert_consistent(&cache);

        cache.remove("A");
        assert_eq!(cache.keys(), keys(&["B"]));
        assert_consistent(&cache);

        cache.remove("missing");
        assert_eq!(cache.keys(), keys(&["B"]));
    }

    #[test]
    fn removed_slot_is_reused_without_losing_links() {
        let mut cache = LruCache::new(3);
        cache.put("A", 1);
        cache.put("B", 2);
        cache.put("C", 3);
        // Removing the first arena slot moves C into it.
        cache.remove("A");
        assert_consistent(&cache);
        cache.put("D", 4);
        assert_eq!(cache.keys(), keys(&["D", "C", "B"]));
        assert_eq!(cache.get("C").unwrap(), 3);
        assert_consistent(&cache);
    }

    #[test]
    fn clear_then_reuse() {
        let mut cache = LruCache::new(2);
        cache.put("A", 1);
        cache.put("B", 2);
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.keys().is_empty());
        cache.put("C", 3);
        assert_eq!(cache.keys(), keys(&["C"]));
        assert_consistent(&cache);
    }

    #[test]
    fn get_returns_independent_copy() {
        let mut cache = LruCache::new(1);
        cache.put("A", vec![1_u8]);
        let mut copy = cache.get("A").unwrap();
        copy.push(2);
        assert_eq!(cache.get("A").unwrap(), vec![1]);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Put(u8, u32),
        Get(u8),
        Remove(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0_u8..8, any::<u32>()).prop_map(|(k, v)| Op::Put(k, v)),
            (0_u8..8).prop_map(Op::Get),
            (0_u8..8).prop_map(Op::Remove),
        ]
    }

    proptest! {
        /// Compare against a straightforward vector model (front = most
        /// recent) after every operation.
        #[test]
        fn matches_reference_model(
            capacity in 0_usize..5,
            ops in proptest::collection::vec(op(), 0..64),
        ) {
            let mut cache = LruCache::new(capacity);
            let mut model: Vec<(String, u32)> = Vec::new();

            for op in ops {
                match op {
                    Op::Put(k, v) => {
                        let key = k.to_string();
                        cache.put(&key, v);
                        if let Some(pos) = model.iter().position(|(mk, _)| *mk == key) {
                            model.remove(pos);
                            model.insert(0, (key, v));
                        } else if capacity > 0 {
                            if model.len() == capacity {
                                model.pop();
                            }
                            model.insert(0, (key, v));
                        }
                    }
                    Op::Get(k) => {
                        let key = k.to_string();
                        let got = cache.get(&key).ok();
                        let expected = model
                            .iter()
                            .position(|(mk, _)| *mk == key)
                            .map(|pos| {
                                let entry = model.remove(pos);
                                let value = entry.1;
                                model.insert(0, entry);
                                value
                            });
                        prop_assert_eq!(got, expected);
                    }
                    Op::Remove(k) => {
                        let key = k.to_string();
                        cache.remove(&key);
                        model.retain(|(mk, _)| *mk != key);
                    }
                }

                prop_assert!(cache.len() <= capacity);
                let expected_keys: Vec<String> = model.iter().map(|(k, _)| k.clone()).collect();
                prop_assert_eq!(cache.keys(), expected_keys);
                assert_consistent(&cache);
            }
        }
    }
}
