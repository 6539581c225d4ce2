//! Fixed-capacity LRU map.
//!
//! Entries live in a `Vec` arena; recency is an intrusive doubly linked list
//! of arena indices, so `get`, `put` and `pop` are `O(1)` amortized and the
//! map never allocates past its capacity.
//!
//! Not synchronized. The client cache wraps it in a mutex.

use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroUsize;

struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// LRU map promoting on `get` and `put`; `peek` leaves order alone.
pub struct LruMap<K, V> {
    capacity: NonZeroUsize,
    index: HashMap<K, usize>,
    nodes: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K, V> LruMap<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            index: HashMap::with_capacity(capacity.get()),
            nodes: Vec::with_capacity(capacity.get()),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    pub fn cap(&self) -> usize {
        self.capacity.get()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Look up `key` and mark it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let &slot = self.index.get(key)?;
        self.promote(slot);
        self.nodes[slot].as_ref().map(|node| &node.value)
    }

    pub fn peek(&self, key: &K) -> Option<&V> {
        let &slot = self.index.get(key)?;
        self.nodes[slot].as_ref().map(|node| &node.value)
    }

    /// Insert or replace `key`, making it most recently used.
    ///
    /// Returns the displaced entry: the previous value for `key`, or the
    /// least recently used entry when the map was full.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&slot) = self.index.get(&key) {
            self.promote(slot);
            let node = self.nodes[slot].as_mut()?;
            let previous = std::mem::replace(&mut node.value, value);
            return Some((key, previous));
        }

        let evicted = if self.len() == self.cap() {
            self.pop_lru()
        } else {
            None
        };

        let node = Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.attach_front(slot);
        self.index.insert(key, slot);
        evicted
    }

    pub fn pop(&mut self, key: &K) -> Option<V> {
        let slot = self.index.remove(key)?;
        self.detach(slot);
        let node = self.nodes[slot].take()?;
        self.free.push(slot);
        Some(node.value)
    }

    /// Remove and return the least recently used entry.
    pub fn pop_lru(&mut self) -> Option<(K, V)> {
        let slot = self.tail?;
        self.detach(slot);
        let node = self.nodes[slot].take()?;
        self.index.remove(&node.key);
        self.free.push(slot);
        Some((node.key, node.value))
    }

    /// Remove every entry, returning them from most to least recently used.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut entries = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            match self.nodes[slot].take() {
                Some(node) => {
                    cursor = node.next;
                    entries.push((node.key, node.value));
                }
                None => break,
            }
        }
        self.index.clear();
        self.nodes.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        entries
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<&K> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(node) = cursor.and_then(|slot| self.nodes[slot].as_ref()) {
            keys.push(&node.key);
            cursor = node.next;
        }
        keys
    }

    fn promote(&mut self, slot: usize) {
        if self.head == Some(slot) {
            return;
        }
        self.detach(slot);
        self.attach_front(slot);
    }

    fn detach(&mut self, slot: usize) {
        let (prev, next) = match self.nodes[slot].as_ref() {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(node) = self.nodes[p].as_mut() {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.nodes[n].as_mut() {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = self.nodes[slot].as_mut() {
            node.prev = None;
            node.next = None;
        }
    }

    fn attach_front(&mut self, slot: usize) {
        let old_head = self.head;
        if let Some(node) = self.nodes[slot].as_mut() {
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(node) = self.nodes[h].as_mut() {
                node.prev = Some(slot);
            }
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(cap: usize) -> LruMap<&'static str, u32> {
        LruMap::new(NonZeroUsize::new(cap).unwrap())
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut lru = map(2);
        assert!(lru.put("a", 1).is_none());
        assert!(lru.put("b", 2).is_none());
        assert_eq!(lru.get(&"a"), Some(&1));

        assert_eq!(lru.put("c", 3), Some(("b", 2)));
        assert_eq!(lru.len(), 2);
        assert!(!lru.contains(&"b"));
        assert_eq!(lru.keys(), vec![&"c", &"a"]);
    }

    #[test]
    fn test_put_existing_replaces_and_promotes() {
        let mut lru = map(2);
        lru.put("a", 1);
        lru.put("b", 2);
        assert_eq!(lru.put("a", 10), Some(("a", 1)));
        assert_eq!(lru.keys(), vec![&"a", &"b"]);
        assert_eq!(lru.put("c", 3), Some(("b", 2)));
    }

    #[test]
    fn test_peek_does_not_promote() {
        let mut lru = map(2);
        lru.put("a", 1);
        lru.put("b", 2);
        assert_eq!(lru.peek(&"a"), Some(&1));
        assert_eq!(lru.put("c", 3), Some(("a", 1)));
    }

    #[test]
    fn test_pop_reuses_slots() {
        let mut lru = map(3);
        lru.put("a", 1);
        lru.put("b", 2);
        assert_eq!(lru.pop(&"a"), Some(1));
        assert_eq!(lru.pop(&"a"), None);
        lru.put("c", 3);
        lru.put("d", 4);
        assert_eq!(lru.len(), 3);
        assert_eq!(lru.keys(), vec![&"d", &"c", &"b"]);
        assert_eq!(lru.pop_lru(), Some(("b", 2)));
    }

    #[test]
    fn test_drain_empties_in_recency_order() {
        let mut lru = map(3);
        lru.put("a", 1);
        lru.put("b", 2);
        lru.get(&"a");
        assert_eq!(lru.drain(), vec![("a", 1), ("b", 2)]);
        assert!(lru.is_empty());
        lru.put("z", 9);
        assert_eq!(lru.keys(), vec![&"z"]);
    }

    #[test]
    fn test_len_never_exceeds_capacity() {
        let mut lru: LruMap<u32, u32> = LruMap::new(NonZeroUsize::new(10).unwrap());
        for i in 0..1000 {
            lru.put(i % 37, i);
            if i % 3 == 0 {
                lru.get(&(i % 11));
            }
            assert!(lru.len() <= 10);
        }
    }
}
