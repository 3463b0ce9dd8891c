use std::{collections::HashMap, hash::Hash};

struct Entry {
    size: u64,
    last_access: u64,
}

/// Byte-budgeted least-recently-used bookkeeping. Holds sizes, not data.
pub struct LruIndex<K> {
    entries: HashMap<K, Entry>,
    tick: u64,
    used: u64,
    max_bytes: u64,
}

impl<K: Eq + Hash + Clone> LruIndex<K> {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            entries: HashMap::new(),
            tick: 0,
            used: 0,
            max_bytes,
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn used_bytes(&self) -> u64 {
        self.used
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Marks `key` as most recently used. Returns whether it is tracked.
    pub fn touch(&mut self, key: &K) -> bool {
        self.tick += 1;
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_access = self.tick;
                true
            }
            None => false,
        }
    }

    /// Tracks `key` as most recently used and returns the keys evicted to make
    /// room, oldest first. `None` when `size` alone exceeds the budget.
    pub fn insert(&mut self, key: K, size: u64) -> Option<Vec<K>> {
        if size > self.max_bytes {
            return None;
        }
        self.remove(&key);

        let mut evicted = Vec::new();
        while self.used + size > self.max_bytes {
            let Some(oldest) = self.oldest() else {
                break;
            };
            self.remove(&oldest);
            evicted.push(oldest);
        }

        self.tick += 1;
        self.used += size;
        self.entries.insert(
            key,
            Entry {
                size,
                last_access: self.tick,
            },
        );
        Some(evicted)
    }

    pub fn remove(&mut self, key: &K) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.used -= entry.size;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.used = 0;
    }

    fn oldest(&self) -> Option<K> {
        self.entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| key.clone())
    }
}
