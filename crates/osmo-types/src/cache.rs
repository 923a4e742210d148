//! Bounded, mutex-protected LRU cache (spec §5 "In-memory caches ... size-bounded;
//! eviction is oldest-first on insertion overflow"). Backs the pool-config,
//! decrypted-credential, and image-digest read-through caches described in §9 —
//! none of which are authoritative, so a plain `get`/`set` pair is enough.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::hash::Hash;
use std::{collections::HashMap, sync::Arc};

struct Inner<K, V> {
    map: HashMap<K, V>,
    order: VecDeque<K>,
    capacity: usize,
}

/// A least-recently-used cache with a fixed capacity. Cloneable; the clone
/// shares the same backing store (mirrors the teacher's `Arc<Mutex<_>>` caches).
pub struct LruCache<K, V> {
    inner: Arc<Mutex<Inner<K, V>>>,
}

impl<K, V> Clone for LruCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
                capacity,
            })),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        if let Some(value) = inner.map.get(key).cloned() {
            inner.order.retain(|k| k != key);
            inner.order.push_back(key.clone());
            Some(value)
        } else {
            None
        }
    }

    pub fn set(&self, key: K, value: V) {
        let mut inner = self.inner.lock();
        if inner.map.contains_key(&key) {
            inner.order.retain(|k| k != &key);
        } else if inner.map.len() >= inner.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.map.remove(&oldest);
            }
        }
        inner.order.push_back(key.clone());
        inner.map.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
