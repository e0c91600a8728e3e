//! In-process fallback tier. A hand-rolled bounded map backed by a small
//! `VecDeque` rather than pulling in an LRU crate.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

pub struct MemoryCache {
    max_keys: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    map: HashMap<String, Entry>,
    insertion_order: VecDeque<String>,
}

impl MemoryCache {
    pub fn new(max_keys: usize) -> Self {
        Self {
            max_keys,
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                insertion_order: VecDeque::new(),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        match inner.map.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                inner.map.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: String, value: Vec<u8>, ttl: Duration) {
        let mut inner = self.inner.lock();
        if !inner.map.contains_key(&key) {
            inner.insertion_order.push_back(key.clone());
        }
        inner.map.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );

        while inner.map.len() > self.max_keys {
            if let Some(oldest) = inner.insertion_order.pop_front() {
                inner.map.remove(&oldest);
            } else {
                break;
            }
        }
    }

    pub fn del(&self, key: &str) {
        let mut inner = self.inner.lock();
        inner.map.remove(key);
        inner.insertion_order.retain(|k| k != key);
    }

    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.insertion_order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_roundtrips() {
        let cache = MemoryCache::new(10);
        cache.set("k".into(), b"v".to_vec(), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some(b"v".to_vec()));
    }

    #[test]
    fn expired_entry_returns_none() {
        let cache = MemoryCache::new(10);
        cache.set("k".into(), b"v".to_vec(), Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn del_removes_entry() {
        let cache = MemoryCache::new(10);
        cache.set("k".into(), b"v".to_vec(), Duration::from_secs(60));
        cache.del("k");
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn eviction_drops_oldest_past_cap() {
        let cache = MemoryCache::new(2);
        cache.set("a".into(), b"1".to_vec(), Duration::from_secs(60));
        cache.set("b".into(), b"2".to_vec(), Duration::from_secs(60));
        cache.set("c".into(), b"3".to_vec(), Duration::from_secs(60));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("c"), Some(b"3".to_vec()));
    }
}
