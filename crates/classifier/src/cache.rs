use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

/// Bounded TTL cache keyed by fingerprint. Values are whole validated
/// objects; partial entries are never stored.
pub struct TtlCache<T: Clone> {
    ttl: Duration,
    capacity: usize,
    inner: Mutex<CacheState<T>>,
}

struct CacheState<T> {
    entries: HashMap<String, (Instant, T)>,
    order: VecDeque<String>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            inner: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        let mut state = self.inner.lock();
        match state.entries.get(key) {
            Some((expires_at, value)) if *expires_at > Instant::now() => Some(value.clone()),
            Some(_) => {
                state.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: String, value: T) {
        let mut state = self.inner.lock();
        while state.entries.len() >= self.capacity {
            match state.order.pop_front() {
                Some(oldest) => {
                    state.entries.remove(&oldest);
                }
                None => break,
            }
        }
        if state.entries.insert(key.clone(), (Instant::now() + self.ttl, value)).is_none() {
            state.order.push_back(key);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// sha256 over `‖`-joined parts, hex-encoded.
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (index, part) in parts.iter().enumerate() {
        if index > 0 {
            hasher.update([0x1f]);
        }
        hasher.update(part.as_bytes());
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_inserted_value_within_ttl() {
        let cache = TtlCache::new(Duration::from_secs(60), 8);
        cache.insert("key".to_string(), 41_u32);
        assert_eq!(cache.get("key"), Some(41));
        assert_eq!(cache.get("other"), None);
    }

    #[test]
    fn expired_entries_are_dropped() {
        let cache = TtlCache::new(Duration::from_millis(0), 8);
        cache.insert("key".to_string(), 1_u32);
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(cache.get("key"), None);
    }

    #[test]
    fn capacity_evicts_the_oldest_entry() {
        let cache = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert("a".to_string(), 1_u32);
        cache.insert("b".to_string(), 2);
        cache.insert("c".to_string(), 3);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn fingerprint_is_stable_and_order_sensitive() {
        let one = fingerprint(&["hair spray", "en", "ICN-LAX"]);
        let two = fingerprint(&["hair spray", "en", "ICN-LAX"]);
        let three = fingerprint(&["en", "hair spray", "ICN-LAX"]);
        assert_eq!(one, two);
        assert_ne!(one, three);
        assert_eq!(one.len(), 64);
    }
}
