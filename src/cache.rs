use crate::Errors;
use anyhow::Result;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;

/// Bounded key-value store with first-in-first-out eviction.
///
/// The eviction order is the order in which keys were first inserted: overwriting the value
/// of a present key keeps its position and reads do not refresh it.
///
pub struct FifoCache<K, V> {
    capacity: usize,
    entries: HashMap<K, V>,
    order: VecDeque<K>,
}

impl<K, V> FifoCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Creates the cache with `capacity` slots, a zero capacity is rejected
    ///
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Errors::InvalidCacheCapacity(capacity).into());
        }
        Ok(Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
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

    /// Stored value, reading never changes the eviction order
    ///
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Stores `value` under `key`.
    ///
    /// A present key is updated in place. A new key is appended to the insertion order, and
    /// if the capacity is exceeded the oldest key is evicted and returned with its value.
    ///
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(slot) = self.entries.get_mut(&key) {
            *slot = value;
            return None;
        }
        self.entries.insert(key.clone(), value);
        self.order.push_back(key);
        if self.order.len() > self.capacity {
            let oldest = self.order.pop_front()?;
            return self.entries.remove(&oldest).map(|v| (oldest, v));
        }
        None
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Entries from the oldest to the newest insertion
    ///
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.order
            .iter()
            .filter_map(|k| self.entries.get(k).map(|v| (k, v)))
    }
}

impl<K, V> fmt::Debug for FifoCache<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FifoCache")
            .field("capacity", &self.capacity)
            .field("entries", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::cache::FifoCache;
    use anyhow::Result;

    #[test]
    fn zero_capacity_rejected() {
        assert!(FifoCache::<u64, u64>::new(0).is_err());
    }

    #[test]
    fn miss_is_none() -> Result<()> {
        let c = FifoCache::<u64, &str>::new(2)?;
        assert_eq!(c.get(&7), None);
        assert!(c.is_empty());
        Ok(())
    }

    #[test]
    fn evicts_in_insertion_order() -> Result<()> {
        let mut c = FifoCache::new(2)?;
        assert_eq!(c.put("A", 1), None);
        assert_eq!(c.put("B", 2), None);
        assert_eq!(c.put("C", 3), Some(("A", 1)));
        assert_eq!(c.get(&"A"), None);
        assert_eq!(c.get(&"B"), Some(&2));
        assert_eq!(c.get(&"C"), Some(&3));
        Ok(())
    }

    #[test]
    fn update_keeps_position() -> Result<()> {
        let mut c = FifoCache::new(2)?;
        c.put("A", 1);
        c.put("B", 2);
        c.put("C", 3);
        // B keeps its slot, so it is still the oldest
        assert_eq!(c.put("B", 20), None);
        assert_eq!(c.get(&"B"), Some(&20));
        assert_eq!(c.put("D", 4), Some(("B", 20)));
        assert_eq!(c.get(&"B"), None);
        assert_eq!(c.get(&"C"), Some(&3));
        assert_eq!(c.get(&"D"), Some(&4));
        assert_eq!(c.len(), 2);
        Ok(())
    }

    #[test]
    fn reads_do_not_refresh() -> Result<()> {
        let mut c = FifoCache::new(2)?;
        c.put(1u64, "a");
        c.put(2u64, "b");
        assert_eq!(c.get(&1), Some(&"a"));
        c.put(3u64, "c");
        assert!(!c.contains(&1));
        assert_eq!(
            c.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
            vec![2u64, 3u64]
        );
        Ok(())
    }

    #[test]
    fn never_exceeds_capacity() -> Result<()> {
        let mut c = FifoCache::new(3)?;
        for i in 0..100u64 {
            c.put(i % 7, i);
            assert!(c.len() <= 3);
        }
        c.clear();
        assert!(c.is_empty());
        Ok(())
    }
}
