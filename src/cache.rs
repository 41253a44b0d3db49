//! Direct-mapped memoization cache.
//!
//! All memo tables of the engine (scalar arithmetic, magnitudes, the per-kind
//! compute tables) are instances of [`Cache`]: a fixed array of `2^bits` slots
//! where each key hashes (via [`MyHash`]) to exactly one slot. A colliding
//! insert overwrites the previous entry, so memory stays bounded no matter how
//! many operations run between two collections. Losing an entry only costs a
//! recomputation.
//!
//! The full key is stored next to the value and compared on lookup, so a
//! colliding key is a miss (counted as a *fault*), never a wrong answer.
//!
//! Hits and misses are counted for [`EngineStats`][crate::engine::EngineStats].

use crate::utils::MyHash;

/// Hit/miss counters of a single cache.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    /// Misses on a slot occupied by another key.
    pub faults: usize,
    pub entries: usize,
}

impl CacheStats {
    /// Fraction of lookups that hit, or `0.0` before the first lookup.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct Cache<K, V> {
    entries: Vec<Option<(K, V)>>,
    bitmask: u64,
    occupied: usize,
    hits: usize,
    misses: usize,
    faults: usize,
}

impl<K, V> Default for Cache<K, V> {
    fn default() -> Self {
        Self::new(14)
    }
}

impl<K, V> Cache<K, V> {
    /// Creates a cache with `2^bits` slots.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Cache bits must be in range 0..=31, got {}", bits);

        let size = 1usize << bits;
        Self {
            entries: (0..size).map(|_| None).collect(),
            bitmask: (size - 1) as u64,
            occupied: 0,
            hits: 0,
            misses: 0,
            faults: 0,
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }

    pub fn faults(&self) -> usize {
        self.faults
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            faults: self.faults,
            entries: self.occupied,
        }
    }

    /// Drops every entry. Counters are kept.
    pub fn clear(&mut self) {
        if self.occupied == 0 {
            return;
        }
        for entry in self.entries.iter_mut() {
            *entry = None;
        }
        self.occupied = 0;
    }
}

impl<K: MyHash, V> Cache<K, V> {
    #[inline]
    fn index(&self, key: &K) -> usize {
        (key.hash() & self.bitmask) as usize
    }
}

impl<K, V> Cache<K, V>
where
    K: MyHash + Eq,
    V: Copy,
{
    #[inline]
    pub fn get(&mut self, key: &K) -> Option<V> {
        let idx = self.index(key);
        match &self.entries[idx] {
            Some((k, v)) if k == key => {
                self.hits += 1;
                Some(*v)
            }
            Some(_) => {
                self.faults += 1;
                self.misses += 1;
                None
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Stores `value` under `key`, evicting whatever occupied its slot.
    #[inline]
    pub fn insert(&mut self, key: K, value: V) {
        let idx = self.index(&key);
        let slot = &mut self.entries[idx];
        if slot.is_none() {
            self.occupied += 1;
        }
        *slot = Some((key, value));
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_cache_basic() {
        let mut cache = Cache::<(u64, u64), i32>::new(4);

        cache.insert((1, 2), 42);
        assert_eq!(cache.get(&(1, 2)), Some(42));
        cache.insert((3, 4), 99);
        assert_eq!(cache.get(&(3, 4)), Some(99));

        assert_eq!(cache.hits(), 2);
        assert_eq!(cache.misses(), 0);
        assert!(cache.len() >= 1 && cache.len() <= 2);
    }

    #[test]
    fn test_cache_clear_keeps_counters() {
        let mut cache = Cache::<(u64, u64), i32>::new(4);

        cache.insert((1, 2), 42);
        assert_eq!(cache.get(&(1, 2)), Some(42));

        cache.clear();
        assert_eq!(cache.get(&(1, 2)), None);
        assert!(cache.is_empty());
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                faults: 0,
                entries: 0
            }
        );
    }

    #[test]
    fn test_cache_is_bounded() {
        let mut cache = Cache::<u64, u64>::new(6);
        assert_eq!(cache.capacity(), 64);

        for k in 0..10_000u64 {
            cache.insert(k, k * 2);
        }
        assert!(cache.len() <= 64);

        // The latest key always survives, and nothing answers for a wrong key.
        assert_eq!(cache.get(&9_999), Some(19_998));
        for k in 0..10_000u64 {
            if let Some(v) = cache.get(&k) {
                assert_eq!(v, k * 2);
            }
        }
        assert!(cache.faults() > 0);
    }

    #[test]
    fn test_cache_collision_overwrites() {
        let mut cache = Cache::<u64, u64>::new(0);
        cache.insert(1, 10);
        cache.insert(2, 20);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(20));
        assert_eq!(cache.faults(), 1);
    }
}
