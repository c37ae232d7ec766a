use std::collections::{BTreeMap, BTreeSet, VecDeque};

use foundation::FrameIndex;

use crate::levels::ChunkKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    AlreadyLoaded(ChunkKey),
    AlreadyInFlight(ChunkKey),
    NotInFlight(ChunkKey),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::AlreadyLoaded(key) => write!(f, "chunk {key} is already loaded"),
            CacheError::AlreadyInFlight(key) => write!(f, "chunk {key} is already being fetched"),
            CacheError::NotInFlight(key) => write!(f, "chunk {key} is not being fetched"),
        }
    }
}

impl std::error::Error for CacheError {}

#[derive(Debug, Clone, Default)]
struct LevelBook {
    /// Oldest first.
    loaded: VecDeque<FrameIndex>,
    in_flight: BTreeSet<FrameIndex>,
}

/// Per-modulo bookkeeping of which chunks are loaded or being fetched.
///
/// Only chunk keys live here; decoded frames are held by `FrameStore`.
/// Levels are kept in a `BTreeMap` so traversal order is stable.
#[derive(Debug, Clone)]
pub struct ChunkCache {
    capacity: usize,
    books: BTreeMap<u32, LevelBook>,
}

impl ChunkCache {
    /// `capacity` is per modulo and at least 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            books: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_loaded(&self, key: ChunkKey) -> bool {
        self.books
            .get(&key.modulo)
            .is_some_and(|b| b.loaded.contains(&key.start))
    }

    pub fn is_in_flight(&self, key: ChunkKey) -> bool {
        self.books
            .get(&key.modulo)
            .is_some_and(|b| b.in_flight.contains(&key.start))
    }

    /// Loaded or in flight: either way it must not be requested again.
    pub fn contains(&self, key: ChunkKey) -> bool {
        self.is_loaded(key) || self.is_in_flight(key)
    }

    /// Marks `key` as in flight. Must happen before its fetch is issued.
    pub fn begin_fetch(&mut self, key: ChunkKey) -> Result<(), CacheError> {
        let book = self.books.entry(key.modulo).or_default();
        if book.loaded.contains(&key.start) {
            return Err(CacheError::AlreadyLoaded(key));
        }
        if !book.in_flight.insert(key.start) {
            return Err(CacheError::AlreadyInFlight(key));
        }
        Ok(())
    }

    /// Moves `key` from in flight to the tail of the loaded list, evicting
    /// from the head (least recently added) past capacity. Returns the evicted keys.
    pub fn complete_fetch(&mut self, key: ChunkKey) -> Result<Vec<ChunkKey>, CacheError> {
        let capacity = self.capacity;
        let book = self
            .books
            .get_mut(&key.modulo)
            .ok_or(CacheError::NotInFlight(key))?;
        if !book.in_flight.remove(&key.start) {
            return Err(CacheError::NotInFlight(key));
        }
        book.loaded.push_back(key.start);

        let mut evicted = Vec::new();
        while book.loaded.len() > capacity {
            let Some(start) = book.loaded.pop_front() else {
                break;
            };
            evicted.push(ChunkKey::new(key.modulo, start));
        }
        Ok(evicted)
    }

    /// Clears the in-flight mark after a failed fetch so a later pass can retry.
    pub fn fail_fetch(&mut self, key: ChunkKey) -> Result<(), CacheError> {
        let removed = self
            .books
            .get_mut(&key.modulo)
            .is_some_and(|b| b.in_flight.remove(&key.start));
        if removed {
            Ok(())
        } else {
            Err(CacheError::NotInFlight(key))
        }
    }

    /// Loaded chunk starts for `modulo`, oldest first.
    pub fn loaded(&self, modulo: u32) -> Vec<FrameIndex> {
        self.books
            .get(&modulo)
            .map(|b| b.loaded.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn loaded_len(&self, modulo: u32) -> usize {
        self.books.get(&modulo).map_or(0, |b| b.loaded.len())
    }

    pub fn loaded_keys(&self) -> Vec<ChunkKey> {
        self.books
            .iter()
            .flat_map(|(modulo, b)| b.loaded.iter().map(|s| ChunkKey::new(*modulo, *s)))
            .collect()
    }

    pub fn in_flight_len(&self) -> usize {
        self.books.values().map(|b| b.in_flight.len()).sum()
    }

    pub fn clear(&mut self) {
        self.books.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheError, ChunkCache};
    use crate::levels::ChunkKey;

    fn load(cache: &mut ChunkCache, key: ChunkKey) -> Vec<ChunkKey> {
        cache.begin_fetch(key).unwrap();
        cache.complete_fetch(key).unwrap()
    }

    #[test]
    fn eviction_removes_least_recently_added() {
        let mut cache = ChunkCache::new(3);
        for start in [0, 1024, 2048] {
            assert!(load(&mut cache, ChunkKey::new(32, start)).is_empty());
        }
        assert_eq!(load(&mut cache, ChunkKey::new(32, 4096)), vec![ChunkKey::new(32, 0)]);
        assert_eq!(load(&mut cache, ChunkKey::new(32, 0)), vec![ChunkKey::new(32, 1024)]);
        assert_eq!(cache.loaded(32), vec![2048, 4096, 0]);
    }

    #[test]
    fn length_never_exceeds_capacity() {
        let mut cache = ChunkCache::new(5);
        let mut order = Vec::new();
        for i in 0..40u32 {
            // Revisit some chunks so keys come back after being evicted.
            let start = (i * 7 % 13) * 32;
            let key = ChunkKey::new(1, start);
            if cache.contains(key) {
                continue;
            }
            let evicted = load(&mut cache, key);
            order.push(start);
            assert!(cache.loaded_len(1) <= 5);
            if let Some(first) = evicted.first() {
                assert_eq!(evicted.len(), 1);
                // Oldest surviving insertion is the one evicted.
                let live: Vec<_> = order.iter().rev().take(6).rev().copied().collect();
                assert_eq!(first.start, live[0]);
            }
        }
    }

    #[test]
    fn levels_are_independent() {
        let mut cache = ChunkCache::new(1);
        load(&mut cache, ChunkKey::new(32, 0));
        load(&mut cache, ChunkKey::new(1, 0));
        assert!(cache.is_loaded(ChunkKey::new(32, 0)));
        assert!(cache.is_loaded(ChunkKey::new(1, 0)));
    }

    #[test]
    fn in_flight_blocks_duplicates() {
        let mut cache = ChunkCache::new(5);
        let key = ChunkKey::new(8, 256);
        cache.begin_fetch(key).unwrap();
        assert_eq!(cache.begin_fetch(key), Err(CacheError::AlreadyInFlight(key)));
        assert!(cache.contains(key));
        cache.complete_fetch(key).unwrap();
        assert_eq!(cache.begin_fetch(key), Err(CacheError::AlreadyLoaded(key)));
        assert_eq!(cache.in_flight_len(), 0);
    }

    #[test]
    fn failure_makes_key_retryable() {
        let mut cache = ChunkCache::new(5);
        let key = ChunkKey::new(2, 64);
        cache.begin_fetch(key).unwrap();
        cache.fail_fetch(key).unwrap();
        assert!(!cache.contains(key));
        assert!(cache.begin_fetch(key).is_ok());
        assert_eq!(cache.fail_fetch(ChunkKey::new(2, 0)), Err(CacheError::NotInFlight(ChunkKey::new(2, 0))));
    }

    #[test]
    fn completion_without_begin_is_rejected() {
        let mut cache = ChunkCache::new(5);
        let key = ChunkKey::new(1, 0);
        assert_eq!(cache.complete_fetch(key), Err(CacheError::NotInFlight(key)));
    }

    #[test]
    fn eviction_follows_completion_order_not_start_order() {
        let mut cache = ChunkCache::new(2);
        load(&mut cache, ChunkKey::new(1, 64));
        load(&mut cache, ChunkKey::new(1, 0));
        assert_eq!(load(&mut cache, ChunkKey::new(1, 32)), vec![ChunkKey::new(1, 64)]);
        assert_eq!(load(&mut cache, ChunkKey::new(1, 96)), vec![ChunkKey::new(1, 0)]);
        assert_eq!(cache.loaded(1), vec![32, 96]);
    }

    #[test]
    fn clear_drops_loaded_and_in_flight() {
        let mut cache = ChunkCache::new(5);
        load(&mut cache, ChunkKey::new(1, 0));
        load(&mut cache, ChunkKey::new(1, 32));
        cache.begin_fetch(ChunkKey::new(1, 64)).unwrap();
        cache.clear();
        assert!(cache.loaded_keys().is_empty());
        assert_eq!(cache.in_flight_len(), 0);
    }
}
