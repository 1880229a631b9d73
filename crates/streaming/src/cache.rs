use std::cell::Cell;
use std::collections::BTreeMap;

use bytes::Bytes;

use crate::request::ImageryKey;

pub const DEFAULT_MAX_ENTRIES: usize = 50;

/// Encoded image bytes as delivered by the imagery server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

impl Image {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Which entry makes room when the cache is full.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Oldest insertion goes first; reads do not matter.
    #[default]
    Fifo,
    /// Least recently read or written goes first.
    Lru,
}

impl EvictionPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fifo" => Some(Self::Fifo),
            "lru" => Some(Self::Lru),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub count: usize,
    pub estimated_bytes: usize,
    pub evictions: u64,
}

#[derive(Debug)]
struct CacheEntry {
    image: Image,
    inserted_tick: u64,
    last_used_tick: Cell<u64>,
}

/// Process-lifetime imagery cache bounded by entry count.
///
/// Notes on determinism:
/// - Entries are keyed in a `BTreeMap` for stable traversal order.
/// - The victim is the entry with the smallest insertion tick (FIFO) or
///   last-use tick (LRU); ticks are unique so there are no ties.
///
/// `get` is a lookup only: a miss changes nothing, and under FIFO a hit
/// changes nothing either. Fetching on a miss is the caller's job.
#[derive(Debug)]
pub struct ImageryCache {
    max_entries: usize,
    policy: EvictionPolicy,
    clock: Cell<u64>,
    used_bytes: usize,
    evictions: u64,
    entries: BTreeMap<ImageryKey, CacheEntry>,
}

impl Default for ImageryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl ImageryCache {
    /// FIFO cache holding at most `max_entries` images (at least one).
    pub fn new(max_entries: usize) -> Self {
        Self::with_policy(max_entries, EvictionPolicy::Fifo)
    }

    pub fn with_policy(max_entries: usize, policy: EvictionPolicy) -> Self {
        Self {
            max_entries: max_entries.max(1),
            policy,
            clock: Cell::new(0),
            used_bytes: 0,
            evictions: 0,
            entries: BTreeMap::new(),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &ImageryKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &ImageryKey) -> Option<&Image> {
        let entry = self.entries.get(key)?;
        if self.policy == EvictionPolicy::Lru {
            entry.last_used_tick.set(self.tick());
        }
        Some(&entry.image)
    }

    /// Stores `image` under `key`.
    ///
    /// Overwriting an existing key keeps its original insertion position.
    /// Returns the key evicted to make room, if any.
    pub fn put(&mut self, key: ImageryKey, image: Image) -> Option<ImageryKey> {
        let now = self.tick();

        if let Some(entry) = self.entries.get_mut(&key) {
            self.used_bytes = self.used_bytes - entry.image.len() + image.len();
            entry.image = image;
            entry.last_used_tick.set(now);
            return None;
        }

        let evicted = if self.entries.len() >= self.max_entries {
            self.evict_one()
        } else {
            None
        };

        self.used_bytes += image.len();
        self.entries.insert(
            key,
            CacheEntry {
                image,
                inserted_tick: now,
                last_used_tick: Cell::new(now),
            },
        );
        evicted
    }

    pub fn remove(&mut self, key: &ImageryKey) -> Option<Image> {
        let entry = self.entries.remove(key)?;
        self.used_bytes -= entry.image.len();
        Some(entry.image)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.used_bytes = 0;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            count: self.entries.len(),
            estimated_bytes: self.used_bytes,
            evictions: self.evictions,
        }
    }

    fn tick(&self) -> u64 {
        let t = self.clock.get() + 1;
        self.clock.set(t);
        t
    }

    fn evict_one(&mut self) -> Option<ImageryKey> {
        let policy = self.policy;
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, e)| match policy {
                EvictionPolicy::Fifo => e.inserted_tick,
                EvictionPolicy::Lru => e.last_used_tick.get(),
            })
            .map(|(k, _)| k.clone())?;

        self.remove(&victim);
        self.evictions += 1;
        tracing::debug!(
            recording = %victim.recording_id,
            item = %victim.item_id,
            "imagery cache evicted entry"
        );
        Some(victim)
    }
}
