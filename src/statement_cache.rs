//! Per-session LRU cache of server-side prepared statements.
//!
//! Statement handles are session-scoped in every networked backend, so
//! each worker's database session owns its own cache. Entries are keyed
//! by the exact SQL text: a 32-bit FNV-1a hash narrows the scan and a
//! full string compare confirms the hit, so two different queries can
//! never collide. Type information is carried in the SQL text itself via
//! explicit casts, which keeps it part of the key.
//!
//! Capacity is fixed at session creation and the table is scanned
//! linearly; capacities are tiny in practice.

use tracing::warn;

/// Upper bound on the cache capacity. There are nowhere near this many
/// distinct queries; the cap just bounds the generated statement names.
pub const MAX_CACHED_STATEMENTS: usize = 9999;

/// FNV-1a, 32 bits.
#[must_use]
pub fn hash_sql_text(text: &str) -> u32 {
    let mut hash: u32 = 0x811C_9DC5;
    for byte in text.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

struct CachedStatement<S> {
    name: String,
    last_used: u64,
    hash: u32,
    text: String,
    handle: S,
}

/// Outcome of a cache lookup: either a hit, or the slot to fill after the
/// caller has prepared the statement server-side.
pub enum CacheSlot {
    Hit(usize),
    Miss { evict: usize },
}

pub struct StatementCache<S> {
    entries: Vec<Option<CachedStatement<S>>>,
    clock: u64,
}

impl<S> StatementCache<S> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut capacity = capacity.max(1);
        if capacity > MAX_CACHED_STATEMENTS {
            warn!(
                "clamping statement cache capacity {capacity} to the \
                 {MAX_CACHED_STATEMENTS} ceiling"
            );
            capacity = MAX_CACHED_STATEMENTS;
        }

        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, || None);
        Self { entries, clock: 0 }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Single linear scan: returns the hit slot, or the LRU slot to evict.
    #[must_use]
    pub fn lookup(&mut self, text: &str) -> CacheSlot {
        let hash = hash_sql_text(text);
        let mut hit = None;
        let mut lru_index = 0;
        let mut lru_stamp = u64::MAX;

        for (index, slot) in self.entries.iter().enumerate() {
            match slot {
                Some(entry) => {
                    if entry.hash == hash && entry.text == text {
                        hit = Some(index);
                        break;
                    }
                    if entry.last_used < lru_stamp {
                        lru_stamp = entry.last_used;
                        lru_index = index;
                    }
                }
                None => {
                    // An empty slot always wins over evicting a live entry.
                    if lru_stamp != 0 {
                        lru_stamp = 0;
                        lru_index = index;
                    }
                }
            }
        }

        match hit {
            Some(index) => {
                let stamp = self.tick();
                if let Some(entry) = self.entries[index].as_mut() {
                    entry.last_used = stamp;
                }
                CacheSlot::Hit(index)
            }
            None => CacheSlot::Miss { evict: lru_index },
        }
    }

    /// Handle stored in a slot previously returned by [`lookup`].
    ///
    /// [`lookup`]: StatementCache::lookup
    #[must_use]
    pub fn handle(&self, index: usize) -> Option<&S> {
        self.entries.get(index)?.as_ref().map(|entry| &entry.handle)
    }

    #[must_use]
    pub fn name(&self, index: usize) -> Option<&str> {
        self.entries
            .get(index)?
            .as_ref()
            .map(|entry| entry.name.as_str())
    }

    /// Fill a slot with a freshly prepared statement, returning the evicted
    /// handle (if any) so the caller can close it server-side.
    pub fn store(&mut self, index: usize, text: &str, handle: S) -> Option<S> {
        let stamp = self.tick();
        let evicted = self.entries[index].take().map(|entry| entry.handle);
        self.entries[index] = Some(CachedStatement {
            name: format!("STMT{index}"),
            last_used: stamp,
            hash: hash_sql_text(text),
            text: text.to_string(),
            handle,
        });
        evicted
    }

    /// Drop every entry, yielding the handles so the caller can deallocate
    /// them server-side while the session is still healthy.
    pub fn clear(&mut self) -> Vec<S> {
        self.entries
            .iter_mut()
            .filter_map(|slot| slot.take().map(|entry| entry.handle))
            .collect()
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|slot| slot.is_some()).count()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepare(cache: &mut StatementCache<u32>, text: &str, handle: u32) -> usize {
        match cache.lookup(text) {
            CacheSlot::Hit(index) => index,
            CacheSlot::Miss { evict } => {
                cache.store(evict, text, handle);
                evict
            }
        }
    }

    #[test]
    fn repeated_lookup_hits_the_same_slot() {
        let mut cache = StatementCache::new(4);
        let first = prepare(&mut cache, "SELECT 1", 100);
        let second = prepare(&mut cache, "SELECT 1", 999);
        assert_eq!(first, second);
        // The original handle survived; no re-preparation happened.
        assert_eq!(cache.handle(first), Some(&100));
        assert_eq!(cache.live_count(), 1);
    }

    #[test]
    fn eviction_picks_least_recently_used() {
        let mut cache = StatementCache::new(2);
        prepare(&mut cache, "A", 1);
        prepare(&mut cache, "B", 2);
        // Touch A so B becomes the LRU entry.
        prepare(&mut cache, "A", 0);

        match cache.lookup("C") {
            CacheSlot::Miss { evict } => {
                let evicted = cache.store(evict, "C", 3);
                assert_eq!(evicted, Some(2));
            }
            CacheSlot::Hit(_) => panic!("C cannot hit"),
        }

        assert!(matches!(cache.lookup("A"), CacheSlot::Hit(_)));
        assert!(matches!(cache.lookup("B"), CacheSlot::Miss { .. }));
    }

    #[test]
    fn live_set_never_exceeds_capacity() {
        let mut cache = StatementCache::new(3);
        for i in 0..10 {
            prepare(&mut cache, &format!("SELECT {i}"), i);
        }
        assert_eq!(cache.live_count(), 3);
    }

    #[test]
    fn capacity_is_clamped_to_ceiling() {
        let cache: StatementCache<u32> = StatementCache::new(1_000_000);
        assert_eq!(cache.capacity(), MAX_CACHED_STATEMENTS);
    }

    #[test]
    fn clear_yields_all_handles() {
        let mut cache = StatementCache::new(4);
        prepare(&mut cache, "A", 1);
        prepare(&mut cache, "B", 2);
        let mut handles = cache.clear();
        handles.sort_unstable();
        assert_eq!(handles, vec![1, 2]);
        assert_eq!(cache.live_count(), 0);
    }

    #[test]
    fn fnv1a_matches_reference_vectors() {
        assert_eq!(hash_sql_text(""), 0x811C_9DC5);
        assert_eq!(hash_sql_text("a"), 0xE40C_292C);
        assert_eq!(hash_sql_text("foobar"), 0xBF9C_F968);
    }
}
