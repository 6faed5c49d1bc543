use scc::HashMap;
use scc::hash_map::Entry;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone)]
pub struct CacheEntry<V> {
    pub stored_at: Instant,
    pub value: V,
}

/// In-memory cache of query results keyed by "host:port".
///
/// Entries are only checked for age on read. Stale entries stay in the map
/// until overwritten or cleared.
pub struct QueryCache<V> {
    entries: HashMap<String, CacheEntry<V>>,
}

impl<V: Clone> QueryCache<V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Get a value stored less than `ttl` ago.
    pub async fn get_fresh(&self, key: &str, ttl: Duration) -> Option<V> {
        self.entries
            .read_async(key, |_, entry| {
                (entry.stored_at.elapsed() < ttl).then(|| entry.value.clone())
            })
            .await
            .flatten()
    }

    /// Store a value, replacing any previous entry for the key.
    pub async fn store(&self, key: String, value: V) {
        let entry = CacheEntry {
            stored_at: Instant::now(),
            value,
        };
        match self.entries.entry_async(key).await {
            Entry::Occupied(mut occupied) => *occupied.get_mut() = entry,
            Entry::Vacant(vacant) => {
                vacant.insert_entry(entry);
            }
        }
    }

    /// Drop every entry. Returns how many were removed.
    pub async fn clear(&self) -> usize {
        let removed = self.entries.len();
        self.entries.clear_async().await;
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> Default for QueryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
