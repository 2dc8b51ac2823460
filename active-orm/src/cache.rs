//! # Query Cache Module
//!
//! Process-local cache of query results.
//!
//! Entries are grouped by `(dataSource, table)`; within a group they are keyed
//! by the entity type, the statement text and a snapshot of the positional
//! parameters. Any mutating call on a table purges the table's whole group.
//!
//! The cache is a best-effort layer: a provider miss, an expired entry and a
//! stored value of an unexpected type are all reported as absent, and the
//! caller falls through to storage.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use active_orm::cache::{MemoryCacheProvider, QueryCache};
//!
//! let cache = Arc::new(QueryCache::new(true, Arc::new(MemoryCacheProvider::new())));
//! let ds = DataSource::builder().cache(cache.clone()).connect(url).await?;
//! ```

use std::{
    any::Any,
    collections::HashMap,
    fmt,
    num::NonZeroUsize,
    sync::Arc,
    time::{Duration, Instant},
};

use lru::LruCache;
use parking_lot::RwLock;

use crate::Value;

/// A cached value. Results are stored behind `Arc` and cloned out on hit.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

// ============================================================================
// Provider Contract
// ============================================================================

/// Notification that a whole group must be dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    pub group: String,
    pub source: String,
}

impl CacheEvent {
    pub fn new(group: &str, source: &str) -> Self {
        Self { group: group.to_string(), source: source.to_string() }
    }
}

/// Storage behind the [`QueryCache`]. Must tolerate concurrent access.
pub trait CacheProvider: Send + Sync {
    /// Stores `value`; a `ttl` of `None` means the entry never expires.
    fn add_cache(&self, group: &str, key: &str, value: CachedValue, ttl: Option<Duration>);

    fn get_cache(&self, group: &str, key: &str) -> Option<CachedValue>;

    fn remove_cache(&self, group: &str, key: &str);

    /// Drops every entry of `event.group`.
    fn flush(&self, event: &CacheEvent);
}

// ============================================================================
// In-Memory Provider
// ============================================================================

struct Entry {
    value: CachedValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Default provider: one `lru::LruCache` per group behind a `parking_lot::RwLock`.
///
/// Each group holds at most `capacity` entries; the least recently used entry
/// is evicted first. Expired entries of a group are swept whenever an entry is
/// added to it.
pub struct MemoryCacheProvider {
    capacity: NonZeroUsize,
    groups: RwLock<HashMap<String, LruCache<String, Entry>>>,
}

impl Default for MemoryCacheProvider {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_GROUP_CAPACITY)
    }
}

/// Entries kept per group by [`MemoryCacheProvider::new`].
pub const DEFAULT_GROUP_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

impl MemoryCacheProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider keeping at most `capacity` entries per group.
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self { capacity, groups: RwLock::new(HashMap::new()) }
    }

    /// Number of entries stored in `group`, expired ones not yet swept included.
    pub fn len(&self, group: &str) -> usize {
        self.groups.read().get(group).map_or(0, LruCache::len)
    }

    pub fn is_empty(&self, group: &str) -> bool {
        self.len(group) == 0
    }
}

impl fmt::Debug for MemoryCacheProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCacheProvider")
            .field("capacity", &self.capacity)
            .field("groups", &self.groups.read().len())
            .finish()
    }
}

fn sweep_expired(entries: &mut LruCache<String, Entry>, now: Instant) {
    let expired: Vec<String> =
        entries.iter().filter(|(_, entry)| entry.is_expired(now)).map(|(key, _)| key.clone()).collect();
    for key in expired {
        entries.pop(&key);
    }
}

impl CacheProvider for MemoryCacheProvider {
    fn add_cache(&self, group: &str, key: &str, value: CachedValue, ttl: Option<Duration>) {
        let now = Instant::now();
        let entry = Entry { value, expires_at: ttl.map(|t| now + t) };

        let mut groups = self.groups.write();
        let entries = groups.entry(group.to_string()).or_insert_with(|| LruCache::new(self.capacity));
        sweep_expired(entries, now);
        entries.put(key.to_string(), entry);
    }

    fn get_cache(&self, group: &str, key: &str) -> Option<CachedValue> {
        let now = Instant::now();
        let mut groups = self.groups.write();
        let entries = groups.get_mut(group)?;
        match entries.get(key) {
            None => return None,
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => {}
        }
        entries.pop(key);
        None
    }

    fn remove_cache(&self, group: &str, key: &str) {
        let mut groups = self.groups.write();
        if let Some(entries) = groups.get_mut(group) {
            entries.pop(key);
            if entries.is_empty() {
                groups.remove(group);
            }
        }
    }

    fn flush(&self, event: &CacheEvent) {
        self.groups.write().remove(&event.group);
    }
}

// ============================================================================
// Query Cache
// ============================================================================

/// Injectable query-result cache with an explicit enabled switch.
pub struct QueryCache {
    enabled: bool,
    provider: Arc<dyn CacheProvider>,
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache").field("enabled", &self.enabled).finish()
    }
}

impl QueryCache {
    pub fn new(enabled: bool, provider: Arc<dyn CacheProvider>) -> Self {
        Self { enabled, provider }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(false, Arc::new(MemoryCacheProvider::new()))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn provider(&self) -> &Arc<dyn CacheProvider> {
        &self.provider
    }

    /// Group name of a table: `"{data_source}.{table}"`.
    pub fn group(data_source: &str, table: &str) -> String {
        format!("{}.{}", data_source, table)
    }

    /// Entry key inside `group`.
    ///
    /// Type and statement are length-prefixed so no two distinct
    /// `(type, query, params)` triples render the same key. Parameters keep
    /// call order: reordered positional parameters are different entries.
    pub fn key(group: &str, type_name: &str, query: &str, params: &[Value]) -> String {
        format!("{}|{}:{}|{}:{}|{:?}", group, type_name.len(), type_name, query.len(), query, params)
    }

    /// Cached value of the exact invocation, if any.
    pub fn get<T>(&self, data_source: &str, table: &str, type_name: &str, query: &str, params: &[Value]) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        if !self.enabled {
            return None;
        }
        let group = Self::group(data_source, table);
        let key = Self::key(&group, type_name, query, params);
        let hit = self.provider.get_cache(&group, &key).and_then(|v| v.downcast_ref::<T>().cloned());
        log_access(&group, query, params, if hit.is_some() { "Hit" } else { "Miss" });
        hit
    }

    pub fn add<T>(
        &self,
        data_source: &str,
        table: &str,
        type_name: &str,
        query: &str,
        params: &[Value],
        value: T,
        ttl: Option<Duration>,
    ) where
        T: Send + Sync + 'static,
    {
        if !self.enabled {
            return;
        }
        let group = Self::group(data_source, table);
        let key = Self::key(&group, type_name, query, params);
        self.provider.add_cache(&group, &key, Arc::new(value), ttl);
    }

    pub fn remove(&self, data_source: &str, table: &str, type_name: &str, query: &str, params: &[Value]) {
        if !self.enabled {
            return;
        }
        let group = Self::group(data_source, table);
        self.provider.remove_cache(&group, &Self::key(&group, type_name, query, params));
    }

    /// Drops every cached result of `table` on `data_source`.
    pub fn purge(&self, data_source: &str, table: &str) {
        if !self.enabled {
            return;
        }
        let group = Self::group(data_source, table);
        log::debug!("Purge, group: {{{}}}", group);
        self.provider.flush(&CacheEvent::new(&group, "QueryCache"));
    }
}

fn log_access(group: &str, query: &str, params: &[Value], access: &str) {
    if log::log_enabled!(log::Level::Debug) {
        let mut line = format!("{}, group: {{{}}}, query: {{{}}}", access, group, query);
        if !params.is_empty() {
            let rendered: Vec<String> = params.iter().map(|p| p.to_string()).collect();
            line.push_str(&format!(", params: {{{}}}", rendered.join("}, {")));
        }
        log::debug!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    fn cache() -> (QueryCache, Arc<MemoryCacheProvider>) {
        let provider = Arc::new(MemoryCacheProvider::new());
        (QueryCache::new(true, provider.clone()), provider)
    }

    #[test]
    fn test_add_then_get_exact_invocation() {
        let (cache, _) = cache();
        cache.add("main", "users", "User", "SELECT 1", &params![1], vec![1, 2, 3], None);

        assert_eq!(cache.get::<Vec<i32>>("main", "users", "User", "SELECT 1", &params![1]), Some(vec![1, 2, 3]));
        assert_eq!(cache.get::<Vec<i32>>("main", "users", "User", "SELECT 1", &params![2]), None);
        assert_eq!(cache.get::<Vec<i32>>("main", "users", "Other", "SELECT 1", &params![1]), None);
        assert_eq!(cache.get::<Vec<i32>>("other", "users", "User", "SELECT 1", &params![1]), None);
    }

    #[test]
    fn test_type_mismatch_reads_as_miss() {
        let (cache, _) = cache();
        cache.add("main", "users", "User", "q", &[], 5u8, None);
        assert_eq!(cache.get::<String>("main", "users", "User", "q", &[]), None);
    }

    #[test]
    fn test_keys_are_order_sensitive_and_collision_free() {
        let a = QueryCache::key("g", "User", "q", &params![1, 2]);
        let b = QueryCache::key("g", "User", "q", &params![2, 1]);
        assert_ne!(a, b);

        let text = QueryCache::key("g", "User", "q", &params!["1"]);
        let int = QueryCache::key("g", "User", "q", &params![1]);
        assert_ne!(text, int);

        let split_one = QueryCache::key("g", "a|1:b", "c", &[]);
        let split_two = QueryCache::key("g", "a", "b|1:c", &[]);
        assert_ne!(split_one, split_two);
    }

    #[test]
    fn test_purge_drops_whole_group_only() {
        let (cache, provider) = cache();
        cache.add("main", "users", "User", "q1", &[], 1, None);
        cache.add("main", "users", "User", "q2", &[], 2, None);
        cache.add("main", "posts", "Post", "q1", &[], 3, None);

        cache.purge("main", "users");

        assert!(provider.is_empty("main.users"));
        assert_eq!(provider.len("main.posts"), 1);
    }

    #[test]
    fn test_remove_single_entry() {
        let (cache, provider) = cache();
        cache.add("main", "users", "User", "q1", &[], 1, None);
        cache.add("main", "users", "User", "q2", &[], 2, None);

        cache.remove("main", "users", "User", "q1", &[]);

        assert_eq!(provider.len("main.users"), 1);
        assert_eq!(cache.get::<i32>("main", "users", "User", "q2", &[]), Some(2));
    }

    #[test]
    fn test_ttl_expires_entries() {
        let (cache, provider) = cache();
        cache.add("main", "users", "User", "q", &[], 1, Some(Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.get::<i32>("main", "users", "User", "q", &[]), None);
        assert!(provider.is_empty("main.users"));
    }

    #[test]
    fn test_adding_sweeps_expired_entries() {
        let (cache, provider) = cache();
        for id in 0..1000 {
            cache.add("main", "users", "User", "q", &params![id], id, Some(Duration::from_millis(1)));
        }
        std::thread::sleep(Duration::from_millis(20));

        cache.add("main", "users", "User", "q", &params![-1], -1, None);

        assert_eq!(provider.len("main.users"), 1);
        assert_eq!(cache.get::<i32>("main", "users", "User", "q", &params![-1]), Some(-1));
    }

    #[test]
    fn test_groups_are_bounded_by_capacity() {
        let provider = Arc::new(MemoryCacheProvider::with_capacity(NonZeroUsize::new(2).unwrap()));
        let cache = QueryCache::new(true, provider.clone());
        cache.add("main", "users", "User", "q1", &[], 1, None);
        cache.add("main", "users", "User", "q2", &[], 2, None);
        // Touch q1 so q2 becomes the least recently used entry
        assert_eq!(cache.get::<i32>("main", "users", "User", "q1", &[]), Some(1));
        cache.add("main", "users", "User", "q3", &[], 3, None);

        assert_eq!(provider.len("main.users"), 2);
        assert_eq!(cache.get::<i32>("main", "users", "User", "q2", &[]), None);
        assert_eq!(cache.get::<i32>("main", "users", "User", "q1", &[]), Some(1));
        assert_eq!(cache.get::<i32>("main", "users", "User", "q3", &[]), Some(3));
    }

    #[test]
    fn test_disabled_cache_is_inert() {
        let provider = Arc::new(MemoryCacheProvider::new());
        let cache = QueryCache::new(false, provider.clone());
        cache.add("main", "users", "User", "q", &[], 1, None);

        assert!(provider.is_empty("main.users"));
        assert_eq!(cache.get::<i32>("main", "users", "User", "q", &[]), None);
    }
}
