//! Host name resolution with a TTL'd LRU cache.
//!
//! World host names change rarely, so responses that carry world
//! addresses (account login endpoints, world config) go through this
//! cache rather than the resolver. Lookups are case-sensitive. Entries
//! expire after the configured TTL and are re-resolved on next use; when
//! the cache is full the least recently resolved entry is evicted.
//! Failed resolutions are reported but never cached.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use tokio::net::lookup_host;
use tracing::{error, warn};

struct HostCacheEntry {
    host_name: String,
    address: Ipv4Addr,
    resolved_at: Instant,
}

pub struct HostCache {
    entries: Vec<HostCacheEntry>,
    capacity: usize,
    expire_time: Duration,
}

impl HostCache {
    #[must_use]
    pub fn new(capacity: usize, expire_time: Duration) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
            expire_time,
        }
    }

    /// Resolve a host name to an IPv4 address, consulting the cache first.
    pub async fn resolve(&mut self, host_name: &str) -> Option<Ipv4Addr> {
        if host_name.is_empty() {
            warn!("refusing to resolve an empty host name");
            return None;
        }

        let now = Instant::now();
        self.entries
            .retain(|entry| now.duration_since(entry.resolved_at) < self.expire_time);

        if let Some(entry) = self
            .entries
            .iter()
            .find(|entry| entry.host_name == host_name)
        {
            return Some(entry.address);
        }

        let address = resolve_host_name(host_name).await?;
        if self.entries.len() >= self.capacity {
            self.evict_least_recently_resolved();
        }
        self.entries.push(HostCacheEntry {
            host_name: host_name.to_string(),
            address,
            resolved_at: now,
        });
        Some(address)
    }

    fn evict_least_recently_resolved(&mut self) {
        if let Some(oldest) = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, entry)| entry.resolved_at)
            .map(|(index, _)| index)
        {
            self.entries.swap_remove(oldest);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

async fn resolve_host_name(host_name: &str) -> Option<Ipv4Addr> {
    // Literal addresses skip the resolver entirely.
    if let Ok(address) = host_name.parse::<Ipv4Addr>() {
        return Some(address);
    }

    match lookup_host((host_name, 0u16)).await {
        Ok(addresses) => {
            for address in addresses {
                if let std::net::SocketAddr::V4(v4) = address {
                    return Some(*v4.ip());
                }
            }
            error!("host name \"{host_name}\" has no IPv4 address");
            None
        }
        Err(e) => {
            error!("failed to resolve host name \"{host_name}\": {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn literal_addresses_resolve_and_cache() {
        let mut cache = HostCache::new(4, Duration::from_secs(60));
        let addr = cache.resolve("127.0.0.1").await.unwrap();
        assert_eq!(addr, Ipv4Addr::LOCALHOST);
        assert_eq!(cache.len(), 1);

        // Second lookup is served from the cache.
        assert_eq!(cache.resolve("127.0.0.1").await, Some(Ipv4Addr::LOCALHOST));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn full_cache_evicts_least_recently_resolved() {
        let mut cache = HostCache::new(2, Duration::from_secs(60));
        cache.resolve("10.0.0.1").await.unwrap();
        cache.resolve("10.0.0.2").await.unwrap();
        cache.resolve("10.0.0.3").await.unwrap();
        assert_eq!(cache.len(), 2);

        // The oldest entry is gone; the newer two are retained.
        let names: Vec<&str> = cache
            .entries
            .iter()
            .map(|entry| entry.host_name.as_str())
            .collect();
        assert!(!names.contains(&"10.0.0.1"));
        assert!(names.contains(&"10.0.0.2"));
        assert!(names.contains(&"10.0.0.3"));
    }

    #[tokio::test]
    async fn expired_entries_are_refreshed() {
        let mut cache = HostCache::new(4, Duration::from_millis(10));
        cache.resolve("10.0.0.1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.resolve("10.0.0.2").await.unwrap();
        // The expired entry was dropped during the second lookup.
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let mut cache = HostCache::new(4, Duration::from_secs(60));
        assert!(cache.resolve("").await.is_none());
        assert_eq!(cache.len(), 0);
    }
}
