//! Process-global [`MirrorPoolCache`] (§3, §4.F): one [`MirrorPool`] per
//! patch, lazily constructed and reused for the lifetime of the process.
//! Built on the same lazily-constructed global-client pattern used by
//! `network.rs`, generalized from a single client to a keyed cache and
//! given explicit reader/writer semantics (lookup misses take the
//! exclusive lock to insert; hits only need a shared read).
//!
//! Keyed by [`Patch::id`] rather than servers-array identity — see
//! DESIGN.md for why the original's pointer-identity key has no direct
//! Rust equivalent.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use stackpatch_core::entities::{MirrorPool, Patch};
use stackpatch_core::ports::MirrorPoolCache;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct GlobalMirrorPoolCache {
    pools: RwLock<HashMap<String, Arc<Mutex<MirrorPool>>>>,
}

impl GlobalMirrorPoolCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MirrorPoolCache for GlobalMirrorPoolCache {
    async fn get_or_create(&self, patch: &Patch) -> Arc<Mutex<MirrorPool>> {
        if let Some(pool) = self.pools.read().unwrap().get(&patch.id) {
            return pool.clone();
        }
        let mut pools = self.pools.write().unwrap();
        pools
            .entry(patch.id.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(MirrorPool::from_servers(&patch.servers)))
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_is_reused_across_calls_for_same_patch() {
        let cache = GlobalMirrorPoolCache::new();
        let patch = Patch::new("p", "/archive");

        let first = cache.get_or_create(&patch).await;
        let second = cache.get_or_create(&patch).await;

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_distinct_patches_get_distinct_pools() {
        let cache = GlobalMirrorPoolCache::new();
        let a = Patch::new("a", "/a");
        let b = Patch::new("b", "/b");

        let pool_a = cache.get_or_create(&a).await;
        let pool_b = cache.get_or_create(&b).await;

        assert!(!Arc::ptr_eq(&pool_a, &pool_b));
    }
}
