//! Per-key construction guard

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Serializes construction work per key.
///
/// The first caller for a key holds the guard while it builds; later callers
/// wait, then re-check the caches before building themselves. Guards for
/// different keys never contend. When disabled, `acquire` returns `None`
/// and callers race freely.
#[derive(Debug)]
pub struct SingleFlight<K> {
    enabled: bool,
    inflight: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> SingleFlight<K>
where
    K: Eq + Hash + Clone,
{
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn acquire(&self, key: &K) -> Option<OwnedMutexGuard<()>> {
        if !self.enabled {
            return None;
        }

        let lock = {
            let mut inflight = self.inflight.lock();
            Arc::clone(
                inflight
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        Some(lock.lock_owned().await)
    }
}
