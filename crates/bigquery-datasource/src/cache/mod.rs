//! Session caches shared by every request of the process
//!
//! Three stores make up a [`SessionCache`]:
//!
//! - `handles`: [`PooledHandle`] per [`CacheKey`]
//! - `api_clients`: [`BigQueryApi`] per [`CacheKey`], sharing the remote
//!   client of the handle stored under the same key
//! - `resource_managers`: [`ResourceManagerService`] per data source identity
//!
//! Each store operation is individually atomic; sequences of operations are
//! not, and two racing constructions for one key both complete with the last
//! write winning. [`SingleFlight`] narrows that window for callers that opt
//! in. Entries live until the process exits; configuration changes produce
//! new keys rather than replacing old entries.

mod flight;
mod key;
mod store;

use std::sync::Arc;

pub use flight::SingleFlight;
pub use key::CacheKey;
pub use store::{SharedStore, StoreStats};

use crate::client::BigQueryApi;
use crate::driver::PooledHandle;
use crate::resource_manager::ResourceManagerService;

/// The caches injected into a data source; clones share state.
#[derive(Debug, Clone)]
pub struct SessionCache {
    pub handles: SharedStore<CacheKey, PooledHandle>,
    pub api_clients: SharedStore<CacheKey, Arc<BigQueryApi>>,
    pub resource_managers: SharedStore<String, Arc<ResourceManagerService>>,
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handles: SharedStore::new("handles"),
            api_clients: SharedStore::new("api_clients"),
            resource_managers: SharedStore::new("resource_managers"),
        }
    }

    /// Per-store statistics, in `handles`, `api_clients`,
    /// `resource_managers` order
    #[must_use]
    pub fn stats(&self) -> [(&'static str, StoreStats); 3] {
        [
            (self.handles.name(), self.handles.stats()),
            (self.api_clients.name(), self.api_clients.stats()),
            (self.resource_managers.name(), self.resource_managers.stats()),
        ]
    }
}
