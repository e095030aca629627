//! Store backend selection.
//!
//! The embedded backend locks its database file, so it suits a single
//! adapter that owns its routes. Deployments where the things service and
//! the adapters share lifecycle streams point every process at one
//! `thingbus-stored` through the remote backend.

use std::sync::Arc;
use thingbus_common::{StoreBackend, StoreConfig};
use thingbus_store::{KvStore, RedbStore, RemoteStore, StoreResult, StreamStore};
use tracing::info;

/// One store seen through both contracts
#[derive(Clone)]
pub struct Stores {
    pub kv: Arc<dyn KvStore>,
    pub streams: Arc<dyn StreamStore>,
}

/// Open the configured backend.
///
/// The remote backend connects lazily, so an unreachable server surfaces
/// on first use as a retryable error.
pub fn open_store(config: &StoreConfig) -> StoreResult<Stores> {
    match config.backend {
        StoreBackend::Embedded => {
            let store = Arc::new(RedbStore::open(&config.path)?);
            info!("Using embedded store {}", config.path.display());
            Ok(Stores {
                kv: store.clone(),
                streams: store,
            })
        }
        StoreBackend::Remote => {
            let store = Arc::new(RemoteStore::new(config.address.clone(), config.timeout()));
            info!("Using store server {}", config.address);
            Ok(Stores {
                kv: store.clone(),
                streams: store,
            })
        }
    }
}
