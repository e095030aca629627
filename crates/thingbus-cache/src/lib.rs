//! Thingbus Cache - bidirectional key/ID caches
//!
//! Every cache here stores a logical pair as two independent entries in a
//! [`thingbus_store::KvStore`], one per lookup direction:
//!
//! - [`ThingCache`]: thing key <-> thing id, maintained synchronously by the
//!   things service and consulted on every authentication
//! - [`RouteMap`]: foreign protocol id <-> internal id, maintained only by
//!   lifecycle event handlers and consulted by protocol adapters
//!
//! Removal resolves the counterpart first and deletes both entries in one
//! atomic store call. Removing an absent pair succeeds and reports that
//! nothing was removed.

pub mod bicache;
pub mod error;
pub mod routemap;
pub mod things;

pub use bicache::BiCache;
pub use error::{CacheError, CacheResult, IdentifyError};
pub use routemap::RouteMap;
pub use things::{ThingCache, ThingIdentifier, ThingRepository};
