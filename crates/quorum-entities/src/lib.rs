//! Numeric entity extraction: batches inputs into single requests against a
//! Duckling-compatible service, caches results per input, and persists the
//! cache as a JSON snapshot.

mod batch;
mod cache;
mod client;
mod config;
mod dimension;
mod error;

pub use cache::EntityCache;
pub use client::{EntityClient, SUPPORTED_DIMENSIONS};
pub use config::{CacheBudget, EntityClientConfig};
pub use error::{CacheError, ExtractError};
