use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// File name of the cache snapshot inside `cache_dir`.
pub const SNAPSHOT_FILE: &str = "entities_cache.json";

/// Settings for [`EntityClient`](crate::EntityClient).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityClientConfig {
    /// When false the client never contacts the service.
    pub enabled: bool,
    /// Base URL of the extraction service, without trailing slash.
    pub url: String,
    /// IANA time zone sent with every request.
    pub timezone: String,
    /// Directory holding the cache snapshot. No persistence when unset.
    pub cache_dir: Option<PathBuf>,
    /// Maximum number of inputs joined into one request.
    pub chunk_size: usize,
    /// Attempts per request, including the first one.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_factor: u32,
    /// Quiet period after the last cache change before a snapshot is written.
    pub debounce_ms: u64,
    pub cache_budget: CacheBudget,
}

impl Default for EntityClientConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://localhost:8000".to_string(),
            timezone: "UTC".to_string(),
            cache_dir: None,
            chunk_size: 10,
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_factor: 2,
            debounce_ms: 10_000,
            cache_budget: CacheBudget::default(),
        }
    }
}

impl EntityClientConfig {
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| dir.join(SNAPSHOT_FILE))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.backoff_factor).saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

/// Memory budget of the entity cache, expressed through the workload it
/// must hold.
///
/// The default works out to 500 B × 2 × 100 × 10 × 100 = 100 MB.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheBudget {
    pub entity_bytes: usize,
    pub entities_per_utterance: usize,
    pub utterances_per_intent: usize,
    pub intents_per_bot: usize,
    pub concurrent_bots: usize,
}

impl Default for CacheBudget {
    fn default() -> Self {
        Self {
            entity_bytes: 500,
            entities_per_utterance: 2,
            utterances_per_intent: 100,
            intents_per_bot: 10,
            concurrent_bots: 100,
        }
    }
}

impl CacheBudget {
    pub fn bytes(&self) -> usize {
        self.entity_bytes
            .saturating_mul(self.entities_per_utterance)
            .saturating_mul(self.utterances_per_intent)
            .saturating_mul(self.intents_per_bot)
            .saturating_mul(self.concurrent_bots)
    }

    /// Number of cached utterances that fit in the budget.
    pub fn max_entries(&self) -> NonZeroUsize {
        let per_entry = self
            .entity_bytes
            .saturating_mul(self.entities_per_utterance)
            .max(1);
        NonZeroUsize::new(self.bytes() / per_entry).unwrap_or(NonZeroUsize::MIN)
    }
}
