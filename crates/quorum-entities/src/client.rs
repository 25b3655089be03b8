//! HTTP client for the numeric entity extraction service.

use chrono::Utc;
use quorum_core::ExtractionResult;
use tracing::{debug, info, warn};

use crate::batch::{self, RawSpan};
use crate::cache::EntityCache;
use crate::dimension::parse_response;
use crate::{EntityClientConfig, ExtractError};

/// Dimensions the service recognises when it is reachable.
pub const SUPPORTED_DIMENSIONS: &[&str] = &[
    "amountOfMoney",
    "distance",
    "duration",
    "email",
    "number",
    "ordinal",
    "phoneNumber",
    "quantity",
    "temperature",
    "time",
    "url",
    "volume",
];

/// Batched, cached client for the extraction service.
///
/// Create one per process with [`EntityClient::configure`] and share it
/// behind an `Arc`; the cache is internally synchronised.
pub struct EntityClient {
    client: reqwest::Client,
    config: EntityClientConfig,
    base_url: String,
    enabled: bool,
    cache: EntityCache,
}

impl EntityClient {
    /// Probe the service, warm the cache from its snapshot, and start the
    /// debounced snapshot task.
    ///
    /// Never fails: an unreachable service yields a disabled client and an
    /// unreadable snapshot an empty cache.
    pub async fn configure(config: EntityClientConfig) -> Self {
        let client = reqwest::Client::new();
        let base_url = config.url.trim_end_matches('/').to_string();
        let enabled = config.enabled && handshake(&client, &base_url).await;

        let cache = EntityCache::new(
            config.cache_budget.max_entries(),
            config.snapshot_path(),
            config.debounce(),
        );
        if let Err(e) = cache.load().await {
            warn!(error = %e, "could not load entity cache snapshot, starting empty");
        }
        cache.start_debounce();

        info!(url = %base_url, enabled, "entity extraction client configured");
        Self {
            client,
            config,
            base_url,
            enabled,
            cache,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Entity types this client can produce; empty when the service is off.
    pub fn supported_types(&self) -> Vec<&'static str> {
        if self.enabled {
            SUPPORTED_DIMENSIONS.to_vec()
        } else {
            Vec::new()
        }
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    /// Extract entities from a single input.
    pub async fn extract(&self, input: &str, lang: &str, use_cache: bool) -> Vec<ExtractionResult> {
        self.extract_many(&[input], lang, use_cache)
            .await
            .into_iter()
            .next()
            .unwrap_or_default()
    }

    /// Extract entities from every input, index-aligned with `inputs`.
    ///
    /// Failures are logged and produce empty lists; this never errors.
    pub async fn extract_many<S: AsRef<str>>(
        &self,
        inputs: &[S],
        lang: &str,
        use_cache: bool,
    ) -> Vec<Vec<ExtractionResult>> {
        let mut results = vec![Vec::new(); inputs.len()];
        if !self.enabled || inputs.is_empty() {
            return results;
        }

        let mut to_fetch: Vec<(usize, &str)> = Vec::new();
        for (idx, input) in inputs.iter().enumerate() {
            let input = input.as_ref();
            match use_cache.then(|| self.cache.get(input)).flatten() {
                Some(hit) => results[idx] = hit,
                None => to_fetch.push((idx, input)),
            }
        }
        debug!(
            total = inputs.len(),
            fetch = to_fetch.len(),
            "extracting entities"
        );

        // One in-flight request per call.
        for chunk in to_fetch.chunks(self.config.chunk_size.max(1)) {
            let texts: Vec<&str> = chunk.iter().map(|(_, text)| *text).collect();
            // A failed chunk leaves its slots empty and is not cached.
            let Some(fetched) = self.fetch_chunk(&texts, lang).await else {
                continue;
            };
            for ((idx, text), entities) in chunk.iter().zip(fetched) {
                self.cache.put((*text).to_string(), entities.clone());
                results[*idx] = entities;
            }
        }
        results
    }

    /// Write pending cache changes and stop the snapshot task.
    pub async fn shutdown(&self) {
        self.cache.shutdown().await;
    }

    async fn fetch_chunk(&self, texts: &[&str], lang: &str) -> Option<Vec<Vec<ExtractionResult>>> {
        let joined = batch::join(texts);
        match self.request_with_retry(&joined.text, lang).await {
            Ok(spans) => Some(batch::split_spans(spans, &joined.segments)),
            Err(e) => {
                warn!(error = %e, inputs = texts.len(), "entity extraction failed, returning no entities");
                None
            }
        }
    }

    async fn request_with_retry(&self, text: &str, lang: &str) -> Result<Vec<RawSpan>, ExtractError> {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.request(text, lang).await {
                Ok(spans) => return Ok(spans),
                Err(e) if attempt < attempts => {
                    let delay = self.config.backoff(attempt);
                    debug!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "retrying extraction");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request(&self, text: &str, lang: &str) -> Result<Vec<RawSpan>, ExtractError> {
        let url = format!("{}/parse", self.base_url);
        let reftime = Utc::now().timestamp_millis().to_string();
        let form = [
            ("lang", lang),
            ("text", text),
            ("reftime", reftime.as_str()),
            ("tz", self.config.timezone.as_str()),
        ];

        let resp = self.client.post(&url).form(&form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExtractError::Server {
                status: status.as_u16(),
                body,
            });
        }
        let body = resp.text().await?;
        parse_response(&body)
    }
}

async fn handshake(client: &reqwest::Client, base_url: &str) -> bool {
    match client.get(format!("{base_url}/")).send().await {
        Ok(resp) if resp.status().is_success() => true,
        Ok(resp) => {
            warn!(status = resp.status().as_u16(), "entity service unhealthy, extraction disabled");
            false
        }
        Err(e) => {
            warn!(error = %e, "entity service unreachable, extraction disabled");
            false
        }
    }
}
