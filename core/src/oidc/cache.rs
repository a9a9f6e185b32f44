//! Per-issuer discovery document cache
//!
//! Documents are shared as `Arc<DiscoveryDocument>` and replaced wholesale, so
//! readers never see a partially refreshed key set. Fetches for one issuer are
//! coalesced: whoever takes the fetch lock first performs the request, and
//! everyone who queued behind it receives that same outcome. Forced refreshes
//! are throttled: a document younger than the minimum refresh interval is
//! returned as-is.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::discovery::{fetch_discovery, DiscoveryDocument};
use crate::error::{ApiError, Result};
use crate::platform::{Clock, HttpClient};

type FetchOutcome = Result<Arc<DiscoveryDocument>>;

struct CachedDocument {
    document: Arc<DiscoveryDocument>,
    fetched_at: u64,
}

#[derive(Default)]
struct IssuerSlot {
    current: RwLock<Option<CachedDocument>>,
    /// Held for the duration of a fetch; stores the last completed outcome
    fetch: tokio::sync::Mutex<Option<FetchOutcome>>,
    /// Bumped each time a fetch completes
    generation: AtomicU64,
}

impl IssuerSlot {
    /// Cached document if it was fetched less than `window_secs` ago
    fn fresh(&self, now: u64, window_secs: u64) -> Option<Arc<DiscoveryDocument>> {
        let current = self.current.read().ok()?;
        current
            .as_ref()
            .filter(|cached| now < cached.fetched_at.saturating_add(window_secs))
            .map(|cached| cached.document.clone())
    }

    fn store(&self, document: Arc<DiscoveryDocument>, now: u64) -> Result<()> {
        let mut current = self
            .current
            .write()
            .map_err(|_| ApiError::internal("discovery cache lock poisoned"))?;
        *current = Some(CachedDocument {
            document,
            fetched_at: now,
        });
        Ok(())
    }
}

/// Discovery cache keyed by issuer URL
pub struct DiscoveryCache {
    slots: RwLock<HashMap<String, Arc<IssuerSlot>>>,
    ttl_secs: u64,
    min_refresh_secs: u64,
    timeout: Duration,
}

impl DiscoveryCache {
    pub fn new(ttl_secs: u64, min_refresh_secs: u64, timeout: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            ttl_secs,
            min_refresh_secs: min_refresh_secs.min(ttl_secs),
            timeout,
        }
    }

    /// Current document for `issuer`, fetching it when absent or stale
    pub async fn get(
        &self,
        issuer: &str,
        http: &dyn HttpClient,
        clock: &dyn Clock,
    ) -> Result<Arc<DiscoveryDocument>> {
        let slot = self.slot(issuer)?;

        if let Some(document) = slot.fresh(clock.now_secs(), self.ttl_secs) {
            debug!(issuer = %issuer, "discovery cache hit");
            return Ok(document);
        }

        self.fetch_coalesced(&slot, issuer, http, clock, self.ttl_secs).await
    }

    /// Re-fetch `issuer` ahead of its TTL (key rotation)
    ///
    /// A document fetched within the minimum refresh interval is returned
    /// without contacting the issuer. A failed refresh falls back to the
    /// cached document while it is fresh.
    pub async fn refresh(
        &self,
        issuer: &str,
        http: &dyn HttpClient,
        clock: &dyn Clock,
    ) -> Result<Arc<DiscoveryDocument>> {
        let slot = self.slot(issuer)?;

        if let Some(document) = slot.fresh(clock.now_secs(), self.min_refresh_secs) {
            debug!(issuer = %issuer, "discovery refresh throttled");
            return Ok(document);
        }

        self.fetch_coalesced(&slot, issuer, http, clock, self.min_refresh_secs).await
    }

    fn slot(&self, issuer: &str) -> Result<Arc<IssuerSlot>> {
        {
            let slots = self
                .slots
                .read()
                .map_err(|_| ApiError::internal("discovery cache lock poisoned"))?;
            if let Some(slot) = slots.get(issuer) {
                return Ok(slot.clone());
            }
        }

        let mut slots = self
            .slots
            .write()
            .map_err(|_| ApiError::internal("discovery cache lock poisoned"))?;
        Ok(slots.entry(issuer.to_string()).or_default().clone())
    }

    async fn fetch_coalesced(
        &self,
        slot: &IssuerSlot,
        issuer: &str,
        http: &dyn HttpClient,
        clock: &dyn Clock,
        window_secs: u64,
    ) -> FetchOutcome {
        let seen = slot.generation.load(Ordering::Acquire);
        let mut last = slot.fetch.lock().await;

        // Someone else completed a fetch while we queued
        if slot.generation.load(Ordering::Acquire) != seen {
            if let Some(outcome) = last.as_ref() {
                debug!(issuer = %issuer, "joined in-flight discovery fetch");
                return outcome.clone();
            }
        }

        // A fetch may have landed between the caller's freshness check and the lock
        if let Some(document) = slot.fresh(clock.now_secs(), window_secs) {
            return Ok(document);
        }

        let outcome = match fetch_discovery(issuer, http, self.timeout).await {
            Ok(document) => {
                let document = Arc::new(document);
                slot.store(document.clone(), clock.now_secs()).map(|()| {
                    info!(
                        issuer = %issuer,
                        key_count = document.signing_keys.keys.len(),
                        "discovery document refreshed"
                    );
                    document
                })
            }
            Err(err) => match slot.fresh(clock.now_secs(), self.ttl_secs) {
                Some(document) => {
                    warn!(issuer = %issuer, error = %err, "discovery refresh failed, serving last known good");
                    Ok(document)
                }
                None => {
                    warn!(issuer = %issuer, error = %err, "discovery fetch failed");
                    Err(err)
                }
            },
        };

        *last = Some(outcome.clone());
        slot.generation.fetch_add(1, Ordering::AcqRel);
        outcome
    }
}
