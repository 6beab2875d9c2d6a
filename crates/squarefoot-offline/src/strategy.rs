//! Fetch strategies.
//!
//! The engine only ever reads from and appends to the *current* generation.
//! It never creates or deletes generations; that belongs to the lifecycle
//! controller. A store failure is never fatal here: it is logged and the
//! request degrades to a plain network fetch.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::OfflineConfig;
use crate::error::{OfflineError, OfflineResult};
use crate::fetch::Fetcher;
use crate::store::{CacheStore, CachedEntry, StoreHandle};
use crate::types::{CacheKey, Request, RequestMode, ResponseSnapshot, ResponseSource, Served};

/// How a request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Serve from cache; fetch and store on miss.
    CacheFirst,

    /// Fetch; fall back to cache only when the network fails outright.
    NetworkFirst,

    /// Always fetch; never read or write the cache.
    NeverCache,

    /// Serve from cache; a miss is `NotFound`.
    CacheOnly,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CacheFirst => write!(f, "cache-first"),
            Self::NetworkFirst => write!(f, "network-first"),
            Self::NeverCache => write!(f, "never-cache"),
            Self::CacheOnly => write!(f, "cache-only"),
        }
    }
}

/// Knobs shared by every strategy.
#[derive(Debug, Clone, Default)]
pub struct StrategyPolicy {
    /// Store non-2xx responses too.
    pub cache_non_success: bool,

    /// Refresh the cached copy after a successful network-first fetch.
    pub refresh_on_network_first: bool,

    /// Entry served to offline navigations whose own key is not cached.
    pub navigation_fallback: Option<CacheKey>,
}

impl StrategyPolicy {
    pub fn from_config(config: &OfflineConfig) -> OfflineResult<Self> {
        Ok(Self {
            cache_non_success: config.cache_non_success,
            refresh_on_network_first: config.refresh_on_network_first,
            navigation_fallback: config.navigation_fallback_key()?,
        })
    }
}

/// Executes strategies against the current generation of a store.
pub struct StrategyEngine<S, F> {
    store: Arc<S>,
    fetcher: Arc<F>,
    policy: StrategyPolicy,
}

impl<S, F> StrategyEngine<S, F>
where
    S: CacheStore,
    F: Fetcher,
{
    pub fn new(store: Arc<S>, fetcher: Arc<F>, policy: StrategyPolicy) -> Self {
        Self {
            store,
            fetcher,
            policy,
        }
    }

    pub fn policy(&self) -> &StrategyPolicy {
        &self.policy
    }

    /// Answer a request with the given strategy.
    ///
    /// Mutating requests always bypass the cache, whatever `strategy` says.
    pub async fn execute(&self, strategy: Strategy, request: &Request) -> OfflineResult<Served> {
        let key = match request.cache_key() {
            Some(key) if strategy != Strategy::NeverCache => key,
            _ => return self.never_cache(request).await,
        };

        match strategy {
            Strategy::CacheFirst => self.cache_first(request, &key).await,
            Strategy::NetworkFirst => self.network_first(request, &key).await,
            Strategy::CacheOnly => self.cache_only(request, &key).await,
            Strategy::NeverCache => self.never_cache(request).await,
        }
    }

    async fn never_cache(&self, request: &Request) -> OfflineResult<Served> {
        debug!(method = %request.method, url = %request.url, "bypassing cache");
        Ok(Served::network(self.fetcher.fetch(request).await?))
    }

    async fn cache_first(&self, request: &Request, key: &CacheKey) -> OfflineResult<Served> {
        let handle = self.current_handle().await;

        if let Some(handle) = &handle {
            if let Some(entry) = self.lookup(handle, key).await {
                debug!(key = %key, generation = %entry.generation, "cache hit");
                return Ok(from_cache(entry));
            }
        }

        debug!(key = %key, "cache miss");
        let response = self.fetcher.fetch(request).await?;

        if let Some(handle) = &handle {
            if self.should_store(&response) {
                self.store_copy(handle, key, &response).await;
            }
        }

        Ok(Served::network(response))
    }

    async fn network_first(&self, request: &Request, key: &CacheKey) -> OfflineResult<Served> {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if self.policy.refresh_on_network_first && self.should_store(&response) {
                    if let Some(handle) = self.current_handle().await {
                        self.store_copy(&handle, key, &response).await;
                    }
                }
                Ok(Served::network(response))
            }
            Err(err @ OfflineError::NetworkFailure { .. }) => {
                match self.fallback(request, key).await {
                    Some(served) => {
                        warn!(
                            key = %key,
                            error = %err,
                            source = %served.source,
                            "network failed, serving cached copy"
                        );
                        Ok(served)
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn cache_only(&self, request: &Request, key: &CacheKey) -> OfflineResult<Served> {
        let generation = match self.store.current().await {
            Ok(Some(generation)) => generation,
            Ok(None) => return Err(not_found(key)),
            Err(e) => {
                warn!(error = %e, "cache store unavailable, degrading to network");
                return self.never_cache(request).await;
            }
        };

        let handle = match self.store.handle(&generation).await {
            Ok(Some(handle)) => handle,
            Ok(None) => return Err(not_found(key)),
            Err(e) => {
                warn!(error = %e, "cache store unavailable, degrading to network");
                return self.never_cache(request).await;
            }
        };

        match self.store.get(&handle, key).await {
            Ok(Some(entry)) => Ok(from_cache(entry)),
            Ok(None) => Err(not_found(key)),
            Err(e) => {
                warn!(error = %e, "cache store unavailable, degrading to network");
                self.never_cache(request).await
            }
        }
    }

    /// Cached entry for `key`, then the navigation fallback page.
    async fn fallback(&self, request: &Request, key: &CacheKey) -> Option<Served> {
        let handle = self.current_handle().await?;

        let mut candidates = vec![key];
        if request.mode == RequestMode::Navigate {
            if let Some(fallback) = self.policy.navigation_fallback.as_ref() {
                if fallback != key {
                    candidates.push(fallback);
                }
            }
        }

        for candidate in candidates {
            if let Some(entry) = self.lookup(&handle, candidate).await {
                return Some(Served {
                    source: ResponseSource::Fallback {
                        generation: entry.generation,
                        key: candidate.clone(),
                    },
                    response: entry.response,
                });
            }
        }

        None
    }

    async fn current_handle(&self) -> Option<StoreHandle> {
        let lookup = match self.store.current().await {
            Ok(Some(generation)) => self.store.handle(&generation).await,
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };

        match lookup {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "cache store unavailable, degrading to network");
                None
            }
        }
    }

    async fn lookup(&self, handle: &StoreHandle, key: &CacheKey) -> Option<CachedEntry> {
        match self.store.get(handle, key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    async fn store_copy(&self, handle: &StoreHandle, key: &CacheKey, response: &ResponseSnapshot) {
        if let Err(e) = self.store.put(handle, key, response).await {
            warn!(
                key = %key,
                generation = %handle.generation(),
                error = %e,
                "failed to store response"
            );
        }
    }

    fn should_store(&self, response: &ResponseSnapshot) -> bool {
        response.is_success() || self.policy.cache_non_success
    }
}

fn from_cache(entry: CachedEntry) -> Served {
    Served {
        source: ResponseSource::Cache {
            generation: entry.generation,
        },
        response: entry.response,
    }
}

fn not_found(key: &CacheKey) -> OfflineError {
    OfflineError::NotFound {
        key: key.to_string(),
    }
}
