//! Wiring: one config, one store, one fetcher.

use std::sync::Arc;

use tracing::info;

use crate::classify::RouteClassifier;
use crate::config::OfflineConfig;
use crate::dashboard::DashboardClient;
use crate::error::OfflineResult;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::inflight::InFlightTracker;
use crate::interceptor::Interceptor;
use crate::lifecycle::{ActivationReport, LifecycleController};
use crate::store::{CacheStore, DiskCacheStore};
use crate::strategy::{StrategyEngine, StrategyPolicy};

/// Offline layer for one deployment.
///
/// Construct once at startup; the config is frozen from then on.
pub struct OfflineRuntime<S, F> {
    config: Arc<OfflineConfig>,
    store: Arc<S>,
    interceptor: Arc<Interceptor<S, F>>,
    lifecycle: Arc<LifecycleController<S, F>>,
}

impl OfflineRuntime<DiskCacheStore, HttpFetcher> {
    /// Disk store under `cache_dir` (or the platform cache dir) and a live HTTP fetcher.
    pub fn from_config(config: OfflineConfig) -> OfflineResult<Self> {
        let store = match &config.cache_dir {
            Some(dir) => DiskCacheStore::with_dir(dir),
            None => DiskCacheStore::new()?,
        };
        let fetcher = HttpFetcher::new(&config.network)?;
        Self::new(config, store, fetcher)
    }
}

impl<S, F> OfflineRuntime<S, F>
where
    S: CacheStore,
    F: Fetcher,
{
    pub fn new(config: OfflineConfig, store: S, fetcher: F) -> OfflineResult<Self> {
        Self::from_parts(config, Arc::new(store), Arc::new(fetcher))
    }

    /// Like [`new`](Self::new), for a store or fetcher shared with other owners.
    pub fn from_parts(
        config: OfflineConfig,
        store: Arc<S>,
        fetcher: Arc<F>,
    ) -> OfflineResult<Self> {
        config.validate()?;

        let engine = StrategyEngine::new(
            store.clone(),
            fetcher.clone(),
            StrategyPolicy::from_config(&config)?,
        );
        let interceptor = Interceptor::new(
            RouteClassifier::new(config.never_cache_prefixes.iter().cloned()),
            config.strategies,
            engine,
            Arc::new(InFlightTracker::new()),
        );
        let lifecycle = LifecycleController::new(store.clone(), fetcher, &config)?;

        info!(
            generation = %lifecycle.generation(),
            origin = %config.origin,
            core_assets = config.core_assets.len(),
            "offline runtime ready"
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            interceptor: Arc::new(interceptor),
            lifecycle: Arc::new(lifecycle),
        })
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn interceptor(&self) -> Arc<Interceptor<S, F>> {
        self.interceptor.clone()
    }

    pub fn lifecycle(&self) -> Arc<LifecycleController<S, F>> {
        self.lifecycle.clone()
    }

    pub fn dashboard(&self) -> OfflineResult<DashboardClient<S, F>> {
        Ok(DashboardClient::new(
            self.interceptor.clone(),
            self.config.origin_url()?,
        ))
    }

    /// Activate the installed generation once the interceptor is idle.
    pub async fn activate_when_idle(&self) -> OfflineResult<ActivationReport> {
        self.lifecycle
            .activate_when_idle(self.interceptor.in_flight())
            .await
    }
}
