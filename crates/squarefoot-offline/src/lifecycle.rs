//! Generation lifecycle: install, activate, prune.
//!
//! ```text
//! Uninstalled -> Installing -> Waiting -> Activating -> Active
//!                                                        |
//!                                 (superseded) Retired <-+
//! ```
//!
//! This is the only component that creates or deletes generations. Install is
//! all-or-nothing: every core asset is fetched before anything is written, so
//! a failed install leaves no trace in the store and the previous generation
//! keeps serving. The controller remembers the failed attempt and keeps
//! reporting `Installing` until an install succeeds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use reqwest::Method;
use tracing::{debug, error, info};

use crate::config::OfflineConfig;
use crate::error::{OfflineError, OfflineResult};
use crate::fetch::Fetcher;
use crate::inflight::InFlightTracker;
use crate::store::{CacheStore, GenerationManifest, StoreHandle};
use crate::types::{CacheKey, Generation, GenerationState, Request, ResponseSnapshot};

/// Outcome of [`LifecycleController::install`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub generation: Generation,
    /// Core assets stored (or already present).
    pub assets: usize,
    /// The generation was already installed; nothing was fetched.
    pub already_installed: bool,
}

/// Outcome of [`LifecycleController::activate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    pub generation: Generation,
    /// Generations deleted by this activation.
    pub retired: Vec<Generation>,
    /// The generation was already current.
    pub already_active: bool,
}

/// Outcome of [`LifecycleController::deploy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    pub install: InstallReport,
    /// Present when `skip_waiting` activated the generation right away.
    pub activation: Option<ActivationReport>,
}

#[derive(Debug, Clone)]
struct CoreAsset {
    path: String,
    request: Request,
    key: CacheKey,
}

/// Drives one deployment's generation through its lifecycle.
pub struct LifecycleController<S, F> {
    store: Arc<S>,
    fetcher: Arc<F>,
    generation: Generation,
    cache_prefix: String,
    assets: Vec<CoreAsset>,
    skip_waiting: bool,
    /// Last install attempt failed before anything reached the store.
    install_failed: AtomicBool,
}

impl<S, F> LifecycleController<S, F>
where
    S: CacheStore,
    F: Fetcher,
{
    pub fn new(store: Arc<S>, fetcher: Arc<F>, config: &OfflineConfig) -> OfflineResult<Self> {
        let assets = config
            .core_assets
            .iter()
            .map(|path| {
                let url = config.resolve(path)?;
                Ok(CoreAsset {
                    path: path.clone(),
                    key: CacheKey::new(&Method::GET, &url),
                    request: Request::new(Method::GET, url),
                })
            })
            .collect::<OfflineResult<Vec<_>>>()?;

        Ok(Self {
            store,
            fetcher,
            generation: config.generation()?,
            cache_prefix: config.cache_prefix.clone(),
            assets,
            skip_waiting: config.skip_waiting,
            install_failed: AtomicBool::new(false),
        })
    }

    /// Generation this controller installs.
    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    /// Current lifecycle state, derived from the store.
    ///
    /// The current pointer is authoritative for `Active`; otherwise the
    /// manifest decides. A generation directory without a manifest, or a
    /// failed install attempt by this controller, is an unfinished install.
    pub async fn state(&self) -> OfflineResult<GenerationState> {
        if self.store.current().await?.as_ref() == Some(&self.generation) {
            return Ok(GenerationState::Active);
        }

        if let Some(manifest) = self.store.manifest(&self.generation).await? {
            return Ok(manifest.state);
        }

        if self.store.handle(&self.generation).await?.is_some()
            || self.install_failed.load(Ordering::SeqCst)
        {
            return Ok(GenerationState::Installing);
        }
        Ok(GenerationState::Uninstalled)
    }

    /// Fetch every core asset and store them as a new waiting generation.
    ///
    /// Fails with `AssetProvisionFailure` if any asset fails to fetch or
    /// answers with a non-success status; the store is left untouched and
    /// the state stays `Installing`. Leftovers of an interrupted install are
    /// deleted before the new entries are written.
    pub async fn install(&self) -> OfflineResult<InstallReport> {
        let state = self.state().await?;
        if matches!(
            state,
            GenerationState::Waiting | GenerationState::Activating | GenerationState::Active
        ) {
            debug!(generation = %self.generation, state = %state, "generation already installed");
            return Ok(InstallReport {
                generation: self.generation.clone(),
                assets: self.assets.len(),
                already_installed: true,
            });
        }

        info!(
            generation = %self.generation,
            assets = self.assets.len(),
            "installing generation"
        );

        let fetches = self.assets.iter().map(|asset| async move {
            let result = self.fetcher.fetch(&asset.request).await;
            (asset, result)
        });
        let results = join_all(fetches).await;

        let mut fetched: Vec<(&CoreAsset, ResponseSnapshot)> = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (asset, result) in results {
            match result {
                Ok(response) if response.is_success() => fetched.push((asset, response)),
                Ok(response) => failures.push(format!("{}: HTTP {}", asset.path, response.status)),
                Err(e) => failures.push(format!("{}: {}", asset.path, e)),
            }
        }

        if !failures.is_empty() {
            error!(
                generation = %self.generation,
                failed = failures.len(),
                failures = ?failures,
                "core asset provisioning failed"
            );
            self.install_failed.store(true, Ordering::SeqCst);
            return Err(OfflineError::AssetProvisionFailure {
                generation: self.generation.to_string(),
                failures,
            });
        }

        if state == GenerationState::Installing && self.store.delete(&self.generation).await? {
            debug!(generation = %self.generation, "discarded interrupted install");
        }

        let handle = self.store.open(&self.generation).await?;
        if let Err(e) = self.populate(&handle, &fetched).await {
            error!(generation = %self.generation, error = %e, "failed to store core assets");
            self.discard_partial().await;
            self.install_failed.store(true, Ordering::SeqCst);
            return Err(e);
        }
        self.install_failed.store(false, Ordering::SeqCst);

        info!(generation = %self.generation, "generation installed, waiting for activation");
        Ok(InstallReport {
            generation: self.generation.clone(),
            assets: fetched.len(),
            already_installed: false,
        })
    }

    async fn populate(
        &self,
        handle: &StoreHandle,
        fetched: &[(&CoreAsset, ResponseSnapshot)],
    ) -> OfflineResult<()> {
        for (asset, response) in fetched {
            self.store.put(handle, &asset.key, response).await?;
        }
        let manifest =
            GenerationManifest::new(&self.generation, GenerationState::Waiting, fetched.len());
        self.store.write_manifest(handle, &manifest).await
    }

    async fn discard_partial(&self) {
        if let Err(e) = self.store.delete(&self.generation).await {
            error!(
                generation = %self.generation,
                error = %e,
                "failed to discard partial generation"
            );
        }
    }

    /// Make this generation current and delete every other generation of
    /// this deployment.
    ///
    /// Idempotent: on an already active generation it only re-runs pruning.
    pub async fn activate(&self) -> OfflineResult<ActivationReport> {
        let state = self.state().await?;
        match state {
            GenerationState::Active => {
                let retired = self.prune().await?;
                debug!(
                    generation = %self.generation,
                    retired = retired.len(),
                    "generation already active"
                );
                return Ok(ActivationReport {
                    generation: self.generation.clone(),
                    retired,
                    already_active: true,
                });
            }
            GenerationState::Waiting | GenerationState::Activating => {}
            other => return Err(self.invalid_transition(other, "activate")),
        }

        let handle = self
            .store
            .handle(&self.generation)
            .await?
            .ok_or_else(|| self.invalid_transition(GenerationState::Uninstalled, "activate"))?;

        let mut manifest = self
            .store
            .manifest(&self.generation)
            .await?
            .unwrap_or_else(|| {
                GenerationManifest::new(
                    &self.generation,
                    GenerationState::Activating,
                    self.assets.len(),
                )
            });

        info!(generation = %self.generation, "activating generation");
        manifest.state = GenerationState::Activating;
        self.store.write_manifest(&handle, &manifest).await?;

        self.store.set_current(&handle).await?;

        manifest.state = GenerationState::Active;
        manifest.activated_at = Some(Utc::now());
        self.store.write_manifest(&handle, &manifest).await?;

        let retired = self.prune().await?;
        info!(
            generation = %self.generation,
            retired = retired.len(),
            "generation active"
        );

        Ok(ActivationReport {
            generation: self.generation.clone(),
            retired,
            already_active: false,
        })
    }

    /// Activate once no request is in flight.
    ///
    /// Fails fast, without waiting, if the generation is not installed.
    pub async fn activate_when_idle(
        &self,
        tracker: &InFlightTracker,
    ) -> OfflineResult<ActivationReport> {
        let state = self.state().await?;
        if matches!(state, GenerationState::Waiting | GenerationState::Activating) {
            debug!(
                generation = %self.generation,
                in_flight = tracker.in_flight(),
                "waiting for in-flight requests to drain"
            );
            tracker.wait_idle().await;
        }
        self.activate().await
    }

    /// Install, then activate right away if `skip_waiting` is set.
    pub async fn deploy(&self) -> OfflineResult<DeployReport> {
        let install = self.install().await?;
        let activation = if self.skip_waiting {
            Some(self.activate().await?)
        } else {
            None
        };
        Ok(DeployReport {
            install,
            activation,
        })
    }

    /// Delete every generation of this deployment's prefix except this one.
    async fn prune(&self) -> OfflineResult<Vec<Generation>> {
        let mut retired = Vec::new();
        for generation in self.store.list_generations().await? {
            if generation == self.generation || !generation.has_prefix(&self.cache_prefix) {
                continue;
            }
            if self.store.delete(&generation).await? {
                info!(generation = %generation, "generation retired");
                retired.push(generation);
            }
        }
        Ok(retired)
    }

    fn invalid_transition(&self, state: GenerationState, action: &'static str) -> OfflineError {
        OfflineError::InvalidTransition {
            generation: self.generation.to_string(),
            state,
            action,
        }
    }
}
