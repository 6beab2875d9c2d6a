//! Offline delivery layer for the Square Foot prediction dashboard.
//!
//! Every outgoing request from the page goes through an [`Interceptor`] that
//! decides, per request, whether to answer from a local cache, from the
//! network, or from the network with a cached fallback:
//!
//! - Route classification (page shell, static asset, live API data)
//! - Fetch strategies (cache-first, network-first, never-cache, cache-only)
//! - Versioned cache generations with atomic cutover and pruning
//! - A typed client for the backend prediction API
//!
//! # Quick Start
//!
//! ```no_run
//! use squarefoot_offline::{OfflineConfig, OfflineRuntime, Request};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = OfflineConfig::load("offline.yaml")?;
//! let runtime = OfflineRuntime::from_config(config)?;
//!
//! // Provision the core asset set for this version.
//! runtime.lifecycle().deploy().await?;
//! runtime.activate_when_idle().await?;
//!
//! // Serve a page load.
//! let request = Request::navigate("http://127.0.0.1:8000/")?;
//! let served = runtime.interceptor().handle(&request).await?;
//! println!("{} from {}", served.response.status, served.source);
//! # Ok(())
//! # }
//! ```
//!
//! # Generations
//!
//! A generation is one complete copy of the core asset set, tagged
//! `{cache_prefix}{version}`. Bumping `version` installs a new generation next
//! to the old one; activation swaps the current pointer and deletes every
//! other generation carrying the same prefix.

pub mod classify;
pub mod config;
pub mod dashboard;
mod digest;
pub mod error;
pub mod fetch;
pub mod inflight;
pub mod interceptor;
pub mod lifecycle;
pub mod runtime;
pub mod store;
pub mod strategy;
pub mod types;

pub use classify::{Category, RouteClassifier};
pub use config::{NetworkConfig, OfflineConfig, StrategyTable};
pub use dashboard::{
    Competitions, DashboardClient, MatchPrediction, PredictionQuery, PredictionReport, SaveReport,
};
pub use error::{OfflineError, OfflineResult};
pub use fetch::{Fetcher, HttpFetcher, FETCHER_USER_AGENT};
pub use inflight::{InFlightGuard, InFlightTracker};
pub use interceptor::Interceptor;
pub use lifecycle::{ActivationReport, DeployReport, InstallReport, LifecycleController};
pub use runtime::OfflineRuntime;
pub use store::{
    CacheStore, CachedEntry, DiskCacheStore, GenerationManifest, MemoryCacheStore, StoreHandle,
};
pub use strategy::{Strategy, StrategyEngine, StrategyPolicy};
pub use types::{
    CacheKey, Generation, GenerationState, Request, RequestMode, ResponseSnapshot, ResponseSource,
    Served,
};
