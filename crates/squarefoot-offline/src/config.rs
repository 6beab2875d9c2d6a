//! Deployment configuration.
//!
//! Loaded once at startup (usually from YAML) and never mutated afterwards.
//! Every field has a default matching the dashboard's own deployment, so a
//! config file only needs to list what differs:
//!
//! ```yaml
//! origin: "https://squarefoot.example"
//! version: "v8"
//! core_assets: ["/", "/app.js", "/styles.css"]
//! strategies:
//!   network_data: network_first
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::classify::Category;
use crate::error::{OfflineError, OfflineResult};
use crate::strategy::Strategy;
use crate::types::{CacheKey, Generation};

/// Offline layer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineConfig {
    /// Origin the page is served from; core assets are resolved against it.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Namespace shared by every generation of this deployment.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Asset set version. Bump on every deployment.
    #[serde(default = "default_version")]
    pub version: String,

    /// Paths that must be stored before a generation may become current.
    #[serde(default = "default_core_assets")]
    pub core_assets: Vec<String>,

    /// Path prefixes of live-data endpoints.
    #[serde(default = "default_never_cache_prefixes")]
    pub never_cache_prefixes: Vec<String>,

    /// Strategy per request category.
    #[serde(default)]
    pub strategies: StrategyTable,

    /// Cached page served to navigations when both network and the exact key miss.
    #[serde(default = "default_navigation_fallback")]
    pub navigation_fallback: Option<String>,

    /// Store non-2xx responses under cache-first.
    #[serde(default)]
    pub cache_non_success: bool,

    /// Refresh the cached copy after a successful network-first fetch.
    #[serde(default = "default_true")]
    pub refresh_on_network_first: bool,

    /// Activate right after a successful install instead of waiting for a cutover signal.
    #[serde(default)]
    pub skip_waiting: bool,

    /// Root directory of the disk store (default: platform cache dir).
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Network settings for the HTTP fetcher.
    #[serde(default)]
    pub network: NetworkConfig,
}

/// Strategy assignment per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyTable {
    #[serde(default = "default_navigation_strategy")]
    pub navigation_document: Strategy,

    #[serde(default = "default_static_strategy")]
    pub static_asset: Strategy,

    #[serde(default = "default_data_strategy")]
    pub network_data: Strategy,
}

impl Default for StrategyTable {
    fn default() -> Self {
        Self {
            navigation_document: default_navigation_strategy(),
            static_asset: default_static_strategy(),
            network_data: default_data_strategy(),
        }
    }
}

impl StrategyTable {
    pub fn for_category(&self, category: Category) -> Strategy {
        match category {
            Category::NavigationDocument => self.navigation_document,
            Category::StaticAsset => self.static_asset,
            Category::NetworkData => self.network_data,
        }
    }

    pub fn set(&mut self, category: Category, strategy: Strategy) {
        match category {
            Category::NavigationDocument => self.navigation_document = strategy,
            Category::StaticAsset => self.static_asset = strategy,
            Category::NetworkData => self.network_data = strategy,
        }
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Retries for transport failures on read-only requests.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_origin() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_cache_prefix() -> String {
    "square-foot-".to_string()
}

fn default_version() -> String {
    "v7".to_string()
}

fn default_core_assets() -> Vec<String> {
    [
        "/",
        "/app.js",
        "/sw.js",
        "/styles.css",
        "/antd.min.css",
        "/quill.snow.css",
        "/square-foot-logo.png?v=3",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_never_cache_prefixes() -> Vec<String> {
    [
        "/competitions",
        "/predict",
        "/save",
        "/leagues",
        "/matches",
        "/data/",
        "/icons/",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_navigation_fallback() -> Option<String> {
    Some("/".to_string())
}

fn default_navigation_strategy() -> Strategy {
    Strategy::NetworkFirst
}

fn default_static_strategy() -> Strategy {
    Strategy::CacheFirst
}

fn default_data_strategy() -> Strategy {
    Strategy::NeverCache
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            cache_prefix: default_cache_prefix(),
            version: default_version(),
            core_assets: default_core_assets(),
            never_cache_prefixes: default_never_cache_prefixes(),
            strategies: StrategyTable::default(),
            navigation_fallback: default_navigation_fallback(),
            cache_non_success: false,
            refresh_on_network_first: default_true(),
            skip_waiting: false,
            cache_dir: None,
            network: NetworkConfig::default(),
        }
    }
}

impl OfflineConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> OfflineResult<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| OfflineError::Config {
            message: format!("failed to parse config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> OfflineResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| OfflineError::Config {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> OfflineResult<()> {
        self.generation()?;

        let origin = self.origin_url()?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(config_error(format!(
                "origin must be http or https, got {}",
                origin.scheme()
            )));
        }

        if self.core_assets.is_empty() {
            return Err(config_error("core_assets must not be empty"));
        }
        for asset in &self.core_assets {
            if !asset.starts_with('/') {
                return Err(config_error(format!(
                    "core asset {:?} must be an absolute path",
                    asset
                )));
            }
            self.resolve(asset)?;
        }

        for prefix in &self.never_cache_prefixes {
            if !prefix.starts_with('/') {
                return Err(config_error(format!(
                    "never-cache prefix {:?} must start with '/'",
                    prefix
                )));
            }
        }

        if let Some(fallback) = &self.navigation_fallback {
            if !fallback.starts_with('/') {
                return Err(config_error(format!(
                    "navigation_fallback {:?} must be an absolute path",
                    fallback
                )));
            }
        }

        if self.network.timeout_secs == 0 {
            return Err(config_error("network.timeout_secs must be greater than zero"));
        }

        Ok(())
    }

    /// Tag of the generation this deployment installs.
    pub fn generation(&self) -> OfflineResult<Generation> {
        if self.version.is_empty() {
            return Err(config_error("version must not be empty"));
        }
        Generation::new(format!("{}{}", self.cache_prefix, self.version))
    }

    pub fn origin_url(&self) -> OfflineResult<Url> {
        Url::parse(&self.origin)
            .map_err(|e| config_error(format!("invalid origin {:?}: {}", self.origin, e)))
    }

    /// Absolute URL of a path on the origin.
    pub fn resolve(&self, path: &str) -> OfflineResult<Url> {
        self.origin_url()?
            .join(path)
            .map_err(|e| config_error(format!("invalid path {:?}: {}", path, e)))
    }

    /// Cache key of the navigation fallback page, if one is configured.
    pub fn navigation_fallback_key(&self) -> OfflineResult<Option<CacheKey>> {
        self.navigation_fallback
            .as_deref()
            .map(|path| Ok(CacheKey::new(&reqwest::Method::GET, &self.resolve(path)?)))
            .transpose()
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_cache_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cache_prefix = prefix.into();
        self
    }

    pub fn with_core_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.core_assets = assets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_never_cache_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.never_cache_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_strategy(mut self, category: Category, strategy: Strategy) -> Self {
        self.strategies.set(category, strategy);
        self
    }

    pub fn with_navigation_fallback(mut self, path: Option<&str>) -> Self {
        self.navigation_fallback = path.map(String::from);
        self
    }

    pub fn with_cache_non_success(mut self, enabled: bool) -> Self {
        self.cache_non_success = enabled;
        self
    }

    pub fn with_skip_waiting(mut self, enabled: bool) -> Self {
        self.skip_waiting = enabled;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.network.max_retries = retries;
        self
    }
}

fn config_error(message: impl Into<String>) -> OfflineError {
    OfflineError::Config {
        message: message.into(),
    }
}
