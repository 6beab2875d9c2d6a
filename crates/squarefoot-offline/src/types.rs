//! Request, response and generation types shared by every component.

use std::fmt;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{OfflineError, OfflineResult};

/// Tag identifying one version of the cached asset set (e.g. `square-foot-v7`).
///
/// Tags double as directory names in the disk store, so only ASCII
/// alphanumerics, `.`, `_` and `-` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(String);

impl Generation {
    pub fn new(tag: impl Into<String>) -> OfflineResult<Self> {
        let tag = tag.into();
        let valid_chars = tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

        if tag.is_empty() || tag == "." || tag == ".." || !valid_chars {
            return Err(OfflineError::Config {
                message: format!("invalid generation tag: {:?}", tag),
            });
        }

        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this generation belongs to the deployment using `prefix`.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationState {
    Uninstalled,
    Installing,
    Waiting,
    Activating,
    Active,
    Retired,
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninstalled => "uninstalled",
            Self::Installing => "installing",
            Self::Waiting => "waiting",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Retired => "retired",
        };
        f.write_str(name)
    }
}

/// How the page issued the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level page load.
    Navigate,
    #[default]
    SameOrigin,
    Cors,
    NoCors,
}

/// An outgoing request as seen by the interceptor.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            mode: RequestMode::default(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// GET request for an absolute URL.
    pub fn get(url: &str) -> OfflineResult<Self> {
        Ok(Self::new(Method::GET, parse_url(url)?))
    }

    /// Top-level page load of an absolute URL.
    pub fn navigate(url: &str) -> OfflineResult<Self> {
        Ok(Self::get(url)?.with_mode(RequestMode::Navigate))
    }

    /// POST request for an absolute URL.
    pub fn post(url: &str, body: Option<Vec<u8>>) -> OfflineResult<Self> {
        let mut request = Self::new(Method::POST, parse_url(url)?);
        request.body = body;
        Ok(request)
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// GET and HEAD never mutate server state; nothing else may touch the cache.
    pub fn is_read_only(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Cache identity of this request, `None` for mutating methods.
    pub fn cache_key(&self) -> Option<CacheKey> {
        self.is_read_only()
            .then(|| CacheKey::new(&self.method, &self.url))
    }
}

fn parse_url(url: &str) -> OfflineResult<Url> {
    Url::parse(url).map_err(|e| OfflineError::InvalidRequest {
        message: format!("invalid url {:?}: {}", url, e),
    })
}

/// Normalized request identity: `METHOD url-without-fragment`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(format!("{} {}", method.as_str().to_ascii_uppercase(), url))
    }

    /// Rebuild a key read back from a store.
    pub(crate) fn from_stored(key: String) -> Self {
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored or live response: status, headers and body, treated as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ResponseSnapshot {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> OfflineResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| OfflineError::InvalidResponse {
            message: format!("failed to parse JSON body: {}", e),
        })
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseSource {
    /// Live network fetch.
    Network,

    /// Cache hit for the request's own key.
    Cache { generation: Generation },

    /// Network failed; served a cached entry instead.
    Fallback { generation: Generation, key: CacheKey },
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Cache { generation } => write!(f, "cache:{}", generation),
            Self::Fallback { generation, key } => write!(f, "fallback:{}:{}", generation, key),
        }
    }
}

/// Response handed back to the page.
#[derive(Debug, Clone)]
pub struct Served {
    pub response: ResponseSnapshot,
    pub source: ResponseSource,
}

impl Served {
    pub fn network(response: ResponseSnapshot) -> Self {
        Self {
            response,
            source: ResponseSource::Network,
        }
    }

    pub fn is_from_network(&self) -> bool {
        self.source == ResponseSource::Network
    }
}
