//! Network fetch primitive.
//!
//! Public API: no status code knowledge. Transport handling lives in http.rs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::config::NetworkConfig;
use crate::error::{OfflineError, OfflineResult};
use crate::types::{Request, ResponseSnapshot};

mod http;

use http::HttpBackend;

pub const FETCHER_USER_AGENT: &str = concat!("squarefoot-offline/", env!("CARGO_PKG_VERSION"));

/// Issues live network requests on behalf of the strategies.
///
/// A non-success status is `Ok`; only transport failures are
/// [`OfflineError::NetworkFailure`]. Timeouts are the implementation's job.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> OfflineResult<ResponseSnapshot>;
}

/// reqwest-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: HttpBackend,
}

impl HttpFetcher {
    pub fn new(config: &NetworkConfig) -> OfflineResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(FETCHER_USER_AGENT));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| OfflineError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http: HttpBackend {
                client,
                max_retries: config.max_retries,
            },
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> OfflineResult<ResponseSnapshot> {
        self.http.send(request).await
    }
}
