//! HTTP layer: transport, retry, snapshot conversion.
//!
//! Every HTTP status is a valid response here. Only transport-level failures
//! (connect, DNS, timeout, truncated body) become `NetworkFailure`.

use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};
use tracing::{debug, warn};

use crate::error::{OfflineError, OfflineResult};
use crate::types::{Request, ResponseSnapshot};

/// HTTP backend (holds the reqwest client and retry budget).
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) client: reqwest::Client,
    pub(crate) max_retries: u32,
}

impl HttpBackend {
    /// Send a request, retrying transport failures for read-only methods.
    pub(crate) async fn send(&self, request: &Request) -> OfflineResult<ResponseSnapshot> {
        use rand::Rng;

        let max_retries = if request.is_read_only() {
            self.max_retries
        } else {
            0
        };
        let mut retries = 0;

        loop {
            match self.send_once(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && retries < max_retries => {
                    retries += 1;

                    let base_backoff =
                        Duration::from_secs(1 << retries).min(Duration::from_secs(30));
                    let jittered_ms =
                        rand::thread_rng().gen_range(0..=base_backoff.as_millis() as u64);
                    let backoff = Duration::from_millis(jittered_ms.max(10));

                    warn!(
                        error = %e,
                        retry = retries,
                        max_retries = max_retries,
                        backoff_ms = backoff.as_millis(),
                        "retrying request"
                    );

                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, request: &Request) -> OfflineResult<ResponseSnapshot> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                OfflineError::InvalidRequest {
                    message: format!("invalid header name {:?}: {}", name, e),
                }
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| OfflineError::InvalidRequest {
                message: format!("invalid header value for {}: {}", name, e),
            })?;
            builder = builder.header(name, value);
        }

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| network_failure(request, e))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| network_failure(request, e))?
            .to_vec();

        debug!(method = %request.method, url = %request.url, status, "fetched");

        Ok(ResponseSnapshot {
            status,
            headers,
            body,
        })
    }
}

fn network_failure(request: &Request, err: reqwest::Error) -> OfflineError {
    OfflineError::NetworkFailure {
        url: request.url.to_string(),
        message: err.to_string(),
    }
}
