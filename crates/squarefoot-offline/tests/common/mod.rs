//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use squarefoot_offline::{
    Fetcher, OfflineConfig, OfflineError, OfflineResult, Request, ResponseSnapshot,
};

pub const ORIGIN: &str = "http://localhost:8000";

pub fn url(path: &str) -> String {
    format!("{}{}", ORIGIN, path)
}

/// Config pointing at [`ORIGIN`] with the two-asset core set used in the scenarios.
pub fn config(version: &str) -> OfflineConfig {
    OfflineConfig::default()
        .with_origin(ORIGIN)
        .with_version(version)
        .with_core_assets(["/", "/app.js"])
        .with_max_retries(0)
}

/// In-process network: scripted bodies per path, a global offline switch,
/// per-path transport failures and hit counts.
#[derive(Default)]
pub struct FakeNetwork {
    routes: Mutex<HashMap<String, ResponseSnapshot>>,
    broken: Mutex<HashSet<String>>,
    hits: Mutex<HashMap<String, usize>>,
    offline: AtomicBool,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with status 200 for `path` (path and query).
    pub fn serve(&self, path: &str, body: &str) {
        self.serve_status(path, 200, body);
    }

    pub fn serve_status(&self, path: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), ResponseSnapshot::new(status, body));
    }

    /// Make one path fail at the transport level.
    pub fn break_path(&self, path: &str) {
        self.broken.lock().unwrap().insert(path.to_string());
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Requests that reached the network for `path`, failed ones included.
    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

fn route_of(request: &Request) -> String {
    match request.url.query() {
        Some(query) => format!("{}?{}", request.url.path(), query),
        None => request.url.path().to_string(),
    }
}

#[async_trait]
impl Fetcher for FakeNetwork {
    async fn fetch(&self, request: &Request) -> OfflineResult<ResponseSnapshot> {
        let route = route_of(request);
        *self.hits.lock().unwrap().entry(route.clone()).or_default() += 1;

        if self.offline.load(Ordering::SeqCst) || self.broken.lock().unwrap().contains(&route) {
            return Err(OfflineError::NetworkFailure {
                url: request.url.to_string(),
                message: "connection refused".to_string(),
            });
        }

        Ok(self
            .routes
            .lock()
            .unwrap()
            .get(&route)
            .cloned()
            .unwrap_or_else(|| ResponseSnapshot::new(404, "Not Found")))
    }
}
