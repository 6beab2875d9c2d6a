//! Versioned cache store.
//!
//! The store is an arena of named generations plus one persisted "current"
//! pointer. Entries are addressed through a [`StoreHandle`], which pins every
//! read and write to a single generation.
//!
//! Any failure of the backing medium surfaces as
//! [`OfflineError::StoreUnavailable`](crate::OfflineError::StoreUnavailable);
//! callers on the request path treat that as a miss.
//!
//! # Disk layout
//!
//! ```text
//! {root}/CURRENT                          # tag of the current generation
//! {root}/{generation}/generation.json     # lifecycle manifest
//! {root}/{generation}/entries/{sha256}.json
//! ```

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OfflineResult;
use crate::types::{CacheKey, Generation, GenerationState, ResponseSnapshot};

mod disk;
mod io;
mod keys;
mod memory;

pub use disk::DiskCacheStore;
pub use memory::MemoryCacheStore;

/// Access token for one opened generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHandle {
    generation: Generation,
}

impl StoreHandle {
    /// Only store implementations should mint handles; everyone else gets them
    /// from [`CacheStore::open`] or [`CacheStore::handle`].
    pub fn new(generation: Generation) -> Self {
        Self { generation }
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }
}

/// A stored response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub key: CacheKey,
    pub response: ResponseSnapshot,
    pub generation: Generation,
    pub stored_at: DateTime<Utc>,
    /// `sha256:` digest of the body, verified on read.
    pub digest: String,
}

/// Persisted lifecycle record of a generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationManifest {
    pub generation: String,
    pub state: GenerationState,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub asset_count: usize,
}

impl GenerationManifest {
    pub fn new(generation: &Generation, state: GenerationState, asset_count: usize) -> Self {
        Self {
            generation: generation.to_string(),
            state,
            created_at: Utc::now(),
            activated_at: None,
            asset_count,
        }
    }
}

/// Durable key→response container, partitioned by generation.
///
/// Implementations must make `put` atomic per key: a reader sees either the
/// previous entry or the new one, never a mix. Concurrent writers to the same
/// key are last-write-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open a generation, creating it if it does not exist.
    async fn open(&self, generation: &Generation) -> OfflineResult<StoreHandle>;

    /// Handle for an existing generation, without creating it.
    async fn handle(&self, generation: &Generation) -> OfflineResult<Option<StoreHandle>>;

    async fn get(&self, handle: &StoreHandle, key: &CacheKey)
        -> OfflineResult<Option<CachedEntry>>;

    /// Store a response, replacing any entry for `key` in the handle's generation.
    ///
    /// Fails with `StoreUnavailable` if the generation was deleted.
    async fn put(
        &self,
        handle: &StoreHandle,
        key: &CacheKey,
        response: &ResponseSnapshot,
    ) -> OfflineResult<()>;

    /// Keys stored in a generation.
    async fn keys(&self, handle: &StoreHandle) -> OfflineResult<Vec<CacheKey>>;

    async fn list_generations(&self) -> OfflineResult<BTreeSet<Generation>>;

    /// Irreversibly delete a generation. Returns whether it existed.
    ///
    /// Refuses to delete the current generation.
    async fn delete(&self, generation: &Generation) -> OfflineResult<bool>;

    async fn current(&self) -> OfflineResult<Option<Generation>>;

    /// Atomically point "current" at the handle's generation.
    async fn set_current(&self, handle: &StoreHandle) -> OfflineResult<()>;

    async fn manifest(&self, generation: &Generation) -> OfflineResult<Option<GenerationManifest>>;

    async fn write_manifest(
        &self,
        handle: &StoreHandle,
        manifest: &GenerationManifest,
    ) -> OfflineResult<()>;
}
