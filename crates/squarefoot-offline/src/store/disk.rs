//! Disk-backed cache store.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use super::io::{default_store_dir, dir_exists, is_temp_file, read_optional, write_atomic};
use super::keys::{entries_dir, entry_path, generation_dir, CURRENT_FILE, MANIFEST_FILE};
use super::{CacheStore, CachedEntry, GenerationManifest, StoreHandle};
use crate::digest::sha256_digest;
use crate::error::{OfflineError, OfflineResult};
use crate::types::{CacheKey, Generation, GenerationState, ResponseSnapshot};

/// On-disk form of a [`CachedEntry`]. One file per key.
#[derive(Debug, Serialize, Deserialize)]
struct EntryRecord {
    key: String,
    generation: String,
    status: u16,
    #[serde(default)]
    headers: Vec<(String, String)>,
    stored_at: DateTime<Utc>,
    digest: String,
    /// Base64 body.
    body: String,
}

/// Cache store with one directory per generation.
#[derive(Debug, Clone)]
pub struct DiskCacheStore {
    root: PathBuf,
}

impl DiskCacheStore {
    /// Store under the platform cache directory (`~/.cache/square-foot/offline` on Linux).
    pub fn new() -> OfflineResult<Self> {
        Ok(Self {
            root: default_store_dir()?,
        })
    }

    pub fn with_dir(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn require_generation(&self, generation: &Generation) -> OfflineResult<()> {
        if dir_exists(&generation_dir(&self.root, generation)).await? {
            Ok(())
        } else {
            Err(OfflineError::store(format!(
                "generation {} does not exist",
                generation
            )))
        }
    }

    fn decode_entry(&self, key: &CacheKey, bytes: &[u8]) -> Option<CachedEntry> {
        let record: EntryRecord = match serde_json::from_slice(bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!(key = %key, error = %e, "unreadable cache entry, treating as miss");
                return None;
            }
        };

        if record.key != key.as_str() {
            warn!(key = %key, stored = %record.key, "cache entry key mismatch, treating as miss");
            return None;
        }

        let body = match BASE64.decode(record.body.as_bytes()) {
            Ok(body) => body,
            Err(e) => {
                warn!(key = %key, error = %e, "invalid cache entry body, treating as miss");
                return None;
            }
        };

        let actual = sha256_digest(&body);
        if actual != record.digest {
            warn!(
                key = %key,
                expected = %record.digest,
                actual = %actual,
                "cache integrity check failed, treating as miss"
            );
            return None;
        }

        let generation = Generation::new(record.generation).ok()?;

        Some(CachedEntry {
            key: key.clone(),
            response: ResponseSnapshot {
                status: record.status,
                headers: record.headers,
                body,
            },
            generation,
            stored_at: record.stored_at,
            digest: record.digest,
        })
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    async fn open(&self, generation: &Generation) -> OfflineResult<StoreHandle> {
        let dir = entries_dir(&self.root, generation);
        fs::create_dir_all(&dir).await.map_err(|e| {
            OfflineError::store(format!(
                "failed to create generation directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        debug!(generation = %generation, "opened generation");
        Ok(StoreHandle::new(generation.clone()))
    }

    async fn handle(&self, generation: &Generation) -> OfflineResult<Option<StoreHandle>> {
        if dir_exists(&generation_dir(&self.root, generation)).await? {
            Ok(Some(StoreHandle::new(generation.clone())))
        } else {
            Ok(None)
        }
    }

    async fn get(
        &self,
        handle: &StoreHandle,
        key: &CacheKey,
    ) -> OfflineResult<Option<CachedEntry>> {
        let path = entry_path(&self.root, handle.generation(), key);

        match read_optional(&path).await? {
            Some(bytes) => Ok(self.decode_entry(key, &bytes)),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        handle: &StoreHandle,
        key: &CacheKey,
        response: &ResponseSnapshot,
    ) -> OfflineResult<()> {
        let generation = handle.generation();
        self.require_generation(generation).await?;

        let record = EntryRecord {
            key: key.to_string(),
            generation: generation.to_string(),
            status: response.status,
            headers: response.headers.clone(),
            stored_at: Utc::now(),
            digest: sha256_digest(&response.body),
            body: BASE64.encode(&response.body),
        };

        let json = serde_json::to_vec(&record).map_err(|e| {
            OfflineError::store(format!("failed to serialize cache entry: {}", e))
        })?;

        write_atomic(&entry_path(&self.root, generation, key), &json).await?;

        debug!(generation = %generation, key = %key, status = response.status, "stored entry");
        Ok(())
    }

    async fn keys(&self, handle: &StoreHandle) -> OfflineResult<Vec<CacheKey>> {
        let dir = entries_dir(&self.root, handle.generation());
        let mut keys = Vec::new();

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(keys),
            Err(e) => {
                return Err(OfflineError::store(format!(
                    "failed to read {}: {}",
                    dir.display(),
                    e
                )))
            }
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| OfflineError::store(format!("failed to read directory entry: {}", e)))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_temp_file(&name) || !name.ends_with(".json") {
                continue;
            }

            let Some(bytes) = read_optional(&entry.path()).await? else {
                continue;
            };
            if let Ok(record) = serde_json::from_slice::<EntryRecord>(&bytes) {
                keys.push(CacheKey::from_stored(record.key));
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn list_generations(&self) -> OfflineResult<BTreeSet<Generation>> {
        let mut generations = BTreeSet::new();

        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(generations),
            Err(e) => {
                return Err(OfflineError::store(format!(
                    "failed to read store root {}: {}",
                    self.root.display(),
                    e
                )))
            }
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| OfflineError::store(format!("failed to read directory entry: {}", e)))?
        {
            if !dir_exists(&entry.path()).await? {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match Generation::new(name.clone()) {
                Ok(generation) => {
                    generations.insert(generation);
                }
                Err(_) => debug!(name = %name, "skipping non-generation directory"),
            }
        }

        Ok(generations)
    }

    async fn delete(&self, generation: &Generation) -> OfflineResult<bool> {
        if self.current().await?.as_ref() == Some(generation) {
            return Err(OfflineError::InvalidTransition {
                generation: generation.to_string(),
                state: GenerationState::Active,
                action: "delete",
            });
        }

        let dir = generation_dir(&self.root, generation);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(generation = %generation, "deleted generation");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(OfflineError::store(format!(
                "failed to delete generation {}: {}",
                generation, e
            ))),
        }
    }

    async fn current(&self) -> OfflineResult<Option<Generation>> {
        let Some(bytes) = read_optional(&self.root.join(CURRENT_FILE)).await? else {
            return Ok(None);
        };

        let tag = String::from_utf8_lossy(&bytes).trim().to_string();
        if tag.is_empty() {
            return Ok(None);
        }

        Generation::new(tag)
            .map(Some)
            .map_err(|e| OfflineError::store(format!("corrupt current pointer: {}", e)))
    }

    async fn set_current(&self, handle: &StoreHandle) -> OfflineResult<()> {
        let generation = handle.generation();
        self.require_generation(generation).await?;

        write_atomic(
            &self.root.join(CURRENT_FILE),
            generation.as_str().as_bytes(),
        )
        .await?;

        debug!(generation = %generation, "current pointer updated");
        Ok(())
    }

    async fn manifest(&self, generation: &Generation) -> OfflineResult<Option<GenerationManifest>> {
        let path = generation_dir(&self.root, generation).join(MANIFEST_FILE);
        let Some(bytes) = read_optional(&path).await? else {
            return Ok(None);
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| OfflineError::store(format!("failed to parse manifest: {}", e)))
    }

    async fn write_manifest(
        &self,
        handle: &StoreHandle,
        manifest: &GenerationManifest,
    ) -> OfflineResult<()> {
        let generation = handle.generation();
        self.require_generation(generation).await?;

        let json = serde_json::to_vec_pretty(manifest)
            .map_err(|e| OfflineError::store(format!("failed to serialize manifest: {}", e)))?;

        write_atomic(&generation_dir(&self.root, generation).join(MANIFEST_FILE), &json).await
    }
}
