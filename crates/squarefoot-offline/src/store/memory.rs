//! In-memory cache store.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{CacheStore, CachedEntry, GenerationManifest, StoreHandle};
use crate::digest::sha256_digest;
use crate::error::{OfflineError, OfflineResult};
use crate::types::{CacheKey, Generation, GenerationState, ResponseSnapshot};

#[derive(Debug, Default)]
struct GenerationSlot {
    manifest: Option<GenerationManifest>,
    entries: HashMap<CacheKey, CachedEntry>,
}

#[derive(Debug, Default)]
struct Arena {
    generations: BTreeMap<Generation, GenerationSlot>,
    current: Option<Generation>,
}

/// Arena of named generations held in process memory.
///
/// Same contract as [`DiskCacheStore`](super::DiskCacheStore) without
/// durability; useful for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    arena: RwLock<Arena>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(generation: &Generation) -> OfflineError {
    OfflineError::store(format!("generation {} does not exist", generation))
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn open(&self, generation: &Generation) -> OfflineResult<StoreHandle> {
        self.arena
            .write()
            .await
            .generations
            .entry(generation.clone())
            .or_default();
        Ok(StoreHandle::new(generation.clone()))
    }

    async fn handle(&self, generation: &Generation) -> OfflineResult<Option<StoreHandle>> {
        let arena = self.arena.read().await;
        Ok(arena
            .generations
            .contains_key(generation)
            .then(|| StoreHandle::new(generation.clone())))
    }

    async fn get(
        &self,
        handle: &StoreHandle,
        key: &CacheKey,
    ) -> OfflineResult<Option<CachedEntry>> {
        let arena = self.arena.read().await;
        Ok(arena
            .generations
            .get(handle.generation())
            .and_then(|slot| slot.entries.get(key))
            .cloned())
    }

    async fn put(
        &self,
        handle: &StoreHandle,
        key: &CacheKey,
        response: &ResponseSnapshot,
    ) -> OfflineResult<()> {
        let mut arena = self.arena.write().await;
        let slot = arena
            .generations
            .get_mut(handle.generation())
            .ok_or_else(|| missing(handle.generation()))?;

        slot.entries.insert(
            key.clone(),
            CachedEntry {
                key: key.clone(),
                response: response.clone(),
                generation: handle.generation().clone(),
                stored_at: Utc::now(),
                digest: sha256_digest(&response.body),
            },
        );
        Ok(())
    }

    async fn keys(&self, handle: &StoreHandle) -> OfflineResult<Vec<CacheKey>> {
        let arena = self.arena.read().await;
        let mut keys: Vec<CacheKey> = arena
            .generations
            .get(handle.generation())
            .map(|slot| slot.entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    async fn list_generations(&self) -> OfflineResult<BTreeSet<Generation>> {
        Ok(self.arena.read().await.generations.keys().cloned().collect())
    }

    async fn delete(&self, generation: &Generation) -> OfflineResult<bool> {
        let mut arena = self.arena.write().await;
        if arena.current.as_ref() == Some(generation) {
            return Err(OfflineError::InvalidTransition {
                generation: generation.to_string(),
                state: GenerationState::Active,
                action: "delete",
            });
        }
        Ok(arena.generations.remove(generation).is_some())
    }

    async fn current(&self) -> OfflineResult<Option<Generation>> {
        Ok(self.arena.read().await.current.clone())
    }

    async fn set_current(&self, handle: &StoreHandle) -> OfflineResult<()> {
        let mut arena = self.arena.write().await;
        if !arena.generations.contains_key(handle.generation()) {
            return Err(missing(handle.generation()));
        }
        arena.current = Some(handle.generation().clone());
        Ok(())
    }

    async fn manifest(&self, generation: &Generation) -> OfflineResult<Option<GenerationManifest>> {
        let arena = self.arena.read().await;
        Ok(arena
            .generations
            .get(generation)
            .and_then(|slot| slot.manifest.clone()))
    }

    async fn write_manifest(
        &self,
        handle: &StoreHandle,
        manifest: &GenerationManifest,
    ) -> OfflineResult<()> {
        let mut arena = self.arena.write().await;
        let slot = arena
            .generations
            .get_mut(handle.generation())
            .ok_or_else(|| missing(handle.generation()))?;
        slot.manifest = Some(manifest.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;
    use url::Url;

    fn key(path: &str) -> CacheKey {
        CacheKey::new(
            &Method::GET,
            &Url::parse(&format!("http://localhost{}", path)).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = MemoryCacheStore::new();
        let handle = store
            .open(&Generation::new("square-foot-v7").unwrap())
            .await
            .unwrap();

        store
            .put(&handle, &key("/app.js"), &ResponseSnapshot::new(200, "first"))
            .await
            .unwrap();
        store
            .put(&handle, &key("/app.js"), &ResponseSnapshot::new(200, "second"))
            .await
            .unwrap();

        let entry = store.get(&handle, &key("/app.js")).await.unwrap().unwrap();
        assert_eq!(entry.response.body, b"second");
    }

    #[tokio::test]
    async fn test_delete_removes_all_keys() {
        let store = MemoryCacheStore::new();
        let old = Generation::new("square-foot-v6").unwrap();
        let handle = store.open(&old).await.unwrap();
        store
            .put(&handle, &key("/"), &ResponseSnapshot::new(200, "<html>"))
            .await
            .unwrap();

        assert!(store.delete(&old).await.unwrap());
        assert!(store.get(&handle, &key("/")).await.unwrap().is_none());
        assert!(store.handle(&old).await.unwrap().is_none());
        assert!(!store.delete(&old).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_current_requires_existing_generation() {
        let store = MemoryCacheStore::new();
        let handle = StoreHandle::new(Generation::new("square-foot-v9").unwrap());
        assert!(store.set_current(&handle).await.unwrap_err().is_store_unavailable());
    }
}
