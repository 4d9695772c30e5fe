#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use tokio::sync::{Mutex, Notify};

use spool_core::impls::{InMemoryCache, InMemoryLockService, InMemoryObjectStore, StoreOp};
use spool_core::ports::{CacheError, FixedClock, KeyValueCache};
use spool_core::{EngineConfig, ResumableUploadStore, UploadId, UploadStoreBuilder};

pub struct Harness {
    pub store: Arc<ResumableUploadStore>,
    pub objects: Arc<InMemoryObjectStore>,
    pub cache: Arc<InMemoryCache>,
    pub locks: Arc<InMemoryLockService>,
    pub clock: Arc<FixedClock>,
}

/// Engine whose part-size floor is `min_part_size` on both sides.
pub fn harness(min_part_size: usize) -> Harness {
    harness_with(EngineConfig {
        min_part_size,
        expiration_secs: 60,
        lock_timeout_secs: 1,
        ..EngineConfig::default()
    })
}

pub fn harness_with(config: EngineConfig) -> Harness {
    assemble(config, |cache| cache as Arc<dyn KeyValueCache>)
}

/// Like [`harness`], with writes to the cache scriptable through the returned handle.
pub fn scripted_harness(min_part_size: usize) -> (Harness, Arc<ScriptedCache>) {
    let mut scripted = None;
    let h = assemble(
        EngineConfig {
            min_part_size,
            expiration_secs: 60,
            lock_timeout_secs: 1,
            ..EngineConfig::default()
        },
        |cache| {
            let front = Arc::new(ScriptedCache::new(cache));
            scripted = Some(front.clone());
            front as Arc<dyn KeyValueCache>
        },
    );
    (h, scripted.unwrap())
}

fn assemble(
    config: EngineConfig,
    front: impl FnOnce(Arc<InMemoryCache>) -> Arc<dyn KeyValueCache>,
) -> Harness {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
    ));
    let objects = Arc::new(InMemoryObjectStore::with_min_part_size(config.min_part_size));
    let cache = Arc::new(InMemoryCache::new(clock.clone()));
    let locks = Arc::new(InMemoryLockService::new());

    let store = UploadStoreBuilder::new(config)
        .cache(front(cache.clone()))
        .locks(locks.clone())
        .object_store(objects.clone())
        .clock(clock.clone())
        .build()
        .unwrap();

    Harness {
        store: Arc::new(store),
        objects,
        cache,
        locks,
        clock,
    }
}

impl Harness {
    pub fn file_key(&self, id: &UploadId) -> String {
        format!("local/tus/files/{id}")
    }

    /// Journal entries touching the upload body only.
    pub async fn file_ops(&self, id: &UploadId) -> Vec<StoreOp> {
        let key = self.file_key(id);
        self.objects
            .journal()
            .await
            .into_iter()
            .filter(|op| match op {
                StoreOp::Put { key: k, .. }
                | StoreOp::InitiateMultipart { key: k }
                | StoreOp::UploadPart { key: k, .. }
                | StoreOp::CompleteMultipart { key: k, .. }
                | StoreOp::AbortMultipart { key: k }
                | StoreOp::Delete { key: k }
                | StoreOp::SetMetadata { key: k } => *k == key,
            })
            .collect()
    }

    /// Sizes of uploaded parts, in flush order.
    pub async fn part_sizes(&self, id: &UploadId) -> Vec<(u32, usize)> {
        self.file_ops(id)
            .await
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::UploadPart {
                    part_number, size, ..
                } => Some((part_number, size)),
                _ => None,
            })
            .collect()
    }

    pub async fn content(&self, id: &UploadId) -> Bytes {
        let chunks: Vec<Bytes> = self
            .store
            .get_content(id)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        Bytes::from(chunks.concat())
    }

    /// Append `data` split into chunks whose sizes cycle through `pattern`.
    pub async fn append_chunked(&self, id: &UploadId, data: &Bytes, pattern: &[usize]) {
        let mut sent = 0;
        for size in pattern.iter().cycle() {
            if sent == data.len() {
                break;
            }
            let end = (sent + size).min(data.len());
            let accepted = self
                .store
                .append_bytes(id, data.slice(sent..end))
                .await
                .unwrap();
            assert_eq!(accepted as usize, end - sent);
            sent = end;
        }
    }
}

/// Paused write; signals `entered` when reached, continues after `release`.
#[derive(Clone)]
pub struct CacheGate {
    suffix: String,
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

#[derive(Default)]
struct Script {
    failures: Vec<String>,
    gate: Option<CacheGate>,
}

/// Cache whose next write to a key ending in a given suffix can fail or pause.
pub struct ScriptedCache {
    inner: Arc<InMemoryCache>,
    script: Mutex<Script>,
}

impl ScriptedCache {
    pub fn new(inner: Arc<InMemoryCache>) -> Self {
        Self {
            inner,
            script: Mutex::new(Script::default()),
        }
    }

    pub async fn fail_next_write(&self, suffix: &str) {
        self.script.lock().await.failures.push(suffix.to_string());
    }

    pub async fn pause_next_write(&self, suffix: &str) -> CacheGate {
        let gate = CacheGate {
            suffix: suffix.to_string(),
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        self.script.lock().await.gate = Some(gate.clone());
        gate
    }

    async fn before_write(&self, key: &str) -> Result<(), CacheError> {
        let gate = {
            let mut script = self.script.lock().await;
            if let Some(pos) = script.failures.iter().position(|s| key.ends_with(s.as_str())) {
                script.failures.remove(pos);
                return Err(CacheError::Unavailable(format!("injected failure writing {key}")));
            }
            if script
                .gate
                .as_ref()
                .is_some_and(|g| key.ends_with(g.suffix.as_str()))
            {
                script.gate.take()
            } else {
                None
            }
        };
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueCache for ScriptedCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        self.before_write(key).await?;
        self.inner.set(key, value, ttl).await
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.before_write(key).await?;
        self.inner.remove(key).await
    }
}

/// Deterministic, non-repeating-at-part-boundaries payload.
pub fn payload(len: usize) -> Bytes {
    (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
}
