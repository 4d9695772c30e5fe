//! UploadStoreBuilder - ResumableUploadStore の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 開発体験の改善（明確なエラーメッセージ）

use std::sync::Arc;

use super::append::AppendEngine;
use super::delete::UploadDeleter;
use super::sessions::SessionManager;
use super::store::ResumableUploadStore;
use super::sweeper::ExpirationSweeper;
use crate::config::{ConfigError, EngineConfig};
use crate::ports::{
    Clock, IdGenerator, KeyValueCache, LockService, ObjectStore, SystemClock, UlidGenerator,
};

/// UploadStoreBuilder は ResumableUploadStore を構築
///
/// # 使用例
/// ```ignore
/// let store = UploadStoreBuilder::new(EngineConfig::default())
///     .cache(Arc::new(redis_cache))
///     .locks(Arc::new(redis_locks))
///     .object_store(Arc::new(s3))
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - cache / locks / object_store は必須。足りなければ BuildError
/// - 設定はオブジェクトストアの最小パートサイズに対して検証する
/// - clock / id_generator は省略可（SystemClock / ULID）
pub struct UploadStoreBuilder {
    config: EngineConfig,
    cache: Option<Arc<dyn KeyValueCache>>,
    locks: Option<Arc<dyn LockService>>,
    object_store: Option<Arc<dyn ObjectStore>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

/// BuildError はストア構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing collaborator: {0}. Provide it before calling build().")]
    MissingCollaborator(&'static str),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl UploadStoreBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            cache: None,
            locks: None,
            object_store: None,
            clock: None,
            ids: None,
        }
    }

    pub fn cache(mut self, cache: Arc<dyn KeyValueCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn locks(mut self, locks: Arc<dyn LockService>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// 検証してから全コンポーネントを配線する
    pub fn build(self) -> Result<ResumableUploadStore, BuildError> {
        let cache = self.cache.ok_or(BuildError::MissingCollaborator("cache"))?;
        let locks = self.locks.ok_or(BuildError::MissingCollaborator("locks"))?;
        let store = self
            .object_store
            .ok_or(BuildError::MissingCollaborator("object_store"))?;

        self.config.validate(store.min_part_size())?;

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids: Arc<dyn IdGenerator> = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));

        let sessions = Arc::new(SessionManager::new(
            cache,
            store.clone(),
            locks.clone(),
            clock.clone(),
            ids,
            &self.config,
        ));
        let engine = AppendEngine::new(
            sessions.clone(),
            store.clone(),
            locks.clone(),
            self.config.min_part_size,
            self.config.lock_timeout(),
        );
        let deleter = Arc::new(UploadDeleter::new(
            sessions.clone(),
            store.clone(),
            locks,
            self.config.lock_timeout(),
        ));
        let sweeper = Arc::new(ExpirationSweeper::new(
            sessions.clone(),
            store.clone(),
            deleter.clone(),
            clock,
        ));

        Ok(ResumableUploadStore::new(
            self.config,
            sessions,
            engine,
            deleter,
            sweeper,
            store,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryCache, InMemoryLockService, InMemoryObjectStore};
    use crate::ports::S3_MIN_PART_SIZE;

    fn complete_builder(config: EngineConfig) -> UploadStoreBuilder {
        UploadStoreBuilder::new(config)
            .cache(Arc::new(InMemoryCache::new(Arc::new(SystemClock))))
            .locks(Arc::new(InMemoryLockService::new()))
            .object_store(Arc::new(InMemoryObjectStore::new()))
    }

    #[test]
    fn test_build_success() {
        let store = complete_builder(EngineConfig::default()).build();
        assert!(store.is_ok());
    }

    #[test]
    fn test_build_missing_collaborator() {
        let store = UploadStoreBuilder::new(EngineConfig::default())
            .cache(Arc::new(InMemoryCache::new(Arc::new(SystemClock))))
            .object_store(Arc::new(InMemoryObjectStore::new()))
            .build();
        assert!(matches!(
            store,
            Err(BuildError::MissingCollaborator("locks"))
        ));
    }

    #[test]
    fn test_build_rejects_part_size_below_store_minimum() {
        let config = EngineConfig {
            min_part_size: S3_MIN_PART_SIZE / 2,
            ..EngineConfig::default()
        };
        let store = complete_builder(config).build();
        assert!(matches!(
            store,
            Err(BuildError::Config(ConfigError::PartSizeBelowStoreMinimum { .. }))
        ));
    }
}
