//! ResumableUploadStore - プロトコル層から見た唯一の入口
//!
//! 各コンポーネント（SessionManager / AppendEngine / UploadDeleter /
//! ExpirationSweeper）を束ねるだけで、ロジックは持たない。
//! 構築は `UploadStoreBuilder` で行う。

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::append::{AppendEngine, PayloadStream, payload_from_bytes};
use super::delete::UploadDeleter;
use super::info::UploadInfo;
use super::sessions::SessionManager;
use super::sweep_loop::SweepLoop;
use super::sweeper::ExpirationSweeper;
use crate::config::EngineConfig;
use crate::domain::UploadId;
use crate::error::{UploadError, UploadResult};
use crate::ports::{ByteStream, ObjectStore};

pub struct ResumableUploadStore {
    config: EngineConfig,
    sessions: Arc<SessionManager>,
    engine: AppendEngine,
    deleter: Arc<UploadDeleter>,
    sweeper: Arc<ExpirationSweeper>,
    store: Arc<dyn ObjectStore>,
}

impl ResumableUploadStore {
    pub(crate) fn new(
        config: EngineConfig,
        sessions: Arc<SessionManager>,
        engine: AppendEngine,
        deleter: Arc<UploadDeleter>,
        sweeper: Arc<ExpirationSweeper>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            config,
            sessions,
            engine,
            deleter,
            sweeper,
            store,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn create_upload(&self, declared_length: u64, metadata_header: &str) -> UploadResult<UploadId> {
        self.sessions.create(declared_length, metadata_header).await
    }

    /// 受理したバイト数（今回の呼び出し分）を返す
    pub async fn append_data(&self, id: &UploadId, payload: PayloadStream) -> UploadResult<u64> {
        self.engine.append(id, payload).await
    }

    pub async fn append_bytes(&self, id: &UploadId, data: Bytes) -> UploadResult<u64> {
        self.engine.append(id, payload_from_bytes(data)).await
    }

    pub async fn get_offset(&self, id: &UploadId) -> UploadResult<u64> {
        self.sessions.offset(id).await
    }

    pub async fn get_length(&self, id: &UploadId) -> UploadResult<Option<u64>> {
        self.sessions.length(id).await
    }

    pub async fn exists(&self, id: &UploadId) -> UploadResult<bool> {
        self.sessions.exists(id).await
    }

    pub async fn get_metadata_header(&self, id: &UploadId) -> UploadResult<String> {
        self.sessions.metadata_header(id).await
    }

    /// 完了したアップロードの本体を読む
    pub async fn get_content(&self, id: &UploadId) -> UploadResult<ByteStream> {
        let session = self.sessions.require(id).await?;
        if !session.is_complete() {
            return Err(UploadError::Incomplete(id.clone()));
        }
        let key = self.sessions.layout().file_key(id);
        Ok(self.store.get_object_stream(&key).await?)
    }

    pub async fn delete(&self, id: &UploadId) -> UploadResult<()> {
        self.deleter.delete(id).await
    }

    pub async fn get_expiration(&self, id: &UploadId) -> UploadResult<Option<DateTime<Utc>>> {
        self.sessions.expiration(id).await
    }

    pub async fn set_expiration(&self, id: &UploadId, expires_at: DateTime<Utc>) -> UploadResult<()> {
        self.sessions.set_expiration(id, expires_at).await
    }

    pub async fn list_expired(&self) -> UploadResult<Vec<UploadId>> {
        self.sweeper.list_expired().await
    }

    pub async fn remove_expired(&self) -> UploadResult<usize> {
        self.sweeper.remove_expired().await
    }

    pub async fn get_info(&self, id: &UploadId) -> UploadResult<UploadInfo> {
        let session = self.sessions.require(id).await?;
        UploadInfo::from_session(&session, self.sessions.layout())
    }

    /// 削除待ちを `batch_size` 件まで（`skip` は処理中の ID）
    pub async fn list_pending_deletion(
        &self,
        batch_size: usize,
        skip: &[UploadId],
    ) -> UploadResult<Vec<UploadId>> {
        self.sweeper.list_pending_deletion(batch_size, skip).await
    }

    /// 設定の `sweep_interval` ごとに期限切れを回収するタスクを起動する
    pub fn spawn_sweep_loop(&self) -> SweepLoop {
        SweepLoop::spawn(self.sweeper.clone(), self.config.sweep_interval())
    }
}
