//! SessionManager - セッションの作成・参照・有効期限
//!
//! プロトコルに見える ID を、キャッシュキーとオブジェクトキーに橋渡しします。
//!
//! # 二重の保存先
//! - キャッシュ: 速い経路。セッション記録・バッファ・コミット済みオフセット・パート一覧
//! - オブジェクトストア: `upload-info/{id}` にセッション記録のミラーを置く。
//!   Sweeper はこちらだけを見るので、キャッシュが evict されても期限切れ回収は動く
//!
//! ミラーはキャッシュと同じ論理操作の中で書くが、原子的ではない（結果整合）。
//!
//! # キャッシュエントリ
//! - `meta`: セッション記録
//! - `progress`: コミット済みオフセットとパート一覧（1 エントリで一緒に書く）
//! - `buf`: 未フラッシュの残り。先頭に開始オフセットを持ち、
//!   コミット済みオフセットと一致しないものは古いとみなして捨てる
//!
//! # ロック
//! 読み取り系（length / offset / metadata）はロックを取らない。
//! 書き込み系の多キー更新は AppendEngine / UploadDeleter がロック下で呼ぶ。
//! `set_expiration` もセッション記録を読み書きするので同じロックを取る。

use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};

use super::keys::{self, KeyLayout};
use crate::config::EngineConfig;
use crate::domain::{MultipartUploadId, TransferProgress, UploadId, UploadMetadata, UploadSession};
use crate::error::{UploadError, UploadResult};
use crate::ports::cache::{get_json, set_json};
use crate::ports::{
    Clock, IdGenerator, KeyValueCache, LockService, ObjectMetadata, ObjectStore, StoreError,
    run_with_lock,
};

/// Mirrored object metadata: declared length (decimal).
pub const META_UPLOAD_LENGTH: &str = "upload-length";
/// Mirrored object metadata: expiration (RFC 3339).
pub const META_EXPIRES: &str = "expires";
/// Mirrored object metadata: multipart upload handle, once initiated.
pub const META_MULTIPART_UPLOAD_ID: &str = "multipart-upload-id";
/// Mirrored object metadata: `"true"` once finalized.
pub const META_COMPLETED: &str = "upload-completed";

/// Session state as recovered from the object store mirror alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirroredSession {
    pub expires_at: Option<DateTime<Utc>>,
    pub multipart_upload_id: Option<MultipartUploadId>,
    pub completed: bool,
}

impl MirroredSession {
    pub fn from_metadata(metadata: &ObjectMetadata) -> Self {
        Self {
            expires_at: metadata
                .get(META_EXPIRES)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|at| at.with_timezone(&Utc)),
            multipart_upload_id: metadata
                .get(META_MULTIPART_UPLOAD_ID)
                .map(MultipartUploadId::new),
            completed: metadata.get(META_COMPLETED).is_some_and(|v| v == "true"),
        }
    }
}

fn mirror_metadata(session: &UploadSession) -> ObjectMetadata {
    let mut metadata = ObjectMetadata::new();
    metadata.insert(
        META_UPLOAD_LENGTH.to_string(),
        session.declared_length.to_string(),
    );
    metadata.insert(META_EXPIRES.to_string(), session.expires_at.to_rfc3339());
    if let Some(upload_id) = &session.multipart_upload_id {
        metadata.insert(META_MULTIPART_UPLOAD_ID.to_string(), upload_id.to_string());
    }
    if session.is_complete() {
        metadata.insert(META_COMPLETED.to_string(), "true".to_string());
    }
    metadata
}

/// Buffer entry: big-endian start offset followed by the buffered bytes.
fn encode_buffer(start: u64, data: &[u8]) -> Bytes {
    let mut raw = BytesMut::with_capacity(8 + data.len());
    raw.put_u64(start);
    raw.extend_from_slice(data);
    raw.freeze()
}

/// Bytes of a buffer entry that starts at `committed`; anything else is stale.
fn decode_buffer(mut raw: Bytes, committed: u64) -> Option<Bytes> {
    if raw.len() < 8 {
        return None;
    }
    let start = raw.get_u64();
    (start == committed).then_some(raw)
}

pub struct SessionManager {
    cache: Arc<dyn KeyValueCache>,
    store: Arc<dyn ObjectStore>,
    locks: Arc<dyn LockService>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    layout: KeyLayout,
    expiration: chrono::Duration,
    cache_ttl: Duration,
    lock_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        cache: Arc<dyn KeyValueCache>,
        store: Arc<dyn ObjectStore>,
        locks: Arc<dyn LockService>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            cache,
            store,
            locks,
            clock,
            ids,
            layout: KeyLayout::new(&config.environment, &config.key_prefix),
            expiration: config.expiration_delta(),
            cache_ttl: config.cache_ttl(),
            lock_timeout: config.lock_timeout(),
        }
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Create a session and its mirror; returns the new id.
    #[tracing::instrument(skip(self, metadata_header))]
    pub async fn create(&self, declared_length: u64, metadata_header: &str) -> UploadResult<UploadId> {
        if declared_length == 0 {
            return Err(UploadError::InvalidLength);
        }

        let id = self.ids.generate_upload_id();
        let metadata = UploadMetadata::parse_header(metadata_header);
        let expires_at = self.clock.now() + self.expiration;
        let session = UploadSession::new(id.clone(), declared_length, metadata, expires_at);

        self.save(&session).await?;
        self.save_progress(&id, &TransferProgress::default()).await?;
        self.save_buffer(&id, 0, Bytes::new()).await?;

        let body = serde_json::to_vec(&session)?;
        self.store
            .put_object(
                &self.layout.info_key(&id),
                Bytes::from(body),
                mirror_metadata(&session),
            )
            .await?;

        tracing::debug!(
            upload_id = %id,
            declared_length,
            expires_at = %expires_at,
            "created upload"
        );
        Ok(id)
    }

    // ---- cache entries ----

    pub async fn load(&self, id: &UploadId) -> UploadResult<Option<UploadSession>> {
        Ok(get_json(self.cache.as_ref(), &keys::session_key(id)).await?)
    }

    pub async fn require(&self, id: &UploadId) -> UploadResult<UploadSession> {
        self.load(id)
            .await?
            .ok_or_else(|| UploadError::SessionNotFound(id.clone()))
    }

    pub async fn save(&self, session: &UploadSession) -> UploadResult<()> {
        set_json(
            self.cache.as_ref(),
            &keys::session_key(&session.id),
            session,
            self.cache_ttl,
        )
        .await?;
        Ok(())
    }

    /// Committed offset and part list; a missing entry counts as nothing committed.
    pub async fn progress(&self, id: &UploadId) -> UploadResult<TransferProgress> {
        let progress: Option<TransferProgress> =
            get_json(self.cache.as_ref(), &keys::progress_key(id)).await?;
        let progress = progress.unwrap_or_default();
        if !progress.parts.is_contiguous() {
            return Err(UploadError::InconsistentState {
                id: id.clone(),
                reason: "part numbers are not contiguous".to_string(),
            });
        }
        Ok(progress)
    }

    pub async fn save_progress(&self, id: &UploadId, progress: &TransferProgress) -> UploadResult<()> {
        set_json(
            self.cache.as_ref(),
            &keys::progress_key(id),
            progress,
            self.cache_ttl,
        )
        .await?;
        Ok(())
    }

    /// Buffered remainder following `committed`.
    ///
    /// A buffer written at another offset has already been flushed and reads as empty.
    pub async fn buffer(&self, id: &UploadId, committed: u64) -> UploadResult<Bytes> {
        let Some(raw) = self.cache.get(&keys::buffer_key(id)).await? else {
            return Ok(Bytes::new());
        };
        match decode_buffer(raw, committed) {
            Some(buffer) => Ok(buffer),
            None => {
                tracing::debug!(upload_id = %id, committed, "ignoring stale buffer");
                Ok(Bytes::new())
            }
        }
    }

    /// Store `buffer` as the bytes following offset `start`.
    pub async fn save_buffer(&self, id: &UploadId, start: u64, buffer: Bytes) -> UploadResult<()> {
        self.cache
            .set(&keys::buffer_key(id), encode_buffer(start, &buffer), self.cache_ttl)
            .await?;
        Ok(())
    }

    pub async fn clear_buffer(&self, id: &UploadId) -> UploadResult<()> {
        self.cache.remove(&keys::buffer_key(id)).await?;
        Ok(())
    }

    /// Settle the cache after finalization: everything committed, no buffer.
    ///
    /// The session record stays.
    pub async fn clear_transfer_state(&self, id: &UploadId, declared_length: u64) -> UploadResult<()> {
        self.save_progress(id, &TransferProgress::completed(declared_length))
            .await?;
        self.clear_buffer(id).await
    }

    /// Remove every cache entry of the upload.
    pub async fn purge(&self, id: &UploadId) -> UploadResult<()> {
        self.cache.remove(&keys::buffer_key(id)).await?;
        self.cache.remove(&keys::progress_key(id)).await?;
        self.cache.remove(&keys::session_key(id)).await?;
        Ok(())
    }

    // ---- object store mirror ----

    /// Rewrite the mirrored metadata of `session` in the object store.
    pub async fn mirror(&self, session: &UploadSession) -> UploadResult<()> {
        self.store
            .set_object_metadata(&self.layout.info_key(&session.id), mirror_metadata(session))
            .await?;
        Ok(())
    }

    /// Session state as seen by the object store alone.
    pub async fn mirrored(&self, id: &UploadId) -> UploadResult<Option<MirroredSession>> {
        let metadata = self
            .store
            .get_object_metadata(&self.layout.info_key(id))
            .await?;
        Ok(metadata.as_ref().map(MirroredSession::from_metadata))
    }

    // ---- read queries ----

    pub async fn exists(&self, id: &UploadId) -> UploadResult<bool> {
        Ok(self.load(id).await?.is_some())
    }

    pub async fn length(&self, id: &UploadId) -> UploadResult<Option<u64>> {
        Ok(self.load(id).await?.map(|s| s.declared_length))
    }

    pub async fn metadata_header(&self, id: &UploadId) -> UploadResult<String> {
        Ok(self.require(id).await?.metadata.to_header())
    }

    /// `min(committed + buffered, declared_length)`.
    pub async fn offset(&self, id: &UploadId) -> UploadResult<u64> {
        let session = self.require(id).await?;
        let committed = self.progress(id).await?.committed;
        let buffered = self.buffer(id, committed).await?.len() as u64;
        let offset = (committed + buffered).min(session.declared_length);

        tracing::debug!(
            upload_id = %id,
            committed,
            buffered,
            offset,
            "resolved upload offset"
        );
        Ok(offset)
    }

    pub async fn expiration(&self, id: &UploadId) -> UploadResult<Option<DateTime<Utc>>> {
        Ok(self.load(id).await?.map(|s| s.expires_at))
    }

    /// Move the deadline in both the cache record and the mirror.
    ///
    /// Runs under the upload lock. Unknown ids are ignored. A missing mirror
    /// is logged, not fatal.
    #[tracing::instrument(skip_all, fields(upload_id = %id))]
    pub async fn set_expiration(&self, id: &UploadId, expires_at: DateTime<Utc>) -> UploadResult<()> {
        let lock_name = keys::lock_name(id);
        run_with_lock(self.locks.as_ref(), &lock_name, self.lock_timeout, || {
            self.set_expiration_locked(id, expires_at)
        })
        .await
    }

    async fn set_expiration_locked(&self, id: &UploadId, expires_at: DateTime<Utc>) -> UploadResult<()> {
        let Some(mut session) = self.load(id).await? else {
            return Ok(());
        };
        session.expires_at = expires_at;
        self.save(&session).await?;

        match self.mirror(&session).await {
            Err(UploadError::Store(StoreError::NotFound(key))) => {
                tracing::warn!(upload_id = %id, key, "expiration mirror missing, cache updated only");
                Ok(())
            }
            other => other,
        }
    }
}
