//! UploadDeleter - アップロードの削除（クライアント要求 / 期限切れ回収）
//!
//! 1. 未完了のマルチパートがあれば abort（既に無ければ成功扱い）
//! 2. 本体オブジェクトと info オブジェクトを削除
//! 3. キャッシュエントリを全削除
//!
//! ストアの失敗はそのまま返す。キャッシュはストア側が消えてから消すので、
//! 失敗後に再試行すれば同じ手順をやり直せる（何度呼んでも結果は同じ）。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::keys;
use super::sessions::SessionManager;
use crate::domain::{MultipartUploadId, UploadId};
use crate::error::UploadResult;
use crate::ports::{LockService, ObjectStore, StoreError, run_with_lock};

pub struct UploadDeleter {
    sessions: Arc<SessionManager>,
    store: Arc<dyn ObjectStore>,
    locks: Arc<dyn LockService>,
    lock_timeout: Duration,
}

impl UploadDeleter {
    pub fn new(
        sessions: Arc<SessionManager>,
        store: Arc<dyn ObjectStore>,
        locks: Arc<dyn LockService>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            store,
            locks,
            lock_timeout,
        }
    }

    #[tracing::instrument(skip_all, fields(upload_id = %id))]
    pub async fn delete(&self, id: &UploadId) -> UploadResult<()> {
        let lock_name = keys::lock_name(id);
        run_with_lock(self.locks.as_ref(), &lock_name, self.lock_timeout, || {
            self.delete_locked(id)
        })
        .await
    }

    /// 期限切れを確認し直してから削除する（Sweeper 用）
    ///
    /// 一覧を取ってからロックを取るまでの間に、完了した・期限が延びた
    /// アップロードは残す。削除したら `true`。
    #[tracing::instrument(skip_all, fields(upload_id = %id))]
    pub async fn delete_if_expired(&self, id: &UploadId, now: DateTime<Utc>) -> UploadResult<bool> {
        let lock_name = keys::lock_name(id);
        run_with_lock(self.locks.as_ref(), &lock_name, self.lock_timeout, || {
            self.delete_if_expired_locked(id, now)
        })
        .await
    }

    async fn delete_if_expired_locked(&self, id: &UploadId, now: DateTime<Utc>) -> UploadResult<bool> {
        if let Some(session) = self.sessions.load(id).await? {
            if session.is_complete() {
                // 完了のミラーが書けていなかった。ここで直しておく
                self.sessions.mirror(&session).await?;
                tracing::info!("skipping completed upload");
                return Ok(false);
            }
            if !session.is_expired(now) {
                tracing::info!(expires_at = %session.expires_at, "skipping upload whose expiration moved");
                return Ok(false);
            }
        }
        self.delete_locked(id).await?;
        Ok(true)
    }

    async fn delete_locked(&self, id: &UploadId) -> UploadResult<()> {
        let layout = self.sessions.layout();
        let file_key = layout.file_key(id);

        if let Some(upload_id) = self.pending_multipart(id).await? {
            match self.store.abort_multipart(&file_key, &upload_id).await {
                Ok(()) => {
                    tracing::info!(multipart_upload_id = %upload_id, "aborted multipart upload")
                }
                Err(StoreError::NoSuchUpload(_)) => {
                    tracing::debug!(multipart_upload_id = %upload_id, "multipart upload already gone")
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.store.delete_object(&file_key).await?;
        self.store.delete_object(&layout.info_key(id)).await?;
        self.sessions.purge(id).await?;

        tracing::info!("deleted upload");
        Ok(())
    }

    /// abort すべきマルチパート。キャッシュに無ければミラーから探す
    async fn pending_multipart(&self, id: &UploadId) -> UploadResult<Option<MultipartUploadId>> {
        if let Some(session) = self.sessions.load(id).await? {
            if session.is_complete() {
                return Ok(None);
            }
            return Ok(session.multipart_upload_id);
        }

        Ok(self
            .sessions
            .mirrored(id)
            .await?
            .filter(|m| !m.completed)
            .and_then(|m| m.multipart_upload_id))
    }
}
