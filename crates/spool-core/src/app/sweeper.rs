//! ExpirationSweeper - 期限切れアップロードの検出と回収
//!
//! キャッシュではなくオブジェクトストアの info ミラーだけを見る。
//! キャッシュが evict されていても、放置されたマルチパートを回収できる。
//!
//! - 完了済み（`upload-completed`）は対象外
//! - `expires` が読めないもの、メタデータの取得に失敗したものはスキップして警告
//! - `expires < now` のものが期限切れ

use std::sync::Arc;

use super::delete::UploadDeleter;
use super::sessions::{MirroredSession, SessionManager};
use crate::domain::UploadId;
use crate::error::{UploadError, UploadResult};
use crate::ports::{Clock, ObjectStore};

pub struct ExpirationSweeper {
    sessions: Arc<SessionManager>,
    store: Arc<dyn ObjectStore>,
    deleter: Arc<UploadDeleter>,
    clock: Arc<dyn Clock>,
}

impl ExpirationSweeper {
    pub fn new(
        sessions: Arc<SessionManager>,
        store: Arc<dyn ObjectStore>,
        deleter: Arc<UploadDeleter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions,
            store,
            deleter,
            clock,
        }
    }

    /// 期限切れの未完了アップロード（ストアの一覧順）
    pub async fn list_expired(&self) -> UploadResult<Vec<UploadId>> {
        let now = self.clock.now();
        let layout = self.sessions.layout();
        let keys = self.store.list_objects(layout.info_prefix()).await?;

        let mut expired = Vec::new();
        for key in keys {
            let Some(id) = layout.id_from_info_key(&key) else {
                continue;
            };
            let metadata = match self.store.get_object_metadata(&key).await {
                Ok(Some(metadata)) => metadata,
                // 一覧と取得の間に消えた
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(key, error = %e, "failed to read upload info; skipping");
                    continue;
                }
            };

            let mirrored = MirroredSession::from_metadata(&metadata);
            if mirrored.completed {
                continue;
            }
            match mirrored.expires_at {
                Some(expires_at) if expires_at < now => expired.push(id),
                Some(_) => {}
                None => tracing::warn!(key, "upload info has no parseable expiration; skipping"),
            }
        }

        tracing::debug!(count = expired.len(), "listed expired uploads");
        Ok(expired)
    }

    /// 期限切れを削除し、削除できた件数を返す
    ///
    /// 個々の削除失敗はログに残して次へ進む。
    #[tracing::instrument(skip(self))]
    pub async fn remove_expired(&self) -> UploadResult<usize> {
        let candidates = self.list_expired().await?;
        let now = self.clock.now();

        let mut removed = 0;
        for id in &candidates {
            match self.deleter.delete_if_expired(id, now).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(upload_id = %id, error = %e, "failed to remove expired upload"),
            }
        }

        tracing::info!(candidates = candidates.len(), removed, "expiration sweep finished");
        Ok(removed)
    }

    /// 別プロセスに削除を任せるためのバッチ（`skip` は処理中の ID）
    pub async fn list_pending_deletion(
        &self,
        batch_size: usize,
        skip: &[UploadId],
    ) -> UploadResult<Vec<UploadId>> {
        if batch_size == 0 {
            return Err(UploadError::InvalidArgument(
                "batch size must be greater than zero".to_string(),
            ));
        }

        Ok(self
            .list_expired()
            .await?
            .into_iter()
            .filter(|id| !skip.contains(id))
            .take(batch_size)
            .collect())
    }
}
