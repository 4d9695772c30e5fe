//! Finalizer - 最終パートの送出と完了処理
//!
//! AppendEngine がロックを保持したまま呼ぶ。単独では呼ばない。
//!
//! - マルチパート開始済み: 残りを最終パートとして送り、全パートで complete
//! - 未開始: 全体が最小パートサイズ未満なので put_object 一回で書く
//!
//! 完了後はコミット済みオフセットを宣言長に揃え、セッション記録は残す
//! （完了後も offset / length を問い合わせられるように）。

use std::sync::Arc;

use bytes::Bytes;

use super::sessions::SessionManager;
use crate::domain::{PartList, UploadSession};
use crate::error::UploadResult;
use crate::ports::{ObjectMetadata, ObjectStore};

pub struct Finalizer {
    sessions: Arc<SessionManager>,
    store: Arc<dyn ObjectStore>,
}

impl Finalizer {
    pub fn new(sessions: Arc<SessionManager>, store: Arc<dyn ObjectStore>) -> Self {
        Self { sessions, store }
    }

    /// `tail` はまだどこにも書かれていない末尾（空のこともある）
    #[tracing::instrument(skip_all, fields(upload_id = %session.id, tail = tail.len()))]
    pub async fn finalize(
        &self,
        session: &mut UploadSession,
        mut parts: PartList,
        tail: Bytes,
    ) -> UploadResult<()> {
        let id = session.id.clone();
        let key = self.sessions.layout().file_key(&id);

        match session.multipart_upload_id.clone() {
            Some(upload_id) => {
                if !tail.is_empty() {
                    let part_number = parts.next_part_number();
                    let size = tail.len();
                    let token = self
                        .store
                        .upload_part(&key, &upload_id, part_number, tail)
                        .await?;
                    parts.push(token);
                    tracing::info!(part_number, size, "uploaded final part");
                }
                self.store
                    .complete_multipart(&key, &upload_id, parts.as_slice())
                    .await?;
                tracing::info!(parts = parts.len(), "completed multipart upload");
            }
            None => {
                let size = tail.len();
                self.store
                    .put_object(&key, tail, ObjectMetadata::new())
                    .await?;
                tracing::info!(size, "stored upload in a single put");
            }
        }

        session.mark_completed(self.sessions.now());
        self.sessions.save(session).await?;
        self.sessions
            .clear_transfer_state(&id, session.declared_length)
            .await?;

        // オブジェクトは書けているので、ミラーの失敗で append を失敗にはしない
        if let Err(e) = self.sessions.mirror(session).await {
            tracing::warn!(error = %e, "failed to mirror completion; sweeper may see the upload as pending");
        }
        Ok(())
    }
}
