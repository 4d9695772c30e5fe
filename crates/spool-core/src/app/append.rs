//! AppendEngine - バッファリングつき append
//!
//! クライアントのチャンクは任意サイズで届くが、オブジェクトストアは最終パート以外に
//! 最小サイズを課す。そこで:
//!
//! 1. 前回の残り（バッファ）と今回のペイロードを連結する
//! 2. 最小サイズ分たまるたびに 1 パートとして送る（宣言長を超えない範囲で）
//! 3. 送り終えた位置 + 残り == 宣言長 なら Finalizer に渡す
//! 4. そうでなければ残りをバッファに戻す
//!
//! すべてアップロード ID ごとのロック下で行う。ロックが取れなければ何も変更しない。
//!
//! # 永続化の順序（パートごと）
//! initiate（必要なら、セッション保存） → upload_part →
//! 進捗保存（コミット済みオフセットとパート一覧を 1 エントリで）
//!
//! 最後に残りをバッファへ書く（開始オフセットつき）。途中で失敗しても、
//! それまでに送ったパートは記録に残り、古いバッファは読み出し時に捨てられる。

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{Stream, TryStreamExt};

use super::finalize::Finalizer;
use super::keys;
use super::sessions::SessionManager;
use crate::domain::{MultipartUploadId, TransferProgress, UploadId, UploadSession};
use crate::error::{UploadError, UploadResult};
use crate::ports::{LockService, ObjectStore, run_with_lock};

/// append のペイロード（任意サイズのチャンク列）
pub type PayloadStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

pub struct AppendEngine {
    sessions: Arc<SessionManager>,
    store: Arc<dyn ObjectStore>,
    locks: Arc<dyn LockService>,
    finalizer: Finalizer,
    min_part_size: usize,
    lock_timeout: Duration,
}

impl AppendEngine {
    pub fn new(
        sessions: Arc<SessionManager>,
        store: Arc<dyn ObjectStore>,
        locks: Arc<dyn LockService>,
        min_part_size: usize,
        lock_timeout: Duration,
    ) -> Self {
        let finalizer = Finalizer::new(sessions.clone(), store.clone());
        Self {
            sessions,
            store,
            locks,
            finalizer,
            min_part_size,
            lock_timeout,
        }
    }

    /// ペイロードを受け取り、今回受理したバイト数を返す
    #[tracing::instrument(skip_all, fields(upload_id = %id))]
    pub async fn append(&self, id: &UploadId, payload: PayloadStream) -> UploadResult<u64> {
        let lock_name = keys::lock_name(id);
        run_with_lock(self.locks.as_ref(), &lock_name, self.lock_timeout, move || {
            self.append_locked(id, payload)
        })
        .await
    }

    async fn append_locked(&self, id: &UploadId, payload: PayloadStream) -> UploadResult<u64> {
        let mut session = self.sessions.require(id).await?;
        if session.is_complete() {
            return Err(UploadError::UploadComplete(id.clone()));
        }

        let incoming = read_payload(payload).await?;
        if incoming.is_empty() {
            return Ok(0);
        }
        let accepted = incoming.len() as u64;

        let mut progress = self.sessions.progress(id).await?;
        let remainder = self.sessions.buffer(id, progress.committed).await?;
        let offset = progress.committed + remainder.len() as u64;
        if offset + accepted > session.declared_length {
            return Err(UploadError::LengthExceeded {
                offset,
                incoming: accepted,
                declared: session.declared_length,
            });
        }

        let combined = concat(remainder, incoming);
        let part_size = self.min_part_size as u64;
        let mut processed = 0;

        while combined.len() - processed >= self.min_part_size
            && progress.committed + part_size <= session.declared_length
        {
            let chunk = combined.slice(processed..processed + self.min_part_size);
            self.flush_part(&mut session, &mut progress, chunk).await?;
            processed += self.min_part_size;
        }

        let tail = combined.slice(processed..);
        let committed = progress.committed;
        if committed + tail.len() as u64 == session.declared_length {
            self.finalizer.finalize(&mut session, progress.parts, tail).await?;
        } else if !tail.is_empty() {
            tracing::debug!(buffered = tail.len(), committed, "buffered remainder");
            self.sessions.save_buffer(id, committed, tail).await?;
        } else {
            self.sessions.clear_buffer(id).await?;
        }

        Ok(accepted)
    }

    async fn flush_part(
        &self,
        session: &mut UploadSession,
        progress: &mut TransferProgress,
        chunk: Bytes,
    ) -> UploadResult<()> {
        let key = self.sessions.layout().file_key(&session.id);
        let upload_id = self.ensure_multipart(session, &key).await?;

        let part_number = progress.parts.next_part_number();
        let size = chunk.len();
        let token = self
            .store
            .upload_part(&key, &upload_id, part_number, chunk)
            .await?;
        progress.record_part(token, size as u64);
        self.sessions.save_progress(&session.id, progress).await?;

        tracing::info!(part_number, size, committed = progress.committed, "uploaded part");
        Ok(())
    }

    async fn ensure_multipart(
        &self,
        session: &mut UploadSession,
        key: &str,
    ) -> UploadResult<MultipartUploadId> {
        if let Some(existing) = &session.multipart_upload_id {
            return Ok(existing.clone());
        }

        let upload_id = self.store.initiate_multipart(key).await?;
        session.attach_multipart(upload_id.clone());
        self.sessions.save(session).await?;
        // キャッシュが消えても Deleter / Sweeper が abort できるようにミラーにも残す
        self.sessions.mirror(session).await?;

        tracing::info!(multipart_upload_id = %upload_id, "initiated multipart upload");
        Ok(upload_id)
    }
}

async fn read_payload(payload: PayloadStream) -> UploadResult<Bytes> {
    let buf = payload
        .try_fold(BytesMut::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await
        .map_err(UploadError::Payload)?;
    Ok(buf.freeze())
}

fn concat(remainder: Bytes, incoming: Bytes) -> Bytes {
    if remainder.is_empty() {
        return incoming;
    }
    let mut combined = BytesMut::with_capacity(remainder.len() + incoming.len());
    combined.extend_from_slice(&remainder);
    combined.extend_from_slice(&incoming);
    combined.freeze()
}

/// 単一の `Bytes` をペイロードにする
pub fn payload_from_bytes(data: Bytes) -> PayloadStream {
    Box::pin(futures::stream::once(async move { Ok(data) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_skips_copy_for_empty_remainder() {
        let incoming = Bytes::from_static(b"abc");
        let combined = concat(Bytes::new(), incoming.clone());

        assert_eq!(combined.as_ptr(), incoming.as_ptr());
        assert_eq!(concat(Bytes::from_static(b"xy"), incoming), "xyabc");
    }

    #[tokio::test]
    async fn read_payload_joins_chunks() {
        let payload: PayloadStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"he")),
            Ok(Bytes::from_static(b"llo")),
        ]));

        assert_eq!(read_payload(payload).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn read_payload_surfaces_stream_errors() {
        let payload: PayloadStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"he")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]));

        assert!(matches!(
            read_payload(payload).await,
            Err(UploadError::Payload(e)) if e.kind() == std::io::ErrorKind::ConnectionReset
        ));
    }
}
