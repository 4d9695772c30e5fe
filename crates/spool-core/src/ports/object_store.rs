//! ObjectStore port - Durable Object Store（S3 互換 または InMemory）
//!
//! 書き込みは次のどちらかしか受け付けません：
//! - 1 つのオブジェクトとしての原子的な put
//! - マルチパートアップロード（initiate → upload_part × N → complete）
//!
//! マルチパートの各パートは最後のものを除き `min_part_size()` 以上である必要があり、
//! complete はパート番号が 1 から連続していることを要求します。
//!
//! # 設計原則
//! - 特定の製品 API には依存しない（ここで定義するのは契約のみ）
//! - `delete_object` は冪等（存在しなくても成功）
//! - `list_objects` のページングは実装側で吸収する

use std::collections::BTreeMap;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::domain::{MultipartUploadId, PartRecord, PartToken};

/// S3 のマルチパート最小パートサイズ（最後のパートを除く）
pub const S3_MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// User-defined metadata attached to an object.
pub type ObjectMetadata = BTreeMap<String, String>;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StoreError>> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("no such multipart upload: {0}")]
    NoSuchUpload(MultipartUploadId),

    #[error("invalid part list: {0}")]
    InvalidPart(String),

    #[error("part {part_number} is {size} bytes, below the minimum of {min} bytes")]
    EntityTooSmall {
        part_number: u32,
        size: usize,
        min: usize,
    },

    #[error("object store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Smallest size the store accepts for a non-final multipart part.
    fn min_part_size(&self) -> usize;

    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        metadata: ObjectMetadata,
    ) -> Result<(), StoreError>;

    async fn initiate_multipart(&self, key: &str) -> Result<MultipartUploadId, StoreError>;

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &MultipartUploadId,
        part_number: u32,
        body: Bytes,
    ) -> Result<PartToken, StoreError>;

    /// Assemble the parts in part-number order into the object at `key`.
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &MultipartUploadId,
        parts: &[PartRecord],
    ) -> Result<(), StoreError>;

    async fn abort_multipart(
        &self,
        key: &str,
        upload_id: &MultipartUploadId,
    ) -> Result<(), StoreError>;

    async fn delete_object(&self, key: &str) -> Result<(), StoreError>;

    /// `None` when the object does not exist.
    async fn get_object_metadata(&self, key: &str) -> Result<Option<ObjectMetadata>, StoreError>;

    /// Replace the object's metadata, keeping its body.
    async fn set_object_metadata(
        &self,
        key: &str,
        metadata: ObjectMetadata,
    ) -> Result<(), StoreError>;

    /// All keys starting with `prefix`, in lexicographic order.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    async fn get_object_stream(&self, key: &str) -> Result<ByteStream, StoreError>;
}
