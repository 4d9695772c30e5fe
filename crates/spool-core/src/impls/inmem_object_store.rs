//! In-memory object store implementation.
//!
//! Enforces the same contract an S3-compatible store would:
//! - `complete_multipart` requires a dense, ordered part list whose tokens
//!   match what `upload_part` returned.
//! - Every part except the last must be at least `min_part_size()` bytes.
//!
//! Also keeps a journal of successful mutations and supports failure
//! injection, so engine tests can assert on the exact store traffic.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::sync::Mutex;

use crate::domain::{MultipartUploadId, PartRecord, PartToken};
use crate::ports::{ByteStream, ObjectMetadata, ObjectStore, S3_MIN_PART_SIZE, StoreError};

/// Chunk size used when streaming an object back.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Kind of store operation, for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOpKind {
    Put,
    InitiateMultipart,
    UploadPart,
    CompleteMultipart,
    AbortMultipart,
    Delete,
    GetMetadata,
    SetMetadata,
    List,
    Get,
}

/// A successful mutating call, as recorded in the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Put { key: String, size: usize },
    InitiateMultipart { key: String },
    UploadPart { key: String, part_number: u32, size: usize },
    CompleteMultipart { key: String, parts: usize },
    AbortMultipart { key: String },
    Delete { key: String },
    SetMetadata { key: String },
}

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    metadata: ObjectMetadata,
}

#[derive(Debug)]
struct PendingUpload {
    key: String,
    parts: BTreeMap<u32, (PartToken, Bytes)>,
}

#[derive(Debug, Default)]
struct StoreState {
    objects: BTreeMap<String, StoredObject>,
    uploads: HashMap<MultipartUploadId, PendingUpload>,
    journal: Vec<StoreOp>,
    failures: VecDeque<StoreOpKind>,
    next_upload: u64,
    next_token: u64,
}

impl StoreState {
    /// Consume a pending injected failure for `kind`, if any.
    fn take_failure(&mut self, kind: StoreOpKind) -> Result<(), StoreError> {
        if let Some(pos) = self.failures.iter().position(|k| *k == kind) {
            self.failures.remove(pos);
            return Err(StoreError::Unavailable(format!("injected {kind:?} failure")));
        }
        Ok(())
    }

    fn pending(
        &mut self,
        key: &str,
        upload_id: &MultipartUploadId,
    ) -> Result<&mut PendingUpload, StoreError> {
        match self.uploads.get_mut(upload_id) {
            Some(upload) if upload.key == key => Ok(upload),
            _ => Err(StoreError::NoSuchUpload(upload_id.clone())),
        }
    }
}

/// In-memory object store.
pub struct InMemoryObjectStore {
    state: Mutex<StoreState>,
    min_part_size: usize,
}

impl InMemoryObjectStore {
    /// Store with the S3 part-size floor.
    pub fn new() -> Self {
        Self::with_min_part_size(S3_MIN_PART_SIZE)
    }

    /// Store with a custom part-size floor (smaller uploads in tests).
    pub fn with_min_part_size(min_part_size: usize) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            min_part_size,
        }
    }

    /// Make the next call of `kind` fail with `StoreError::Unavailable`.
    pub async fn fail_next(&self, kind: StoreOpKind) {
        self.state.lock().await.failures.push_back(kind);
    }

    pub async fn journal(&self) -> Vec<StoreOp> {
        self.state.lock().await.journal.clone()
    }

    pub async fn object(&self, key: &str) -> Option<Bytes> {
        let state = self.state.lock().await;
        state.objects.get(key).map(|o| o.body.clone())
    }

    /// Multipart uploads initiated but neither completed nor aborted.
    pub async fn pending_uploads(&self) -> usize {
        self.state.lock().await.uploads.len()
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn min_part_size(&self) -> usize {
        self.min_part_size
    }

    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        metadata: ObjectMetadata,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.take_failure(StoreOpKind::Put)?;
        state.journal.push(StoreOp::Put {
            key: key.to_string(),
            size: body.len(),
        });
        state
            .objects
            .insert(key.to_string(), StoredObject { body, metadata });
        Ok(())
    }

    async fn initiate_multipart(&self, key: &str) -> Result<MultipartUploadId, StoreError> {
        let mut state = self.state.lock().await;
        state.take_failure(StoreOpKind::InitiateMultipart)?;
        state.next_upload += 1;
        let upload_id = MultipartUploadId::new(format!("mpu-{}", state.next_upload));
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        state.journal.push(StoreOp::InitiateMultipart {
            key: key.to_string(),
        });
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &MultipartUploadId,
        part_number: u32,
        body: Bytes,
    ) -> Result<PartToken, StoreError> {
        let mut state = self.state.lock().await;
        state.take_failure(StoreOpKind::UploadPart)?;
        if part_number == 0 {
            return Err(StoreError::InvalidPart("part numbers start at 1".to_string()));
        }
        state.next_token += 1;
        let token = PartToken::new(format!("etag-{}", state.next_token));
        let size = body.len();
        // Re-uploading a part number replaces the earlier part, as on S3.
        state
            .pending(key, upload_id)?
            .parts
            .insert(part_number, (token.clone(), body));
        state.journal.push(StoreOp::UploadPart {
            key: key.to_string(),
            part_number,
            size,
        });
        Ok(token)
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &MultipartUploadId,
        parts: &[PartRecord],
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.take_failure(StoreOpKind::CompleteMultipart)?;
        let min = self.min_part_size;
        let pending = state.pending(key, upload_id)?;

        if parts.is_empty() {
            return Err(StoreError::InvalidPart("no parts to complete".to_string()));
        }

        let mut body = BytesMut::new();
        for (i, part) in parts.iter().enumerate() {
            if part.part_number as usize != i + 1 {
                return Err(StoreError::InvalidPart(format!(
                    "expected part {} at position {}, got {}",
                    i + 1,
                    i,
                    part.part_number
                )));
            }
            let Some((token, data)) = pending.parts.get(&part.part_number) else {
                return Err(StoreError::InvalidPart(format!(
                    "part {} was never uploaded",
                    part.part_number
                )));
            };
            if *token != part.token {
                return Err(StoreError::InvalidPart(format!(
                    "token mismatch for part {}",
                    part.part_number
                )));
            }
            let is_last = i + 1 == parts.len();
            if !is_last && data.len() < min {
                return Err(StoreError::EntityTooSmall {
                    part_number: part.part_number,
                    size: data.len(),
                    min,
                });
            }
            body.extend_from_slice(data);
        }

        state.uploads.remove(upload_id);
        state.objects.insert(
            key.to_string(),
            StoredObject {
                body: body.freeze(),
                metadata: ObjectMetadata::new(),
            },
        );
        state.journal.push(StoreOp::CompleteMultipart {
            key: key.to_string(),
            parts: parts.len(),
        });
        Ok(())
    }

    async fn abort_multipart(
        &self,
        key: &str,
        upload_id: &MultipartUploadId,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.take_failure(StoreOpKind::AbortMultipart)?;
        state.pending(key, upload_id)?;
        state.uploads.remove(upload_id);
        state.journal.push(StoreOp::AbortMultipart {
            key: key.to_string(),
        });
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.take_failure(StoreOpKind::Delete)?;
        state.objects.remove(key);
        state.journal.push(StoreOp::Delete {
            key: key.to_string(),
        });
        Ok(())
    }

    async fn get_object_metadata(&self, key: &str) -> Result<Option<ObjectMetadata>, StoreError> {
        let mut state = self.state.lock().await;
        state.take_failure(StoreOpKind::GetMetadata)?;
        Ok(state.objects.get(key).map(|o| o.metadata.clone()))
    }

    async fn set_object_metadata(
        &self,
        key: &str,
        metadata: ObjectMetadata,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.take_failure(StoreOpKind::SetMetadata)?;
        let object = state
            .objects
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        object.metadata = metadata;
        state.journal.push(StoreOp::SetMetadata {
            key: key.to_string(),
        });
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut state = self.state.lock().await;
        state.take_failure(StoreOpKind::List)?;
        Ok(state
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn get_object_stream(&self, key: &str) -> Result<ByteStream, StoreError> {
        let body = {
            let mut state = self.state.lock().await;
            state.take_failure(StoreOpKind::Get)?;
            state
                .objects
                .get(key)
                .map(|o| o.body.clone())
                .ok_or_else(|| StoreError::NotFound(key.to_string()))?
        };

        let chunks: Vec<Result<Bytes, StoreError>> = (0..body.len())
            .step_by(READ_CHUNK_SIZE)
            .map(|start| Ok(body.slice(start..(start + READ_CHUNK_SIZE).min(body.len()))))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}
