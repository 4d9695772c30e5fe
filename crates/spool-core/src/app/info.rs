//! UploadInfo - 完了したアップロードの記述子
//!
//! 下流（ファイル取り込み処理など）に渡すための読み取り専用ビュー。

use serde::{Deserialize, Serialize};

use super::keys::KeyLayout;
use crate::domain::{UploadId, UploadSession};
use crate::error::{UploadError, UploadResult};

const FILENAME_KEY: &str = "filename";
const CONTENT_TYPE_KEY: &str = "contentType";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadInfo {
    pub upload_id: UploadId,
    pub filename: String,
    pub content_type: String,
    pub length: u64,
    /// Object key of the assembled upload.
    pub source_key: String,
}

impl UploadInfo {
    pub fn from_session(session: &UploadSession, layout: &KeyLayout) -> UploadResult<Self> {
        if !session.is_complete() {
            return Err(UploadError::Incomplete(session.id.clone()));
        }

        let invalid = |reason: &str| UploadError::InvalidMetadata {
            id: session.id.clone(),
            reason: reason.to_string(),
        };

        let filename = session
            .metadata
            .get(FILENAME_KEY)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| invalid("missing filename"))?;

        let has_extension = std::path::Path::new(filename)
            .extension()
            .is_some_and(|ext| !ext.is_empty());
        if !has_extension {
            return Err(invalid("filename has no extension"));
        }

        let content_type = match session.metadata.get(CONTENT_TYPE_KEY).map(str::trim) {
            Some(declared) if !declared.is_empty() => declared.to_string(),
            _ => mime_guess::from_path(filename)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        };

        Ok(Self {
            upload_id: session.id.clone(),
            filename: filename.to_string(),
            content_type,
            length: session.declared_length,
            source_key: layout.file_key(&session.id),
        })
    }
}
