//! Domain identifiers (strongly-typed IDs).
//!
//! # ID の種類
//! - **UploadId**: プロトコルに公開されるアップロード ID。キャッシュキーの根、
//!   およびオブジェクトキーの末尾として使う
//! - **MultipartUploadId**: Durable Object Store が発行するマルチパート ID（不透明）
//! - **PartToken**: パートアップロードごとに返される不透明トークン（S3 の ETag 相当）
//!
//! UploadId は ULID から生成しますが、プロトコル経由で任意の文字列が届くため
//! 内部表現は `String` です。未知の文字列は「存在しない ID」として扱い、
//! パースエラーにはしません。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identifier of one resumable upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    /// プロトコルから受け取った文字列をそのまま ID として扱う
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// ULID は小文字で描画する（オブジェクトキーは小文字に揃えるため）
impl From<Ulid> for UploadId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid.to_string().to_lowercase())
    }
}

impl From<&str> for UploadId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque multipart upload handle issued by the object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MultipartUploadId(String);

impl MultipartUploadId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MultipartUploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque token returned for an uploaded part (ETag on S3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartToken(String);

impl PartToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_id_from_ulid_is_lowercase() {
        let ulid = Ulid::new();
        let id = UploadId::from(ulid);

        assert_eq!(id.as_str(), ulid.to_string().to_lowercase());
        assert_eq!(id.as_str().len(), 26);
        assert!(!id.as_str().chars().any(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn upload_id_serializes_as_plain_string() {
        let id = UploadId::new("abc123");

        let serialized = serde_json::to_string(&id).unwrap();
        assert_eq!(serialized, "\"abc123\"");

        let deserialized: UploadId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, id);
    }

    #[test]
    fn arbitrary_strings_are_accepted() {
        // 未知の ID もパースエラーにはならない（存在確認は SessionManager の責務）
        let id: UploadId = "not-a-ulid".into();
        assert_eq!(id.to_string(), "not-a-ulid");
    }
}
