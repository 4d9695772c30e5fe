//! Upload session record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{MultipartUploadId, UploadId};
use super::metadata::UploadMetadata;

/// One in-progress or recently completed upload.
///
/// Design:
/// - `declared_length` and `metadata` are fixed at creation.
/// - `multipart_upload_id` is set by the first flush that needs multipart
///   mode and never changes afterwards.
/// - The record outlives finalization so read queries keep working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSession {
    pub id: UploadId,
    pub declared_length: u64,
    pub metadata: UploadMetadata,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub multipart_upload_id: Option<MultipartUploadId>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl UploadSession {
    pub fn new(
        id: UploadId,
        declared_length: u64,
        metadata: UploadMetadata,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            declared_length,
            metadata,
            expires_at,
            multipart_upload_id: None,
            completed_at: None,
        }
    }

    /// Record the multipart upload handle (first flush wins).
    ///
    /// Returns `false` when a handle was already set; the existing one is kept.
    pub fn attach_multipart(&mut self, upload_id: MultipartUploadId) -> bool {
        if self.multipart_upload_id.is_some() {
            return false;
        }
        self.multipart_upload_id = Some(upload_id);
        true
    }

    pub fn mark_completed(&mut self, at: DateTime<Utc>) {
        self.completed_at = Some(at);
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn session() -> UploadSession {
        let expires_at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap();
        UploadSession::new(UploadId::new("u1"), 1024, UploadMetadata::new(), expires_at)
    }

    #[test]
    fn new_session_has_no_multipart_and_is_incomplete() {
        let session = session();
        assert_eq!(session.multipart_upload_id, None);
        assert!(!session.is_complete());
    }

    #[test]
    fn first_multipart_handle_wins() {
        let mut session = session();

        assert!(session.attach_multipart(MultipartUploadId::new("first")));
        assert!(!session.attach_multipart(MultipartUploadId::new("second")));
        assert_eq!(
            session.multipart_upload_id,
            Some(MultipartUploadId::new("first"))
        );
    }

    #[test]
    fn expiry_is_strictly_after_deadline() {
        let session = session();

        assert!(!session.is_expired(session.expires_at));
        assert!(session.is_expired(session.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn record_without_optional_fields_deserializes() {
        let json = r#"{"id":"u1","declared_length":10,"metadata":[],"expires_at":"2024-01-01T12:30:00Z"}"#;
        let session: UploadSession = serde_json::from_str(json).unwrap();

        assert_eq!(session.declared_length, 10);
        assert_eq!(session.multipart_upload_id, None);
        assert_eq!(session.completed_at, None);
    }
}
