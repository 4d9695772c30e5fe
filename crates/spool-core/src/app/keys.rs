//! Cache keys, lock names and object keys for one upload.

use crate::domain::UploadId;

const CACHE_NAMESPACE: &str = "spool:upload";

pub(crate) fn session_key(id: &UploadId) -> String {
    format!("{CACHE_NAMESPACE}:{id}:meta")
}

pub(crate) fn buffer_key(id: &UploadId) -> String {
    format!("{CACHE_NAMESPACE}:{id}:buf")
}

/// Committed offset and part list, stored together.
pub(crate) fn progress_key(id: &UploadId) -> String {
    format!("{CACHE_NAMESPACE}:{id}:progress")
}

pub(crate) fn lock_name(id: &UploadId) -> String {
    format!("{CACHE_NAMESPACE}:{id}:lock")
}

/// Object-store key layout.
///
/// `{environment}/{key_prefix}/files/{id}` holds the upload itself and
/// `{environment}/{key_prefix}/upload-info/{id}` its mirrored session record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    file_prefix: String,
    info_prefix: String,
}

impl KeyLayout {
    pub fn new(environment: &str, key_prefix: &str) -> Self {
        let root = format!("{environment}/{key_prefix}").to_lowercase();
        Self {
            file_prefix: format!("{root}/files/"),
            info_prefix: format!("{root}/upload-info/"),
        }
    }

    pub fn file_key(&self, id: &UploadId) -> String {
        format!("{}{id}", self.file_prefix)
    }

    pub fn info_key(&self, id: &UploadId) -> String {
        format!("{}{id}", self.info_prefix)
    }

    pub fn info_prefix(&self) -> &str {
        &self.info_prefix
    }

    /// Upload id of a key listed under the info prefix.
    pub fn id_from_info_key(&self, key: &str) -> Option<UploadId> {
        key.strip_prefix(&self.info_prefix)
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(UploadId::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_lowercased_and_prefixed() {
        let layout = KeyLayout::new("Production", "TUS");
        let id = UploadId::new("01hq");

        assert_eq!(layout.file_key(&id), "production/tus/files/01hq");
        assert_eq!(layout.info_key(&id), "production/tus/upload-info/01hq");
    }

    #[test]
    fn info_key_maps_back_to_id() {
        let layout = KeyLayout::new("local", "tus");
        let id = UploadId::new("01hq");

        assert_eq!(layout.id_from_info_key(&layout.info_key(&id)), Some(id));
        assert_eq!(layout.id_from_info_key("local/tus/files/01hq"), None);
        assert_eq!(layout.id_from_info_key("local/tus/upload-info/"), None);
    }

    #[test]
    fn cache_keys_are_distinct_per_entry() {
        let id = UploadId::new("u1");
        let keys = [
            session_key(&id),
            buffer_key(&id),
            progress_key(&id),
            lock_name(&id),
        ];

        for (i, a) in keys.iter().enumerate() {
            assert!(a.starts_with("spool:upload:u1:"));
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
