//! Domain model (ids, session record, part bookkeeping, metadata header).

pub mod ids;
pub mod metadata;
pub mod part;
pub mod session;

pub use ids::{MultipartUploadId, PartToken, UploadId};
pub use metadata::UploadMetadata;
pub use part::{PartList, PartRecord, TransferProgress};
pub use session::UploadSession;
