//! spool-core
//!
//! Buffered resumable-upload engine on top of a key-value cache, a named
//! lock service and a multipart-capable object store.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, metadata, session, part）
//! - **ports**: 抽象化レイヤー（KeyValueCache, LockService, ObjectStore, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（builder, store, sessions, append, finalize, delete, sweeper）
//! - **impls**: 実装（InMemoryCache など開発用）
//! - **config**: EngineConfig
//! - **error**: UploadError

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;

pub use self::app::{
    BuildError, PayloadStream, ResumableUploadStore, SweepLoop, UploadInfo, UploadStoreBuilder,
};
pub use self::config::{ConfigError, EngineConfig};
pub use self::domain::{UploadId, UploadMetadata};
pub use self::error::{UploadError, UploadResult};
