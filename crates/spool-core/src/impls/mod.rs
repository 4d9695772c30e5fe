//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryCache**: TTL つきのキーバリューキャッシュ
//! - **InMemoryLockService**: 保持期限つきの名前付きロック
//! - **InMemoryObjectStore**: マルチパート契約を検証するオブジェクトストア
//!
//! # 本番用実装
//! 本番用の実装は別クレートに配置します（Redis/Valkey キャッシュ・ロック、S3 ストア）。

pub mod inmem_cache;
pub mod inmem_lock;
pub mod inmem_object_store;

// 主要な型を再エクスポート
pub use self::inmem_cache::InMemoryCache;
pub use self::inmem_lock::InMemoryLockService;
pub use self::inmem_object_store::{InMemoryObjectStore, StoreOp, StoreOpKind};
