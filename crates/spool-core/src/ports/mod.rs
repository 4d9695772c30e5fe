//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（Redis/Valkey, 分散ロック, S3 など）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - KeyValueCache は速い経路（セッション・バッファ・オフセット・パート一覧）
//! - ObjectStore は耐久性のある保存先（最終オブジェクトと有効期限のミラー）
//! - LockService はアップロード ID ごとの直列化のみを担う

pub mod cache;
pub mod lock;
pub mod object_store;
pub mod clock;
pub mod id_generator;

// 主要な trait を再エクスポート
pub use self::cache::{CacheError, KeyValueCache};
pub use self::lock::{LockError, LockLease, LockService, run_with_lock};
pub use self::object_store::{ByteStream, ObjectMetadata, ObjectStore, StoreError, S3_MIN_PART_SIZE};
pub use self::clock::{Clock, SystemClock, FixedClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
