//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアップロードエンジンを実装します。
//!
//! # 主要コンポーネント
//! - **UploadStoreBuilder**: ストアの構築とワイヤリング
//! - **ResumableUploadStore**: プロトコル層向けの表面
//! - **SessionManager**: セッションの作成・参照・有効期限
//! - **AppendEngine**: バッファリングとパート送出
//! - **Finalizer**: 最終パートと完了処理
//! - **UploadDeleter**: 削除と abort
//! - **ExpirationSweeper** / **SweepLoop**: 期限切れの回収

pub mod append;
pub mod builder;
pub mod delete;
pub mod finalize;
pub mod info;
pub mod keys;
pub mod sessions;
pub mod store;
pub mod sweep_loop;
pub mod sweeper;

// 主要な型を再エクスポート
pub use self::append::{AppendEngine, PayloadStream, payload_from_bytes};
pub use self::builder::{BuildError, UploadStoreBuilder};
pub use self::delete::UploadDeleter;
pub use self::finalize::Finalizer;
pub use self::info::UploadInfo;
pub use self::keys::KeyLayout;
pub use self::sessions::{MirroredSession, SessionManager};
pub use self::store::ResumableUploadStore;
pub use self::sweep_loop::SweepLoop;
pub use self::sweeper::ExpirationSweeper;
