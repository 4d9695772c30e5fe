//! LockService port - 分散排他制御（Redis ロック または InMemory）
//!
//! 複数のステートレスなインスタンスから同じアップロード ID への append が
//! 同時に届くため、プロセス内 Mutex では足りません。名前付き・時間制限付きの
//! ロックで read-modify-write を直列化します。
//!
//! # 設計原則
//! - ロックは名前（アップロード ID 由来）ごと。グローバルロックは取らない
//! - 取得待ちには上限がある（超えたら `LockError::Timeout`、状態は変更しない）
//! - 保持にも期限がある（保持者がクラッシュしても永遠には塞がない）
//! - 解放は fencing token で照合する（期限切れ後に他人のロックを外さない）

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("timed out after {waited:?} waiting for lock {name}")]
    Timeout { name: String, waited: Duration },

    #[error("lock {name} was no longer held at release")]
    Lost { name: String },

    #[error("lock service unavailable: {0}")]
    Unavailable(String),
}

/// 取得済みロックの証明
///
/// `release` に渡すまで保持しているとみなす。drop しても解放されない
/// （保持期限が来るまで他の取得者は待つ）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    name: String,
    token: u64,
}

impl LockLease {
    pub fn new(name: impl Into<String>, token: u64) -> Self {
        Self {
            name: name.into(),
            token,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> u64 {
        self.token
    }
}

#[async_trait]
pub trait LockService: Send + Sync {
    /// `name` のロックを取得する
    ///
    /// - `hold`: 保持期限（この時間を過ぎたロックは他者が取得できる）
    /// - `wait`: 取得待ちの上限
    async fn acquire(&self, name: &str, hold: Duration, wait: Duration)
    -> Result<LockLease, LockError>;

    async fn release(&self, lease: LockLease) -> Result<(), LockError>;
}

/// `name` のロックを保持したまま `action` を実行する
///
/// ロックが取れなければ `action` は一度も呼ばれない。`action` の成否に
/// かかわらず解放を試み、解放の失敗はログに残すだけで結果は `action` のものを返す。
pub async fn run_with_lock<T, E, F, Fut>(
    locks: &dyn LockService,
    name: &str,
    timeout: Duration,
    action: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<LockError>,
{
    let lease = locks.acquire(name, timeout, timeout).await?;
    let result = action().await;
    if let Err(e) = locks.release(lease).await {
        tracing::warn!(lock = name, error = %e, "failed to release lock");
    }
    result
}
