//! InMemoryLockService - 開発用の名前付きロック
//!
//! # 学習ポイント
//! - Notify による待機者の起床（notified() を先に enable してから状態を確認する）
//! - 保持期限つきロック（保持者が release しなくても期限で解放される）
//! - fencing token で「期限切れ後の release」を無害にする

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::ports::{LockError, LockLease, LockService};

struct Held {
    token: u64,
    expires_at: Instant,
}

/// InMemoryLockService は単一プロセス内で LockService を実装する
///
/// 複数インスタンス構成では Redis などの分散ロックに置き換える。
pub struct InMemoryLockService {
    held: Mutex<HashMap<String, Held>>,
    notify: Notify,
    next_token: AtomicU64,
}

impl InMemoryLockService {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            next_token: AtomicU64::new(1),
        }
    }

    /// `name` が現在保持されているか（期限切れは保持とみなさない）
    pub async fn is_held(&self, name: &str) -> bool {
        let held = self.held.lock().await;
        held.get(name)
            .is_some_and(|h| h.expires_at > Instant::now())
    }
}

impl Default for InMemoryLockService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockService for InMemoryLockService {
    async fn acquire(
        &self,
        name: &str,
        hold: Duration,
        wait: Duration,
    ) -> Result<LockLease, LockError> {
        let deadline = Instant::now() + wait;
        loop {
            // release の通知を取りこぼさないよう、状態確認より前に登録する
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake_at = {
                let mut held = self.held.lock().await;
                let now = Instant::now();
                match held.get(name) {
                    Some(current) if current.expires_at > now => current.expires_at.min(deadline),
                    _ => {
                        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                        held.insert(
                            name.to_string(),
                            Held {
                                token,
                                expires_at: now + hold,
                            },
                        );
                        return Ok(LockLease::new(name, token));
                    }
                }
            };

            if Instant::now() >= deadline {
                return Err(LockError::Timeout {
                    name: name.to_string(),
                    waited: wait,
                });
            }

            // release されるか、保持期限 / 待機期限が来るまで待つ
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn release(&self, lease: LockLease) -> Result<(), LockError> {
        let released = {
            let mut held = self.held.lock().await;
            match held.get(lease.name()) {
                Some(current) if current.token == lease.token() => {
                    held.remove(lease.name());
                    true
                }
                _ => false,
            }
        }; // Lock released here

        if !released {
            return Err(LockError::Lost {
                name: lease.name().to_string(),
            });
        }
        self.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const HOLD: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn acquire_and_release() {
        let locks = InMemoryLockService::new();

        let lease = locks
            .acquire("a", HOLD, Duration::from_millis(10))
            .await
            .unwrap();
        assert!(locks.is_held("a").await);

        locks.release(lease).await.unwrap();
        assert!(!locks.is_held("a").await);
    }

    #[tokio::test]
    async fn contended_acquire_times_out() {
        let locks = InMemoryLockService::new();
        let _lease = locks.acquire("a", HOLD, Duration::ZERO).await.unwrap();

        let start = Instant::now();
        let result = locks.acquire("a", HOLD, Duration::from_millis(200)).await;

        assert!(matches!(result, Err(LockError::Timeout { name, .. }) if name == "a"));
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn different_names_do_not_contend() {
        let locks = InMemoryLockService::new();
        let _a = locks.acquire("a", HOLD, Duration::ZERO).await.unwrap();

        let b = locks.acquire("b", HOLD, Duration::ZERO).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn release_wakes_waiter() {
        let locks = Arc::new(InMemoryLockService::new());
        let lease = locks.acquire("a", HOLD, Duration::ZERO).await.unwrap();

        let waiter = tokio::spawn({
            let locks = locks.clone();
            async move { locks.acquire("a", HOLD, Duration::from_secs(5)).await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        locks.release(lease).await.unwrap();

        let acquired = waiter.await.unwrap();
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn expired_hold_can_be_taken_over() {
        let locks = InMemoryLockService::new();
        let stale = locks
            .acquire("a", Duration::from_millis(50), Duration::ZERO)
            .await
            .unwrap();

        // 保持期限が切れるまで待てば取得できる
        let fresh = locks
            .acquire("a", HOLD, Duration::from_secs(1))
            .await
            .unwrap();
        assert_ne!(stale.token(), fresh.token());

        // 古い lease の release は新しい保持者を外さない
        assert!(matches!(
            locks.release(stale).await,
            Err(LockError::Lost { .. })
        ));
        assert!(locks.is_held("a").await);
    }
}
