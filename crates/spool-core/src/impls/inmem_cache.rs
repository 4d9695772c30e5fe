//! InMemoryCache - 開発用のキーバリューキャッシュ
//!
//! # 実装詳細
//! - HashMap<String, Entry> を tokio の Mutex で保護
//! - TTL は注入された Clock で評価（読み出し時に遅延削除）

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::ports::{CacheError, Clock, KeyValueCache};

struct Entry {
    value: Bytes,
    expires_at: DateTime<Utc>,
}

/// InMemoryCache は開発・テスト用の KeyValueCache
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// 期限切れを含まない現在のキー数
    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        entries.values().filter(|e| e.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl KeyValueCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CacheError::Unavailable(format!("ttl out of range: {e}")))?;
        let expires_at = self.clock.now() + ttl;
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use crate::ports::cache::{get_json, set_json};
    use chrono::TimeZone;

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ))
    }

    #[tokio::test]
    async fn set_get_remove() {
        let cache = InMemoryCache::new(clock());

        cache
            .set("k", Bytes::from_static(b"v"), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));

        cache.remove("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);

        // 存在しないキーの削除も成功
        cache.remove("k").await.unwrap();
    }

    #[tokio::test]
    async fn entries_expire_with_clock() {
        let clock = clock();
        let cache = InMemoryCache::new(clock.clone());

        cache
            .set("k", Bytes::from_static(b"v"), Duration::from_secs(60))
            .await
            .unwrap();

        clock.advance(chrono::Duration::seconds(59));
        assert!(cache.get("k").await.unwrap().is_some());

        clock.advance(chrono::Duration::seconds(1));
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn json_helpers_round_trip_and_report_codec_errors() {
        let cache = InMemoryCache::new(clock());

        set_json(&cache, "n", &42u64, Duration::from_secs(60))
            .await
            .unwrap();
        let n: Option<u64> = get_json(&cache, "n").await.unwrap();
        assert_eq!(n, Some(42));

        cache
            .set("bad", Bytes::from_static(b"{not json"), Duration::from_secs(60))
            .await
            .unwrap();
        let bad: Result<Option<u64>, _> = get_json(&cache, "bad").await;
        assert!(matches!(bad, Err(CacheError::Codec { key, .. }) if key == "bad"));
    }
}
