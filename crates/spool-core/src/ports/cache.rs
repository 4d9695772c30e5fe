//! KeyValueCache port - 一時的なキーバリューストア（Redis/Valkey または InMemory）
//!
//! アップロードごとのセッション記録、未フラッシュのバッファ、コミット済み
//! オフセット、パート一覧を保持します。
//!
//! # 設計原則
//! - キー単位の原子性のみを前提とする（キーをまたぐトランザクションはない）
//! - 正しさはアップロード ID ごとのロック規律に依存する
//! - すべてのエントリに TTL を付ける（アップロードの有効期限より長く）

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache entry {key} could not be decoded: {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// KeyValueCache はバイト列レベルの get/set/remove を提供
///
/// 型付きの読み書きは [`get_json`] / [`set_json`] を使う。
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;

    /// 存在しないキーの削除は成功扱い
    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// JSON としてエントリを読み出す
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn KeyValueCache,
    key: &str,
) -> Result<Option<T>, CacheError> {
    let Some(raw) = cache.get(key).await? else {
        return Ok(None);
    };
    serde_json::from_slice(&raw)
        .map(Some)
        .map_err(|source| CacheError::Codec {
            key: key.to_string(),
            source,
        })
}

/// JSON としてエントリを書き込む
pub async fn set_json<T: Serialize + ?Sized>(
    cache: &dyn KeyValueCache,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), CacheError> {
    let raw = serde_json::to_vec(value).map_err(|source| CacheError::Codec {
        key: key.to_string(),
        source,
    })?;
    cache.set(key, Bytes::from(raw), ttl).await
}
