//! Redis 键值存储模块
//!
//! 提供 Redis 连接管理和条件写入类原子操作封装，供幂等标记与临时时间戳使用。

use crate::config::RedisConfig;
use crate::error::{Result, SharedError};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;
use tracing::{info, instrument};

/// 值等于期望值时替换为新值，返回 1 表示替换成功
const COMPARE_AND_SET_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2])
    return 1
end
return 0
"#;

/// 值等于期望值时删除，返回 1 表示删除成功
const COMPARE_AND_DELETE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Redis 键值存储客户端
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    key_prefix: String,
}

impl RedisStore {
    /// 创建 Redis 客户端
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        info!(key_prefix = %config.key_prefix, "Redis client created");
        Ok(Self {
            client,
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// 拼接带前缀的完整 key
    pub fn key(&self, suffix: &str) -> String {
        if self.key_prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}:{}", self.key_prefix, suffix)
        }
    }

    /// 获取连接
    async fn get_conn(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(SharedError::from)
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.get_conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(SharedError::from)
    }

    /// 获取原始字符串值
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_conn().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    /// 无条件写入（不过期）
    #[instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    /// 删除值
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    /// 原子性地仅在 key 不存在时设置值，并指定毫秒级 TTL
    ///
    /// 基于 Redis SET NX PX 实现。返回 true 表示设置成功，false 表示 key 已存在。
    #[instrument(skip(self, value))]
    pub async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.get_conn().await?;
        let ttl_ms = ttl.as_millis().max(1) as u64;

        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    /// 仅在 key 不存在时写入（SET NX），不设置过期时间
    ///
    /// 返回 true 表示写入成功，false 表示 key 已存在。
    #[instrument(skip(self, value))]
    pub async fn set_nx(&self, key: &str, value: &str) -> Result<bool> {
        let mut conn = self.get_conn().await?;
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        Ok(result.is_some())
    }

    /// 原子读取并删除（GETDEL）
    #[instrument(skip(self))]
    pub async fn take(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_conn().await?;
        let value: Option<String> = redis::cmd("GETDEL").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    /// 值等于 `expected` 时替换为 `value`（永久保存，清除 TTL）
    #[instrument(skip(self, expected, value))]
    pub async fn compare_and_set(&self, key: &str, expected: &str, value: &str) -> Result<bool> {
        let mut conn = self.get_conn().await?;
        let replaced: i64 = Script::new(COMPARE_AND_SET_SCRIPT)
            .key(key)
            .arg(expected)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;
        Ok(replaced == 1)
    }

    /// 值等于 `expected` 时删除
    #[instrument(skip(self, expected))]
    pub async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.get_conn().await?;
        let deleted: i64 = Script::new(COMPARE_AND_DELETE_SCRIPT)
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(prefix: &str) -> RedisConfig {
        RedisConfig {
            url: std::env::var("TEST_REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379/1".to_string()),
            key_prefix: prefix.to_string(),
        }
    }

    #[test]
    fn test_key_prefix() {
        let store = RedisStore::new(&test_config("reward")).unwrap();
        assert_eq!(store.key("attr:1"), "reward:attr:1");

        let bare = RedisStore::new(&test_config("")).unwrap();
        assert_eq!(bare.key("attr:1"), "attr:1");
    }

    #[tokio::test]
    #[ignore = "需要 Redis 实例（TEST_REDIS_URL）"]
    async fn test_set_nx_and_compare_and_set() {
        let store = RedisStore::new(&test_config("reward-test")).unwrap();
        let key = store.key(&format!("cas:{}", chrono::Utc::now().timestamp_micros()));

        assert!(store.set_nx_px(&key, "claim-a", Duration::from_secs(5)).await.unwrap());
        assert!(!store.set_nx_px(&key, "claim-b", Duration::from_secs(5)).await.unwrap());

        assert!(!store.compare_and_set(&key, "claim-b", "done").await.unwrap());
        assert!(store.compare_and_set(&key, "claim-a", "done").await.unwrap());
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("done"));

        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "需要 Redis 实例（TEST_REDIS_URL）"]
    async fn test_take_clears_value() {
        let store = RedisStore::new(&test_config("reward-test")).unwrap();
        let key = store.key(&format!("take:{}", chrono::Utc::now().timestamp_micros()));

        store.set(&key, "v").await.unwrap();
        assert_eq!(store.take(&key).await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.take(&key).await.unwrap(), None);
    }
}
