//! Redis Streams spool store.
//!
//! Each record is appended to a stream with `XADD ... MAXLEN ~`; the stream
//! entry id becomes the record identity. The retry worker reads the same
//! `record` field back.

use super::SpoolStore;
use crate::error::BulkMailResult;
use crate::models::SpoolRecord;
use async_trait::async_trait;
use core_config::redis::RedisConfig;
use core_config::{ConfigError, FromEnv, env_or_default};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tracing::debug;

/// Field the serialized record is stored under.
pub const RECORD_FIELD: &str = "record";

/// Where spool records are written.
#[derive(Debug, Clone)]
pub struct RedisSpoolConfig {
    /// Redis connection URI.
    pub uri: String,
    /// Stream name.
    pub stream_name: String,
    /// Maximum stream length (approximate trimming).
    pub max_length: i64,
}

impl Default for RedisSpoolConfig {
    fn default() -> Self {
        Self {
            uri: "redis://127.0.0.1:6379".to_string(),
            stream_name: "mail:spool".to_string(),
            max_length: 100_000,
        }
    }
}

impl FromEnv for RedisSpoolConfig {
    /// Requires `REDIS_HOST`; `BULK_MAIL_SPOOL_STREAM` defaults to `mail:spool`.
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            uri: RedisConfig::from_env()?.uri,
            stream_name: env_or_default("BULK_MAIL_SPOOL_STREAM", "mail:spool"),
            ..Self::default()
        })
    }
}

/// Spool store backed by a Redis stream.
#[derive(Clone)]
pub struct RedisSpoolStore {
    redis: Arc<ConnectionManager>,
    config: RedisSpoolConfig,
}

impl RedisSpoolStore {
    pub fn new(redis: ConnectionManager, config: RedisSpoolConfig) -> Self {
        Self {
            redis: Arc::new(redis),
            config,
        }
    }

    /// Open a managed connection to `config.uri`.
    pub async fn connect(config: RedisSpoolConfig) -> BulkMailResult<Self> {
        let client = redis::Client::open(config.uri.as_str())?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::new(manager, config))
    }

    pub fn stream_name(&self) -> &str {
        &self.config.stream_name
    }

    /// Get the current stream length.
    pub async fn stream_length(&self) -> BulkMailResult<i64> {
        let mut conn = (*self.redis).clone();
        let len: i64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }
}

#[async_trait]
impl SpoolStore for RedisSpoolStore {
    async fn create_record(&self, record: &SpoolRecord) -> BulkMailResult<Option<String>> {
        let mut conn = (*self.redis).clone();

        let record_json = serde_json::to_string(record)?;

        let stream_id: Option<String> = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.config.max_length)
            .arg("*")
            .arg(RECORD_FIELD)
            .arg(&record_json)
            .arg("priority")
            .arg(record.priority.to_string())
            .query_async(&mut conn)
            .await?;

        debug!(
            stream = %self.config.stream_name,
            stream_id = ?stream_id,
            record_id = %record.id,
            "Appended spool record"
        );

        Ok(stream_id)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RedisSpoolConfig::default();
        assert_eq!(config.stream_name, "mail:spool");
        assert_eq!(config.max_length, 100_000);
    }

    #[test]
    fn test_config_from_env() {
        temp_env::with_vars(
            [
                ("REDIS_HOST", Some("redis://cache:6379")),
                ("BULK_MAIL_SPOOL_STREAM", Some("newsletter:spool")),
            ],
            || {
                let config = RedisSpoolConfig::from_env().unwrap();
                assert_eq!(config.uri, "redis://cache:6379");
                assert_eq!(config.stream_name, "newsletter:spool");
                assert_eq!(config.max_length, 100_000);
            },
        );
    }

    #[test]
    fn test_config_from_env_requires_redis_host() {
        temp_env::with_var_unset("REDIS_HOST", || {
            let err = RedisSpoolConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("REDIS_HOST"));
        });
    }
}
