//! Redis test infrastructure
//!
//! Provides a `TestRedis` helper that starts a Redis container and a few
//! helpers for inspecting streams.

use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::redis::Redis;

/// One stream entry: its id and field map.
pub type StreamEntry = (String, HashMap<String, String>);

/// Test Redis wrapper that ensures proper cleanup
///
/// The container is automatically stopped and removed when this struct is dropped.
///
/// # Example
///
/// ```no_run
/// use test_utils::TestRedis;
///
/// # async fn example() {
/// let redis = TestRedis::new().await;
///
/// // Hand `redis.connection_string` to the code under test, then inspect
/// let entries = redis.stream_entries("mail:spool").await;
/// assert!(entries.is_empty());
/// # }
/// ```
pub struct TestRedis {
    #[allow(dead_code)]
    container: ContainerAsync<Redis>,
    connection: MultiplexedConnection,
    pub connection_string: String,
}

impl TestRedis {
    /// Create a new test Redis instance (Redis 8 Alpine).
    pub async fn new() -> Self {
        let container = Redis::default()
            .with_tag("8-alpine")
            .start()
            .await
            .expect("Failed to start Redis container");

        let host_port = container
            .get_host_port_ipv4(6379)
            .await
            .expect("Failed to get Redis port");

        let connection_string = format!("redis://127.0.0.1:{}", host_port);

        let connection = Client::open(connection_string.clone())
            .expect("Failed to create Redis client")
            .get_multiplexed_async_connection()
            .await
            .expect("Failed to connect to Redis");

        tracing::info!(port = host_port, "Test Redis ready (Redis 8-alpine)");

        Self {
            container,
            connection,
            connection_string,
        }
    }

    /// Get a cloned connection
    pub fn connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }

    /// Get the connection string for manual client creation
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Number of entries in a stream (0 if it does not exist).
    pub async fn stream_len(&self, stream: &str) -> usize {
        let mut conn = self.connection();
        conn.xlen(stream).await.expect("XLEN failed")
    }

    /// Every entry of a stream, oldest first.
    pub async fn stream_entries(&self, stream: &str) -> Vec<StreamEntry> {
        let mut conn = self.connection();
        redis::cmd("XRANGE")
            .arg(stream)
            .arg("-")
            .arg("+")
            .query_async(&mut conn)
            .await
            .expect("XRANGE failed")
    }
}

// Container is automatically cleaned up when TestRedis is dropped
impl Drop for TestRedis {
    fn drop(&mut self) {
        tracing::debug!("Cleaning up test Redis container");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn test_missing_stream_is_empty() {
        let redis = TestRedis::new().await;

        assert_eq!(redis.stream_len("nothing:here").await, 0);
        assert!(redis.stream_entries("nothing:here").await.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn test_stream_entries_in_order() {
        let redis = TestRedis::new().await;
        let mut conn = redis.connection();

        for n in ["1", "2", "3"] {
            let _: String = conn.xadd("jobs", "*", &[("n", n)]).await.unwrap();
        }

        assert_eq!(redis.stream_len("jobs").await, 3);
        let entries = redis.stream_entries("jobs").await;
        let values: Vec<&str> = entries.iter().map(|(_, fields)| fields["n"].as_str()).collect();
        assert_eq!(values, vec!["1", "2", "3"]);
    }
}
