//! Shared crawl state, externalized in a Redis-compatible store.
//!
//! Every URL the crawl has touched recently has an entry keyed by
//! `<prefix>:<url>` whose integer value encodes where it is in its lifecycle
//! (see [`CrawlStatus`]). Entries carry an absolute TTL so the store cannot
//! grow unbounded; expiry makes a URL eligible for re-crawling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use thiserror::Error;
use tokio::sync::Mutex;

/// Value for a URL that may be (re-)enqueued.
pub const STATE_READY: i64 = 0;
/// Value for a URL that is on the broker or being processed by a worker.
pub const STATE_ENQUEUED: i64 = 1;

/// Fixed delay between reconnect attempts after a connection failure.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Decoded view of a raw state value.
///
/// Values `>= 2` are transient-failure retry counters: a value of `v` means
/// `v - 1` retries have been performed (the counter enters the retry band at
/// 2 so an expired-and-recreated entry can never be mistaken for Enqueued).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlStatus {
    Ready,
    Enqueued,
    Retrying(u32),
}

impl CrawlStatus {
    pub fn from_value(value: i64) -> Self {
        match value {
            v if v <= STATE_READY => CrawlStatus::Ready,
            STATE_ENQUEUED => CrawlStatus::Enqueued,
            v => CrawlStatus::Retrying((v - 1) as u32),
        }
    }

    /// Number of transient-failure retries already performed.
    pub fn retries(&self) -> u32 {
        match self {
            CrawlStatus::Retrying(n) => *n,
            _ => 0,
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("KV command failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("KV connection lost, reconnect in progress")]
    Disconnected,
}

/// Thread-safe facade over the URL state store.
///
/// All commands serialize on one mutex so pipelining stays coherent. On an
/// I/O error the current caller gets the error back and a single background
/// task reconnects with a fixed backoff; until it succeeds every call returns
/// [`StoreError::Disconnected`].
#[derive(Clone)]
pub struct UrlStore {
    inner: Arc<Inner>,
}

struct Inner {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
    reconnecting: AtomicBool,
    prefix: String,
    ttl: Duration,
    ttl_extend: Duration,
}

impl UrlStore {
    pub async fn connect(
        addr: &str,
        prefix: &str,
        ttl: Duration,
        ttl_extend: Duration,
    ) -> Result<Self, StoreError> {
        let client = redis::Client::open(addr)?;
        let conn = client.get_multiplexed_async_connection().await?;

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                conn: Mutex::new(Some(conn)),
                reconnecting: AtomicBool::new(false),
                prefix: prefix.to_string(),
                ttl,
                ttl_extend,
            }),
        })
    }

    fn key(&self, url: &str) -> String {
        format!("{}:{}", self.inner.prefix, url)
    }

    fn ttl_secs(&self) -> u64 {
        self.inner.ttl.as_secs().max(1)
    }

    /// Current raw state value for a URL; absent reads as [`STATE_READY`].
    pub async fn get(&self, url: &str) -> Result<i64, StoreError> {
        let value: Option<i64> = self.run(redis::cmd("GET").arg(self.key(url))).await?;
        Ok(value.unwrap_or(STATE_READY))
    }

    /// Decoded state for a URL.
    pub async fn status(&self, url: &str) -> Result<CrawlStatus, StoreError> {
        Ok(CrawlStatus::from_value(self.get(url).await?))
    }

    /// Write a value with the full TTL.
    pub async fn set(&self, url: &str, value: i64) -> Result<(), StoreError> {
        self.run(
            redis::cmd("SETEX")
                .arg(self.key(url))
                .arg(self.ttl_secs())
                .arg(value),
        )
        .await
    }

    /// Write a value, extending any existing TTL by the configured increment
    /// (capped at the full TTL). Absent keys get the full TTL.
    pub async fn set_or_extend(&self, url: &str, value: i64) -> Result<(), StoreError> {
        let remaining: i64 = self.run(redis::cmd("TTL").arg(self.key(url))).await?;

        let new_ttl = if remaining > 0 {
            (remaining as u64 + self.inner.ttl_extend.as_secs()).min(self.ttl_secs())
        } else {
            self.ttl_secs()
        };

        self.run(
            redis::cmd("SETEX")
                .arg(self.key(url))
                .arg(new_ttl)
                .arg(value),
        )
        .await
    }

    /// Increment a URL's counter, creating it with the full TTL when absent.
    /// Returns the post-increment value.
    pub async fn incr(&self, url: &str) -> Result<i64, StoreError> {
        let value: i64 = self.run(redis::cmd("INCR").arg(self.key(url))).await?;
        if value == 1 {
            // Key was created by this increment; give it the full TTL.
            self.run::<()>(
                redis::cmd("EXPIRE")
                    .arg(self.key(url))
                    .arg(self.ttl_secs()),
            )
            .await?;
        }
        Ok(value)
    }

    /// Remaining TTL in seconds (-2 when absent, -1 when persistent).
    pub async fn ttl(&self, url: &str) -> Result<i64, StoreError> {
        self.run(redis::cmd("TTL").arg(self.key(url))).await
    }

    pub async fn exists(&self, url: &str) -> Result<bool, StoreError> {
        self.run(redis::cmd("EXISTS").arg(self.key(url))).await
    }

    pub async fn ping(&self) -> Result<String, StoreError> {
        self.run(&redis::cmd("PING")).await
    }

    /// Delete an entry. Maintenance/test helper.
    pub async fn del(&self, url: &str) -> Result<(), StoreError> {
        self.run(redis::cmd("DEL").arg(self.key(url))).await
    }

    /// All keys under this store's prefix. Maintenance/test helper.
    pub async fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.run(redis::cmd("KEYS").arg(format!("{}:*", self.inner.prefix)))
            .await
    }

    /// Drop the connection. Subsequent calls fail until a reconnect.
    pub async fn close(&self) {
        *self.inner.conn.lock().await = None;
    }

    async fn run<T: redis::FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T, StoreError> {
        let mut guard = self.inner.conn.lock().await;
        let conn = guard.as_mut().ok_or(StoreError::Disconnected)?;

        match cmd.query_async(conn).await {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_io_error() || e.is_connection_dropped() || e.is_unrecoverable_error() {
                    // Poison the connection; a single task re-dials in the
                    // background while callers keep getting errors.
                    *guard = None;
                    drop(guard);
                    self.spawn_reconnect();
                }
                Err(StoreError::Redis(e))
            }
        }
    }

    fn spawn_reconnect(&self) {
        if self.inner.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(RECONNECT_BACKOFF).await;
                match inner.client.get_multiplexed_async_connection().await {
                    Ok(conn) => {
                        *inner.conn.lock().await = Some(conn);
                        inner.reconnecting.store(false, Ordering::SeqCst);
                        tracing::info!("Reconnected to URL state store");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "URL state store reconnect failed, retrying");
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_decoding() {
        assert_eq!(CrawlStatus::from_value(0), CrawlStatus::Ready);
        assert_eq!(CrawlStatus::from_value(-1), CrawlStatus::Ready);
        assert_eq!(CrawlStatus::from_value(1), CrawlStatus::Enqueued);
        assert_eq!(CrawlStatus::from_value(2), CrawlStatus::Retrying(1));
        assert_eq!(CrawlStatus::from_value(5), CrawlStatus::Retrying(4));
    }

    #[test]
    fn test_retries() {
        assert_eq!(CrawlStatus::Ready.retries(), 0);
        assert_eq!(CrawlStatus::Enqueued.retries(), 0);
        assert_eq!(CrawlStatus::Retrying(3).retries(), 3);
    }

    async fn test_store(prefix: &str) -> Option<UrlStore> {
        match UrlStore::connect(
            "redis://127.0.0.1:6379/",
            prefix,
            Duration::from_secs(3600),
            Duration::from_secs(600),
        )
        .await
        {
            Ok(store) => Some(store),
            Err(_) => {
                println!("Redis not available, skipping test");
                None
            }
        }
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let store = match test_store("mirror_worker_test_set_get").await {
            Some(s) => s,
            None => return,
        };
        let url = "https://test.local/page";

        assert_eq!(store.get(url).await.unwrap(), STATE_READY);

        store.set(url, STATE_ENQUEUED).await.unwrap();
        assert_eq!(store.get(url).await.unwrap(), STATE_ENQUEUED);
        assert_eq!(store.status(url).await.unwrap(), CrawlStatus::Enqueued);
        assert!(store.ttl(url).await.unwrap() > 0);

        store.del(url).await.unwrap();
    }

    #[tokio::test]
    async fn test_incr_creates_with_ttl() {
        let store = match test_store("mirror_worker_test_incr").await {
            Some(s) => s,
            None => return,
        };
        let url = "https://test.local/5xx";
        store.del(url).await.unwrap();

        assert_eq!(store.incr(url).await.unwrap(), 1);
        assert!(store.ttl(url).await.unwrap() > 0);
        assert_eq!(store.incr(url).await.unwrap(), 2);

        store.del(url).await.unwrap();
    }

    #[tokio::test]
    async fn test_set_or_extend_caps_at_full_ttl() {
        let store = match test_store("mirror_worker_test_extend").await {
            Some(s) => s,
            None => return,
        };
        let url = "https://test.local/extend";
        store.del(url).await.unwrap();

        store.set_or_extend(url, STATE_ENQUEUED).await.unwrap();
        let first = store.ttl(url).await.unwrap();
        assert!(first > 0 && first <= 3600);

        store.set_or_extend(url, STATE_ENQUEUED).await.unwrap();
        let second = store.ttl(url).await.unwrap();
        assert!(second <= 3600);

        store.del(url).await.unwrap();
    }

    #[tokio::test]
    async fn test_ping() {
        let store = match test_store("mirror_worker_test_ping").await {
            Some(s) => s,
            None => return,
        };
        assert_eq!(store.ping().await.unwrap(), "PONG");
    }

    #[tokio::test]
    async fn test_close_disconnects() {
        let store = match test_store("mirror_worker_test_close").await {
            Some(s) => s,
            None => return,
        };
        store.close().await;
        assert!(matches!(
            store.ping().await,
            Err(StoreError::Disconnected)
        ));
    }
}
