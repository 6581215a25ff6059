//! Redis checkpoint backend
//!
//! One sorted set per series (`cp:<key>`), scored by step, members encoded
//! by [`codec::encode_member`](super::codec::encode_member). Every write
//! re-arms `EXPIRE` so the collection lives one TTL past its last write.
//!
//! Connections are opened lazily and dropped after I/O failures, so a Redis
//! restart costs a few failed lookups rather than a process restart. Every
//! call is bounded by `op_timeout`; connecting by `connect_timeout`.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::MultiplexedConnection;
use redis::RedisResult;
use tracing::{debug, info, warn};

use super::codec::{collection_name, decode_member, encode_member, parse_collection_name, COLLECTION_PREFIX};
use super::{Checkpoint, CheckpointStore, DEFAULT_CHECKPOINT_TTL};
use crate::error::{Error, Result};
use crate::series::SeriesKey;

/// Redis backend configuration
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// `host:port` or a full `redis://` URL
    pub addr: String,
    /// Budget for establishing a connection
    pub connect_timeout: Duration,
    /// Budget for one command or pipeline round trip
    pub op_timeout: Duration,
    /// Sliding expiry of each series' collection
    pub ttl: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            addr: "localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(2),
            op_timeout: Duration::from_secs(1),
            ttl: DEFAULT_CHECKPOINT_TTL,
        }
    }
}

impl RedisStoreConfig {
    /// Connection URL for the configured address
    pub fn url(&self) -> String {
        if self.addr.contains("://") {
            self.addr.clone()
        } else {
            format!("redis://{}", self.addr)
        }
    }

    fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }
}

/// Redis-backed checkpoint store
pub struct RedisCheckpointStore {
    client: redis::Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    config: RedisStoreConfig,
    closed: AtomicBool,
}

impl RedisCheckpointStore {
    /// Build the client without touching the network.
    pub fn new(config: RedisStoreConfig) -> Result<Self> {
        let client = redis::Client::open(config.url())?;
        Ok(Self {
            client,
            connection: RwLock::new(None),
            config,
            closed: AtomicBool::new(false),
        })
    }

    /// Build the client and try to connect once.
    ///
    /// An unreachable server is logged, not returned: the store keeps
    /// retrying lazily and the engine computes without checkpoints meanwhile.
    pub async fn connect(config: RedisStoreConfig) -> Result<Self> {
        let store = Self::new(config)?;
        match store.connection().await {
            Ok(_) => info!("Connected to checkpoint store at {}", store.config.addr),
            Err(e) => warn!(
                "Checkpoint store at {} unreachable, continuing without checkpoints: {}",
                store.config.addr, e
            ),
        }
        Ok(store)
    }

    pub fn config(&self) -> &RedisStoreConfig {
        &self.config
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::StoreClosed);
        }

        let cached = self.connection.read().clone();
        if let Some(conn) = cached {
            return Ok(conn);
        }

        let conn = match tokio::time::timeout(
            self.config.connect_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(Error::Store(e)),
            Err(_) => {
                return Err(Error::StoreTimeout {
                    operation: "connect",
                    timeout_ms: self.config.connect_timeout.as_millis() as u64,
                })
            }
        };

        debug!("Opened checkpoint store connection to {}", self.config.addr);
        *self.connection.write() = Some(conn.clone());
        Ok(conn)
    }

    /// Await one Redis round trip under the operation timeout.
    async fn run<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.config.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
                    self.connection.write().take();
                }
                Err(Error::Store(e))
            }
            Err(_) => {
                // The multiplexed connection may be wedged; start fresh next time.
                self.connection.write().take();
                Err(Error::StoreTimeout {
                    operation,
                    timeout_ms: self.config.op_timeout.as_millis() as u64,
                })
            }
        }
    }

    fn first_checkpoint(&self, key: SeriesKey, rows: Vec<(String, f64)>) -> Result<Option<Checkpoint>> {
        rows.into_iter()
            .next()
            .map(|(member, score)| decode_member(key, &member, score))
            .transpose()
    }

    fn queue_upsert(&self, pipe: &mut redis::Pipeline, key: SeriesKey, checkpoint: Checkpoint) {
        let name = collection_name(key);
        pipe.cmd("ZREMRANGEBYSCORE")
            .arg(&name)
            .arg(checkpoint.step)
            .arg(checkpoint.step)
            .ignore();
        pipe.cmd("ZADD")
            .arg(&name)
            .arg(checkpoint.step)
            .arg(encode_member(checkpoint))
            .ignore();
        pipe.cmd("EXPIRE")
            .arg(&name)
            .arg(self.config.ttl_secs())
            .ignore();
    }
}

#[async_trait]
impl CheckpointStore for RedisCheckpointStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn upsert(&self, key: SeriesKey, checkpoint: Checkpoint) -> Result<()> {
        self.upsert_batch(&[(key, checkpoint)]).await
    }

    async fn upsert_batch(&self, batch: &[(SeriesKey, Checkpoint)]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for &(key, checkpoint) in batch {
            self.queue_upsert(&mut pipe, key, checkpoint);
        }

        let () = self.run("upsert", pipe.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn find_at_or_below(&self, key: SeriesKey, n: u64) -> Result<Option<Checkpoint>> {
        let mut conn = self.connection().await?;

        let mut cmd = redis::cmd("ZREVRANGEBYSCORE");
        cmd.arg(collection_name(key))
            .arg(n)
            .arg(0)
            .arg("WITHSCORES")
            .arg("LIMIT")
            .arg(0)
            .arg(1);

        let rows: Vec<(String, f64)> = self.run("find_at_or_below", cmd.query_async(&mut conn)).await?;
        self.first_checkpoint(key, rows)
    }

    async fn find_latest(&self, key: SeriesKey) -> Result<Option<Checkpoint>> {
        let mut conn = self.connection().await?;

        let mut cmd = redis::cmd("ZREVRANGE");
        cmd.arg(collection_name(key)).arg(0).arg(0).arg("WITHSCORES");

        let rows: Vec<(String, f64)> = self.run("find_latest", cmd.query_async(&mut conn)).await?;
        self.first_checkpoint(key, rows)
    }

    async fn list_keys(&self, limit: usize) -> Result<Vec<SeriesKey>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", COLLECTION_PREFIX);

        let mut keys: Vec<SeriesKey> = Vec::with_capacity(limit);
        let mut cursor: u64 = 0;
        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(limit);

            let (next, names): (u64, Vec<String>) = self.run("list_keys", cmd.query_async(&mut conn)).await?;
            for name in names {
                match parse_collection_name(&name) {
                    Some(key) if !keys.contains(&key) => keys.push(key),
                    Some(_) => {}
                    None => debug!("Skipping foreign key {:?} during scan", name),
                }
                if keys.len() >= limit {
                    return Ok(keys);
                }
            }

            if next == 0 {
                return Ok(keys);
            }
            cursor = next;
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if self.connection.write().take().is_some() {
            info!("Closed checkpoint store connection to {}", self.config.addr);
        }
    }
}

impl std::fmt::Debug for RedisCheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCheckpointStore")
            .field("addr", &self.config.addr)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
