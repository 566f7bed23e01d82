//! Redis distributed-tier implementation.

use super::{DistributedStore, Transaction, TxGuard, TxOp, TxReply};
use crate::config::RedisConfig;
use crate::error::{Error, Result};
use deadpool_redis::redis::{self, cmd, RedisError};
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use std::collections::HashMap;
use std::time::Duration;

/// `PX` argument for `ttl`; Redis rejects `PX 0`, so sub-millisecond TTLs round up.
fn expiry_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// EXEC attempts for a guarded transaction whose watched key keeps changing.
const GUARD_ATTEMPTS: usize = 5;

fn backend_err(op: &str, key: &str, e: RedisError) -> Error {
    Error::BackendError(format!("Redis {} failed for key {}: {}", op, key, e))
}

/// Redis backend with connection pooling.
///
/// Multi-key transactions use `MULTI`/`EXEC`, so every operation of a
/// [`Transaction`] is applied by the server as one unit. A guarded
/// transaction `WATCH`es the guarded key and checks it before `MULTI`; a
/// concurrent write to that key makes `EXEC` return nil and the check reruns.
///
/// # Example
///
/// ```no_run
/// # use tiercache::backend::{DistributedStore, RedisStore};
/// # use tiercache::config::RedisConfig;
/// # async fn example() -> tiercache::Result<()> {
/// let store = RedisStore::new(RedisConfig::default()).await?;
/// store.set("key", "value", None).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// Create a pooled backend from configuration.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if the pool cannot be built.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = Some(config.connection_timeout);
        pool_config.timeouts.create = Some(config.connection_timeout);

        let mut cfg = Config::from_url(config.url.clone());
        cfg.pool = Some(pool_config);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::ConfigError(format!("Failed to create Redis pool: {}", e)))?;

        info!(
            "✓ Redis backend initialized at {} (pool size: {})",
            config.url, config.pool_size
        );

        Ok(RedisStore { pool })
    }

    /// Build from `REDIS_URL` / `REDIS_POOL_SIZE`.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` for bad variables or pool creation failure.
    pub async fn from_env() -> Result<Self> {
        Self::new(RedisConfig::from_env()?).await
    }

    async fn conn(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::BackendError(format!("Failed to get Redis connection: {}", e)))
    }

    async fn exec_guarded(
        conn: &mut Connection,
        guard: &TxGuard,
        pipe: &redis::Pipeline,
    ) -> Result<Vec<i64>> {
        for attempt in 1..=GUARD_ATTEMPTS {
            let _: () = cmd("WATCH")
                .arg(guard.key())
                .query_async(&mut *conn)
                .await
                .map_err(|e| backend_err("WATCH", guard.key(), e))?;

            let score: Option<f64> = match cmd("ZSCORE")
                .arg(guard.key())
                .arg(guard.member())
                .query_async(&mut *conn)
                .await
            {
                Ok(score) => score,
                Err(e) => {
                    Self::unwatch(conn).await;
                    return Err(backend_err("ZSCORE", guard.key(), e));
                }
            };
            if !guard.holds(score) {
                Self::unwatch(conn).await;
                debug!("Redis EXEC guard on {} not met", guard.key());
                return Err(Error::PreconditionFailed(format!("{:?}", guard)));
            }

            // EXEC replies nil when the watched key changed after WATCH.
            let committed: Option<Vec<i64>> =
                pipe.query_async(&mut *conn).await.map_err(|e| {
                    error!("Redis guarded EXEC on {} failed: {}", guard.key(), e);
                    Error::TransactionAborted(e.to_string())
                })?;
            match committed {
                Some(ints) => return Ok(ints),
                None => debug!(
                    "Redis EXEC on {} lost a race (attempt {}/{})",
                    guard.key(),
                    attempt,
                    GUARD_ATTEMPTS
                ),
            }
        }

        warn!(
            "Redis EXEC on {} gave up after {} attempts",
            guard.key(),
            GUARD_ATTEMPTS
        );
        Err(Error::TransactionAborted(format!(
            "{} changed during {} attempts",
            guard.key(),
            GUARD_ATTEMPTS
        )))
    }

    /// Clear a pending `WATCH` so the pooled connection goes back clean.
    async fn unwatch(conn: &mut Connection) {
        let reset: std::result::Result<(), RedisError> =
            cmd("UNWATCH").query_async(&mut *conn).await;
        if let Err(e) = reset {
            warn!("Redis UNWATCH failed: {}", e);
        }
    }
}

impl DistributedStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        let value: Option<String> = cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| backend_err("GET", key, e))?;
        debug!(
            "✓ Redis GET {} -> {}",
            key,
            if value.is_some() { "HIT" } else { "MISS" }
        );
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn().await?;
        let mut command = cmd("SET");
        command.arg(key).arg(value);
        if let Some(ttl) = ttl {
            command.arg("PX").arg(expiry_millis(ttl));
        }
        let _: () = command
            .query_async(&mut conn)
            .await
            .map_err(|e| backend_err("SET", key, e))?;
        debug!("✓ Redis SET {} (TTL: {:?})", key, ttl);
        Ok(())
    }

    async fn delete(&self, keys: &[&str]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let removed: u64 = cmd("DEL")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| backend_err("DEL", &keys.join(","), e))?;
        debug!("✓ Redis DEL {} keys ({} existed)", keys.len(), removed);
        Ok(removed)
    }

    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn().await?;
        cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| backend_err("HGETALL", key, e))
    }

    async fn hset_all(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let mut command = cmd("HSET");
        command.arg(key);
        for (name, value) in fields {
            command.arg(name).arg(value);
        }
        let _: () = command
            .query_async(&mut conn)
            .await
            .map_err(|e| backend_err("HSET", key, e))?;
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<bool> {
        let mut conn = self.conn().await?;
        let added: i64 = cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(|e| backend_err("ZADD", key, e))?;
        Ok(added > 0)
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = cmd("ZREM")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(|e| backend_err("ZREM", key, e))?;
        Ok(removed > 0)
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        let mut conn = self.conn().await?;
        cmd("ZSCORE")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(|e| backend_err("ZSCORE", key, e))
    }

    async fn zrevrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        cmd("ZREVRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await
            .map_err(|e| backend_err("ZREVRANGE", key, e))
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn().await?;
        cmd("ZCARD")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| backend_err("ZCARD", key, e))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.conn().await?;
        cmd("INCRBY")
            .arg(key)
            .arg(delta)
            .query_async(&mut conn)
            .await
            .map_err(|e| backend_err("INCRBY", key, e))
    }

    async fn exec_atomic(&self, tx: Transaction) -> Result<Vec<TxReply>> {
        if tx.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in tx.ops() {
            match op {
                TxOp::IncrBy { key, delta } => {
                    pipe.cmd("INCRBY").arg(key).arg(*delta);
                }
                TxOp::ZAdd { key, member, score } => {
                    pipe.cmd("ZADD").arg(key).arg(*score).arg(member);
                }
                TxOp::ZRem { key, member } => {
                    pipe.cmd("ZREM").arg(key).arg(member);
                }
                TxOp::Set { key, value, ttl } => {
                    let command = pipe.cmd("SET").arg(key).arg(value);
                    if let Some(ttl) = ttl {
                        command.arg("PX").arg(expiry_millis(*ttl));
                    }
                    command.ignore();
                }
                TxOp::Delete { key } => {
                    pipe.cmd("DEL").arg(key);
                }
            }
        }

        let mut conn = self.conn().await?;
        let ints: Vec<i64> = match tx.guard() {
            Some(guard) => Self::exec_guarded(&mut conn, guard, &pipe).await?,
            None => pipe.query_async(&mut conn).await.map_err(|e| {
                error!("Redis EXEC of {} ops failed: {}", tx.len(), e);
                Error::TransactionAborted(e.to_string())
            })?,
        };

        // SET replies are ignored by the pipeline; every other op yields one integer.
        let mut ints = ints.into_iter();
        let mut replies = Vec::with_capacity(tx.len());
        for op in tx.ops() {
            let reply = match op {
                TxOp::Set { .. } => TxReply::Ok,
                TxOp::ZAdd { .. } | TxOp::ZRem { .. } => {
                    TxReply::Bool(ints.next().unwrap_or_default() > 0)
                }
                TxOp::IncrBy { .. } | TxOp::Delete { .. } => {
                    TxReply::Int(ints.next().unwrap_or_default())
                }
            };
            replies.push(reply);
        }

        debug!("✓ Redis EXEC committed {} ops", replies.len());
        Ok(replies)
    }

    async fn health_check(&self) -> Result<bool> {
        let Ok(mut conn) = self.pool.get().await else {
            return Ok(false);
        };
        let pong: std::result::Result<String, RedisError> =
            cmd("PING").query_async(&mut conn).await;
        Ok(pong.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_never_zero() {
        assert_eq!(expiry_millis(Duration::ZERO), 1);
        assert_eq!(expiry_millis(Duration::from_micros(300)), 1);
        assert_eq!(expiry_millis(Duration::from_secs(2)), 2000);
    }

    #[tokio::test]
    async fn test_redis_store_builds_pool_lazily() {
        // Pool creation does not connect, so this succeeds without a server.
        let store = RedisStore::new(RedisConfig {
            url: "redis://127.0.0.1:1".to_string(),
            pool_size: 2,
            connection_timeout: Duration::from_millis(50),
        })
        .await;
        assert!(store.is_ok());
    }
}
