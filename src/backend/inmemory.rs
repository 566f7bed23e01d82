//! In-process distributed-tier implementation.
//!
//! Shares state across clones, so two [`crate::CacheService`] instances built
//! on clones of one store behave like two processes talking to one cluster.
//! Also carries fault injection hooks used by tests.

use super::{DistributedStore, Transaction, TxOp, TxReply};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

fn is_live(expires: Option<Instant>, now: Instant) -> bool {
    expires.map_or(true, |at| now < at)
}

#[derive(Clone, Default)]
struct StoreState {
    strings: HashMap<String, (String, Option<Instant>)>,
    hashes: HashMap<String, HashMap<String, String>>,
    zsets: HashMap<String, HashMap<String, f64>>,
}

impl StoreState {
    fn live_string(&self, key: &str, now: Instant) -> Option<&str> {
        match self.strings.get(key) {
            Some((value, expires)) if is_live(*expires, now) => Some(value.as_str()),
            _ => None,
        }
    }

    fn set(&mut self, key: &str, value: &str, ttl: Option<Duration>, now: Instant) {
        self.hashes.remove(key);
        self.zsets.remove(key);
        self.strings
            .insert(key.to_string(), (value.to_string(), ttl.map(|t| now + t)));
    }

    fn delete(&mut self, key: &str, now: Instant) -> u64 {
        let removed_string = self
            .strings
            .remove(key)
            .is_some_and(|(_, expires)| is_live(expires, now));
        let removed_hash = self.hashes.remove(key).is_some();
        let removed_zset = self.zsets.remove(key).is_some();
        u64::from(removed_string || removed_hash || removed_zset)
    }

    fn incr_by(&mut self, key: &str, delta: i64, now: Instant) -> Result<i64> {
        let (current, expires) = match self.strings.get(key) {
            Some((raw, expires)) if is_live(*expires, now) => {
                let current = raw.parse::<i64>().map_err(|_| {
                    Error::BackendError(format!("value at {} is not an integer", key))
                })?;
                (current, *expires)
            }
            _ => (0, None),
        };
        let next = current.checked_add(delta).ok_or_else(|| {
            Error::BackendError(format!("increment would overflow at {}", key))
        })?;

        self.strings
            .insert(key.to_string(), (next.to_string(), expires));
        Ok(next)
    }

    fn zadd(&mut self, key: &str, member: &str, score: f64) -> bool {
        self.zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score)
            .is_none()
    }

    fn zrem(&mut self, key: &str, member: &str) -> bool {
        let Some(set) = self.zsets.get_mut(key) else {
            return false;
        };
        let removed = set.remove(member).is_some();
        if set.is_empty() {
            self.zsets.remove(key);
        }
        removed
    }

    fn apply(&mut self, op: &TxOp, now: Instant) -> Result<TxReply> {
        Ok(match op {
            TxOp::IncrBy { key, delta } => TxReply::Int(self.incr_by(key, *delta, now)?),
            TxOp::ZAdd { key, member, score } => TxReply::Bool(self.zadd(key, member, *score)),
            TxOp::ZRem { key, member } => TxReply::Bool(self.zrem(key, member)),
            TxOp::Set { key, value, ttl } => {
                self.set(key, value, *ttl, now);
                TxReply::Ok
            }
            TxOp::Delete { key } => TxReply::Int(self.delete(key, now) as i64),
        })
    }
}

/// In-memory distributed store backed by a single `RwLock`.
///
/// # Example
///
/// ```
/// # use tiercache::backend::{DistributedStore, InMemoryStore};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> tiercache::Result<()> {
/// let store = InMemoryStore::new();
/// store.set("greeting", "hello", None).await?;
/// assert_eq!(store.get("greeting").await?.as_deref(), Some("hello"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
    fail_next_tx: Arc<AtomicBool>,
    unavailable: Arc<AtomicBool>,
    latency: Arc<Mutex<Option<Duration>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the next [`DistributedStore::exec_atomic`] call without applying it.
    pub fn fail_next_transaction(&self) {
        self.fail_next_tx.store(true, Ordering::SeqCst);
    }

    /// While set, every operation fails with `Error::BackendError`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every operation by `latency` (or remove the delay with `None`).
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut guard) = self.latency.lock() {
            *guard = latency;
        }
    }

    /// Number of live keys across all value types.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let state = self.state.read().await;
        let strings = state
            .strings
            .keys()
            .filter(|k| state.live_string(k, now).is_some())
            .count();
        strings + state.hashes.len() + state.zsets.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove everything.
    pub async fn clear_all(&self) {
        let mut state = self.state.write().await;
        *state = StoreState::default();
        warn!("⚠ InMemoryStore cleared");
    }

    async fn enter(&self, op: &str, key: &str) -> Result<()> {
        let latency = self.latency.lock().ok().and_then(|guard| *guard);
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::BackendError(format!(
                "store unavailable during {} {}",
                op, key
            )));
        }
        Ok(())
    }
}

impl DistributedStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.enter("GET", key).await?;
        let state = self.state.read().await;
        let value = state.live_string(key, Instant::now()).map(str::to_string);
        debug!(
            "InMemoryStore GET {} -> {}",
            key,
            if value.is_some() { "HIT" } else { "MISS" }
        );
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.enter("SET", key).await?;
        let mut state = self.state.write().await;
        state.set(key, value, ttl, Instant::now());
        debug!("InMemoryStore SET {} (TTL: {:?})", key, ttl);
        Ok(())
    }

    async fn delete(&self, keys: &[&str]) -> Result<u64> {
        self.enter("DEL", &keys.join(",")).await?;
        let now = Instant::now();
        let mut state = self.state.write().await;
        Ok(keys.iter().map(|key| state.delete(key, now)).sum())
    }

    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>> {
        self.enter("HGETALL", key).await?;
        let state = self.state.read().await;
        Ok(state.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hset_all(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        self.enter("HSET", key).await?;
        let mut state = self.state.write().await;
        state.strings.remove(key);
        let hash = state.hashes.entry(key.to_string()).or_default();
        for (name, value) in fields {
            hash.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<bool> {
        self.enter("ZADD", key).await?;
        let mut state = self.state.write().await;
        Ok(state.zadd(key, member, score))
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        self.enter("ZREM", key).await?;
        let mut state = self.state.write().await;
        Ok(state.zrem(key, member))
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        self.enter("ZSCORE", key).await?;
        let state = self.state.read().await;
        Ok(state.zsets.get(key).and_then(|set| set.get(member)).copied())
    }

    async fn zrevrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        self.enter("ZREVRANGE", key).await?;
        let state = self.state.read().await;
        let Some(set) = state.zsets.get(key) else {
            return Ok(Vec::new());
        };

        let mut members: Vec<(&String, f64)> = set.iter().map(|(m, s)| (m, *s)).collect();
        members.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(a.0)));

        let len = members.len() as isize;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return Ok(Vec::new());
        }

        Ok(members[start as usize..=stop as usize]
            .iter()
            .map(|(m, _)| (*m).clone())
            .collect())
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        self.enter("ZCARD", key).await?;
        let state = self.state.read().await;
        Ok(state.zsets.get(key).map_or(0, |set| set.len() as u64))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.enter("INCRBY", key).await?;
        let mut state = self.state.write().await;
        state.incr_by(key, delta, Instant::now())
    }

    async fn exec_atomic(&self, tx: Transaction) -> Result<Vec<TxReply>> {
        self.enter("EXEC", &format!("{} ops", tx.len())).await?;
        let mut state = self.state.write().await;

        if self.fail_next_tx.swap(false, Ordering::SeqCst) {
            warn!("InMemoryStore transaction of {} ops discarded", tx.len());
            return Err(Error::TransactionAborted(
                "transaction discarded by store".to_string(),
            ));
        }

        if let Some(guard) = tx.guard() {
            let score = state
                .zsets
                .get(guard.key())
                .and_then(|set| set.get(guard.member()))
                .copied();
            if !guard.holds(score) {
                debug!("InMemoryStore EXEC guard on {} not met", guard.key());
                return Err(Error::PreconditionFailed(format!("{:?}", guard)));
            }
        }

        // Stage on a copy so a failing op leaves the live state untouched.
        let now = Instant::now();
        let mut staged = state.clone();
        let mut replies = Vec::with_capacity(tx.len());
        for op in tx.ops() {
            replies.push(staged.apply(op, now)?);
        }
        *state = staged;

        debug!("InMemoryStore EXEC committed {} ops", replies.len());
        Ok(replies)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.unavailable.load(Ordering::SeqCst))
    }
}
