//! Distributed tier: the shared cache every service instance sees.
//!
//! The distributed tier arbitrates consistency between processes. Any
//! multi-key update that must be atomic goes through
//! [`DistributedStore::exec_atomic`]; the cache layer adds no locking of its own.

use crate::error::Result;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

mod inmemory;
#[cfg(feature = "redis")]
mod redis;

pub use inmemory::InMemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// Primitives the cache layer and its consumers need from the distributed tier.
///
/// Absence is never an error: `get` returns `None`, `hget_all` returns an
/// empty map, `zscore` returns `None`. Implementations are cheap to clone and
/// share one underlying connection pool or state.
pub trait DistributedStore: Clone + Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Set a string, optionally expiring after `ttl`.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete keys of any type; returns how many existed.
    fn delete(&self, keys: &[&str]) -> impl Future<Output = Result<u64>> + Send;

    /// All fields of a field-map; empty when the key is absent.
    fn hget_all(&self, key: &str)
        -> impl Future<Output = Result<HashMap<String, String>>> + Send;

    fn hset_all(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Add or rescore a member; true if it was newly added.
    fn zadd(&self, key: &str, member: &str, score: f64)
        -> impl Future<Output = Result<bool>> + Send;

    /// Remove a member; true if it was present.
    fn zrem(&self, key: &str, member: &str) -> impl Future<Output = Result<bool>> + Send;

    fn zscore(&self, key: &str, member: &str)
        -> impl Future<Output = Result<Option<f64>>> + Send;

    /// Members by descending score, inclusive indices, negatives count from the end.
    fn zrevrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;

    fn zcard(&self, key: &str) -> impl Future<Output = Result<u64>> + Send;

    /// Add `delta` to an integer string (absent counts as 0); returns the new value.
    fn incr_by(&self, key: &str, delta: i64) -> impl Future<Output = Result<i64>> + Send;

    /// Apply every operation of `tx` atomically, or none of them.
    ///
    /// A [`TxGuard`] on `tx` is evaluated in the same atomic step as the
    /// operations, so no other writer can slip in between check and apply.
    ///
    /// # Errors
    /// - `Error::PreconditionFailed` when the guard does not hold
    /// - `Error::TransactionAborted` when the transaction was discarded
    fn exec_atomic(&self, tx: Transaction) -> impl Future<Output = Result<Vec<TxReply>>> + Send;

    fn health_check(&self) -> impl Future<Output = Result<bool>> + Send;
}

/// A single operation inside a [`Transaction`].
#[derive(Clone, Debug, PartialEq)]
pub enum TxOp {
    IncrBy {
        key: String,
        delta: i64,
    },
    ZAdd {
        key: String,
        member: String,
        score: f64,
    },
    ZRem {
        key: String,
        member: String,
    },
    Set {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    Delete {
        key: String,
    },
}

/// Ordered-set membership condition a [`Transaction`] requires to commit.
#[derive(Clone, Debug, PartialEq)]
pub enum TxGuard {
    MemberAbsent { key: String, member: String },
    MemberPresent { key: String, member: String },
}

impl TxGuard {
    pub fn key(&self) -> &str {
        match self {
            TxGuard::MemberAbsent { key, .. } | TxGuard::MemberPresent { key, .. } => key,
        }
    }

    pub fn member(&self) -> &str {
        match self {
            TxGuard::MemberAbsent { member, .. } | TxGuard::MemberPresent { member, .. } => member,
        }
    }

    /// Whether the guard holds given the member's current score.
    pub fn holds(&self, score: Option<f64>) -> bool {
        match self {
            TxGuard::MemberAbsent { .. } => score.is_none(),
            TxGuard::MemberPresent { .. } => score.is_some(),
        }
    }
}

/// Per-operation reply of a committed transaction, in submission order.
#[derive(Clone, Debug, PartialEq)]
pub enum TxReply {
    /// `IncrBy` new value, or `Delete` count.
    Int(i64),
    /// `ZAdd` newly added / `ZRem` was present.
    Bool(bool),
    /// `Set`.
    Ok,
}

/// Batch of operations executed with [`DistributedStore::exec_atomic`].
///
/// # Example
///
/// ```
/// use tiercache::backend::Transaction;
///
/// let tx = Transaction::new()
///     .incr_by("video_like_7", 1)
///     .incr_by("user_liked_3", 1)
///     .zadd("user_like_42", "7", 1_700_000_000.0);
/// assert_eq!(tx.len(), 3);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transaction {
    ops: Vec<TxOp>,
    guard: Option<TxGuard>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr_by(mut self, key: impl Into<String>, delta: i64) -> Self {
        self.ops.push(TxOp::IncrBy {
            key: key.into(),
            delta,
        });
        self
    }

    pub fn zadd(mut self, key: impl Into<String>, member: impl Into<String>, score: f64) -> Self {
        self.ops.push(TxOp::ZAdd {
            key: key.into(),
            member: member.into(),
            score,
        });
        self
    }

    pub fn zrem(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.ops.push(TxOp::ZRem {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    pub fn set(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Option<Duration>,
    ) -> Self {
        self.ops.push(TxOp::Set {
            key: key.into(),
            value: value.into(),
            ttl,
        });
        self
    }

    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.ops.push(TxOp::Delete { key: key.into() });
        self
    }

    /// Commit only if `member` is not in the ordered set at `key`.
    pub fn require_absent(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.guard = Some(TxGuard::MemberAbsent {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    /// Commit only if `member` is in the ordered set at `key`.
    pub fn require_present(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.guard = Some(TxGuard::MemberPresent {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    pub fn guard(&self) -> Option<&TxGuard> {
        self.guard.as_ref()
    }

    pub fn ops(&self) -> &[TxOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<TxOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
