//! # Quorum Collector
//!
//! Fan a request out to N untrusted replicas, feed every answer (or
//! failure) into a [`Collector`], and [`Collector::wait`] resolves as soon
//! as any one answer has been seen `min` times — by default a majority of
//! the fleet. Equality is decided by a content fingerprint of the
//! canonical encoding, never by reference identity, so answers from
//! different processes compare correctly.
//!
//! Concurrency contract: one `add`/`add_error` caller per remote target,
//! all guarded by a single mutex held only for O(1) bookkeeping; `wait`
//! is consumed by exactly one task. Later calls after the outcome latches
//! are no-ops.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::watch;
use vellum_types::{codec, crypto};

/// Aggregated failure of a fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuorumError {
    /// Failures themselves reached the threshold; carries the first one.
    #[error("quorum of failures: {0}")]
    ErrorQuorum(String),

    /// Every target answered without any value reaching the threshold.
    #[error("failed to get enough same results")]
    Insufficient,
}

struct Inner<T> {
    total: usize,
    min: usize,
    counts: HashMap<String, usize>,
    errors: Vec<String>,
    outcome: Option<Result<T, QuorumError>>,
}

/// Collects up to `total` responses and latches the first value seen
/// `min` times.
pub struct Collector<T> {
    inner: Mutex<Inner<T>>,
    latched: watch::Sender<bool>,
}

impl<T: Serialize + Clone> Collector<T> {
    /// `min == 0` selects the majority rule `total / 2 + 1`.
    pub fn new(total: usize, min: usize) -> Self {
        let min = if min == 0 { total / 2 + 1 } else { min };
        Self {
            inner: Mutex::new(Inner {
                total,
                min,
                counts: HashMap::new(),
                errors: Vec::new(),
                outcome: None,
            }),
            latched: watch::channel(false).0,
        }
    }

    /// Record one target's answer.
    pub fn add(&self, result: T) {
        let fingerprint = match codec::to_bytes(&result) {
            Ok(bytes) => hex::encode(crypto::hash(&bytes)),
            // An answer we cannot canonicalise can never match another.
            Err(err) => {
                self.add_error(err.to_string());
                return;
            }
        };
        let mut inner = self.inner.lock();
        if inner.outcome.is_some() {
            return;
        }
        let min = inner.min;
        let count = inner.counts.entry(fingerprint).or_insert(0);
        *count += 1;
        if *count >= min {
            inner.outcome = Some(Ok(result));
            let _ = self.latched.send(true);
            return;
        }
        self.check_exhausted(&mut inner);
    }

    /// Record one target's failure.
    pub fn add_error(&self, error: impl Into<String>) {
        let mut inner = self.inner.lock();
        if inner.outcome.is_some() {
            return;
        }
        inner.errors.push(error.into());
        if inner.errors.len() >= inner.min {
            let first = inner.errors[0].clone();
            inner.outcome = Some(Err(QuorumError::ErrorQuorum(first)));
            let _ = self.latched.send(true);
            return;
        }
        self.check_exhausted(&mut inner);
    }

    fn check_exhausted(&self, inner: &mut Inner<T>) {
        let responses: usize = inner.counts.values().sum::<usize>() + inner.errors.len();
        if responses >= inner.total {
            inner.outcome = Some(Err(QuorumError::Insufficient));
            let _ = self.latched.send(true);
        }
    }

    /// Block until the outcome latches. Callers bound the wait with their
    /// own timeout; a collector whose senders all disappear without
    /// exhausting `total` never resolves.
    pub async fn wait(&self) -> Result<T, QuorumError> {
        let mut rx = self.latched.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
        self.inner
            .lock()
            .outcome
            .clone()
            .unwrap_or(Err(QuorumError::Insufficient))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_majority_agreement() {
        // total=5, min defaults to 3.
        let collector = Collector::new(5, 0);
        collector.add("height=7".to_string());
        collector.add_error("connection refused");
        collector.add("height=7".to_string());
        collector.add("height=6".to_string());
        collector.add("height=7".to_string());
        assert_eq!(collector.wait().await.unwrap(), "height=7");
    }

    #[tokio::test]
    async fn test_latches_before_stragglers() {
        let collector = Collector::new(5, 0);
        collector.add(1u64);
        collector.add(1u64);
        collector.add(1u64);
        // Stragglers after the latch are no-ops.
        collector.add(2u64);
        collector.add_error("late failure");
        assert_eq!(collector.wait().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_split_vote_is_insufficient() {
        let collector = Collector::new(5, 0);
        collector.add("a".to_string());
        collector.add("a".to_string());
        collector.add("b".to_string());
        collector.add("b".to_string());
        collector.add("c".to_string());
        assert_eq!(collector.wait().await, Err(QuorumError::Insufficient));
    }

    #[tokio::test]
    async fn test_error_quorum_returns_first_error() {
        let collector = Collector::<String>::new(5, 0);
        collector.add_error("first");
        collector.add_error("second");
        collector.add_error("third");
        assert_eq!(
            collector.wait().await,
            Err(QuorumError::ErrorQuorum("first".into()))
        );
    }

    #[tokio::test]
    async fn test_concurrent_adders() {
        let collector = Arc::new(Collector::new(9, 0));
        let tasks: Vec<_> = (0..9u64)
            .map(|i| {
                let collector = collector.clone();
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        collector.add("agree".to_string());
                    } else {
                        collector.add_error(format!("fail {i}"));
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(collector.wait().await.unwrap(), "agree");
    }

    #[tokio::test]
    async fn test_explicit_min() {
        let collector = Collector::new(4, 2);
        collector.add(10u32);
        collector.add(10u32);
        assert_eq!(collector.wait().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_wait_after_latch_resolves_immediately() {
        let collector = Collector::new(1, 1);
        collector.add(5u8);
        assert_eq!(collector.wait().await.unwrap(), 5);
    }
}
