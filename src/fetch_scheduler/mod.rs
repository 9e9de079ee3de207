//! Bounded concurrent fetch
//!
//! Runs one independent device read per key across a fixed number of
//! workers. Each key succeeds or fails on its own; a failure (or a panic)
//! never cancels sibling reads.

use crate::error::{Error, Result};
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Default worker count
pub const DEFAULT_WORKERS: usize = 10;

/// Per-key results of a fetch run
#[derive(Debug)]
pub struct FetchOutcome<K, V> {
    pub succeeded: HashMap<K, V>,
    /// Failures in completion order
    pub failed: Vec<(K, Error)>,
}

impl<K, V> Default for FetchOutcome<K, V> {
    fn default() -> Self {
        Self {
            succeeded: HashMap::new(),
            failed: Vec::new(),
        }
    }
}

/// Fixed-size worker pool for per-item device reads
#[derive(Debug, Clone, Copy)]
pub struct FetchScheduler {
    workers: usize,
}

impl Default for FetchScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl FetchScheduler {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Fetch every key with at most `workers` reads in flight
    pub async fn run<K, V, F, Fut>(
        &self,
        keys: impl IntoIterator<Item = K>,
        fetch: F,
    ) -> FetchOutcome<K, V>
    where
        K: Clone + Eq + Hash + Send + 'static,
        V: Send + 'static,
        F: Fn(K) -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        for key in keys {
            let semaphore = semaphore.clone();
            let work = fetch(key.clone());
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => AssertUnwindSafe(work).catch_unwind().await.unwrap_or_else(|_| {
                        Err(Error::Internal("Fetch task panicked".to_string()))
                    }),
                    Err(e) => Err(Error::Internal(format!("Semaphore error: {}", e))),
                };
                (key, result)
            });
        }

        let mut outcome = FetchOutcome::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, Ok(value))) => {
                    outcome.succeeded.insert(key, value);
                }
                Ok((key, Err(e))) => outcome.failed.push((key, e)),
                // Unreachable in practice: the task body cannot panic
                Err(e) => tracing::error!(error = %e, "Fetch task aborted"),
            }
        }

        outcome
    }
}
