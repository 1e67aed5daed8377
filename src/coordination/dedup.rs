//! Request deduplication.
//!
//! Concurrent calls with the same key inside the dedup window collapse into a
//! single underlying call. The operation runs on its own task, so a caller
//! that stops waiting does not cancel the work for the others.

use crate::error::{ResilienceError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace};

type Waiter<T> = oneshot::Sender<Result<T>>;

/// An in-flight call, as seen by new callers looking for something to join
#[derive(Debug, Clone, Copy)]
struct PendingOperation {
    generation: u64,
    started_at: Instant,
}

struct DedupTable<T> {
    /// Joinable call per key
    pending: HashMap<String, PendingOperation>,
    /// Completions per call; a superseded call keeps its own list
    waiters: HashMap<u64, Vec<Waiter<T>>>,
    next_generation: u64,
}

/// Collapses identical concurrent calls
pub struct RequestDeduplicator<T> {
    window: Duration,
    table: Arc<Mutex<DedupTable<T>>>,
}

impl<T> std::fmt::Debug for RequestDeduplicator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDeduplicator")
            .field("window", &self.window)
            .field("pending", &self.table.lock().pending.len())
            .finish()
    }
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            table: Arc::new(Mutex::new(DedupTable {
                pending: HashMap::new(),
                waiters: HashMap::new(),
                next_generation: 0,
            })),
        }
    }

    /// Run `operation` unless an identical call is already in flight within the
    /// window, in which case wait for and share that call's outcome.
    pub async fn deduplicate<F, Fut>(&self, key: impl Into<String>, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let key = key.into();
        let (tx, rx) = oneshot::channel();

        let started = {
            let mut table = self.table.lock();
            let joinable = table
                .pending
                .get(&key)
                .copied()
                .filter(|pending| pending.started_at.elapsed() <= self.window);

            match joinable {
                Some(pending) => {
                    let waiters = table.waiters.entry(pending.generation).or_default();
                    waiters.push(tx);
                    trace!(key = %key, waiters = waiters.len(), "Attached to in-flight call");
                    None
                }
                None => {
                    if table.pending.contains_key(&key) {
                        debug!(key = %key, "In-flight call outside dedup window, starting a new one");
                    }
                    table.next_generation += 1;
                    let generation = table.next_generation;
                    table.pending.insert(
                        key.clone(),
                        PendingOperation {
                            generation,
                            started_at: Instant::now(),
                        },
                    );
                    table.waiters.insert(generation, vec![tx]);
                    Some(generation)
                }
            }
        };

        if let Some(generation) = started {
            let future = operation();
            let table = Arc::clone(&self.table);
            tokio::spawn(async move {
                let outcome = future.await;
                let waiters = {
                    let mut table = table.lock();
                    // Removed the instant the call settles, unless a newer call replaced it
                    if table
                        .pending
                        .get(&key)
                        .is_some_and(|pending| pending.generation == generation)
                    {
                        table.pending.remove(&key);
                    }
                    table.waiters.remove(&generation).unwrap_or_default()
                };
                trace!(key = %key, waiters = waiters.len(), ok = outcome.is_ok(), "Deduplicated call settled");
                settle(waiters, outcome);
            });
        }

        rx.await.unwrap_or_else(|_| {
            Err(ResilienceError::operation(
                "deduplicated operation ended before settling",
            ))
        })
    }

    /// Number of keys with a joinable in-flight call
    pub fn pending_count(&self) -> usize {
        self.table.lock().pending.len()
    }

    /// Whether a call for `key` is in flight
    pub fn is_pending(&self, key: &str) -> bool {
        self.table.lock().pending.contains_key(key)
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Broadcast one outcome to every waiter; dropped receivers are ignored
fn settle<T: Clone>(waiters: Vec<Waiter<T>>, outcome: Result<T>) {
    let mut waiters = waiters.into_iter();
    let Some(last) = waiters.next_back() else {
        return;
    };
    for waiter in waiters {
        let _ = waiter.send(outcome.clone());
    }
    let _ = last.send(outcome);
}
