//! Per-item request batching.
//!
//! Item fetches that arrive within the batch window are grouped by batch key
//! and passed to one grouped call. Each caller resolves from the returned
//! id → result map, so members settle in whatever order the map is walked.

use crate::error::{ResilienceError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace, warn};

type BatchFn<T> =
    Box<dyn FnOnce(Vec<String>) -> BoxFuture<'static, Result<HashMap<String, T>>> + Send>;

struct OpenBatch<T> {
    id: u64,
    item_ids: Vec<String>,
    waiters: Vec<(String, oneshot::Sender<Result<T>>)>,
    deadline: Instant,
    batch_fn: BatchFn<T>,
}

struct BatchTable<T> {
    open: HashMap<String, OpenBatch<T>>,
    next_id: u64,
}

/// Coalesces per-item calls into grouped calls
pub struct BatchCoordinator<T> {
    window: Duration,
    max_batch_size: usize,
    table: Arc<Mutex<BatchTable<T>>>,
}

impl<T> std::fmt::Debug for BatchCoordinator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCoordinator")
            .field("window", &self.window)
            .field("max_batch_size", &self.max_batch_size)
            .field("open_batches", &self.table.lock().open.len())
            .finish()
    }
}

impl<T> BatchCoordinator<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(window: Duration, max_batch_size: usize) -> Self {
        Self {
            window,
            max_batch_size: max_batch_size.max(1),
            table: Arc::new(Mutex::new(BatchTable {
                open: HashMap::new(),
                next_id: 0,
            })),
        }
    }

    /// Queue `item_id` on the open batch for `batch_key` and wait for its result.
    ///
    /// The batch function of the caller that opened the batch is the one
    /// invoked; later callers' functions are dropped unused.
    pub async fn batch<F, Fut>(
        &self,
        batch_key: impl Into<String>,
        item_id: impl Into<String>,
        batch_fn: F,
    ) -> Result<T>
    where
        F: FnOnce(Vec<String>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<HashMap<String, T>>> + Send + 'static,
    {
        let batch_key = batch_key.into();
        let item_id = item_id.into();
        let (tx, rx) = oneshot::channel();
        let deadline = Instant::now() + self.window;

        let mut ready = Vec::new();
        let mut new_batch_id = None;
        {
            let mut table = self.table.lock();

            // A batch holding this id (or already full) is sent as-is
            let displace = table.open.get(&batch_key).is_some_and(|open| {
                open.item_ids.len() >= self.max_batch_size || open.item_ids.contains(&item_id)
            });
            if displace {
                if let Some(displaced) = table.open.remove(&batch_key) {
                    debug!(batch_key = %batch_key, item_id = %item_id, size = displaced.item_ids.len(), "Flushing displaced batch");
                    ready.push(displaced);
                }
            }

            if !table.open.contains_key(&batch_key) {
                table.next_id += 1;
                let id = table.next_id;
                table.open.insert(
                    batch_key.clone(),
                    OpenBatch {
                        id,
                        item_ids: Vec::new(),
                        waiters: Vec::new(),
                        deadline,
                        batch_fn: Box::new(move |ids| batch_fn(ids).boxed()),
                    },
                );
                new_batch_id = Some(id);
            }

            let full = match table.open.get_mut(&batch_key) {
                Some(open) => {
                    open.item_ids.push(item_id.clone());
                    open.waiters.push((item_id, tx));
                    open.deadline = deadline;
                    trace!(batch_key = %batch_key, size = open.item_ids.len(), "Item added to batch");
                    open.item_ids.len() >= self.max_batch_size
                }
                None => false,
            };

            if full {
                if let Some(open) = table.open.remove(&batch_key) {
                    debug!(batch_key = %batch_key, size = open.item_ids.len(), "Batch full, flushing");
                    ready.push(open);
                }
            }
        }

        for batch in ready {
            spawn_flush(batch_key.clone(), batch);
        }

        if let Some(id) = new_batch_id {
            spawn_window_timer(Arc::clone(&self.table), batch_key, id, deadline);
        }

        rx.await.unwrap_or_else(|_| {
            Err(ResilienceError::operation("batch dropped before settling"))
        })
    }

    /// Number of ids waiting in the open batch for `batch_key`
    pub fn open_batch_len(&self, batch_key: &str) -> usize {
        self.table
            .lock()
            .open
            .get(batch_key)
            .map_or(0, |open| open.item_ids.len())
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

/// Wait out the batch window, following the deadline as adds push it back
fn spawn_window_timer<T>(
    table: Arc<Mutex<BatchTable<T>>>,
    batch_key: String,
    batch_id: u64,
    initial_deadline: Instant,
) where
    T: Clone + Send + 'static,
{
    tokio::spawn(async move {
        let mut deadline = initial_deadline;
        loop {
            sleep_until(deadline).await;

            let expired = {
                let mut table = table.lock();
                match table.open.get(&batch_key) {
                    Some(open) if open.id == batch_id => {
                        if open.deadline <= Instant::now() {
                            table.open.remove(&batch_key)
                        } else {
                            deadline = open.deadline;
                            continue;
                        }
                    }
                    // Flushed early (full or displaced)
                    _ => return,
                }
            };

            if let Some(batch) = expired {
                debug!(batch_key = %batch_key, size = batch.item_ids.len(), "Batch window elapsed, flushing");
                spawn_flush(batch_key, batch);
            }
            return;
        }
    });
}

fn spawn_flush<T>(batch_key: String, batch: OpenBatch<T>)
where
    T: Clone + Send + 'static,
{
    tokio::spawn(async move {
        let OpenBatch {
            item_ids,
            waiters,
            batch_fn,
            ..
        } = batch;

        match batch_fn(item_ids).await {
            Ok(results) => {
                for (item_id, waiter) in waiters {
                    let outcome = match results.get(&item_id) {
                        Some(value) => Ok(value.clone()),
                        None => {
                            debug!(batch_key = %batch_key, item_id = %item_id, "Item missing from batch result");
                            Err(ResilienceError::NotFoundInBatch {
                                batch_key: batch_key.clone(),
                                item_id,
                            })
                        }
                    };
                    let _ = waiter.send(outcome);
                }
            }
            Err(error) => {
                warn!(batch_key = %batch_key, members = waiters.len(), error = %error, "Batch call failed");
                for (_, waiter) in waiters {
                    let _ = waiter.send(Err(error.clone()));
                }
            }
        }
    });
}
