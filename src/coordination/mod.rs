//! # Request Coordination
//!
//! Collapses duplicate network work before it reaches the degradation layer.
//!
//! - [`RequestDeduplicator`]: identical concurrent calls share one invocation
//! - [`BatchCoordinator`]: per-item fetches are grouped into one call
//!
//! [`Deduplicated`] and [`Batched`] bind an operation to its key derivation so
//! call sites only pass arguments.
//!
//! Neither layer retries. A caller that stops waiting just ignores its
//! completion; the underlying call still runs to the end.

pub mod batch;
pub mod dedup;

pub use batch::BatchCoordinator;
pub use dedup::RequestDeduplicator;

use crate::error::Result;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// An operation whose calls are deduplicated by a key derived from the arguments
pub struct Deduplicated<A, T, K, F> {
    deduplicator: Arc<RequestDeduplicator<T>>,
    key_fn: K,
    operation: F,
    _args: PhantomData<fn(A)>,
}

impl<A, T, K, F, Fut> Deduplicated<A, T, K, F>
where
    T: Clone + Send + 'static,
    K: Fn(&A) -> String,
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    pub fn new(deduplicator: Arc<RequestDeduplicator<T>>, key_fn: K, operation: F) -> Self {
        Self {
            deduplicator,
            key_fn,
            operation,
            _args: PhantomData,
        }
    }

    pub async fn call(&self, args: A) -> Result<T> {
        let key = (self.key_fn)(&args);
        self.deduplicator
            .deduplicate(key, || (self.operation)(args))
            .await
    }
}

/// A grouped fetch exposed as a per-item call
pub struct Batched<A, T, K, F> {
    coordinator: Arc<BatchCoordinator<T>>,
    /// Maps call arguments to `(batch_key, item_id)`
    key_fn: K,
    batch_fn: Arc<F>,
    _args: PhantomData<fn(A)>,
}

impl<A, T, K, F, Fut> Batched<A, T, K, F>
where
    T: Clone + Send + 'static,
    K: Fn(&A) -> (String, String),
    F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HashMap<String, T>>> + Send + 'static,
{
    pub fn new(coordinator: Arc<BatchCoordinator<T>>, key_fn: K, batch_fn: F) -> Self {
        Self {
            coordinator,
            key_fn,
            batch_fn: Arc::new(batch_fn),
            _args: PhantomData,
        }
    }

    pub async fn call(&self, args: A) -> Result<T> {
        let (batch_key, item_id) = (self.key_fn)(&args);
        let batch_fn = Arc::clone(&self.batch_fn);
        self.coordinator
            .batch(batch_key, item_id, move |ids| batch_fn(ids))
            .await
    }
}
