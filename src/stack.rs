//! # Resilience Stack
//!
//! Explicit construction of the shared client-side components: one response
//! cache, one circuit breaker, the degradation manager on top of both, the
//! request coordinators, the stream client and the sync manager reading from
//! it. Nothing here is global; build one stack per remote API.
//!
//! ```text
//! execute(key, feature, op)
//!   └─ RequestDeduplicator   (identical concurrent calls share one run)
//!        └─ GracefulDegradationManager   (cache / queue / error fallback)
//!             └─ CircuitBreaker   (fail fast while the service is down)
//!                  └─ op
//! ```

use crate::cache::ResponseCache;
use crate::config::ResilienceConfig;
use crate::coordination::{BatchCoordinator, RequestDeduplicator};
use crate::degradation::{DegradedResponse, GracefulDegradationManager};
use crate::error::{ResilienceError, Result};
use crate::resilience::CircuitBreaker;
use crate::stream::{CredentialProvider, StreamClient, StreamTransport};
use crate::sync::SyncManager;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Breaker component name used in errors and logs
const CONTENT_API: &str = "content_api";

pub struct ResilienceStack {
    config: ResilienceConfig,
    cache: Arc<ResponseCache>,
    breaker: Arc<CircuitBreaker>,
    degradation: Arc<GracefulDegradationManager>,
    deduplicator: Arc<RequestDeduplicator<DegradedResponse<Value>>>,
    batcher: Arc<BatchCoordinator<Value>>,
    stream: StreamClient,
    sync: SyncManager,
}

impl std::fmt::Debug for ResilienceStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceStack")
            .field("breaker", &self.breaker.state())
            .field("status", &self.degradation.status())
            .field("cache_entries", &self.cache.len())
            .field("stream", &self.stream.connection_state())
            .finish()
    }
}

impl ResilienceStack {
    /// Build a stack for an anonymous local user
    pub fn new(
        config: ResilienceConfig,
        base_url: impl Into<String>,
        transport: Arc<dyn StreamTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        let user_id = format!("client-{}", Uuid::new_v4());
        Self::with_user(config, base_url, transport, credentials, user_id)
    }

    /// Build a stack whose presence and collaboration messages carry `user_id`
    pub fn with_user(
        config: ResilienceConfig,
        base_url: impl Into<String>,
        transport: Arc<dyn StreamTransport>,
        credentials: Arc<dyn CredentialProvider>,
        user_id: impl Into<String>,
    ) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(ResponseCache::new());
        let breaker = Arc::new(CircuitBreaker::new(
            CONTENT_API,
            config.circuit_breaker.to_breaker_config(),
        ));
        let degradation = Arc::new(GracefulDegradationManager::new(
            config.degradation.clone(),
            Arc::clone(&breaker),
            Arc::clone(&cache),
        ));
        let deduplicator = Arc::new(RequestDeduplicator::new(config.coordination.dedup_window()));
        let batcher = Arc::new(BatchCoordinator::new(
            config.coordination.batch_window(),
            config.coordination.max_batch_size,
        ));
        let stream = StreamClient::new(config.stream.clone(), base_url, transport, credentials);
        let sync = SyncManager::new(
            config.sync.clone(),
            stream.clone(),
            Arc::clone(&cache),
            user_id,
        );

        info!(
            failure_threshold = config.circuit_breaker.failure_threshold,
            dedup_window_ms = config.coordination.dedup_window_ms,
            conflict_strategy = ?config.sync.conflict_resolution_strategy,
            "Resilience stack initialized"
        );

        Ok(Self {
            config,
            cache,
            breaker,
            degradation,
            deduplicator,
            batcher,
            stream,
            sync,
        })
    }

    /// Run a remote read or write through dedup, degradation and the breaker.
    ///
    /// `key` is both the dedup key and the cache key of the response.
    pub async fn execute<T, F, Fut>(
        &self,
        key: &str,
        feature: &str,
        operation: F,
    ) -> Result<DegradedResponse<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let degradation = Arc::clone(&self.degradation);
        let cache_key = key.to_string();
        let feature = feature.to_string();

        let shared = self
            .deduplicator
            .deduplicate(key, move || async move {
                degradation
                    .execute_with_degradation(
                        move || async move {
                            let value = operation().await?;
                            serde_json::to_value(value).map_err(ResilienceError::from)
                        },
                        &cache_key,
                        &feature,
                    )
                    .await
            })
            .await?;

        decode(shared)
    }

    /// Fetch one item through the batch coordinator
    pub async fn batch<F, Fut>(&self, batch_key: &str, item_id: &str, batch_fn: F) -> Result<Value>
    where
        F: FnOnce(Vec<String>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<HashMap<String, Value>>> + Send + 'static,
    {
        self.batcher.batch(batch_key, item_id, batch_fn).await
    }

    /// Connect the stream and start consuming it
    pub async fn start(&self) -> Result<()> {
        self.sync.start();
        self.sync.connect().await
    }

    pub fn shutdown(&self) {
        self.sync.stop();
        self.stream.disconnect();
        info!("Resilience stack shut down");
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn degradation(&self) -> &Arc<GracefulDegradationManager> {
        &self.degradation
    }

    pub fn deduplicator(&self) -> &Arc<RequestDeduplicator<DegradedResponse<Value>>> {
        &self.deduplicator
    }

    pub fn batcher(&self) -> &Arc<BatchCoordinator<Value>> {
        &self.batcher
    }

    pub fn stream(&self) -> &StreamClient {
        &self.stream
    }

    pub fn sync(&self) -> &SyncManager {
        &self.sync
    }
}

fn decode<T: DeserializeOwned>(response: DegradedResponse<Value>) -> Result<DegradedResponse<T>> {
    let data = response.data.map(serde_json::from_value).transpose()?;
    Ok(DegradedResponse {
        data,
        from_cache: response.from_cache,
        offline: response.offline,
        degraded: response.degraded,
    })
}
