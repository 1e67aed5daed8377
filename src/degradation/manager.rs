//! Degradation-aware execution and health tracking.

use super::health::{classify, HealthWindow, ServiceHealth, ServiceStatus};
use super::{DegradedResponse, FallbackStrategy, QueuedOperation};
use crate::cache::ResponseCache;
use crate::config::DegradationConfig;
use crate::error::{ResilienceError, Result};
use crate::resilience::CircuitBreaker;
use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Called with the previous status and the new health after every status change
pub type HealthListener = Arc<dyn Fn(ServiceStatus, &ServiceHealth) -> Result<()> + Send + Sync>;

/// Handle returned by [`GracefulDegradationManager::on_health_change`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug)]
struct HealthState {
    window: HealthWindow,
    current: ServiceHealth,
}

pub struct GracefulDegradationManager {
    config: DegradationConfig,
    breaker: Arc<CircuitBreaker>,
    cache: Arc<ResponseCache>,
    health: Mutex<HealthState>,
    listeners: Mutex<Vec<(ListenerId, HealthListener)>>,
    next_listener_id: AtomicU64,
    offline_queue: Mutex<VecDeque<QueuedOperation>>,
}

impl std::fmt::Debug for GracefulDegradationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GracefulDegradationManager")
            .field("breaker", &self.breaker.name())
            .field("status", &self.health.lock().current.status)
            .field("listeners", &self.listeners.lock().len())
            .field("offline_queue", &self.offline_queue.lock().len())
            .finish()
    }
}

impl GracefulDegradationManager {
    pub fn new(
        config: DegradationConfig,
        breaker: Arc<CircuitBreaker>,
        cache: Arc<ResponseCache>,
    ) -> Self {
        let window = HealthWindow::new(config.health_window());
        Self {
            config,
            breaker,
            cache,
            health: Mutex::new(HealthState {
                window,
                current: ServiceHealth::online(),
            }),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            offline_queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Run `operation` through the breaker and apply the feature's fallback on failure
    pub async fn execute_with_degradation<T, F, Fut>(
        &self,
        operation: F,
        cache_key: &str,
        feature: &str,
    ) -> Result<DegradedResponse<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let outcome = self
            .breaker
            .call(operation)
            .await
            .map_err(ResilienceError::from);

        match outcome {
            Ok(value) => {
                match serde_json::to_value(&value) {
                    Ok(snapshot) => {
                        self.cache
                            .set(cache_key, snapshot, self.config.cache_retention_time());
                    }
                    Err(e) => {
                        warn!(cache_key, error = %e, "Response not cacheable, skipping cache write");
                    }
                }
                self.record_outcome(true);
                Ok(DegradedResponse::fresh(value))
            }
            Err(failure) => {
                self.record_outcome(false);
                self.fall_back(failure, cache_key, feature)
            }
        }
    }

    fn fall_back<T: DeserializeOwned>(
        &self,
        failure: ResilienceError,
        cache_key: &str,
        feature: &str,
    ) -> Result<DegradedResponse<T>> {
        match self.config.strategy_for(feature) {
            FallbackStrategy::Cache => {
                let retention = self.config.cache_retention_time();
                let Some(entry) = self
                    .cache
                    .peek(cache_key)
                    .filter(|entry| entry.age() < retention)
                else {
                    debug!(cache_key, feature, "No usable cache entry for fallback");
                    return Err(failure);
                };

                match serde_json::from_value(entry.data) {
                    Ok(data) => {
                        info!(
                            cache_key,
                            feature,
                            age_ms = entry.stored_at.elapsed().as_millis() as u64,
                            error = %failure,
                            "Serving cached response in degraded mode"
                        );
                        Ok(DegradedResponse::cached(data))
                    }
                    Err(e) => {
                        warn!(cache_key, error = %e, "Cached response has unexpected shape");
                        Err(failure)
                    }
                }
            }
            FallbackStrategy::Queue => {
                let queued = QueuedOperation {
                    id: Uuid::new_v4(),
                    feature: feature.to_string(),
                    cache_key: cache_key.to_string(),
                    reason: failure.to_string(),
                    queued_at: Utc::now(),
                };
                let mut queue = self.offline_queue.lock();
                if queue.len() >= self.config.max_offline_queue {
                    if let Some(dropped) = queue.pop_front() {
                        warn!(
                            dropped_id = %dropped.id,
                            feature = %dropped.feature,
                            "Offline queue full, dropping oldest operation"
                        );
                    }
                }
                info!(
                    operation_id = %queued.id,
                    feature,
                    cache_key,
                    queued = queue.len() + 1,
                    "Operation queued for offline replay"
                );
                queue.push_back(queued);
                Ok(DegradedResponse::queued())
            }
            FallbackStrategy::Error => Err(failure),
        }
    }

    fn record_outcome(&self, success: bool) {
        let change = {
            let mut health = self.health.lock();
            health.window.record(success);

            let error_rate = health.window.error_rate();
            let previous = health.current.status;
            health.current = ServiceHealth {
                status: classify(
                    error_rate,
                    self.config.degradation_threshold,
                    self.config.offline_threshold,
                ),
                error_rate,
                consecutive_failures: health.window.consecutive_failures(),
                last_checked: Utc::now(),
            };

            (previous != health.current.status).then(|| (previous, health.current.clone()))
        };

        if let Some((previous, current)) = change {
            self.notify(previous, &current);
        }
    }

    /// Listeners run in registration order; failures are logged and swallowed
    fn notify(&self, previous: ServiceStatus, current: &ServiceHealth) {
        info!(
            from = %previous,
            to = %current.status,
            error_rate = current.error_rate,
            consecutive_failures = current.consecutive_failures,
            "Service health changed"
        );

        let listeners: Vec<(ListenerId, HealthListener)> = self.listeners.lock().clone();
        for (id, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(previous, current))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(listener = id.0, error = %e, "Health listener returned an error");
                }
                Err(_) => {
                    error!(listener = id.0, "Health listener panicked");
                }
            }
        }
    }

    /// Register a listener for status changes
    pub fn on_health_change<L>(&self, listener: L) -> ListenerId
    where
        L: Fn(ServiceStatus, &ServiceHealth) -> Result<()> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        let listener: HealthListener = Arc::new(listener);
        self.listeners.lock().push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Whether the feature's fallback can operate under the current status
    pub fn is_feature_available(&self, feature: &str) -> bool {
        let strategy = self.config.strategy_for(feature);
        match self.health.lock().current.status {
            ServiceStatus::Online => true,
            ServiceStatus::Degraded => strategy != FallbackStrategy::Error,
            ServiceStatus::Offline => {
                matches!(strategy, FallbackStrategy::Cache | FallbackStrategy::Queue)
            }
        }
    }

    pub fn health(&self) -> ServiceHealth {
        self.health.lock().current.clone()
    }

    pub fn status(&self) -> ServiceStatus {
        self.health.lock().current.status
    }

    pub fn offline_queue_len(&self) -> usize {
        self.offline_queue.lock().len()
    }

    /// Drain the offline queue in arrival order. Re-issuing the writes is up to the caller.
    pub fn replay_offline_queue(&self) -> Vec<QueuedOperation> {
        let drained: Vec<QueuedOperation> = self.offline_queue.lock().drain(..).collect();
        if !drained.is_empty() {
            info!(count = drained.len(), "Offline queue drained for replay");
        }
        drained
    }

    /// Forget all observed outcomes, close the breaker and return to online
    pub fn reset(&self) {
        self.breaker.reset();
        let change = {
            let mut health = self.health.lock();
            health.window.clear();
            let previous = health.current.status;
            health.current = ServiceHealth::online();
            (previous != ServiceStatus::Online).then(|| (previous, health.current.clone()))
        };
        if let Some((previous, current)) = change {
            self.notify(previous, &current);
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn config(&self) -> &DegradationConfig {
        &self.config
    }
}
