//! Circuit breaker lifecycle against simulated time

use cms_resilience::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use cms_resilience::ResilienceError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::advance;

fn breaker() -> Arc<CircuitBreaker> {
    Arc::new(CircuitBreaker::new(
        "content_api",
        CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            timeout: Duration::from_secs(5),
            reset_timeout: Duration::from_millis(1_000),
        },
    ))
}

async fn fail(breaker: &CircuitBreaker) -> ResilienceError {
    breaker
        .call(|| async { Err::<(), _>(ResilienceError::operation("503")) })
        .await
        .map_err(ResilienceError::from)
        .unwrap_err()
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_fails_fast_then_admits_trial_call() {
    let breaker = breaker();
    for _ in 0..3 {
        fail(&breaker).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let invoked = Arc::new(AtomicUsize::new(0));

    advance(Duration::from_millis(500)).await;
    let counter = Arc::clone(&invoked);
    let err = breaker
        .call(|| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ResilienceError>(())
        })
        .await
        .map_err(ResilienceError::from)
        .unwrap_err();
    assert!(err.is_circuit_open());
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    match err {
        ResilienceError::CircuitOpen { retry_after, .. } => {
            assert_eq!(retry_after, Duration::from_millis(500));
        }
        other => panic!("unexpected error {other:?}"),
    }

    advance(Duration::from_millis(600)).await;
    let counter = Arc::clone(&invoked);
    let observed = Arc::new(parking_lot::Mutex::new(None));
    let seen = Arc::clone(&observed);
    let probe = Arc::clone(&breaker);
    breaker
        .call(|| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            *seen.lock() = Some(probe.state());
            Ok::<_, ResilienceError>(())
        })
        .await
        .unwrap();

    assert_eq!(invoked.load(Ordering::SeqCst), 1);
    assert_eq!(*observed.lock(), Some(CircuitState::HalfOpen));
    // One success of the two required
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    breaker.call(|| async { Ok::<_, ResilienceError>(()) }).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_failure_restarts_reset_timer() {
    let breaker = breaker();
    for _ in 0..3 {
        fail(&breaker).await;
    }

    advance(Duration::from_millis(1_100)).await;
    fail(&breaker).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    advance(Duration::from_millis(900)).await;
    assert!(fail(&breaker).await.is_circuit_open());

    advance(Duration::from_millis(200)).await;
    breaker.call(|| async { Ok::<_, ResilienceError>(()) }).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
}

#[tokio::test(start_paused = true)]
async fn test_metrics_track_rejections() {
    let breaker = breaker();
    for _ in 0..3 {
        fail(&breaker).await;
    }
    for _ in 0..4 {
        fail(&breaker).await;
    }

    let metrics = breaker.metrics();
    assert_eq!(metrics.failure_count, 3);
    assert_eq!(metrics.rejected_count, 4);
    assert!(!breaker.is_healthy());
}
