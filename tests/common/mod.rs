//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod mock_transport;
pub mod strategies;

use cms_resilience::config::StreamConfig;
use cms_resilience::stream::{StaticCredentials, StreamClient};
use std::sync::Arc;

pub use mock_transport::{MockServer, MockTransport};

pub const BASE_URL: &str = "https://cms.example.com";

/// Fast reconnect settings for paused-time tests
pub fn fast_stream_config() -> StreamConfig {
    StreamConfig {
        reconnect_interval_ms: 100,
        max_reconnect_attempts: 3,
        max_reconnect_delay_ms: 1_000,
        heartbeat_interval_ms: 60_000,
        ..StreamConfig::default()
    }
}

pub fn stream_client(config: StreamConfig, transport: Arc<MockTransport>) -> StreamClient {
    StreamClient::new(
        config,
        BASE_URL,
        transport,
        Arc::new(StaticCredentials::new("secret")),
    )
}

/// Let spawned tasks run to their next await point
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
