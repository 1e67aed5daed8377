//! In-memory stream transport.
//!
//! Each `open` creates a [`MockServer`] holding the far ends of the
//! connection's channels, so a test can read what the client sent and push
//! frames or closes back.

use async_trait::async_trait;
use cms_resilience::stream::{StreamTransport, TransportChannels, TransportEvent};
use cms_resilience::{ResilienceError, Result};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

#[derive(Default)]
pub struct MockTransport {
    /// Number of upcoming opens that fail
    pub fail_opens: Mutex<u32>,
    pub urls: Mutex<Vec<Url>>,
    servers: Mutex<Vec<MockServer>>,
}

pub struct MockServer {
    received: mpsc::UnboundedReceiver<String>,
    push: mpsc::UnboundedSender<TransportEvent>,
}

impl MockServer {
    /// Frames sent by the client so far, decoded
    pub fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(text) = self.received.try_recv() {
            frames.push(serde_json::from_str(&text).unwrap());
        }
        frames
    }

    pub fn push_frame(&self, frame: Value) {
        self.push.send(TransportEvent::Text(frame.to_string())).unwrap();
    }

    /// Push a frame verbatim, valid JSON or not
    pub fn push_raw(&self, text: &str) {
        self.push.send(TransportEvent::Text(text.to_string())).unwrap();
    }

    /// Close the connection with `code`
    pub fn close(&self, code: u16, reason: &str) {
        self.push
            .send(TransportEvent::Closed {
                code: Some(code),
                reason: reason.to_string(),
            })
            .unwrap();
    }
}

impl MockTransport {
    pub fn failing(opens: u32) -> Self {
        Self {
            fail_opens: Mutex::new(opens),
            ..Self::default()
        }
    }

    pub fn open_count(&self) -> usize {
        self.urls.lock().len()
    }

    /// Take the server side of the `index`-th still-unclaimed connection
    pub fn take_server(&self, index: usize) -> MockServer {
        let mut servers = self.servers.lock();
        assert!(servers.len() > index, "connection {index} was never opened");
        servers.remove(index)
    }
}

#[async_trait]
impl StreamTransport for MockTransport {
    async fn open(&self, url: &Url) -> Result<TransportChannels> {
        self.urls.lock().push(url.clone());
        {
            let mut fail = self.fail_opens.lock();
            if *fail > 0 {
                *fail -= 1;
                return Err(ResilienceError::Connection("connection refused".to_string()));
            }
        }
        let (outbound, received) = mpsc::unbounded_channel();
        let (push, inbound) = mpsc::unbounded_channel();
        self.servers.lock().push(MockServer { received, push });
        Ok(TransportChannels { outbound, inbound })
    }
}
