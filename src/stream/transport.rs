//! Transport and credential seams.
//!
//! A transport hands back a pair of channels: text frames go out through
//! `outbound`, everything the connection observes comes back on `inbound`.
//! Dropping the outbound sender closes the connection normally.

use crate::constants::stream::{NORMAL_CLOSE_CODE, TOKEN_QUERY_PARAM};
use crate::error::{ResilienceError, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

/// Source of the access token attached on connect
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// A currently valid token, or `None` when the user is signed out
    async fn access_token(&self) -> Option<String>;
}

/// Fixed token, mostly for tests and service accounts
#[derive(Debug, Clone)]
pub struct StaticCredentials(Option<String>);

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn access_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// What a live connection reports back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Text(String),
    Closed { code: Option<u16>, reason: String },
    Error(String),
}

impl TransportEvent {
    /// Normal close frame, as sent by a peer ending the session on purpose
    pub fn normal_close(reason: impl Into<String>) -> Self {
        Self::Closed {
            code: Some(NORMAL_CLOSE_CODE),
            reason: reason.into(),
        }
    }
}

/// Client side of an open connection
#[derive(Debug)]
pub struct TransportChannels {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens bidirectional text connections
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn open(&self, url: &Url) -> Result<TransportChannels>;
}

/// Stream endpoint for an API origin: scheme upgraded, path appended, token attached
pub fn stream_url(base_url: &str, path: &str, token: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ResilienceError::Configuration(format!(
                "unsupported stream scheme '{other}'"
            )))
        }
    };
    url.set_scheme(scheme).map_err(|_| {
        ResilienceError::Configuration(format!("cannot upgrade '{base_url}' to {scheme}"))
    })?;

    let joined = format!("{}{}", url.path().trim_end_matches('/'), path);
    url.set_path(&joined);
    url.query_pairs_mut().append_pair(TOKEN_QUERY_PARAM, token);

    Ok(url)
}

/// WebSocket transport on `tokio-tungstenite`
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StreamTransport for WebSocketTransport {
    async fn open(&self, url: &Url) -> Result<TransportChannels> {
        let (ws_stream, response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ResilienceError::Connection(format!("WebSocket connect failed: {e}")))?;
        debug!(status = %response.status(), host = ?url.host_str(), "WebSocket connected");

        let (mut sink, mut source) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!(error = %e, "WebSocket send failed");
                    return;
                }
            }
            let close = Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "client disconnect".into(),
            }));
            if let Err(e) = sink.send(close).await {
                debug!(error = %e, "WebSocket close frame not delivered");
            }
        });

        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let event = match frame {
                    Ok(Message::Text(text)) => TransportEvent::Text(text),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => TransportEvent::Text(text),
                        Err(e) => TransportEvent::Error(format!("non-UTF-8 binary frame: {e}")),
                    },
                    Ok(Message::Close(frame)) => {
                        let (code, reason) = frame
                            .map(|f| (Some(u16::from(f.code)), f.reason.into_owned()))
                            .unwrap_or((None, String::new()));
                        let _ = inbound_tx.send(TransportEvent::Closed { code, reason });
                        return;
                    }
                    Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                    Err(e) => {
                        let _ = inbound_tx.send(TransportEvent::Error(e.to_string()));
                        return;
                    }
                };
                if inbound_tx.send(event).is_err() {
                    return;
                }
            }
            let _ = inbound_tx.send(TransportEvent::Closed {
                code: None,
                reason: "stream ended".to_string(),
            });
        });

        Ok(TransportChannels {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
