//! Dialing seam between the channel state machine and the wire.

use std::time::Duration;

use {
    async_trait::async_trait,
    futures::{SinkExt, StreamExt},
    tokio::net::TcpStream,
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message},
    tracing::{debug, trace},
    url::Url,
};

use crate::error::ChannelError;

/// Default time allowed for the WebSocket handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// One established connection carrying text frames.
#[async_trait]
pub trait Connection: Send {
    /// Write one text frame.
    async fn send(&mut self, frame: String) -> Result<(), ChannelError>;

    /// Next inbound text frame, or `None` once the peer has closed.
    ///
    /// Must be cancel-safe: the channel polls it inside `select!`.
    async fn recv(&mut self) -> Option<Result<String, ChannelError>>;

    /// Close the connection from our side.
    async fn close(&mut self) -> Result<(), ChannelError>;
}

/// Opens connections to an endpoint URL.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, ChannelError>;
}

/// Connector for `ws://` and `wss://` endpoints.
#[derive(Debug, Clone)]
pub struct WsConnector {
    handshake_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl WsConnector {
    pub fn new() -> Self {
        Self {
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, ChannelError> {
        let parsed = Url::parse(url).map_err(|e| ChannelError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ChannelError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let (stream, response) = tokio::time::timeout(self.handshake_timeout, connect_async(url))
            .await
            .map_err(|_| ChannelError::Timeout {
                url: url.to_string(),
            })?
            .map_err(|e| ChannelError::connect(url, e))?;

        debug!(url = %url, status = %response.status(), "websocket handshake complete");
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&mut self, frame: String) -> Result<(), ChannelError> {
        self.stream
            .send(Message::text(frame))
            .await
            .map_err(ChannelError::transport)
    }

    async fn recv(&mut self) -> Option<Result<String, ChannelError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                // Treated as text; anything that is not JSON is dropped upstream.
                Ok(Message::Binary(bytes)) => {
                    return Some(Ok(String::from_utf8_lossy(&bytes).into_owned()));
                },
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "peer sent close frame");
                    return None;
                },
                Ok(other) => {
                    trace!(?other, "ignoring control frame");
                },
                Err(e) => return Some(Err(ChannelError::transport(e))),
            }
        }
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        self.stream.close(None).await.map_err(ChannelError::transport)
    }
}
