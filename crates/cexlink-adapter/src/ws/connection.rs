/*
[INPUT]:  ConnectionContext (URL + headers) from a ConnectionStrategy
[OUTPUT]: An open WebSocket exposing text sends, pings and inbound frames
[POS]:    WebSocket layer - socket seam between ConnectionManager and tungstenite
[UPDATE]: When changing socket options or frame handling
*/

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use super::strategy::ConnectionContext;
use crate::http::{ExchangeError, Result};
use crate::types::InboundFrame;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One open socket. Owned exclusively by the manager's worker task.
#[async_trait]
pub trait WsConnection: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Protocol-level ping frame.
    async fn send_ping(&mut self) -> Result<()>;

    /// Next data frame; `None` once the peer closed the socket.
    /// Must be cancel-safe: the manager polls it inside `select!`.
    async fn next_frame(&mut self) -> Option<Result<InboundFrame>>;

    async fn close(&mut self);
}

/// Opens sockets. Swappable so the manager can run against scripted peers.
#[async_trait]
pub trait WsConnector: Send + Sync + Debug {
    async fn connect(&self, ctx: &ConnectionContext) -> Result<Box<dyn WsConnection>>;
}

#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    connect_timeout: Duration,
}

impl TungsteniteConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl WsConnector for TungsteniteConnector {
    async fn connect(&self, ctx: &ConnectionContext) -> Result<Box<dyn WsConnection>> {
        let mut request = ctx
            .url
            .as_str()
            .into_client_request()
            .map_err(|err| ExchangeError::Config(format!("invalid ws url {}: {err}", ctx.url)))?;

        for (key, value) in &ctx.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|err| ExchangeError::Config(format!("invalid header {key}: {err}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| ExchangeError::Config(format!("invalid header value for {key}: {err}")))?;
            request.headers_mut().insert(name, value);
        }

        debug!(url = %ctx.url, "connecting websocket");
        let (stream, _response) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| ExchangeError::Timeout(self.connect_timeout))?
            .map_err(|err| ExchangeError::transport(format!("ws connect failed: {err}")))?;
        info!(url = %ctx.url, "websocket connected");

        Ok(Box::new(TungsteniteConnection { stream }))
    }
}

struct TungsteniteConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl WsConnection for TungsteniteConnection {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|err| ExchangeError::transport(format!("ws send failed: {err}")))
    }

    async fn send_ping(&mut self) -> Result<()> {
        self.stream
            .send(WsMessage::Ping(Vec::<u8>::new().into()))
            .await
            .map_err(|err| ExchangeError::transport(format!("ws ping failed: {err}")))
    }

    async fn next_frame(&mut self) -> Option<Result<InboundFrame>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(err) => {
                    return Some(Err(ExchangeError::transport(format!(
                        "ws receive failed: {err}"
                    ))))
                }
            };

            match message {
                WsMessage::Text(text) => return Some(Ok(InboundFrame::Text(text.to_string()))),
                WsMessage::Binary(bytes) => return Some(Ok(InboundFrame::Binary(bytes.to_vec()))),
                WsMessage::Pong(_) => return Some(Ok(InboundFrame::Pong)),
                WsMessage::Ping(payload) => {
                    if let Err(err) = self.stream.send(WsMessage::Pong(payload)).await {
                        return Some(Err(ExchangeError::transport(format!(
                            "ws pong failed: {err}"
                        ))));
                    }
                }
                WsMessage::Close(frame) => {
                    debug!(?frame, "websocket closed by peer");
                    return None;
                }
                WsMessage::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) {
        if let Err(err) = self.stream.close(None).await {
            debug!(error = %err, "websocket close handshake failed");
        }
    }
}
