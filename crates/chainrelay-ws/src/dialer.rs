//! Opening the upstream connection.
//!
//! The connector only sees a write half ([`UpstreamSink`]) and a read half
//! ([`UpstreamSource`]) produced by an [`UpstreamDialer`]; [`WsDialer`] is the
//! tokio-tungstenite implementation.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use chainrelay_core::error::TransportError;

/// Write half of an upstream connection.
#[async_trait]
pub trait UpstreamSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;
}

/// Read half of an upstream connection. Returns an error once the connection
/// is unusable; the caller stops reading after the first error.
#[async_trait]
pub trait UpstreamSource: Send {
    async fn next_text(&mut self) -> Result<String, TransportError>;
}

pub type UpstreamConnection = (Box<dyn UpstreamSink>, Box<dyn UpstreamSource>);

#[async_trait]
pub trait UpstreamDialer: Send + Sync + 'static {
    async fn dial(&self) -> Result<UpstreamConnection, TransportError>;

    /// Endpoint for logs, without credentials.
    fn endpoint(&self) -> &str;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials `<base_url>/<api_key>` over WebSocket.
pub struct WsDialer {
    base_url: String,
    url: String,
}

impl WsDialer {
    pub fn new(base_url: impl Into<String>, api_key: &str) -> Self {
        let base_url = base_url.into();
        let url = if api_key.is_empty() {
            base_url.clone()
        } else {
            format!("{}/{}", base_url.trim_end_matches('/'), api_key)
        };
        Self { base_url, url }
    }
}

#[async_trait]
impl UpstreamDialer for WsDialer {
    async fn dial(&self) -> Result<UpstreamConnection, TransportError> {
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        let (write, read) = ws_stream.split();
        Ok((Box::new(WsSink(write)), Box::new(WsSource(read))))
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}

struct WsSink(SplitSink<WsStream, Message>);

#[async_trait]
impl UpstreamSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.0
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))
    }
}

struct WsSource(SplitStream<WsStream>);

#[async_trait]
impl UpstreamSource for WsSource {
    async fn next_text(&mut self) -> Result<String, TransportError> {
        loop {
            match self.0.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(Message::Binary(bytes))) => {
                    return String::from_utf8(bytes.to_vec())
                        .map_err(|e| TransportError::WebSocket(format!("non-UTF-8 frame: {e}")));
                }
                Some(Ok(Message::Close(frame))) => {
                    return Err(TransportError::WebSocket(format!(
                        "closed by upstream: {frame:?}"
                    )));
                }
                // Pings are answered by tungstenite itself.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::WebSocket(e.to_string())),
                None => return Err(TransportError::WebSocket("stream ended".into())),
            }
        }
    }
}
