//! Kite Ticker WebSocket session

use crate::error::{FeedError, FeedResult};
use crate::transport::{BrokerMessage, TickerEvent, TickerSession, TickerTransport};
use crate::zerodha::parser::parse_binary_message;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Message, protocol::CloseFrame},
};
use tracing::{debug, error, info, warn};
use url::Url;

/// Kite Ticker connection settings
#[derive(Debug, Clone)]
pub struct KiteTickerConfig {
    /// Ticker endpoint, e.g. `wss://ws.kite.trade`
    pub ws_url: String,
    /// Kite Connect API key
    pub api_key: String,
    /// Session access token
    pub access_token: String,
}

impl KiteTickerConfig {
    /// Endpoint with credentials as query parameters
    pub fn endpoint(&self) -> FeedResult<Url> {
        Ok(Url::parse_with_params(
            &self.ws_url,
            &[
                ("api_key", self.api_key.trim()),
                ("access_token", self.access_token.trim()),
            ],
        )?)
    }
}

/// Subscription message for Kite
#[derive(Debug, Serialize)]
struct KiteSubscribe<'a> {
    a: &'static str,
    v: &'a [u32],
}

/// Mode change message: `{"a": "mode", "v": ["full", [token, ...]]}`
#[derive(Debug, Serialize)]
struct KiteModeChange<'a> {
    a: &'static str,
    v: (&'static str, &'a [u32]),
}

/// Opens Kite Ticker sessions
#[derive(Debug, Clone)]
pub struct KiteTicker {
    config: KiteTickerConfig,
}

impl KiteTicker {
    /// Create a ticker for the given credentials
    pub fn new(config: KiteTickerConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl TickerTransport for KiteTicker {
    async fn connect(&self) -> FeedResult<Box<dyn TickerSession>> {
        let url = self.config.endpoint()?;
        info!(url = %self.config.ws_url, "Connecting to Kite Ticker");

        let (stream, response) = connect_async(url).await.map_err(|e| {
            if let tokio_tungstenite::tungstenite::Error::Http(response) = &e {
                error!("HTTP Status: {}", response.status());
            }
            FeedError::Connect(e.to_string())
        })?;

        info!(status = %response.status(), "Kite Ticker connected");
        Ok(Box::new(KiteSession { stream }))
    }
}

/// One live Kite Ticker connection
pub struct KiteSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl KiteSession {
    async fn send_json<T: Serialize>(&mut self, message: &T) -> FeedResult<()> {
        let text = serde_json::to_string(message)?;
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| FeedError::Send(e.to_string()))
    }
}

#[async_trait::async_trait]
impl TickerSession for KiteSession {
    async fn subscribe_full(&mut self, tokens: &[u32]) -> FeedResult<()> {
        if tokens.is_empty() {
            warn!("No instruments to subscribe");
            return Ok(());
        }

        self.send_json(&KiteSubscribe {
            a: "subscribe",
            v: tokens,
        })
        .await?;
        self.send_json(&KiteModeChange {
            a: "mode",
            v: ("full", tokens),
        })
        .await?;

        info!("Subscribed to {} instruments in full mode", tokens.len());
        Ok(())
    }

    async fn next_event(&mut self) -> FeedResult<TickerEvent> {
        loop {
            let Some(frame) = self.stream.next().await else {
                return Ok(TickerEvent::Closed { reason: None });
            };

            match frame.map_err(|e| FeedError::Receive(e.to_string()))? {
                Message::Binary(data) => {
                    // Kite heartbeats are single-byte binary frames
                    if data.len() <= 1 {
                        return Ok(TickerEvent::Heartbeat);
                    }
                    let batch = parse_binary_message(&data);
                    return Ok(TickerEvent::Ticks {
                        ticks: batch.ticks,
                        malformed: batch.malformed,
                    });
                }
                Message::Text(text) => match serde_json::from_str::<BrokerMessage>(&text) {
                    Ok(message) => return Ok(TickerEvent::Message(message)),
                    Err(e) => debug!("Ignoring unrecognised text frame: {}", e),
                },
                Message::Ping(payload) => {
                    debug!("Received ping, sending pong");
                    self.stream
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| FeedError::Send(e.to_string()))?;
                }
                Message::Close(frame) => {
                    let reason = frame.map(|CloseFrame { code, reason }| format!("{code}: {reason}"));
                    info!(?reason, "Kite Ticker closed by server");
                    return Ok(TickerEvent::Closed { reason });
                }
                Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> FeedResult<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| FeedError::Send(e.to_string()))
    }
}
