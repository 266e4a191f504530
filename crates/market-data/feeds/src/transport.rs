//! Ticker transport traits
//!
//! A [`TickerTransport`] opens sessions; a [`TickerSession`] is one live
//! connection that can be told what to stream and yields [`TickerEvent`]s
//! until it closes. The ingestor only ever talks to these traits, which lets
//! tests drive it with a scripted in-memory transport.

use crate::error::FeedResult;
use common::Tick;
use serde::Deserialize;

/// Control or postback message sent by the broker as a text frame
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BrokerMessage {
    /// Message type: `error`, `message`, `order`, ...
    #[serde(rename = "type")]
    pub kind: String,
    /// Message payload
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Something that happened on a live session
#[derive(Debug, Clone, PartialEq)]
pub enum TickerEvent {
    /// A batch of decoded ticks
    Ticks {
        /// Decoded ticks in delivery order
        ticks: Vec<Tick>,
        /// Packets in the batch that could not be decoded
        malformed: usize,
    },
    /// Keep-alive frame
    Heartbeat,
    /// Broker text message
    Message(BrokerMessage),
    /// The upstream closed the session
    Closed {
        /// Close reason, when the server gave one
        reason: Option<String>,
    },
}

/// Opens ticker sessions
#[async_trait::async_trait]
pub trait TickerTransport: Send + Sync {
    /// Establish a new session
    async fn connect(&self) -> FeedResult<Box<dyn TickerSession>>;
}

/// One live ticker connection
#[async_trait::async_trait]
pub trait TickerSession: Send {
    /// Subscribe to `tokens` and request full mode for all of them
    async fn subscribe_full(&mut self, tokens: &[u32]) -> FeedResult<()>;

    /// Wait for the next event. After `Closed` or an error the session is dead.
    async fn next_event(&mut self) -> FeedResult<TickerEvent>;

    /// Close the connection
    async fn close(&mut self) -> FeedResult<()>;
}
