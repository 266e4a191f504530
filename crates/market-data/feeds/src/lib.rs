//! Market data feed plumbing for Zerodha Kite
//!
//! Organized structure:
//! - transport: session traits and the events a live feed produces
//! - error: feed error type
//! - zerodha/: Kite Ticker binary protocol, WebSocket session, instrument master

#![deny(clippy::all)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod transport;
pub mod zerodha;

pub use error::{FeedError, FeedResult};
pub use transport::{BrokerMessage, TickerEvent, TickerSession, TickerTransport};

pub use zerodha::instruments::parse_instruments_csv;
pub use zerodha::parser::{ParsedBatch, parse_binary_message};
pub use zerodha::websocket::{KiteTicker, KiteTickerConfig};
