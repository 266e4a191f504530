//! Zerodha Kite Ticker
//!
//! - `parser`: binary tick packets
//! - `websocket`: live session over tokio-tungstenite
//! - `instruments`: instrument master CSV

pub mod instruments;
pub mod parser;
pub mod websocket;
