//! Common types shared by the market-watch crates
//!
//! - `types`: timestamps
//! - `instrument`: instrument master records
//! - `tick`: broker ticks and their field-wise merge
//! - `errors`: the error taxonomy surfaced to collaborators

#![warn(clippy::all)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod instrument;
pub mod tick;
pub mod types;

pub use errors::{MarketWatchError, Result};
pub use instrument::{Instrument, InstrumentType};
pub use tick::{Depth, DepthLevel, Ohlc, Tick, TickMode};
pub use types::*;
