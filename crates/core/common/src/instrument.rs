//! Instrument master records
//!
//! Instruments are loaded in bulk from the broker's instrument dump and
//! replaced wholesale on refresh. Two identifiers matter downstream:
//! `instrument_token` keys the tick cache, `exchange_token` deduplicates
//! instruments across group and channel lists.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Instrument type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentType {
    /// Equity/Stock instrument
    Equity,
    /// Index instrument
    Index,
    /// Future contract
    Future,
    /// Option contract
    Option,
    /// Currency pair
    Currency,
    /// Commodity instrument
    Commodity,
}

impl InstrumentType {
    /// Classify from the broker's `instrument_type` and `segment` columns
    #[must_use]
    pub fn from_kite(instrument_type: &str, segment: &str) -> Self {
        if segment == "INDICES" {
            return Self::Index;
        }
        match instrument_type {
            "FUT" => Self::Future,
            "CE" | "PE" => Self::Option,
            _ if segment.starts_with("CDS") || segment.starts_with("BCD") => Self::Currency,
            _ if segment.starts_with("MCX") => Self::Commodity,
            _ => Self::Equity,
        }
    }
}

/// Tradable security as published by the instrument master
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    /// Broker-assigned identifier, primary key for cache lookups
    pub instrument_token: u32,

    /// Exchange-assigned identifier, used for cross-list deduplication
    pub exchange_token: u32,

    /// Trading symbol (e.g., "NIFTY24DEC24000CE")
    pub trading_symbol: String,

    /// Display name
    pub name: String,

    /// Exchange (e.g., "NSE", "NFO")
    pub exchange: String,

    /// Exchange segment (e.g., "NSE", "NFO-OPT", "INDICES")
    pub segment: String,

    /// Instrument type
    pub instrument_type: InstrumentType,

    /// Lot size (minimum quantity)
    pub lot_size: u32,

    /// Tick size
    pub tick_size: f64,

    /// Expiry date for derivatives
    pub expiry: Option<NaiveDate>,

    /// Strike price for options
    pub strike: Option<f64>,
}

impl Instrument {
    /// Create a cash-segment equity instrument with default attributes
    pub fn new(
        instrument_token: u32,
        exchange_token: u32,
        trading_symbol: impl Into<String>,
        exchange: impl Into<String>,
    ) -> Self {
        let exchange = exchange.into();
        Self {
            instrument_token,
            exchange_token,
            trading_symbol: trading_symbol.into(),
            name: String::new(),
            segment: exchange.clone(),
            exchange,
            instrument_type: InstrumentType::Equity,
            lot_size: 1,
            tick_size: 0.05,
            expiry: None,
            strike: None,
        }
    }

    /// Whether the contract has expired as of `today`
    #[must_use]
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry.is_some_and(|expiry| expiry < today)
    }

    /// Indices stream prices but cannot be traded
    #[must_use]
    pub fn is_tradable(&self) -> bool {
        self.instrument_type != InstrumentType::Index
    }
}
