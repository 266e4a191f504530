//! Broker ticks
//!
//! A `Tick` carries whatever the feed sent for one instrument. Optional
//! fields that are `None` were not carried by that packet (an LTP-mode tick
//! has no OHLC, a quote-mode tick has no depth). The same type doubles as the
//! merged quote held by the cache, see [`Tick::merge_from`].

use serde::{Deserialize, Serialize};

/// Streaming mode a tick was produced in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickMode {
    /// Last traded price only
    Ltp,
    /// Price, volume and OHLC
    Quote,
    /// Quote plus OI, timestamps and market depth
    Full,
}

/// Session open/high/low/close
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ohlc {
    /// Session open
    pub open: f64,
    /// Session high
    pub high: f64,
    /// Session low
    pub low: f64,
    /// Previous close
    pub close: f64,
}

/// Individual price level in the order book depth
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    /// Price level
    pub price: f64,
    /// Total quantity at this level
    pub quantity: u32,
    /// Number of orders at this level
    pub orders: u16,
}

/// Market depth with buy and sell levels, best first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Depth {
    /// Bid levels in descending price order
    pub buy: Vec<DepthLevel>,
    /// Ask levels in ascending price order
    pub sell: Vec<DepthLevel>,
}

/// Market update for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Broker instrument token
    pub instrument_token: u32,
    /// False for indices
    pub tradable: bool,
    /// Mode the packet was sent in
    pub mode: TickMode,
    /// Last traded price
    pub last_price: f64,
    /// Quantity of the last trade
    pub last_quantity: Option<u32>,
    /// Volume-weighted average price for the day
    pub average_price: Option<f64>,
    /// Day volume
    pub volume: Option<u64>,
    /// Total pending buy quantity
    pub buy_quantity: Option<u64>,
    /// Total pending sell quantity
    pub sell_quantity: Option<u64>,
    /// Session OHLC
    pub ohlc: Option<Ohlc>,
    /// Percent change against previous close
    pub change: Option<f64>,
    /// Last trade time, unix seconds
    pub last_trade_time: Option<i64>,
    /// Open interest
    pub oi: Option<u32>,
    /// Day high of open interest
    pub oi_day_high: Option<u32>,
    /// Day low of open interest
    pub oi_day_low: Option<u32>,
    /// Exchange timestamp, unix seconds
    pub exchange_timestamp: Option<i64>,
    /// Five-level market depth
    pub depth: Option<Depth>,
}

fn overwrite<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
    if let Some(value) = src {
        *dst = Some(value.clone());
    }
}

impl Tick {
    /// LTP-mode tick carrying only the last price
    #[must_use]
    pub fn ltp(instrument_token: u32, last_price: f64) -> Self {
        Self {
            instrument_token,
            tradable: true,
            mode: TickMode::Ltp,
            last_price,
            last_quantity: None,
            average_price: None,
            volume: None,
            buy_quantity: None,
            sell_quantity: None,
            ohlc: None,
            change: None,
            last_trade_time: None,
            oi: None,
            oi_day_high: None,
            oi_day_low: None,
            exchange_timestamp: None,
            depth: None,
        }
    }

    /// Attach session OHLC and switch to quote mode
    #[must_use]
    pub fn with_ohlc(mut self, ohlc: Ohlc) -> Self {
        self.ohlc = Some(ohlc);
        if self.mode == TickMode::Ltp {
            self.mode = TickMode::Quote;
        }
        self
    }

    /// Attach day volume
    #[must_use]
    pub fn with_volume(mut self, volume: u64) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Attach percent change
    #[must_use]
    pub fn with_change(mut self, change: f64) -> Self {
        self.change = Some(change);
        self
    }

    /// Attach market depth and switch to full mode
    #[must_use]
    pub fn with_depth(mut self, depth: Depth) -> Self {
        self.depth = Some(depth);
        self.mode = TickMode::Full;
        self
    }

    /// Mark as non-tradable (index)
    #[must_use]
    pub fn non_tradable(mut self) -> Self {
        self.tradable = false;
        self
    }

    /// Overwrite every field carried by `newer` onto `self`.
    ///
    /// Always-present fields are replaced unconditionally; optional fields
    /// only when `newer` carries them, so a quote-mode tick never erases
    /// depth learned from an earlier full-mode tick.
    pub fn merge_from(&mut self, newer: &Self) {
        self.tradable = newer.tradable;
        self.mode = newer.mode;
        self.last_price = newer.last_price;
        overwrite(&mut self.last_quantity, &newer.last_quantity);
        overwrite(&mut self.average_price, &newer.average_price);
        overwrite(&mut self.volume, &newer.volume);
        overwrite(&mut self.buy_quantity, &newer.buy_quantity);
        overwrite(&mut self.sell_quantity, &newer.sell_quantity);
        overwrite(&mut self.ohlc, &newer.ohlc);
        overwrite(&mut self.change, &newer.change);
        overwrite(&mut self.last_trade_time, &newer.last_trade_time);
        overwrite(&mut self.oi, &newer.oi);
        overwrite(&mut self.oi_day_high, &newer.oi_day_high);
        overwrite(&mut self.oi_day_low, &newer.oi_day_low);
        overwrite(&mut self.exchange_timestamp, &newer.exchange_timestamp);
        overwrite(&mut self.depth, &newer.depth);
    }
}
