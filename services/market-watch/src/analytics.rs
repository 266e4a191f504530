//! Derived market watch metrics
//!
//! Every metric is floored to a fixed number of decimals. A metric that
//! cannot be computed (inactive instrument, missing input, zero
//! denominator, empty window) is `None` and serializes as `null`.

use crate::cache::{RollingWindow, TickCacheEntry};
use common::constants::analytics::{LAKH, PERCENT, PERCENT_DIVISOR, RATIO_SCALE};
use serde::{Deserialize, Serialize};

/// Metrics computed on read for one instrument
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsResult {
    /// Day range as a percentage of the open
    pub fluctuation: Option<f64>,
    /// Position of the last price inside the day range, 0 to 100
    pub price_zone: Option<f64>,
    /// Percent change against the previous close
    pub change: Option<f64>,
    /// Traded value in lakhs
    pub volume: Option<f64>,
    /// Range of the 3 minute window as a percentage of the last price
    pub spike3min: Option<f64>,
    /// Range of the 10 minute window as a percentage of the last price
    pub spike10min: Option<f64>,
}

/// Compute every metric for `entry`.
///
/// The day metrics need a tradable instrument that has traded today; the
/// spikes are computed for everything with a non-zero price.
pub fn compute(entry: &TickCacheEntry) -> AnalyticsResult {
    let quote = &entry.quote;
    let last = quote.last_price;
    let active = quote.tradable && quote.volume.is_some_and(|v| v > 0);

    let mut result = AnalyticsResult {
        spike3min: spike(&entry.window_3min, last),
        spike10min: spike(&entry.window_10min, last),
        ..AnalyticsResult::default()
    };
    if !active {
        return result;
    }

    if let Some(ohlc) = quote.ohlc {
        result.fluctuation = ratio(ohlc.high - ohlc.low, ohlc.open)
            .and_then(|r| finite((r * RATIO_SCALE).floor() / PERCENT_DIVISOR));
        result.price_zone =
            ratio(last - ohlc.low, ohlc.high - ohlc.low).and_then(|r| finite((r * PERCENT).floor()));
    }
    result.change = quote
        .change
        .and_then(|c| finite((c * PERCENT_DIVISOR).floor() / PERCENT_DIVISOR));
    // u64 -> f64 loses precision only beyond 2^53 shares
    result.volume = quote
        .volume
        .and_then(|v| finite((v as f64 * last / LAKH).floor()));

    result
}

/// `floor(((max - min) / last) * 10000) / 100` over the written slots
pub fn spike(window: &RollingWindow, last: f64) -> Option<f64> {
    let (max, min) = (window.max()?, window.min()?);
    ratio(max - min, last).and_then(|r| finite((r * RATIO_SCALE).floor() / PERCENT_DIVISOR))
}

fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        return None;
    }
    finite(numerator / denominator)
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
