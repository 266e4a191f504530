//! Kite Ticker binary packet parser
//!
//! A binary message is a big-endian `u16` packet count followed, per packet,
//! by a `u16` length and the packet body. The body layout is determined by
//! its length:
//!
//! | Length | Mode                          |
//! |--------|-------------------------------|
//! | 8      | LTP                           |
//! | 28     | index quote                   |
//! | 32     | index full                    |
//! | 44     | quote                         |
//! | 184    | full (quote + OI + depth)     |
//!
//! Prices travel as integers in paise (1/10,000,000 rupee for currency
//! derivatives, 1/10,000 for BSE currency).

use common::{Depth, DepthLevel, Ohlc, Tick, TickMode};
use tracing::debug;

const LTP_PACKET_LEN: usize = 8;
const INDEX_QUOTE_PACKET_LEN: usize = 28;
const INDEX_FULL_PACKET_LEN: usize = 32;
const QUOTE_PACKET_LEN: usize = 44;
const FULL_PACKET_LEN: usize = 184;

const DEPTH_OFFSET: usize = 64;
const DEPTH_LEVEL_LEN: usize = 12;
const DEPTH_LEVELS_PER_SIDE: usize = 5;

const SEGMENT_CDS: u32 = 3;
const SEGMENT_BCD: u32 = 6;
const SEGMENT_INDICES: u32 = 9;

/// Ticks decoded from one binary message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedBatch {
    /// Ticks in packet order
    pub ticks: Vec<Tick>,
    /// Packets that were truncated or of unknown length
    pub malformed: usize,
}

/// Decode a binary ticker message.
///
/// Bad packets are counted and skipped; they never discard the good packets
/// around them. A packet whose declared length runs past the end of the
/// message ends parsing, since nothing after it can be located.
#[must_use]
pub fn parse_binary_message(data: &[u8]) -> ParsedBatch {
    let mut batch = ParsedBatch::default();

    let Some(count) = read_u16(data, 0) else {
        return batch;
    };
    let count = usize::from(count);
    batch.ticks.reserve(count);

    let mut offset = 2;
    for parsed in 0..count {
        let Some(packet_len) = read_u16(data, offset) else {
            batch.malformed += count - parsed;
            break;
        };
        let packet_len = usize::from(packet_len);
        offset += 2;

        let Some(packet) = data.get(offset..offset + packet_len) else {
            debug!(packet_len, remaining = data.len() - offset, "Truncated tick packet");
            batch.malformed += count - parsed;
            break;
        };
        offset += packet_len;

        match parse_packet(packet) {
            Some(tick) => batch.ticks.push(tick),
            None => {
                debug!(packet_len, "Skipping tick packet of unknown length");
                batch.malformed += 1;
            }
        }
    }

    batch
}

/// Decode one packet body, or `None` if its length is not a known layout
fn parse_packet(packet: &[u8]) -> Option<Tick> {
    if !matches!(
        packet.len(),
        LTP_PACKET_LEN
            | INDEX_QUOTE_PACKET_LEN
            | INDEX_FULL_PACKET_LEN
            | QUOTE_PACKET_LEN
            | FULL_PACKET_LEN
    ) {
        return None;
    }

    let token = read_u32(packet, 0)?;
    let segment = token & 0xff;
    let divisor = price_divisor(segment);
    let price = |at: usize| read_u32(packet, at).map(|raw| f64::from(raw) / divisor);

    let mut tick = Tick::ltp(token, price(4)?);
    if segment == SEGMENT_INDICES {
        tick = tick.non_tradable();
    }

    match packet.len() {
        LTP_PACKET_LEN => {}
        INDEX_QUOTE_PACKET_LEN | INDEX_FULL_PACKET_LEN => {
            let ohlc = Ohlc {
                high: price(8)?,
                low: price(12)?,
                open: price(16)?,
                close: price(20)?,
            };
            tick.mode = if packet.len() == INDEX_FULL_PACKET_LEN {
                TickMode::Full
            } else {
                TickMode::Quote
            };
            tick.ohlc = Some(ohlc);
            tick.change = change_percent(tick.last_price, ohlc.close);
            if packet.len() == INDEX_FULL_PACKET_LEN {
                tick.exchange_timestamp = read_u32(packet, 28).map(i64::from);
            }
        }
        QUOTE_PACKET_LEN | FULL_PACKET_LEN => {
            let ohlc = Ohlc {
                open: price(28)?,
                high: price(32)?,
                low: price(36)?,
                close: price(40)?,
            };
            tick.mode = TickMode::Quote;
            tick.last_quantity = read_u32(packet, 8);
            tick.average_price = Some(price(12)?);
            tick.volume = read_u32(packet, 16).map(u64::from);
            tick.buy_quantity = read_u32(packet, 20).map(u64::from);
            tick.sell_quantity = read_u32(packet, 24).map(u64::from);
            tick.ohlc = Some(ohlc);
            tick.change = change_percent(tick.last_price, ohlc.close);

            if packet.len() == FULL_PACKET_LEN {
                tick.mode = TickMode::Full;
                tick.last_trade_time = read_u32(packet, 44).map(i64::from);
                tick.oi = read_u32(packet, 48);
                tick.oi_day_high = read_u32(packet, 52);
                tick.oi_day_low = read_u32(packet, 56);
                tick.exchange_timestamp = read_u32(packet, 60).map(i64::from);
                tick.depth = Some(parse_depth(packet, divisor)?);
            }
        }
        _ => return None,
    }

    Some(tick)
}

fn parse_depth(packet: &[u8], divisor: f64) -> Option<Depth> {
    let level = |index: usize| -> Option<DepthLevel> {
        let at = DEPTH_OFFSET + index * DEPTH_LEVEL_LEN;
        Some(DepthLevel {
            quantity: read_u32(packet, at)?,
            price: f64::from(read_u32(packet, at + 4)?) / divisor,
            orders: read_u16(packet, at + 8)?,
        })
    };

    let buy = (0..DEPTH_LEVELS_PER_SIDE)
        .map(level)
        .collect::<Option<Vec<_>>>()?;
    let sell = (DEPTH_LEVELS_PER_SIDE..DEPTH_LEVELS_PER_SIDE * 2)
        .map(level)
        .collect::<Option<Vec<_>>>()?;

    Some(Depth { buy, sell })
}

fn price_divisor(segment: u32) -> f64 {
    match segment {
        SEGMENT_CDS => 10_000_000.0,
        SEGMENT_BCD => 10_000.0,
        _ => 100.0,
    }
}

fn change_percent(last: f64, close: f64) -> Option<f64> {
    (close != 0.0).then(|| (last - close) / close * 100.0)
}

fn read_u16(data: &[u8], at: usize) -> Option<u16> {
    let bytes = data.get(at..at + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
