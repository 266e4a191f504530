//! Kite instrument master CSV
//!
//! The broker publishes the full instrument list as a CSV dump with the
//! header `instrument_token,exchange_token,tradingsymbol,name,last_price,
//! expiry,strike,tick_size,lot_size,instrument_type,segment,exchange`.

use crate::error::FeedResult;
use chrono::NaiveDate;
use common::{Instrument, InstrumentType};
use serde::Deserialize;
use std::io::Read;
use tracing::{debug, info, warn};

/// Rows (and row errors) logged individually before going quiet
const LOGGED_ROWS: usize = 5;

#[derive(Debug, Deserialize)]
struct KiteInstrumentRow {
    instrument_token: u32,
    exchange_token: u32,
    tradingsymbol: String,
    name: Option<String>,
    expiry: Option<String>,
    strike: Option<f64>,
    tick_size: f64,
    lot_size: u32,
    instrument_type: String,
    segment: String,
    exchange: String,
}

impl From<KiteInstrumentRow> for Instrument {
    fn from(row: KiteInstrumentRow) -> Self {
        let expiry = row
            .expiry
            .as_deref()
            .and_then(|e| NaiveDate::parse_from_str(e, "%Y-%m-%d").ok());

        Self {
            instrument_token: row.instrument_token,
            exchange_token: row.exchange_token,
            instrument_type: InstrumentType::from_kite(&row.instrument_type, &row.segment),
            trading_symbol: row.tradingsymbol,
            name: row.name.unwrap_or_default(),
            exchange: row.exchange,
            segment: row.segment,
            lot_size: row.lot_size,
            tick_size: row.tick_size,
            expiry,
            strike: row.strike.filter(|s| *s > 0.0),
        }
    }
}

/// Parse an instrument master dump.
///
/// Rows that fail to decode are skipped and counted; a broken header or an
/// unreadable source fails the whole parse.
pub fn parse_instruments_csv<R: Read>(reader: R) -> FeedResult<Vec<Instrument>> {
    let mut reader = csv::Reader::from_reader(reader);
    reader.headers()?;

    let mut instruments = Vec::new();
    let mut error_count = 0;

    for result in reader.deserialize::<KiteInstrumentRow>() {
        match result {
            Ok(row) => {
                if instruments.len() < LOGGED_ROWS {
                    debug!(symbol = %row.tradingsymbol, "Parsed instrument");
                }
                instruments.push(Instrument::from(row));
            }
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                error_count += 1;
                if error_count <= LOGGED_ROWS {
                    warn!("Failed to parse instrument: {}", e);
                }
            }
        }
    }

    if error_count > 0 {
        warn!("Total instrument parse errors: {}", error_count);
    }
    info!(count = instruments.len(), "Parsed instrument master");

    Ok(instruments)
}
