//! Shared constants for windows, analytics scaling and ingest defaults

/// Rolling window geometry
pub mod window {
    /// Slots per rolling window
    pub const WINDOW_SLOTS: usize = 60;
    /// Span of the long window in seconds
    pub const TEN_MIN_PERIOD_SECS: u64 = 600;
    /// Width of one long-window bucket in seconds
    pub const TEN_MIN_BUCKET_SECS: u64 = 10;
    /// Span of the short window in seconds
    pub const THREE_MIN_PERIOD_SECS: u64 = 180;
    /// Width of one short-window bucket in seconds
    pub const THREE_MIN_BUCKET_SECS: u64 = 3;
}

/// Analytics scaling factors
pub mod analytics {
    /// Ratio to basis-point-ish scale before flooring to two decimals
    pub const RATIO_SCALE: f64 = 10_000.0;
    /// Divisor restoring two-decimal percentages
    pub const PERCENT_DIVISOR: f64 = 100.0;
    /// Scale of a whole percentage
    pub const PERCENT: f64 = 100.0;
    /// One lakh, the unit of the scaled traded value
    pub const LAKH: f64 = 100_000.0;
}

/// Ingest and persistence defaults
pub mod ingest {
    /// Reconnect attempts before giving up
    pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;
    /// Fixed delay before each reconnect attempt
    pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
    /// Snapshot timer period
    pub const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 900;
    /// Kite ticker endpoint
    pub const DEFAULT_TICKER_WS_URL: &str = "wss://ws.kite.trade";
}
