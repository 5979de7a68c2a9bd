use thiserror::Error;

/// Validation and contract errors exposed by `ferrotalk-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol contains invalid character {ch:?} at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid granularity '{value}', expected one of realtime, daily")]
    InvalidGranularity { value: String },
    #[error("invalid price field '{value}', expected one of open, high, low, close, volume")]
    InvalidPriceField { value: String },
    #[error("invalid provider '{value}', expected one of yahoo, alphavantage")]
    InvalidProvider { value: String },

    #[error("date must be formatted as YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },
    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("date range start {start} is after end {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("series timestamps must be strictly increasing (index {index})")]
    NonMonotonicSeries { index: usize },
    #[error("series point dated {date} lies outside the requested range {range}")]
    PointOutsideRange { date: String, range: String },
}

