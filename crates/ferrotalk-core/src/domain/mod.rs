mod date_range;
mod granularity;
mod series;
mod symbol;
mod timestamp;

pub use date_range::DateRange;
pub use granularity::Granularity;
pub use series::{PriceField, PricePoint, Provenance, Series};
pub use symbol::Symbol;
pub use timestamp::{parse_date, today_utc, UtcDateTime};
