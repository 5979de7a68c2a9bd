//! Provider adapters implementing [`MarketDataProvider`](crate::data_source::MarketDataProvider).

pub mod alphavantage;
pub mod yahoo;

pub use alphavantage::AlphaVantageAdapter;
pub use yahoo::YahooAdapter;
