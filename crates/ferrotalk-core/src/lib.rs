//! # Ferrotalk Core
//!
//! Market data contracts and price computations behind the ferrotalk query interpreter.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Provider adapters (Yahoo Finance primary, Alpha Vantage secondary) |
//! | [`compute`] | Price computations over series, and arithmetic |
//! | [`coordinator`] | Primary/secondary fallback retrieval |
//! | [`data_source`] | Provider trait, fetch request and error taxonomy |
//! | [`domain`] | Symbols, dates, granularity and price series |
//! | [`error`] | Core error types |
//! | [`http_client`] | HTTP client abstraction |
//! | [`provider_policy`] | Per-provider quotas and timeouts |
//! | [`source`] | Provider identifiers and fallback tiers |
//! | [`throttling`] | Local request budget |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │ Tool executor       │
//! └─────────┬───────────┘
//!           │ retrieve(symbol, range)
//!           ▼
//! ┌─────────────────────┐     ┌──────────────────┐
//! │ RetrievalCoordinator│────▶│ Yahoo (primary)  │
//! │ (timeout, one hop)  │     └──────────────────┘
//! │                     │     ┌──────────────────┐
//! │                     │────▶│ Alpha Vantage    │
//! └─────────┬───────────┘     │ (secondary)      │
//!           │ Series          └──────────────────┘
//!           ▼
//! ┌─────────────────────┐
//! │ compute             │
//! └─────────────────────┘
//! ```

pub mod adapters;
pub mod compute;
pub mod coordinator;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod provider_policy;
pub mod source;
pub mod throttling;

pub use adapters::{AlphaVantageAdapter, YahooAdapter};
pub use compute::{
    arithmetic, average, close_on_or_before, high_low, percentage_change, ArithmeticOp,
    ComputeError, LookbackTolerance, PercentChange,
};
pub use coordinator::{RetrievalCoordinator, RetrievalFailure};
pub use data_source::{
    FetchFuture, FetchRequest, MarketDataProvider, ProviderError, ProviderErrorKind,
};
pub use domain::*;
pub use error::ValidationError;
pub use http_client::{
    FixtureHttpClient, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient,
};
pub use provider_policy::ProviderPolicy;
pub use source::{ProviderId, SourceTier};
pub use throttling::Throttle;
