//! Market data provider contract and error taxonomy.
//!
//! Every provider adapter implements [`MarketDataProvider`]: given a symbol, a date range
//! and a desired [`Granularity`], it returns a [`Series`] or a classified
//! [`ProviderError`]. The fallback coordinator only reasons about the error *kind*; the
//! message is for logs.
//!
//! | Kind | Code | Falls back |
//! |------|------|------------|
//! | `SymbolNotFound` | `provider.symbol_not_found` | no |
//! | `RateLimited` | `provider.rate_limited` | yes |
//! | `TransientIo` | `provider.transient_io` | yes |
//! | `MalformedResponse` | `provider.malformed_response` | yes |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{DateRange, Granularity, ProviderId, Series, Symbol};

/// Boxed future returned by provider fetches.
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Series, ProviderError>> + Send + 'a>>;

/// Closed classification of provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    SymbolNotFound,
    RateLimited,
    TransientIo,
    MalformedResponse,
}

impl ProviderErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SymbolNotFound => "symbol_not_found",
            Self::RateLimited => "rate_limited",
            Self::TransientIo => "transient_io",
            Self::MalformedResponse => "malformed_response",
        }
    }
}

impl Display for ProviderErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured provider error used by the fallback coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    provider: ProviderId,
    kind: ProviderErrorKind,
    message: String,
}

impl ProviderError {
    pub fn new(provider: ProviderId, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            kind,
            message: message.into(),
        }
    }

    pub fn symbol_not_found(provider: ProviderId, symbol: &Symbol) -> Self {
        Self::new(
            provider,
            ProviderErrorKind::SymbolNotFound,
            format!("symbol '{symbol}' is not known to {provider}"),
        )
    }

    pub fn rate_limited(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::RateLimited, message)
    }

    pub fn transient_io(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::TransientIo, message)
    }

    pub fn malformed(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::MalformedResponse, message)
    }

    pub const fn provider(&self) -> ProviderId {
        self.provider
    }

    pub const fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the coordinator should try the next provider after this error.
    pub const fn falls_back(&self) -> bool {
        !matches!(self.kind, ProviderErrorKind::SymbolNotFound)
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            ProviderErrorKind::SymbolNotFound => "provider.symbol_not_found",
            ProviderErrorKind::RateLimited => "provider.rate_limited",
            ProviderErrorKind::TransientIo => "provider.transient_io",
            ProviderErrorKind::MalformedResponse => "provider.malformed_response",
        }
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.provider, self.message, self.code())
    }
}

impl std::error::Error for ProviderError {}

/// Request payload for a series fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub symbol: Symbol,
    pub range: DateRange,
    pub granularity: Granularity,
}

impl FetchRequest {
    pub fn new(symbol: Symbol, range: DateRange, granularity: Granularity) -> Self {
        Self {
            symbol,
            range,
            granularity,
        }
    }

    pub fn daily(symbol: Symbol, range: DateRange) -> Self {
        Self::new(symbol, range, Granularity::Daily)
    }
}

/// Provider adapter contract.
///
/// Implementations must be safe to call concurrently; any internal state (rate budget)
/// lives behind shared handles.
pub trait MarketDataProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Granularities this provider can serve natively. Requests for anything else are
    /// downgraded to the coarsest supported value and the returned provenance says so.
    fn granularities(&self) -> &'static [Granularity];

    /// Fetches the series for `req`.
    ///
    /// Points outside `req.range` are dropped. An instrument that exists but has no data in
    /// the range yields an empty series, not an error.
    fn fetch<'a>(&'a self, req: FetchRequest) -> FetchFuture<'a>;
}

/// Resolves the granularity a provider will actually serve for `requested`.
pub fn effective_granularity(supported: &[Granularity], requested: Granularity) -> Granularity {
    if supported.contains(&requested) {
        requested
    } else if supported.contains(&Granularity::Daily) {
        Granularity::Daily
    } else {
        supported.first().copied().unwrap_or(requested)
    }
}
