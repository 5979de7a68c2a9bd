//! Two-tier fallback retrieval.
//!
//! The coordinator asks the primary provider first and hops to the secondary at most once:
//!
//! | Primary outcome | Action |
//! |-----------------|--------|
//! | non-empty series | return it (`source = primary`) |
//! | `SymbolNotFound` | fail with `SymbolNotFound`, secondary untouched |
//! | any other error | one secondary call; its series or `AllProvidersExhausted` |
//! | empty series | one secondary call; its series, or the empty primary series if it fails |

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::data_source::{effective_granularity, FetchRequest, MarketDataProvider, ProviderError};
use crate::{DateRange, Granularity, Series, SourceTier, Symbol};

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Terminal outcome of a failed retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetrievalFailure {
    #[error("symbol not found: {0}")]
    SymbolNotFound(ProviderError),
    #[error("all providers exhausted (primary: {primary}; secondary: {secondary})")]
    AllProvidersExhausted {
        primary: ProviderError,
        secondary: ProviderError,
    },
}

/// Primary/secondary provider pair with a per-fetch deadline.
#[derive(Clone)]
pub struct RetrievalCoordinator {
    primary: Arc<dyn MarketDataProvider>,
    secondary: Arc<dyn MarketDataProvider>,
    fetch_timeout: Duration,
}

impl RetrievalCoordinator {
    pub fn new(
        primary: Arc<dyn MarketDataProvider>,
        secondary: Arc<dyn MarketDataProvider>,
    ) -> Self {
        Self {
            primary,
            secondary,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Daily series for `symbol` over `range`.
    pub async fn retrieve(
        &self,
        symbol: &Symbol,
        range: DateRange,
    ) -> Result<Series, RetrievalFailure> {
        self.retrieve_at(symbol, range, Granularity::Daily).await
    }

    pub async fn retrieve_at(
        &self,
        symbol: &Symbol,
        range: DateRange,
        granularity: Granularity,
    ) -> Result<Series, RetrievalFailure> {
        let request = FetchRequest::new(symbol.clone(), range, granularity);

        let primary_outcome = self.attempt(self.primary.as_ref(), request.clone()).await;
        let primary_error = match primary_outcome {
            Ok(series) if !series.is_empty() => {
                debug!(
                    %symbol,
                    provider = %self.primary.id(),
                    points = series.len(),
                    "primary provider served series"
                );
                return Ok(series.with_source(SourceTier::Primary));
            }
            Ok(empty) => {
                warn!(
                    %symbol,
                    provider = %self.primary.id(),
                    "primary provider returned no data; trying secondary"
                );
                return Ok(self.hop_after_empty(request, empty).await);
            }
            Err(error) if !error.falls_back() => {
                debug!(
                    %symbol,
                    code = error.code(),
                    "symbol unknown to primary provider; not falling back"
                );
                return Err(RetrievalFailure::SymbolNotFound(error));
            }
            Err(error) => error,
        };

        warn!(
            %symbol,
            provider = %self.primary.id(),
            code = primary_error.code(),
            error = primary_error.message(),
            "primary provider failed; falling back to secondary"
        );

        match self.attempt(self.secondary.as_ref(), request).await {
            Ok(series) => {
                debug!(
                    %symbol,
                    provider = %self.secondary.id(),
                    points = series.len(),
                    "secondary provider served series"
                );
                Ok(series.with_source(SourceTier::Secondary))
            }
            Err(secondary_error) => {
                warn!(
                    %symbol,
                    code = secondary_error.code(),
                    error = secondary_error.message(),
                    "secondary provider failed; providers exhausted"
                );
                Err(RetrievalFailure::AllProvidersExhausted {
                    primary: primary_error,
                    secondary: secondary_error,
                })
            }
        }
    }

    async fn hop_after_empty(&self, request: FetchRequest, primary_empty: Series) -> Series {
        match self.attempt(self.secondary.as_ref(), request).await {
            Ok(series) if !series.is_empty() => series.with_source(SourceTier::Secondary),
            Ok(_) => primary_empty.with_source(SourceTier::Primary),
            Err(error) => {
                debug!(
                    code = error.code(),
                    "secondary failed after empty primary; keeping empty series"
                );
                primary_empty.with_source(SourceTier::Primary)
            }
        }
    }

    async fn attempt(
        &self,
        provider: &dyn MarketDataProvider,
        request: FetchRequest,
    ) -> Result<Series, ProviderError> {
        let id = provider.id();
        let served = effective_granularity(provider.granularities(), request.granularity);
        debug!(
            provider = %id,
            symbol = %request.symbol,
            range = %request.range,
            requested = %request.granularity,
            %served,
            "fetch attempt"
        );

        match tokio::time::timeout(self.fetch_timeout, provider.fetch(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProviderError::transient_io(
                id,
                format!("fetch exceeded {} ms deadline", self.fetch_timeout.as_millis()),
            )),
        }
    }
}
