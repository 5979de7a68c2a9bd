use std::sync::Arc;

use serde::Deserialize;
use time::Duration;
use tracing::debug;

use crate::data_source::{
    effective_granularity, FetchFuture, FetchRequest, MarketDataProvider, ProviderError,
};
use crate::http_client::{HttpClient, HttpError, HttpRequest, HttpResponse};
use crate::provider_policy::ProviderPolicy;
use crate::throttling::Throttle;
use crate::{Granularity, PricePoint, ProviderId, Series, Symbol, UtcDateTime, ValidationError};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const SUPPORTED: &[Granularity] = &[Granularity::Realtime, Granularity::Daily];

/// Yahoo Finance chart adapter. Serves both intraday and daily bars.
#[derive(Clone)]
pub struct YahooAdapter {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    policy: ProviderPolicy,
    throttle: Throttle,
}

impl YahooAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        let policy = ProviderPolicy::yahoo_default();
        Self {
            http_client,
            base_url: String::from(DEFAULT_BASE_URL),
            throttle: Throttle::from_policy(&policy),
            policy,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// Replaces the policy and resets the request budget to match it.
    pub fn with_policy(mut self, policy: ProviderPolicy) -> Self {
        self.throttle = Throttle::from_policy(&policy);
        self.policy = policy;
        self
    }

    fn chart_url(&self, req: &FetchRequest, granularity: Granularity) -> String {
        let period1 = UtcDateTime::start_of_day(req.range.start()).unix_timestamp();
        let period2 = UtcDateTime::start_of_day(req.range.end()).unix_timestamp()
            + Duration::DAY.whole_seconds();

        format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval={}&includePrePost=false",
            self.base_url,
            urlencoding::encode(req.symbol.as_str()),
            period1,
            period2,
            chart_interval(granularity),
        )
    }

    async fn fetch_chart(&self, req: FetchRequest) -> Result<Series, ProviderError> {
        if let Err(wait) = self.throttle.try_acquire() {
            return Err(ProviderError::rate_limited(
                ProviderId::Yahoo,
                format!(
                    "yahoo request budget exhausted; next slot in {:.1}s",
                    wait.as_secs_f64()
                ),
            ));
        }

        let granularity = effective_granularity(self.granularities(), req.granularity);
        let url = self.chart_url(&req, granularity);
        debug!(symbol = %req.symbol, %granularity, "requesting yahoo chart");

        let request = HttpRequest::get(url)
            .with_header("accept", "application/json")
            .with_timeout_ms(self.policy.request_timeout_ms());

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(transport_error)?;

        let body = check_status(&req.symbol, response)?;
        parse_chart(&req, granularity, &body)
    }
}

impl MarketDataProvider for YahooAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Yahoo
    }

    fn granularities(&self) -> &'static [Granularity] {
        SUPPORTED
    }

    fn fetch<'a>(&'a self, req: FetchRequest) -> FetchFuture<'a> {
        Box::pin(self.fetch_chart(req))
    }
}

const fn chart_interval(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Realtime => "5m",
        Granularity::Daily => "1d",
    }
}

fn transport_error(error: HttpError) -> ProviderError {
    let message = if error.timed_out() {
        format!("yahoo request timed out: {}", error.message())
    } else {
        format!("yahoo transport error: {}", error.message())
    };
    ProviderError::transient_io(ProviderId::Yahoo, message)
}

fn check_status(symbol: &Symbol, response: HttpResponse) -> Result<String, ProviderError> {
    match response.status {
        200..=299 => Ok(response.body),
        404 => Err(ProviderError::symbol_not_found(ProviderId::Yahoo, symbol)),
        429 => Err(ProviderError::rate_limited(
            ProviderId::Yahoo,
            "yahoo returned status 429",
        )),
        status if status >= 500 => Err(ProviderError::transient_io(
            ProviderId::Yahoo,
            format!("yahoo returned status {status}"),
        )),
        status => Err(ProviderError::malformed(
            ProviderId::Yahoo,
            format!("yahoo returned unexpected status {status}"),
        )),
    }
}

fn parse_chart(
    req: &FetchRequest,
    granularity: Granularity,
    body: &str,
) -> Result<Series, ProviderError> {
    let response: ChartResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::malformed(ProviderId::Yahoo, format!("failed to parse yahoo chart: {e}"))
    })?;

    if let Some(error) = response.chart.error {
        if error.code.eq_ignore_ascii_case("Not Found") {
            return Err(ProviderError::symbol_not_found(ProviderId::Yahoo, &req.symbol));
        }
        return Err(ProviderError::malformed(
            ProviderId::Yahoo,
            format!("yahoo chart error {}: {}", error.code, error.description),
        ));
    }

    let result = response
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| {
            ProviderError::malformed(ProviderId::Yahoo, "no chart result in response")
        })?;

    let gmt_offset = result.meta.gmtoffset.unwrap_or(0);
    let timestamps = result.timestamp.unwrap_or_default();
    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .unwrap_or_default();

    let mut points: Vec<PricePoint> = Vec::with_capacity(timestamps.len());
    for (i, &seconds) in timestamps.iter().enumerate() {
        let timestamp = bar_timestamp(seconds, gmt_offset, granularity)?;
        if !req.range.contains(timestamp.date()) {
            continue;
        }
        // The live bar is sometimes repeated at the tail of intraday responses.
        if points.last().is_some_and(|last| last.timestamp >= timestamp) {
            continue;
        }

        points.push(PricePoint {
            timestamp,
            open: value_at(&quote.open, i),
            high: value_at(&quote.high, i),
            low: value_at(&quote.low, i),
            close: value_at(&quote.close, i),
            volume: quote
                .volume
                .get(i)
                .copied()
                .flatten()
                .and_then(|volume| u64::try_from(volume).ok()),
        });
    }

    Series::new(
        req.symbol.clone(),
        points,
        ProviderId::Yahoo,
        granularity,
        req.granularity,
        req.range,
    )
    .map_err(|e| ProviderError::malformed(ProviderId::Yahoo, e.to_string()))
}

/// Daily bars are stamped at the exchange's local session open, so the trading date is
/// taken in exchange time and the bar is pinned to midnight UTC of that date.
fn bar_timestamp(
    seconds: i64,
    gmt_offset: i64,
    granularity: Granularity,
) -> Result<UtcDateTime, ProviderError> {
    let invalid = |e: ValidationError| {
        ProviderError::malformed(ProviderId::Yahoo, format!("invalid timestamp: {e}"))
    };
    match granularity {
        Granularity::Realtime => UtcDateTime::from_unix_timestamp(seconds).map_err(invalid),
        Granularity::Daily => {
            let local = UtcDateTime::from_unix_timestamp(seconds.saturating_add(gmt_offset))
                .map_err(invalid)?;
            Ok(UtcDateTime::start_of_day(local.date()))
        }
    }
}

fn value_at(values: &[Option<f64>], index: usize) -> Option<f64> {
    values
        .get(index)
        .copied()
        .flatten()
        .filter(|value| value.is_finite())
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    /// Exchange offset from UTC in seconds.
    #[serde(default)]
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::ProviderErrorKind;
    use crate::http_client::FixtureHttpClient;
    use crate::{DateRange, SourceTier};
    use time::macros::date;

    // 2024-03-04 .. 2024-03-06 at 14:30 UTC, plus 2024-03-11 outside the range.
    const CHART_BODY: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"symbol": "AAPL"},
                "timestamp": [1709562600, 1709649000, 1709735400, 1710167400],
                "indicators": {"quote": [{
                    "open": [176.1, 170.7, 171.0, 172.9],
                    "high": [176.9, 172.0, 171.2, 174.3],
                    "low": [173.7, 168.5, 168.4, 172.0],
                    "close": [175.1, 170.1, null, 172.7],
                    "volume": [81510100, 95132400, 68587700, 60139500]
                }]}
            }],
            "error": null
        }
    }"#;

    fn request(granularity: Granularity) -> FetchRequest {
        FetchRequest::new(
            Symbol::parse("AAPL").expect("symbol"),
            DateRange::new(date!(2024 - 03 - 01), date!(2024 - 03 - 08)).expect("range"),
            granularity,
        )
    }

    fn adapter(client: FixtureHttpClient) -> YahooAdapter {
        YahooAdapter::new(Arc::new(client)).with_base_url("https://yahoo.test")
    }

    #[tokio::test]
    async fn parses_chart_and_drops_points_outside_range() {
        let client = FixtureHttpClient::new()
            .respond("/v8/finance/chart/AAPL", HttpResponse::ok_json(CHART_BODY));
        let series = adapter(client.clone())
            .fetch(request(Granularity::Daily))
            .await
            .expect("series");

        assert_eq!(series.len(), 3);
        assert_eq!(series.points()[2].close, None);
        assert_eq!(series.provenance().provider, ProviderId::Yahoo);
        assert_eq!(series.provenance().source, SourceTier::Primary);
        assert_eq!(
            series.provenance().range_returned.map(|range| range.end()),
            Some(date!(2024 - 03 - 06))
        );

        let url = &client.requests()[0].url;
        assert!(url.contains("interval=1d"));
        assert!(url.contains("period1=1709251200"));
        assert!(url.contains("period2=1709942400"));
    }

    #[tokio::test]
    async fn realtime_requests_use_intraday_interval() {
        let client = FixtureHttpClient::new()
            .respond("/v8/finance/chart/AAPL", HttpResponse::ok_json(CHART_BODY));
        let series = adapter(client.clone())
            .fetch(request(Granularity::Realtime))
            .await
            .expect("series");

        assert!(client.requests()[0].url.contains("interval=5m"));
        assert!(!series.provenance().is_downgraded());
    }

    #[tokio::test]
    async fn not_found_chart_error_is_terminal() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let client = FixtureHttpClient::new()
            .respond("/v8/finance/chart/", HttpResponse::with_status(404, body));
        let error = adapter(client)
            .fetch(request(Granularity::Daily))
            .await
            .expect_err("must fail");

        assert_eq!(error.kind(), ProviderErrorKind::SymbolNotFound);
        assert!(!error.falls_back());
    }

    #[tokio::test]
    async fn maps_status_codes_and_transport_failures() {
        let cases = [
            (
                HttpResponse::with_status(429, "Too Many Requests"),
                ProviderErrorKind::RateLimited,
            ),
            (
                HttpResponse::with_status(503, "unavailable"),
                ProviderErrorKind::TransientIo,
            ),
            (
                HttpResponse::ok_json("<html>"),
                ProviderErrorKind::MalformedResponse,
            ),
            (
                HttpResponse::ok_json(r#"{"chart":{"result":[],"error":null}}"#),
                ProviderErrorKind::MalformedResponse,
            ),
        ];

        for (response, expected) in cases {
            let client = FixtureHttpClient::new().respond("/v8/finance/chart/", response);
            let error = adapter(client)
                .fetch(request(Granularity::Daily))
                .await
                .expect_err("must fail");
            assert_eq!(error.kind(), expected);
        }

        let client = FixtureHttpClient::new()
            .fail("/v8/finance/chart/", HttpError::timeout("deadline exceeded"));
        let error = adapter(client)
            .fetch(request(Granularity::Daily))
            .await
            .expect_err("must fail");
        assert_eq!(error.kind(), ProviderErrorKind::TransientIo);
    }

    #[tokio::test]
    async fn missing_timestamps_yield_empty_series() {
        let body = r#"{"chart":{"result":[{"meta":{},"indicators":{"quote":[{}]}}],"error":null}}"#;
        let client =
            FixtureHttpClient::new().respond("/v8/finance/chart/", HttpResponse::ok_json(body));
        let series = adapter(client)
            .fetch(request(Granularity::Daily))
            .await
            .expect("series");

        assert!(series.is_empty());
        assert!(series.provenance().range_returned.is_none());
    }

    #[tokio::test]
    async fn daily_bars_are_dated_in_exchange_time() {
        // Given: a Tokyo bar stamped 2024-03-04 00:00 JST, which is still 2024-03-03 in UTC
        let body = r#"{"chart":{"result":[{
            "meta": {"symbol": "7203.T", "gmtoffset": 32400},
            "timestamp": [1709478000],
            "indicators": {"quote": [{"close": [3520.0], "volume": [1000]}]}
        }],"error":null}}"#;
        let client =
            FixtureHttpClient::new().respond("/v8/finance/chart/", HttpResponse::ok_json(body));

        // When: daily bars are requested
        let series = adapter(client)
            .fetch(request(Granularity::Daily))
            .await
            .expect("series");

        // Then: the bar carries the exchange's trading date
        assert_eq!(series.len(), 1);
        assert_eq!(series.points()[0].timestamp.date(), date!(2024 - 03 - 04));
        assert_eq!(
            series.points()[0].timestamp,
            UtcDateTime::start_of_day(date!(2024 - 03 - 04))
        );
    }

    #[tokio::test]
    async fn spent_request_budget_reports_rate_limit_without_calling_out() {
        // Given: a budget of a single request per minute
        let client = FixtureHttpClient::new()
            .respond("/v8/finance/chart/AAPL", HttpResponse::ok_json(CHART_BODY));
        let policy = ProviderPolicy::yahoo_default()
            .with_quota(1, std::time::Duration::from_secs(60));
        let adapter = adapter(client.clone()).with_policy(policy);

        // When: two requests arrive back to back
        adapter
            .fetch(request(Granularity::Daily))
            .await
            .expect("first request fits the budget");
        let error = adapter
            .fetch(request(Granularity::Daily))
            .await
            .expect_err("second request exceeds the budget");

        // Then: the second is refused locally as a fallback-eligible rate limit
        assert_eq!(error.kind(), ProviderErrorKind::RateLimited);
        assert!(error.falls_back());
        assert_eq!(client.requests().len(), 1);
    }
}
