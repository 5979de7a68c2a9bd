use std::sync::Arc;

use ferrotalk_core::{
    AlphaVantageAdapter, DateRange, FetchRequest, FixtureHttpClient, Granularity, HttpError,
    HttpResponse, MarketDataProvider, ProviderErrorKind, ProviderId, Symbol, YahooAdapter,
};
use time::macros::date;

const YAHOO_CHART: &str = r#"{
    "chart": {
        "result": [{
            "meta": {"symbol": "MSFT"},
            "timestamp": [1709217000, 1709303400, 1709562600, 1709649000],
            "indicators": {"quote": [{
                "open": [408.6, 411.3, 413.4, 413.9],
                "high": [414.2, 415.9, 417.3, 414.1],
                "low": [405.9, 410.3, 409.5, 398.9],
                "close": [413.6, 415.5, 414.9, 402.7],
                "volume": [27331200, 17823400, 17596000, 26919200]
            }]}
        }],
        "error": null
    }
}"#;

const ALPHAVANTAGE_DAILY: &str = r#"{
    "Time Series (Daily)": {
        "2024-03-05": {"1. open": "413.96", "2. high": "414.25", "3. low": "398.91", "4. close": "402.65", "5. volume": "26919210"},
        "2024-03-04": {"1. open": "413.44", "2. high": "417.35", "3. low": "409.52", "4. close": "414.92", "5. volume": "17596013"},
        "2024-03-01": {"1. open": "411.27", "2. high": "415.87", "3. low": "410.28", "4. close": "415.50", "5. volume": "17823452"},
        "2024-02-29": {"1. open": "408.64", "2. high": "414.20", "3. low": "405.92", "4. close": "413.64", "5. volume": "27331243"}
    }
}"#;

#[derive(Clone)]
struct ProviderCase {
    id: ProviderId,
    url_fragment: &'static str,
    healthy_body: &'static str,
}

fn provider_cases() -> Vec<ProviderCase> {
    vec![
        ProviderCase {
            id: ProviderId::Yahoo,
            url_fragment: "yahoo.test",
            healthy_body: YAHOO_CHART,
        },
        ProviderCase {
            id: ProviderId::Alphavantage,
            url_fragment: "av.test",
            healthy_body: ALPHAVANTAGE_DAILY,
        },
    ]
}

fn adapter(id: ProviderId, http: FixtureHttpClient) -> Arc<dyn MarketDataProvider> {
    match id {
        ProviderId::Alphavantage => Arc::new(
            AlphaVantageAdapter::new(Arc::new(http), "test-key").with_base_url("https://av.test"),
        ),
        _ => Arc::new(YahooAdapter::new(Arc::new(http)).with_base_url("https://yahoo.test")),
    }
}

fn request() -> FetchRequest {
    FetchRequest::daily(
        Symbol::parse("MSFT").expect("valid symbol"),
        DateRange::new(date!(2024 - 03 - 01), date!(2024 - 03 - 05)).expect("valid range"),
    )
}

#[tokio::test]
async fn series_are_ordered_in_range_and_tagged_for_all_providers() {
    for case in provider_cases() {
        let http = FixtureHttpClient::new()
            .respond(case.url_fragment, HttpResponse::ok_json(case.healthy_body));
        let series = adapter(case.id, http)
            .fetch(request())
            .await
            .unwrap_or_else(|error| panic!("provider '{}' fetch failed: {error}", case.id));

        assert_eq!(series.len(), 3, "provider '{}': points in range", case.id);
        assert_eq!(series.provenance().provider, case.id, "provider '{}': provenance", case.id);
        assert_eq!(series.provenance().granularity, Granularity::Daily);
        assert!(
            series
                .points()
                .windows(2)
                .all(|pair| pair[0].timestamp < pair[1].timestamp),
            "provider '{}': strictly increasing timestamps",
            case.id
        );
        assert!(
            series
                .points()
                .iter()
                .all(|point| request().range.contains(point.date())),
            "provider '{}': points inside the requested range",
            case.id
        );
    }
}

#[tokio::test]
async fn throttling_and_outages_are_classified_for_all_providers() {
    let outcomes = [
        (Ok(HttpResponse::with_status(429, "slow down")), ProviderErrorKind::RateLimited),
        (Ok(HttpResponse::with_status(503, "unavailable")), ProviderErrorKind::TransientIo),
        (Ok(HttpResponse::ok_json("<html>")), ProviderErrorKind::MalformedResponse),
        (Err(HttpError::timeout("deadline")), ProviderErrorKind::TransientIo),
    ];

    for case in provider_cases() {
        for (outcome, expected) in outcomes.clone() {
            let http = match outcome {
                Ok(response) => FixtureHttpClient::new().respond(case.url_fragment, response),
                Err(error) => FixtureHttpClient::new().fail(case.url_fragment, error),
            };

            let error = adapter(case.id, http)
                .fetch(request())
                .await
                .expect_err("fetch must fail");

            assert_eq!(error.kind(), expected, "provider '{}': {}", case.id, error);
            assert_eq!(error.provider(), case.id);
            assert!(error.falls_back(), "provider '{}': {expected:?} falls back", case.id);
        }
    }
}

#[tokio::test]
async fn unknown_symbols_are_terminal_for_all_providers() {
    let not_found = [
        (
            ProviderId::Yahoo,
            HttpResponse::with_status(
                404,
                r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#,
            ),
        ),
        (
            ProviderId::Alphavantage,
            HttpResponse::ok_json(r#"{"Error Message": "Invalid API call. Please retry or visit the documentation."}"#),
        ),
    ];

    for (id, response) in not_found {
        let case = provider_cases()
            .into_iter()
            .find(|case| case.id == id)
            .expect("known case");
        let http = FixtureHttpClient::new().respond(case.url_fragment, response);

        let error = adapter(id, http).fetch(request()).await.expect_err("not found");

        assert_eq!(error.kind(), ProviderErrorKind::SymbolNotFound, "provider '{id}'");
        assert!(!error.falls_back());
        assert_eq!(error.code(), "provider.symbol_not_found");
    }
}
