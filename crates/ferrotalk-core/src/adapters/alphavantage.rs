use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use time::Duration;
use tracing::debug;

use crate::data_source::{
    effective_granularity, FetchFuture, FetchRequest, MarketDataProvider, ProviderError,
};
use crate::domain::{parse_date, today_utc};
use crate::http_client::{HttpClient, HttpError, HttpRequest};
use crate::provider_policy::ProviderPolicy;
use crate::throttling::Throttle;
use crate::{Granularity, PricePoint, ProviderId, Series, UtcDateTime};

const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";
const SUPPORTED: &[Granularity] = &[Granularity::Daily];
/// `outputsize=compact` covers roughly the last 100 days.
const COMPACT_WINDOW_DAYS: i64 = 100;

const EQUITY_SERIES_KEY: &str = "Time Series (Daily)";
const CRYPTO_SERIES_KEY: &str = "Time Series (Digital Currency Daily)";

/// Alpha Vantage daily-series adapter, throttled to the free-tier budget.
#[derive(Clone)]
pub struct AlphaVantageAdapter {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    base_url: String,
    policy: ProviderPolicy,
    throttle: Throttle,
}

impl AlphaVantageAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        let policy = ProviderPolicy::alphavantage_default();
        Self {
            http_client,
            api_key: api_key.into(),
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

    fn query_url(&self, req: &FetchRequest) -> String {
        match req.symbol.crypto_legs() {
            Some((base, quote)) => format!(
                "{}/query?function=DIGITAL_CURRENCY_DAILY&symbol={}&market={}&apikey={}",
                self.base_url,
                urlencoding::encode(base),
                urlencoding::encode(quote),
                urlencoding::encode(&self.api_key),
            ),
            None => {
                let compact_since = today_utc() - Duration::days(COMPACT_WINDOW_DAYS);
                let outputsize = if req.range.start() < compact_since {
                    "full"
                } else {
                    "compact"
                };
                format!(
                    "{}/query?function=TIME_SERIES_DAILY&symbol={}&outputsize={}&apikey={}",
                    self.base_url,
                    urlencoding::encode(req.symbol.as_str()),
                    outputsize,
                    urlencoding::encode(&self.api_key),
                )
            }
        }
    }

    async fn fetch_daily(&self, req: FetchRequest) -> Result<Series, ProviderError> {
        if let Err(wait) = self.throttle.try_acquire() {
            return Err(ProviderError::rate_limited(
                ProviderId::Alphavantage,
                format!(
                    "alphavantage free-tier budget exhausted; next slot in {:.1}s",
                    wait.as_secs_f64()
                ),
            ));
        }

        let url = self.query_url(&req);
        debug!(
            symbol = %req.symbol,
            requested = %req.granularity,
            "requesting alphavantage daily series"
        );

        let request = HttpRequest::get(url).with_timeout_ms(self.policy.request_timeout_ms());
        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(transport_error)?;

        match response.status {
            200..=299 => {}
            429 => {
                return Err(ProviderError::rate_limited(
                    ProviderId::Alphavantage,
                    "alphavantage returned status 429",
                ))
            }
            status if status >= 500 => {
                return Err(ProviderError::transient_io(
                    ProviderId::Alphavantage,
                    format!("alphavantage returned status {status}"),
                ))
            }
            status => {
                return Err(ProviderError::malformed(
                    ProviderId::Alphavantage,
                    format!("alphavantage returned unexpected status {status}"),
                ))
            }
        }

        let served = effective_granularity(self.granularities(), req.granularity);
        parse_daily(&req, served, &response.body)
    }
}

impl MarketDataProvider for AlphaVantageAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Alphavantage
    }

    fn granularities(&self) -> &'static [Granularity] {
        SUPPORTED
    }

    fn fetch<'a>(&'a self, req: FetchRequest) -> FetchFuture<'a> {
        Box::pin(self.fetch_daily(req))
    }
}

fn transport_error(error: HttpError) -> ProviderError {
    let message = if error.timed_out() {
        format!("alphavantage request timed out: {}", error.message())
    } else {
        format!("alphavantage transport error: {}", error.message())
    };
    ProviderError::transient_io(ProviderId::Alphavantage, message)
}

fn parse_daily(
    req: &FetchRequest,
    served: Granularity,
    body: &str,
) -> Result<Series, ProviderError> {
    let payload: BTreeMap<String, Value> = serde_json::from_str(body).map_err(|e| {
        ProviderError::malformed(
            ProviderId::Alphavantage,
            format!("failed to parse alphavantage payload: {e}"),
        )
    })?;

    if payload.contains_key("Error Message") {
        return Err(ProviderError::symbol_not_found(
            ProviderId::Alphavantage,
            &req.symbol,
        ));
    }
    for key in ["Note", "Information"] {
        if let Some(message) = payload.get(key) {
            return Err(ProviderError::rate_limited(
                ProviderId::Alphavantage,
                message.as_str().unwrap_or("alphavantage request budget exceeded"),
            ));
        }
    }

    let series_key = if req.symbol.is_crypto_pair() {
        CRYPTO_SERIES_KEY
    } else {
        EQUITY_SERIES_KEY
    };
    let rows = payload
        .get(series_key)
        .and_then(Value::as_object)
        .ok_or_else(|| {
            ProviderError::malformed(
                ProviderId::Alphavantage,
                format!("alphavantage payload is missing '{series_key}'"),
            )
        })?;

    let mut dated = Vec::with_capacity(rows.len());
    for (day, row) in rows {
        let date = parse_date(day).map_err(|e| malformed_row(day, e.to_string()))?;
        if !req.range.contains(date) {
            continue;
        }
        let fields = row
            .as_object()
            .ok_or_else(|| malformed_row(day, String::from("row is not an object")))?;

        dated.push(PricePoint {
            timestamp: UtcDateTime::start_of_day(date),
            open: numeric_field(fields, "1. open", day)?,
            high: numeric_field(fields, "2. high", day)?,
            low: numeric_field(fields, "3. low", day)?,
            close: numeric_field(fields, "4. close", day)?,
            volume: numeric_field(fields, "5. volume", day)?
                .filter(|volume| *volume >= 0.0)
                .map(|volume| volume.round() as u64),
        });
    }
    dated.sort_by_key(|point| point.timestamp);

    Series::new(
        req.symbol.clone(),
        dated,
        ProviderId::Alphavantage,
        served,
        req.granularity,
        req.range,
    )
    .map_err(|e| ProviderError::malformed(ProviderId::Alphavantage, e.to_string()))
}

/// Looks a field up by its numbered prefix. Older crypto payloads suffix the market
/// (`"4a. close (USD)"`), newer ones don't.
fn numeric_field(
    fields: &serde_json::Map<String, Value>,
    name: &str,
    day: &str,
) -> Result<Option<f64>, ProviderError> {
    let (number, label) = name.split_once(". ").unwrap_or((name, name));
    let raw = fields.get(name).or_else(|| {
        fields.iter().find_map(|(key, value)| {
            let matches = key.starts_with(&format!("{number}a. {label}"));
            matches.then_some(value)
        })
    });

    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(Some)
            .ok_or_else(|| malformed_row(day, format!("field '{name}' is not numeric: '{text}'"))),
        Some(Value::Number(number)) => Ok(number.as_f64()),
        Some(other) => Err(malformed_row(
            day,
            format!("field '{name}' has unexpected type: {other}"),
        )),
    }
}

fn malformed_row(day: &str, detail: String) -> ProviderError {
    ProviderError::malformed(
        ProviderId::Alphavantage,
        format!("alphavantage row '{day}': {detail}"),
    )
}
