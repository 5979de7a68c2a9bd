//! Tool bodies.
//!
//! Every tool runs against the [`RetrievalCoordinator`] or the pure computations in
//! `ferrotalk_core::compute`; no tool talks to a provider directly.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use ferrotalk_core::{
    arithmetic, average, close_on_or_before, high_low, percentage_change, ArithmeticOp,
    ComputeError, DateRange, Granularity, LookbackTolerance, PriceField, RetrievalCoordinator,
    RetrievalFailure, Series, SourceTier, Symbol, ValidationError,
};
use serde_json::json;
use time::{Date, Duration, Month};
use tracing::debug;

use crate::error::SearchError;
use crate::format;
use crate::registry::{
    arithmetic_op, price_field, ValidatedArguments, ValidatedCall, DEFAULT_AVERAGE_DAYS,
    DEFAULT_HISTORY_PERIOD,
};
use crate::tool::{FailureKind, ToolName, ToolOutput, ToolResult};

const PRICE_WINDOW_DAYS: u32 = 7;

pub type SearchFuture<'a> = Pin<Box<dyn Future<Output = Result<String, SearchError>> + Send + 'a>>;

/// Optional web search backend.
pub trait WebSearch: Send + Sync {
    fn search<'a>(&'a self, query: &'a str) -> SearchFuture<'a>;
}

/// Runs validated tool calls.
#[derive(Clone)]
pub struct ToolExecutor {
    coordinator: RetrievalCoordinator,
    web_search: Option<Arc<dyn WebSearch>>,
    tolerance: LookbackTolerance,
    today: Option<Date>,
}

impl ToolExecutor {
    pub fn new(coordinator: RetrievalCoordinator) -> Self {
        Self {
            coordinator,
            web_search: None,
            tolerance: LookbackTolerance::default(),
            today: None,
        }
    }

    pub fn with_web_search(mut self, web_search: Arc<dyn WebSearch>) -> Self {
        self.web_search = Some(web_search);
        self
    }

    pub fn with_tolerance(mut self, tolerance: LookbackTolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Pins the reference date used for trailing windows.
    pub fn with_today(mut self, today: Date) -> Self {
        self.today = Some(today);
        self
    }

    pub fn has_web_search(&self) -> bool {
        self.web_search.is_some()
    }

    pub fn today(&self) -> Date {
        self.today.unwrap_or_else(ferrotalk_core::today_utc)
    }

    pub async fn execute(&self, call: &ValidatedCall) -> ToolResult {
        debug!(tool = %call.tool, arguments = call.arguments.len(), "executing tool");
        let args = &call.arguments;
        let outcome = match call.tool {
            ToolName::GetStockPrice => self.stock_price(args).await,
            ToolName::GetCryptoPrice => self.crypto_price(args).await,
            ToolName::GetStockInfo => self.stock_info(args).await,
            ToolName::GetHistoricalData => self.historical_data(args).await,
            ToolName::CalculateAveragePrice => self.average_price(args).await,
            ToolName::PercentageChange => self.percentage_change(args).await,
            ToolName::Arithmetic => run_arithmetic(args),
            ToolName::WebSearch => self.web_search(args).await,
        };

        match outcome {
            Ok(output) => ToolResult::success(output),
            Err(failed) => {
                debug!(
                    tool = %call.tool,
                    kind = %failed.kind,
                    message = %failed.message,
                    "tool failed"
                );
                ToolResult::failure(failed.kind, failed.message)
            }
        }
    }

    async fn stock_price(&self, args: &ValidatedArguments) -> Result<ToolOutput, Failed> {
        let symbol = Symbol::parse(required_text(args, "symbol")?)?;
        match args.date("date") {
            Some(date) => self.close_on(symbol, date).await,
            None => self.latest_price(symbol, None).await,
        }
    }

    /// Close on `date`, or on the closest earlier trading day within the lookback tolerance.
    async fn close_on(&self, symbol: Symbol, date: Date) -> Result<ToolOutput, Failed> {
        if date > self.today() {
            return Err(Failed::new(
                FailureKind::InvalidArguments,
                format!("date: {date} is in the future"),
            ));
        }

        let range = self.lookback_range(date, date)?;
        let series = self.coordinator.retrieve(&symbol, range).await?;
        let (resolved, close) = close_on_or_before(&series, date, self.tolerance)?;

        let summary = format!("{symbol} closed at {} on {resolved}.", format::price(close));
        let mut notes = Vec::new();
        if resolved != date {
            notes.push(shifted_note(date, resolved));
        }
        notes.extend(disclosures(&series));

        let data = json!({
            "symbol": symbol,
            "requested_date": date.to_string(),
            "date": resolved.to_string(),
            "close": close,
            "provenance": series.provenance(),
        });

        Ok(ToolOutput::new(summary, data).with_disclosures(notes))
    }

    async fn crypto_price(&self, args: &ValidatedArguments) -> Result<ToolOutput, Failed> {
        let symbol = Symbol::crypto_pair(required_text(args, "symbol")?)?;
        self.latest_price(symbol, Some("USD")).await
    }

    async fn latest_price(
        &self,
        symbol: Symbol,
        currency: Option<&str>,
    ) -> Result<ToolOutput, Failed> {
        let range = DateRange::trailing_days(self.today(), PRICE_WINDOW_DAYS);
        let series = self
            .coordinator
            .retrieve_at(&symbol, range, Granularity::Realtime)
            .await?;
        let (point, close) = series.latest_close().ok_or_else(|| empty_series(&series))?;

        let amount = match currency {
            Some(currency) => format!("{} {currency}", format::price(close)),
            None => format::price(close),
        };
        let summary = format!(
            "{symbol} last traded at {amount} (as of {}).",
            point.timestamp
        );
        let data = json!({
            "symbol": symbol,
            "price": close,
            "as_of": point.timestamp,
            "provenance": series.provenance(),
        });

        Ok(ToolOutput::new(summary, data).with_disclosures(disclosures(&series)))
    }

    async fn stock_info(&self, args: &ValidatedArguments) -> Result<ToolOutput, Failed> {
        let symbol = Symbol::parse(required_text(args, "symbol")?)?;
        let range = period_range("1y", self.today());

        let series = self.coordinator.retrieve(&symbol, range).await?;
        if series.is_empty() {
            return Err(empty_series(&series));
        }

        let mut closes = series
            .points()
            .iter()
            .rev()
            .filter_map(|point| point.close.map(|close| (point, close)));
        let Some((latest, latest_close)) = closes.next() else {
            return Err(Failed::new(
                FailureKind::InsufficientData,
                format!("no close prices for {symbol} in {range}"),
            ));
        };
        let previous_close = closes.next().map(|(_, close)| close);
        let (high, low) = high_low(&series)?;

        let mut summary = format!(
            "{symbol} closed at {} on {}",
            format::price(latest_close),
            latest.date()
        );
        if let Some(previous) = previous_close {
            summary.push_str(&format!(" (previous close {})", format::price(previous)));
        }
        summary.push('.');
        if let Some(volume) = latest.volume {
            summary.push_str(&format!(" Volume {}.", format::number(volume as f64, 0)));
        }
        summary.push_str(&format!(
            " 52-week range {} to {}.",
            format::price(low),
            format::price(high)
        ));

        let data = json!({
            "symbol": symbol,
            "latest_close": latest_close,
            "latest_date": latest.date().to_string(),
            "previous_close": previous_close,
            "volume": latest.volume,
            "week52_high": high,
            "week52_low": low,
            "provenance": series.provenance(),
        });

        Ok(ToolOutput::new(summary, data).with_disclosures(disclosures(&series)))
    }

    async fn historical_data(&self, args: &ValidatedArguments) -> Result<ToolOutput, Failed> {
        let symbol = Symbol::parse(required_text(args, "symbol")?)?;
        let period = args.choice("period").unwrap_or(DEFAULT_HISTORY_PERIOD);
        let range = period_range(period, self.today());

        let series = self.coordinator.retrieve(&symbol, range).await?;
        if series.is_empty() {
            return Err(empty_series(&series));
        }

        let closes: Vec<(Date, f64)> = series
            .points()
            .iter()
            .filter_map(|point| point.close.map(|close| (point.date(), close)))
            .collect();
        let (Some(&(first_date, _)), Some(&(last_date, last_close))) =
            (closes.first(), closes.last())
        else {
            return Err(Failed::new(
                FailureKind::InsufficientData,
                format!("no close prices for {symbol} in {range}"),
            ));
        };
        if closes.len() < 2 {
            return Err(Failed::new(
                FailureKind::InsufficientData,
                format!("only one close price for {symbol} in the last {period}"),
            ));
        }
        let previous_close = closes[closes.len() - 2].1;
        let change = percentage_change(&series, first_date, last_date, self.tolerance)?;

        let summary = format!(
            "{symbol} closed at {} on {last_date} (previous close {}). \
             Change over {period}: {} since {first_date}.",
            format::price(last_close),
            format::price(previous_close),
            format::percent(change.percent),
        );
        let data = json!({
            "symbol": symbol,
            "period": period,
            "latest_close": last_close,
            "latest_date": last_date.to_string(),
            "previous_close": previous_close,
            "period_start": first_date.to_string(),
            "period_change_percent": change.percent,
            "points": series.len(),
            "provenance": series.provenance(),
        });

        Ok(ToolOutput::new(summary, data).with_disclosures(disclosures(&series)))
    }

    async fn average_price(&self, args: &ValidatedArguments) -> Result<ToolOutput, Failed> {
        let symbol = Symbol::parse(required_text(args, "symbol")?)?;
        let days = args.integer("days").unwrap_or(DEFAULT_AVERAGE_DAYS);
        let days = u32::try_from(days).map_err(|_| {
            Failed::new(FailureKind::InvalidArguments, format!("days: {days} is out of range"))
        })?;
        let field = match args.choice("field") {
            Some(choice) => price_field(choice).ok_or_else(|| {
                Failed::new(FailureKind::InvalidArguments, format!("field: unknown '{choice}'"))
            })?,
            None => PriceField::default(),
        };

        let range = DateRange::trailing_days(self.today(), days);
        let series = self.coordinator.retrieve(&symbol, range).await?;
        let mean = average(&series, field)?;
        let samples = series
            .points()
            .iter()
            .filter(|point| point.field(field).is_some())
            .count();

        let rendered = match field {
            PriceField::Volume => format::number(mean, 0),
            _ => format::price(mean),
        };
        let summary = format!(
            "Average {field} for {symbol} over the last {days} day(s): {rendered} \
             across {samples} trading day(s)."
        );
        let data = json!({
            "symbol": symbol,
            "field": field,
            "days": days,
            "average": mean,
            "samples": samples,
            "provenance": series.provenance(),
        });

        Ok(ToolOutput::new(summary, data).with_disclosures(disclosures(&series)))
    }

    async fn percentage_change(&self, args: &ValidatedArguments) -> Result<ToolOutput, Failed> {
        let symbol = Symbol::parse(required_text(args, "symbol")?)?;
        let from = required_date(args, "from_date")?;
        let to = required_date(args, "to_date")?;
        if from > to {
            return Err(ComputeError::InvalidRange { from, to }.into());
        }

        let range = self.lookback_range(from, to)?;
        let series = self.coordinator.retrieve(&symbol, range).await?;
        let change = percentage_change(&series, from, to, self.tolerance)?;

        let summary = format!(
            "{symbol} moved {} from {} on {} to {} on {}.",
            format::percent(change.percent),
            format::price(change.from_price),
            change.resolved_from,
            format::price(change.to_price),
            change.resolved_to,
        );
        let mut notes = Vec::new();
        if change.resolved_from != change.requested_from {
            notes.push(shifted_note(change.requested_from, change.resolved_from));
        }
        if change.resolved_to != change.requested_to {
            notes.push(shifted_note(change.requested_to, change.resolved_to));
        }
        notes.extend(disclosures(&series));

        let data = json!({
            "symbol": symbol,
            "change": change,
            "provenance": series.provenance(),
        });

        Ok(ToolOutput::new(summary, data).with_disclosures(notes))
    }

    /// `[from - max lookback, to]`, so an endpoint on a closed day can reach back to a session.
    fn lookback_range(&self, from: Date, to: Date) -> Result<DateRange, Failed> {
        let lookback = Duration::days(i64::from(self.tolerance.max_lookback_days));
        let start = from.checked_sub(lookback).unwrap_or(from);
        Ok(DateRange::new(start, to)?)
    }

    async fn web_search(&self, args: &ValidatedArguments) -> Result<ToolOutput, Failed> {
        let query = required_text(args, "query")?;
        let Some(backend) = self.web_search.as_ref() else {
            return Err(Failed::new(
                FailureKind::SearchUnavailable,
                "no web search backend is configured",
            ));
        };

        let text = backend
            .search(query)
            .await
            .map_err(|error| Failed::new(FailureKind::SearchUnavailable, error.message))?;
        Ok(ToolOutput::new(text.clone(), json!({"query": query, "result": text})))
    }
}

fn run_arithmetic(args: &ValidatedArguments) -> Result<ToolOutput, Failed> {
    let op = args
        .choice("op")
        .and_then(arithmetic_op)
        .ok_or_else(|| Failed::new(FailureKind::InvalidArguments, "op: missing operation"))?;
    let operands = args
        .numbers("operands")
        .ok_or_else(|| Failed::new(FailureKind::InvalidArguments, "operands: missing"))?;

    let result = arithmetic(op, operands)?;
    let summary = describe_arithmetic(op, operands, result);
    let data = json!({"op": op.as_str(), "operands": operands, "result": result});
    Ok(ToolOutput::new(summary, data))
}

fn describe_arithmetic(op: ArithmeticOp, operands: &[f64], result: f64) -> String {
    let n = |value: f64| format::number(value, 6);
    let joined = |separator: &str| {
        operands
            .iter()
            .map(|value| n(*value))
            .collect::<Vec<_>>()
            .join(separator)
    };
    let result = n(result);

    match (op, operands) {
        (ArithmeticOp::PercentOf, [base, percent]) => {
            format!("{}% of {} is {result}.", n(*percent), n(*base))
        }
        (ArithmeticOp::PercentRatio, [part, whole]) => {
            format!("{} is {result}% of {}.", n(*part), n(*whole))
        }
        (ArithmeticOp::Sqrt, [value]) => format!("The square root of {} is {result}.", n(*value)),
        (ArithmeticOp::Add, _) => format!("{} = {result}", joined(" + ")),
        (ArithmeticOp::Subtract, _) => format!("{} = {result}", joined(" - ")),
        (ArithmeticOp::Multiply, _) => format!("{} = {result}", joined(" × ")),
        (ArithmeticOp::Divide, _) => format!("{} = {result}", joined(" ÷ ")),
        (ArithmeticOp::Power, _) => format!("{} = {result}", joined(" ^ ")),
        (op, _) => format!("{op}({}) = {result}", joined(", ")),
    }
}

/// Calendar range covered by a history period.
pub fn period_range(period: &str, today: Date) -> DateRange {
    let days = match period {
        "5d" => 7,
        "3mo" => 92,
        "6mo" => 183,
        "1y" => 366,
        "ytd" => {
            let january_first = Date::from_calendar_date(today.year(), Month::January, 1)
                .unwrap_or(today);
            let span = (today - january_first).whole_days() + 1;
            return DateRange::trailing_days(today, u32::try_from(span).unwrap_or(1));
        }
        _ => 31,
    };
    DateRange::trailing_days(today, days)
}

fn shifted_note(requested: Date, resolved: Date) -> String {
    format!("No trading data on {requested}; used the closest earlier trading day {resolved}.")
}

fn disclosures(series: &Series) -> Vec<String> {
    let provenance = series.provenance();
    let mut notes = Vec::new();
    if provenance.source == SourceTier::Secondary {
        notes.push(format!(
            "Data served by the backup provider ({}) because the primary provider was \
             unavailable.",
            provenance.provider.display_name()
        ));
    }
    if provenance.is_downgraded() {
        notes.push(format!(
            "{} only had {} data, not {}.",
            provenance.provider.display_name(),
            provenance.granularity,
            provenance.requested_granularity
        ));
    }
    notes
}

fn empty_series(series: &Series) -> Failed {
    Failed::new(
        FailureKind::EmptySeries,
        format!(
            "{} in {}",
            series.symbol(),
            series.provenance().range_requested
        ),
    )
}

fn required_text<'a>(args: &'a ValidatedArguments, name: &str) -> Result<&'a str, Failed> {
    args.text(name)
        .ok_or_else(|| Failed::new(FailureKind::InvalidArguments, format!("{name}: missing")))
}

fn required_date(args: &ValidatedArguments, name: &str) -> Result<Date, Failed> {
    args.date(name)
        .ok_or_else(|| Failed::new(FailureKind::InvalidArguments, format!("{name}: missing")))
}

/// Tool failure before it becomes a [`ToolResult::Failure`].
#[derive(Debug)]
struct Failed {
    kind: FailureKind,
    message: String,
}

impl Failed {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<RetrievalFailure> for Failed {
    fn from(failure: RetrievalFailure) -> Self {
        match failure {
            RetrievalFailure::SymbolNotFound(error) => {
                let message = error.message().to_owned();
                Self::new(FailureKind::SymbolNotFound, message)
            }
            exhausted @ RetrievalFailure::AllProvidersExhausted { .. } => {
                Self::new(FailureKind::ProviderUnavailable, exhausted.to_string())
            }
        }
    }
}

impl From<ComputeError> for Failed {
    fn from(error: ComputeError) -> Self {
        let kind = match &error {
            ComputeError::InsufficientData(_) => FailureKind::InsufficientData,
            ComputeError::EmptySeries => FailureKind::EmptySeries,
            ComputeError::DivisionByZero => FailureKind::DivisionByZero,
            ComputeError::InvalidOperands(_) | ComputeError::InvalidRange { .. } => {
                FailureKind::InvalidArguments
            }
        };
        let message = match error {
            ComputeError::InsufficientData(message) | ComputeError::InvalidOperands(message) => {
                message
            }
            other => other.to_string(),
        };
        Self::new(kind, message)
    }
}

impl From<ValidationError> for Failed {
    fn from(error: ValidationError) -> Self {
        Self::new(FailureKind::InvalidArguments, error.to_string())
    }
}
