//! Fake market data providers shared by the behaviour tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ferrotalk_core::{
    FetchFuture, FetchRequest, Granularity, MarketDataProvider, PricePoint, ProviderError,
    ProviderErrorKind, ProviderId, Series, Symbol, UtcDateTime,
};
use time::Date;

/// What a [`FakeProvider`] does when asked for a series.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Serves these daily closes, clipped to the requested range.
    Closes(Vec<(Date, Option<f64>)>),
    /// Serves these full bars, clipped to the requested range.
    Bars(Vec<PricePoint>),
    Fail(ProviderErrorKind),
    /// Sleeps far past any fetch deadline.
    Hang,
}

pub struct FakeProvider {
    id: ProviderId,
    granularities: &'static [Granularity],
    behavior: Mutex<Behavior>,
    calls: AtomicUsize,
    symbols: Mutex<Vec<Symbol>>,
}

impl FakeProvider {
    pub fn new(id: ProviderId, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            id,
            granularities: &[Granularity::Realtime, Granularity::Daily],
            behavior: Mutex::new(behavior),
            calls: AtomicUsize::new(0),
            symbols: Mutex::new(Vec::new()),
        })
    }

    /// A provider that only serves daily bars, downgrading realtime requests.
    pub fn daily_only(id: ProviderId, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            id,
            granularities: &[Granularity::Daily],
            behavior: Mutex::new(behavior),
            calls: AtomicUsize::new(0),
            symbols: Mutex::new(Vec::new()),
        })
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().expect("behavior lock") = behavior;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested_symbols(&self) -> Vec<String> {
        self.symbols
            .lock()
            .expect("symbols lock")
            .iter()
            .map(|symbol| symbol.as_str().to_owned())
            .collect()
    }
}

impl MarketDataProvider for FakeProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn granularities(&self) -> &'static [Granularity] {
        self.granularities
    }

    fn fetch<'a>(&'a self, req: FetchRequest) -> FetchFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.symbols
            .lock()
            .expect("symbols lock")
            .push(req.symbol.clone());
        let behavior = self.behavior.lock().expect("behavior lock").clone();

        Box::pin(async move {
            let served = if self.granularities.contains(&req.granularity) {
                req.granularity
            } else {
                Granularity::Daily
            };
            let points: Vec<PricePoint> = match behavior {
                Behavior::Closes(closes) => closes
                    .into_iter()
                    .map(|(day, close)| {
                        PricePoint::close_only(UtcDateTime::start_of_day(day), close)
                    })
                    .collect(),
                Behavior::Bars(bars) => bars,
                Behavior::Fail(kind) => {
                    return Err(ProviderError::new(self.id, kind, "scripted failure"));
                }
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    return Err(ProviderError::transient_io(self.id, "woke after hanging"));
                }
            };

            let points = points
                .into_iter()
                .filter(|point| req.range.contains(point.date()))
                .collect();
            Ok(Series::new(
                req.symbol,
                points,
                self.id,
                served,
                req.granularity,
                req.range,
            )
            .expect("fake points are ordered"))
        })
    }
}

/// Consecutive calendar days starting at `start`, one close each.
pub fn daily_closes(start: Date, closes: &[f64]) -> Vec<(Date, Option<f64>)> {
    closes
        .iter()
        .enumerate()
        .map(|(offset, close)| (start + time::Duration::days(offset as i64), Some(*close)))
        .collect()
}

/// A daily bar with every field set.
pub fn bar(day: Date, low: f64, high: f64, close: f64, volume: u64) -> PricePoint {
    PricePoint {
        timestamp: UtcDateTime::start_of_day(day),
        open: Some(close),
        high: Some(high),
        low: Some(low),
        close: Some(close),
        volume: Some(volume),
    }
}
