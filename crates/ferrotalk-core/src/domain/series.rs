use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::{DateRange, Granularity, ProviderId, SourceTier, Symbol, UtcDateTime, ValidationError};

/// One sample of a price series. Providers may leave any numeric field out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: UtcDateTime,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<u64>,
}

impl PricePoint {
    /// A point that only carries a close price.
    pub fn close_only(timestamp: UtcDateTime, close: Option<f64>) -> Self {
        Self {
            timestamp,
            open: None,
            high: None,
            low: None,
            close,
            volume: None,
        }
    }

    pub fn date(&self) -> Date {
        self.timestamp.date()
    }

    pub fn field(&self, field: PriceField) -> Option<f64> {
        match field {
            PriceField::Open => self.open,
            PriceField::High => self.high,
            PriceField::Low => self.low,
            PriceField::Close => self.close,
            PriceField::Volume => self.volume.map(|volume| volume as f64),
        }
    }
}

/// Numeric column of a [`PricePoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PriceField {
    Open,
    High,
    Low,
    #[default]
    Close,
    Volume,
}

impl PriceField {
    pub const ALL: [Self; 5] = [
        Self::Open,
        Self::High,
        Self::Low,
        Self::Close,
        Self::Volume,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::High => "high",
            Self::Low => "low",
            Self::Close => "close",
            Self::Volume => "volume",
        }
    }
}

impl Display for PriceField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceField {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "high" => Ok(Self::High),
            "low" => Ok(Self::Low),
            "close" => Ok(Self::Close),
            "volume" => Ok(Self::Volume),
            other => Err(ValidationError::InvalidPriceField {
                value: other.to_owned(),
            }),
        }
    }
}

/// Where a series came from and how it relates to what was asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub provider: ProviderId,
    pub source: SourceTier,
    pub granularity: Granularity,
    pub requested_granularity: Granularity,
    pub range_requested: DateRange,
    /// Span of the returned point dates; `None` for an empty series.
    pub range_returned: Option<DateRange>,
}

impl Provenance {
    /// True when the provider served a coarser granularity than requested.
    pub fn is_downgraded(&self) -> bool {
        self.granularity != self.requested_granularity
    }
}

/// Ordered price samples for one symbol, tagged with provenance.
///
/// Timestamps are strictly increasing and every point's date lies in
/// `provenance.range_requested`. An empty series is a valid value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    symbol: Symbol,
    points: Vec<PricePoint>,
    provenance: Provenance,
}

impl Series {
    pub fn new(
        symbol: Symbol,
        points: Vec<PricePoint>,
        provider: ProviderId,
        granularity: Granularity,
        requested_granularity: Granularity,
        range_requested: DateRange,
    ) -> Result<Self, ValidationError> {
        for (index, pair) in points.windows(2).enumerate() {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(ValidationError::NonMonotonicSeries { index: index + 1 });
            }
        }

        for point in &points {
            if !range_requested.contains(point.date()) {
                return Err(ValidationError::PointOutsideRange {
                    date: point.date().to_string(),
                    range: range_requested.to_string(),
                });
            }
        }

        let range_returned = match (points.first(), points.last()) {
            (Some(first), Some(last)) => Some(DateRange::new(first.date(), last.date())?),
            _ => None,
        };

        Ok(Self {
            symbol,
            points,
            provenance: Provenance {
                provider,
                source: SourceTier::Primary,
                granularity,
                requested_granularity,
                range_requested,
                range_returned,
            },
        })
    }

    pub fn empty(
        symbol: Symbol,
        provider: ProviderId,
        granularity: Granularity,
        range_requested: DateRange,
    ) -> Self {
        Self {
            symbol,
            points: Vec::new(),
            provenance: Provenance {
                provider,
                source: SourceTier::Primary,
                granularity,
                requested_granularity: granularity,
                range_requested,
                range_returned: None,
            },
        }
    }

    /// Re-tags the series with its position in the fallback chain.
    pub fn with_source(mut self, source: SourceTier) -> Self {
        self.provenance.source = source;
        self
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Most recent point carrying a close price.
    pub fn latest_close(&self) -> Option<(&PricePoint, f64)> {
        self.points
            .iter()
            .rev()
            .find_map(|point| point.close.map(|close| (point, close)))
    }
}
