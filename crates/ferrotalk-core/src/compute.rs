//! Pure computations over retrieved series and plain numbers.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::Date;

use crate::{PriceField, Series};

/// Calendar days an endpoint may fall back to reach a trading day (covers long weekends).
pub const DEFAULT_MAX_LOOKBACK_DAYS: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComputeError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("series has no points")]
    EmptySeries,
    #[error("division by zero")]
    DivisionByZero,
    #[error("invalid operands: {0}")]
    InvalidOperands(String),
    #[error("invalid range: {from} is after {to}")]
    InvalidRange { from: Date, to: Date },
}

/// How far back a date may resolve to the closest earlier observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookbackTolerance {
    pub max_lookback_days: u32,
}

impl Default for LookbackTolerance {
    fn default() -> Self {
        Self {
            max_lookback_days: DEFAULT_MAX_LOOKBACK_DAYS,
        }
    }
}

/// Result of [`percentage_change`], with the dates that were actually used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentChange {
    pub requested_from: Date,
    pub requested_to: Date,
    pub resolved_from: Date,
    pub resolved_to: Date,
    pub from_price: f64,
    pub to_price: f64,
    pub percent: f64,
}

impl PercentChange {
    pub fn endpoints_shifted(&self) -> bool {
        self.resolved_from != self.requested_from || self.resolved_to != self.requested_to
    }
}

/// Percentage change of the close between two dates.
///
/// Each endpoint resolves to the latest point with a close on or before the target date, no
/// more than `tolerance.max_lookback_days` earlier.
pub fn percentage_change(
    series: &Series,
    from: Date,
    to: Date,
    tolerance: LookbackTolerance,
) -> Result<PercentChange, ComputeError> {
    if from > to {
        return Err(ComputeError::InvalidRange { from, to });
    }
    if series.is_empty() {
        return Err(ComputeError::EmptySeries);
    }

    let (resolved_from, from_price) = resolve_close(series, from, tolerance)?;
    let (resolved_to, to_price) = resolve_close(series, to, tolerance)?;

    if from_price == 0.0 {
        return Err(ComputeError::DivisionByZero);
    }

    let percent = (to_price - from_price) / from_price * 100.0;
    if !percent.is_finite() {
        return Err(ComputeError::InvalidOperands(String::from(
            "percentage change is not finite",
        )));
    }

    Ok(PercentChange {
        requested_from: from,
        requested_to: to,
        resolved_from,
        resolved_to,
        from_price,
        to_price,
        percent,
    })
}

/// Close for `target`, or for the latest earlier trading day within `tolerance`.
pub fn close_on_or_before(
    series: &Series,
    target: Date,
    tolerance: LookbackTolerance,
) -> Result<(Date, f64), ComputeError> {
    if series.is_empty() {
        return Err(ComputeError::EmptySeries);
    }
    resolve_close(series, target, tolerance)
}

fn resolve_close(
    series: &Series,
    target: Date,
    tolerance: LookbackTolerance,
) -> Result<(Date, f64), ComputeError> {
    series
        .points()
        .iter()
        .rev()
        .filter(|point| point.date() <= target)
        .take_while(|point| {
            (target - point.date()).whole_days() <= i64::from(tolerance.max_lookback_days)
        })
        .find_map(|point| point.close.map(|close| (point.date(), close)))
        .ok_or_else(|| {
            ComputeError::InsufficientData(format!(
                "no close price within {} day(s) on or before {target}",
                tolerance.max_lookback_days
            ))
        })
}

/// Mean of `field` across the series, skipping missing values.
pub fn average(series: &Series, field: PriceField) -> Result<f64, ComputeError> {
    if series.is_empty() {
        return Err(ComputeError::EmptySeries);
    }

    let (sum, count) = series
        .points()
        .iter()
        .filter_map(|point| point.field(field))
        .fold((0.0_f64, 0_u32), |(sum, count), value| (sum + value, count + 1));

    if count == 0 {
        return Err(ComputeError::InsufficientData(format!(
            "no {field} values in {} point(s)",
            series.len()
        )));
    }

    Ok(sum / f64::from(count))
}

/// Highest high and lowest low across the series. A point missing either uses its close.
pub fn high_low(series: &Series) -> Result<(f64, f64), ComputeError> {
    if series.is_empty() {
        return Err(ComputeError::EmptySeries);
    }

    let highs = series
        .points()
        .iter()
        .filter_map(|point| point.high.or(point.close));
    let lows = series
        .points()
        .iter()
        .filter_map(|point| point.low.or(point.close));

    match (highs.reduce(f64::max), lows.reduce(f64::min)) {
        (Some(high), Some(low)) => Ok((high, low)),
        _ => Err(ComputeError::InsufficientData(format!(
            "no high or low values in {} point(s)",
            series.len()
        ))),
    }
}

/// Closed set of arithmetic operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    /// `[base, percent]` -> `base * percent / 100`.
    PercentOf,
    /// `[part, whole]` -> `part / whole * 100`.
    PercentRatio,
    Power,
    Sqrt,
    Min,
    Max,
}

impl ArithmeticOp {
    pub const ALL: [Self; 10] = [
        Self::Add,
        Self::Subtract,
        Self::Multiply,
        Self::Divide,
        Self::PercentOf,
        Self::PercentRatio,
        Self::Power,
        Self::Sqrt,
        Self::Min,
        Self::Max,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::PercentOf => "percent_of",
            Self::PercentRatio => "percent_ratio",
            Self::Power => "power",
            Self::Sqrt => "sqrt",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

impl Display for ArithmeticOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArithmeticOp {
    type Err = ComputeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == normalized)
            .ok_or_else(|| ComputeError::InvalidOperands(format!("unknown operation '{value}'")))
    }
}

pub fn arithmetic(op: ArithmeticOp, operands: &[f64]) -> Result<f64, ComputeError> {
    if let Some(bad) = operands.iter().find(|value| !value.is_finite()) {
        return Err(ComputeError::InvalidOperands(format!(
            "operand {bad} is not a finite number"
        )));
    }

    let value: f64 = match op {
        ArithmeticOp::Add => at_least(op, operands, 2)?.iter().sum(),
        ArithmeticOp::Multiply => at_least(op, operands, 2)?.iter().product(),
        ArithmeticOp::Subtract => {
            let [a, b] = exactly::<2>(op, operands)?;
            a - b
        }
        ArithmeticOp::Divide => {
            let [a, b] = exactly::<2>(op, operands)?;
            if b == 0.0 {
                return Err(ComputeError::DivisionByZero);
            }
            a / b
        }
        ArithmeticOp::PercentOf => {
            let [base, percent] = exactly::<2>(op, operands)?;
            base * percent / 100.0
        }
        ArithmeticOp::PercentRatio => {
            let [part, whole] = exactly::<2>(op, operands)?;
            if whole == 0.0 {
                return Err(ComputeError::DivisionByZero);
            }
            part / whole * 100.0
        }
        ArithmeticOp::Power => {
            let [base, exponent] = exactly::<2>(op, operands)?;
            base.powf(exponent)
        }
        ArithmeticOp::Sqrt => {
            let [value] = exactly::<1>(op, operands)?;
            if value < 0.0 {
                return Err(ComputeError::InvalidOperands(format!(
                    "cannot take the square root of {value}"
                )));
            }
            value.sqrt()
        }
        ArithmeticOp::Min => at_least(op, operands, 1)?
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min),
        ArithmeticOp::Max => at_least(op, operands, 1)?
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max),
    };

    if !value.is_finite() {
        return Err(ComputeError::InvalidOperands(format!(
            "{op} produced a non-finite result"
        )));
    }
    Ok(value)
}

fn exactly<const N: usize>(op: ArithmeticOp, operands: &[f64]) -> Result<[f64; N], ComputeError> {
    <[f64; N]>::try_from(operands).map_err(|_| {
        ComputeError::InvalidOperands(format!(
            "{op} takes exactly {N} operand(s), got {}",
            operands.len()
        ))
    })
}

fn at_least(op: ArithmeticOp, operands: &[f64], min: usize) -> Result<&[f64], ComputeError> {
    if operands.len() < min {
        return Err(ComputeError::InvalidOperands(format!(
            "{op} takes at least {min} operand(s), got {}",
            operands.len()
        )));
    }
    Ok(operands)
}
