//! Market aggregate types and upstream payload sanitisation.
//!
//! Upstream serves per-item statistics as JSON where numbers arrive
//! either as JSON numbers or as numeric strings, and missing data
//! arrives as empty strings. Sanitisation happens once, here, when a
//! raw payload is turned into a [`PriceAggregate`]: after that point
//! every value is a real `f64` or absent. An empty string is never
//! interpreted as zero.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::KaupangError;

/// One side of the order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Bids.
    Buy,
    /// Asks.
    Sell,
}

impl Side {
    /// Stable lowercase name, matching the upstream payload keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = KaupangError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            other => Err(KaupangError::InvalidInput(format!(
                "unknown side '{other}'"
            ))),
        }
    }
}

/// Statistical fields available on each side of an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PriceField {
    Min,
    Max,
    Avg,
    Median,
    Volume,
    WeightedAverage,
    OrderCount,
    FivePercent,
}

impl PriceField {
    /// Field name as it appears in upstream payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceField::Min => "min",
            PriceField::Max => "max",
            PriceField::Avg => "avg",
            PriceField::Median => "median",
            PriceField::Volume => "volume",
            PriceField::WeightedAverage => "weightedAverage",
            PriceField::OrderCount => "orderCount",
            PriceField::FivePercent => "fivePercent",
        }
    }
}

impl fmt::Display for PriceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceField {
    type Err = KaupangError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "min" => Ok(PriceField::Min),
            "max" => Ok(PriceField::Max),
            "avg" => Ok(PriceField::Avg),
            "median" => Ok(PriceField::Median),
            "volume" => Ok(PriceField::Volume),
            "weightedaverage" => Ok(PriceField::WeightedAverage),
            "ordercount" => Ok(PriceField::OrderCount),
            "fivepercent" => Ok(PriceField::FivePercent),
            other => Err(KaupangError::InvalidInput(format!(
                "unknown price field '{other}'"
            ))),
        }
    }
}

/// Sanitised statistics for one side of the order book.
///
/// `None` means upstream had no value for that field. It is distinct
/// from `Some(0.0)`, which means a genuine zero (e.g. an order count
/// of zero reported as the number `0`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SideAggregate {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub median: Option<f64>,
    pub volume: Option<f64>,
    pub weighted_average: Option<f64>,
    pub order_count: Option<f64>,
    pub five_percent: Option<f64>,
}

impl SideAggregate {
    /// Select one statistic.
    pub fn field(&self, field: PriceField) -> Option<f64> {
        match field {
            PriceField::Min => self.min,
            PriceField::Max => self.max,
            PriceField::Avg => self.avg,
            PriceField::Median => self.median,
            PriceField::Volume => self.volume,
            PriceField::WeightedAverage => self.weighted_average,
            PriceField::OrderCount => self.order_count,
            PriceField::FivePercent => self.five_percent,
        }
    }

    /// Whether every field is absent.
    pub fn is_empty(&self) -> bool {
        self.min.is_none()
            && self.max.is_none()
            && self.avg.is_none()
            && self.median.is_none()
            && self.volume.is_none()
            && self.weighted_average.is_none()
            && self.order_count.is_none()
            && self.five_percent.is_none()
    }

    /// Sanitise one raw side object.
    ///
    /// Anything that is not an object yields an all-absent side. The
    /// `avg` field falls back to `weightedAverage` when upstream omits
    /// it, since several upstream variants only serve the latter.
    fn from_raw(raw: Option<&Value>) -> Self {
        let Some(Value::Object(map)) = raw else {
            return Self::default();
        };
        let mut side = Self {
            min: coerce_number(map.get("min")),
            max: coerce_number(map.get("max")),
            avg: coerce_number(map.get("avg")),
            median: coerce_number(map.get("median")),
            volume: coerce_number(map.get("volume")),
            weighted_average: coerce_number(map.get("weightedAverage")),
            order_count: coerce_number(map.get("orderCount")),
            five_percent: coerce_number(map.get("fivePercent")),
        };
        if side.avg.is_none() {
            side.avg = side.weighted_average;
        }
        side
    }
}

/// Sanitised buy/sell statistics for one item at one location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceAggregate {
    /// Bid-side statistics.
    pub buy: SideAggregate,
    /// Ask-side statistics.
    pub sell: SideAggregate,
}

impl PriceAggregate {
    /// Borrow one side.
    pub fn side(&self, side: Side) -> &SideAggregate {
        match side {
            Side::Buy => &self.buy,
            Side::Sell => &self.sell,
        }
    }

    /// Select one statistic from one side.
    pub fn value(&self, side: Side, field: PriceField) -> Option<f64> {
        self.side(side).field(field)
    }

    /// Whether both sides are entirely absent.
    ///
    /// An all-empty aggregate is treated as upstream confirming the
    /// item has no market data, and is cached negatively rather than
    /// as a hit.
    pub fn is_empty(&self) -> bool {
        self.buy.is_empty() && self.sell.is_empty()
    }

    /// Sanitise one raw per-item payload entry.
    pub fn from_raw(raw: &Value) -> Self {
        Self {
            buy: SideAggregate::from_raw(raw.get("buy")),
            sell: SideAggregate::from_raw(raw.get("sell")),
        }
    }
}

/// Coerce an upstream JSON value into a finite number.
///
/// Accepts JSON numbers and numeric strings. Empty and whitespace-only
/// strings, non-numeric strings, and non-finite parses all yield
/// `None` rather than a fabricated zero.
pub(crate) fn coerce_number(raw: Option<&Value>) -> Option<f64> {
    match raw? {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}
