use std::fmt::{Display, Formatter};

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::CoreError;

const MAX_SYMBOL_LEN: usize = 15;

/// Normalized, upper-cased ticker symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse and normalize a ticker. Index tickers may start with `^`.
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidInput("symbol must not be empty".to_string()));
        }

        let normalized = trimmed.to_ascii_uppercase();
        let len = normalized.chars().count();
        if len > MAX_SYMBOL_LEN {
            return Err(CoreError::InvalidInput(format!(
                "symbol '{}' is {} characters, max is {}",
                normalized, len, MAX_SYMBOL_LEN
            )));
        }

        for (index, ch) in normalized.chars().enumerate() {
            let valid = if index == 0 {
                ch.is_ascii_alphabetic() || ch == '^'
            } else {
                ch.is_ascii_alphanumeric() || ch == '.' || ch == '-'
            };
            if !valid {
                return Err(CoreError::InvalidInput(format!(
                    "symbol '{}' has invalid character '{}' at position {}",
                    normalized, ch, index
                )));
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Symbol {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

/// Where a resolved record's numbers came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Live,
    Cached,
    Synthetic,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Live => "live",
            Provenance::Cached => "cached",
            Provenance::Synthetic => "synthetic",
        }
    }
}

impl Display for Provenance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broad-market reference point shown next to every quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub symbol: String,
    pub value: f64,
    pub change_percent: f64,
}

/// Canonical, fully populated market snapshot for one symbol.
///
/// Every numeric field is a finite number. Consumers never need existence
/// checks; data quality is signalled through `provenance` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRecord {
    pub symbol: Symbol,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub day_high: f64,
    pub day_low: f64,
    pub volume: f64,
    pub market_cap: f64,
    pub index: IndexSnapshot,
    pub resolved_at: DateTime<Utc>,
    pub provenance: Provenance,
}

impl MarketRecord {
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Previous session close implied by price and change.
    pub fn previous_close(&self) -> f64 {
        self.price - self.change
    }

    /// Structural completeness check: finite numbers, positive price, day range
    /// containing the price, non-negative volume and market cap.
    pub fn is_well_formed(&self) -> bool {
        let numbers = [
            self.price,
            self.change,
            self.change_percent,
            self.day_high,
            self.day_low,
            self.volume,
            self.market_cap,
            self.index.value,
            self.index.change_percent,
        ];
        numbers.iter().all(|v| v.is_finite())
            && self.price > 0.0
            && self.day_low <= self.price
            && self.price <= self.day_high
            && self.volume >= 0.0
            && self.market_cap >= 0.0
    }
}

/// OHLCV bar data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    fn is_finite(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Flat bar repeating `close` at a new timestamp, used to fill gaps.
    fn carried_forward(&self, timestamp: DateTime<Utc>) -> Self {
        Bar {
            timestamp,
            open: self.close,
            high: self.close,
            low: self.close,
            close: self.close,
            volume: 0.0,
        }
    }
}

/// Ordered daily price history for one symbol.
///
/// Timestamps are strictly increasing. Missing weekdays between two known
/// bars are filled by carrying the last close forward with zero volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSeries {
    pub symbol: Symbol,
    pub provenance: Provenance,
    bars: Vec<Bar>,
}

impl HistoricalSeries {
    pub fn daily(symbol: Symbol, mut bars: Vec<Bar>, provenance: Provenance) -> Self {
        bars.retain(Bar::is_finite);
        bars.sort_by_key(|b| b.timestamp);
        // Keep the last print for a duplicated timestamp
        let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(prev) if prev.timestamp == bar.timestamp => *prev = bar,
                _ => deduped.push(bar),
            }
        }

        let mut filled: Vec<Bar> = Vec::with_capacity(deduped.len());
        for bar in deduped {
            if let Some(prev) = filled.last().cloned() {
                let mut day = prev.timestamp + Duration::days(1);
                while day.date_naive() < bar.timestamp.date_naive() {
                    if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
                        filled.push(prev.carried_forward(day));
                    }
                    day += Duration::days(1);
                }
            }
            filled.push(bar);
        }

        Self {
            symbol,
            provenance,
            bars: filled,
        }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }
}

/// Company financials for one fiscal quarter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Financials {
    pub symbol: String,
    pub fiscal_period: String,
    pub fiscal_year: i32,
    pub revenue: Option<f64>,
    pub net_income: Option<f64>,
    pub eps: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub shareholders_equity: Option<f64>,
}
