use serde::{Deserialize, Serialize};

use crate::{CoreError, Symbol};

// ---------------------------------------------------------------------------
// Technical indicators
// ---------------------------------------------------------------------------

/// Window parameters for the technical indicator engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorWindows {
    pub sma: Vec<usize>,
    pub bollinger: usize,
    pub bollinger_k: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub rsi: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
}

impl Default for IndicatorWindows {
    fn default() -> Self {
        Self {
            sma: vec![20, 50],
            bollinger: 20,
            bollinger_k: 2.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            rsi: 14,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
        }
    }
}

impl IndicatorWindows {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.sma.iter().any(|&w| w == 0) {
            return Err(CoreError::InvalidInput("SMA windows must be positive".to_string()));
        }
        if self.bollinger == 0 || self.rsi == 0 {
            return Err(CoreError::InvalidInput(
                "Bollinger and RSI windows must be positive".to_string(),
            ));
        }
        if !self.bollinger_k.is_finite() || self.bollinger_k < 0.0 {
            return Err(CoreError::InvalidInput(
                "Bollinger k must be a non-negative number".to_string(),
            ));
        }
        if self.macd_fast == 0 || self.macd_signal == 0 || self.macd_fast >= self.macd_slow {
            return Err(CoreError::InvalidInput(format!(
                "MACD windows must satisfy 0 < fast < slow and signal > 0 (got {}/{}/{})",
                self.macd_fast, self.macd_slow, self.macd_signal
            )));
        }
        if !(0.0..=100.0).contains(&self.rsi_oversold)
            || !(0.0..=100.0).contains(&self.rsi_overbought)
            || self.rsi_oversold >= self.rsi_overbought
        {
            return Err(CoreError::InvalidInput(
                "RSI thresholds must satisfy 0 <= oversold < overbought <= 100".to_string(),
            ));
        }
        Ok(())
    }

    /// Minimum number of closes the MACD signal line needs.
    pub fn macd_min_len(&self) -> usize {
        self.macd_slow + self.macd_signal - 1
    }

    /// Minimum number of closes RSI needs (one more than its change window).
    pub fn rsi_min_len(&self) -> usize {
        self.rsi + 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmaValue {
    pub window: usize,
    /// `None` when the series is shorter than `window`.
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BollingerBands {
    pub lower: f64,
    pub middle: f64,
    pub upper: f64,
}

/// Latest MACD reading. Always three named values, never a positional pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

impl MacdValue {
    pub fn new(macd: f64, signal: f64) -> Self {
        Self {
            macd,
            signal,
            histogram: macd - signal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Hold,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub rule: String,
    pub direction: Signal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSummary {
    pub signal: Signal,
    pub votes: Vec<Vote>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub symbol: Symbol,
    pub windows: IndicatorWindows,
    pub sma: Vec<SmaValue>,
    pub bollinger: Option<BollingerBands>,
    pub macd: Option<MacdValue>,
    pub rsi: Option<f64>,
    pub summary: SignalSummary,
}

// ---------------------------------------------------------------------------
// Fundamentals
// ---------------------------------------------------------------------------

/// Raw fundamental metrics; any of them may be unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalInputs {
    pub symbol: String,
    /// Net profit margin, percent.
    pub profit_margin: Option<f64>,
    /// Year-over-year revenue growth, percent.
    pub revenue_growth: Option<f64>,
    pub debt_to_equity: Option<f64>,
    /// Return on equity, percent.
    pub return_on_equity: Option<f64>,
    pub eps: Option<f64>,
    pub price: Option<f64>,
    pub pe_ratio: Option<f64>,
}

/// A metric value together with whether it was defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub value: f64,
    pub defaulted: bool,
}

impl Metric {
    pub fn observed(value: f64) -> Self {
        Self {
            value,
            defaulted: false,
        }
    }

    pub fn defaulted(value: f64) -> Self {
        Self {
            value,
            defaulted: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub profitability: f64,
    pub growth: f64,
    pub leverage: f64,
    pub valuation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoatTier {
    Wide,
    Narrow,
    None,
    Unrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FairValueBasis {
    Earnings,
    MarketPrice,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FairValue {
    pub value: f64,
    pub basis: FairValueBasis,
}

/// Recommendation tier derived from a composite score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Recommendation {
    /// Human-readable label for the tier
    pub fn to_label(&self) -> &'static str {
        match self {
            Recommendation::StrongBuy => "Strong Buy",
            Recommendation::Buy => "Buy",
            Recommendation::Hold => "Hold",
            Recommendation::Sell => "Sell",
            Recommendation::StrongSell => "Strong Sell",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub symbol: String,
    pub profit_margin: Metric,
    pub revenue_growth: Metric,
    pub debt_ratio: Metric,
    pub sub_scores: SubScores,
    /// Composite quality score, 0-100.
    pub quality_score: f64,
    pub moat: MoatTier,
    pub fair_value: FairValue,
    pub recommendation: Recommendation,
}

// ---------------------------------------------------------------------------
// Sentiment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Negative,
    Neutral,
    Positive,
}

/// What went into a sentiment score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentComponents {
    pub momentum: f64,
    pub polarity: Option<f64>,
    pub momentum_weight: f64,
    pub polarity_weight: f64,
    /// 1.0 when both inputs were present, reduced otherwise.
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    pub symbol: Symbol,
    /// Bounded to [-1, 1].
    pub score: f64,
    pub label: SentimentLabel,
    pub components: SentimentComponents,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_windows_are_valid() {
        let windows = IndicatorWindows::default();
        assert!(windows.validate().is_ok());
        assert_eq!(windows.macd_min_len(), 34);
        assert_eq!(windows.rsi_min_len(), 15);
    }

    #[test]
    fn test_invalid_windows_rejected() {
        let windows = IndicatorWindows {
            macd_fast: 26,
            macd_slow: 12,
            ..IndicatorWindows::default()
        };
        assert!(matches!(windows.validate(), Err(CoreError::InvalidInput(_))));

        let windows = IndicatorWindows {
            sma: vec![0],
            ..IndicatorWindows::default()
        };
        assert!(windows.validate().is_err());

        let windows = IndicatorWindows {
            rsi_oversold: 80.0,
            rsi_overbought: 70.0,
            ..IndicatorWindows::default()
        };
        assert!(windows.validate().is_err());
    }

    #[test]
    fn test_macd_value_histogram() {
        let value = MacdValue::new(1.25, 0.75);
        assert_eq!(value.macd - value.signal, value.histogram);
    }

    #[test]
    fn test_enums_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Signal::Buy).unwrap(), "\"buy\"");
        assert_eq!(
            serde_json::to_string(&Recommendation::StrongSell).unwrap(),
            "\"strong_sell\""
        );
        assert_eq!(
            serde_json::to_string(&FairValueBasis::MarketPrice).unwrap(),
            "\"market_price\""
        );
    }
}
