//! Blends price momentum with optional textual polarity into a bounded
//! sentiment score.

mod lexicon;

use analysis_core::{
    CoreError, MarketRecord, SentimentComponents, SentimentLabel, SentimentScore, Symbol,
};

pub use lexicon::LexiconPolarity;

/// Daily change percent that maps to a momentum of tanh(1) ~ 0.76.
const MOMENTUM_SCALE_PERCENT: f64 = 5.0;

/// Momentum in (-1, 1) from the record's daily change.
pub fn momentum_from_record(record: &MarketRecord) -> f64 {
    (record.change_percent / MOMENTUM_SCALE_PERCENT).tanh()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentimentConfig {
    pub momentum_weight: f64,
    pub polarity_weight: f64,
    /// Weight applied to momentum when there is no polarity.
    pub momentum_only_weight: f64,
    pub momentum_only_confidence: f64,
    pub positive_above: f64,
    pub negative_below: f64,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            momentum_weight: 0.4,
            polarity_weight: 0.6,
            momentum_only_weight: 0.5,
            momentum_only_confidence: 0.5,
            positive_above: 0.15,
            negative_below: -0.15,
        }
    }
}

pub struct SentimentAggregator {
    config: SentimentConfig,
}

impl SentimentAggregator {
    pub fn new(config: SentimentConfig) -> Self {
        Self { config }
    }

    /// Combine momentum and (optional) polarity, both in [-1, 1].
    ///
    /// Without polarity the momentum is damped and confidence reduced rather
    /// than blending an implicit zero at full weight.
    pub fn aggregate(
        &self,
        symbol: &Symbol,
        momentum: f64,
        polarity: Option<f64>,
    ) -> Result<SentimentScore, CoreError> {
        if !momentum.is_finite() {
            return Err(CoreError::InvalidInput(format!(
                "momentum for {} is not a finite number",
                symbol
            )));
        }
        let momentum = momentum.clamp(-1.0, 1.0);

        let polarity = match polarity {
            Some(p) if !p.is_finite() => {
                tracing::warn!("Ignoring non-finite polarity for {}", symbol);
                None
            }
            other => other.map(|p| p.clamp(-1.0, 1.0)),
        };

        let cfg = &self.config;
        let (score, components) = match polarity {
            Some(p) => (
                cfg.momentum_weight * momentum + cfg.polarity_weight * p,
                SentimentComponents {
                    momentum,
                    polarity: Some(p),
                    momentum_weight: cfg.momentum_weight,
                    polarity_weight: cfg.polarity_weight,
                    confidence: 1.0,
                },
            ),
            None => (
                cfg.momentum_only_weight * momentum,
                SentimentComponents {
                    momentum,
                    polarity: None,
                    momentum_weight: cfg.momentum_only_weight,
                    polarity_weight: 0.0,
                    confidence: cfg.momentum_only_confidence,
                },
            ),
        };
        let score = score.clamp(-1.0, 1.0);

        Ok(SentimentScore {
            symbol: symbol.clone(),
            score,
            label: self.label(score),
            components,
        })
    }

    fn label(&self, score: f64) -> SentimentLabel {
        if score > self.config.positive_above {
            SentimentLabel::Positive
        } else if score < self.config.negative_below {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

impl Default for SentimentAggregator {
    fn default() -> Self {
        Self::new(SentimentConfig::default())
    }
}
