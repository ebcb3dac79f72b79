//! Rule-based fundamental scoring: four pillar sub-scores, a weighted
//! composite, a moat tier, an earnings-based fair value and a recommendation.

mod ttm;

use analysis_core::stats::{mean, round_to, scale_to_score};
use analysis_core::{
    CoreError, FairValue, FairValueBasis, FundamentalInputs, Metric, MoatTier, Recommendation,
    ScoreCard, SubScores,
};
use serde::{Deserialize, Serialize};

pub use ttm::FromFinancials;

/// Linear scoring range: `worst` maps to 0 and `best` to 100. `best` may be
/// below `worst` for metrics where lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricRange {
    pub worst: f64,
    pub best: f64,
}

impl MetricRange {
    pub const fn new(worst: f64, best: f64) -> Self {
        Self { worst, best }
    }

    pub fn score(&self, value: f64) -> f64 {
        scale_to_score(value, self.worst, self.best)
    }

    /// Value reported for a metric that was not supplied.
    pub fn neutral(&self) -> f64 {
        (self.worst + self.best) / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PillarWeights {
    pub profitability: f64,
    pub growth: f64,
    pub leverage: f64,
    pub valuation: f64,
}

impl Default for PillarWeights {
    fn default() -> Self {
        Self {
            profitability: 0.30,
            growth: 0.25,
            leverage: 0.20,
            valuation: 0.25,
        }
    }
}

impl PillarWeights {
    fn total(&self) -> f64 {
        self.profitability + self.growth + self.leverage + self.valuation
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Sub-score used for a pillar whose metrics are all missing.
    pub neutral_baseline: f64,
    pub weights: PillarWeights,
    /// Net profit margin, percent.
    pub profit_margin: MetricRange,
    /// Return on equity, percent.
    pub return_on_equity: MetricRange,
    /// Year-over-year revenue growth, percent.
    pub revenue_growth: MetricRange,
    pub debt_to_equity: MetricRange,
    pub pe_ratio: MetricRange,
    /// Annual discount rate for the fair value estimate.
    pub discount_rate: f64,
    /// Earnings multiple applied to year-five EPS.
    pub terminal_multiple: f64,
    /// Growth assumed when revenue growth is unknown.
    pub default_growth: f64,
    pub min_growth: f64,
    pub max_growth: f64,
    pub strong_buy_at: f64,
    pub buy_at: f64,
    pub hold_at: f64,
    pub sell_at: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            neutral_baseline: 50.0,
            weights: PillarWeights::default(),
            profit_margin: MetricRange::new(-10.0, 30.0),
            return_on_equity: MetricRange::new(0.0, 30.0),
            revenue_growth: MetricRange::new(-20.0, 30.0),
            debt_to_equity: MetricRange::new(3.0, 0.0),
            pe_ratio: MetricRange::new(40.0, 10.0),
            discount_rate: 0.10,
            terminal_multiple: 15.0,
            default_growth: 0.03,
            min_growth: -0.05,
            max_growth: 0.25,
            strong_buy_at: 80.0,
            buy_at: 65.0,
            hold_at: 40.0,
            sell_at: 25.0,
        }
    }
}

impl ScoringConfig {
    pub fn with_neutral_baseline(mut self, baseline: f64) -> Self {
        self.neutral_baseline = baseline;
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if !(0.0..=100.0).contains(&self.neutral_baseline) {
            return Err(CoreError::InvalidInput(format!(
                "neutral baseline must be within [0, 100], got {}",
                self.neutral_baseline
            )));
        }
        let w = &self.weights;
        let weights = [w.profitability, w.growth, w.leverage, w.valuation];
        if weights.iter().any(|v| !v.is_finite() || *v < 0.0) || w.total() <= 0.0 {
            return Err(CoreError::InvalidInput(
                "pillar weights must be non-negative with a positive sum".to_string(),
            ));
        }
        if self.discount_rate <= -1.0 || self.min_growth > self.max_growth {
            return Err(CoreError::InvalidInput(
                "fair value parameters are inconsistent".to_string(),
            ));
        }
        if !(self.strong_buy_at >= self.buy_at
            && self.buy_at >= self.hold_at
            && self.hold_at >= self.sell_at)
        {
            return Err(CoreError::InvalidInput(
                "recommendation thresholds must be descending".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct FundamentalScoringEngine {
    config: ScoringConfig,
}

impl FundamentalScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score a (possibly incomplete) set of fundamentals. Missing metrics
    /// contribute the neutral baseline; non-finite metrics are rejected.
    pub fn score(&self, inputs: &FundamentalInputs) -> Result<ScoreCard, CoreError> {
        self.config.validate()?;
        check_finite(inputs)?;
        let cfg = &self.config;

        let profitability = self.pillar(&[
            inputs.profit_margin.map(|v| cfg.profit_margin.score(v)),
            inputs.return_on_equity.map(|v| cfg.return_on_equity.score(v)),
        ]);
        let growth = self.pillar(&[inputs.revenue_growth.map(|v| cfg.revenue_growth.score(v))]);
        let leverage = self.pillar(&[inputs.debt_to_equity.map(|v| {
            if v < 0.0 {
                // Negative equity
                0.0
            } else {
                cfg.debt_to_equity.score(v)
            }
        })]);
        let valuation = self.pillar(&[self.valuation_score(inputs)]);

        let sub_scores = SubScores {
            profitability,
            growth,
            leverage,
            valuation,
        };
        let quality_score = self.composite(&sub_scores);

        Ok(ScoreCard {
            symbol: inputs.symbol.clone(),
            profit_margin: metric(inputs.profit_margin, &cfg.profit_margin),
            revenue_growth: metric(inputs.revenue_growth, &cfg.revenue_growth),
            debt_ratio: metric(inputs.debt_to_equity, &cfg.debt_to_equity),
            sub_scores,
            quality_score,
            moat: self.moat(profitability, inputs),
            fair_value: self.fair_value(inputs),
            recommendation: self.recommend(quality_score),
        })
    }

    fn pillar(&self, scores: &[Option<f64>]) -> f64 {
        let present: Vec<f64> = scores.iter().flatten().copied().collect();
        mean(&present).unwrap_or(self.config.neutral_baseline)
    }

    /// P/E as supplied, else price over EPS.
    fn valuation_score(&self, inputs: &FundamentalInputs) -> Option<f64> {
        let pe = match (inputs.pe_ratio, inputs.price, inputs.eps) {
            (Some(pe), _, _) => pe,
            (None, Some(price), Some(eps)) if price > 0.0 => price / eps,
            _ => return None,
        };
        // Loss-making: no earnings to pay for
        if pe <= 0.0 {
            Some(0.0)
        } else {
            Some(self.config.pe_ratio.score(pe))
        }
    }

    fn composite(&self, s: &SubScores) -> f64 {
        let w = &self.config.weights;
        let weighted = s.profitability * w.profitability
            + s.growth * w.growth
            + s.leverage * w.leverage
            + s.valuation * w.valuation;
        round_to((weighted / w.total()).clamp(0.0, 100.0), 2)
    }

    fn moat(&self, profitability: f64, inputs: &FundamentalInputs) -> MoatTier {
        if inputs.profit_margin.is_none() && inputs.return_on_equity.is_none() {
            return MoatTier::Unrated;
        }
        let roe = inputs.return_on_equity;
        if profitability >= 70.0 && roe.map_or(false, |r| r >= 15.0) {
            MoatTier::Wide
        } else if profitability >= 55.0 && roe.map_or(true, |r| r >= 10.0) {
            MoatTier::Narrow
        } else {
            MoatTier::None
        }
    }

    /// EPS grown for five years at clamped revenue growth, capitalized at the
    /// terminal multiple and discounted back.
    fn fair_value(&self, inputs: &FundamentalInputs) -> FairValue {
        let cfg = &self.config;
        let price = inputs.price.filter(|p| *p > 0.0);
        let eps = inputs.eps.or_else(|| match (price, inputs.pe_ratio) {
            (Some(p), Some(pe)) if pe > 0.0 => Some(p / pe),
            _ => None,
        });

        match eps {
            Some(eps) if eps > 0.0 => {
                let growth = inputs
                    .revenue_growth
                    .map(|g| (g / 100.0).clamp(cfg.min_growth, cfg.max_growth))
                    .unwrap_or(cfg.default_growth);
                let year_five = eps * (1.0 + growth).powi(5);
                let value = year_five * cfg.terminal_multiple / (1.0 + cfg.discount_rate).powi(5);
                FairValue {
                    value: round_to(value, 2),
                    basis: FairValueBasis::Earnings,
                }
            }
            _ => match price {
                Some(p) => FairValue {
                    value: p,
                    basis: FairValueBasis::MarketPrice,
                },
                None => FairValue {
                    value: 0.0,
                    basis: FairValueBasis::Unavailable,
                },
            },
        }
    }

    fn recommend(&self, score: f64) -> Recommendation {
        let cfg = &self.config;
        if score >= cfg.strong_buy_at {
            Recommendation::StrongBuy
        } else if score >= cfg.buy_at {
            Recommendation::Buy
        } else if score >= cfg.hold_at {
            Recommendation::Hold
        } else if score >= cfg.sell_at {
            Recommendation::Sell
        } else {
            Recommendation::StrongSell
        }
    }
}

impl Default for FundamentalScoringEngine {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

fn metric(value: Option<f64>, range: &MetricRange) -> Metric {
    match value {
        Some(v) => Metric::observed(v),
        None => Metric::defaulted(range.neutral()),
    }
}

fn check_finite(inputs: &FundamentalInputs) -> Result<(), CoreError> {
    let fields = [
        ("profit_margin", inputs.profit_margin),
        ("revenue_growth", inputs.revenue_growth),
        ("debt_to_equity", inputs.debt_to_equity),
        ("return_on_equity", inputs.return_on_equity),
        ("eps", inputs.eps),
        ("price", inputs.price),
        ("pe_ratio", inputs.pe_ratio),
    ];
    for (name, value) in fields {
        if let Some(v) = value {
            if !v.is_finite() {
                return Err(CoreError::InvalidInput(format!(
                    "{} for {} is not a finite number",
                    name, inputs.symbol
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strong_company() -> FundamentalInputs {
        FundamentalInputs {
            symbol: "EXMP".to_string(),
            profit_margin: Some(28.0),
            revenue_growth: Some(22.0),
            debt_to_equity: Some(0.3),
            return_on_equity: Some(32.0),
            eps: Some(6.0),
            price: Some(120.0),
            pe_ratio: None,
        }
    }

    #[test]
    fn test_empty_inputs_score_exactly_neutral() {
        let engine = FundamentalScoringEngine::default();
        let card = engine
            .score(&FundamentalInputs {
                symbol: "EXMP".to_string(),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(card.quality_score, 50.0);
        assert_eq!(card.sub_scores.profitability, 50.0);
        assert_eq!(card.sub_scores.valuation, 50.0);
        assert!(card.profit_margin.defaulted);
        assert!(card.revenue_growth.defaulted);
        assert!(card.debt_ratio.defaulted);
        assert_eq!(card.moat, MoatTier::Unrated);
        assert_eq!(card.fair_value.basis, FairValueBasis::Unavailable);
        assert_eq!(card.fair_value.value, 0.0);
        assert_eq!(card.recommendation, Recommendation::Hold);
    }

    #[test]
    fn test_configured_baseline_is_used() {
        let engine = FundamentalScoringEngine::new(ScoringConfig::default().with_neutral_baseline(40.0));
        let card = engine.score(&FundamentalInputs::default()).unwrap();
        assert_eq!(card.quality_score, 40.0);
    }

    #[test]
    fn test_strong_company_scores_high() {
        let card = FundamentalScoringEngine::default()
            .score(&strong_company())
            .unwrap();

        assert!(card.quality_score >= 80.0, "score {}", card.quality_score);
        assert_eq!(card.recommendation, Recommendation::StrongBuy);
        assert_eq!(card.moat, MoatTier::Wide);
        assert!(!card.profit_margin.defaulted);
        assert_eq!(card.profit_margin.value, 28.0);
        assert_eq!(card.fair_value.basis, FairValueBasis::Earnings);
    }

    #[test]
    fn test_weak_company_scores_low() {
        let card = FundamentalScoringEngine::default()
            .score(&FundamentalInputs {
                symbol: "WEAK".to_string(),
                profit_margin: Some(-15.0),
                revenue_growth: Some(-25.0),
                debt_to_equity: Some(4.0),
                return_on_equity: Some(-5.0),
                eps: Some(-1.2),
                price: Some(8.0),
                pe_ratio: None,
            })
            .unwrap();

        assert_eq!(card.quality_score, 0.0);
        assert_eq!(card.recommendation, Recommendation::StrongSell);
        assert_eq!(card.moat, MoatTier::None);
        assert_eq!(card.fair_value.basis, FairValueBasis::MarketPrice);
        assert_eq!(card.fair_value.value, 8.0);
    }

    #[test]
    fn test_missing_pillar_is_neutral_not_punitive() {
        let mut inputs = strong_company();
        inputs.revenue_growth = None;
        let card = FundamentalScoringEngine::default().score(&inputs).unwrap();
        assert_eq!(card.sub_scores.growth, 50.0);
        assert!(card.revenue_growth.defaulted);
        assert_eq!(card.revenue_growth.value, 5.0);
    }

    #[test]
    fn test_fair_value_is_deterministic() {
        let engine = FundamentalScoringEngine::default();
        let inputs = FundamentalInputs {
            symbol: "EXMP".to_string(),
            eps: Some(2.0),
            revenue_growth: Some(10.0),
            ..Default::default()
        };
        let card = engine.score(&inputs).unwrap();

        let expected = 2.0 * 1.1f64.powi(5) * 15.0 / 1.1f64.powi(5);
        assert!((card.fair_value.value - expected).abs() < 0.01);
        assert_eq!(card, engine.score(&inputs).unwrap());
    }

    #[test]
    fn test_fair_value_growth_is_clamped() {
        let engine = FundamentalScoringEngine::default();
        let hyper = FundamentalInputs {
            eps: Some(1.0),
            revenue_growth: Some(300.0),
            ..Default::default()
        };
        let capped = FundamentalInputs {
            eps: Some(1.0),
            revenue_growth: Some(25.0),
            ..Default::default()
        };
        assert_eq!(
            engine.score(&hyper).unwrap().fair_value.value,
            engine.score(&capped).unwrap().fair_value.value
        );
    }

    #[test]
    fn test_eps_derived_from_pe_for_fair_value() {
        let card = FundamentalScoringEngine::default()
            .score(&FundamentalInputs {
                price: Some(100.0),
                pe_ratio: Some(20.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(card.fair_value.basis, FairValueBasis::Earnings);
        assert!((card.sub_scores.valuation - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let mut inputs = strong_company();
        inputs.pe_ratio = Some(f64::NAN);
        assert!(matches!(
            FundamentalScoringEngine::default().score(&inputs),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_recommendation_thresholds() {
        let engine = FundamentalScoringEngine::default();
        assert_eq!(engine.recommend(80.0), Recommendation::StrongBuy);
        assert_eq!(engine.recommend(79.99), Recommendation::Buy);
        assert_eq!(engine.recommend(65.0), Recommendation::Buy);
        assert_eq!(engine.recommend(50.0), Recommendation::Hold);
        assert_eq!(engine.recommend(40.0), Recommendation::Hold);
        assert_eq!(engine.recommend(30.0), Recommendation::Sell);
        assert_eq!(engine.recommend(10.0), Recommendation::StrongSell);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ScoringConfig {
            weights: PillarWeights {
                profitability: 0.0,
                growth: 0.0,
                leverage: 0.0,
                valuation: 0.0,
            },
            ..Default::default()
        };
        assert!(FundamentalScoringEngine::new(config)
            .score(&FundamentalInputs::default())
            .is_err());
    }
}
