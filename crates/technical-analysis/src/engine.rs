use analysis_core::{
    BollingerBands, CoreError, HistoricalSeries, IndicatorSet, IndicatorWindows, MacdValue,
    Signal, SignalSummary, SmaValue, Vote,
};

use crate::indicators::*;

/// Computes the latest indicator readings and a rule-vote signal for a
/// daily series. Short series yield `None` for the affected indicators; only
/// an invalid window configuration is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct TechnicalAnalysisEngine;

impl TechnicalAnalysisEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn compute(
        &self,
        series: &HistoricalSeries,
        windows: &IndicatorWindows,
    ) -> Result<IndicatorSet, CoreError> {
        windows.validate()?;
        let closes = series.closes();

        let sma_values: Vec<SmaValue> = windows
            .sma
            .iter()
            .map(|&window| SmaValue {
                window,
                value: sma(&closes, window).last().copied(),
            })
            .collect();

        let bands = bollinger_bands(&closes, windows.bollinger, windows.bollinger_k);
        let bollinger = match (bands.lower.last(), bands.middle.last(), bands.upper.last()) {
            (Some(&lower), Some(&middle), Some(&upper)) => Some(BollingerBands {
                lower,
                middle,
                upper,
            }),
            _ => None,
        };

        let macd_series = macd(
            &closes,
            windows.macd_fast,
            windows.macd_slow,
            windows.macd_signal,
        );
        let macd_value = match (macd_series.macd_line.last(), macd_series.signal_line.last()) {
            (Some(&line), Some(&signal)) => Some(MacdValue::new(line, signal)),
            _ => None,
        };

        let rsi_value = rsi(&closes, windows.rsi).last().copied();

        let summary = summarize(
            closes.last().copied(),
            &sma_values,
            rsi_value,
            macd_value.as_ref(),
            windows,
        );

        if closes.len() < windows.macd_min_len() {
            tracing::debug!(
                "{}: {} closes, MACD needs {}",
                series.symbol,
                closes.len(),
                windows.macd_min_len()
            );
        }

        Ok(IndicatorSet {
            symbol: series.symbol.clone(),
            windows: windows.clone(),
            sma: sma_values,
            bollinger,
            macd: macd_value,
            rsi: rsi_value,
            summary,
        })
    }
}

/// One vote per available rule; missing indicators abstain. The direction
/// with strictly the most votes wins, anything else is `Hold`.
fn summarize(
    price: Option<f64>,
    sma_values: &[SmaValue],
    rsi_value: Option<f64>,
    macd_value: Option<&MacdValue>,
    windows: &IndicatorWindows,
) -> SignalSummary {
    let mut votes = Vec::new();

    if let (Some(price), Some(first)) = (price, sma_values.first()) {
        if let Some(average) = first.value {
            votes.push(Vote {
                rule: format!("price_vs_sma{}", first.window),
                direction: direction_of(price - average),
            });
        }
    }

    if let Some(rsi) = rsi_value {
        let direction = if rsi < windows.rsi_oversold {
            Signal::Buy
        } else if rsi > windows.rsi_overbought {
            Signal::Sell
        } else {
            Signal::Hold
        };
        votes.push(Vote {
            rule: format!("rsi{}", windows.rsi),
            direction,
        });
    }

    if let Some(macd) = macd_value {
        votes.push(Vote {
            rule: "macd_histogram".to_string(),
            direction: direction_of(macd.histogram),
        });
    }

    SignalSummary {
        signal: majority(&votes),
        votes,
    }
}

fn direction_of(difference: f64) -> Signal {
    if difference > 0.0 {
        Signal::Buy
    } else if difference < 0.0 {
        Signal::Sell
    } else {
        Signal::Hold
    }
}

fn majority(votes: &[Vote]) -> Signal {
    let count = |signal: Signal| votes.iter().filter(|v| v.direction == signal).count();
    let (buy, hold, sell) = (count(Signal::Buy), count(Signal::Hold), count(Signal::Sell));

    if buy > sell && buy > hold {
        Signal::Buy
    } else if sell > buy && sell > hold {
        Signal::Sell
    } else {
        Signal::Hold
    }
}
