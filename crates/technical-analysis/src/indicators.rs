//! Indicator series over closing prices.
//!
//! Every function returns the indicator for each position where it is
//! defined, oldest first; an empty vector means the input was too short.

use analysis_core::stats::{mean, population_std_dev};

/// Simple Moving Average. `result[0]` covers `data[..period]`.
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let mut result = Vec::with_capacity(data.len() - period + 1);
    let mut sum: f64 = data[..period].iter().sum();
    result.push(sum / period as f64);
    for i in period..data.len() {
        sum += data[i] - data[i - period];
        result.push(sum / period as f64);
    }
    result
}

/// Exponential Moving Average seeded with the SMA of the first `period`
/// values. `result[0]` corresponds to `data[period - 1]`.
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut result = Vec::with_capacity(data.len() - period + 1);
    let mut current = data[..period].iter().sum::<f64>() / period as f64;
    result.push(current);

    for &value in &data[period..] {
        current = (value - current) * multiplier + current;
        result.push(current);
    }
    result
}

/// Relative Strength Index with Wilder smoothing.
///
/// The first value uses the plain average gain and loss of the first
/// `period` changes, so `period + 1` closes are needed. `result[0]`
/// corresponds to `data[period]`.
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period + 1 {
        return vec![];
    }

    let (gains, losses): (Vec<f64>, Vec<f64>) = data
        .windows(2)
        .map(|w| {
            let change = w[1] - w[0];
            (change.max(0.0), (-change).max(0.0))
        })
        .unzip();

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    let mut rsi_values = Vec::with_capacity(gains.len() - period + 1);
    rsi_values.push(rsi_from_averages(avg_gain, avg_loss));

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        rsi_values.push(rsi_from_averages(avg_gain, avg_loss));
    }

    rsi_values
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}

/// MACD (Moving Average Convergence Divergence)
///
/// `macd_line[0]` corresponds to `data[slow - 1]`; `signal_line` and
/// `histogram` start `signal - 1` values later.
#[derive(Debug, Clone, Default)]
pub struct MacdSeries {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(data: &[f64], fast_period: usize, slow_period: usize, signal_period: usize) -> MacdSeries {
    if fast_period == 0 || signal_period == 0 || slow_period <= fast_period {
        return MacdSeries::default();
    }

    let ema_fast = ema(data, fast_period);
    let ema_slow = ema(data, slow_period);
    if ema_slow.is_empty() {
        return MacdSeries::default();
    }

    // ema_fast starts slow - fast positions before ema_slow
    let offset = slow_period - fast_period;
    let macd_line: Vec<f64> = ema_slow
        .iter()
        .enumerate()
        .map(|(i, slow)| ema_fast[i + offset] - slow)
        .collect();

    let signal_line = ema(&macd_line, signal_period);
    let hist_offset = macd_line.len() - signal_line.len();
    let histogram = signal_line
        .iter()
        .enumerate()
        .map(|(i, signal)| macd_line[i + hist_offset] - signal)
        .collect();

    MacdSeries {
        macd_line,
        signal_line,
        histogram,
    }
}

/// Bollinger Bands over population standard deviation.
#[derive(Debug, Clone, Default)]
pub struct BandSeries {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger_bands(data: &[f64], period: usize, k: f64) -> BandSeries {
    if period == 0 || data.len() < period {
        return BandSeries::default();
    }

    let mut bands = BandSeries::default();
    for window in data.windows(period) {
        let (Some(middle), Some(std)) = (mean(window), population_std_dev(window)) else {
            continue;
        };
        bands.upper.push(middle + k * std);
        bands.middle.push(middle);
        bands.lower.push(middle - k * std);
    }
    bands
}
