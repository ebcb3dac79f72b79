//! Deterministic stand-in market data for when every provider is down.
//!
//! Output is a pure function of (symbol, time bucket): the same symbol asked
//! for repeatedly during an outage gets the same numbers until the bucket
//! rolls over. Nothing here touches the network, the disk, or the host's
//! ambient random source.

mod profile;

use std::time::Duration;

use analysis_core::stats::round_to;
use analysis_core::{Bar, HistoricalSeries, IndexSnapshot, MarketRecord, Provenance, Symbol};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc, Weekday};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

pub use profile::SymbolClass;

#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    /// Length of the time bucket within which output is stable.
    pub bucket: Duration,
    /// Symbol used for the reference index snapshot.
    pub index_symbol: String,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            bucket: Duration::from_secs(3600),
            index_symbol: "SPY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FallbackSynthesizer {
    config: SynthesizerConfig,
}

impl FallbackSynthesizer {
    pub fn new(config: SynthesizerConfig) -> Self {
        Self { config }
    }

    /// Symbol whose quote stands in for the market index.
    pub fn index_symbol(&self) -> &str {
        &self.config.index_symbol
    }

    fn bucket_secs(&self) -> i64 {
        self.config.bucket.as_secs().max(1) as i64
    }

    /// Index of the bucket containing `at`.
    pub fn bucket_index(&self, at: DateTime<Utc>) -> i64 {
        at.timestamp().div_euclid(self.bucket_secs())
    }

    /// Start of the bucket containing `at`. Synthesized records carry it as
    /// `resolved_at` so two calls in one bucket return identical records;
    /// the resolver restamps records it serves with the real time.
    pub fn bucket_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        DateTime::from_timestamp(self.bucket_index(at) * self.bucket_secs(), 0).unwrap_or(at)
    }

    /// Full synthetic record for `symbol` as of `at`.
    pub fn synthesize(&self, symbol: &Symbol, at: DateTime<Utc>) -> MarketRecord {
        let bucket = self.bucket_index(at);
        let quote = self.quote(symbol.as_str(), bucket);

        MarketRecord {
            symbol: symbol.clone(),
            price: quote.price,
            change: quote.change,
            change_percent: quote.change_percent,
            day_high: quote.day_high,
            day_low: quote.day_low,
            volume: quote.volume,
            market_cap: quote.market_cap,
            index: self.index_for_bucket(bucket),
            resolved_at: self.bucket_start(at),
            provenance: Provenance::Synthetic,
        }
    }

    /// Synthetic reference index snapshot as of `at`.
    pub fn synthesize_index(&self, at: DateTime<Utc>) -> IndexSnapshot {
        self.index_for_bucket(self.bucket_index(at))
    }

    /// Weekday-only daily history of `days` bars ending at the synthesized
    /// price for `at`.
    pub fn synthesize_series(
        &self,
        symbol: &Symbol,
        days: usize,
        at: DateTime<Utc>,
    ) -> HistoricalSeries {
        let bucket = self.bucket_index(at);
        let last_close = self.quote(symbol.as_str(), bucket).price;
        let class = SymbolClass::of(symbol.as_str());
        let mut rng = seeded_rng(symbol.as_str(), "series", bucket);

        // Walk backwards from the final close so the series agrees with the quote
        let mut closes = vec![last_close; days];
        for i in (1..days).rev() {
            let ret = rng.gen_range(-class.daily_volatility()..class.daily_volatility());
            closes[i - 1] = round_to(closes[i] / (1.0 + ret), 2).max(0.01);
        }

        let dates = trailing_weekdays(self.bucket_start(at), days);
        let bars = dates
            .into_iter()
            .zip(closes.iter().enumerate())
            .map(|(timestamp, (i, &close))| {
                let open = if i == 0 { close } else { closes[i - 1] };
                let high = round_to(open.max(close) * (1.0 + rng.gen_range(0.0..0.01)), 2);
                let low = round_to(open.min(close) * (1.0 - rng.gen_range(0.0..0.01)), 2);
                Bar {
                    timestamp,
                    open,
                    high,
                    low,
                    close,
                    volume: rng.gen_range(class.volume_range()).round(),
                }
            })
            .collect();

        HistoricalSeries::daily(symbol.clone(), bars, Provenance::Synthetic)
    }

    fn index_for_bucket(&self, bucket: i64) -> IndexSnapshot {
        let quote = self.quote(&self.config.index_symbol, bucket);
        IndexSnapshot {
            symbol: self.config.index_symbol.clone(),
            value: quote.price,
            change_percent: quote.change_percent,
        }
    }

    fn quote(&self, symbol: &str, bucket: i64) -> SyntheticQuote {
        let class = SymbolClass::of(symbol);

        // Baseline is seeded by symbol alone so prices drift between buckets
        // instead of jumping to an unrelated level every hour.
        let mut anchor = seeded_rng(symbol, "anchor", 0);
        let baseline = anchor.gen_range(class.price_range());
        let shares = anchor.gen_range(class.shares_range());

        let mut rng = seeded_rng(symbol, "quote", bucket);
        let drift = rng.gen_range(-0.02..0.02);
        let price = round_to((baseline * (1.0 + drift)).max(1.0), 2);

        // Sum of uniforms: concentrated near zero, bounded at +/-3%
        let change_percent = round_to(
            (0..3).map(|_| rng.gen_range(-1.0..1.0)).sum::<f64>(),
            2,
        );
        let previous_close = round_to(price / (1.0 + change_percent / 100.0), 2);
        let change = round_to(price - previous_close, 2);

        let day_high = round_to(price.max(previous_close) * (1.0 + rng.gen_range(0.0..0.015)), 2);
        let day_low = round_to(price.min(previous_close) * (1.0 - rng.gen_range(0.0..0.015)), 2);
        let volume = rng.gen_range(class.volume_range()).round();

        SyntheticQuote {
            price,
            change,
            change_percent,
            day_high,
            day_low,
            volume,
            market_cap: (price * shares).round(),
        }
    }
}

struct SyntheticQuote {
    price: f64,
    change: f64,
    change_percent: f64,
    day_high: f64,
    day_low: f64,
    volume: f64,
    market_cap: f64,
}

/// RNG seeded from SHA-256 of (symbol, stream, bucket).
fn seeded_rng(symbol: &str, stream: &str, bucket: i64) -> ChaCha8Rng {
    let mut hasher = Sha256::new();
    hasher.update(symbol.as_bytes());
    hasher.update(b":");
    hasher.update(stream.as_bytes());
    hasher.update(b":");
    hasher.update(bucket.to_le_bytes());
    let digest = hasher.finalize();

    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    ChaCha8Rng::seed_from_u64(u64::from_le_bytes(seed))
}

/// The `count` most recent weekdays up to and including `end`'s date,
/// oldest first, each at midnight UTC.
fn trailing_weekdays(end: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
    let mut day = end
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(end);
    let mut dates = Vec::with_capacity(count);
    while dates.len() < count {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(day);
        }
        day -= ChronoDuration::days(1);
    }
    dates.reverse();
    dates
}
