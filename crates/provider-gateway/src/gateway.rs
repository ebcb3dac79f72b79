use std::sync::Arc;
use std::time::Duration;

use analysis_core::{Bar, Financials, IndexSnapshot, ProviderError, Symbol};
use futures_util::future::BoxFuture;
use tokio::time::Instant;

use crate::adapter::{ProviderAdapter, RawQuote};
use crate::backoff::Backoff;

/// Retry and timeout budget for one gateway call.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Maximum number of adapters tried, in priority order.
    pub max_providers: usize,
    /// Retries per adapter after the first attempt (retryable failures only).
    pub max_retries: u32,
    /// Hard cutoff per attempt.
    pub request_timeout: Duration,
    pub backoff: Backoff,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_providers: 3,
            max_retries: 2,
            request_timeout: Duration::from_secs(4),
            backoff: Backoff::default(),
        }
    }
}

/// Outcome of a gateway call.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResult<T> {
    Success(T),
    Failure {
        reason: ProviderError,
        retryable: bool,
    },
}

impl<T> ProviderResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ProviderResult::Success(_))
    }
}

/// A quote that passed validation. Price and volume are guaranteed; every
/// other field is present only if the provider sent a usable value.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotePayload {
    pub provider: String,
    pub price: f64,
    pub volume: f64,
    pub previous_close: Option<f64>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub market_cap: Option<f64>,
    pub index: Option<IndexSnapshot>,
}

pub struct ProviderGateway {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    config: GatewayConfig,
}

impl ProviderGateway {
    /// `adapters` are tried in the given order.
    pub fn new(adapters: Vec<Arc<dyn ProviderAdapter>>, config: GatewayConfig) -> Self {
        Self { adapters, config }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Fetch and validate a quote.
    pub async fn fetch(&self, symbol: &Symbol) -> ProviderResult<QuotePayload> {
        self.run(
            symbol,
            "quote",
            |adapter| adapter.fetch_quote(symbol),
            validate_quote,
        )
        .await
    }

    /// Fetch and validate roughly `days` daily bars.
    pub async fn fetch_series(&self, symbol: &Symbol, days: u32) -> ProviderResult<Vec<Bar>> {
        self.run(
            symbol,
            "bars",
            |adapter| adapter.fetch_bars(symbol, days),
            |_, bars| validate_bars(bars),
        )
        .await
    }

    pub async fn fetch_market_cap(&self, symbol: &Symbol) -> ProviderResult<f64> {
        self.run(
            symbol,
            "market cap",
            |adapter| adapter.fetch_market_cap(symbol),
            |_, cap| validate_market_cap(cap),
        )
        .await
    }

    /// Up to `quarters` quarterly statements, newest first.
    pub async fn fetch_financials(
        &self,
        symbol: &Symbol,
        quarters: u32,
    ) -> ProviderResult<Vec<Financials>> {
        self.run(
            symbol,
            "financials",
            |adapter| adapter.fetch_financials(symbol, quarters),
            |_, statements| validate_financials(statements),
        )
        .await
    }

    async fn run<'a, R, T, F, V>(
        &'a self,
        symbol: &Symbol,
        endpoint: &'static str,
        call: F,
        validate: V,
    ) -> ProviderResult<T>
    where
        F: Fn(&'a dyn ProviderAdapter) -> BoxFuture<'a, Result<R, ProviderError>>,
        V: Fn(&str, R) -> Result<T, ProviderError>,
    {
        let started = Instant::now();

        for adapter in self.adapters.iter().take(self.config.max_providers) {
            let name = adapter.name();

            for attempt in 0..=self.config.max_retries {
                let outcome =
                    match tokio::time::timeout(self.config.request_timeout, call(adapter.as_ref()))
                        .await
                    {
                        Ok(Ok(raw)) => validate(name, raw),
                        Ok(Err(e)) => Err(e),
                        Err(_) => Err(ProviderError::Timeout(self.config.request_timeout)),
                    };

                match outcome {
                    Ok(payload) => {
                        tracing::debug!(
                            "{} {} for {} succeeded on attempt {} ({} ms)",
                            name,
                            endpoint,
                            symbol,
                            attempt + 1,
                            started.elapsed().as_millis()
                        );
                        return ProviderResult::Success(payload);
                    }
                    Err(e) if e.retryable() && attempt < self.config.max_retries => {
                        let delay = self.config.backoff.delay(attempt);
                        tracing::warn!(
                            "{} {} for {} failed ({}), retry {}/{} in {} ms",
                            name,
                            endpoint,
                            symbol,
                            e,
                            attempt + 1,
                            self.config.max_retries,
                            delay.as_millis()
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => {
                        tracing::warn!(
                            "{} {} for {} failed ({}), moving to next provider",
                            name,
                            endpoint,
                            symbol,
                            e
                        );
                        break;
                    }
                }
            }
        }

        tracing::warn!(
            "All providers exhausted for {} {} after {} ms",
            symbol,
            endpoint,
            started.elapsed().as_millis()
        );
        ProviderResult::Failure {
            reason: ProviderError::Exhausted,
            retryable: false,
        }
    }
}

/// Optional fields that are not finite or are negative where that makes no
/// sense are dropped; required fields that fail reject the whole payload.
fn validate_quote(provider: &str, raw: RawQuote) -> Result<QuotePayload, ProviderError> {
    let price = match raw.price {
        Some(p) if p.is_finite() && p > 0.0 => p,
        Some(p) => return Err(ProviderError::Malformed(format!("invalid price {}", p))),
        None => return Err(ProviderError::Malformed("missing price".to_string())),
    };
    let volume = match raw.volume {
        Some(v) if v.is_finite() && v >= 0.0 => v,
        Some(v) => return Err(ProviderError::Malformed(format!("invalid volume {}", v))),
        None => return Err(ProviderError::Malformed("missing volume".to_string())),
    };

    let finite = |v: Option<f64>| v.filter(|x| x.is_finite());
    let positive = |v: Option<f64>| v.filter(|x| x.is_finite() && *x > 0.0);

    let day_high = positive(raw.day_high);
    let day_low = positive(raw.day_low);
    if let (Some(high), Some(low)) = (day_high, day_low) {
        if high < low {
            return Err(ProviderError::Malformed(format!(
                "day high {} below day low {}",
                high, low
            )));
        }
    }

    let index = raw
        .index
        .filter(|i| i.value.is_finite() && i.value > 0.0 && i.change_percent.is_finite());

    Ok(QuotePayload {
        provider: provider.to_string(),
        price,
        volume,
        previous_close: positive(raw.previous_close),
        change: finite(raw.change),
        change_percent: finite(raw.change_percent),
        day_high,
        day_low,
        market_cap: positive(raw.market_cap),
        index,
    })
}

fn validate_bars(bars: Vec<Bar>) -> Result<Vec<Bar>, ProviderError> {
    if bars.is_empty() {
        return Err(ProviderError::Malformed("empty bar series".to_string()));
    }
    for bar in &bars {
        let finite = [bar.open, bar.high, bar.low, bar.close, bar.volume]
            .iter()
            .all(|v| v.is_finite());
        if !finite || bar.close <= 0.0 || bar.high < bar.low || bar.volume < 0.0 {
            return Err(ProviderError::Malformed(format!(
                "invalid bar at {}",
                bar.timestamp
            )));
        }
    }
    Ok(bars)
}

fn validate_market_cap(cap: f64) -> Result<f64, ProviderError> {
    if cap.is_finite() && cap > 0.0 {
        Ok(cap)
    } else {
        Err(ProviderError::Malformed(format!("invalid market cap {}", cap)))
    }
}

/// Non-finite line items are dropped. A response with no statements at all
/// lets the next provider try.
fn validate_financials(statements: Vec<Financials>) -> Result<Vec<Financials>, ProviderError> {
    if statements.is_empty() {
        return Err(ProviderError::Malformed("no financial statements".to_string()));
    }
    let finite = |v: Option<f64>| v.filter(|x| x.is_finite());
    Ok(statements
        .into_iter()
        .map(|f| Financials {
            revenue: finite(f.revenue),
            net_income: finite(f.net_income),
            eps: finite(f.eps),
            total_liabilities: finite(f.total_liabilities),
            shareholders_equity: finite(f.shareholders_equity),
            ..f
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Adapter replaying a fixed script of outcomes, then repeating the last.
    struct ScriptedAdapter {
        name: &'static str,
        script: Mutex<VecDeque<Result<RawQuote, ProviderError>>>,
        last: Result<RawQuote, ProviderError>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedAdapter {
        fn new(name: &'static str, script: Vec<Result<RawQuote, ProviderError>>) -> Arc<Self> {
            let last = script
                .last()
                .cloned()
                .unwrap_or(Err(ProviderError::Transport("empty script".into())));
            Arc::new(Self {
                name,
                script: Mutex::new(script.into()),
                last,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn slow(name: &'static str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name,
                script: Mutex::new(VecDeque::new()),
                last: Ok(good_quote()),
                delay,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch_quote(&self, _symbol: &Symbol) -> Result<RawQuote, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| self.last.clone())
        }
    }

    fn good_quote() -> RawQuote {
        RawQuote {
            price: Some(101.5),
            previous_close: Some(100.0),
            change: Some(1.5),
            change_percent: Some(1.5),
            day_high: Some(102.0),
            day_low: Some(99.5),
            volume: Some(1_250_000.0),
            market_cap: None,
            index: None,
        }
    }

    fn fast_config(max_retries: u32) -> GatewayConfig {
        GatewayConfig {
            max_providers: 3,
            max_retries,
            request_timeout: Duration::from_millis(100),
            backoff: Backoff::new(Duration::from_millis(1), Duration::from_millis(5)),
        }
    }

    fn symbol() -> Symbol {
        Symbol::parse("AAPL").unwrap()
    }

    fn transport() -> Result<RawQuote, ProviderError> {
        Err(ProviderError::Transport("connection refused".into()))
    }

    #[tokio::test]
    async fn test_first_provider_success() {
        let primary = ScriptedAdapter::new("primary", vec![Ok(good_quote())]);
        let secondary = ScriptedAdapter::new("secondary", vec![Ok(good_quote())]);
        let gateway = ProviderGateway::new(
            vec![primary.clone(), secondary.clone()],
            fast_config(2),
        );

        match gateway.fetch(&symbol()).await {
            ProviderResult::Success(payload) => {
                assert_eq!(payload.provider, "primary");
                assert_eq!(payload.price, 101.5);
                assert_eq!(payload.previous_close, Some(100.0));
            }
            other => panic!("expected success, got {:?}", other),
        }
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_retries_same_provider() {
        let primary = ScriptedAdapter::new("primary", vec![transport(), transport(), Ok(good_quote())]);
        let gateway = ProviderGateway::new(vec![primary.clone()], fast_config(2));

        assert!(gateway.fetch(&symbol()).await.is_success());
        assert_eq!(primary.calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_moves_to_next_provider() {
        let primary = ScriptedAdapter::new("primary", vec![transport()]);
        let secondary = ScriptedAdapter::new("secondary", vec![Ok(good_quote())]);
        let gateway = ProviderGateway::new(
            vec![primary.clone(), secondary.clone()],
            fast_config(1),
        );

        match gateway.fetch(&symbol()).await {
            ProviderResult::Success(payload) => assert_eq!(payload.provider, "secondary"),
            other => panic!("expected success, got {:?}", other),
        }
        assert_eq!(primary.calls(), 2);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_is_not_retried() {
        let mut missing_price = good_quote();
        missing_price.price = None;
        let primary = ScriptedAdapter::new("primary", vec![Ok(missing_price)]);
        let secondary = ScriptedAdapter::new("secondary", vec![Ok(good_quote())]);
        let gateway = ProviderGateway::new(
            vec![primary.clone(), secondary.clone()],
            fast_config(3),
        );

        match gateway.fetch(&symbol()).await {
            ProviderResult::Success(payload) => assert_eq!(payload.provider, "secondary"),
            other => panic!("expected success, got {:?}", other),
        }
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payloads_rejected() {
        let cases = [
            RawQuote { price: Some(f64::NAN), ..good_quote() },
            RawQuote { price: Some(-3.0), ..good_quote() },
            RawQuote { volume: Some(-1.0), ..good_quote() },
            RawQuote { volume: None, ..good_quote() },
            RawQuote { day_high: Some(90.0), day_low: Some(95.0), ..good_quote() },
        ];
        for raw in cases {
            let adapter = ScriptedAdapter::new("only", vec![Ok(raw.clone())]);
            let gateway = ProviderGateway::new(vec![adapter], fast_config(0));
            assert_eq!(
                gateway.fetch(&symbol()).await,
                ProviderResult::Failure {
                    reason: ProviderError::Exhausted,
                    retryable: false
                },
                "payload {:?} should be rejected",
                raw
            );
        }
    }

    #[tokio::test]
    async fn test_optional_garbage_is_dropped() {
        let raw = RawQuote {
            change: Some(f64::INFINITY),
            market_cap: Some(-5.0),
            index: Some(IndexSnapshot {
                symbol: "SPY".into(),
                value: f64::NAN,
                change_percent: 0.1,
            }),
            ..good_quote()
        };
        let gateway = ProviderGateway::new(
            vec![ScriptedAdapter::new("only", vec![Ok(raw)])],
            fast_config(0),
        );
        match gateway.fetch(&symbol()).await {
            ProviderResult::Success(payload) => {
                assert_eq!(payload.change, None);
                assert_eq!(payload.market_cap, None);
                assert_eq!(payload.index, None);
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_counts_as_retryable_failure() {
        let slow = ScriptedAdapter::slow("slow", Duration::from_millis(500));
        let gateway = ProviderGateway::new(vec![slow.clone()], fast_config(1));

        let started = std::time::Instant::now();
        let result = gateway.fetch(&symbol()).await;
        assert!(!result.is_success());
        assert_eq!(slow.calls(), 2);
        assert!(started.elapsed() < Duration::from_millis(450));
    }

    #[tokio::test]
    async fn test_provider_budget_limits_adapters_tried() {
        let a = ScriptedAdapter::new("a", vec![transport()]);
        let b = ScriptedAdapter::new("b", vec![transport()]);
        let c = ScriptedAdapter::new("c", vec![Ok(good_quote())]);
        let config = GatewayConfig {
            max_providers: 2,
            ..fast_config(0)
        };
        let gateway = ProviderGateway::new(vec![a.clone(), b.clone(), c.clone()], config);

        assert_eq!(
            gateway.fetch(&symbol()).await,
            ProviderResult::Failure {
                reason: ProviderError::Exhausted,
                retryable: false
            }
        );
        assert_eq!(c.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_adapters_is_exhausted() {
        let gateway = ProviderGateway::new(Vec::new(), GatewayConfig::default());
        assert!(!gateway.fetch(&symbol()).await.is_success());
    }

    #[tokio::test]
    async fn test_unsupported_bars_fall_through() {
        let adapter = ScriptedAdapter::new("quotes-only", vec![Ok(good_quote())]);
        let gateway = ProviderGateway::new(vec![adapter], fast_config(2));
        assert!(!gateway.fetch_series(&symbol(), 30).await.is_success());
    }

    /// Adapter with reference data only.
    struct ReferenceAdapter {
        market_cap: f64,
        statements: Vec<Financials>,
    }

    #[async_trait]
    impl ProviderAdapter for ReferenceAdapter {
        fn name(&self) -> &str {
            "reference"
        }

        async fn fetch_quote(&self, _symbol: &Symbol) -> Result<RawQuote, ProviderError> {
            Err(ProviderError::Unsupported("quotes".into()))
        }

        async fn fetch_market_cap(&self, _symbol: &Symbol) -> Result<f64, ProviderError> {
            Ok(self.market_cap)
        }

        async fn fetch_financials(
            &self,
            _symbol: &Symbol,
            quarters: u32,
        ) -> Result<Vec<Financials>, ProviderError> {
            Ok(self.statements.iter().take(quarters as usize).cloned().collect())
        }
    }

    fn quarter(period: &str, revenue: f64) -> Financials {
        Financials {
            symbol: "AAPL".to_string(),
            fiscal_period: period.to_string(),
            fiscal_year: 2024,
            revenue: Some(revenue),
            eps: Some(f64::NAN),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_reference_data_skips_providers_without_it() {
        let quotes_only = ScriptedAdapter::new("quotes-only", vec![Ok(good_quote())]);
        let reference = Arc::new(ReferenceAdapter {
            market_cap: 3.0e12,
            statements: vec![quarter("Q2", 90.0e9), quarter("Q1", 85.0e9)],
        });
        let gateway = ProviderGateway::new(vec![quotes_only, reference], fast_config(2));

        assert_eq!(
            gateway.fetch_market_cap(&symbol()).await,
            ProviderResult::Success(3.0e12)
        );
        match gateway.fetch_financials(&symbol(), 8).await {
            ProviderResult::Success(statements) => {
                assert_eq!(statements.len(), 2);
                assert_eq!(statements[0].fiscal_period, "Q2");
                assert_eq!(statements[0].revenue, Some(90.0e9));
                assert_eq!(statements[0].eps, None);
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bad_reference_data_is_rejected() {
        let gateway = ProviderGateway::new(
            vec![Arc::new(ReferenceAdapter {
                market_cap: -1.0,
                statements: Vec::new(),
            })],
            fast_config(0),
        );
        assert!(!gateway.fetch_market_cap(&symbol()).await.is_success());
        assert!(!gateway.fetch_financials(&symbol(), 8).await.is_success());
    }

    #[test]
    fn test_validate_bars() {
        let bar = Bar {
            timestamp: Utc::now(),
            open: 10.0,
            high: 11.0,
            low: 9.0,
            close: 10.5,
            volume: 100.0,
        };
        assert!(validate_bars(vec![bar.clone()]).is_ok());
        assert!(validate_bars(Vec::new()).is_err());
        assert!(validate_bars(vec![Bar { high: 8.0, ..bar.clone() }]).is_err());
        assert!(validate_bars(vec![Bar { volume: -1.0, ..bar }]).is_err());
    }
}
