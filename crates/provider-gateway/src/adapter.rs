use analysis_core::{Bar, Financials, IndexSnapshot, ProviderError, Symbol};
use async_trait::async_trait;

/// Quote fields exactly as a provider reported them. Nothing here is trusted
/// until the gateway has validated it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawQuote {
    pub price: Option<f64>,
    pub previous_close: Option<f64>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub volume: Option<f64>,
    pub market_cap: Option<f64>,
    pub index: Option<IndexSnapshot>,
}

/// One upstream market-data provider.
///
/// Implementations perform the network call and map the provider's wire
/// format onto [`RawQuote`] / [`Bar`]. Transport problems (connection errors,
/// throttling, 5xx) are `ProviderError::Transport`; responses that cannot be
/// decoded are `ProviderError::Malformed`.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<RawQuote, ProviderError>;

    /// Daily bars covering roughly the last `days` trading sessions.
    async fn fetch_bars(&self, symbol: &Symbol, days: u32) -> Result<Vec<Bar>, ProviderError> {
        let _ = (symbol, days);
        Err(ProviderError::Unsupported(format!("{} has no bars endpoint", self.name())))
    }

    /// Current market capitalization in dollars.
    async fn fetch_market_cap(&self, symbol: &Symbol) -> Result<f64, ProviderError> {
        let _ = symbol;
        Err(ProviderError::Unsupported(format!(
            "{} has no reference data endpoint",
            self.name()
        )))
    }

    /// Up to `quarters` quarterly statements, newest first.
    async fn fetch_financials(
        &self,
        symbol: &Symbol,
        quarters: u32,
    ) -> Result<Vec<Financials>, ProviderError> {
        let _ = (symbol, quarters);
        Err(ProviderError::Unsupported(format!(
            "{} has no financials endpoint",
            self.name()
        )))
    }
}
