//! Ordered access to external market-data providers.
//!
//! The gateway knows nothing about caching or fallback; it tries each
//! configured [`ProviderAdapter`] in priority order with a bounded timeout,
//! retries transport failures with exponential backoff, rejects structurally
//! invalid payloads, and reports a tagged [`ProviderResult`].

pub mod adapter;
pub mod alpha_vantage;
pub mod backoff;
pub mod gateway;
pub mod polygon;
mod rate_limit;

pub use adapter::{ProviderAdapter, RawQuote};
pub use alpha_vantage::AlphaVantageAdapter;
pub use backoff::Backoff;
pub use gateway::{GatewayConfig, ProviderGateway, ProviderResult, QuotePayload};
pub use polygon::PolygonAdapter;
