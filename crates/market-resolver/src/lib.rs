//! Cache → gateway → synthesizer resolution with per-symbol single-flight.

pub mod cache;
pub mod resolver;
pub mod single_flight;

pub use cache::{MarketCache, TtlCache};
pub use resolver::{Resolver, ResolverConfig, MAX_SERIES_DAYS};
pub use single_flight::{FlightError, SingleFlight};
