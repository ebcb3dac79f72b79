use std::ops::Range;

const MEGA_CAPS: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "GOOG", "AMZN", "NVDA", "META", "TSLA", "BRK.A", "BRK.B", "AVGO",
    "JPM", "V", "MA", "UNH", "LLY", "XOM", "JNJ", "WMT", "PG", "HD", "COST", "ORCL", "NFLX",
];

const INDEX_FUNDS: &[&str] = &["SPY", "QQQ", "DIA", "IWM", "VOO", "VTI", "IVV"];

/// Coarse grouping that picks plausible baselines for synthetic data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolClass {
    MegaCap,
    IndexFund,
    Unknown,
}

impl SymbolClass {
    pub fn of(symbol: &str) -> Self {
        if symbol.starts_with('^') || INDEX_FUNDS.contains(&symbol) {
            SymbolClass::IndexFund
        } else if MEGA_CAPS.contains(&symbol) {
            SymbolClass::MegaCap
        } else {
            SymbolClass::Unknown
        }
    }

    pub(crate) fn price_range(&self) -> Range<f64> {
        match self {
            SymbolClass::MegaCap => 150.0..600.0,
            SymbolClass::IndexFund => 350.0..550.0,
            SymbolClass::Unknown => 5.0..80.0,
        }
    }

    pub(crate) fn shares_range(&self) -> Range<f64> {
        match self {
            SymbolClass::MegaCap => 2.0e9..1.6e10,
            SymbolClass::IndexFund => 3.0e8..1.0e9,
            SymbolClass::Unknown => 1.0e7..5.0e8,
        }
    }

    pub(crate) fn volume_range(&self) -> Range<f64> {
        match self {
            SymbolClass::MegaCap => 2.0e7..9.0e7,
            SymbolClass::IndexFund => 4.0e7..1.2e8,
            SymbolClass::Unknown => 5.0e4..3.0e6,
        }
    }

    pub(crate) fn daily_volatility(&self) -> f64 {
        match self {
            SymbolClass::MegaCap => 0.02,
            SymbolClass::IndexFund => 0.01,
            SymbolClass::Unknown => 0.035,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(SymbolClass::of("AAPL"), SymbolClass::MegaCap);
        assert_eq!(SymbolClass::of("SPY"), SymbolClass::IndexFund);
        assert_eq!(SymbolClass::of("^GSPC"), SymbolClass::IndexFund);
        assert_eq!(SymbolClass::of("EXMP"), SymbolClass::Unknown);
    }
}
