use async_trait::async_trait;

use crate::Symbol;

/// Optional textual-sentiment source (news headlines, social posts, an NLP
/// service). Returns a polarity in [-1, 1], or `None` when it has nothing to
/// say about the symbol.
#[async_trait]
pub trait PolaritySource: Send + Sync {
    async fn polarity(&self, symbol: &Symbol, texts: &[String]) -> Option<f64>;
}
