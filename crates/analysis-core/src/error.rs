use std::time::Duration;

use thiserror::Error;

/// The only error the engine hands back to its callers.
///
/// Provider-side trouble never surfaces here; it is absorbed by the resolver
/// and shows up as `Provenance::Synthetic` on the returned record instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Failures observed while talking to an upstream market-data provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Endpoint not supported by provider: {0}")]
    Unsupported(String),

    #[error("All providers exhausted")]
    Exhausted,
}

impl ProviderError {
    /// Transport errors and timeouts are worth another attempt against the same
    /// provider; malformed data from a provider is not.
    pub fn retryable(&self) -> bool {
        matches!(self, ProviderError::Transport(_) | ProviderError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::Transport("connection reset".into()).retryable());
        assert!(ProviderError::Timeout(Duration::from_millis(50)).retryable());
        assert!(!ProviderError::Malformed("missing price".into()).retryable());
        assert!(!ProviderError::Unsupported("bars".into()).retryable());
        assert!(!ProviderError::Exhausted.retryable());
    }
}
