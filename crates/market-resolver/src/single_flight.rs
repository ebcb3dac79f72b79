use std::future::Future;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlightError {
    #[error("Flight for {key} aborted: {reason}")]
    Aborted { key: String, reason: String },
}

type Flight<V> = Shared<BoxFuture<'static, Result<V, FlightError>>>;

/// Coalesces concurrent requests for the same key into one unit of work.
///
/// The work runs on its own task, so a caller that stops waiting does not
/// cancel it; everyone else still receives the result. The registry entry is
/// removed once the work finishes.
pub struct SingleFlight<V> {
    inflight: Arc<DashMap<String, Flight<V>>>,
}

impl<V> Default for SingleFlight<V> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
        }
    }
}

impl<V> SingleFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the flight for `key`, starting `work` if none is running.
    /// `work` is dropped unpolled when a flight is already in progress.
    pub async fn run<F>(&self, key: &str, work: F) -> Result<V, FlightError>
    where
        F: Future<Output = V> + Send + 'static,
    {
        let flight = match self.inflight.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                tracing::debug!("Joining in-flight request for {}", key);
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let registry = Arc::clone(&self.inflight);
                let owned_key = key.to_string();
                let handle = tokio::spawn(async move {
                    let value = work.await;
                    registry.remove(&owned_key);
                    value
                });

                let abort_key = key.to_string();
                let flight = async move {
                    handle.await.map_err(|e| FlightError::Aborted {
                        key: abort_key,
                        reason: e.to_string(),
                    })
                }
                .boxed()
                .shared();
                entry.insert(flight.clone());
                flight
            }
        };

        let result = flight.clone().await;
        if result.is_err() {
            // A panicked task never reached its own cleanup
            self.inflight
                .remove_if(key, |_, registered| registered.ptr_eq(&flight));
        }
        result
    }

    /// Number of keys with work currently running.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }
}
