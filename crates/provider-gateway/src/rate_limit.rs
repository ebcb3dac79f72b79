use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
pub(crate) struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub(crate) fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    pub(crate) async fn acquire(&self, provider: &str) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            let oldest = match ts.front() {
                Some(&oldest) if ts.len() >= self.max_requests => oldest,
                _ => {
                    ts.push_back(now);
                    return;
                }
            };

            // Wait until the oldest request falls out of the window
            let sleep_dur = (oldest + self.window).saturating_duration_since(now)
                + Duration::from_millis(50);
            drop(ts);
            tracing::debug!(
                "Rate limiter: waiting {:.1}s for {} slot",
                sleep_dur.as_secs_f64(),
                provider
            );
            tokio::time::sleep(sleep_dur).await;
        }
    }
}
