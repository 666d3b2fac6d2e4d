use std::time::{Duration, Instant};

const BASE_BACKOFF: Duration = Duration::from_secs(10);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Per-endpoint circuit breaker state. Mutated under the endpoint lock;
/// an endpoint is skipped while inside its backoff window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EndpointHealth {
    pub consecutive_failures: u32,
    pub next_retry_time: Option<Instant>,
}

impl EndpointHealth {
    pub fn on_success(&mut self) {
        self.consecutive_failures = 0;
        self.next_retry_time = None;
    }

    pub fn on_failure(&mut self, now: Instant) {
        self.consecutive_failures += 1;
        let exponent = self.consecutive_failures.saturating_sub(1).min(16);
        let backoff = BASE_BACKOFF
            .saturating_mul(1 << exponent)
            .min(MAX_BACKOFF);
        self.next_retry_time = Some(now + backoff);
    }

    pub fn is_cooling(&self, now: Instant) -> bool {
        matches!(self.next_retry_time, Some(retry_time) if now < retry_time)
    }
}
