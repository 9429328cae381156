//! Pacing between consecutive upload attempts.
//!
//! The orchestrator asks the pacer for a delay after each attempt and waits
//! it out only when another attempt follows.

use std::time::Duration;

use docbridge_shared::PacingConfig;

/// How the previous attempt went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResult {
    Succeeded,
    Failed,
}

/// Chooses and waits out the pause between attempts.
#[allow(async_fn_in_trait)]
pub trait Pacer {
    /// Delay to apply before the next attempt, given how the last one went.
    fn next_delay(&mut self, last: AttemptResult) -> Duration;

    /// Wait out `delay`.
    async fn wait(&mut self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Same pause after every attempt.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

impl Pacer for FixedDelay {
    fn next_delay(&mut self, _last: AttemptResult) -> Duration {
        self.0
    }
}

/// Pause that doubles after every failure, capped at `max`, and drops back
/// to `base` after a success.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            current: base,
        }
    }
}

impl Pacer for ExponentialBackoff {
    fn next_delay(&mut self, last: AttemptResult) -> Duration {
        match last {
            AttemptResult::Succeeded => self.current = self.base,
            AttemptResult::Failed => {
                self.current = self.current.saturating_mul(2).min(self.max);
            }
        }
        self.current
    }
}

/// Pacer built from configuration.
#[derive(Debug, Clone, Copy)]
pub enum Pacing {
    Fixed(FixedDelay),
    Backoff(ExponentialBackoff),
}

impl From<PacingConfig> for Pacing {
    fn from(config: PacingConfig) -> Self {
        match config {
            PacingConfig::Fixed { delay } => Self::Fixed(FixedDelay(delay)),
            PacingConfig::Backoff { base, max } => {
                Self::Backoff(ExponentialBackoff::new(base, max))
            }
        }
    }
}

impl Pacer for Pacing {
    fn next_delay(&mut self, last: AttemptResult) -> Duration {
        match self {
            Self::Fixed(p) => p.next_delay(last),
            Self::Backoff(p) => p.next_delay(last),
        }
    }
}
