//! Conflict-retry timing.

use std::sync::Mutex;
use std::time::Duration;

/// Bounded, linear, non-jittered backoff: attempt `n` is followed by `step × n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self { Self { max_attempts: 3, step: Duration::from_millis(100) } }
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration { self.step * attempt }
}

/// Where the engine waits between conflict retries.
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) { tokio::time::sleep(duration).await }
}

/// Returns immediately and remembers every requested delay.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self { Self::default() }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        let mut v = self.slept.lock().unwrap_or_else(|e| e.into_inner());
        v.push(duration);
    }
}
