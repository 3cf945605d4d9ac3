//! Parameterized retry with exponential backoff.
//!
//! One helper composed uniformly across collaborator calls instead of
//! per-call ad hoc retry chains. The classifier decides whether a
//! failure is worth another attempt; fatal errors short-circuit.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Worth another attempt after backoff.
    Transient,
    /// No point retrying; return the error immediately.
    Fatal,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Backoff before attempt `n` (1-based): base × 2^(n-1).
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Run `op` up to `policy.max_attempts` times, sleeping between
/// transient failures. The last error is returned when attempts are
/// exhausted or the classifier says fatal.
pub async fn retry<T, E, Fut, Op, Cl>(policy: &RetryPolicy, classify: Cl, mut op: Op) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Cl: Fn(&E) -> RetryClass,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if classify(&e) == RetryClass::Fatal || attempt >= policy.max_attempts {
                    return Err(e);
                }
                let delay = policy.delay_for(attempt);
                debug!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
