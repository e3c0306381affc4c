// Per-step retry and timeout policy
//
// Every step runs under an explicit policy: a retry limit, an
// inter-retry delay curve, and a timeout bounding each attempt.
// Client errors (missing rows, illegal status transitions) abort the
// retry loop immediately; rate-limit errors stretch the next delay to
// honor the service's hint.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use super::StepName;
use crate::analysis::AnalysisError;
use crate::database::models::InvalidStatusTransition;
use crate::database::NotFound;

/// Delay growth between retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Constant,
    Linear,
    Exponential,
}

/// Retry and timeout policy for one step
#[derive(Debug, Clone, Copy)]
pub struct StepPolicy {
    /// Retries after the initial attempt
    pub retry_limit: u32,
    pub delay: Duration,
    pub backoff: Backoff,
    pub timeout: Duration,
}

impl StepPolicy {
    const fn new(retry_limit: u32, delay: Duration, backoff: Backoff, timeout: Duration) -> Self {
        Self {
            retry_limit,
            delay,
            backoff,
            timeout,
        }
    }

    /// Delay before retry number `attempt` (zero-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Constant => self.delay,
            Backoff::Linear => self.delay * (attempt + 1),
            Backoff::Exponential => self.delay * 2u32.saturating_pow(attempt),
        }
    }
}

/// The policy table for the fixed step list
pub fn policy_for(step: StepName) -> StepPolicy {
    use Backoff::*;
    match step {
        StepName::LoadMetadata => {
            StepPolicy::new(3, Duration::from_secs(2), Constant, Duration::from_secs(10))
        }
        StepName::EnsureAudioAccess => {
            StepPolicy::new(3, Duration::from_secs(5), Constant, Duration::from_secs(30))
        }
        StepName::MaybeSplitAudio => StepPolicy::new(
            2,
            Duration::from_secs(30),
            Exponential,
            Duration::from_secs(30 * 60),
        ),
        StepName::TranscribeChunks => StepPolicy::new(
            5,
            Duration::from_secs(10),
            Exponential,
            Duration::from_secs(10 * 60),
        ),
        StepName::MergeTranscripts => {
            StepPolicy::new(3, Duration::from_secs(2), Constant, Duration::from_secs(60))
        }
        StepName::Summarize => StepPolicy::new(
            5,
            Duration::from_secs(10),
            Exponential,
            Duration::from_secs(5 * 60),
        ),
        StepName::ClaimsExtract => StepPolicy::new(
            5,
            Duration::from_secs(10),
            Exponential,
            Duration::from_secs(5 * 60),
        ),
        StepName::Group => {
            StepPolicy::new(3, Duration::from_secs(2), Constant, Duration::from_secs(30))
        }
        StepName::IndexForSearch => {
            StepPolicy::new(3, Duration::from_secs(2), Constant, Duration::from_secs(60))
        }
        StepName::Notify => {
            StepPolicy::new(3, Duration::from_secs(5), Constant, Duration::from_secs(30))
        }
        StepName::Finalize => {
            StepPolicy::new(3, Duration::from_secs(2), Constant, Duration::from_secs(10))
        }
    }
}

/// Whether an error class must not be retried: missing resources and
/// rejected state transitions will not heal on their own.
fn is_client_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<NotFound>().is_some()
        || err.downcast_ref::<InvalidStatusTransition>().is_some()
}

/// Rate-limit hint carried by the error chain, if any
fn rate_limit_hint(err: &anyhow::Error) -> Option<Duration> {
    match err.downcast_ref::<AnalysisError>() {
        Some(AnalysisError::RateLimited { retry_after_ms }) => {
            Some(Duration::from_millis(*retry_after_ms))
        }
        _ => None,
    }
}

/// Run one step attempt-by-attempt under its policy.
pub async fn run_with_policy<T, F, Fut>(
    step: StepName,
    policy: &StepPolicy,
    mut attempt_fn: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error: Option<anyhow::Error> = None;

    for attempt in 0..=policy.retry_limit {
        if attempt > 0 {
            let mut delay = policy.delay_for_attempt(attempt - 1);
            if let Some(hint) = last_error.as_ref().and_then(rate_limit_hint) {
                delay = delay.max(hint);
            }
            log::info!(
                "Retrying step {} (attempt {}/{}) after {:?}",
                step,
                attempt + 1,
                policy.retry_limit + 1,
                delay
            );
            tokio::time::sleep(delay).await;
        }

        match timeout(policy.timeout, attempt_fn()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => {
                if is_client_error(&err) {
                    return Err(err);
                }
                log::warn!("Step {} attempt {} failed: {:#}", step, attempt + 1, err);
                last_error = Some(err);
            }
            Err(_) => {
                log::warn!(
                    "Step {} attempt {} timed out after {:?}",
                    step,
                    attempt + 1,
                    policy.timeout
                );
                last_error = Some(anyhow::anyhow!(
                    "Step {} timed out after {:?}",
                    step,
                    policy.timeout
                ));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Step {} failed without error detail", step)))
}
