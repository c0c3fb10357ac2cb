use std::future::Future;
use std::time::Duration;

use rand::{thread_rng, Rng};
use tracing::{event, Level};

use crate::error::Result;

/// Backoff schedule for [`retry_on_conflict`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryBackoff {
    /// Maximum number of attempts.
    pub steps: u32,
    /// Delay before the second attempt.
    pub duration: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub factor: f64,
    /// Up to this fraction of the delay is added at random.
    pub jitter: f64,
}

/// Five quick attempts, 10ms apart with 10% jitter.
pub const DEFAULT_RETRY: RetryBackoff = RetryBackoff {
    steps: 5,
    duration: Duration::from_millis(10),
    factor: 1.0,
    jitter: 0.1,
};

impl RetryBackoff {
    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        delay.mul_f64(1.0 + thread_rng().gen_range(0.0..self.jitter))
    }
}

/// Runs `op` until it succeeds, fails with something other than a
/// conflict, or `backoff.steps` attempts have been made. The last error is
/// returned.
pub async fn retry_on_conflict<T, F, Fut>(backoff: RetryBackoff, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = backoff.duration;
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_conflict() && attempt < backoff.steps => {
                event!(Level::DEBUG, attempt, err = %err, "Conflict, retrying.");
                tokio::time::sleep(backoff.jittered(delay)).await;
                delay = delay.mul_f64(backoff.factor);
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use kube::core::ErrorResponse;

    use super::*;
    use crate::error::Error;

    fn status(code: u16) -> Error {
        Error::kube("getting namespace")(kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: String::new(),
            reason: String::new(),
            code,
        }))
    }

    #[tokio::test]
    async fn retries_conflicts_until_success() {
        let calls = &AtomicU32::new(0);
        let result = retry_on_conflict(DEFAULT_RETRY, || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(status(409))
            } else {
                Ok("ready")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ready");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_configured_steps() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = retry_on_conflict(DEFAULT_RETRY, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(status(409))
        })
        .await;

        assert!(result.unwrap_err().is_conflict());
        assert_eq!(calls.load(Ordering::SeqCst), DEFAULT_RETRY.steps);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = retry_on_conflict(DEFAULT_RETRY, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(status(404))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
