//! Exponential backoff loop shared by every remote operation.

use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::time::sleep;

use crate::error::{Result, ShareError};

/// Backoff schedule. `steps` bounds the number of attempts; the delay
/// starts at `duration`, is multiplied by `factor` after every attempt and
/// never exceeds `cap`.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    pub duration: Duration,
    pub factor: f64,
    /// Up to `jitter * delay` of random extra wait per sleep.
    pub jitter: f64,
    pub steps: u32,
    pub cap: Option<Duration>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(5),
            factor: 1.5,
            jitter: 1.0,
            steps: 6,
            cap: Some(Duration::from_secs(300)),
        }
    }
}

impl Backoff {
    pub fn state(&self) -> BackoffState<'_> {
        BackoffState {
            backoff: self,
            next: self.duration,
        }
    }
}

/// Delay bookkeeping for one run of [`exponential_backoff`].
pub struct BackoffState<'a> {
    backoff: &'a Backoff,
    next: Duration,
}

impl BackoffState<'_> {
    /// Returns the delay to sleep now and advances the schedule.
    pub fn step(&mut self) -> Duration {
        let current = self.next;
        let b = self.backoff;
        if b.factor > 0.0 {
            let mut next = current.mul_f64(b.factor);
            if let Some(cap) = b.cap
                && next > cap
            {
                next = cap;
            }
            self.next = next;
        }
        let delay = if b.jitter > 0.0 {
            current + current.mul_f64(rand::random::<f64>() * b.jitter)
        } else {
            current
        };
        // jitter never pushes a sleep past the cap
        match b.cap {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

/// Result of one attempt inside [`exponential_backoff`].
#[derive(Debug)]
pub enum Attempt<T> {
    Done(T),
    /// Try again after the next delay; the error is returned if the budget runs out.
    Retry(ShareError),
    /// Stop right away.
    Abort(ShareError),
}

/// Runs `condition` until it reports `Done` or `Abort`, or until
/// `backoff.steps` attempts have been made, sleeping between attempts.
pub async fn exponential_backoff<T, F, Fut>(backoff: &Backoff, mut condition: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let steps = backoff.steps.max(1);
    let mut state = backoff.state();
    let mut last_err = None;

    for attempt in 1..=steps {
        match condition().await {
            Attempt::Done(v) => return Ok(v),
            Attempt::Abort(e) => return Err(e),
            Attempt::Retry(e) => last_err = Some(e),
        }
        if attempt < steps {
            let delay = state.step();
            debug!("attempt {attempt}/{steps} failed, retrying in {delay:?}");
            sleep(delay).await;
        }
    }

    Err(last_err.unwrap_or_else(|| {
        ShareError::RemoteThrottled("timed out waiting for the condition".to_string())
    }))
}
