//! Bounded exponential backoff for external-service calls.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

use crate::errors::ArchivistError;

/// Maximum number of retry attempts after the first try, per the
/// concurrency model's "≤2 attempts on 429/5xx" rule.
const MAX_RETRIES: u32 = 2;

/// Starting backoff delay; doubled on each subsequent retry.
const BASE_DELAY: Duration = Duration::from_millis(500);

/// Runs `attempt`, retrying on a 429 or 5xx response up to [`MAX_RETRIES`]
/// times with doubling backoff, starting at [`BASE_DELAY`].
///
/// `attempt` receives the zero-based try count purely for logging; it should
/// return `Ok` on success, `Err(ArchivistError::ApiError(..))` tagged with
/// the status for a retryable failure, or any other error to fail fast.
pub async fn with_retry<T, F, Fut>(label: &str, mut attempt: F) -> Result<T, ArchivistError>
where
  F: FnMut(u32) -> Fut,
  Fut: std::future::Future<Output = Result<T, RetryableError>>, {
  let mut delay = BASE_DELAY;
  for try_number in 0..=MAX_RETRIES {
    match attempt(try_number).await {
      Ok(value) => return Ok(value),
      Err(RetryableError::Retryable(status)) if try_number < MAX_RETRIES => {
        debug!(%label, %status, try_number, ?delay, "retrying after transient failure");
        tokio::time::sleep(delay).await;
        delay *= 2;
      },
      Err(RetryableError::Retryable(status)) =>
        return Err(ArchivistError::ApiError(format!("{label}: giving up after {status} responses"))),
      Err(RetryableError::Fatal(e)) => return Err(e),
    }
  }
  unreachable!("loop always returns on its last iteration")
}

/// The two ways a client call can fail, distinguishing what's worth a retry.
pub enum RetryableError {
  /// A 429 or 5xx response; worth retrying.
  Retryable(StatusCode),
  /// Anything else; fail immediately.
  Fatal(ArchivistError),
}

/// Classifies a response status, returning `Err(Retryable)` for 429/5xx.
pub fn classify(status: StatusCode) -> Result<(), RetryableError> {
  if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
    Err(RetryableError::Retryable(status))
  } else {
    Ok(())
  }
}

impl From<reqwest::Error> for RetryableError {
  fn from(e: reqwest::Error) -> Self { RetryableError::Fatal(e.into()) }
}
