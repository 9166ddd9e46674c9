//! Per-Attempt Timeout and Cancellation
//!
//! Wraps one provider attempt with its own deadline (distinct from the total
//! retry budget) and with the caller's cancellation token.
//!
//! ## Usage
//!
//! ```ignore
//! use crate::ai::timeout::with_timeout;
//!
//! let generation = with_timeout(
//!     Duration::from_secs(25),
//!     &cancel,
//!     adapter.call(&request),
//! ).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::classifier::RawFailure;

/// Execute one attempt with a deadline.
///
/// Resolves to `RawFailure::Timeout` if the deadline passes first and to
/// `RawFailure::Cancelled` if the token fires first. The losing future is
/// dropped, which aborts any in-flight request it owns.
pub async fn with_timeout<T, F>(
    timeout: Duration,
    cancel: &CancellationToken,
    future: F,
) -> Result<T, RawFailure>
where
    F: Future<Output = Result<T, RawFailure>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RawFailure::Cancelled),
        outcome = tokio::time::timeout(timeout, future) => match outcome {
            Ok(result) => result,
            Err(_) => Err(RawFailure::Timeout { after: timeout }),
        },
    }
}
