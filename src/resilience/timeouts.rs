//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap every upstream attempt with a deadline
//! - Cancel the attempt cleanly on expiry (the future is dropped)
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities, so paused-clock tests control it
//! - Timeout errors are distinct from other transport errors

use std::future::Future;
use std::time::Duration;

use crate::pool::transport::TransportError;

/// Run `attempt`, failing with [`TransportError::Timeout`] after `limit`.
pub async fn with_timeout<F, T>(limit: Duration, attempt: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(limit, attempt).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, TransportError>(())
        };
        let err = with_timeout(Duration::from_secs(10), slow).await.unwrap_err();
        assert_eq!(err, TransportError::Timeout(Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_fast_attempt_passes_through() {
        let fast = async { Err::<(), _>(TransportError::Connect("refused".into())) };
        let err = with_timeout(Duration::from_secs(10), fast).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
    }
}
