//! Core engine: the per-account alert → wager pipeline.
//!
//! - `queue`: FIFO of pending alerts with duplicate suppression
//! - `worker`: drains the queue one alert at a time
//! - `executor`: wager placement with session recovery
//! - `runner`: wires poller and worker into one account instance

pub mod executor;
pub mod queue;
pub mod runner;
pub mod worker;

use std::future::Future;
use std::time::Duration;

use crate::types::EdgeRunnerError;

/// Bound an outbound call; elapsed time surfaces as `EdgeRunnerError::Timeout`.
pub async fn with_timeout<T, F>(limit: Duration, op: &str, fut: F) -> Result<T, EdgeRunnerError>
where
    F: Future<Output = Result<T, EdgeRunnerError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(EdgeRunnerError::Timeout(format!(
            "{op} exceeded {}s",
            limit.as_secs()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let ok: Result<u8, _> = with_timeout(Duration::from_secs(1), "op", async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);
    }

    #[test]
    fn test_with_timeout_keeps_inner_error() {
        let res: Result<(), _> = tokio_test::block_on(with_timeout(
            Duration::from_secs(1),
            "submit_wager",
            async { Err(EdgeRunnerError::Rejected("odds changed".into())) },
        ));
        let err = tokio_test::assert_err!(res);
        assert!(matches!(err, EdgeRunnerError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_with_timeout_elapsed() {
        let res: Result<(), _> = with_timeout(Duration::from_millis(10), "slow_call", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        match res {
            Err(EdgeRunnerError::Timeout(msg)) => assert!(msg.contains("slow_call")),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
