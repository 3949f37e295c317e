// Latency ceiling for outbound calls. When the timer wins the wrapped future
// is dropped, aborting whatever request it had in flight.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BoundedCallError<E> {
    #[error("Timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("{0}")]
    Failed(E),
}

impl<E> BoundedCallError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BoundedCallError::Timeout(_))
    }
}

pub async fn run_bounded<F, T, E>(timeout: Duration, call: F) -> Result<T, BoundedCallError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(BoundedCallError::Failed(e)),
        Err(_) => Err(BoundedCallError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CALL_TIMEOUT_SECS;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[tokio::test]
    async fn returns_value_unchanged() {
        let result: Result<_, BoundedCallError<anyhow::Error>> =
            run_bounded(Duration::from_secs(1), async { Ok(vec![1, 2, 3]) }).await;
        assert_eq!(result.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn inner_error_is_surfaced() {
        let result: Result<(), _> = run_bounded(Duration::from_secs(1), async {
            Err(anyhow::anyhow!("upstream exploded"))
        })
        .await;
        let err = result.unwrap_err();
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "upstream exploded");
    }

    #[tokio::test]
    async fn slow_call_times_out_within_bound() {
        let bound = Duration::from_millis(50);
        let started = Instant::now();
        let result: Result<(), BoundedCallError<anyhow::Error>> = run_bounded(bound, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        let elapsed = started.elapsed();

        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert!(elapsed >= bound);
        assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn timed_out_work_does_not_keep_running() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let result: Result<(), BoundedCallError<anyhow::Error>> =
            run_bounded(Duration::from_millis(20), async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(result.unwrap_err().is_timeout());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[test]
    fn timeout_message_names_the_bound() {
        let err: BoundedCallError<anyhow::Error> =
            BoundedCallError::Timeout(Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS));
        assert_eq!(err.to_string(), "Timed out after 90s");
    }
}
