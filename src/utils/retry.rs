//! Exponential backoff with jitter for transient failures (§7): RPC dial,
//! rate-limited requests, subprocess spawn races. Retried internally and
//! only surfaced to the caller after the configured retries are exhausted.

use std::future::Future;

use rand::Rng;

use crate::config::RetryParameters;

pub async fn retry<T, E, F, Fut>(params: &RetryParameters, mut attempt: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delay_ms = params.base_delay_ms.max(1);
    let mut last_err = None;
    for attempt_number in 0..=params.max_retries {
        match attempt(attempt_number).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                last_err = Some(e);
                if attempt_number == params.max_retries {
                    break;
                }
                let jitter = rand::rng().random_range(0..=(delay_ms / 4).max(1));
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms + jitter)).await;
                delay_ms = (delay_ms * 2).min(params.max_delay_ms.max(delay_ms));
            }
        }
    }
    Err(last_err.expect("at least one attempt always runs"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_on_first_attempt() {
        let params = RetryParameters {
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        };
        let calls = AtomicU32::new(0);
        let result: Result<u32, &'static str> = retry(&params, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_retries_and_surfaces_last_error() {
        let params = RetryParameters {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
        };
        let calls = AtomicU32::new(0);
        let result: Result<u32, &'static str> = retry(&params, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("boom") }
        })
        .await;
        assert_eq!(result.unwrap_err(), "boom");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
