// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

#![allow(clippy::too_many_arguments, clippy::new_without_default)]

pub mod attestation;
pub mod bad_debt;
pub mod chain_reader;
pub mod chain_syncer;
pub mod config;
pub mod error;
pub mod eth_client;
pub mod events;
pub mod finality;
pub mod metrics;
pub mod monitor;
pub mod node;
pub mod relay;
pub mod server;
pub mod storage;
pub mod types;
pub mod utils;

#[cfg(test)]
pub mod test_utils;

#[macro_export]
macro_rules! retry_with_bounded_attempts {
    ($func:expr, $max_attempts:expr, $delay:expr) => {{
        // Constant delay between attempts. Every error is treated as transient,
        // the last one is returned once the attempts are exhausted.
        let backoff = $crate::utils::BoundedConstantBackoff::new($max_attempts, $delay);
        backoff::future::retry(backoff, || {
            let fut = async {
                match $func.await {
                    Ok(value) => Ok(value),
                    Err(e) => {
                        tracing::debug!("Retrying due to error: {:?}", e);
                        Err(backoff::Error::transient(e))
                    }
                }
            };
            std::boxed::Box::pin(fut)
        })
        .await
    }};
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    async fn example_func_ok() -> anyhow::Result<u32> {
        Ok(7)
    }

    async fn example_func_err(calls: &AtomicU32) -> anyhow::Result<()> {
        calls.fetch_add(1, Ordering::SeqCst);
        tracing::info!("example_func_err");
        Err(anyhow::anyhow!("always fails"))
    }

    async fn fails_twice(calls: &AtomicU32) -> anyhow::Result<u32> {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if n < 2 {
            anyhow::bail!("attempt {}", n);
        }
        Ok(n)
    }

    #[tokio::test]
    async fn test_retry_with_bounded_attempts() {
        crate::test_utils::init_test_logging();
        let value =
            retry_with_bounded_attempts!(example_func_ok(), 3, Duration::from_millis(1)).unwrap();
        assert_eq!(value, 7);

        // gives up after exactly max_attempts calls
        let calls = AtomicU32::new(0);
        let err = retry_with_bounded_attempts!(
            example_func_err(&calls),
            4,
            Duration::from_millis(1)
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "always fails");
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let calls = AtomicU32::new(0);
        let value =
            retry_with_bounded_attempts!(fails_twice(&calls), 5, Duration::from_millis(1))
                .unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
