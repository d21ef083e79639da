// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use backoff::backoff::Backoff;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Fixed delay between attempts, giving up after `max_attempts` tries in total.
#[derive(Debug, Clone)]
pub struct BoundedConstantBackoff {
    delay: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl BoundedConstantBackoff {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: max_attempts.max(1),
            attempts: 1,
        }
    }
}

impl Backoff for BoundedConstantBackoff {
    fn reset(&mut self) {
        self.attempts = 1;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.delay)
    }
}

pub fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_constant_backoff() {
        let mut backoff = BoundedConstantBackoff::new(3, Duration::from_millis(5));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(5)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(5)));
        assert_eq!(backoff.next_backoff(), None);

        backoff.reset();
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(5)));

        let mut once = BoundedConstantBackoff::new(0, Duration::ZERO);
        assert_eq!(once.next_backoff(), None);
    }
}
