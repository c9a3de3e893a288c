// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential backoff with additive jitter for resubscription and write retry.

use std::time::Duration;

/// Result of one backoff step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffStep {
    /// How long to wait before the next attempt.
    pub sleep_ms: u64,
    /// Base delay for the step after this one.
    pub next_backoff_ms: u64,
}

/// Compute one step of exponential backoff.
///
/// Jitter is `jitter_seed` reduced to `0..=current/2`, added on top of the
/// current delay. The base delay doubles for the next step, capped at
/// `max_backoff_ms`.
pub fn compute_backoff_with_jitter(
    current_backoff_ms: u64,
    max_backoff_ms: u64,
    jitter_seed: u64,
) -> BackoffStep {
    let max_jitter = current_backoff_ms.saturating_div(2).saturating_add(1);
    let jitter = jitter_seed % max_jitter;

    BackoffStep {
        sleep_ms: current_backoff_ms.saturating_add(jitter),
        next_backoff_ms: current_backoff_ms.saturating_mul(2).min(max_backoff_ms),
    }
}

/// Stateful backoff sequence seeded from the thread RNG.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial_ms: u64,
    max_ms: u64,
    current_ms: u64,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial_ms = u64::try_from(initial.as_millis()).unwrap_or(u64::MAX).max(1);
        let max_ms = u64::try_from(max.as_millis())
            .unwrap_or(u64::MAX)
            .max(initial_ms);
        Self {
            initial_ms,
            max_ms,
            current_ms: initial_ms,
        }
    }

    /// Delay before the next attempt; advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let step = compute_backoff_with_jitter(self.current_ms, self.max_ms, rand::random());
        self.current_ms = step.next_backoff_ms;
        Duration::from_millis(step.sleep_ms)
    }

    /// Start over from the initial delay after a successful attempt.
    pub fn reset(&mut self) {
        self.current_ms = self.initial_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_is_bounded_by_half_the_delay() {
        let step = compute_backoff_with_jitter(100, 10_000, u64::MAX);
        assert!(step.sleep_ms >= 100);
        assert!(step.sleep_ms <= 150);
        assert_eq!(step.next_backoff_ms, 200);
    }

    #[test]
    fn zero_seed_sleeps_exactly_the_base_delay() {
        let step = compute_backoff_with_jitter(250, 30_000, 0);
        assert_eq!(step.sleep_ms, 250);
    }

    #[test]
    fn next_delay_is_capped() {
        let step = compute_backoff_with_jitter(20_000, 30_000, 0);
        assert_eq!(step.next_backoff_ms, 30_000);
        let step = compute_backoff_with_jitter(30_000, 30_000, 0);
        assert_eq!(step.next_backoff_ms, 30_000);
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let step = compute_backoff_with_jitter(u64::MAX, u64::MAX, 7);
        assert_eq!(step.sleep_ms, u64::MAX);
        assert_eq!(step.next_backoff_ms, u64::MAX);
    }

    #[test]
    fn sequence_grows_then_resets() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(40));
        let first = backoff.next_delay();
        assert!(first >= Duration::from_millis(10) && first <= Duration::from_millis(15));
        let _ = backoff.next_delay();
        let third = backoff.next_delay();
        assert!(third >= Duration::from_millis(40) && third <= Duration::from_millis(60));
        let fourth = backoff.next_delay();
        assert!(fourth <= Duration::from_millis(60));

        backoff.reset();
        assert!(backoff.next_delay() <= Duration::from_millis(15));
    }
}
