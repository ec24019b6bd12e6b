use std::{cell::Cell, time::Instant};

/// Rate used until enough steps have been observed to estimate throughput.
const INITIAL_PROGRESS_RATE: u64 = 10;

/// Decides how many resolution steps pass between two progress reports.
pub trait ResolverTiming {
    fn record_step(&self) {}

    fn progress_rate(&self) -> u64;
}

impl<T: ResolverTiming + ?Sized> ResolverTiming for &T {
    fn record_step(&self) {
        (**self).record_step()
    }

    fn progress_rate(&self) -> u64 {
        (**self).progress_rate()
    }
}

/// Estimates solver throughput from wall-clock time so that progress is
/// reported roughly once per second.
#[derive(Debug)]
pub struct AdaptiveTiming {
    started: Instant,
    steps: Cell<u64>,
}

impl AdaptiveTiming {
    pub fn new() -> Self {
        AdaptiveTiming {
            started: Instant::now(),
            steps: Cell::new(0),
        }
    }
}

impl Default for AdaptiveTiming {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverTiming for AdaptiveTiming {
    fn record_step(&self) {
        self.steps.set(self.steps.get() + 1);
    }

    fn progress_rate(&self) -> u64 {
        let steps = self.steps.get();
        let elapsed = self.started.elapsed().as_secs_f64();
        if steps < INITIAL_PROGRESS_RATE || elapsed <= 0.0 {
            return INITIAL_PROGRESS_RATE;
        }
        ((steps as f64 / elapsed).round() as u64).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_rate_starts_at_initial_rate() {
        let timing = AdaptiveTiming::new();
        assert_eq!(timing.progress_rate(), INITIAL_PROGRESS_RATE);
    }

    #[test]
    fn adaptive_rate_is_positive_after_steps() {
        let timing = AdaptiveTiming::new();
        for _ in 0..100 {
            timing.record_step();
        }
        assert!(timing.progress_rate() >= 1);
    }
}
