/*
 * A stopwatch that never reads the clock itself.
 *
 * As with the rest of the control logic, time is handed in by the caller.
 * That keeps the state machine and the sampler testable on the host with
 * simulated time, and only the firmware binary ever calls `Instant::now()`.
 */

use embassy_time::{Duration, Instant};

/// Source of the current time for code that has to take its own readings,
/// such as the echo measurement.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopwatch {
    started: Option<Instant>,
    accumulated: Duration,
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Stopwatch {
    /// A stopwatch at zero, not running.
    pub const fn new() -> Self {
        Stopwatch {
            started: None,
            accumulated: Duration::from_ticks(0),
        }
    }

    /// Back to zero, not running.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Starting a running stopwatch has no effect.
    pub fn start(&mut self, now: Instant) {
        if self.started.is_none() {
            self.started = Some(now);
        }
    }

    pub fn stop(&mut self, now: Instant) {
        if let Some(started) = self.started.take() {
            self.accumulated += now.saturating_duration_since(started);
        }
    }

    /// Reset and start in one go.
    pub fn restart(&mut self, now: Instant) {
        self.reset();
        self.start(now);
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    /*
     * For a stopped stopwatch `now` is ignored and the captured interval is
     * returned. A `now` earlier than the start reads as no time at all.
     */
    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.started {
            Some(started) => self.accumulated + now.saturating_duration_since(started),
            None => self.accumulated,
        }
    }
}
