//! Waiting between calls.
//!
//! All engine sleeps go through a `Pacer` so tests can run a full job without
//! real delays and still assert how long it would have waited.

use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;

pub trait Pacer: Send + Sync {
    fn pause(&self, duration: Duration);
}

impl<P> Pacer for std::sync::Arc<P>
where
    P: Pacer + ?Sized,
{
    fn pause(&self, duration: Duration) {
        (**self).pause(duration)
    }
}

/// Blocks the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Records pauses instead of sleeping (tests/benches).
#[derive(Debug, Default)]
pub struct RecordingPacer {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingPacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.pauses().into_iter().sum()
    }
}

impl Pacer for RecordingPacer {
    fn pause(&self, duration: Duration) {
        if let Ok(mut pauses) = self.pauses.lock() {
            pauses.push(duration);
        }
    }
}

/// Pause between consecutive rows, with optional random spread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowPacing {
    pub nominal: Duration,
    /// Fraction of `nominal` (0.0..=1.0) the pause may deviate by.
    pub jitter: f64,
}

impl Default for RowPacing {
    fn default() -> Self {
        Self {
            nominal: Duration::from_millis(500),
            jitter: 0.2,
        }
    }
}

impl RowPacing {
    pub fn fixed(nominal: Duration) -> Self {
        Self { nominal, jitter: 0.0 }
    }

    pub fn none() -> Self {
        Self::fixed(Duration::ZERO)
    }

    /// Longest pause `next_pause` can return.
    pub fn max_pause(&self) -> Duration {
        self.nominal.mul_f64(1.0 + self.jitter.clamp(0.0, 1.0))
    }

    pub fn next_pause(&self) -> Duration {
        let jitter = self.jitter.clamp(0.0, 1.0);
        if self.nominal.is_zero() || jitter == 0.0 {
            return self.nominal;
        }
        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        self.nominal.mul_f64(factor)
    }
}
