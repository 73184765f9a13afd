//! Process-wide simulation support.
//!
//! When enabled, physical operations (robotic moves, status scans) sleep
//! for a jittered duration to emulate hardware timing. The switch is
//! one-way and flipped once at startup by `-simulate`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use tracing::debug;

static ENABLED: AtomicBool = AtomicBool::new(false);

/// Enables simulation. Panics if called twice.
pub fn enable() {
    if ENABLED.swap(true, Ordering::SeqCst) {
        panic!("simulation already enabled");
    }

    debug!("sim: enabled");
}

/// Returns whether simulation is enabled.
pub fn enabled() -> bool {
    ENABLED.load(Ordering::SeqCst)
}

/// A jittered delay distribution.
#[derive(Debug, Clone, Copy)]
pub struct Noise {
    pub mean: Duration,
    pub jitter: Duration,
}

impl Noise {
    pub const fn new(mean: Duration, jitter: Duration) -> Noise {
        Noise { mean, jitter }
    }

    /// Samples a duration in `[mean - jitter, mean + jitter]`.
    pub fn sample(&self) -> Duration {
        let mean = self.mean.as_millis() as i64;
        let jitter = self.jitter.as_millis() as i64;

        if jitter == 0 {
            return self.mean;
        }

        let ms = mean + rand::thread_rng().gen_range(-jitter..=jitter);
        Duration::from_millis(ms.max(0) as u64)
    }
}

/// Sleeps for a sampled duration when simulation is enabled; a no-op
/// otherwise. Callers run on threads that may block.
pub fn simulate(noise: Noise) {
    if !enabled() {
        return;
    }

    std::thread::sleep(noise.sample());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_within_bounds() {
        let n = Noise::new(Duration::from_millis(100), Duration::from_millis(20));
        for _ in 0..100 {
            let d = n.sample();
            assert!(d >= Duration::from_millis(80));
            assert!(d <= Duration::from_millis(120));
        }
    }

    #[test]
    fn zero_jitter_is_exact() {
        let n = Noise::new(Duration::from_millis(10), Duration::ZERO);
        assert_eq!(n.sample(), Duration::from_millis(10));
    }
}
