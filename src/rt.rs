//! Reactor plumbing.
//!
//! The engine leans on two host-runtime primitives: a monotonic millisecond
//! clock and a "delay N ms" timer. Both come from `tokio::time`, which means
//! tests running under a paused runtime get a virtual clock for free.

use std::time::Duration;

use tokio::time::Instant;

/// Monotonic millisecond time source, anchored at client construction.
///
/// All pool deadlines are compared in these units; no wall-clock time is
/// involved anywhere in the engine.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Clock {
    epoch: Instant,
}

impl Clock {
    pub(crate) fn new() -> Self {
        Clock {
            epoch: Instant::now(),
        }
    }

    pub(crate) fn now_ms(&self) -> u64 {
        // Avoid `Instant::elapsed` to avoid issues like rust-lang/rust#86470.
        Instant::now().saturating_duration_since(self.epoch).as_millis() as u64
    }
}

pub(crate) fn ms(d: Duration) -> u64 {
    d.as_millis() as u64
}
