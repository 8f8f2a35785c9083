//! Tick sources for the render loop.

use montage_core::settings::MAX_FPS;
use montage_core::types::TimeUs;
use std::future::Future;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Yields the monotonic timestamp of each render tick, starting at zero.
pub trait TickSource: Send {
    fn next_tick(&mut self) -> impl Future<Output = TimeUs> + Send;
}

/// Virtual clock stepping exactly one output frame per tick.
///
/// Runs as fast as the render loop can consume ticks, yielding to the
/// scheduler between frames.
#[derive(Debug, Clone)]
pub struct FrameClock {
    fps: f64,
    tick: u64,
}

impl FrameClock {
    pub fn new(fps: f64) -> Self {
        Self { fps, tick: 0 }
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }
}

impl TickSource for FrameClock {
    async fn next_tick(&mut self) -> TimeUs {
        let at = TimeUs((self.tick as f64 * 1_000_000.0 / self.fps).round() as i64);
        self.tick += 1;
        tokio::task::yield_now().await;
        at
    }
}

/// Wall-clock ticks at a fixed interval, timestamped with a monotonic
/// `Instant` taken at each tick.
#[derive(Debug)]
pub struct RealtimeClock {
    interval: Interval,
    origin: Option<Instant>,
}

impl RealtimeClock {
    /// Must be called from within a tokio runtime. `fps` is held to
    /// `[1, MAX_FPS]`.
    pub fn new(fps: f64) -> Self {
        let fps = if fps.is_finite() { fps.clamp(1.0, MAX_FPS) } else { MAX_FPS };
        let period = std::time::Duration::from_secs_f64(1.0 / fps);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            interval,
            origin: None,
        }
    }
}

impl TickSource for RealtimeClock {
    async fn next_tick(&mut self) -> TimeUs {
        let now = self.interval.tick().await;
        let origin = *self.origin.get_or_insert(now);
        TimeUs(now.duration_since(origin).as_micros() as i64)
    }
}
