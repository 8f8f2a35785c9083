/// Percent reported once the request has been validated.
pub const SETUP_DONE: f64 = 5.0;
/// Percent reported once every clip is ready.
pub const CLIPS_READY: f64 = 75.0;
/// Percent reported once the render loop has finished.
pub const RENDER_DONE: f64 = 95.0;
pub const COMPLETE: f64 = 100.0;

/// Wraps the caller's progress callback so it only ever sees values in
/// `[0, 100]` that never decrease.
pub struct ProgressReporter<F> {
    callback: F,
    last: Option<f64>,
}

impl<F: FnMut(f64)> ProgressReporter<F> {
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            last: None,
        }
    }

    pub fn report(&mut self, percent: f64) {
        if percent.is_nan() {
            return;
        }
        let percent = percent.clamp(0.0, COMPLETE);
        if self.last.is_some_and(|last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        tracing::trace!(progress = percent, "merge progress");
        (self.callback)(percent);
    }

    /// Interpolated value after `ready` of `total` clips are prepared.
    pub fn clip_ready(&mut self, ready: usize, total: usize) {
        self.report(clip_phase(ready, total));
    }

    /// Interpolated value while rendering, `done` out of `total` time.
    pub fn rendering(&mut self, done: f64, total: f64) {
        if total > 0.0 {
            self.report(CLIPS_READY + (done / total).clamp(0.0, 1.0) * (RENDER_DONE - CLIPS_READY));
        }
    }

    pub fn last(&self) -> Option<f64> {
        self.last
    }
}

fn clip_phase(ready: usize, total: usize) -> f64 {
    if total == 0 {
        return CLIPS_READY;
    }
    SETUP_DONE + ready as f64 / total as f64 * (CLIPS_READY - SETUP_DONE)
}
