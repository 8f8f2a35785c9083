//! The render loop.
//!
//! A tick-driven state machine over the resolved timeline. Each tick samples
//! a monotonic timestamp, advances through as many state changes as that
//! timestamp implies, then draws at most one frame into the frame buffer.
//!
//! Every clip has an entry time on the render clock. Clip `i + 1` is entered
//! `window(i)` before clip `i` ends, measured in clip `i`'s own elapsed time,
//! so the rendered length is the timeline total minus every overlap.

use montage_core::timeline::Timeline;
use montage_core::types::{CanvasSize, TimeUs, TransitionSpec};

use crate::clock::TickSource;
use crate::error::{RenderError, Result};
use crate::frame::{FrameBuffer, Placement};
use crate::sink::FrameSink;
use crate::source::FrameSource;
use crate::transition::TransitionEngine;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderState {
    Idle,
    Drawing(usize),
    Transitioning {
        current: usize,
        next: usize,
        progress: f32,
    },
    Finished,
}

pub struct Compositor {
    sources: Vec<FrameSource>,
    durations: Vec<TimeUs>,
    windows: Vec<TimeUs>,
    entries: Vec<TimeUs>,
    transition: TransitionSpec,
    engine: TransitionEngine,
    buffer: FrameBuffer,
    state: RenderState,
    frames_drawn: u64,
}

impl Compositor {
    pub fn new(
        timeline: &Timeline,
        transition: TransitionSpec,
        sources: Vec<FrameSource>,
        canvas: CanvasSize,
        engine: TransitionEngine,
    ) -> Result<Self> {
        if timeline.is_empty() {
            return Err(RenderError::EmptyTimeline);
        }
        if sources.len() != timeline.len() {
            return Err(RenderError::InvalidRequest(format!(
                "{} sources for {} clips",
                sources.len(),
                timeline.len()
            )));
        }

        let durations: Vec<TimeUs> = timeline.clips().iter().map(|c| c.effective_duration).collect();
        let windows = timeline.transition_windows(&transition);

        Ok(Self {
            entries: vec![TimeUs::ZERO; durations.len()],
            sources,
            durations,
            windows,
            transition,
            engine,
            buffer: FrameBuffer::new(canvas),
            state: RenderState::Idle,
            frames_drawn: 0,
        })
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    pub fn sources(&self) -> &[FrameSource] {
        &self.sources
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Render-clock time at which clip `index` was (or will be) entered.
    pub fn entry_time(&self, index: usize) -> Option<TimeUs> {
        self.entries.get(index).copied()
    }

    /// Rendered length: every clip minus every overlap.
    pub fn render_duration(&self) -> TimeUs {
        self.durations.iter().copied().sum::<TimeUs>() - self.windows.iter().copied().sum::<TimeUs>()
    }

    /// Advance to `now` and draw. Returns whether a frame was drawn.
    pub async fn tick(&mut self, now: TimeUs) -> Result<bool> {
        loop {
            match self.state {
                RenderState::Finished => return Ok(false),

                RenderState::Idle => {
                    self.enter(0, now).await?;
                    self.state = RenderState::Drawing(0);
                }

                RenderState::Drawing(i) => {
                    let elapsed = now - self.entries[i];
                    let dur = self.durations[i];
                    let window = self.windows[i];

                    if elapsed >= dur {
                        self.exit(i).await;
                        if i + 1 == self.sources.len() {
                            tracing::debug!(at = %now, "render finished");
                            self.state = RenderState::Finished;
                            return Ok(false);
                        }
                        self.enter(i + 1, self.entries[i] + dur - window).await?;
                        self.state = RenderState::Drawing(i + 1);
                        continue;
                    }

                    if window > TimeUs::ZERO && elapsed >= dur - window {
                        self.enter(i + 1, self.entries[i] + dur - window).await?;
                        self.state = RenderState::Transitioning {
                            current: i,
                            next: i + 1,
                            progress: 0.0,
                        };
                        continue;
                    }

                    self.draw_single(i, elapsed).await?;
                    return Ok(true);
                }

                RenderState::Transitioning {
                    current,
                    next,
                    progress: shown,
                } => {
                    let elapsed = now - self.entries[current];
                    let dur = self.durations[current];

                    // The fully-arrived frame is always drawn once before leaving.
                    if elapsed >= dur && shown >= 1.0 {
                        self.exit(current).await;
                        self.state = RenderState::Drawing(next);
                        continue;
                    }

                    let progress = transition_progress(elapsed, dur, self.windows[current]);
                    self.state = RenderState::Transitioning {
                        current,
                        next,
                        progress,
                    };
                    self.draw_transition(current, next, elapsed, now - self.entries[next], progress)
                        .await?;
                    return Ok(true);
                }
            }
        }
    }

    /// Drive the loop from `clock` into `sink` until finished. `on_frame`
    /// sees the render-clock time of every drawn frame.
    pub async fn run<C, S>(
        &mut self,
        clock: &mut C,
        sink: &mut S,
        mut on_frame: impl FnMut(TimeUs),
    ) -> Result<u64>
    where
        C: TickSource,
        S: FrameSink,
    {
        let result = self.drive(clock, sink, &mut on_frame).await;
        if result.is_err() {
            self.release().await;
        }
        result
    }

    async fn drive<C, S>(
        &mut self,
        clock: &mut C,
        sink: &mut S,
        on_frame: &mut impl FnMut(TimeUs),
    ) -> Result<u64>
    where
        C: TickSource,
        S: FrameSink,
    {
        while self.state != RenderState::Finished {
            let now = clock.next_tick().await;
            if self.tick(now).await? {
                sink.push_frame(now, &self.buffer).await?;
                on_frame(now);
            }
        }
        tracing::info!(frames = self.frames_drawn, "render loop finished");
        Ok(self.frames_drawn)
    }

    /// Pause every source that is still playing.
    pub async fn release(&mut self) {
        for source in &mut self.sources {
            source.pause().await;
        }
    }

    async fn enter(&mut self, index: usize, at: TimeUs) -> Result<()> {
        tracing::debug!(clip = index, at = %at, "entering clip");
        self.entries[index] = at;
        self.sources[index].start().await
    }

    async fn exit(&mut self, index: usize) {
        tracing::debug!(clip = index, "leaving clip");
        self.sources[index].pause().await;
    }

    async fn draw_single(&mut self, index: usize, elapsed: TimeUs) -> Result<()> {
        let full = Placement::full(self.buffer.canvas());
        let frame = self.sources[index].current_frame(elapsed).await?;
        self.buffer.clear();
        self.buffer.draw(frame, full, 1.0);
        self.frames_drawn += 1;
        Ok(())
    }

    async fn draw_transition(
        &mut self,
        current: usize,
        next: usize,
        elapsed_current: TimeUs,
        elapsed_next: TimeUs,
        progress: f32,
    ) -> Result<()> {
        let (head, tail) = self.sources.split_at_mut(next);
        let current_frame = head[current].current_frame(elapsed_current).await?;
        let next_frame = tail[0].current_frame(elapsed_next).await?;
        self.engine.apply(
            self.transition.kind,
            progress,
            current_frame,
            next_frame,
            &mut self.buffer,
        );
        self.frames_drawn += 1;
        Ok(())
    }
}

/// Progress through the trailing `window` of a clip lasting `dur`.
/// Exactly 1.0 once `elapsed` reaches `dur`.
fn transition_progress(elapsed: TimeUs, dur: TimeUs, window: TimeUs) -> f32 {
    if window <= TimeUs::ZERO {
        return 1.0;
    }
    let into = (elapsed - (dur - window)).0.clamp(0, window.0);
    if into == window.0 {
        1.0
    } else {
        (into as f64 / window.0 as f64) as f32
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
