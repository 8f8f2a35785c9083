//! The transition catalog.
//!
//! Every variant is a pure function of progress: given the same inputs and
//! progress, the composited frame buffer is identical. The outgoing frame is
//! always drawn first and the incoming frame is layered over it with opacity
//! equal to progress, so partial-progress frames show both clips.

use montage_core::types::{CanvasSize, TransitionKind};

use crate::frame::{Frame, FrameBuffer, Placement};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionEngine {
    max_blur_radius: f32,
}

impl Default for TransitionEngine {
    fn default() -> Self {
        Self::new(10.0)
    }
}

impl TransitionEngine {
    pub fn new(max_blur_radius: f32) -> Self {
        Self {
            max_blur_radius: max_blur_radius.max(0.0),
        }
    }

    pub fn max_blur_radius(&self) -> f32 {
        self.max_blur_radius
    }

    /// Composite `current` and `next` at `progress` into `out`.
    ///
    /// Progress outside `[0, 1]` is clamped.
    pub fn apply(
        &self,
        kind: TransitionKind,
        progress: f32,
        current: &Frame,
        next: &Frame,
        out: &mut FrameBuffer,
    ) {
        let p = clamp_progress(progress);
        let canvas = out.canvas();
        let full = Placement::full(canvas);

        out.clear();

        if kind == TransitionKind::None {
            // Hard cut: no overlap is ever shown.
            if p < 1.0 {
                out.draw(current, full, 1.0);
            } else {
                out.draw(next, full, 1.0);
            }
            return;
        }

        out.draw(current, full, 1.0);
        let placement = placement(kind, p, canvas);
        match kind {
            TransitionKind::Blur => {
                out.draw_blurred(next, placement, p, self.blur_radius(p));
            }
            _ => out.draw(next, placement, p),
        }
    }

    /// Blur radius applied to the incoming frame at `progress`.
    pub fn blur_radius(&self, progress: f32) -> f32 {
        (1.0 - clamp_progress(progress)) * self.max_blur_radius
    }
}

/// Where the incoming frame lands on the canvas at `progress`.
pub fn placement(kind: TransitionKind, progress: f32, canvas: CanvasSize) -> Placement {
    let p = clamp_progress(progress);
    let full = Placement::full(canvas);
    let (w, h) = (canvas.width as f32, canvas.height as f32);
    let remaining = 1.0 - p;

    match kind {
        TransitionKind::SlideLeft => full.offset(remaining * w, 0.0),
        TransitionKind::SlideRight => full.offset(-remaining * w, 0.0),
        TransitionKind::SlideUp => full.offset(0.0, remaining * h),
        TransitionKind::SlideDown => full.offset(0.0, -remaining * h),
        TransitionKind::ZoomIn => Placement::centered(canvas, 1.0 + p),
        TransitionKind::ZoomOut => Placement::centered(canvas, 2.0 - p),
        TransitionKind::None | TransitionKind::Fade | TransitionKind::Blur => full,
    }
}

fn clamp_progress(progress: f32) -> f32 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    fn canvas() -> CanvasSize {
        CanvasSize::new(20, 10)
    }

    fn render(kind: TransitionKind, p: f32) -> FrameBuffer {
        let mut out = FrameBuffer::new(canvas());
        let current = Frame::solid(20, 10, RED);
        let next = Frame::solid(20, 10, BLUE);
        TransitionEngine::default().apply(kind, p, &current, &next, &mut out);
        out
    }

    fn near(a: u8, b: u8) -> bool {
        (a as i32 - b as i32).abs() <= 1
    }

    #[test]
    fn fade_midpoint_is_even_blend() {
        let out = render(TransitionKind::Fade, 0.5);
        let px = out.pixel(10, 5);
        assert!(near(px[0], 128) && near(px[2], 128), "got {px:?}");
    }

    #[test]
    fn fade_endpoints() {
        assert_eq!(render(TransitionKind::Fade, 0.0).pixel(3, 3), RED);
        assert_eq!(render(TransitionKind::Fade, 1.0).pixel(3, 3), BLUE);
    }

    #[test]
    fn every_kind_ends_on_next_frame() {
        for kind in TransitionKind::ALL {
            let out = render(kind, 1.0);
            assert_eq!(out.pixel(10, 5), BLUE, "{kind} did not finish on the next clip");
        }
    }

    #[test]
    fn every_kind_starts_on_current_frame() {
        for kind in TransitionKind::ALL {
            let out = render(kind, 0.0);
            assert_eq!(out.pixel(10, 5), RED, "{kind} did not start on the current clip");
        }
    }

    #[test]
    fn partial_progress_shows_both_sources() {
        for kind in TransitionKind::ALL {
            if kind == TransitionKind::None {
                continue;
            }
            let out = render(kind, 0.6);
            let mut saw_red = false;
            let mut saw_blue = false;
            for y in 0..10 {
                for x in 0..20 {
                    let px = out.pixel(x, y);
                    saw_red |= px[0] > 0;
                    saw_blue |= px[2] > 0;
                }
            }
            assert!(saw_red && saw_blue, "{kind} hid one of the sources");
        }
    }

    #[test]
    fn none_is_a_hard_cut() {
        assert_eq!(render(TransitionKind::None, 0.99).pixel(0, 0), RED);
        assert_eq!(render(TransitionKind::None, 1.0).pixel(0, 0), BLUE);
    }

    #[test]
    fn slide_offsets_follow_direction() {
        let c = canvas();
        assert_eq!(placement(TransitionKind::SlideLeft, 0.0, c).x, 20.0);
        assert_eq!(placement(TransitionKind::SlideRight, 0.0, c).x, -20.0);
        assert_eq!(placement(TransitionKind::SlideUp, 0.5, c).y, 5.0);
        assert_eq!(placement(TransitionKind::SlideDown, 0.5, c).y, -5.0);
        assert_eq!(placement(TransitionKind::SlideLeft, 1.0, c), Placement::full(c));
    }

    #[test]
    fn slide_left_keeps_current_on_the_left() {
        let out = render(TransitionKind::SlideLeft, 0.5);
        assert_eq!(out.pixel(2, 5), RED);
        let right = out.pixel(17, 5);
        assert!(right[2] > 0 && right[0] > 0);
    }

    #[test]
    fn zoom_scales_about_center() {
        let c = canvas();
        let zin = placement(TransitionKind::ZoomIn, 0.5, c);
        assert_eq!(zin.width, 30.0);
        assert_eq!(zin.x, -5.0);
        let zout = placement(TransitionKind::ZoomOut, 0.0, c);
        assert_eq!(zout.width, 40.0);
        assert_eq!(zout.height, 20.0);
        assert_eq!(placement(TransitionKind::ZoomOut, 1.0, c), Placement::full(c));
    }

    #[test]
    fn blur_radius_shrinks_with_progress() {
        let engine = TransitionEngine::new(10.0);
        assert_eq!(engine.blur_radius(0.0), 10.0);
        assert_eq!(engine.blur_radius(0.5), 5.0);
        assert_eq!(engine.blur_radius(1.0), 0.0);
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(render(TransitionKind::Fade, 1.7).pixel(1, 1), BLUE);
        assert_eq!(render(TransitionKind::Fade, -0.3).pixel(1, 1), RED);
        assert_eq!(clamp_progress(f32::NAN), 0.0);
    }

    #[test]
    fn apply_is_deterministic() {
        let a = render(TransitionKind::ZoomIn, 0.37);
        let b = render(TransitionKind::ZoomIn, 0.37);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }
}
