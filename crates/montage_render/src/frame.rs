//! RGBA rasters and the output frame buffer.
//!
//! All drawing is CPU-side: nearest-neighbour sampling into a destination
//! rectangle, source-over blending with a global opacity, and a separable
//! box blur for soft transitions.

use montage_core::types::CanvasSize;

use crate::error::{RenderError, Result};

const OPAQUE_BLACK: [u8; 4] = [0, 0, 0, 255];

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// A decoded RGBA8 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Fully transparent frame.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    /// Wrap raw RGBA bytes, checking the length against the dimensions.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(RenderError::FrameSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Gaussian-like blur of roughly `radius` pixels (three box passes).
    pub fn blurred(&self, radius: f32) -> Frame {
        let box_radius = box_radius_for(radius);
        if box_radius == 0 || self.width == 0 || self.height == 0 {
            return self.clone();
        }

        let (w, h) = (self.width as usize, self.height as usize);
        let mut data = self.data.clone();
        let mut scratch = vec![0u8; data.len()];
        for _ in 0..3 {
            box_pass(&data, &mut scratch, w, h, box_radius, true);
            box_pass(&scratch, &mut data, w, h, box_radius, false);
        }

        Frame {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

/// Box radius whose three-pass repetition approximates a gaussian with
/// standard deviation `sigma`.
fn box_radius_for(sigma: f32) -> usize {
    if sigma <= 0.0 {
        return 0;
    }
    let ideal_width = (4.0 * sigma * sigma + 1.0).sqrt();
    ((ideal_width - 1.0) / 2.0).round().max(0.0) as usize
}

/// One clamp-to-edge running-sum box filter along rows or columns.
fn box_pass(src: &[u8], dst: &mut [u8], w: usize, h: usize, r: usize, horizontal: bool) {
    let (lines, len) = if horizontal { (h, w) } else { (w, h) };
    let index = |line: usize, pos: usize| -> usize {
        if horizontal {
            (line * w + pos) * 4
        } else {
            (pos * w + line) * 4
        }
    };
    let window = (2 * r + 1) as u32;

    for line in 0..lines {
        for c in 0..4 {
            let mut sum: u32 = 0;
            for k in 0..=(2 * r) {
                let pos = k.saturating_sub(r).min(len - 1);
                sum += src[index(line, pos) + c] as u32;
            }
            for pos in 0..len {
                dst[index(line, pos) + c] = ((sum + window / 2) / window) as u8;
                let leaving = pos.saturating_sub(r).min(len - 1);
                let entering = (pos + r + 1).min(len - 1);
                sum = sum + src[index(line, entering) + c] as u32 - src[index(line, leaving) + c] as u32;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

/// Destination rectangle on the canvas, in pixels. May extend past the edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Placement {
    /// Cover the whole canvas.
    pub fn full(canvas: CanvasSize) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: canvas.width as f32,
            height: canvas.height as f32,
        }
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }

    /// Full-canvas rectangle scaled by `scale` about the canvas centre.
    pub fn centered(canvas: CanvasSize, scale: f32) -> Self {
        let (cw, ch) = (canvas.width as f32, canvas.height as f32);
        let (w, h) = (cw * scale, ch * scale);
        Self {
            x: cw / 2.0 - w / 2.0,
            y: ch / 2.0 - h / 2.0,
            width: w,
            height: h,
        }
    }
}

// ---------------------------------------------------------------------------
// FrameBuffer
// ---------------------------------------------------------------------------

/// The output canvas. Its size is fixed when it is created.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    canvas: CanvasSize,
    frame: Frame,
}

impl FrameBuffer {
    pub fn new(canvas: CanvasSize) -> Self {
        Self {
            canvas,
            frame: Frame::solid(canvas.width, canvas.height, OPAQUE_BLACK),
        }
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.frame.as_bytes()
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.frame.pixel(x, y)
    }

    pub fn clear(&mut self) {
        for px in self.frame.data.chunks_exact_mut(4) {
            px.copy_from_slice(&OPAQUE_BLACK);
        }
    }

    /// Composite `src` into `placement` with source-over blending.
    pub fn draw(&mut self, src: &Frame, placement: Placement, opacity: f32) {
        let opacity = opacity.clamp(0.0, 1.0);
        if opacity <= 0.0
            || placement.width <= 0.0
            || placement.height <= 0.0
            || src.width == 0
            || src.height == 0
        {
            return;
        }

        let (cw, ch) = (self.canvas.width as i64, self.canvas.height as i64);
        let x_start = (placement.x.floor() as i64).clamp(0, cw);
        let x_end = ((placement.x + placement.width).ceil() as i64).clamp(0, cw);
        let y_start = (placement.y.floor() as i64).clamp(0, ch);
        let y_end = ((placement.y + placement.height).ceil() as i64).clamp(0, ch);

        let stride = self.canvas.width as usize * 4;
        let src_stride = src.width as usize * 4;

        for dy in y_start..y_end {
            let v = (dy as f32 + 0.5 - placement.y) / placement.height;
            if !(0.0..1.0).contains(&v) {
                continue;
            }
            let sy = ((v * src.height as f32) as usize).min(src.height as usize - 1);
            let src_row = &src.data[sy * src_stride..(sy + 1) * src_stride];
            let dst_row = &mut self.frame.data[dy as usize * stride..(dy as usize + 1) * stride];

            for dx in x_start..x_end {
                let u = (dx as f32 + 0.5 - placement.x) / placement.width;
                if !(0.0..1.0).contains(&u) {
                    continue;
                }
                let sx = ((u * src.width as f32) as usize).min(src.width as usize - 1);
                let s = &src_row[sx * 4..sx * 4 + 4];
                let d = &mut dst_row[dx as usize * 4..dx as usize * 4 + 4];
                blend_over(d, s, opacity);
            }
        }
    }

    /// Draw `src` blurred by `radius` pixels.
    pub fn draw_blurred(&mut self, src: &Frame, placement: Placement, opacity: f32, radius: f32) {
        if box_radius_for(radius) == 0 {
            self.draw(src, placement, opacity);
        } else {
            self.draw(&src.blurred(radius), placement, opacity);
        }
    }
}

fn blend_over(dst: &mut [u8], src: &[u8], opacity: f32) {
    let alpha = opacity * src[3] as f32 / 255.0;
    if alpha >= 1.0 {
        dst.copy_from_slice(src);
        return;
    }
    let keep = 1.0 - alpha;
    for c in 0..3 {
        dst[c] = (src[c] as f32 * alpha + dst[c] as f32 * keep).round() as u8;
    }
    dst[3] = (255.0 * alpha + dst[3] as f32 * keep).round().min(255.0) as u8;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
