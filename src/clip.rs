//! Pseudo-lip-sync clip synthesis: a still portrait becomes an animated clip
//! by alternating between the full-scale frame and a 2% shrunk variant on a
//! fixed cadence. The alternation is cosmetic and runs even for silent audio.

use std::path::Path;

use crate::error::{VoxreelError, VoxreelResult};

/// Portraits are scaled to this width before composition.
pub const REFERENCE_WIDTH: u32 = 1280;
/// Length of one alternation sub-segment, seconds.
pub const SEGMENT_SECS: f64 = 0.12;
/// Scale of the "mouth moving" variant relative to the base frame.
pub const SHRINK_FACTOR: f64 = 0.98;

/// Which of the two rendered variants a sub-segment shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameVariant {
    Base,
    Shrunk,
}

#[derive(Clone, Copy, Debug)]
pub struct ClipSegment {
    pub start_secs: f64,
    pub end_secs: f64,
    pub variant: FrameVariant,
}

/// Partition of `[0, duration)` into alternating sub-segments, starting with
/// the base variant, last sub-segment truncated to fit.
#[derive(Clone, Debug)]
pub struct ClipPlan {
    pub duration_secs: f64,
    pub segments: Vec<ClipSegment>,
}

pub fn plan_clip(duration_secs: f64) -> VoxreelResult<ClipPlan> {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Err(VoxreelError::composition(format!(
            "clip duration must be positive and finite, got {duration_secs}"
        )));
    }

    let mut segments = Vec::new();
    let mut index = 0usize;
    loop {
        let start = index as f64 * SEGMENT_SECS;
        if start >= duration_secs {
            break;
        }
        // End is the next sub-segment's start, so the partition is contiguous
        // and the per-segment lengths telescope to exactly `duration_secs`.
        let end = ((index + 1) as f64 * SEGMENT_SECS).min(duration_secs);
        segments.push(ClipSegment {
            start_secs: start,
            end_secs: end,
            variant: variant_for_index(index),
        });
        index += 1;
    }

    Ok(ClipPlan {
        duration_secs,
        segments,
    })
}

impl ClipPlan {
    /// Variant shown at clip-local time `t` (seconds).
    pub fn variant_at(&self, t: f64) -> FrameVariant {
        if !t.is_finite() || t <= 0.0 {
            return FrameVariant::Base;
        }
        variant_for_index((t / SEGMENT_SECS).floor() as usize)
    }

    pub fn total_secs(&self) -> f64 {
        self.segments.iter().map(|s| s.end_secs - s.start_secs).sum()
    }
}

fn variant_for_index(index: usize) -> FrameVariant {
    if index.is_multiple_of(2) {
        FrameVariant::Base
    } else {
        FrameVariant::Shrunk
    }
}

/// Opaque RGBA8 frame, row-major, tightly packed.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Shared frame geometry of one timeline. Width is the reference width; the
/// height covers the tallest scaled portrait, rounded up to even for yuv420p.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn covering(scaled_heights: impl IntoIterator<Item = u32>) -> Canvas {
        let tallest = scaled_heights.into_iter().max().unwrap_or(0).max(2);
        Canvas {
            width: REFERENCE_WIDTH,
            height: tallest + (tallest % 2),
        }
    }
}

/// Both rendered variants of one slot, composited on the shared canvas.
#[derive(Clone, Debug)]
pub struct SlotFrames {
    pub base: Frame,
    pub shrunk: Frame,
}

impl SlotFrames {
    pub fn frame(&self, variant: FrameVariant) -> &Frame {
        match variant {
            FrameVariant::Base => &self.base,
            FrameVariant::Shrunk => &self.shrunk,
        }
    }
}

pub fn load_portrait(path: &Path) -> VoxreelResult<image::RgbaImage> {
    let img = image::open(path).map_err(|e| {
        VoxreelError::composition(format!("failed to decode portrait '{}': {e}", path.display()))
    })?;
    Ok(img.to_rgba8())
}

/// Height of a portrait after scaling to the reference width.
pub fn scaled_height(portrait: &image::RgbaImage) -> VoxreelResult<u32> {
    let (w, h) = portrait.dimensions();
    if w == 0 || h == 0 {
        return Err(VoxreelError::composition("portrait has zero dimensions"));
    }
    let scaled = (f64::from(h) * f64::from(REFERENCE_WIDTH) / f64::from(w)).round() as u32;
    Ok(scaled.max(1))
}

/// Render the base and shrunk variants of a portrait, centered on `canvas`
/// over black.
pub fn compose_slot_frames(
    portrait: &image::RgbaImage,
    canvas: Canvas,
) -> VoxreelResult<SlotFrames> {
    let height = scaled_height(portrait)?;
    let base = composite_centered(portrait, REFERENCE_WIDTH, height, canvas);

    let shrunk_w = ((f64::from(REFERENCE_WIDTH) * SHRINK_FACTOR).round() as u32).max(1);
    let shrunk_h = ((f64::from(height) * SHRINK_FACTOR).round() as u32).max(1);
    let shrunk = composite_centered(portrait, shrunk_w, shrunk_h, canvas);

    Ok(SlotFrames { base, shrunk })
}

fn composite_centered(
    portrait: &image::RgbaImage,
    target_w: u32,
    target_h: u32,
    canvas: Canvas,
) -> Frame {
    let scaled = image::imageops::resize(
        portrait,
        target_w,
        target_h,
        image::imageops::FilterType::CatmullRom,
    );
    let mut out = image::RgbaImage::from_pixel(canvas.width, canvas.height, image::Rgba([0, 0, 0, 255]));
    let x = (i64::from(canvas.width) - i64::from(target_w)) / 2;
    let y = (i64::from(canvas.height) - i64::from(target_h)) / 2;
    image::imageops::replace(&mut out, &scaled, x, y);

    // Transparent portrait regions blend over the black canvas; the encoder
    // expects fully opaque frames.
    for px in out.pixels_mut() {
        let a = u16::from(px.0[3]);
        if a != 255 {
            px.0[0] = ((u16::from(px.0[0]) * a + 127) / 255) as u8;
            px.0[1] = ((u16::from(px.0[1]) * a + 127) / 255) as u8;
            px.0[2] = ((u16::from(px.0[2]) * a + 127) / 255) as u8;
        }
        px.0[3] = 255;
    }

    Frame {
        width: canvas.width,
        height: canvas.height,
        data: out.into_raw(),
    }
}
