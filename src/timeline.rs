//! Timeline assembly: sequences per-slot clips end-to-end, mixes narration
//! with an optional looped background bed, and drives the frame sink over the
//! assembled timeline.

use std::path::Path;
use std::sync::Arc;

use crate::{
    clip::{ClipPlan, SlotFrames, plan_clip},
    encode_ffmpeg::{FrameSink, SinkConfig},
    error::{VoxreelError, VoxreelResult},
    job::CancelToken,
    media::{AudioPcm, MIX_SAMPLE_RATE, MediaRef, MediaStore, load_audio},
};

/// Measured narration durations below this are treated as unusable.
pub const NEAR_ZERO_SECS: f64 = 0.1;
/// Stand-in clip duration for near-zero or unmeasurable narration.
pub const FALLBACK_CLIP_SECS: f64 = 2.0;
/// Background bed volume relative to unity narration.
pub const BACKGROUND_VOLUME: f32 = 0.12;
/// Output frame rate.
pub const FRAME_RATE: u32 = 24;

/// Clip duration derived from a narration measurement, floored away from
/// degenerate values.
pub fn effective_duration(measured_secs: f64) -> f64 {
    if !measured_secs.is_finite() || measured_secs < NEAR_ZERO_SECS {
        FALLBACK_CLIP_SECS
    } else {
        measured_secs
    }
}

/// One slot ready for assembly: rendered frame variants, the alternation
/// plan, and the narration that determined the clip duration.
#[derive(Clone, Debug)]
pub struct PreparedSlot {
    pub frames: SlotFrames,
    pub plan: ClipPlan,
    pub narration: Arc<AudioPcm>,
}

impl PreparedSlot {
    /// Build the slot clip: duration comes from the narration, floored via
    /// [`effective_duration`].
    pub fn new(frames: SlotFrames, narration: Arc<AudioPcm>) -> VoxreelResult<Self> {
        let plan = plan_clip(effective_duration(narration.duration_secs()))?;
        Ok(Self {
            frames,
            plan,
            narration,
        })
    }

    pub fn duration_secs(&self) -> f64 {
        self.plan.duration_secs
    }
}

/// Cumulative slot boundaries in seconds: `n + 1` entries, starting at 0.
pub fn slot_boundaries(slots: &[PreparedSlot]) -> Vec<f64> {
    let mut bounds = Vec::with_capacity(slots.len() + 1);
    let mut acc = 0.0f64;
    bounds.push(acc);
    for slot in slots {
        acc += slot.duration_secs();
        bounds.push(acc);
    }
    bounds
}

pub fn total_duration_secs(slots: &[PreparedSlot]) -> f64 {
    slots.iter().map(PreparedSlot::duration_secs).sum()
}

fn sec_to_sample(sec: f64, sample_rate: u32) -> u64 {
    (sec * f64::from(sample_rate)).round().max(0.0) as u64
}

fn sec_to_frame(sec: f64, fps: u32) -> u64 {
    (sec * f64::from(fps)).round().max(0.0) as u64
}

/// One source placed on the mix timeline. Sources keep their native sample
/// rate; the mixer samples them at the mix rate with linear interpolation.
#[derive(Clone, Debug)]
pub struct MixSegment {
    pub start_sample: u64,
    pub end_sample: u64,
    pub source_start_sec: f64,
    pub volume: f32,
    pub source: Arc<AudioPcm>,
}

/// Everything the mixer needs to produce the final interleaved buffer.
#[derive(Clone, Debug)]
pub struct MixPlan {
    pub sample_rate: u32,
    pub channels: u16,
    pub total_samples: u64,
    pub segments: Vec<MixSegment>,
}

/// Lay out narration per slot and the attenuated background bed.
///
/// Narration segments span their whole slot, so a narration shorter than its
/// (floored) slot falls silent at the tail. The background is repeated in
/// whole copies until it covers the timeline; the last copy's segment is
/// trimmed to the timeline end, which trims the mixed bed to exactly the
/// timeline duration.
pub fn build_mix_plan(slots: &[PreparedSlot], background: Option<&Arc<AudioPcm>>) -> MixPlan {
    let bounds = slot_boundaries(slots);
    let total_samples = sec_to_sample(bounds[bounds.len() - 1], MIX_SAMPLE_RATE);

    let mut segments = Vec::<MixSegment>::new();
    for (i, slot) in slots.iter().enumerate() {
        let start_sample = sec_to_sample(bounds[i], MIX_SAMPLE_RATE);
        let end_sample = sec_to_sample(bounds[i + 1], MIX_SAMPLE_RATE);
        if end_sample <= start_sample {
            continue;
        }
        segments.push(MixSegment {
            start_sample,
            end_sample,
            source_start_sec: 0.0,
            volume: 1.0,
            source: Arc::clone(&slot.narration),
        });
    }

    if let Some(bg) = background {
        let bg_secs = bg.duration_secs();
        if bg_secs > 0.0 {
            let mut copy = 0u64;
            loop {
                let start_sample = sec_to_sample(copy as f64 * bg_secs, MIX_SAMPLE_RATE);
                if start_sample >= total_samples {
                    break;
                }
                let end_sample =
                    sec_to_sample((copy + 1) as f64 * bg_secs, MIX_SAMPLE_RATE).min(total_samples);
                if end_sample <= start_sample {
                    break;
                }
                segments.push(MixSegment {
                    start_sample,
                    end_sample,
                    source_start_sec: 0.0,
                    volume: BACKGROUND_VOLUME,
                    source: Arc::clone(bg),
                });
                copy += 1;
            }
        }
    }

    MixPlan {
        sample_rate: MIX_SAMPLE_RATE,
        channels: 2,
        total_samples,
        segments,
    }
}

/// Mix all segments additively into one interleaved buffer, clamped to
/// `[-1, 1]`. Narration keeps unity gain; only the background is attenuated.
pub fn mix_plan(plan: &MixPlan) -> Vec<f32> {
    let frames = plan.total_samples as usize;
    let mut out = vec![0.0f32; frames * usize::from(plan.channels)];

    for seg in &plan.segments {
        if seg.end_sample <= seg.start_sample {
            continue;
        }
        let src = &seg.source.interleaved_f32;
        let src_frames = seg.source.frames();
        if src_frames == 0 {
            continue;
        }
        let src_channels = usize::from(seg.source.channels);

        for dst_sample in seg.start_sample..seg.end_sample {
            let rel_sec = ((dst_sample - seg.start_sample) as f64) / f64::from(plan.sample_rate);
            let src_sec = seg.source_start_sec + rel_sec;
            let src_pos = src_sec * f64::from(seg.source.sample_rate);
            if !src_pos.is_finite() || src_pos < 0.0 {
                break;
            }
            let src_frame0 = src_pos.floor() as usize;
            if src_frame0 >= src_frames {
                break;
            }
            let src_frame1 = (src_frame0 + 1).min(src_frames - 1);
            let frac = (src_pos - src_frame0 as f64) as f32;

            let (l, r) = if src_channels == 1 {
                let v0 = src[src_frame0];
                let v1 = src[src_frame1];
                let v = v0 + ((v1 - v0) * frac);
                (v, v)
            } else {
                let i0 = src_frame0 * src_channels;
                let i1 = src_frame1 * src_channels;
                let l0 = src[i0];
                let l1 = src[i1];
                let r0 = src[i0 + 1];
                let r1 = src[i1 + 1];
                (l0 + ((l1 - l0) * frac), r0 + ((r1 - r0) * frac))
            };

            let dst_idx = dst_sample as usize * usize::from(plan.channels);
            out[dst_idx] += l * seg.volume;
            if plan.channels > 1 {
                out[dst_idx + 1] += r * seg.volume;
            }
        }
    }

    for s in &mut out {
        *s = s.clamp(-1.0, 1.0);
    }
    out
}

/// Write interleaved f32 samples as a raw little-endian PCM file for the
/// encoder's audio side input.
pub fn write_mix_to_f32le_file(samples_interleaved: &[f32], out_path: &Path) -> VoxreelResult<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            VoxreelError::storage(format!(
                "failed to create audio mix directory '{}': {e}",
                parent.display()
            ))
        })?;
    }

    let mut bytes = Vec::<u8>::with_capacity(samples_interleaved.len() * 4);
    for &sample in samples_interleaved {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    std::fs::write(out_path, bytes).map_err(|e| {
        VoxreelError::storage(format!(
            "failed to write mixed audio file '{}': {e}",
            out_path.display()
        ))
    })
}

/// Load and sanity-check a background audio reference. Callers treat any
/// error here as non-fatal and proceed without a background bed.
pub fn load_background(store: &MediaStore, media: &MediaRef) -> VoxreelResult<Arc<AudioPcm>> {
    let path = store.upload_path(media);
    let pcm = load_audio(&path).map_err(|e| {
        VoxreelError::background_mix(format!("failed to load background audio '{media}': {e}"))
    })?;
    if pcm.frames() == 0 {
        return Err(VoxreelError::background_mix(format!(
            "background audio '{media}' decoded to zero samples"
        )));
    }
    Ok(Arc::new(pcm))
}

/// Push every timeline frame into `sink` in order, one slot after another.
///
/// Frame boundaries come from the same cumulative slot boundaries as the
/// audio mix, so video and narration stay aligned over long timelines.
/// Cancellation is checked between slots; a cancelled render fails like any
/// other composition error.
pub fn render_video(
    slots: &[PreparedSlot],
    cfg: SinkConfig,
    sink: &mut dyn FrameSink,
    cancel: &CancelToken,
) -> VoxreelResult<u64> {
    if slots.is_empty() {
        return Err(VoxreelError::composition(
            "timeline has no slots to render",
        ));
    }

    let fps = cfg.fps;
    sink.begin(cfg)?;

    let bounds = slot_boundaries(slots);
    let total_frames = sec_to_frame(bounds[bounds.len() - 1], fps);

    for (i, slot) in slots.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(VoxreelError::composition("render cancelled"));
        }
        let first = sec_to_frame(bounds[i], fps);
        let last = sec_to_frame(bounds[i + 1], fps);
        tracing::debug!(slot = i, frames = last - first, "rendering slot clip");

        for frame_index in first..last {
            let local_sec = ((frame_index - first) as f64) / f64::from(fps);
            let frame = slot.frames.frame(slot.plan.variant_at(local_sec));
            sink.push_frame(frame_index, frame)?;
        }
    }

    sink.end()?;
    Ok(total_frames)
}
