//! The render driver: accepts a request, then walks segmentation, voice
//! resolution, clip synthesis, timeline assembly, and the final encode as one
//! synchronous job, recording the outcome on the job record.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;

use crate::{
    clip::{Canvas, compose_slot_frames, load_portrait, scaled_height},
    config::PipelineConfig,
    encode_ffmpeg::{AudioInputConfig, FfmpegSink, FfmpegSinkOpts, FrameSink, SinkConfig},
    error::{VoxreelError, VoxreelResult},
    job::{CancelToken, JobStore, RenderJob},
    media::{AudioPcm, MediaRef, MediaStore, load_audio},
    model::{CharacterSlot, JobMetadata, RenderRequest, SlotRecord, default_title, pad_styles},
    script::segment_script,
    timeline::{
        FRAME_RATE, PreparedSlot, build_mix_plan, load_background, mix_plan, render_video,
        total_duration_secs, write_mix_to_f32le_file,
    },
    voice::{SpeechSynthesizer, VoiceResolver},
};

/// Render orchestrator. One instance serves many jobs; each [`run`] call is
/// one blocking job, so callers can hand instances to a worker pool with one
/// job per worker.
///
/// [`run`]: RenderPipeline::run
pub struct RenderPipeline<'a> {
    config: &'a PipelineConfig,
    store: &'a MediaStore,
    synthesizer: &'a dyn SpeechSynthesizer,
}

struct ResolvedNarration {
    media: MediaRef,
    pcm: Arc<AudioPcm>,
}

struct ExecuteOutcome {
    output: MediaRef,
    slots: Vec<SlotRecord>,
}

impl<'a> RenderPipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        store: &'a MediaStore,
        synthesizer: &'a dyn SpeechSynthesizer,
    ) -> Self {
        Self {
            config,
            store,
            synthesizer,
        }
    }

    /// Run one render job to completion, encoding through the system ffmpeg.
    ///
    /// Returns `Err` only before a job record exists (rejected request,
    /// failed placeholder generation) or when the job store itself fails.
    /// Pipeline failures are captured on the returned job as `failed`.
    pub fn run(
        &self,
        request: RenderRequest,
        jobs: &dyn JobStore,
        cancel: &CancelToken,
    ) -> VoxreelResult<RenderJob> {
        self.run_inner(request, jobs, cancel, None)
    }

    /// Same as [`run`], but frames go to the provided sink instead of an
    /// ffmpeg process. The output reference is recorded as usual.
    ///
    /// [`run`]: RenderPipeline::run
    pub fn run_with_sink(
        &self,
        request: RenderRequest,
        jobs: &dyn JobStore,
        cancel: &CancelToken,
        sink: &mut dyn FrameSink,
    ) -> VoxreelResult<RenderJob> {
        self.run_inner(request, jobs, cancel, Some(sink))
    }

    /// Synthesize a short standalone voice clip, outside any job. Backs the
    /// voice preview surface.
    pub fn preview_voice(&self, text: &str, language: Option<&str>) -> VoxreelResult<MediaRef> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VoxreelError::validation("preview text must be non-empty"));
        }
        let language = language.unwrap_or(&self.config.default_language);
        VoiceResolver::new(self.synthesizer, self.store, language).synthesize_clip(text)
    }

    fn run_inner(
        &self,
        mut request: RenderRequest,
        jobs: &dyn JobStore,
        cancel: &CancelToken,
        sink_override: Option<&mut dyn FrameSink>,
    ) -> VoxreelResult<RenderJob> {
        self.config.validate()?;
        request.validate_fields()?;
        self.accept(&mut request)?;
        request.validate()?;

        let language = request
            .language
            .clone()
            .unwrap_or_else(|| self.config.default_language.clone());
        let now = Utc::now();
        let metadata = JobMetadata {
            title: request.title.clone().unwrap_or_else(|| default_title(now)),
            script: request.script.clone(),
            language: language.clone(),
            quality: request.quality,
            length_type: request.length_type.clone(),
            styles: pad_styles(&request.styles, request.slots.len()),
            background_audio: request.background_audio.clone(),
            slots: Vec::new(),
            created_at: now,
        };

        let mut job = RenderJob::new(metadata);
        jobs.put(&job)?;
        job.start_rendering()?;
        jobs.put(&job)?;
        tracing::info!(
            job = %job.id,
            slots = request.slots.len(),
            quality = request.quality.as_str(),
            "render accepted"
        );

        let job_id = job.id.to_string();
        match self.execute(&request, &language, &job_id, cancel, sink_override) {
            Ok(outcome) => {
                tracing::info!(job = %job.id, output = %outcome.output, "render finished");
                job.metadata.slots = outcome.slots;
                job.complete(outcome.output)?;
            }
            Err(e) => {
                let detail = e.to_string();
                tracing::error!(job = %job.id, error = %detail, "render failed");
                job.fail(detail)?;
            }
        }
        jobs.put(&job)?;
        Ok(job)
    }

    /// A request with no slots gets exactly one generated placeholder slot.
    /// Failure here is surfaced to the caller; no job record is touched.
    fn accept(&self, request: &mut RenderRequest) -> VoxreelResult<()> {
        if request.slots.is_empty() {
            let image = self.store.generate_placeholder_portrait()?;
            tracing::info!(image = %image, "request had no slots, added placeholder portrait");
            request.slots.push(CharacterSlot::new(image));
        }
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(job = job_id))]
    fn execute(
        &self,
        request: &RenderRequest,
        language: &str,
        job_id: &str,
        cancel: &CancelToken,
        sink_override: Option<&mut dyn FrameSink>,
    ) -> VoxreelResult<ExecuteOutcome> {
        let slot_count = request.slots.len();
        let segments = segment_script(&request.script, slot_count);

        let resolver = VoiceResolver::new(self.synthesizer, self.store, language);
        let mut narrations = Vec::with_capacity(slot_count);
        for (index, slot) in request.slots.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(VoxreelError::composition("render cancelled"));
            }
            let media = resolver.resolve(index, &segments[index], slot.voice.as_ref())?;
            let pcm = load_audio(&self.store.upload_path(&media))?;
            narrations.push(ResolvedNarration {
                media,
                pcm: Arc::new(pcm),
            });
        }

        // All portraits share one canvas sized for the tallest scaled image.
        let mut portraits = Vec::with_capacity(slot_count);
        let mut heights = Vec::with_capacity(slot_count);
        for slot in &request.slots {
            let portrait = load_portrait(&self.store.upload_path(&slot.image))?;
            heights.push(scaled_height(&portrait)?);
            portraits.push(portrait);
        }
        let canvas = Canvas::covering(heights);

        let mut prepared = Vec::with_capacity(slot_count);
        let mut records = Vec::with_capacity(slot_count);
        for (index, portrait) in portraits.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(VoxreelError::composition("render cancelled"));
            }
            let frames = compose_slot_frames(portrait, canvas)?;
            let slot = PreparedSlot::new(frames, Arc::clone(&narrations[index].pcm))?;
            records.push(SlotRecord {
                image: request.slots[index].image.clone(),
                audio: narrations[index].media.clone(),
                duration_secs: slot.duration_secs(),
            });
            prepared.push(slot);
        }

        let background = match &request.background_audio {
            Some(media) => match load_background(self.store, media) {
                Ok(pcm) => Some(pcm),
                Err(e) => {
                    tracing::warn!(error = %e, "proceeding without background audio");
                    None
                }
            },
            None => None,
        };

        let plan = build_mix_plan(&prepared, background.as_ref());
        let mixed = mix_plan(&plan);
        let mix_path = self.store.tmp_path(&format!("mix_{job_id}.f32le"));
        write_mix_to_f32le_file(&mixed, &mix_path)?;
        let _mix_guard = TempFileGuard(Some(mix_path.clone()));

        let (output, output_path) = self.store.video_output(job_id)?;
        let cfg = SinkConfig {
            width: canvas.width,
            height: canvas.height,
            fps: FRAME_RATE,
            bitrate_kbps: request.quality.bitrate_kbps(),
            audio: Some(AudioInputConfig {
                path: mix_path,
                sample_rate: plan.sample_rate,
                channels: plan.channels,
            }),
        };
        tracing::info!(
            width = cfg.width,
            height = cfg.height,
            secs = total_duration_secs(&prepared),
            "encoding timeline"
        );

        match sink_override {
            Some(sink) => {
                render_video(&prepared, cfg, sink, cancel)?;
            }
            None => {
                let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(&output_path));
                render_video(&prepared, cfg, &mut sink, cancel)?;
            }
        }

        Ok(ExecuteOutcome {
            output,
            slots: records,
        })
    }
}

struct TempFileGuard(Option<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}
