use std::path::{Path, PathBuf};
use std::sync::Mutex;

use voxreel::{
    CancelToken, CharacterSlot, InMemoryJobStore, JobStatus, JobStore, MediaRef, MediaStore,
    PipelineConfig, QualityTier, RenderPipeline, RenderRequest, SpeechSynthesizer, VoxreelError,
    VoxreelResult,
    encode_ffmpeg::InMemorySink,
    media::MediaArea,
};

fn init_logs() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Synthesizer double: records calls and writes a real WAV so the pipeline
/// can measure narration durations.
struct ScriptedSynth {
    calls: Mutex<Vec<(String, String)>>,
    fail: bool,
    secs: f64,
}

impl ScriptedSynth {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: false,
            secs: 0.5,
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl SpeechSynthesizer for ScriptedSynth {
    fn name(&self) -> &str {
        "scripted"
    }

    fn synthesize(&self, text: &str, language: &str, dest: &Path) -> VoxreelResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), language.to_string()));
        if self.fail {
            return Err(VoxreelError::synthesis("engine unavailable"));
        }
        write_wav(dest, self.secs)
    }
}

fn write_wav(path: &Path, secs: f64) -> VoxreelResult<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| VoxreelError::synthesis(e.to_string()))?;
    for _ in 0..(secs * 16_000.0).round() as usize {
        writer
            .write_sample(3_000i16)
            .map_err(|e| VoxreelError::synthesis(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| VoxreelError::synthesis(e.to_string()))
}

struct TestEnv {
    cfg: PipelineConfig,
    store: MediaStore,
    _base: PathBuf,
}

fn test_env(tag: &str) -> TestEnv {
    let base = std::env::temp_dir().join(format!(
        "voxreel_e2e_{tag}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    let cfg = PipelineConfig::rooted(&base);
    let store = MediaStore::open(&cfg).unwrap();
    TestEnv {
        cfg,
        store,
        _base: base,
    }
}

fn stage_portrait(store: &MediaStore, name: &str, width: u32, height: u32) -> MediaRef {
    let tmp = store.tmp_path(&format!("{name}.png"));
    image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40]))
        .save(&tmp)
        .unwrap();
    store.import(&tmp, MediaArea::Image).unwrap()
}

fn stage_voice(store: &MediaStore, name: &str, secs: f64) -> MediaRef {
    let tmp = store.tmp_path(&format!("{name}.wav"));
    write_wav(&tmp, secs).unwrap();
    store.import(&tmp, MediaArea::Audio).unwrap()
}

#[test]
fn marker_script_with_two_slots_ends_done() {
    init_logs();
    let env = test_env("markers");
    let synth = ScriptedSynth::new();
    let pipeline = RenderPipeline::new(&env.cfg, &env.store, &synth);
    let jobs = InMemoryJobStore::new();

    let mut request = RenderRequest::new("[C1]: Hi [C2]: Bye");
    request.language = Some("en".to_string());
    request
        .slots
        .push(CharacterSlot::new(stage_portrait(&env.store, "a", 320, 240)));
    request
        .slots
        .push(CharacterSlot::new(stage_portrait(&env.store, "b", 160, 160)));

    let mut sink = InMemorySink::new();
    let job = pipeline
        .run_with_sink(request, &jobs, &CancelToken::new(), &mut sink)
        .unwrap();

    assert_eq!(job.status, JobStatus::Done);
    let output = job.output.clone().unwrap();
    assert!(output.as_str().starts_with("video_"));
    assert!(output.as_str().ends_with(".mp4"));

    // Segments resolved in slot order, synthesized with the request language.
    assert_eq!(
        synth.calls(),
        vec![
            ("Hi".to_string(), "en".to_string()),
            ("Bye".to_string(), "en".to_string()),
        ]
    );

    // Terminal record persisted with per-slot media.
    let stored = jobs.get(job.id).unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Done);
    assert_eq!(stored.metadata.slots.len(), 2);
    for slot in &stored.metadata.slots {
        assert!(slot.audio.as_str().starts_with("audio/"));
        assert!((slot.duration_secs - 0.5).abs() < 1e-9);
    }

    // Canvas covers the tallest portrait at the reference width:
    // 320x240 scales to 1280x960, 160x160 to 1280x1280.
    let cfg = sink.config().unwrap();
    assert_eq!((cfg.width, cfg.height), (1280, 1280));
    assert_eq!(cfg.fps, 24);
    assert_eq!(cfg.bitrate_kbps, 800);

    // Two 0.5 s clips at 24 fps.
    assert_eq!(sink.frames().len(), 24);

    // Audio side input was configured and its temp mix file cleaned up.
    let audio = cfg.audio.unwrap();
    assert_eq!(audio.sample_rate, 48_000);
    assert_eq!(audio.channels, 2);
    assert!(!audio.path.exists());
}

#[test]
fn empty_request_gets_placeholder_slot_and_default_utterance() {
    let env = test_env("placeholder");
    let synth = ScriptedSynth::new();
    let pipeline = RenderPipeline::new(&env.cfg, &env.store, &synth);
    let jobs = InMemoryJobStore::new();

    let request = RenderRequest::new("   ");
    let mut sink = InMemorySink::new();
    let job = pipeline
        .run_with_sink(request, &jobs, &CancelToken::new(), &mut sink)
        .unwrap();

    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.metadata.slots.len(), 1);
    assert!(job.metadata.slots[0].image.as_str().starts_with("image/"));

    // The default utterance, synthesized in the configured default language.
    assert_eq!(
        synth.calls(),
        vec![("Hello from Voxreel".to_string(), "hi".to_string())]
    );

    // Placeholder portrait is 1280x720, so the canvas matches it exactly.
    let cfg = sink.config().unwrap();
    assert_eq!((cfg.width, cfg.height), (1280, 720));
}

#[test]
fn uploaded_voice_is_kept_verbatim_and_other_slots_synthesized() {
    let env = test_env("uploaded");
    let synth = ScriptedSynth::new();
    let pipeline = RenderPipeline::new(&env.cfg, &env.store, &synth);
    let jobs = InMemoryJobStore::new();

    let voice = stage_voice(&env.store, "narrator", 1.2);
    let mut request = RenderRequest::new("line one\nline two\nline three");
    request.language = Some("en".to_string());
    request.slots.push(CharacterSlot::with_voice(
        stage_portrait(&env.store, "a", 64, 64),
        voice.clone(),
    ));
    request
        .slots
        .push(CharacterSlot::new(stage_portrait(&env.store, "b", 64, 64)));
    request
        .slots
        .push(CharacterSlot::new(stage_portrait(&env.store, "c", 64, 64)));

    let mut sink = InMemorySink::new();
    let job = pipeline
        .run_with_sink(request, &jobs, &CancelToken::new(), &mut sink)
        .unwrap();

    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.metadata.slots.len(), 3);

    // Slot 0 references the uploaded clip itself; its duration is measured
    // from that clip, not synthesized.
    assert_eq!(job.metadata.slots[0].audio, voice);
    assert!((job.metadata.slots[0].duration_secs - 1.2).abs() < 1e-6);

    // Only the voiceless slots were synthesized, in order.
    assert_eq!(
        synth.calls(),
        vec![
            ("line two".to_string(), "en".to_string()),
            ("line three".to_string(), "en".to_string()),
        ]
    );
    assert_ne!(job.metadata.slots[1].audio, voice);
    assert_ne!(job.metadata.slots[2].audio, voice);
}

#[test]
fn synthesis_failure_fails_the_job_with_class_detail() {
    init_logs();
    let env = test_env("synthfail");
    let synth = ScriptedSynth::failing();
    let pipeline = RenderPipeline::new(&env.cfg, &env.store, &synth);
    let jobs = InMemoryJobStore::new();

    let mut request = RenderRequest::new("hello there");
    request
        .slots
        .push(CharacterSlot::new(stage_portrait(&env.store, "a", 64, 64)));

    let mut sink = InMemorySink::new();
    let job = pipeline
        .run_with_sink(request, &jobs, &CancelToken::new(), &mut sink)
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.output.is_none());
    let detail = job.failure.clone().unwrap();
    assert!(detail.contains("synthesis error:"), "detail: {detail}");

    // Nothing reached the encoder, and the terminal state was persisted.
    assert!(sink.frames().is_empty());
    let stored = jobs.get(job.id).unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.failure.as_deref(), Some(detail.as_str()));
}

#[test]
fn cancelled_job_fails_without_synthesizing() {
    let env = test_env("cancel");
    let synth = ScriptedSynth::new();
    let pipeline = RenderPipeline::new(&env.cfg, &env.store, &synth);
    let jobs = InMemoryJobStore::new();

    let mut request = RenderRequest::new("hello");
    request
        .slots
        .push(CharacterSlot::new(stage_portrait(&env.store, "a", 64, 64)));

    let cancel = CancelToken::new();
    cancel.cancel();
    let mut sink = InMemorySink::new();
    let job = pipeline
        .run_with_sink(request, &jobs, &cancel, &mut sink)
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.failure.unwrap().contains("cancelled"));
    assert!(synth.calls().is_empty());
    assert!(sink.frames().is_empty());
}

#[test]
fn unreadable_background_audio_degrades_to_no_bed() {
    let env = test_env("badbed");
    let synth = ScriptedSynth::new();
    let pipeline = RenderPipeline::new(&env.cfg, &env.store, &synth);
    let jobs = InMemoryJobStore::new();

    let mut request = RenderRequest::new("hi");
    request
        .slots
        .push(CharacterSlot::new(stage_portrait(&env.store, "a", 64, 64)));
    request.background_audio = Some(MediaRef::new("music/missing.mp3").unwrap());

    let mut sink = InMemorySink::new();
    let job = pipeline
        .run_with_sink(request, &jobs, &CancelToken::new(), &mut sink)
        .unwrap();

    // Background failures are non-fatal; the render still completes.
    assert_eq!(job.status, JobStatus::Done);
    assert!(!sink.frames().is_empty());
}

#[test]
fn wav_background_bed_keeps_the_job_done() {
    let env = test_env("wavbed");
    let synth = ScriptedSynth::new();
    let pipeline = RenderPipeline::new(&env.cfg, &env.store, &synth);
    let jobs = InMemoryJobStore::new();

    let bed = stage_voice(&env.store, "bed", 0.3);
    let mut request = RenderRequest::new("hi");
    request
        .slots
        .push(CharacterSlot::new(stage_portrait(&env.store, "a", 64, 64)));
    request.background_audio = Some(bed.clone());

    let mut sink = InMemorySink::new();
    let job = pipeline
        .run_with_sink(request, &jobs, &CancelToken::new(), &mut sink)
        .unwrap();

    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.metadata.background_audio, Some(bed));
    assert!(sink.config().unwrap().audio.is_some());
}

#[test]
fn blank_language_is_rejected_before_any_job_exists() {
    let env = test_env("badlang");
    let synth = ScriptedSynth::new();
    let pipeline = RenderPipeline::new(&env.cfg, &env.store, &synth);
    let jobs = InMemoryJobStore::new();

    let mut request = RenderRequest::new("hi");
    request.language = Some("   ".to_string());
    request
        .slots
        .push(CharacterSlot::new(stage_portrait(&env.store, "a", 64, 64)));

    let mut sink = InMemorySink::new();
    let err = pipeline
        .run_with_sink(request, &jobs, &CancelToken::new(), &mut sink)
        .unwrap_err();
    assert!(err.to_string().contains("validation error:"));
}

#[test]
fn rejected_empty_request_leaves_no_staged_placeholder() {
    let env = test_env("badlang_empty");
    let synth = ScriptedSynth::new();
    let pipeline = RenderPipeline::new(&env.cfg, &env.store, &synth);
    let jobs = InMemoryJobStore::new();

    let mut request = RenderRequest::new("hi");
    request.language = Some(" ".to_string());

    let mut sink = InMemorySink::new();
    let err = pipeline
        .run_with_sink(request, &jobs, &CancelToken::new(), &mut sink)
        .unwrap_err();
    assert!(err.to_string().contains("validation error:"));

    // Field validation runs before the placeholder portrait is written, so
    // the image area stays empty.
    let images = std::fs::read_dir(env.cfg.upload_root.join("image")).unwrap();
    assert_eq!(images.count(), 0);
}

#[test]
fn metadata_defaults_title_pads_styles_and_maps_quality() {
    let env = test_env("metadata");
    let synth = ScriptedSynth::new();
    let pipeline = RenderPipeline::new(&env.cfg, &env.store, &synth);
    let jobs = InMemoryJobStore::new();

    let mut request = RenderRequest::new("[C1]: a [C2]: b");
    request.language = Some("en".to_string());
    request.styles = vec!["Calm".to_string()];
    request.quality = QualityTier::from_name("FULL HD");
    request
        .slots
        .push(CharacterSlot::new(stage_portrait(&env.store, "a", 64, 64)));
    request
        .slots
        .push(CharacterSlot::new(stage_portrait(&env.store, "b", 64, 64)));

    let mut sink = InMemorySink::new();
    let job = pipeline
        .run_with_sink(request, &jobs, &CancelToken::new(), &mut sink)
        .unwrap();

    assert_eq!(job.status, JobStatus::Done);
    assert!(job.metadata.title.starts_with("Video "));
    assert_eq!(job.metadata.styles, vec!["Calm", "Calm"]);
    assert_eq!(job.metadata.quality, QualityTier::FullHd);
    assert_eq!(sink.config().unwrap().bitrate_kbps, 2_500);
}
