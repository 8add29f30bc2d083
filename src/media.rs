//! Media storage and audio plumbing: opaque file references under the
//! configured roots, staging of uploaded/synthesized artifacts, placeholder
//! portrait generation, and decoding of narration/background audio to PCM.

use std::path::{Path, PathBuf};

use crate::{
    config::PipelineConfig,
    error::{VoxreelError, VoxreelResult},
};

/// Sample rate of the narration/background mix.
pub const MIX_SAMPLE_RATE: u32 = 48_000;

pub const PLACEHOLDER_WIDTH: u32 = 1280;
pub const PLACEHOLDER_HEIGHT: u32 = 720;
pub const PLACEHOLDER_RGB: [u8; 3] = [245, 245, 245];

/// Opaque reference to a stored media file: a normalized path relative to a
/// storage root. Which root applies is decided by the resolving call site
/// (uploads vs outputs).
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MediaRef(String);

impl MediaRef {
    pub fn new(source: &str) -> VoxreelResult<Self> {
        normalize_rel_path(source).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MediaRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for MediaRef {
    type Error = VoxreelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<MediaRef> for String {
    fn from(value: MediaRef) -> Self {
        value.0
    }
}

/// Normalize and validate a root-relative media path.
///
/// The normalized result uses `/` separators, removes `.` segments, and
/// rejects absolute paths or parent traversals (`..`).
fn normalize_rel_path(source: &str) -> VoxreelResult<String> {
    let s = source.replace('\\', "/");
    if s.starts_with('/') {
        return Err(VoxreelError::validation("media paths must be relative"));
    }
    if s.is_empty() {
        return Err(VoxreelError::validation("media path must be non-empty"));
    }

    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(VoxreelError::validation("media paths must not contain '..'"));
        }
        out.push(part);
    }

    if out.is_empty() {
        return Err(VoxreelError::validation("media path must contain a file name"));
    }

    Ok(out.join("/"))
}

/// Storage area a staged upload lands in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaArea {
    Image,
    Audio,
    Music,
}

impl MediaArea {
    fn dir(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Music => "music",
        }
    }
}

/// Filesystem-backed media collaborator: uploads, render outputs, and scratch
/// files live under the three configured roots.
#[derive(Clone, Debug)]
pub struct MediaStore {
    upload_root: PathBuf,
    output_root: PathBuf,
    tmp_root: PathBuf,
}

impl MediaStore {
    /// Open the store, creating the root layout if missing.
    pub fn open(cfg: &PipelineConfig) -> VoxreelResult<Self> {
        for dir in [
            cfg.upload_root.join(MediaArea::Image.dir()),
            cfg.upload_root.join(MediaArea::Audio.dir()),
            cfg.upload_root.join(MediaArea::Music.dir()),
            cfg.output_root.clone(),
            cfg.tmp_root.clone(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                VoxreelError::storage(format!(
                    "failed to create media directory '{}': {e}",
                    dir.display()
                ))
            })?;
        }
        Ok(Self {
            upload_root: cfg.upload_root.clone(),
            output_root: cfg.output_root.clone(),
            tmp_root: cfg.tmp_root.clone(),
        })
    }

    /// Absolute path of an upload-area reference (images, voices, music).
    pub fn upload_path(&self, media: &MediaRef) -> PathBuf {
        self.upload_root.join(media.as_str())
    }

    /// Absolute path of an output-area reference (rendered videos).
    pub fn output_path(&self, media: &MediaRef) -> PathBuf {
        self.output_root.join(media.as_str())
    }

    /// Scratch path for an in-flight artifact.
    pub fn tmp_path(&self, file_name: &str) -> PathBuf {
        self.tmp_root.join(file_name)
    }

    /// Copy an external file into an upload area under a fresh name.
    pub fn import(&self, src: &Path, area: MediaArea) -> VoxreelResult<MediaRef> {
        let media = self.fresh_ref(area, src.extension().and_then(|e| e.to_str()))?;
        let dest = self.upload_path(&media);
        std::fs::copy(src, &dest).map_err(|e| {
            VoxreelError::storage(format!(
                "failed to import '{}' into media store: {e}",
                src.display()
            ))
        })?;
        Ok(media)
    }

    /// Move a finished scratch file into an upload area under a fresh name.
    pub fn promote_tmp(&self, tmp: &Path, area: MediaArea, ext: &str) -> VoxreelResult<MediaRef> {
        let media = self.fresh_ref(area, Some(ext))?;
        let dest = self.upload_path(&media);
        if std::fs::rename(tmp, &dest).is_err() {
            // tmp and uploads may sit on different filesystems.
            std::fs::copy(tmp, &dest).map_err(|e| {
                VoxreelError::storage(format!(
                    "failed to promote '{}' into media store: {e}",
                    tmp.display()
                ))
            })?;
            let _ = std::fs::remove_file(tmp);
        }
        Ok(media)
    }

    /// Reference for a named background-music preset, when the preset file
    /// exists under the music area.
    pub fn music_preset(&self, name: &str) -> Option<MediaRef> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return None;
        }
        let media = MediaRef::new(&format!("{}/{name}.mp3", MediaArea::Music.dir())).ok()?;
        self.upload_path(&media).is_file().then_some(media)
    }

    /// Generate the flat light-gray stand-in portrait used when a request
    /// carries no images.
    pub fn generate_placeholder_portrait(&self) -> VoxreelResult<MediaRef> {
        let media = self.fresh_ref(MediaArea::Image, Some("png"))?;
        let path = self.upload_path(&media);
        let [r, g, b] = PLACEHOLDER_RGB;
        let img = image::RgbImage::from_pixel(
            PLACEHOLDER_WIDTH,
            PLACEHOLDER_HEIGHT,
            image::Rgb([r, g, b]),
        );
        img.save(&path).map_err(|e| {
            VoxreelError::input(format!(
                "failed to write placeholder portrait '{}': {e}",
                path.display()
            ))
        })?;
        Ok(media)
    }

    /// Output reference and path for a finished render.
    pub fn video_output(&self, job_id: &str) -> VoxreelResult<(MediaRef, PathBuf)> {
        let media = MediaRef::new(&format!("video_{job_id}.mp4"))?;
        let path = self.output_path(&media);
        Ok((media, path))
    }

    fn fresh_ref(&self, area: MediaArea, ext: Option<&str>) -> VoxreelResult<MediaRef> {
        let stem = uuid::Uuid::new_v4().simple().to_string();
        let rel = match ext {
            Some(ext) if !ext.is_empty() => {
                format!("{}/{stem}.{}", area.dir(), ext.to_ascii_lowercase())
            }
            _ => format!("{}/{stem}", area.dir()),
        };
        MediaRef::new(&rel)
    }
}

/// Interleaved PCM with its native sample rate. The mixer samples sources at
/// the mix rate with linear interpolation, so no resampling happens here.
#[derive(Clone, Debug)]
pub struct AudioPcm {
    pub sample_rate: u32,
    pub channels: u16,
    pub interleaved_f32: Vec<f32>,
}

impl AudioPcm {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.interleaved_f32.len() / usize::from(self.channels)
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }
}

/// Decode an audio file to PCM. WAV files (the synthesis engine's output
/// format) are read in-process; everything else goes through ffmpeg.
pub fn load_audio(path: &Path) -> VoxreelResult<AudioPcm> {
    let is_wav = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
    if is_wav {
        read_wav_pcm(path)
    } else {
        decode_audio_f32_stereo(path, MIX_SAMPLE_RATE)
    }
}

fn read_wav_pcm(path: &Path) -> VoxreelResult<AudioPcm> {
    let mut reader = hound::WavReader::open(path).map_err(|e| {
        VoxreelError::storage(format!("failed to open wav '{}': {e}", path.display()))
    })?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(VoxreelError::storage(format!(
            "wav '{}' reports zero channels",
            path.display()
        )));
    }

    let read_err = |e: hound::Error| {
        VoxreelError::storage(format!("failed to read wav '{}': {e}", path.display()))
    };
    let raw: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(read_err)?,
        hound::SampleFormat::Int => {
            let scale = 1.0f32 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(read_err)?
        }
    };

    // Fold anything beyond stereo down to the first two channels; the mixer
    // only addresses mono and stereo sources.
    if spec.channels <= 2 {
        return Ok(AudioPcm {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            interleaved_f32: raw,
        });
    }
    let src_channels = usize::from(spec.channels);
    let mut stereo = Vec::with_capacity(raw.len() / src_channels * 2);
    for frame in raw.chunks_exact(src_channels) {
        stereo.push(frame[0]);
        stereo.push(frame[1]);
    }
    Ok(AudioPcm {
        sample_rate: spec.sample_rate,
        channels: 2,
        interleaved_f32: stereo,
    })
}

/// Decode any ffmpeg-readable audio source to stereo f32 PCM at the given
/// rate.
pub fn decode_audio_f32_stereo(path: &Path, sample_rate: u32) -> VoxreelResult<AudioPcm> {
    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            "2",
            "-ar",
            &sample_rate.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| VoxreelError::storage(format!("failed to run ffmpeg for audio decode: {e}")))?;

    if !out.status.success() {
        return Err(VoxreelError::storage(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    if !out.stdout.len().is_multiple_of(4) {
        return Err(VoxreelError::storage(
            "decoded audio byte length is not aligned to f32 samples",
        ));
    }
    let mut pcm = Vec::<f32>::with_capacity(out.stdout.len() / 4);
    for chunk in out.stdout.chunks_exact(4) {
        pcm.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }

    Ok(AudioPcm {
        sample_rate,
        channels: 2,
        interleaved_f32: pcm,
    })
}
