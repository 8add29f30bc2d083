//! Speech synthesis collaborator and per-slot voice resolution.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::{
    error::{VoxreelError, VoxreelResult},
    media::{MediaArea, MediaRef, MediaStore},
};

/// Utterance synthesized for slots whose segment text is empty, so every slot
/// still gets a non-zero-length audio artifact.
pub const PLACEHOLDER_UTTERANCE: &str = " ";

/// External text-to-speech engine.
///
/// Implementations write a WAV file to `dest` and must fail distinguishably
/// on empty text or an unsupported language.
pub trait SpeechSynthesizer: Send + Sync {
    /// Engine name, for logs.
    fn name(&self) -> &str;

    fn synthesize(&self, text: &str, language: &str, dest: &Path) -> VoxreelResult<()>;
}

/// piper-based engine: one voice model per language code, text on stdin.
pub struct PiperSynthesizer {
    command: String,
    models: BTreeMap<String, PathBuf>,
}

impl PiperSynthesizer {
    pub fn new(models: BTreeMap<String, PathBuf>) -> Self {
        Self {
            command: "piper".to_string(),
            models,
        }
    }

    /// Override the engine executable (name on PATH or an absolute path).
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }
}

impl SpeechSynthesizer for PiperSynthesizer {
    fn name(&self) -> &str {
        "piper"
    }

    fn synthesize(&self, text: &str, language: &str, dest: &Path) -> VoxreelResult<()> {
        if text.is_empty() {
            return Err(VoxreelError::synthesis("refusing to synthesize empty text"));
        }
        let model = self.models.get(language).ok_or_else(|| {
            VoxreelError::synthesis(format!("no voice model configured for language '{language}'"))
        })?;

        let mut child = Command::new(&self.command)
            .arg("--model")
            .arg(model)
            .arg("--output_file")
            .arg(dest)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                VoxreelError::synthesis(format!(
                    "failed to spawn tts engine '{}': {e}",
                    self.command
                ))
            })?;

        {
            use std::io::Write as _;
            let stdin = child.stdin.as_mut().ok_or_else(|| {
                VoxreelError::synthesis("failed to open tts engine stdin (unexpected)")
            })?;
            stdin.write_all(text.as_bytes()).map_err(|e| {
                VoxreelError::synthesis(format!("failed to write text to tts engine: {e}"))
            })?;
        }
        drop(child.stdin.take());

        let out = child.wait_with_output().map_err(|e| {
            VoxreelError::synthesis(format!("failed to wait for tts engine: {e}"))
        })?;
        if !out.status.success() {
            return Err(VoxreelError::synthesis(format!(
                "tts engine exited with status {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Decides each slot's narration source: uploaded clip, synthesized segment
/// text, or a synthesized minimal placeholder. Synthesis failure aborts the
/// job; a partially written artifact is never promoted into the store.
pub struct VoiceResolver<'a> {
    synthesizer: &'a dyn SpeechSynthesizer,
    store: &'a MediaStore,
    language: &'a str,
}

impl<'a> VoiceResolver<'a> {
    pub fn new(
        synthesizer: &'a dyn SpeechSynthesizer,
        store: &'a MediaStore,
        language: &'a str,
    ) -> Self {
        Self {
            synthesizer,
            store,
            language,
        }
    }

    /// Resolve one slot's audio reference, strictly in fallback order.
    pub fn resolve(
        &self,
        slot_index: usize,
        segment_text: &str,
        uploaded: Option<&MediaRef>,
    ) -> VoxreelResult<MediaRef> {
        if let Some(voice) = uploaded {
            tracing::debug!(slot_index, voice = %voice, "using uploaded voice clip");
            return Ok(voice.clone());
        }

        let text = segment_text.trim();
        let utterance = if text.is_empty() {
            tracing::debug!(slot_index, "empty segment, synthesizing placeholder utterance");
            PLACEHOLDER_UTTERANCE
        } else {
            text
        };
        let media = self.synthesize_clip(utterance)?;
        tracing::debug!(
            slot_index,
            engine = self.synthesizer.name(),
            media = %media,
            "synthesized narration"
        );
        Ok(media)
    }

    /// Synthesize `text` into a stored audio artifact. Also backs the voice
    /// preview operation, which runs outside any job.
    pub fn synthesize_clip(&self, text: &str) -> VoxreelResult<MediaRef> {
        let tmp = self
            .store
            .tmp_path(&format!("synth_{}.wav", uuid::Uuid::new_v4().simple()));
        if let Err(e) = self.synthesizer.synthesize(text, self.language, &tmp) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }
        self.store.promote_tmp(&tmp, MediaArea::Audio, "wav")
    }
}
