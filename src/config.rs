use std::path::{Path, PathBuf};

use crate::error::{VoxreelError, VoxreelResult};

/// Runtime configuration injected into the pipeline driver. Storage roots and
/// request defaults live here; per-stage tuning constants live with their
/// stages.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Root for uploaded and staged media (images, voice clips, music).
    pub upload_root: PathBuf,
    /// Root for finished render artifacts.
    pub output_root: PathBuf,
    /// Scratch space for in-flight artifacts (mix files, raw synthesis output).
    pub tmp_root: PathBuf,
    /// Language code used when a request does not carry one.
    pub default_language: String,
}

pub const DEFAULT_LANGUAGE: &str = "hi";

impl PipelineConfig {
    /// Config with the conventional `uploads/`, `outputs/`, `tmp/` layout
    /// under `base`.
    pub fn rooted(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            upload_root: base.join("uploads"),
            output_root: base.join("outputs"),
            tmp_root: base.join("tmp"),
            default_language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    pub fn validate(&self) -> VoxreelResult<()> {
        if self.default_language.trim().is_empty() {
            return Err(VoxreelError::validation(
                "default language must be non-empty",
            ));
        }
        Ok(())
    }
}
