use chrono::{DateTime, Utc};

use crate::{
    error::{VoxreelError, VoxreelResult},
    media::MediaRef,
};

/// Encode-quality selector. Parsing is total: unrecognized names fall back to
/// the lowest tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum QualityTier {
    #[default]
    #[serde(rename = "standard")]
    Standard,
    #[serde(rename = "full-hd")]
    FullHd,
    #[serde(rename = "4k")]
    UltraHd,
}

impl QualityTier {
    /// Case-insensitive tier lookup. Accepts the aliases seen in the wild
    /// (`fullhd`, `full hd`, `1080p`, `2160`, ...); anything else maps to
    /// `Standard`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "full-hd" | "fullhd" | "full hd" | "1080" | "1080p" => Self::FullHd,
            "4k" | "2160" | "2160p" => Self::UltraHd,
            _ => Self::Standard,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::FullHd => "full-hd",
            Self::UltraHd => "4k",
        }
    }

    /// Video bitrate handed to the encoder.
    pub fn bitrate_kbps(self) -> u32 {
        match self {
            Self::Standard => 800,
            Self::FullHd => 2500,
            Self::UltraHd => 8000,
        }
    }
}

/// One character position in the output sequence: a portrait plus an optional
/// pre-recorded voice clip. The narration audio for slots without a voice
/// clip is synthesized from the slot's script segment.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CharacterSlot {
    pub image: MediaRef,
    pub voice: Option<MediaRef>,
}

impl CharacterSlot {
    pub fn new(image: MediaRef) -> Self {
        Self { image, voice: None }
    }

    pub fn with_voice(image: MediaRef, voice: MediaRef) -> Self {
        Self {
            image,
            voice: Some(voice),
        }
    }
}

/// Everything the pipeline needs to render one video.
///
/// `slots` may be empty at construction; acceptance synthesizes exactly one
/// placeholder slot in that case. `styles` is presentation metadata only and
/// is padded to slot count at acceptance.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct RenderRequest {
    pub title: Option<String>,
    pub script: String,
    pub language: Option<String>,
    pub quality: QualityTier,
    pub length_type: Option<String>,
    pub slots: Vec<CharacterSlot>,
    pub styles: Vec<String>,
    pub background_audio: Option<MediaRef>,
}

impl RenderRequest {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            title: None,
            script: script.into(),
            language: None,
            quality: QualityTier::default(),
            length_type: None,
            slots: Vec::new(),
            styles: Vec::new(),
            background_audio: None,
        }
    }

    /// Checks the scalar fields. The pipeline runs this at intake, before
    /// acceptance materializes any placeholder media.
    pub fn validate_fields(&self) -> VoxreelResult<()> {
        if let Some(lang) = &self.language
            && lang.trim().is_empty()
        {
            return Err(VoxreelError::validation(
                "language code must be non-empty when present",
            ));
        }
        Ok(())
    }

    /// Checks the post-acceptance invariants.
    pub fn validate(&self) -> VoxreelResult<()> {
        if self.slots.is_empty() {
            return Err(VoxreelError::validation(
                "render request must carry at least one character slot",
            ));
        }
        self.validate_fields()
    }
}

pub const DEFAULT_STYLE: &str = "Female";

/// Pad `styles` to `slot_count` entries. Missing entries take the first
/// supplied style, or the fixed default when none were supplied. Styles never
/// influence synthesis; they are recorded in job metadata only.
pub fn pad_styles(styles: &[String], slot_count: usize) -> Vec<String> {
    let fill = styles
        .first()
        .cloned()
        .unwrap_or_else(|| DEFAULT_STYLE.to_string());
    let mut out: Vec<String> = styles.iter().take(slot_count).cloned().collect();
    while out.len() < slot_count {
        out.push(fill.clone());
    }
    out
}

/// Title used when a request does not name one.
pub fn default_title(now: DateTime<Utc>) -> String {
    format!("Video {}", now.to_rfc3339())
}

/// One slot's resolved media, as persisted in job metadata.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SlotRecord {
    pub image: MediaRef,
    pub audio: MediaRef,
    pub duration_secs: f64,
}

/// Inspection record persisted with a finished job.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct JobMetadata {
    pub title: String,
    pub script: String,
    pub language: String,
    pub quality: QualityTier,
    pub length_type: Option<String>,
    pub styles: Vec<String>,
    pub background_audio: Option<MediaRef>,
    pub slots: Vec<SlotRecord>,
    pub created_at: DateTime<Utc>,
}
