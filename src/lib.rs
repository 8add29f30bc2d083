//! Voxreel turns a script and a set of character portraits into a narrated
//! MP4. Each character slot gets a script segment, a voice clip (uploaded or
//! synthesized), and a pseudo-lip-sync animation of its portrait; the slots
//! are sequenced into one timeline, mixed over an optional background bed,
//! and streamed to the system `ffmpeg`.
//!
//! The pipeline is one synchronous call per job:
//!
//! 1. **Segment**: script text -> one text segment per slot ([`script`])
//! 2. **Resolve**: uploaded clip, synthesized segment, or synthesized
//!    placeholder ([`voice`])
//! 3. **Clip**: portrait + narration duration -> alternating-frame clip
//!    ([`clip`])
//! 4. **Assemble**: sequential clips, narration mix, background bed
//!    ([`timeline`])
//! 5. **Encode**: raw frames and the f32le mix through `ffmpeg` to MP4
//!    ([`encode_ffmpeg`])
//!
//! [`pipeline::RenderPipeline`] drives all five stages and records the
//! outcome on a [`job::RenderJob`].
#![forbid(unsafe_code)]

pub mod clip;
pub mod config;
pub mod encode_ffmpeg;
pub mod error;
pub mod job;
pub mod media;
pub mod model;
pub mod pipeline;
pub mod script;
pub mod timeline;
pub mod voice;

pub use config::PipelineConfig;
pub use error::{VoxreelError, VoxreelResult};
pub use job::{CancelToken, InMemoryJobStore, JobId, JobStatus, JobStore, RenderJob};
pub use media::{MediaRef, MediaStore};
pub use model::{CharacterSlot, QualityTier, RenderRequest};
pub use pipeline::RenderPipeline;
pub use voice::{PiperSynthesizer, SpeechSynthesizer};
