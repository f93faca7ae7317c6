//! # shotalign
//!
//! Frame-aligned screenshot sampling for comparing several encodes of the
//! same footage.
//!
//! Releases of one film rarely share a timeline: a PAL DVD runs at 25 fps, an
//! NTSC one at 29.97, a Blu-ray at 23.976, and each may start a few seconds
//! earlier or later. `shotalign` expresses every sampled position as a frame
//! on a shared *reference clock*, maps it onto each source's native clock
//! with a per-source rate ratio and offset, and writes one screenshot per
//! source (plus an optional tolerance window) so the same moment can be
//! compared side by side.
//!
//! ## Quick Start
//!
//! ```no_run
//! use shotalign::{
//!     FfmpegDecoder, FrameSetGenerator, HistoryStore, OutputRoot, ReconcilerSet, SamplingJob,
//!     SamplingOptions, VideoSource,
//! };
//!
//! let sources = vec![
//!     VideoSource::new("bd.mkv").with_identity("BD"),
//!     VideoSource::new("dvd.mkv")
//!         .with_identity("DVD")
//!         .with_source_fps(29.97)
//!         .with_offset_frames(332)
//!         .with_tolerance_frames(2),
//! ];
//!
//! let job = SamplingJob::new(FfmpegDecoder, ReconcilerSet::standard(), SamplingOptions::new());
//! let frame_set = FrameSetGenerator::new().generate(job.reference_total_frames(&sources)?, 12, 0, 0)?;
//!
//! let root = OutputRoot::new("screenshots");
//! let run_directory = root.create_run_directory(&frame_set.created_at())?;
//! job.run(&sources, &frame_set, &run_directory)?;
//!
//! let mut history = HistoryStore::open("screenshots/history.json")?;
//! let folder = run_directory.file_name().unwrap_or_default().to_string_lossy();
//! history.record_run(&frame_set, &folder)?;
//! # Ok::<(), shotalign::ShotAlignError>(())
//! ```
//!
//! ## Mapping
//!
//! ```text
//! source_frame = trunc(reference_frame * source_fps / reference_fps) + offset_frames
//! ```
//!
//! Screenshots are named `{reference:06}_{source:06}_{identity}.png`, which
//! is enough to rebuild a run's frame set from its directory listing alone.
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `rayon` | `SamplingJob::run_parallel()` processes sources on rayon threads |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed for [`FfmpegDecoder`].

pub mod alignment;
pub mod configuration;
pub mod decoder;
pub mod error;
pub mod ffmpeg;
pub mod frame_set;
pub mod history;
pub mod job;
pub mod naming;
pub mod output;
pub mod progress;
#[cfg(feature = "rayon")]
mod rayon;
pub mod reconcile;
pub mod source;
pub mod tolerance;
mod utilities;

pub use alignment::{FrameMapping, map_frame};
pub use configuration::SamplingOptions;
pub use decoder::{Clip, ClipInfo, Decoder, FfmpegDecoder};
pub use error::ShotAlignError;
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use frame_set::{FrameSet, FrameSetGenerator, FrameSetOrigin};
pub use history::{HistoryEntry, HistoryOrigin, HistoryStore, reconstruct_from_listing, run_label};
pub use job::{
    ExtractionTask, RunSummary, SamplingJob, SamplingPlan, SkippedFrame, SourcePlan, SourceReport,
    plan_source_tasks, tasks_for_reference,
};
pub use naming::{ScreenshotName, parse_screenshot_file_name, sanitize_identity, screenshot_file_name};
pub use output::{OutputRoot, RUN_DIRECTORY_FORMAT};
pub use progress::{CancellationToken, OperationType, ProgressCallback, ProgressInfo};
pub use reconcile::{
    AssumeRate, ChangeRate, Passthrough, ReconciledClip, Reconciler, ReconcilerSet, SelectEvery,
};
pub use source::{AlignmentMode, VideoSource, load_manifest, parse_frame_rate};
pub use tolerance::expand_window;
