//! Error types for the `shotalign` crate.
//!
//! This module defines [`ShotAlignError`], the unified error type returned by
//! all fallible operations in the crate. Errors carry the source identity and
//! the offending frame indices so a failure can be diagnosed from the message
//! alone.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use serde_json::Error as JsonError;
use thiserror::Error;

use crate::source::AlignmentMode;

/// The unified error type for all `shotalign` operations.
///
/// Some variants are fatal to a whole sampling attempt ([`EmptyRange`],
/// [`EmptyDomain`]), some only to one source ([`InvalidClockRate`],
/// [`DecoderUnavailable`]), and some are soft and only cause one frame to be
/// skipped ([`NoValidFrames`], [`MalformedHistoryFilename`]).
///
/// [`EmptyRange`]: ShotAlignError::EmptyRange
/// [`EmptyDomain`]: ShotAlignError::EmptyDomain
/// [`InvalidClockRate`]: ShotAlignError::InvalidClockRate
/// [`DecoderUnavailable`]: ShotAlignError::DecoderUnavailable
/// [`NoValidFrames`]: ShotAlignError::NoValidFrames
/// [`MalformedHistoryFilename`]: ShotAlignError::MalformedHistoryFilename
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ShotAlignError {
    /// A reference or source frame rate is zero, negative, or not finite.
    #[error(
        "Invalid clock rate for source '{identity}': reference {reference_fps} fps, source {source_fps} fps"
    )]
    InvalidClockRate {
        /// Identity of the source whose rates were rejected.
        identity: String,
        /// The reference clock rate.
        reference_fps: f64,
        /// The source clock rate.
        source_fps: f64,
    },

    /// A frame-rate string could not be parsed.
    #[error("Invalid frame rate: {0:?}")]
    InvalidFrameRate(String),

    /// The sampling sub-range is empty after clamping to the video length.
    #[error("Empty sampling range: start ({start}) must be less than end ({end})")]
    EmptyRange {
        /// Effective (clamped) start of the range.
        start: u64,
        /// Effective (clamped) end of the range, exclusive.
        end: u64,
    },

    /// The reference video has no frames to sample from.
    #[error("Reference video has no frames")]
    EmptyDomain,

    /// Every candidate of a tolerance window lies outside the source.
    #[error(
        "No valid frames around source frame {source_frame} (tolerance {tolerance}, source has {total_frames} frames)"
    )]
    NoValidFrames {
        /// The aligned source frame the window was centred on.
        source_frame: i64,
        /// Frames captured on each side.
        tolerance: u32,
        /// Number of frames in the source.
        total_frames: u64,
    },

    /// The decoder could not open a source.
    #[error("Decoder unavailable for {path}: {reason}")]
    DecoderUnavailable {
        /// Path handed to the decoder.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// A single frame could not be decoded.
    #[error("Failed to decode frame {frame_number}: {reason}")]
    DecodeFailure {
        /// The source frame that was requested.
        frame_number: u64,
        /// Underlying reason.
        reason: String,
    },

    /// The file does not contain a video stream.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// The requested frame number exceeds the total frame count.
    #[error("Frame {frame_number} is out of range (video has {total_frames} frames)")]
    FrameOutOfRange {
        /// The frame number that was requested.
        frame_number: u64,
        /// The total number of frames in the video.
        total_frames: u64,
    },

    /// A file in an output directory does not follow the screenshot naming
    /// scheme.
    #[error("Malformed screenshot filename: {0}")]
    MalformedHistoryFilename(String),

    /// No filter-pipeline adapter is registered for an alignment mode.
    #[error("No reconciler registered for alignment mode {mode}")]
    ReconcilerUnavailable {
        /// The mode that was requested.
        mode: AlignmentMode,
    },

    /// A history entry was requested by a label the store does not know.
    #[error("Unknown history entry: {0}")]
    UnknownHistoryEntry(String),

    /// A history ledger or sources manifest is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] JsonError),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while writing a screenshot.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<FfmpegError> for ShotAlignError {
    fn from(error: FfmpegError) -> Self {
        ShotAlignError::FfmpegError(error.to_string())
    }
}

impl ShotAlignError {
    /// Returns `true` for conditions that only skip one frame of one source.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            ShotAlignError::NoValidFrames { .. } | ShotAlignError::MalformedHistoryFilename(_)
        )
    }
}
