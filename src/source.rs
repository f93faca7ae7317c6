//! Video sources under comparison.
//!
//! A [`VideoSource`] describes one encode of the compared material: where it
//! lives, what it is called in output filenames, how its clock relates to the
//! shared reference clock, and how many extra frames to capture around each
//! aligned position.
//!
//! Sources are usually loaded from a JSON manifest with [`load_manifest`]:
//!
//! ```json
//! [
//!   { "path": "bd.mkv", "identity": "BD", "reference_fps": 25.0 },
//!   { "path": "dvd.mkv", "identity": "DVD", "reference_fps": 25.0,
//!     "source_fps": 29.97, "offset_frames": 332, "tolerance_frames": 3 }
//! ]
//! ```

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::ShotAlignError;

/// How a source's frame domain is reconciled with the reference clock.
///
/// Only [`AlignmentMode::None`] is computed by the crate's own ratio and
/// offset arithmetic. The other modes are realized by an external filter
/// pipeline (see [`Reconciler`](crate::Reconciler)); once reconciled, the
/// source's frames correspond 1:1 to reference frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMode {
    /// Pure ratio and offset conversion.
    #[default]
    None,
    /// Drop duplicate frames to reach the reference rate.
    Decimate,
    /// Repeat frames to reach the reference rate.
    Duplicate,
    /// Reverse 3:2 pulldown (inverse telecine).
    PulldownReverse,
    /// Reinterpret the timeline at the reference rate (speed-up/slow-down).
    SpeedChange,
    /// Motion-compensated frame interpolation.
    Interpolate,
}

impl AlignmentMode {
    /// Every mode, in declaration order.
    pub const ALL: [AlignmentMode; 6] = [
        AlignmentMode::None,
        AlignmentMode::Decimate,
        AlignmentMode::Duplicate,
        AlignmentMode::PulldownReverse,
        AlignmentMode::SpeedChange,
        AlignmentMode::Interpolate,
    ];

    /// Returns `true` when the crate's ratio/offset formula is authoritative.
    pub fn is_arithmetic(self) -> bool {
        self == AlignmentMode::None
    }

    fn as_str(self) -> &'static str {
        match self {
            AlignmentMode::None => "none",
            AlignmentMode::Decimate => "decimate",
            AlignmentMode::Duplicate => "duplicate",
            AlignmentMode::PulldownReverse => "pulldown_reverse",
            AlignmentMode::SpeedChange => "speed_change",
            AlignmentMode::Interpolate => "interpolate",
        }
    }
}

impl Display for AlignmentMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlignmentMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "none" | "off" => Ok(AlignmentMode::None),
            "decimate" => Ok(AlignmentMode::Decimate),
            "duplicate" => Ok(AlignmentMode::Duplicate),
            "pulldown_reverse" | "pulldown" | "ivtc" => Ok(AlignmentMode::PulldownReverse),
            "speed_change" | "speed" => Ok(AlignmentMode::SpeedChange),
            "interpolate" => Ok(AlignmentMode::Interpolate),
            other => Err(format!("unknown alignment mode: {other}")),
        }
    }
}

/// One input clip under comparison.
///
/// # Example
///
/// ```
/// use shotalign::VideoSource;
///
/// let source = VideoSource::new("dvd.mkv")
///     .with_identity("DVD")
///     .with_reference_fps(25.0)
///     .with_source_fps(29.97)
///     .with_offset_frames(332)
///     .with_tolerance_frames(3);
/// assert_eq!(source.identity, "DVD");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSource {
    /// Media file to decode.
    pub path: PathBuf,
    /// Stable name used in output filenames and history lookups.
    #[serde(default)]
    pub identity: String,
    /// Rate of the shared reference clock.
    #[serde(default = "default_reference_fps")]
    pub reference_fps: f64,
    /// Native rate of this source. `None` uses the rate reported by the
    /// decoder.
    #[serde(default)]
    pub source_fps: Option<f64>,
    /// Source frames added after ratio conversion.
    #[serde(default)]
    pub offset_frames: i64,
    /// Extra frames captured on each side of the aligned frame.
    #[serde(default)]
    pub tolerance_frames: u32,
    /// How the source's frame domain is reconciled.
    #[serde(default)]
    pub alignment_mode: AlignmentMode,
    /// Decoded frame count, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u64>,
}

fn default_reference_fps() -> f64 {
    25.0
}

impl VideoSource {
    /// Create a source for `path` with default settings.
    ///
    /// The identity defaults to the file name; the reference clock defaults
    /// to 25 fps.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let identity = default_identity(&path);
        Self {
            path,
            identity,
            reference_fps: default_reference_fps(),
            source_fps: None,
            offset_frames: 0,
            tolerance_frames: 0,
            alignment_mode: AlignmentMode::None,
            total_frames: None,
        }
    }

    /// Set the name used in output filenames.
    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    #[must_use]
    pub fn with_reference_fps(mut self, fps: f64) -> Self {
        self.reference_fps = fps;
        self
    }

    /// Pin the native rate instead of trusting the decoder.
    #[must_use]
    pub fn with_source_fps(mut self, fps: f64) -> Self {
        self.source_fps = Some(fps);
        self
    }

    #[must_use]
    pub fn with_offset_frames(mut self, offset: i64) -> Self {
        self.offset_frames = offset;
        self
    }

    #[must_use]
    pub fn with_tolerance_frames(mut self, tolerance: u32) -> Self {
        self.tolerance_frames = tolerance;
        self
    }

    #[must_use]
    pub fn with_alignment_mode(mut self, mode: AlignmentMode) -> Self {
        self.alignment_mode = mode;
        self
    }

    /// Cache a decoded frame count on the source.
    #[must_use]
    pub fn with_total_frames(mut self, total_frames: u64) -> Self {
        self.total_frames = Some(total_frames);
        self
    }

    /// The native rate to use, preferring the configured value over the one
    /// reported by the decoder.
    pub fn effective_source_fps(&self, decoded_fps: f64) -> f64 {
        self.source_fps.unwrap_or(decoded_fps)
    }
}

fn default_identity(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Load a JSON array of sources.
///
/// Entries without an `identity` are named after their file. Relative paths
/// are resolved against the manifest's directory.
///
/// # Errors
///
/// Returns [`ShotAlignError::IoError`] if the file cannot be read and
/// [`ShotAlignError::Json`] if it is not valid JSON.
pub fn load_manifest<P: AsRef<Path>>(path: P) -> Result<Vec<VideoSource>, ShotAlignError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let mut sources: Vec<VideoSource> = serde_json::from_str(&contents)?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));

    for source in &mut sources {
        if source.path.is_relative() {
            source.path = base.join(&source.path);
        }
        if source.identity.trim().is_empty() {
            source.identity = default_identity(&source.path);
        }
    }

    log::debug!("Loaded {} source(s) from {}", sources.len(), path.display());
    Ok(sources)
}

/// Parse a frame-rate string.
///
/// Accepts plain decimals (`"29.97"`), rationals (`"30000/1001"`), and
/// labels with a trailing scan suffix (`"25p"`, `"29.97i"`).
///
/// # Errors
///
/// Returns [`ShotAlignError::InvalidFrameRate`] when no positive, finite rate
/// can be read.
///
/// # Example
///
/// ```
/// use shotalign::parse_frame_rate;
///
/// assert_eq!(parse_frame_rate("25.00").unwrap(), 25.0);
/// assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.001);
/// assert_eq!(parse_frame_rate("50i").unwrap(), 50.0);
/// ```
pub fn parse_frame_rate(value: &str) -> Result<f64, ShotAlignError> {
    let invalid = || ShotAlignError::InvalidFrameRate(value.to_string());
    let trimmed = value.trim();

    let rate = if let Some((numerator, denominator)) = trimmed.split_once('/') {
        let numerator: f64 = numerator.trim().parse().map_err(|_| invalid())?;
        let denominator: f64 = denominator.trim().parse().map_err(|_| invalid())?;
        if denominator == 0.0 {
            return Err(invalid());
        }
        numerator / denominator
    } else {
        let numeric: String = trimmed
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        numeric.parse::<f64>().map_err(|_| invalid())?
    };

    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_source_uses_file_name_as_identity() {
        let source = VideoSource::new("/media/discs/Version A.mkv");
        assert_eq!(source.identity, "Version A.mkv");
        assert_eq!(source.reference_fps, 25.0);
        assert_eq!(source.alignment_mode, AlignmentMode::None);
    }

    #[test]
    fn effective_fps_prefers_configured_rate() {
        let source = VideoSource::new("a.mkv");
        assert_eq!(source.effective_source_fps(23.976), 23.976);
        let source = source.with_source_fps(29.97);
        assert_eq!(source.effective_source_fps(23.976), 29.97);
    }

    #[test]
    fn alignment_mode_parses_aliases() {
        assert_eq!("none".parse::<AlignmentMode>(), Ok(AlignmentMode::None));
        assert_eq!("IVTC".parse::<AlignmentMode>(), Ok(AlignmentMode::PulldownReverse));
        assert_eq!("speed-change".parse::<AlignmentMode>(), Ok(AlignmentMode::SpeedChange));
        assert!("blend".parse::<AlignmentMode>().is_err());
        for mode in AlignmentMode::ALL {
            assert_eq!(mode.to_string().parse::<AlignmentMode>(), Ok(mode));
        }
    }

    #[test]
    fn frame_rate_strings() {
        assert_eq!(parse_frame_rate("23.976").unwrap(), 23.976);
        assert_eq!(parse_frame_rate(" 60 ").unwrap(), 60.0);
        assert_eq!(parse_frame_rate("25p").unwrap(), 25.0);
        assert!(parse_frame_rate("0").is_err());
        assert!(parse_frame_rate("1/0").is_err());
        assert!(parse_frame_rate("fast").is_err());
    }

    #[test]
    fn manifest_defaults_and_relative_paths() {
        let directory = tempfile::tempdir().expect("Failed to create temp dir");
        let manifest = directory.path().join("sources.json");
        fs::write(
            &manifest,
            r#"[
                {"path": "a.mkv", "identity": "A"},
                {"path": "b.mkv", "source_fps": 29.97, "offset_frames": -4,
                 "tolerance_frames": 2, "alignment_mode": "decimate"}
            ]"#,
        )
        .expect("Failed to write manifest");

        let sources = load_manifest(&manifest).expect("Failed to load manifest");
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].identity, "A");
        assert_eq!(sources[0].path, directory.path().join("a.mkv"));
        assert_eq!(sources[1].identity, "b.mkv");
        assert_eq!(sources[1].reference_fps, 25.0);
        assert_eq!(sources[1].source_fps, Some(29.97));
        assert_eq!(sources[1].offset_frames, -4);
        assert_eq!(sources[1].alignment_mode, AlignmentMode::Decimate);
    }
}
