//! Reference-clock to source-clock frame mapping.
//!
//! Every sampled position is expressed as a frame index on the shared
//! reference clock. [`FrameMapping`] converts such an index into the native
//! frame index of one source:
//!
//! ```text
//! ratio        = source_fps / reference_fps
//! source_frame = trunc(reference_frame * ratio) + offset_frames
//! ```
//!
//! The product is truncated, never rounded. Regenerating a comparison from
//! history relies on this producing the same indices on every run.
//!
//! # Example
//!
//! ```
//! use shotalign::{VideoSource, map_frame};
//!
//! let source = VideoSource::new("dvd.mkv")
//!     .with_reference_fps(25.0)
//!     .with_source_fps(29.97)
//!     .with_offset_frames(332);
//!
//! // trunc(52986 * 1.1988) + 332
//! assert_eq!(map_frame(52986, &source)?, 63851);
//! # Ok::<(), shotalign::ShotAlignError>(())
//! ```

use crate::{error::ShotAlignError, source::VideoSource};

/// Ratios closer to 1 than this are reported as "no conversion" in logs.
const UNITY_RATIO_EPSILON: f64 = 0.01;

/// The clock conversion for one source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMapping {
    ratio: f64,
    offset: i64,
}

impl FrameMapping {
    /// Build a mapping from two clock rates and an offset.
    ///
    /// # Errors
    ///
    /// Returns [`ShotAlignError::InvalidClockRate`] if either rate is not a
    /// positive, finite number.
    pub fn from_clock_rates(
        identity: &str,
        reference_fps: f64,
        source_fps: f64,
        offset: i64,
    ) -> Result<Self, ShotAlignError> {
        let valid = |fps: f64| fps.is_finite() && fps > 0.0;
        if !valid(reference_fps) || !valid(source_fps) {
            return Err(ShotAlignError::InvalidClockRate {
                identity: identity.to_string(),
                reference_fps,
                source_fps,
            });
        }

        Ok(Self {
            ratio: source_fps / reference_fps,
            offset,
        })
    }

    /// A 1:1 mapping for sources whose frame domain was already reconciled
    /// with the reference clock by a filter pipeline.
    pub fn reconciled(offset: i64) -> Self {
        Self { ratio: 1.0, offset }
    }

    /// Build the mapping for `source`.
    ///
    /// Arithmetic sources use their configured native rate, falling back to
    /// `decoded_fps`. Sources with any other alignment mode get a
    /// [`reconciled`](FrameMapping::reconciled) mapping; their reference rate
    /// is still validated.
    ///
    /// # Errors
    ///
    /// Returns [`ShotAlignError::InvalidClockRate`] for non-positive rates.
    pub fn for_source(source: &VideoSource, decoded_fps: f64) -> Result<Self, ShotAlignError> {
        let source_fps = source.effective_source_fps(decoded_fps);
        let mapping = Self::from_clock_rates(
            &source.identity,
            source.reference_fps,
            source_fps,
            source.offset_frames,
        )?;

        if source.alignment_mode.is_arithmetic() {
            Ok(mapping)
        } else {
            Ok(Self::reconciled(source.offset_frames))
        }
    }

    /// Source frames per reference frame.
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Source frames added after conversion.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Whether the two clocks differ enough to be worth mentioning.
    ///
    /// Purely informational: [`map`](FrameMapping::map) applies the same
    /// formula either way.
    pub fn needs_conversion(&self) -> bool {
        (self.ratio - 1.0).abs() > UNITY_RATIO_EPSILON
    }

    /// Map a reference frame to a source frame.
    ///
    /// The result may be negative or past the end of the source; range
    /// checks belong to [`expand_window`](crate::expand_window). Results
    /// beyond the `i64` range saturate, which still lands out of domain.
    pub fn map(&self, reference_frame: u64) -> i64 {
        let converted = (reference_frame as f64 * self.ratio).trunc() as i64;
        converted.saturating_add(self.offset)
    }
}

/// Map `reference_frame` onto `source`'s native clock.
///
/// Uses the source's configured `source_fps`; a source without one is
/// rejected. Use [`FrameMapping::for_source`] when the rate comes from the
/// decoder.
///
/// # Errors
///
/// Returns [`ShotAlignError::InvalidClockRate`] if either rate is missing,
/// zero, or negative.
pub fn map_frame(reference_frame: u64, source: &VideoSource) -> Result<i64, ShotAlignError> {
    let source_fps = source.source_fps.unwrap_or(0.0);
    let mapping = FrameMapping::from_clock_rates(
        &source.identity,
        source.reference_fps,
        source_fps,
        source.offset_frames,
    )?;
    Ok(mapping.map(reference_frame))
}
