//! Tolerance windows around aligned frames.
//!
//! Sub-frame rounding and field-order differences can make the computed
//! source frame miss the visually matching one by a frame or two. Capturing a
//! small window on each side lets the comparison pick the right one by eye.

use crate::error::ShotAlignError;

/// Expand `source_frame` into `source_frame - tolerance ..= source_frame + tolerance`,
/// keeping only frames inside `[0, total_frames)`.
///
/// The result is ascending and duplicate-free.
///
/// # Errors
///
/// Returns [`ShotAlignError::NoValidFrames`] when the whole window falls
/// outside the source. Callers treat this as a skip for one reference frame,
/// not as a failure of the run.
///
/// # Example
///
/// ```
/// use shotalign::expand_window;
///
/// assert_eq!(expand_window(10, 2, 100)?, vec![8, 9, 10, 11, 12]);
/// assert_eq!(expand_window(1, 3, 100)?, vec![0, 1, 2, 3, 4]);
/// assert!(expand_window(-5, 1, 100).is_err());
/// # Ok::<(), shotalign::ShotAlignError>(())
/// ```
pub fn expand_window(
    source_frame: i64,
    tolerance: u32,
    total_frames: u64,
) -> Result<Vec<u64>, ShotAlignError> {
    let tolerance_wide = i128::from(tolerance);
    let centre = i128::from(source_frame);
    let low = (centre - tolerance_wide).max(0);
    let high = (centre + tolerance_wide + 1).min(i128::from(total_frames));

    if low >= high {
        return Err(ShotAlignError::NoValidFrames {
            source_frame,
            tolerance,
            total_frames,
        });
    }

    Ok((low..high).map(|frame| frame as u64).collect())
}
