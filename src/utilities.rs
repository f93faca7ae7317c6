//! Internal utility functions.
//!
//! Helpers for pixel-data copying and timestamp conversion shared by the
//! FFmpeg decoder.

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// Copy pixel data from an FFmpeg video frame into a tightly-packed RGB buffer.
///
/// FFmpeg frames frequently carry per-row padding (stride > width × 3).
/// This function strips that padding so the result can be passed directly to
/// [`image::RgbImage::from_raw`].
pub(crate) fn frame_to_rgb_buffer(video_frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let expected_stride = (width as usize) * 3;
    let data = video_frame.data(0);

    if stride == expected_stride {
        data[..expected_stride * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(expected_stride * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + expected_stride]);
        }
        buffer
    }
}

/// Seconds represented by `value` ticks of `time_base`.
pub(crate) fn ticks_to_seconds(value: i64, time_base: Rational) -> f64 {
    value as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
}

/// Convert a frame number to a timestamp in the stream's time base.
pub(crate) fn frame_number_to_stream_timestamp(
    frame_number: u64,
    frames_per_second: f64,
    time_base: Rational,
) -> i64 {
    let seconds = frame_number as f64 / frames_per_second;
    let numerator = time_base.numerator() as f64;
    let denominator = time_base.denominator() as f64;
    (seconds * denominator / numerator) as i64
}

/// Rescale a PTS value to a frame number.
///
/// The half-frame bias absorbs timestamps that land a hair before the
/// nominal frame boundary.
pub(crate) fn pts_to_frame_number(pts: i64, time_base: Rational, frames_per_second: f64) -> u64 {
    let frames = ticks_to_seconds(pts, time_base) * frames_per_second;
    (frames + 0.5).max(0.0) as u64
}

/// Convert an FFmpeg rational rate to frames per second, if it is usable.
pub(crate) fn rate_to_fps(rate: Rational) -> Option<f64> {
    if rate.numerator() > 0 && rate.denominator() > 0 {
        Some(rate.numerator() as f64 / rate.denominator() as f64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_numbers_round_trip_through_timestamps() {
        let time_base = Rational::new(1, 90_000);
        for frame_number in [0_u64, 1, 24, 1001, 63851] {
            let timestamp = frame_number_to_stream_timestamp(frame_number, 29.97, time_base);
            assert_eq!(pts_to_frame_number(timestamp, time_base, 29.97), frame_number);
        }
    }

    #[test]
    fn unusable_rates_are_rejected() {
        assert_eq!(rate_to_fps(Rational::new(25, 1)), Some(25.0));
        assert_eq!(rate_to_fps(Rational::new(0, 1)), None);
        assert_eq!(rate_to_fps(Rational::new(30000, 0)), None);
    }
}
