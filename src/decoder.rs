//! Frame-accurate decoding behind a narrow capability interface.
//!
//! The sampling job only needs two things from a video: how many frames it
//! has (and at what rate), and the pixels of frame `n`. [`Decoder`] opens a
//! path into a [`Clip`] that answers exactly those questions.
//! [`FfmpegDecoder`] is the production implementation; tests substitute an
//! in-memory one.

use std::path::{Path, PathBuf};

use ffmpeg_next::{
    Rational,
    codec::{context::Context as CodecContext, decoder::Video as VideoDecoder},
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::{DynamicImage, RgbImage};

use crate::{error::ShotAlignError, utilities};

/// Static properties of an opened clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipInfo {
    /// Number of frames in the clip's frame domain.
    pub total_frames: u64,
    /// Native frame rate as reported by the container.
    pub frames_per_second: f64,
    pub width: u32,
    pub height: u32,
}

/// An opened video that can be read frame by frame.
pub trait Clip {
    /// Frame count, rate, and dimensions.
    fn info(&self) -> ClipInfo;

    /// Decode frame `frame_number` (0-based).
    ///
    /// # Errors
    ///
    /// Returns [`ShotAlignError::FrameOutOfRange`] for indices at or past
    /// [`ClipInfo::total_frames`], and [`ShotAlignError::DecodeFailure`] when
    /// the frame cannot be produced.
    fn frame(&mut self, frame_number: u64) -> Result<DynamicImage, ShotAlignError>;
}

/// Opens video files as [`Clip`]s.
///
/// Implementations are shared between worker threads when sources are
/// processed in parallel, so they must be [`Send`] and [`Sync`]. The clips
/// they return are used on the thread that opened them.
pub trait Decoder: Send + Sync {
    /// Open `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ShotAlignError::DecoderUnavailable`] when the file cannot be
    /// opened or holds no decodable video.
    fn open(&self, path: &Path) -> Result<Box<dyn Clip>, ShotAlignError>;
}

/// Decoder backed by the FFmpeg libraries.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
///
/// use shotalign::{Decoder, FfmpegDecoder};
///
/// let mut clip = FfmpegDecoder.open(Path::new("input.mkv"))?;
/// println!("{} frames", clip.info().total_frames);
/// clip.frame(100)?.save("frame_100.png")?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegDecoder;

impl Decoder for FfmpegDecoder {
    fn open(&self, path: &Path) -> Result<Box<dyn Clip>, ShotAlignError> {
        let clip = FfmpegClip::open(path).map_err(|error| match error {
            ShotAlignError::DecoderUnavailable { .. } => error,
            other => ShotAlignError::DecoderUnavailable {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        })?;
        Ok(Box::new(clip))
    }
}

/// Targets at most this many frames past the held one are reached by
/// decoding forward; anything further (or behind) seeks.
const FORWARD_DECODE_LIMIT: u64 = 120;

/// A video file opened through FFmpeg.
struct FfmpegClip {
    path: PathBuf,
    input_context: Input,
    stream_index: usize,
    time_base: Rational,
    info: ClipInfo,
    cursor: DecodeCursor,
}

/// Decoder state kept between requests, so the frames of one tolerance
/// window decode in a single forward pass.
struct DecodeCursor {
    decoder: VideoDecoder,
    scaler: ScalingContext,
    frame: VideoFrame,
    /// Frame number held in `frame`, and the request it answered.
    held: Option<(u64, u64)>,
    /// The decoder hit end of stream and needs a seek before more output.
    drained: bool,
}

impl DecodeCursor {
    /// Pull frames until one at or past `target` appears.
    fn receive_until(
        &mut self,
        target: u64,
        time_base: Rational,
        info: ClipInfo,
    ) -> Result<Option<DynamicImage>, ShotAlignError> {
        while self.decoder.receive_frame(&mut self.frame).is_ok() {
            let pts = self.frame.pts().unwrap_or(0);
            let current = utilities::pts_to_frame_number(pts, time_base, info.frames_per_second);

            // Past the target means the exact index has no frame of its
            // own; the next one shown on screen stands in for it.
            if current >= target {
                self.held = Some((current, target));
                return self.convert(info).map(Some);
            }
        }
        Ok(None)
    }

    fn convert(&mut self, info: ClipInfo) -> Result<DynamicImage, ShotAlignError> {
        let mut rgb_frame = VideoFrame::empty();
        self.scaler.run(&self.frame, &mut rgb_frame)?;
        rgb_frame_to_image(&rgb_frame, info.width, info.height)
    }
}

impl FfmpegClip {
    fn open(path: &Path) -> Result<Self, ShotAlignError> {
        let unavailable = |reason: String| ShotAlignError::DecoderUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        log::debug!("Opening video file: {}", path.display());

        ffmpeg_next::init()
            .map_err(|error| unavailable(format!("FFmpeg initialisation failed: {error}")))?;

        let input_context =
            ffmpeg_next::format::input(&path).map_err(|error| unavailable(error.to_string()))?;

        let stream = input_context
            .streams()
            .best(Type::Video)
            .ok_or_else(|| unavailable(ShotAlignError::NoVideoStream.to_string()))?;
        let stream_index = stream.index();
        let time_base = stream.time_base();

        let decoder_context = CodecContext::from_parameters(stream.parameters())
            .map_err(|error| unavailable(format!("Failed to read codec parameters: {error}")))?;
        let video_decoder = decoder_context
            .decoder()
            .video()
            .map_err(|error| unavailable(format!("Failed to create video decoder: {error}")))?;

        let frames_per_second = utilities::rate_to_fps(stream.avg_frame_rate())
            .or_else(|| utilities::rate_to_fps(stream.rate()))
            .ok_or_else(|| unavailable("Stream reports no frame rate".to_string()))?;

        // Prefer the muxer's frame count; fall back to duration × rate.
        let total_frames = if stream.frames() > 0 {
            stream.frames() as u64
        } else if stream.duration() > 0 {
            (utilities::ticks_to_seconds(stream.duration(), time_base) * frames_per_second) as u64
        } else if input_context.duration() > 0 {
            let seconds = input_context.duration() as f64 / 1_000_000.0;
            (seconds * frames_per_second) as u64
        } else {
            0
        };

        let info = ClipInfo {
            total_frames,
            frames_per_second,
            width: video_decoder.width(),
            height: video_decoder.height(),
        };

        log::debug!(
            "Opened {}: {} frames at {:.3} fps, {}x{}",
            path.display(),
            info.total_frames,
            info.frames_per_second,
            info.width,
            info.height
        );

        let scaler = ScalingContext::get(
            video_decoder.format(),
            video_decoder.width(),
            video_decoder.height(),
            Pixel::RGB24,
            info.width,
            info.height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|error| unavailable(format!("Failed to create scaler: {error}")))?;

        Ok(Self {
            path: path.to_path_buf(),
            input_context,
            stream_index,
            time_base,
            info,
            cursor: DecodeCursor {
                decoder: video_decoder,
                scaler,
                frame: VideoFrame::empty(),
                held: None,
                drained: false,
            },
        })
    }

    /// Produce `frame_number`, reusing the decoder position when the request
    /// is at or shortly after the previous one.
    fn decode(&mut self, frame_number: u64) -> Result<DynamicImage, ShotAlignError> {
        if let Some((held, answered)) = self.cursor.held {
            if (answered..=held).contains(&frame_number) {
                return self.cursor.convert(self.info);
            }
            let ahead = frame_number > held && frame_number - held <= FORWARD_DECODE_LIMIT;
            if ahead && !self.cursor.drained {
                return self.decode_forward(frame_number);
            }
        }

        self.seek_to(frame_number)?;
        self.decode_forward(frame_number)
    }

    /// Seek to the keyframe at or before `frame_number` and reset the decoder.
    fn seek_to(&mut self, frame_number: u64) -> Result<(), ShotAlignError> {
        let target_timestamp = utilities::frame_number_to_stream_timestamp(
            frame_number,
            self.info.frames_per_second,
            self.time_base,
        );
        self.input_context.seek(target_timestamp, ..target_timestamp)?;
        self.cursor.decoder.flush();
        self.cursor.held = None;
        self.cursor.drained = false;
        Ok(())
    }

    fn decode_forward(&mut self, frame_number: u64) -> Result<DynamicImage, ShotAlignError> {
        let cursor = &mut self.cursor;

        for (stream, packet) in self.input_context.packets() {
            if stream.index() != self.stream_index {
                continue;
            }

            cursor.decoder.send_packet(&packet)?;
            if let Some(image) = cursor.receive_until(frame_number, self.time_base, self.info)? {
                return Ok(image);
            }
        }

        cursor.decoder.send_eof()?;
        cursor.drained = true;
        if let Some(image) = cursor.receive_until(frame_number, self.time_base, self.info)? {
            return Ok(image);
        }

        Err(ShotAlignError::DecodeFailure {
            frame_number,
            reason: format!("Frame not found in {}", self.path.display()),
        })
    }
}

impl Clip for FfmpegClip {
    fn info(&self) -> ClipInfo {
        self.info
    }

    fn frame(&mut self, frame_number: u64) -> Result<DynamicImage, ShotAlignError> {
        let total_frames = self.info.total_frames;
        if total_frames > 0 && frame_number >= total_frames {
            return Err(ShotAlignError::FrameOutOfRange {
                frame_number,
                total_frames,
            });
        }

        self.decode(frame_number).map_err(|error| match error {
            ShotAlignError::DecodeFailure { .. } => error,
            other => ShotAlignError::DecodeFailure {
                frame_number,
                reason: other.to_string(),
            },
        })
    }
}

fn rgb_frame_to_image(
    rgb_frame: &VideoFrame,
    width: u32,
    height: u32,
) -> Result<DynamicImage, ShotAlignError> {
    let buffer = utilities::frame_to_rgb_buffer(rgb_frame, width, height);
    let rgb_image = RgbImage::from_raw(width, height, buffer).ok_or_else(|| {
        ShotAlignError::FfmpegError(
            "Failed to construct RGB image from decoded frame data".to_string(),
        )
    })?;
    Ok(DynamicImage::ImageRgb8(rgb_image))
}
