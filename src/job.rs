//! Sampling runs.
//!
//! A [`SamplingJob`] takes a [`FrameSet`] of reference frames and a list of
//! [`VideoSource`]s, and for every source and every reference frame writes
//! the screenshots of the aligned tolerance window. Sources are independent:
//! one that cannot be opened, has an invalid clock, or needs a reconciler
//! that is not registered is reported in the [`RunSummary`] while the others
//! carry on.
//!
//! # Example
//!
//! ```no_run
//! use shotalign::{
//!     FfmpegDecoder, FrameSetGenerator, ReconcilerSet, SamplingJob, SamplingOptions,
//!     VideoSource,
//! };
//!
//! let sources = vec![
//!     VideoSource::new("bluray.mkv").with_identity("BD"),
//!     VideoSource::new("dvd.mkv")
//!         .with_identity("DVD")
//!         .with_source_fps(29.97)
//!         .with_offset_frames(332)
//!         .with_tolerance_frames(3),
//! ];
//!
//! let job = SamplingJob::new(FfmpegDecoder, ReconcilerSet::standard(), SamplingOptions::new());
//! let total = job.reference_total_frames(&sources)?;
//! let frame_set = FrameSetGenerator::new().generate(total, 10, 0, 0)?;
//!
//! let summary = job.run(&sources, &frame_set, "screenshots/manual".as_ref())?;
//! println!("{} screenshots written", summary.frames_written());
//! # Ok::<(), shotalign::ShotAlignError>(())
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{
    alignment::FrameMapping,
    configuration::SamplingOptions,
    decoder::{Clip, Decoder},
    error::ShotAlignError,
    frame_set::FrameSet,
    naming::screenshot_file_name,
    progress::{OperationType, ProgressTracker},
    reconcile::ReconcilerSet,
    source::VideoSource,
    tolerance::expand_window,
};

/// One screenshot to take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionTask {
    /// Position of the source in the run's source list.
    pub source_index: usize,
    pub identity: String,
    pub reference_frame: u64,
    pub source_frame: u64,
}

impl ExtractionTask {
    /// File name of this task's screenshot.
    pub fn file_name(&self, extension: &str) -> String {
        screenshot_file_name(
            self.reference_frame,
            self.source_frame,
            &self.identity,
            extension,
        )
    }
}

/// A screenshot (or a whole reference frame) that was not written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFrame {
    pub reference_frame: u64,
    /// `None` when no source frame could be derived at all.
    pub source_frame: Option<u64>,
    pub reason: String,
}

/// The tasks of one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourcePlan {
    pub identity: String,
    /// Frame count after reconciliation, if the source could be opened.
    pub total_frames: Option<u64>,
    /// Source frames per reference frame, if the mapping could be built.
    pub ratio: Option<f64>,
    pub offset_frames: i64,
    pub tasks: Vec<ExtractionTask>,
    pub skipped: Vec<SkippedFrame>,
    /// Why the source produced no tasks at all.
    pub error: Option<String>,
}

/// Every task of a run, grouped by source in caller order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SamplingPlan {
    pub sources: Vec<SourcePlan>,
}

impl SamplingPlan {
    /// Tasks in source order, then reference-frame order, then window order.
    pub fn tasks(&self) -> impl Iterator<Item = &ExtractionTask> {
        self.sources.iter().flat_map(|source| source.tasks.iter())
    }

    pub fn task_count(&self) -> usize {
        self.sources.iter().map(|source| source.tasks.len()).sum()
    }
}

/// Outcome of one source in a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub identity: String,
    pub total_frames: Option<u64>,
    pub ratio: Option<f64>,
    /// Screenshots the source should have produced.
    pub attempted: usize,
    pub written: usize,
    pub skipped: Vec<SkippedFrame>,
    /// Set when the source failed as a whole.
    pub error: Option<String>,
}

impl SourceReport {
    fn new(source: &VideoSource) -> Self {
        Self {
            identity: source.identity.clone(),
            total_frames: None,
            ratio: None,
            attempted: 0,
            written: 0,
            skipped: Vec::new(),
            error: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Reference frames whose whole window fell outside the source. These
    /// never reach `attempted`.
    pub fn window_skips(&self) -> impl Iterator<Item = &SkippedFrame> {
        self.skipped.iter().filter(|skip| skip.source_frame.is_none())
    }

    /// Attempted screenshots that could not be decoded or written.
    /// `written + failed_screenshots().count() == attempted`.
    pub fn failed_screenshots(&self) -> impl Iterator<Item = &SkippedFrame> {
        self.skipped.iter().filter(|skip| skip.source_frame.is_some())
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub output_directory: PathBuf,
    pub reference_frames: Vec<u64>,
    pub sources: Vec<SourceReport>,
}

impl RunSummary {
    /// Screenshots written across all sources.
    pub fn frames_written(&self) -> usize {
        self.sources.iter().map(|source| source.written).sum()
    }

    /// Skips across all sources.
    pub fn frames_skipped(&self) -> usize {
        self.sources.iter().map(|source| source.skipped.len()).sum()
    }

    /// Sources that failed as a whole.
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|source| source.is_failed())
    }
}

/// The screenshots for one reference frame of one source.
///
/// # Errors
///
/// Returns [`ShotAlignError::NoValidFrames`] when the whole tolerance window
/// lies outside the source.
pub fn tasks_for_reference(
    source_index: usize,
    source: &VideoSource,
    mapping: &FrameMapping,
    total_frames: u64,
    reference_frame: u64,
) -> Result<Vec<ExtractionTask>, ShotAlignError> {
    let source_frame = mapping.map(reference_frame);
    let window = expand_window(source_frame, source.tolerance_frames, total_frames);

    log::debug!(
        "[{}] reference {reference_frame}: trunc({reference_frame} * {:.6}) + {} = {source_frame}, window ±{} -> {}",
        source.identity,
        mapping.ratio(),
        mapping.offset(),
        source.tolerance_frames,
        match &window {
            Ok(frames) => format!("{:?}", frames),
            Err(_) => "none".to_string(),
        }
    );

    Ok(window?
        .into_iter()
        .map(|frame| ExtractionTask {
            source_index,
            identity: source.identity.clone(),
            reference_frame,
            source_frame: frame,
        })
        .collect())
}

/// Compute all tasks of one source. Reference frames whose window is empty
/// become [`SkippedFrame`]s.
pub fn plan_source_tasks(
    source_index: usize,
    source: &VideoSource,
    mapping: &FrameMapping,
    total_frames: u64,
    frame_set: &FrameSet,
) -> (Vec<ExtractionTask>, Vec<SkippedFrame>) {
    let mut tasks = Vec::new();
    let mut skipped = Vec::new();

    for &reference_frame in frame_set.frames() {
        match tasks_for_reference(source_index, source, mapping, total_frames, reference_frame) {
            Ok(window) => tasks.extend(window),
            Err(error) => skipped.push(SkippedFrame {
                reference_frame,
                source_frame: None,
                reason: error.to_string(),
            }),
        }
    }

    (tasks, skipped)
}

/// Runs frame sets against sources.
pub struct SamplingJob {
    decoder: Box<dyn Decoder>,
    reconcilers: ReconcilerSet,
    options: SamplingOptions,
}

impl SamplingJob {
    pub fn new(
        decoder: impl Decoder + 'static,
        reconcilers: ReconcilerSet,
        options: SamplingOptions,
    ) -> Self {
        Self {
            decoder: Box::new(decoder),
            reconcilers,
            options,
        }
    }

    pub fn options(&self) -> &SamplingOptions {
        &self.options
    }

    /// Open `source`, reconcile it, and build its frame mapping.
    fn open_source(
        &self,
        source: &VideoSource,
    ) -> Result<(Box<dyn Clip>, FrameMapping), ShotAlignError> {
        let clip = self.decoder.open(&source.path)?;
        let decoded_fps = clip.info().frames_per_second;
        let clip = self.reconcilers.prepare(clip, source)?;
        let mapping = FrameMapping::for_source(source, decoded_fps)?;

        if mapping.needs_conversion() {
            log::info!(
                "Source '{}': {:.3} fps -> {:.3} fps reference (ratio {:.6}, offset {})",
                source.identity,
                source.effective_source_fps(decoded_fps),
                source.reference_fps,
                mapping.ratio(),
                mapping.offset()
            );
        }

        Ok((clip, mapping))
    }

    /// Frame count of the first source, the domain reference frames are
    /// drawn from.
    ///
    /// # Errors
    ///
    /// Returns [`ShotAlignError::EmptyDomain`] without sources, and any error
    /// opening the first one.
    pub fn reference_total_frames(&self, sources: &[VideoSource]) -> Result<u64, ShotAlignError> {
        let first = sources.first().ok_or(ShotAlignError::EmptyDomain)?;
        if let Some(total_frames) = first.total_frames {
            return Ok(total_frames);
        }
        let (clip, _) = self.open_source(first)?;
        Ok(clip.info().total_frames)
    }

    /// Work out every screenshot without decoding any pixels.
    ///
    /// # Errors
    ///
    /// Only [`ShotAlignError::Cancelled`]; per-source failures are recorded
    /// in the returned plan.
    pub fn plan(
        &self,
        sources: &[VideoSource],
        frame_set: &FrameSet,
    ) -> Result<SamplingPlan, ShotAlignError> {
        let mut tracker = ProgressTracker::new(
            self.options.progress.clone(),
            OperationType::Planning,
            Some(sources.len() as u64),
            1,
        );
        let mut plan = SamplingPlan::default();

        for (source_index, source) in sources.iter().enumerate() {
            if self.options.is_cancelled() {
                return Err(ShotAlignError::Cancelled);
            }

            let mut source_plan = SourcePlan {
                identity: source.identity.clone(),
                total_frames: None,
                ratio: None,
                offset_frames: source.offset_frames,
                tasks: Vec::new(),
                skipped: Vec::new(),
                error: None,
            };

            match self.open_source(source) {
                Ok((clip, mapping)) => {
                    let total_frames = clip.info().total_frames;
                    let (tasks, skipped) =
                        plan_source_tasks(source_index, source, &mapping, total_frames, frame_set);
                    source_plan.total_frames = Some(total_frames);
                    source_plan.ratio = Some(mapping.ratio());
                    source_plan.tasks = tasks;
                    source_plan.skipped = skipped;
                }
                Err(error) => {
                    log::error!("Source '{}' skipped: {error}", source.identity);
                    source_plan.error = Some(error.to_string());
                }
            }

            plan.sources.push(source_plan);
            tracker.advance(None, Some(&source.identity));
        }

        tracker.finish();
        Ok(plan)
    }

    /// Write the screenshots of `frame_set` for every source into
    /// `output_directory`, which is created if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ShotAlignError::Cancelled`] if the cancellation token fires,
    /// or an I/O error if the output directory cannot be created. Everything
    /// else is reported per source in the summary.
    pub fn run(
        &self,
        sources: &[VideoSource],
        frame_set: &FrameSet,
        output_directory: &Path,
    ) -> Result<RunSummary, ShotAlignError> {
        fs::create_dir_all(output_directory)?;

        let total = (frame_set.len() * sources.len()) as u64;
        let mut tracker = ProgressTracker::new(
            self.options.progress.clone(),
            OperationType::ScreenshotExtraction,
            Some(total),
            self.options.batch_size,
        );

        let mut reports = Vec::with_capacity(sources.len());
        for (source_index, source) in sources.iter().enumerate() {
            reports.push(self.run_source(
                source_index,
                source,
                frame_set,
                output_directory,
                &mut tracker,
            )?);
        }
        tracker.finish();

        Ok(self.summarize(frame_set, output_directory, reports))
    }

    pub(crate) fn summarize(
        &self,
        frame_set: &FrameSet,
        output_directory: &Path,
        reports: Vec<SourceReport>,
    ) -> RunSummary {
        let summary = RunSummary {
            output_directory: output_directory.to_path_buf(),
            reference_frames: frame_set.frames().to_vec(),
            sources: reports,
        };

        log::info!(
            "Wrote {} screenshot(s) for {} reference frame(s) into {}",
            summary.frames_written(),
            frame_set.len(),
            output_directory.display()
        );
        summary
    }

    /// Process one source. Only cancellation escapes as an error.
    pub(crate) fn run_source(
        &self,
        source_index: usize,
        source: &VideoSource,
        frame_set: &FrameSet,
        output_directory: &Path,
        tracker: &mut ProgressTracker,
    ) -> Result<SourceReport, ShotAlignError> {
        if self.options.is_cancelled() {
            return Err(ShotAlignError::Cancelled);
        }

        let mut report = SourceReport::new(source);

        let (mut clip, mapping) = match self.open_source(source) {
            Ok(opened) => opened,
            Err(error) => {
                log::error!("Source '{}' skipped: {error}", source.identity);
                report.error = Some(error.to_string());
                tracker.advance_many(frame_set.len() as u64, Some(&source.identity));
                return Ok(report);
            }
        };

        let total_frames = clip.info().total_frames;
        report.total_frames = Some(total_frames);
        report.ratio = Some(mapping.ratio());

        for &reference_frame in frame_set.frames() {
            let tasks = match tasks_for_reference(
                source_index,
                source,
                &mapping,
                total_frames,
                reference_frame,
            ) {
                Ok(tasks) => tasks,
                Err(error) => {
                    log::warn!("[{}] {error}", source.identity);
                    report.skipped.push(SkippedFrame {
                        reference_frame,
                        source_frame: None,
                        reason: error.to_string(),
                    });
                    tracker.advance(Some(reference_frame), Some(&source.identity));
                    continue;
                }
            };

            for task in tasks {
                if self.options.is_cancelled() {
                    return Err(ShotAlignError::Cancelled);
                }

                report.attempted += 1;
                match self.write_task(clip.as_mut(), &task, output_directory) {
                    Ok(()) => report.written += 1,
                    Err(reason) => {
                        log::warn!(
                            "[{}] frame {} (reference {}) skipped: {reason}",
                            task.identity,
                            task.source_frame,
                            task.reference_frame
                        );
                        report.skipped.push(SkippedFrame {
                            reference_frame: task.reference_frame,
                            source_frame: Some(task.source_frame),
                            reason,
                        });
                    }
                }
            }

            tracker.advance(Some(reference_frame), Some(&source.identity));
        }

        log::info!(
            "Source '{}': {} of {} screenshot(s) written",
            source.identity,
            report.written,
            report.attempted
        );
        Ok(report)
    }

    /// Decode and save one screenshot. Failures come back as a reason.
    fn write_task(
        &self,
        clip: &mut dyn Clip,
        task: &ExtractionTask,
        output_directory: &Path,
    ) -> Result<(), String> {
        let path = output_directory.join(task.file_name(self.options.extension()));
        if !self.options.overwrite && path.exists() {
            return Err(format!("{} already exists", path.display()));
        }

        let image = clip
            .frame(task.source_frame)
            .map_err(|error| error.to_string())?;
        image
            .save_with_format(&path, self.options.image_format)
            .map_err(|error| ShotAlignError::from(error).to_string())?;

        log::debug!("Saved {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_pal_to_ntsc_window() {
        let source = VideoSource::new("dvd.mkv")
            .with_identity("DVD")
            .with_reference_fps(25.0)
            .with_source_fps(29.97)
            .with_offset_frames(332)
            .with_tolerance_frames(3);
        let mapping = FrameMapping::for_source(&source, 29.97).unwrap();

        let tasks = tasks_for_reference(1, &source, &mapping, 200_000, 52986).unwrap();
        let frames: Vec<u64> = tasks.iter().map(|task| task.source_frame).collect();
        assert_eq!(frames, (63848..=63854).collect::<Vec<u64>>());
        assert!(tasks.iter().all(|task| task.source_index == 1));
        assert_eq!(tasks[3].file_name("png"), "052986_063851_DVD.png");
    }

    #[test]
    fn out_of_domain_reference_frames_are_skipped() {
        let source = VideoSource::new("short.mkv")
            .with_source_fps(25.0)
            .with_offset_frames(-50);
        let mapping = FrameMapping::for_source(&source, 25.0).unwrap();
        let frame_set = FrameSet::from_frames(vec![10, 60, 500]);

        let (tasks, skipped) = plan_source_tasks(0, &source, &mapping, 100, &frame_set);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].source_frame, 10);
        let skipped_frames: Vec<u64> = skipped.iter().map(|skip| skip.reference_frame).collect();
        assert_eq!(skipped_frames, vec![10, 500]);
        assert!(skipped.iter().all(|skip| skip.source_frame.is_none()));
    }

    #[test]
    fn summary_aggregates_sources() {
        let report = |written, error: Option<&str>| SourceReport {
            identity: "x".to_string(),
            total_frames: None,
            ratio: None,
            attempted: written,
            written,
            skipped: Vec::new(),
            error: error.map(str::to_string),
        };
        let summary = RunSummary {
            output_directory: PathBuf::from("out"),
            reference_frames: vec![1, 2],
            sources: vec![report(2, None), report(0, Some("gone")), report(3, None)],
        };
        assert_eq!(summary.frames_written(), 5);
        assert_eq!(summary.failed_sources().count(), 1);
    }

    #[test]
    fn report_separates_window_skips_from_failed_screenshots() {
        let skip = |reference_frame, source_frame| SkippedFrame {
            reference_frame,
            source_frame,
            reason: "x".to_string(),
        };
        let report = SourceReport {
            identity: "x".to_string(),
            total_frames: Some(100),
            ratio: Some(1.0),
            attempted: 3,
            written: 2,
            skipped: vec![skip(5, Some(5)), skip(900, None), skip(950, None)],
            error: None,
        };
        assert_eq!(report.window_skips().count(), 2);
        assert_eq!(report.failed_screenshots().count(), 1);
        assert_eq!(
            report.written + report.failed_screenshots().count(),
            report.attempted
        );
    }
}
