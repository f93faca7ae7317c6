//! Parallel sampling runs.
//!
//! This module adds [`SamplingJob::run_parallel`], which processes sources on
//! [`rayon`] worker threads. Each worker opens its own clip through the
//! shared decoder, so no decoder state crosses threads. Reports are merged in
//! source order regardless of which worker finishes first, so the summary is
//! identical to the one [`SamplingJob::run`] produces.

use std::{fs, path::Path};

use ::rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};

use crate::{
    error::ShotAlignError,
    frame_set::FrameSet,
    job::{RunSummary, SamplingJob, SourceReport},
    progress::{OperationType, ProgressTracker},
    source::VideoSource,
};

impl SamplingJob {
    /// Like [`run`](SamplingJob::run), with one rayon task per source.
    ///
    /// Progress is reported per source: each worker's callbacks count the
    /// reference frames of its own source.
    ///
    /// # Errors
    ///
    /// Returns [`ShotAlignError::Cancelled`] if the cancellation token fires,
    /// or an I/O error if the output directory cannot be created.
    pub fn run_parallel(
        &self,
        sources: &[VideoSource],
        frame_set: &FrameSet,
        output_directory: &Path,
    ) -> Result<RunSummary, ShotAlignError> {
        fs::create_dir_all(output_directory)?;

        let options = self.options();
        let reports: Result<Vec<SourceReport>, ShotAlignError> = sources
            .par_iter()
            .enumerate()
            .map(|(source_index, source)| {
                let mut tracker = ProgressTracker::new(
                    options.progress.clone(),
                    OperationType::ScreenshotExtraction,
                    Some(frame_set.len() as u64),
                    options.batch_size,
                );
                let report =
                    self.run_source(source_index, source, frame_set, output_directory, &mut tracker);
                tracker.finish();
                report
            })
            .collect();

        Ok(self.summarize(frame_set, output_directory, reports?))
    }
}
