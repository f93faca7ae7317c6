//! Sampling run configuration.
//!
//! [`SamplingOptions`] is a builder that threads progress callbacks,
//! cancellation tokens, and output settings through a
//! [`SamplingJob`](crate::SamplingJob) without polluting every function
//! signature.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use image::ImageFormat;
//! use shotalign::{CancellationToken, ProgressCallback, ProgressInfo, SamplingOptions};
//!
//! struct LogProgress;
//! impl ProgressCallback for LogProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{:?}: {} done", info.operation, info.current);
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let options = SamplingOptions::new()
//!     .with_progress(Arc::new(LogProgress))
//!     .with_cancellation(token.clone())
//!     .with_image_format(ImageFormat::Png)
//!     .with_batch_size(10);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use image::ImageFormat;

use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// Configuration for a sampling run.
///
/// All fields have sensible defaults: PNG output, no progress callback, no
/// cancellation, existing screenshots are not overwritten.
#[derive(Clone)]
pub struct SamplingOptions {
    /// Progress callback. Defaults to a no-op.
    pub(crate) progress: Arc<dyn ProgressCallback>,
    /// Cancellation token. `None` means never cancelled.
    pub(crate) cancellation: Option<CancellationToken>,
    /// How often to fire the progress callback (every N items).
    pub(crate) batch_size: u64,
    /// Encoding of written screenshots.
    pub(crate) image_format: ImageFormat,
    /// Replace screenshots that already exist in the output directory.
    pub(crate) overwrite: bool,
}

impl Debug for SamplingOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("SamplingOptions")
            .field("has_progress", &true)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .field("image_format", &self.image_format)
            .field("overwrite", &self.overwrite)
            .finish()
    }
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SamplingOptions {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1,
            image_format: ImageFormat::Png,
            overwrite: false,
        }
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// When the token is cancelled, the run stops before the next source or
    /// screenshot and returns [`ShotAlignError::Cancelled`](crate::ShotAlignError::Cancelled).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Set how often the progress callback fires.
    ///
    /// Clamped to a minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the encoding of written screenshots. Defaults to PNG.
    #[must_use]
    pub fn with_image_format(mut self, format: ImageFormat) -> Self {
        self.image_format = format;
        self
    }

    /// Allow replacing screenshots that already exist.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// File extension matching the configured image format.
    pub fn extension(&self) -> &'static str {
        self.image_format
            .extensions_str()
            .first()
            .copied()
            .unwrap_or("png")
    }

    /// Returns `true` if cancellation has been requested.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}
