//! Frame-domain reconciliation for non-arithmetic alignment modes.
//!
//! A source whose [`AlignmentMode`] is not [`None`](AlignmentMode::None) is
//! passed through a [`Reconciler`] before sampling. The reconciler wraps the
//! decoded [`Clip`] in one whose frame `i` corresponds to reference frame `i`,
//! after which only the source's offset is applied.
//!
//! [`ReconcilerSet::standard`] registers the adapters that work purely on
//! frame indices:
//!
//! | Mode | Adapter | Effect |
//! |------|---------|--------|
//! | `None` | [`Passthrough`] | clip used as decoded |
//! | `Decimate` | [`SelectEvery`] | keep 4 of every 5 frames |
//! | `Duplicate` | [`ChangeRate`] | repeat frames up to the reference rate |
//! | `SpeedChange` | [`AssumeRate`] | same frames, retimed |
//!
//! Inverse telecine and motion interpolation need a real filter graph and
//! have no built-in adapter. Register one with
//! [`ReconcilerSet::register`]; until then such sources fail with
//! [`ShotAlignError::ReconcilerUnavailable`].

use std::{collections::HashMap, fmt::Debug, sync::Arc};

use image::DynamicImage;

use crate::{
    decoder::{Clip, ClipInfo},
    error::ShotAlignError,
    source::{AlignmentMode, VideoSource},
};

/// A clip whose frame domain has been reconciled with the reference clock.
pub struct ReconciledClip {
    clip: Box<dyn Clip>,
    description: String,
}

impl ReconciledClip {
    pub fn new(clip: Box<dyn Clip>, description: impl Into<String>) -> Self {
        Self {
            clip,
            description: description.into(),
        }
    }

    /// Human-readable summary of what was done, for logs.
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn into_clip(self) -> Box<dyn Clip> {
        self.clip
    }
}

/// Adapter that realises one [`AlignmentMode`].
pub trait Reconciler: Send + Sync + Debug {
    /// The mode this adapter implements.
    fn mode(&self) -> AlignmentMode;

    /// Wrap `clip` so that its frames line up 1:1 with `source`'s reference
    /// clock.
    fn reconcile(
        &self,
        clip: Box<dyn Clip>,
        source: &VideoSource,
    ) -> Result<ReconciledClip, ShotAlignError>;
}

/// Maps each alignment mode to the adapter that realises it.
#[derive(Debug, Clone, Default)]
pub struct ReconcilerSet {
    adapters: HashMap<AlignmentMode, Arc<dyn Reconciler>>,
}

impl ReconcilerSet {
    /// A set with no adapters at all, not even for `None`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in adapters listed in the module docs.
    pub fn standard() -> Self {
        Self::empty()
            .register(Passthrough)
            .register(SelectEvery::default())
            .register(ChangeRate)
            .register(AssumeRate)
    }

    /// Add or replace the adapter for `reconciler.mode()`.
    #[must_use]
    pub fn register(mut self, reconciler: impl Reconciler + 'static) -> Self {
        self.adapters.insert(reconciler.mode(), Arc::new(reconciler));
        self
    }

    pub fn get(&self, mode: AlignmentMode) -> Option<&dyn Reconciler> {
        self.adapters.get(&mode).map(|adapter| adapter.as_ref())
    }

    pub fn supports(&self, mode: AlignmentMode) -> bool {
        self.adapters.contains_key(&mode)
    }

    /// Reconcile `clip` for `source` with the adapter of its mode.
    ///
    /// # Errors
    ///
    /// Returns [`ShotAlignError::ReconcilerUnavailable`] if no adapter is
    /// registered for the source's mode, or whatever the adapter returns.
    pub fn prepare(
        &self,
        clip: Box<dyn Clip>,
        source: &VideoSource,
    ) -> Result<Box<dyn Clip>, ShotAlignError> {
        let mode = source.alignment_mode;
        let adapter = self
            .get(mode)
            .ok_or(ShotAlignError::ReconcilerUnavailable { mode })?;

        let reconciled = adapter.reconcile(clip, source)?;
        log::debug!(
            "Source '{}' reconciled ({mode}): {}",
            source.identity,
            reconciled.description()
        );
        Ok(reconciled.into_clip())
    }
}

/// How reconciled frame indices map back to decoded ones.
#[derive(Debug, Clone, PartialEq)]
enum IndexMap {
    /// Frame `i` is decoded frame `i`.
    Identity,
    /// Keep `offsets` out of every `cycle` frames.
    SelectEvery { cycle: u64, offsets: Vec<u64> },
    /// Frame `i` is decoded frame `trunc(i * from / to)`.
    Resample { from: f64, to: f64 },
}

impl IndexMap {
    fn source_index(&self, frame_number: u64) -> u64 {
        match self {
            IndexMap::Identity => frame_number,
            IndexMap::SelectEvery { cycle, offsets } => {
                let kept = offsets.len() as u64;
                (frame_number / kept) * cycle + offsets[(frame_number % kept) as usize]
            }
            IndexMap::Resample { from, to } => (frame_number as f64 * from / to).trunc() as u64,
        }
    }

    fn total_frames(&self, decoded_total: u64) -> u64 {
        match self {
            IndexMap::Identity => decoded_total,
            IndexMap::SelectEvery { cycle, offsets } => {
                let remainder = decoded_total % cycle;
                (decoded_total / cycle) * offsets.len() as u64
                    + offsets.iter().filter(|&&offset| offset < remainder).count() as u64
            }
            IndexMap::Resample { from, to } => (decoded_total as f64 * to / from).trunc() as u64,
        }
    }
}

/// A clip viewed through an [`IndexMap`].
struct MappedClip {
    inner: Box<dyn Clip>,
    map: IndexMap,
    info: ClipInfo,
}

impl MappedClip {
    fn new(inner: Box<dyn Clip>, map: IndexMap, frames_per_second: f64) -> Self {
        let decoded = inner.info();
        let info = ClipInfo {
            total_frames: map.total_frames(decoded.total_frames),
            frames_per_second,
            ..decoded
        };
        Self { inner, map, info }
    }
}

impl Clip for MappedClip {
    fn info(&self) -> ClipInfo {
        self.info
    }

    fn frame(&mut self, frame_number: u64) -> Result<DynamicImage, ShotAlignError> {
        if frame_number >= self.info.total_frames {
            return Err(ShotAlignError::FrameOutOfRange {
                frame_number,
                total_frames: self.info.total_frames,
            });
        }
        self.inner.frame(self.map.source_index(frame_number))
    }
}

fn reference_rate(source: &VideoSource) -> Result<f64, ShotAlignError> {
    let fps = source.reference_fps;
    if fps.is_finite() && fps > 0.0 {
        Ok(fps)
    } else {
        Err(ShotAlignError::InvalidClockRate {
            identity: source.identity.clone(),
            reference_fps: fps,
            source_fps: source.source_fps.unwrap_or(0.0),
        })
    }
}

/// Uses the decoded clip unchanged. Registered for [`AlignmentMode::None`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Reconciler for Passthrough {
    fn mode(&self) -> AlignmentMode {
        AlignmentMode::None
    }

    fn reconcile(
        &self,
        clip: Box<dyn Clip>,
        _source: &VideoSource,
    ) -> Result<ReconciledClip, ShotAlignError> {
        Ok(ReconciledClip::new(clip, "unchanged"))
    }
}

/// Pattern decimation: keeps the frames at `offsets` within every block of
/// `cycle` frames.
///
/// The default keeps 4 of every 5 frames, which takes 29.97 fps material to
/// 23.976.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectEvery {
    cycle: u64,
    offsets: Vec<u64>,
}

impl Default for SelectEvery {
    fn default() -> Self {
        Self {
            cycle: 5,
            offsets: vec![0, 1, 2, 3],
        }
    }
}

impl SelectEvery {
    /// Keep `offsets` of every `cycle` frames.
    ///
    /// Offsets are sorted and deduplicated; ones outside the cycle are
    /// dropped. Returns `None` if nothing would be kept.
    pub fn new(cycle: u64, mut offsets: Vec<u64>) -> Option<Self> {
        offsets.retain(|&offset| offset < cycle);
        offsets.sort_unstable();
        offsets.dedup();
        if offsets.is_empty() {
            return None;
        }
        Some(Self { cycle, offsets })
    }
}

impl Reconciler for SelectEvery {
    fn mode(&self) -> AlignmentMode {
        AlignmentMode::Decimate
    }

    fn reconcile(
        &self,
        clip: Box<dyn Clip>,
        source: &VideoSource,
    ) -> Result<ReconciledClip, ShotAlignError> {
        let fps = reference_rate(source)?;
        let map = IndexMap::SelectEvery {
            cycle: self.cycle,
            offsets: self.offsets.clone(),
        };
        let description = format!("kept {:?} of every {} frames", self.offsets, self.cycle);
        Ok(ReconciledClip::new(
            Box::new(MappedClip::new(clip, map, fps)),
            description,
        ))
    }
}

/// Changes the frame rate by repeating (or dropping) whole frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeRate;

impl Reconciler for ChangeRate {
    fn mode(&self) -> AlignmentMode {
        AlignmentMode::Duplicate
    }

    fn reconcile(
        &self,
        clip: Box<dyn Clip>,
        source: &VideoSource,
    ) -> Result<ReconciledClip, ShotAlignError> {
        let reference_fps = reference_rate(source)?;
        let source_fps = source.effective_source_fps(clip.info().frames_per_second);
        if !(source_fps.is_finite() && source_fps > 0.0) {
            return Err(ShotAlignError::InvalidClockRate {
                identity: source.identity.clone(),
                reference_fps,
                source_fps,
            });
        }

        let map = IndexMap::Resample {
            from: source_fps,
            to: reference_fps,
        };
        let description = format!("resampled {source_fps:.3} -> {reference_fps:.3} fps");
        Ok(ReconciledClip::new(
            Box::new(MappedClip::new(clip, map, reference_fps)),
            description,
        ))
    }
}

/// Plays the same frames at the reference rate, changing speed and duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeRate;

impl Reconciler for AssumeRate {
    fn mode(&self) -> AlignmentMode {
        AlignmentMode::SpeedChange
    }

    fn reconcile(
        &self,
        clip: Box<dyn Clip>,
        source: &VideoSource,
    ) -> Result<ReconciledClip, ShotAlignError> {
        let fps = reference_rate(source)?;
        Ok(ReconciledClip::new(
            Box::new(MappedClip::new(clip, IndexMap::Identity, fps)),
            format!("retimed to {fps:.3} fps"),
        ))
    }
}
