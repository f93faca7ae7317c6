//! Selection of the reference frames compared in one run.
//!
//! A [`FrameSet`] is either drawn at random by a [`FrameSetGenerator`] or
//! replayed from a [`HistoryEntry`] so an earlier comparison can be
//! regenerated with new sources or settings.
//!
//! # Example
//!
//! ```
//! use shotalign::FrameSetGenerator;
//!
//! let mut generator = FrameSetGenerator::with_seed(7);
//! let frame_set = generator.generate(10_000, 12, 1_000, 0)?;
//! assert_eq!(frame_set.len(), 12);
//! assert!(frame_set.frames().iter().all(|&f| (1_000..10_000).contains(&f)));
//! # Ok::<(), shotalign::ShotAlignError>(())
//! ```

use chrono::{DateTime, Local};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::{error::ShotAlignError, history::HistoryEntry};

/// Where a [`FrameSet`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSetOrigin {
    /// Freshly sampled by [`FrameSetGenerator::generate`].
    Generated,
    /// Reproduced from a history entry.
    Replayed,
    /// Supplied explicitly by the caller.
    Specified,
}

/// An ordered, duplicate-free selection of reference-clock frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSet {
    frames: Vec<u64>,
    origin: FrameSetOrigin,
    range_start: u64,
    range_end: u64,
    created_at: DateTime<Local>,
}

impl FrameSet {
    /// Build a set from caller-chosen frames, sorting and deduplicating them.
    pub fn from_frames(mut frames: Vec<u64>) -> Self {
        frames.sort_unstable();
        frames.dedup();
        let (range_start, range_end) = span(&frames);
        Self {
            frames,
            origin: FrameSetOrigin::Specified,
            range_start,
            range_end,
            created_at: Local::now(),
        }
    }

    /// The selected reference frames.
    pub fn frames(&self) -> &[u64] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn origin(&self) -> FrameSetOrigin {
        self.origin
    }

    /// First frame of the sub-range the set was drawn from.
    pub fn range_start(&self) -> u64 {
        self.range_start
    }

    /// End of the sub-range the set was drawn from (exclusive).
    pub fn range_end(&self) -> u64 {
        self.range_end
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }
}

/// Smallest frame and one past the largest, or `(0, 0)` when empty.
fn span(frames: &[u64]) -> (u64, u64) {
    match (frames.iter().min(), frames.iter().max()) {
        (Some(&low), Some(&high)) => (low, high.saturating_add(1)),
        _ => (0, 0),
    }
}

/// Produces [`FrameSet`]s.
///
/// Owns a ChaCha8 generator; seed it with [`with_seed`](FrameSetGenerator::with_seed)
/// to make sampling reproducible.
#[derive(Debug, Clone)]
pub struct FrameSetGenerator {
    rng: ChaCha8Rng,
}

impl Default for FrameSetGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSetGenerator {
    /// A generator seeded from system entropy.
    pub fn new() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// A deterministic generator.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Draw `count` distinct reference frames from a sub-range of the
    /// reference video.
    ///
    /// The effective range is `[max(0, range_start), min(range_end, total_frames))`,
    /// where a `range_end` of 0 means "to the end". Asking for more frames
    /// than the range holds returns every frame in it.
    ///
    /// # Errors
    ///
    /// - [`ShotAlignError::EmptyDomain`] if `total_frames` is 0.
    /// - [`ShotAlignError::EmptyRange`] if the effective range is empty.
    pub fn generate(
        &mut self,
        total_frames: u64,
        count: usize,
        range_start: u64,
        range_end: u64,
    ) -> Result<FrameSet, ShotAlignError> {
        if total_frames == 0 {
            return Err(ShotAlignError::EmptyDomain);
        }

        let start = range_start;
        let end = if range_end == 0 {
            total_frames
        } else {
            range_end.min(total_frames)
        };

        if start >= end {
            return Err(ShotAlignError::EmptyRange { start, end });
        }

        let available = end - start;
        let frames: Vec<u64> = if count as u64 >= available {
            if count as u64 > available {
                log::warn!(
                    "Requested {count} frames but only {available} are available in [{start}, {end}); using all of them"
                );
            }
            (start..end).collect()
        } else {
            let mut picked: Vec<u64> =
                rand::seq::index::sample(&mut self.rng, available as usize, count)
                    .into_iter()
                    .map(|index| start + index as u64)
                    .collect();
            picked.sort_unstable();
            picked
        };

        log::info!(
            "Sampled {} reference frame(s) from [{start}, {end})",
            frames.len()
        );

        Ok(FrameSet {
            frames,
            origin: FrameSetOrigin::Generated,
            range_start: start,
            range_end: end,
            created_at: Local::now(),
        })
    }

    /// Reproduce the frames of a history entry verbatim.
    pub fn replay(&self, entry: &HistoryEntry) -> FrameSet {
        let frames = entry.frames.clone();
        let (range_start, range_end) = span(&frames);

        log::info!(
            "Replaying {} frame(s) from history entry '{}'",
            frames.len(),
            entry.label
        );

        FrameSet {
            frames,
            origin: FrameSetOrigin::Replayed,
            range_start,
            range_end,
            created_at: Local::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryOrigin;

    fn is_strictly_ascending(frames: &[u64]) -> bool {
        frames.windows(2).all(|pair| pair[0] < pair[1])
    }

    #[test]
    fn over_request_saturates_to_whole_video() {
        let mut generator = FrameSetGenerator::with_seed(1);
        let frame_set = generator.generate(1000, 2000, 0, 0).unwrap();
        assert_eq!(frame_set.frames(), (0..1000).collect::<Vec<u64>>().as_slice());
        assert_eq!(frame_set.origin(), FrameSetOrigin::Generated);
    }

    #[test]
    fn exact_request_returns_whole_range() {
        let mut generator = FrameSetGenerator::with_seed(1);
        let frame_set = generator.generate(100, 10, 20, 30).unwrap();
        assert_eq!(frame_set.frames(), (20..30).collect::<Vec<u64>>().as_slice());
    }

    #[test]
    fn samples_are_distinct_sorted_and_in_range() {
        let mut generator = FrameSetGenerator::with_seed(99);
        for _ in 0..50 {
            let frame_set = generator.generate(5000, 40, 100, 4000).unwrap();
            assert_eq!(frame_set.len(), 40);
            assert!(is_strictly_ascending(frame_set.frames()));
            assert!(frame_set.frames().iter().all(|&f| (100..4000).contains(&f)));
            assert_eq!(frame_set.range_start(), 100);
            assert_eq!(frame_set.range_end(), 4000);
        }
    }

    #[test]
    fn range_end_is_clamped_to_video_length() {
        let mut generator = FrameSetGenerator::with_seed(5);
        let frame_set = generator.generate(50, 100, 10, 80).unwrap();
        assert_eq!(frame_set.range_end(), 50);
        assert_eq!(frame_set.len(), 40);
    }

    #[test]
    fn same_seed_same_frames() {
        let first = FrameSetGenerator::with_seed(42).generate(100_000, 25, 0, 0).unwrap();
        let second = FrameSetGenerator::with_seed(42).generate(100_000, 25, 0, 0).unwrap();
        assert_eq!(first.frames(), second.frames());
    }

    #[test]
    fn empty_inputs_are_rejected() {
        let mut generator = FrameSetGenerator::with_seed(0);
        assert!(matches!(
            generator.generate(0, 5, 0, 0),
            Err(ShotAlignError::EmptyDomain)
        ));
        assert!(matches!(
            generator.generate(100, 5, 60, 40),
            Err(ShotAlignError::EmptyRange { start: 60, end: 40 })
        ));
        assert!(matches!(
            generator.generate(100, 5, 100, 0),
            Err(ShotAlignError::EmptyRange { start: 100, end: 100 })
        ));
    }

    #[test]
    fn zero_count_gives_empty_set() {
        let mut generator = FrameSetGenerator::with_seed(0);
        let frame_set = generator.generate(100, 0, 0, 0).unwrap();
        assert!(frame_set.is_empty());
    }

    #[test]
    fn replay_is_verbatim_and_idempotent() {
        let generated = FrameSetGenerator::with_seed(3).generate(9000, 8, 0, 0).unwrap();
        let entry = HistoryEntry {
            label: "run".to_string(),
            frames: generated.frames().to_vec(),
            created_at: generated.created_at(),
            folder: None,
            origin: HistoryOrigin::Recorded,
        };

        let generator = FrameSetGenerator::with_seed(1234);
        let first = generator.replay(&entry);
        let second = generator.replay(&first_entry(&first));
        assert_eq!(first.frames(), generated.frames());
        assert_eq!(second.frames(), generated.frames());
        assert_eq!(first.origin(), FrameSetOrigin::Replayed);
    }

    #[test]
    fn replay_keeps_stored_order() {
        let entry = HistoryEntry {
            label: "hand-edited".to_string(),
            frames: vec![300, 100, 200],
            created_at: Local::now(),
            folder: None,
            origin: HistoryOrigin::Recorded,
        };
        let frame_set = FrameSetGenerator::new().replay(&entry);
        assert_eq!(frame_set.frames(), &[300, 100, 200]);
        assert_eq!(frame_set.range_start(), 100);
        assert_eq!(frame_set.range_end(), 301);
    }

    #[test]
    fn specified_frames_are_normalized() {
        let frame_set = FrameSet::from_frames(vec![50, 10, 50, 30]);
        assert_eq!(frame_set.frames(), &[10, 30, 50]);
        assert_eq!(frame_set.origin(), FrameSetOrigin::Specified);
        assert_eq!((frame_set.range_start(), frame_set.range_end()), (10, 51));
    }

    fn first_entry(frame_set: &FrameSet) -> HistoryEntry {
        HistoryEntry {
            label: "again".to_string(),
            frames: frame_set.frames().to_vec(),
            created_at: frame_set.created_at(),
            folder: None,
            origin: HistoryOrigin::Recorded,
        }
    }
}
