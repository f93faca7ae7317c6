//! Sampling-run history.
//!
//! [`HistoryStore`] keeps every frame set that produced screenshots so a
//! comparison can later be regenerated at exactly the same reference frames.
//! The store is backed by a JSON ledger. Run directories written before the
//! ledger existed (or by another machine) can be imported by parsing their
//! screenshot file names with
//! [`reconstruct_from_outputs`](HistoryStore::reconstruct_from_outputs).
//!
//! # Example
//!
//! ```no_run
//! use shotalign::{FrameSetGenerator, HistoryStore, OutputRoot};
//!
//! let mut history = HistoryStore::open("history.json")?;
//! history.reconstruct_from_outputs(&OutputRoot::new("screenshots"))?;
//!
//! let frame_set = FrameSetGenerator::new().generate(40_000, 10, 0, 0)?;
//! history.record(&frame_set, "before re-encode")?;
//!
//! for entry in history.list() {
//!     println!("{} -> {:?}", entry.label, entry.frames);
//! }
//! # Ok::<(), shotalign::ShotAlignError>(())
//! ```

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::{
    error::ShotAlignError,
    frame_set::FrameSet,
    naming::parse_screenshot_file_name,
    output::{OutputRoot, RUN_DIRECTORY_FORMAT},
};

/// How a [`HistoryEntry`] entered the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOrigin {
    /// Recorded at the end of a sampling run.
    Recorded,
    /// Recovered from the file names in a run directory.
    Recovered,
}

/// A stored frame set and the label it is selected by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Human-readable name, e.g. `"20240131_235958 (10 frames)"`.
    pub label: String,
    /// Reference frames, in the order they were sampled.
    pub frames: Vec<u64>,
    pub created_at: DateTime<Local>,
    /// Run directory this entry describes, if any.
    #[serde(default)]
    pub folder: Option<String>,
    pub origin: HistoryOrigin,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Ledger {
    entries: Vec<HistoryEntry>,
}

/// Ordered collection of [`HistoryEntry`] values.
#[derive(Debug, Default)]
pub struct HistoryStore {
    entries: Vec<HistoryEntry>,
    ledger_path: Option<PathBuf>,
}

/// Label used for a run directory holding `count` reference frames.
pub fn run_label(folder: &str, count: usize) -> String {
    format!("{folder} ({count} frames)")
}

impl HistoryStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the ledger at `path`. A missing file is an empty history; the
    /// file is created on the first write.
    ///
    /// # Errors
    ///
    /// Returns [`ShotAlignError::IoError`] if the ledger exists but cannot be
    /// read, and [`ShotAlignError::Json`] if it is not a valid ledger.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ShotAlignError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str::<Ledger>(&contents)?.entries
        } else {
            Vec::new()
        };

        log::debug!(
            "Loaded {} history entr(ies) from {}",
            entries.len(),
            path.display()
        );

        Ok(Self {
            entries,
            ledger_path: Some(path),
        })
    }

    /// Write the ledger, if the store has one.
    ///
    /// The ledger is written to a sibling temporary file and renamed into
    /// place.
    pub fn save(&self) -> Result<(), ShotAlignError> {
        let Some(path) = &self.ledger_path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let ledger = Ledger {
            entries: self.entries.clone(),
        };
        let temporary_path = path.with_extension("json.tmp");
        fs::write(&temporary_path, serde_json::to_string_pretty(&ledger)?)?;
        fs::rename(&temporary_path, path)?;
        Ok(())
    }

    /// Append `frame_set` under `label` and persist the ledger.
    pub fn record(
        &mut self,
        frame_set: &FrameSet,
        label: impl Into<String>,
    ) -> Result<&HistoryEntry, ShotAlignError> {
        self.push_recorded(frame_set, label.into(), None)
    }

    /// Append the frame set of a run written to the directory `folder`.
    ///
    /// The entry is labelled like recovered entries, so the same run is
    /// recognised whether it was recorded or later rediscovered.
    pub fn record_run(
        &mut self,
        frame_set: &FrameSet,
        folder: &str,
    ) -> Result<&HistoryEntry, ShotAlignError> {
        let label = run_label(folder, frame_set.len());
        self.push_recorded(frame_set, label, Some(folder.to_string()))
    }

    fn push_recorded(
        &mut self,
        frame_set: &FrameSet,
        label: String,
        folder: Option<String>,
    ) -> Result<&HistoryEntry, ShotAlignError> {
        log::info!("Recording history entry '{label}'");
        self.entries.push(HistoryEntry {
            label,
            frames: frame_set.frames().to_vec(),
            created_at: frame_set.created_at(),
            folder,
            origin: HistoryOrigin::Recorded,
        });
        self.save()?;
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Entries in the order they were recorded or discovered.
    pub fn list(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recently added entry.
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// Look an entry up by label.
    ///
    /// # Errors
    ///
    /// Returns [`ShotAlignError::UnknownHistoryEntry`] if no entry has that
    /// label.
    pub fn find(&self, label: &str) -> Result<&HistoryEntry, ShotAlignError> {
        self.entries
            .iter()
            .find(|entry| entry.label == label)
            .ok_or_else(|| ShotAlignError::UnknownHistoryEntry(label.to_string()))
    }

    fn knows_folder(&self, folder: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.folder.as_deref() == Some(folder))
    }

    /// Import every run directory under `root` the store does not know yet.
    ///
    /// Directories without any parseable screenshot names are ignored.
    /// Returns the number of entries added.
    pub fn reconstruct_from_outputs(&mut self, root: &OutputRoot) -> Result<usize, ShotAlignError> {
        let mut added = 0;

        for folder in root.run_directories()? {
            if self.knows_folder(&folder) {
                continue;
            }

            let file_names = match root.list_files(&folder) {
                Ok(file_names) => file_names,
                Err(error) => {
                    log::warn!("Skipping run directory {folder}: {error}");
                    continue;
                }
            };

            if let Some(entry) = reconstruct_from_listing(&folder, &file_names) {
                log::info!("Recovered history entry '{}'", entry.label);
                self.entries.push(entry);
                added += 1;
            }
        }

        if added > 0 {
            self.save()?;
        }
        Ok(added)
    }

    /// Drop entries backed by `folder`. Returns `true` if any were removed.
    pub fn forget_folder(&mut self, folder: &str) -> Result<bool, ShotAlignError> {
        let before = self.entries.len();
        self.entries
            .retain(|entry| entry.folder.as_deref() != Some(folder));
        let removed = self.entries.len() != before;
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    /// Drop entries whose run directory no longer exists under `root`.
    ///
    /// Entries without a folder are kept. Returns the number removed.
    pub fn prune_missing(&mut self, root: &OutputRoot) -> Result<usize, ShotAlignError> {
        let before = self.entries.len();
        self.entries.retain(|entry| match &entry.folder {
            Some(folder) => root.contains(folder),
            None => true,
        });
        let removed = before - self.entries.len();
        if removed > 0 {
            log::info!("Pruned {removed} history entr(ies) with deleted run directories");
            self.save()?;
        }
        Ok(removed)
    }
}

/// Rebuild a history entry from the file names of one run directory.
///
/// Collects the distinct reference frames of every well-formed screenshot
/// name, sorted ascending, so the result does not depend on listing order.
/// Returns `None` when no name parses.
pub fn reconstruct_from_listing<S: AsRef<str>>(
    folder: &str,
    file_names: &[S],
) -> Option<HistoryEntry> {
    let mut frames = BTreeSet::new();
    for file_name in file_names {
        match parse_screenshot_file_name(file_name.as_ref()) {
            Ok(name) => {
                frames.insert(name.reference_frame);
            }
            Err(error) => log::debug!("Ignoring {error}"),
        }
    }

    if frames.is_empty() {
        return None;
    }

    let frames: Vec<u64> = frames.into_iter().collect();
    Some(HistoryEntry {
        label: run_label(folder, frames.len()),
        frames,
        created_at: folder_timestamp(folder).unwrap_or_else(Local::now),
        folder: Some(folder.to_string()),
        origin: HistoryOrigin::Recovered,
    })
}

/// Parse the timestamp prefix of a run directory name.
fn folder_timestamp(folder: &str) -> Option<DateTime<Local>> {
    let prefix = folder.get(..15)?;
    let naive = NaiveDateTime::parse_from_str(prefix, RUN_DIRECTORY_FORMAT).ok()?;
    Local.from_local_datetime(&naive).single()
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn listing_recovers_sorted_distinct_reference_frames() {
        let names = [
            "000250_000246_VerA.png",
            "000100_000096_VerA.png",
            "000100_000120_VerB.png",
            "thumbs.db",
        ];
        let entry = reconstruct_from_listing("20240131_235958", &names).unwrap();
        assert_eq!(entry.frames, vec![100, 250]);
        assert_eq!(entry.label, "20240131_235958 (2 frames)");
        assert_eq!(entry.origin, HistoryOrigin::Recovered);
        assert_eq!(entry.folder.as_deref(), Some("20240131_235958"));
        assert_eq!(entry.created_at.year(), 2024);
        assert_eq!(entry.created_at.second(), 58);
    }

    #[test]
    fn listing_order_does_not_matter() {
        let mut names = vec![
            "000007_000008_A.png".to_string(),
            "000003_000004_A.png".to_string(),
            "000005_000006_B.png".to_string(),
        ];
        let forward = reconstruct_from_listing("run", &names).unwrap();
        names.reverse();
        let backward = reconstruct_from_listing("run", &names).unwrap();
        assert_eq!(forward.frames, backward.frames);
    }

    #[test]
    fn listing_without_screenshots_is_skipped() {
        assert!(reconstruct_from_listing("empty", &["notes.txt", "cover.jpg"]).is_none());
        assert!(reconstruct_from_listing::<&str>("empty", &[]).is_none());
    }

    #[test]
    fn find_reports_unknown_labels() {
        let store = HistoryStore::in_memory();
        assert!(matches!(
            store.find("nope"),
            Err(ShotAlignError::UnknownHistoryEntry(_))
        ));
    }

    #[test]
    fn record_keeps_insertion_order() {
        let mut store = HistoryStore::in_memory();
        store.record(&FrameSet::from_frames(vec![900]), "b").unwrap();
        store.record(&FrameSet::from_frames(vec![1]), "a").unwrap();
        let labels: Vec<&str> = store.list().iter().map(|entry| entry.label.as_str()).collect();
        assert_eq!(labels, vec!["b", "a"]);
        assert_eq!(store.latest().unwrap().frames, vec![1]);
    }
}
