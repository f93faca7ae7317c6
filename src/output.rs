//! Output directory layout.
//!
//! Screenshots of each run go into their own timestamped directory under an
//! [`OutputRoot`]. The root is passed explicitly wherever it is needed, so
//! several comparison projects can live side by side.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};

use crate::error::ShotAlignError;

/// Format of run directory names, e.g. `20240131_235959`.
pub const RUN_DIRECTORY_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A directory holding one subdirectory per sampling run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRoot {
    root: PathBuf,
}

impl OutputRoot {
    /// Use `root` as the screenshots directory. Nothing is created yet.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Create the directory for a run started at `started_at`.
    ///
    /// If a directory for the same second already exists, a numeric suffix is
    /// appended so two runs never share one directory.
    pub fn create_run_directory(
        &self,
        started_at: &DateTime<Local>,
    ) -> Result<PathBuf, ShotAlignError> {
        fs::create_dir_all(&self.root)?;

        let base_name = started_at.format(RUN_DIRECTORY_FORMAT).to_string();
        let mut candidate = self.root.join(&base_name);
        let mut suffix = 1;
        while candidate.exists() {
            candidate = self.root.join(format!("{base_name}_{suffix}"));
            suffix += 1;
        }

        fs::create_dir(&candidate)?;
        log::debug!("Created run directory {}", candidate.display());
        Ok(candidate)
    }

    /// Names of all run directories, sorted.
    ///
    /// A missing root yields an empty list.
    pub fn run_directories(&self) -> Result<Vec<String>, ShotAlignError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// File names directly inside the run directory `folder`.
    pub fn list_files(&self, folder: &str) -> Result<Vec<String>, ShotAlignError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.root.join(folder))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    /// Whether the run directory `folder` still exists.
    pub fn contains(&self, folder: &str) -> bool {
        self.root.join(folder).is_dir()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn run_directories_are_timestamped_and_unique() {
        let directory = tempfile::tempdir().expect("Failed to create temp dir");
        let root = OutputRoot::new(directory.path().join("screenshots"));
        let started_at = Local.with_ymd_and_hms(2024, 1, 31, 23, 59, 58).unwrap();

        let first = root.create_run_directory(&started_at).unwrap();
        let second = root.create_run_directory(&started_at).unwrap();

        assert!(first.ends_with("20240131_235958"));
        assert!(second.ends_with("20240131_235958_1"));
        assert_eq!(
            root.run_directories().unwrap(),
            vec!["20240131_235958".to_string(), "20240131_235958_1".to_string()]
        );
    }

    #[test]
    fn missing_root_has_no_runs() {
        let directory = tempfile::tempdir().expect("Failed to create temp dir");
        let root = OutputRoot::new(directory.path().join("absent"));
        assert!(root.run_directories().unwrap().is_empty());
        assert!(!root.contains("20240101_000000"));
    }

    #[test]
    fn lists_only_files() {
        let directory = tempfile::tempdir().expect("Failed to create temp dir");
        let root = OutputRoot::new(directory.path());
        fs::create_dir_all(directory.path().join("run/nested")).unwrap();
        fs::write(directory.path().join("run/000001_000001_A.png"), b"").unwrap();

        assert_eq!(root.list_files("run").unwrap(), vec!["000001_000001_A.png".to_string()]);
    }
}
