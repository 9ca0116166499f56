//! Scoped ownership of downloaded files
//!
//! A [`TempArtifact`] names a unique stem inside the artifact directory. The fetcher
//! writes its output (and any partial or intermediate files) next to that stem; on
//! release every file carrying the stem is removed. Dropping an unreleased artifact
//! removes the files synchronously, which covers panics and cancelled futures.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tracing::{debug, warn};

use crate::app::models::UserId;

static ARTIFACT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Filesystem object owned by exactly one download
#[derive(Debug)]
pub struct TempArtifact {
    dir: PathBuf,
    stem: PathBuf,
    produced: Option<PathBuf>,
    released: bool,
}

impl TempArtifact {
    /// Reserve a unique stem for `track_id` in `dir`, creating the directory if needed
    pub async fn allocate(dir: &Path, user_id: UserId, track_id: &str) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;

        let safe_track: String = track_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .take(32)
            .collect();
        let sequence = ARTIFACT_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "{}_{}_{}_{}",
            user_id,
            safe_track,
            Utc::now().timestamp_millis(),
            sequence
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            stem: dir.join(name),
            produced: None,
            released: false,
        })
    }

    /// Path prefix handed to the fetcher
    pub fn stem(&self) -> &Path {
        &self.stem
    }

    /// Record the file the fetcher produced
    pub fn set_produced(&mut self, path: PathBuf) {
        self.produced = Some(path);
    }

    /// Whether `name` is the stem itself or the stem plus an extension
    fn owns(stem_name: &OsStr, name: &OsStr) -> bool {
        match (stem_name.to_str(), name.to_str()) {
            (Some(stem), Some(name)) => {
                name == stem
                    || name
                        .strip_prefix(stem)
                        .map_or(false, |rest| rest.starts_with('.'))
            }
            _ => false,
        }
    }

    /// Delete every file belonging to this artifact, returning how many were removed
    ///
    /// The artifact only counts as released once the scan has finished; a release
    /// cancelled midway falls back to the synchronous cleanup in `Drop`.
    pub async fn release(mut self) -> usize {
        let removed = self.remove_all().await;
        self.released = true;
        debug!("Released artifact {} ({} files)", self.stem.display(), removed);
        removed
    }

    async fn remove_all(&mut self) -> usize {
        let mut removed = 0;

        if let Some(produced) = self.produced.take() {
            match tokio::fs::remove_file(&produced).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to delete artifact {}: {}", produced.display(), e),
            }
        }

        let Some(stem_name) = self.stem.file_name().map(OsStr::to_os_string) else {
            return removed;
        };

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to scan {} for leftovers: {}", self.dir.display(), e);
                return removed;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            if !Self::owns(&stem_name, &entry.file_name()) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to delete {}: {}", entry.path().display(), e),
            }
        }

        removed
    }

    fn remove_blocking(&mut self) {
        if let Some(produced) = self.produced.take() {
            let _ = std::fs::remove_file(produced);
        }

        let Some(stem_name) = self.stem.file_name().map(OsStr::to_os_string) else {
            return;
        };
        if let Ok(entries) = std::fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                if Self::owns(&stem_name, &entry.file_name()) {
                    let _ = std::fs::remove_file(entry.path());
                }
            }
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if !self.released {
            debug!("Artifact {} dropped without release", self.stem.display());
            self.remove_blocking();
        }
    }
}
