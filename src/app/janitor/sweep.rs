//! Removal of stale artifacts from the artifact directory

use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::errors::{SchedulerError, SchedulerResult};

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Regular files examined
    pub scanned: usize,
    /// Files deleted
    pub removed: usize,
    /// Stale files that could not be deleted
    pub failed: usize,
}

/// Delete regular files in `dir` last modified more than `max_age` ago
///
/// A missing directory is treated as empty. Individual deletion failures are logged
/// and counted; only a failure to list the directory is an error.
pub async fn sweep_artifacts(dir: &Path, max_age: Duration) -> SchedulerResult<SweepReport> {
    let mut report = SweepReport::default();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Artifact directory {} does not exist yet", dir.display());
            return Ok(report);
        }
        Err(source) => {
            return Err(SchedulerError::SweepFailed {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let now = SystemTime::now();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(source) => {
                return Err(SchedulerError::SweepFailed {
                    path: dir.to_path_buf(),
                    source,
                })
            }
        };

        let metadata = match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(e) => {
                debug!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };
        report.scanned += 1;

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or(Duration::ZERO);
        if age <= max_age {
            continue;
        }

        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => {
                debug!("Deleted stale artifact {}", entry.path().display());
                report.removed += 1;
            }
            Err(e) => {
                warn!("Failed to delete {}: {}", entry.path().display(), e);
                report.failed += 1;
            }
        }
    }

    Ok(report)
}
