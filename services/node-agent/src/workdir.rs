//! Executor work directories and their garbage collection.
//!
//! Every executor invocation gets a unique directory of the shape
//! `{work_dir}/slaves/{slave_id}/frameworks/{framework_id}/executors/{executor_id}/runs/{n}`
//! where `n` is the smallest non-negative integer whose path does not
//! exist yet. Abandoned directories are removed best-effort on a
//! blocking worker so the event loop never touches the disk tree.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use strata_id::{ExecutorId, FrameworkId, SlaveId};

/// Allocates a fresh run directory for an executor.
///
/// Scans `n = 0, 1, 2, ...` for the first non-existent path. The
/// directory is created unless `create` is false (configuration may
/// ask for paths to be computed only). Creation failure is an error
/// the caller treats as fatal.
pub fn allocate_run_directory(
    work_dir: &Path,
    slave_id: &SlaveId,
    framework_id: &FrameworkId,
    executor_id: &ExecutorId,
    create: bool,
) -> Result<PathBuf> {
    let prefix = work_dir
        .join("slaves")
        .join(slave_id.as_str())
        .join("frameworks")
        .join(framework_id.as_str())
        .join("executors")
        .join(executor_id.as_str())
        .join("runs");

    for n in 0..u32::MAX {
        let candidate = prefix.join(n.to_string());
        if candidate.exists() {
            continue;
        }

        if create {
            std::fs::create_dir_all(&candidate).with_context(|| {
                format!("creating work directory {}", candidate.display())
            })?;
        }

        return Ok(candidate);
    }

    bail!(
        "no free run directory under {} for executor '{executor_id}' of framework {framework_id}",
        prefix.display()
    );
}

/// Finds directories under `{work_dir}/slaves` left behind by earlier
/// agent incarnations: any entry whose name is not the current slave
/// ID and whose mtime is older than `timeout`.
pub fn stale_slave_directories(
    work_dir: &Path,
    current: &SlaveId,
    timeout: Duration,
) -> Vec<PathBuf> {
    let slaves_dir = work_dir.join("slaves");
    let mut stale = Vec::new();

    let entries = match std::fs::read_dir(&slaves_dir) {
        Ok(entries) => entries,
        Err(_) => return stale, // Nothing on disk yet.
    };

    let now = SystemTime::now();
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy() == current.as_str() {
            continue;
        }

        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let old_enough = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|mtime| now.duration_since(mtime).ok())
            .is_some_and(|age| age > timeout);

        if old_enough {
            info!(path = %path.display(), "Scheduling stale slave directory for deletion");
            stale.push(path);
        }
    }

    stale
}

/// Removes directory trees on a blocking worker. Best-effort: errors
/// are logged and the remaining paths are still attempted.
pub fn remove_directories(paths: Vec<PathBuf>) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        for path in paths {
            info!(path = %path.display(), "Deleting directory");
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(path = %path.display(), error = %e, "Failed to delete directory");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ids() -> (SlaveId, FrameworkId, ExecutorId) {
        (
            SlaveId::new("s1"),
            FrameworkId::new("f1"),
            ExecutorId::new("e1"),
        )
    }

    #[test]
    fn test_allocation_scans_from_zero() {
        let work_dir = TempDir::new().unwrap();
        let (slave_id, framework_id, executor_id) = ids();

        let first =
            allocate_run_directory(work_dir.path(), &slave_id, &framework_id, &executor_id, true)
                .unwrap();
        assert!(first.ends_with("runs/0"));
        assert!(first.is_dir());

        let second =
            allocate_run_directory(work_dir.path(), &slave_id, &framework_id, &executor_id, true)
                .unwrap();
        assert!(second.ends_with("runs/1"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_allocation_skips_existing_holes() {
        let work_dir = TempDir::new().unwrap();
        let (slave_id, framework_id, executor_id) = ids();

        // Pre-create runs/0 and runs/2; allocation should pick 1.
        let runs = work_dir
            .path()
            .join("slaves/s1/frameworks/f1/executors/e1/runs");
        std::fs::create_dir_all(runs.join("0")).unwrap();
        std::fs::create_dir_all(runs.join("2")).unwrap();

        let allocated =
            allocate_run_directory(work_dir.path(), &slave_id, &framework_id, &executor_id, true)
                .unwrap();
        assert!(allocated.ends_with("runs/1"));
    }

    #[test]
    fn test_allocation_without_create() {
        let work_dir = TempDir::new().unwrap();
        let (slave_id, framework_id, executor_id) = ids();

        let path =
            allocate_run_directory(work_dir.path(), &slave_id, &framework_id, &executor_id, false)
                .unwrap();
        assert!(path.ends_with("runs/0"));
        assert!(!path.exists());
    }

    #[test]
    fn test_stale_sweep_spares_current_and_fresh() {
        let work_dir = TempDir::new().unwrap();
        let slaves = work_dir.path().join("slaves");
        std::fs::create_dir_all(slaves.join("s1")).unwrap();
        std::fs::create_dir_all(slaves.join("s0")).unwrap();

        // Everything was just created, so even a zero timeout only
        // catches entries with a measurable age; use a generous
        // timeout to assert nothing qualifies.
        let stale = stale_slave_directories(
            work_dir.path(),
            &SlaveId::new("s1"),
            Duration::from_secs(3600),
        );
        assert!(stale.is_empty());

        // With a zero timeout the old incarnation qualifies, the
        // current one never does.
        std::thread::sleep(Duration::from_millis(20));
        let stale = stale_slave_directories(
            work_dir.path(),
            &SlaveId::new("s1"),
            Duration::from_millis(1),
        );
        assert_eq!(stale.len(), 1);
        assert!(stale[0].ends_with("s0"));
    }

    #[test]
    fn test_stale_sweep_missing_root() {
        let work_dir = TempDir::new().unwrap();
        let stale = stale_slave_directories(
            work_dir.path(),
            &SlaveId::new("s1"),
            Duration::from_secs(1),
        );
        assert!(stale.is_empty());
    }

    #[tokio::test]
    async fn test_remove_directories_best_effort() {
        let work_dir = TempDir::new().unwrap();
        let doomed = work_dir.path().join("doomed");
        std::fs::create_dir_all(doomed.join("nested")).unwrap();

        let missing = work_dir.path().join("missing");

        remove_directories(vec![doomed.clone(), missing])
            .await
            .unwrap();
        assert!(!doomed.exists());
    }
}
