//! Camera directory scanning.
//!
//! Walks one camera's recording tree depth-first. Inside each directory the
//! files are visited before the subdirectories, both in file-name order, so
//! the candidate order is stable across sweeps and platforms.
//!
//! A directory that has at least one immediate subdirectory older than the
//! staleness threshold is treated as archived footage and skipped according to
//! the configured [`StalePolicy`]. Scanning has no side effects.

use anyhow::Result;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::{DirEntry, WalkDir};

use crate::config::{CameraConfig, ScanSettings, StalePolicy};
use crate::storage::WatchStore;
use crate::VideoFile;

/// Collect the candidate clips of one camera for this sweep.
///
/// A candidate has the configured extension, a nonzero size and is not yet in
/// the ledger. Empty files are left out without touching the ledger so they
/// are looked at again on the next sweep.
pub fn scan_camera(
    camera: &CameraConfig,
    settings: &ScanSettings,
    store: &dyn WatchStore,
    now: SystemTime,
) -> Result<Vec<VideoFile>> {
    if !camera.dir.is_dir() {
        log::warn!(
            "camera {}: recording directory {} is missing",
            camera.name,
            camera.dir.display()
        );
        return Ok(Vec::new());
    }

    let mut candidates = Vec::new();
    let mut files_suppressed: HashSet<PathBuf> = HashSet::new();
    let mut walker = WalkDir::new(&camera.dir)
        .sort_by(|a, b| {
            let a_dir = a.file_type().is_dir();
            let b_dir = b.file_type().is_dir();
            a_dir
                .cmp(&b_dir)
                .then_with(|| a.file_name().cmp(b.file_name()))
        })
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("camera {}: walk error: {}", camera.name, e);
                continue;
            }
        };

        if entry.file_type().is_dir() {
            if has_stale_subdir(entry.path(), settings.stale_after, now) {
                match settings.stale_policy {
                    StalePolicy::PruneSubtree => {
                        log::debug!("skipping stale subtree {}", entry.path().display());
                        walker.skip_current_dir();
                    }
                    StalePolicy::SkipFiles => {
                        log::debug!("skipping files in stale dir {}", entry.path().display());
                        files_suppressed.insert(entry.path().to_path_buf());
                    }
                }
            }
            continue;
        }

        if entry
            .path()
            .parent()
            .is_some_and(|parent| files_suppressed.contains(parent))
        {
            continue;
        }

        if let Some(video) = candidate(&entry, camera, settings, store)? {
            candidates.push(video);
        }
    }

    Ok(candidates)
}

fn candidate(
    entry: &DirEntry,
    camera: &CameraConfig,
    settings: &ScanSettings,
    store: &dyn WatchStore,
) -> Result<Option<VideoFile>> {
    let name = entry.file_name().to_string_lossy();
    if !name.ends_with(settings.video_extension.as_str()) {
        return Ok(None);
    }

    let path = entry.path();
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) => {
            log::debug!("cannot stat {}: {}", path.display(), e);
            return Ok(None);
        }
    };
    if !meta.is_file() {
        return Ok(None);
    }

    let key = path.to_string_lossy();
    if store.is_processed(&key)? {
        return Ok(None);
    }
    if meta.len() == 0 {
        log::debug!("{} is still empty, retrying next sweep", path.display());
        return Ok(None);
    }

    Ok(Some(VideoFile {
        path: path.to_path_buf(),
        camera: camera.name.clone(),
        size: meta.len(),
    }))
}

/// True when any immediate subdirectory of `dir` was last modified more than
/// `stale_after` before `now`.
pub fn has_stale_subdir(dir: &Path, stale_after: Duration, now: SystemTime) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        let Ok(meta) = entry.metadata() else {
            return false;
        };
        if !meta.is_dir() {
            return false;
        }
        meta.modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age > stale_after)
    })
}
