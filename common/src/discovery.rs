// Crontab and run-parts discovery: recursive directory walking with the
// classic crond eligibility checks. Files that fail a check are skipped
// with a warning and never reach the parser.

use std::fs::Metadata;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A crontab source must be a regular file not writable by group or
/// other (`mode & 0022 == 0`).
pub fn is_valid_crontab(metadata: &Metadata) -> bool {
    metadata.is_file() && metadata.permissions().mode() & 0o022 == 0
}

/// A run-parts candidate must additionally be executable by its owner.
pub fn is_executable(metadata: &Metadata) -> bool {
    metadata.permissions().mode() & 0o100 != 0
}

/// Walk `paths` recursively and invoke `callback` for every valid
/// crontab file. Unreadable paths and ineligible files are warned about
/// and skipped.
pub fn find_files_in_paths<F: FnMut(&Path)>(paths: &[PathBuf], callback: &mut F) {
    let mut filtered = |path: &Path, metadata: &Metadata| {
        if is_valid_crontab(metadata) {
            let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
            callback(&absolute);
        } else {
            warn!(path = %path.display(), "Ignoring file with wrong mode (not xx22)");
        }
    };
    for path in paths {
        walk(path, &mut filtered);
    }
}

/// Like `find_files_in_paths`, restricted to executable files. The
/// crontab writability check applies here too: run-parts scripts run
/// with elevated identity, so a group-writable one is rejected.
pub fn find_executables_in_paths<F: FnMut(&Path)>(paths: &[PathBuf], callback: &mut F) {
    let mut filtered = |path: &Path, metadata: &Metadata| {
        if !is_valid_crontab(metadata) {
            warn!(path = %path.display(), "Ignoring file with wrong mode (not xx22)");
        } else if !is_executable(metadata) {
            warn!(path = %path.display(), "Ignoring non-executable file");
        } else {
            let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
            callback(&absolute);
        }
    };
    for path in paths {
        walk(path, &mut filtered);
    }
}

fn walk<F: FnMut(&Path, &Metadata)>(path: &Path, callback: &mut F) {
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read directory");
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read directory entry");
                continue;
            }
        };
        let child = entry.path();
        let metadata = match child.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %child.display(), error = %e, "Cannot stat path");
                continue;
            }
        };

        if metadata.is_dir() {
            walk(&child, callback);
        } else {
            callback(&child, &metadata);
        }
    }
}
