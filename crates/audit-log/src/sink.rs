//! File sink with size-based rotation.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

const ARCHIVE_SUFFIX: &str = "old";

/// Append one record and rotate when the sink has outgrown `max_size_bytes`.
/// Failures are warned, never returned.
pub(crate) fn append_and_rotate(path: &Path, line: &str, max_size_bytes: u64) {
    let size = match append_line(path, line) {
        Ok(size) => size,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "audit log write failed");
            return;
        }
    };

    if size <= max_size_bytes {
        return;
    }

    match rotate(path, Local::now()) {
        Ok(archive) => {
            tracing::info!(path = %path.display(), archive = %archive.display(), size, "audit log rotated")
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "audit log rotation failed")
        }
    }
}

fn append_line(path: &Path, line: &str) -> io::Result<u64> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()?;
    Ok(file.metadata()?.len())
}

/// Rename the live sink to its archive name and start an empty one.
pub(crate) fn rotate(path: &Path, now: DateTime<Local>) -> io::Result<PathBuf> {
    let archive = archive_path(path, now);
    fs::rename(path, &archive)?;
    OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
    Ok(archive)
}

/// `<file>.<yyyyMMdd-HHmmss>.old`, with a `-N` counter if that name is taken.
pub(crate) fn archive_path(path: &Path, now: DateTime<Local>) -> PathBuf {
    let stamp = now.format("%Y%m%d-%H%M%S").to_string();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audit.log".to_string());

    let candidate = |suffix: Option<u32>| {
        let name = match suffix {
            None => format!("{}.{}.{}", file_name, stamp, ARCHIVE_SUFFIX),
            Some(n) => format!("{}.{}-{}.{}", file_name, stamp, n, ARCHIVE_SUFFIX),
        };
        path.with_file_name(name)
    };

    let mut archive = candidate(None);
    let mut counter = 1;
    while archive.exists() {
        archive = candidate(Some(counter));
        counter += 1;
    }
    archive
}
