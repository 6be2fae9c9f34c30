/**
 * ============================================================================
 * RECORDING STORAGE MODULE
 * ============================================================================
 *
 * PURPOSE: Manage segment files in the destination folder
 *
 * FUNCTIONALITY:
 * - Generate segment file names from the capture start time
 * - Create a uniquely named destination folder (never reuses an existing one)
 * - List recording files, oldest first
 * - Enforce the retention cap by deleting the oldest segments
 *
 * FILE STRUCTURE:
 * ~/Videos/Screen Recordings/
 * ├── screen_recording_150125_093000.avi
 * ├── screen_recording_150125_093500.avi
 * └── ...
 *
 * Retention state is derived from the folder contents on every pass; there is
 * no index file.
 *
 * ============================================================================
 */

use crate::recording::encoder::RECORDING_EXTENSION;
use crate::recording::error::{ConfigError, RetentionError};
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

pub const FILE_PREFIX: &str = "screen_recording_";
pub const DEFAULT_FOLDER_NAME: &str = "Screen Recordings";

// screen_recording_DDMMYY_HHMMSS[_N].avi
static RECORDING_NAME: Lazy<Regex> = Lazy::new(|| {
    let pattern = format!(
        r"^{}\d{{6}}_\d{{6}}(_\d+)?\.{}$",
        regex::escape(FILE_PREFIX),
        regex::escape(RECORDING_EXTENSION)
    );
    Regex::new(&pattern).expect("valid recording name regex")
});

// =============================================================================
// Naming
// =============================================================================

// File name for a segment starting at `started_at`
pub fn segment_file_name(started_at: &DateTime<Local>) -> String {
    format!(
        "{}{}.{}",
        FILE_PREFIX,
        started_at.format("%d%m%y_%H%M%S"),
        RECORDING_EXTENSION
    )
}

// Path for a new segment; appends _1, _2, ... if the name is already taken
pub fn segment_path(folder: &Path, started_at: &DateTime<Local>) -> PathBuf {
    let base = segment_file_name(started_at);
    let mut path = folder.join(&base);
    let stem = base.trim_end_matches(&format!(".{}", RECORDING_EXTENSION)).to_string();
    let mut counter = 1;

    while path.exists() {
        path = folder.join(format!("{}_{}.{}", stem, counter, RECORDING_EXTENSION));
        counter += 1;
    }

    path
}

pub fn is_recording_file_name(name: &str) -> bool {
    RECORDING_NAME.is_match(name)
}

// =============================================================================
// Destination Folder
// =============================================================================

// Create `parent/name`, or `parent/name 1`, `parent/name 2`, ... if taken
pub fn create_unique_folder(parent: &Path, name: &str) -> Result<PathBuf, ConfigError> {
    std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateFolder {
        path: parent.to_path_buf(),
        source,
    })?;

    let mut target = parent.join(name);
    let mut counter = 1;

    loop {
        match std::fs::create_dir(&target) {
            Ok(()) => {
                log::info!("Created recordings folder {:?}", target);
                return Ok(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                target = parent.join(format!("{} {}", name, counter));
                counter += 1;
            }
            Err(source) => {
                return Err(ConfigError::CreateFolder {
                    path: target,
                    source,
                });
            }
        }
    }
}

// Default parent for the recordings folder
pub fn default_output_parent() -> PathBuf {
    dirs::video_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

// =============================================================================
// Retention
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingFile {
    pub path: PathBuf,
    pub file_name: String,
    pub modified: SystemTime,
}

// Result of one retention pass
#[derive(Debug, Default)]
pub struct RetentionReport {
    pub deleted: Vec<PathBuf>,
    pub failures: Vec<RetentionError>,
    pub remaining: usize,
}

// All recording files in `folder`, oldest first (ties broken by name)
pub fn recording_files(folder: &Path) -> Result<Vec<RecordingFile>, RetentionError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
    {
        let entry = entry.map_err(|source| RetentionError::List {
            path: folder.to_path_buf(),
            source,
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !is_recording_file_name(&file_name) {
            continue;
        }

        // Removed between listing and stat: not a recording anymore
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        files.push(RecordingFile {
            path: entry.into_path(),
            file_name,
            modified,
        });
    }

    files.sort_by(|a, b| {
        a.modified
            .cmp(&b.modified)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });

    Ok(files)
}

// Delete the oldest recordings until at most `max_count` remain
pub fn enforce_retention(folder: &Path, max_count: usize) -> RetentionReport {
    enforce_retention_with(folder, max_count, |path| std::fs::remove_file(path))
}

// Same as enforce_retention, deleting through `remove`.
// A file that cannot be deleted stays; nothing newer is deleted in its place.
pub fn enforce_retention_with<F>(folder: &Path, max_count: usize, mut remove: F) -> RetentionReport
where
    F: FnMut(&Path) -> std::io::Result<()>,
{
    let files = match recording_files(folder) {
        Ok(files) => files,
        Err(e) => {
            log::warn!("{}", e);
            return RetentionReport {
                failures: vec![e],
                ..Default::default()
            };
        }
    };

    let mut report = RetentionReport {
        remaining: files.len(),
        ..Default::default()
    };

    if files.len() <= max_count {
        return report;
    }

    let excess = files.len() - max_count;
    log::info!(
        "Retention cap exceeded ({} / {}), deleting {} oldest recording(s)",
        files.len(),
        max_count,
        excess
    );

    for file in files.into_iter().take(excess) {
        match remove(&file.path) {
            Ok(()) => {
                log::info!("Old recording deleted: {:?}", file.path);
                report.remaining -= 1;
                report.deleted.push(file.path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("Recording {:?} already removed", file.path);
                report.remaining -= 1;
            }
            Err(source) => {
                let err = RetentionError::Delete {
                    path: file.path,
                    source,
                };
                log::warn!("{}", err);
                report.failures.push(err);
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs::File;
    use std::time::Duration;

    fn touch(folder: &Path, name: &str, age_secs: u64) -> PathBuf {
        let path = folder.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
        path
    }

    fn names(folder: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(folder)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_segment_file_name_format() {
        let at = Local.with_ymd_and_hms(2025, 1, 15, 9, 30, 5).unwrap();
        assert_eq!(segment_file_name(&at), "screen_recording_150125_093005.avi");
        assert!(is_recording_file_name(&segment_file_name(&at)));
    }

    #[test]
    fn test_segment_path_avoids_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let at = Local.with_ymd_and_hms(2025, 1, 15, 9, 30, 5).unwrap();

        let first = segment_path(dir.path(), &at);
        File::create(&first).unwrap();
        let second = segment_path(dir.path(), &at);

        assert_ne!(first, second);
        assert_eq!(
            second.file_name().unwrap(),
            "screen_recording_150125_093005_1.avi"
        );
        assert!(is_recording_file_name(
            second.file_name().unwrap().to_str().unwrap()
        ));
    }

    #[test]
    fn test_recording_name_filter() {
        assert!(is_recording_file_name("screen_recording_010203_040506.avi"));
        assert!(!is_recording_file_name("screen_recording_010203_040506.mp4"));
        assert!(!is_recording_file_name("notes.avi"));
        assert!(!is_recording_file_name("screen_recording_latest.avi"));
    }

    #[test]
    fn test_unique_folder_creation() {
        let dir = tempfile::tempdir().unwrap();

        let first = create_unique_folder(dir.path(), "Recordings").unwrap();
        let second = create_unique_folder(dir.path(), "Recordings").unwrap();
        let third = create_unique_folder(dir.path(), "Recordings").unwrap();

        assert_eq!(first, dir.path().join("Recordings"));
        assert_eq!(second, dir.path().join("Recordings 1"));
        assert_eq!(third, dir.path().join("Recordings 2"));
        assert!(third.is_dir());
    }

    #[test]
    fn test_retention_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        for (i, age) in [50, 40, 30, 20, 10].iter().enumerate() {
            touch(dir.path(), &format!("screen_recording_01012{}_000000.avi", i), *age);
        }

        let report = enforce_retention(dir.path(), 2);

        assert_eq!(report.deleted.len(), 3);
        assert!(report.failures.is_empty());
        assert_eq!(report.remaining, 2);
        assert_eq!(
            names(dir.path()),
            vec![
                "screen_recording_010123_000000.avi",
                "screen_recording_010124_000000.avi",
            ]
        );
    }

    #[test]
    fn test_retention_within_cap_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "screen_recording_010125_000000.avi", 20);
        touch(dir.path(), "screen_recording_010125_000001.avi", 10);

        let report = enforce_retention(dir.path(), 2);
        assert!(report.deleted.is_empty());
        assert_eq!(report.remaining, 2);

        let again = enforce_retention(dir.path(), 5);
        assert!(again.deleted.is_empty());
        assert_eq!(names(dir.path()).len(), 2);
    }

    #[test]
    fn test_retention_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "notes.txt", 100);
        touch(dir.path(), "holiday.avi", 100);
        touch(dir.path(), "screen_recording_010125_000000.avi", 30);
        touch(dir.path(), "screen_recording_010125_000001.avi", 20);
        touch(dir.path(), "screen_recording_010125_000002.avi", 10);

        let report = enforce_retention(dir.path(), 1);

        assert_eq!(report.deleted.len(), 2);
        assert_eq!(
            names(dir.path()),
            vec![
                "holiday.avi",
                "notes.txt",
                "screen_recording_010125_000002.avi",
            ]
        );
    }

    #[test]
    fn test_retention_ties_broken_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let at = SystemTime::now() - Duration::from_secs(60);
        for name in [
            "screen_recording_010125_000002.avi",
            "screen_recording_010125_000000.avi",
            "screen_recording_010125_000001.avi",
        ] {
            let file = File::create(dir.path().join(name)).unwrap();
            file.set_modified(at).unwrap();
        }

        let report = enforce_retention(dir.path(), 1);

        assert_eq!(report.deleted.len(), 2);
        assert_eq!(names(dir.path()), vec!["screen_recording_010125_000002.avi"]);
    }

    #[test]
    fn test_failed_delete_is_reported_and_not_substituted() {
        let dir = tempfile::tempdir().unwrap();
        let oldest = touch(dir.path(), "screen_recording_010125_000000.avi", 40);
        touch(dir.path(), "screen_recording_010125_000001.avi", 30);
        touch(dir.path(), "screen_recording_010125_000002.avi", 20);
        touch(dir.path(), "screen_recording_010125_000003.avi", 10);

        let report = enforce_retention_with(dir.path(), 2, |path| {
            if path == oldest {
                Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked"))
            } else {
                std::fs::remove_file(path)
            }
        });

        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            &report.failures[0],
            RetentionError::Delete { path, .. } if *path == oldest
        ));
        assert_eq!(report.deleted.len(), 1);
        assert_eq!(report.remaining, 3);
        assert_eq!(
            names(dir.path()),
            vec![
                "screen_recording_010125_000000.avi",
                "screen_recording_010125_000002.avi",
                "screen_recording_010125_000003.avi",
            ]
        );
    }

    #[test]
    fn test_already_removed_counts_as_deleted() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "screen_recording_010125_000000.avi", 20);
        touch(dir.path(), "screen_recording_010125_000001.avi", 10);

        let report = enforce_retention_with(dir.path(), 1, |_| {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))
        });

        assert!(report.failures.is_empty());
        assert!(report.deleted.is_empty());
        assert_eq!(report.remaining, 1);
    }

    #[test]
    fn test_name_filter_follows_naming_constants() {
        let at = Local.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let name = segment_file_name(&at);

        assert!(name.starts_with(FILE_PREFIX));
        assert!(name.ends_with(&format!(".{}", RECORDING_EXTENSION)));
        assert!(is_recording_file_name(&name));

        let other_ext = name.replace(&format!(".{}", RECORDING_EXTENSION), ".bin");
        assert!(!is_recording_file_name(&other_ext));
    }

    #[test]
    fn test_retention_on_missing_folder_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let report = enforce_retention(&dir.path().join("gone"), 3);

        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0], RetentionError::List { .. }));
    }

    #[test]
    fn test_recording_files_sorted_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "screen_recording_010125_000009.avi", 5);
        touch(dir.path(), "screen_recording_010125_000001.avi", 50);

        let files = recording_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].file_name, "screen_recording_010125_000001.avi");
    }
}
