/**
 * ============================================================================
 * RECORDING TYPES MODULE
 * ============================================================================
 *
 * PURPOSE: Data structures for the segmented screen recorder
 *
 * TYPES:
 * - DisplayTarget: Snapshot of one display taken at enumeration time
 * - SegmentConfig: Validated, immutable parameters for a run of segments
 * - SegmentResult / SegmentStatus: Outcome of one segment writer run
 * - EngineEvent / IdleReason: Status callbacks produced by the engine
 * - EngineState / RecordingStatus: State snapshot for the session controller
 *
 * ============================================================================
 */

use crate::recording::capture::DisplaySource;
use crate::recording::error::ConfigError;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

// Fixed output frame rate for every segment
pub const FRAME_RATE: u32 = 20;

// Bounds for segment duration (seconds)
pub const MIN_SEGMENT_SECONDS: u64 = 1;
pub const MAX_SEGMENT_SECONDS: u64 = 3600;

// Default retention cap (number of segment files kept in the folder)
pub const DEFAULT_MAX_RECORDINGS: usize = 12;

// Information about a display available for capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayTarget {
    // Platform display identifier
    pub id: u32,

    // Position in the enumeration order (what the user selects)
    pub index: usize,

    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

impl std::fmt::Display for DisplayTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}x{} at {},{})",
            self.name, self.width, self.height, self.x, self.y
        )
    }
}

// Parameters shared by every segment of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentConfig {
    pub target: DisplayTarget,
    pub duration: Duration,
    pub folder: PathBuf,
}

impl SegmentConfig {
    // Build a config from user selections, validating against the current displays
    pub fn resolve(
        source: &dyn DisplaySource,
        display_index: usize,
        duration_seconds: u64,
        folder: &Path,
    ) -> Result<Self, ConfigError> {
        let target = select_target(source, display_index)?;
        Self::new(target, duration_seconds, folder)
    }

    pub fn new(
        target: DisplayTarget,
        duration_seconds: u64,
        folder: &Path,
    ) -> Result<Self, ConfigError> {
        validate_duration(duration_seconds)?;
        ensure_writable_folder(folder)?;

        Ok(Self {
            target,
            duration: Duration::from_secs(duration_seconds),
            folder: folder.to_path_buf(),
        })
    }

    pub fn duration_seconds(&self) -> u64 {
        self.duration.as_secs()
    }
}

// Pick a display by enumeration index from the current display list
pub fn select_target(
    source: &dyn DisplaySource,
    display_index: usize,
) -> Result<DisplayTarget, ConfigError> {
    let targets = source.list_targets();
    if targets.is_empty() {
        return Err(ConfigError::NoDisplays);
    }

    let available = targets.len();
    targets
        .into_iter()
        .nth(display_index)
        .ok_or(ConfigError::InvalidDisplayIndex {
            index: display_index,
            available,
        })
}

pub fn validate_duration(duration_seconds: u64) -> Result<(), ConfigError> {
    if !(MIN_SEGMENT_SECONDS..=MAX_SEGMENT_SECONDS).contains(&duration_seconds) {
        return Err(ConfigError::InvalidDuration {
            seconds: duration_seconds,
            min: MIN_SEGMENT_SECONDS,
            max: MAX_SEGMENT_SECONDS,
        });
    }
    Ok(())
}

// Destination must exist, be a directory, and accept new files
fn ensure_writable_folder(folder: &Path) -> Result<(), ConfigError> {
    if !folder.is_dir() {
        return Err(ConfigError::FolderMissing(folder.to_path_buf()));
    }

    let probe = folder.join(format!(".screenrecorder_probe_{}", std::process::id()));
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&probe)
        .map_err(|source| ConfigError::FolderNotWritable {
            path: folder.to_path_buf(),
            source,
        })?;

    if let Err(e) = std::fs::remove_file(&probe) {
        log::warn!("Failed to remove write probe {:?}: {}", probe, e);
    }

    Ok(())
}

// How a segment writer run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SegmentStatus {
    // Duration elapsed
    Elapsed,
    // Stop was requested
    Stopped,
    // Capture or encoding failed mid-segment; file finalized up to this point
    Aborted { reason: String },
}

impl SegmentStatus {
    pub fn is_aborted(&self) -> bool {
        matches!(self, SegmentStatus::Aborted { .. })
    }
}

// Outcome of one segment, reported exactly once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentResult {
    pub file_name: String,
    pub path: PathBuf,
    pub status: SegmentStatus,
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl SegmentResult {
    pub fn duration_seconds(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

// Why a session returned to Idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleReason {
    Stopped,
    Failed,
}

// Status callbacks produced by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    SessionStarted { target: DisplayTarget, duration_seconds: u64, folder: PathBuf },
    SegmentStarted { file_name: String },
    Tick { seconds_remaining: u64 },
    SegmentCompleted(SegmentResult),
    SegmentAborted { file_name: Option<String>, reason: String },
    RetentionPruned { path: PathBuf },
    RetentionFailed { path: PathBuf, reason: String },
    SessionIdle { reason: IdleReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Recording,
    Stopping,
}

// Recording status snapshot for the session controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingStatus {
    pub state: EngineState,
    pub current_segment: Option<String>,
    pub seconds_remaining: Option<u64>,
    pub segments_completed: u64,
}
