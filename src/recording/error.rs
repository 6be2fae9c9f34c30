/**
 * ============================================================================
 * RECORDING ERROR MODULE
 * ============================================================================
 *
 * PURPOSE: Error taxonomy for the recorder
 *
 * - ConfigError: Rejected before any capture starts (engine stays Idle)
 * - CaptureError: Aborts the current segment (engine returns to Idle)
 * - RetentionError: Reported and logged, never fatal to a session
 * - RecordingError: Top-level error returned by engine operations
 *
 * ============================================================================
 */

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No displays available for capture")]
    NoDisplays,

    #[error("Display {index} not found ({available} display(s) available)")]
    InvalidDisplayIndex { index: usize, available: usize },

    #[error("Segment duration must be between {min} and {max} seconds, got {seconds}")]
    InvalidDuration { seconds: u64, min: u64, max: u64 },

    #[error("Maximum recordings must be at least 1")]
    InvalidRetention,

    #[error("Destination folder {0:?} does not exist")]
    FolderMissing(PathBuf),

    #[error("Destination folder {path:?} is not writable: {source}")]
    FolderNotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create folder {path:?}: {source}")]
    CreateFolder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No config directory available on this platform")]
    NoConfigDir,

    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Display {id} is no longer available")]
    DisplayUnavailable { id: u32 },

    #[error("Failed to grab frame: {0}")]
    Grab(String),

    #[error("Frame size changed: expected {expected_width}x{expected_height}, got {width}x{height}")]
    FrameSize {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },

    #[error("Frame buffer has {actual} bytes, expected {expected}")]
    FrameBuffer { expected: usize, actual: usize },

    #[error("Failed to start encoder {program:?}: {source}")]
    EncoderUnavailable {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write frame to encoder: {0}")]
    EncoderWrite(#[source] std::io::Error),

    #[error("Encoder failed to finalize: {0}")]
    EncoderFinalize(String),

    #[error("Output path {path:?} is not usable: {reason}")]
    Output { path: PathBuf, reason: String },

    #[error("Segment cancelled before capture started")]
    Cancelled,

    #[error("Capture worker panicked")]
    WorkerPanicked,
}

#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("Failed to list recordings in {path:?}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to delete recording {path:?}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Already recording")]
    AlreadyRecording,
}
