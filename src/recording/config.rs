/**
 * ============================================================================
 * RECORDING CONFIG MODULE
 * ============================================================================
 *
 * PURPOSE: Configuration persistence for the screen recorder
 *
 * FUNCTIONALITY:
 * - Load/save recording configuration to disk
 * - Default configuration when none exists
 * - JSON-based storage in the platform config directory
 * - Bounds validation before a session can start
 *
 * ============================================================================
 */

use crate::recording::error::ConfigError;
use crate::recording::storage::DEFAULT_FOLDER_NAME;
use crate::recording::types::{DEFAULT_MAX_RECORDINGS, validate_duration};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// Persisted recorder settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecordingConfig {
    // Display to record (0-based enumeration index)
    pub display_index: usize,

    // Duration of each recording segment (seconds)
    pub segment_duration_seconds: u64,

    // Maximum number of segment files kept in the recordings folder
    pub max_recordings: usize,

    // Directory in which the recordings folder is created
    // Default: the platform video directory
    pub output_parent: Option<PathBuf>,

    // Name of the recordings folder (a numbered sibling is used if it exists)
    pub folder_name: String,

    // FFmpeg binary; `ffmpeg` from PATH when unset
    pub ffmpeg_path: Option<PathBuf>,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            display_index: 0,
            segment_duration_seconds: 300, // 5 minutes
            max_recordings: DEFAULT_MAX_RECORDINGS,
            output_parent: None,
            folder_name: DEFAULT_FOLDER_NAME.to_string(),
            ffmpeg_path: None,
        }
    }
}

impl RecordingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_duration(self.segment_duration_seconds)?;
        if self.max_recordings == 0 {
            return Err(ConfigError::InvalidRetention);
        }
        Ok(())
    }
}

// Default config file path
pub fn config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("screenrecorder").join("recording_config.json"))
        .ok_or(ConfigError::NoConfigDir)
}

// Load configuration from disk
pub fn load_config(path: &Path) -> Result<RecordingConfig, ConfigError> {
    if !path.exists() {
        log::info!("No recording config found, using defaults");
        return Ok(RecordingConfig::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let config: RecordingConfig = serde_json::from_str(&contents)?;

    log::info!("Loaded recording config from {:?}", path);
    Ok(config)
}

// Save configuration to disk
pub fn save_config(path: &Path, config: &RecordingConfig) -> Result<(), ConfigError> {
    // Ensure directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let contents = serde_json::to_string_pretty(config)?;

    std::fs::write(path, contents).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    log::info!("Saved recording config to {:?}", path);
    Ok(())
}
