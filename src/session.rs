/**
 * ============================================================================
 * SESSION CONTROLLER MODULE
 * ============================================================================
 *
 * PURPOSE: Command-line front end for the recording engine
 *
 * RESPONSIBILITIES:
 * - Parse CLI flags and merge them over the persisted config
 * - Create the unique recordings folder once per process
 * - Start a session, render engine events as status lines
 * - Stop (and wait for the current file to finalize) on Ctrl-C
 *
 * ============================================================================
 */

use crate::recording::capture::{DisplaySource, XcapSource};
use crate::recording::config::{self, RecordingConfig};
use crate::recording::encoder::{EncoderFactory, FfmpegEncoder};
use crate::recording::error::{ConfigError, RecordingError};
use crate::recording::manager::RecordingEngine;
use crate::recording::storage;
use crate::recording::types::{
    select_target, EngineEvent, IdleReason, SegmentConfig, MAX_SEGMENT_SECONDS, MIN_SEGMENT_SECONDS,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

// Status strings
pub const STATUS_READY: &str = "Status: Ready";
pub const STATUS_RECORDING: &str = "Status: Recording";
pub const STATUS_STOPPED: &str = "Status: Recording Stopped";
pub const STATUS_FAILED: &str = "Status: Recording Failed";
pub const STATUS_NO_DISPLAYS: &str = "No displays available";

#[derive(Debug, Parser)]
#[command(
    name = "screenrecorder",
    version,
    about = "Record a display into fixed-length segments, keeping only the newest ones"
)]
pub struct Args {
    /// List available displays and exit
    #[arg(long)]
    pub list_displays: bool,

    /// Display to record (0-based index from --list-displays)
    #[arg(short, long)]
    pub display: Option<usize>,

    /// Length of each segment in seconds
    #[arg(short = 't', long, value_parser = clap::value_parser!(u64).range(MIN_SEGMENT_SECONDS..=MAX_SEGMENT_SECONDS))]
    pub duration: Option<u64>,

    /// Number of segment files to keep
    #[arg(short, long)]
    pub max_recordings: Option<usize>,

    /// Directory in which the recordings folder is created
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Name of the recordings folder
    #[arg(long)]
    pub folder_name: Option<String>,

    /// Path to the ffmpeg binary
    #[arg(long)]
    pub ffmpeg: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Persist the effective settings to the config file
    #[arg(long)]
    pub save: bool,
}

impl Args {
    // Overlay flags on top of the persisted config
    pub fn apply(&self, config: &mut RecordingConfig) {
        if let Some(display) = self.display {
            config.display_index = display;
        }
        if let Some(duration) = self.duration {
            config.segment_duration_seconds = duration;
        }
        if let Some(max) = self.max_recordings {
            config.max_recordings = max;
        }
        if let Some(output) = &self.output {
            config.output_parent = Some(output.clone());
        }
        if let Some(name) = &self.folder_name {
            config.folder_name = name.clone();
        }
        if let Some(ffmpeg) = &self.ffmpeg {
            config.ffmpeg_path = Some(ffmpeg.clone());
        }
    }
}

// Human-readable status line for an engine event
pub fn describe(event: &EngineEvent) -> Option<String> {
    match event {
        EngineEvent::SessionStarted {
            target,
            duration_seconds,
            folder,
        } => Some(format!(
            "{} ({} seconds) - display {} into {}",
            STATUS_RECORDING,
            duration_seconds,
            target,
            folder.display()
        )),
        EngineEvent::SegmentStarted { .. } => None,
        EngineEvent::Tick { seconds_remaining } => Some(format!(
            "{} ({} seconds left)",
            STATUS_RECORDING, seconds_remaining
        )),
        EngineEvent::SegmentCompleted(result) => {
            Some(format!("Recording completed: {}", result.file_name))
        }
        EngineEvent::SegmentAborted { file_name, reason } => Some(match file_name {
            Some(name) => format!("Segment aborted: {} ({})", name, reason),
            None => format!("Segment aborted: {}", reason),
        }),
        EngineEvent::RetentionPruned { path } => {
            Some(format!("Old recording deleted: {}", path.display()))
        }
        EngineEvent::RetentionFailed { path, reason } => Some(format!(
            "Could not delete old recording {}: {}",
            path.display(),
            reason
        )),
        EngineEvent::SessionIdle { reason } => Some(
            match reason {
                IdleReason::Stopped => STATUS_STOPPED,
                IdleReason::Failed => STATUS_FAILED,
            }
            .to_string(),
        ),
    }
}

fn print_displays(source: &dyn DisplaySource) {
    let targets = source.list_targets();
    if targets.is_empty() {
        println!("{}", STATUS_NO_DISPLAYS);
        return;
    }
    for target in targets {
        let primary = if target.is_primary { " [primary]" } else { "" };
        println!("{}: {}{}", target.index, target, primary);
    }
}

// Resolve the display, then create the recordings folder as the last step,
// so a rejected selection leaves nothing on disk
pub fn prepare_segment(
    source: &dyn DisplaySource,
    settings: &RecordingConfig,
) -> Result<SegmentConfig, ConfigError> {
    settings.validate()?;
    let target = select_target(source, settings.display_index)?;

    let parent = settings
        .output_parent
        .clone()
        .unwrap_or_else(storage::default_output_parent);
    let folder = storage::create_unique_folder(&parent, &settings.folder_name)?;

    SegmentConfig::new(target, settings.segment_duration_seconds, &folder)
}

// Run one recording session until Ctrl-C or a capture failure
pub async fn run(args: Args) -> Result<IdleReason, RecordingError> {
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => config::config_path()?,
    };
    let mut settings = config::load_config(&config_path)?;
    args.apply(&mut settings);
    settings.validate()?;
    if args.save {
        config::save_config(&config_path, &settings)?;
    }

    let source = Arc::new(XcapSource::new());
    if args.list_displays {
        print_displays(source.as_ref());
        return Ok(IdleReason::Stopped);
    }

    if source.list_targets().is_empty() {
        println!("{}", STATUS_NO_DISPLAYS);
        return Err(ConfigError::NoDisplays.into());
    }

    let encoder = Arc::new(FfmpegEncoder::new(settings.ffmpeg_path.clone()));
    encoder.check()?;

    let segment = prepare_segment(source.as_ref(), &settings)?;
    let folder = segment.folder.clone();

    let (engine, mut events) = RecordingEngine::new(source, encoder, settings.max_recordings)?;

    println!("{}", STATUS_READY);
    log::info!(
        "Keeping at most {} recording(s) in {:?}",
        engine.max_recordings(),
        folder
    );
    engine.start(segment)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut reason = IdleReason::Stopped;
    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                if let Err(e) = signal {
                    log::error!("Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }
            event = events.recv() => match event {
                Some(event) => {
                    if let Some(line) = describe(&event) {
                        println!("{}", line);
                    }
                    if let EngineEvent::SessionIdle { reason: IdleReason::Failed } = event {
                        reason = IdleReason::Failed;
                        break;
                    }
                }
                None => break,
            },
        }
    }

    // Waits for the current file to be finalized
    if let Some(summary) = engine.request_stop().await {
        while let Ok(event) = events.try_recv() {
            if let Some(line) = describe(&event) {
                println!("{}", line);
            }
        }
        println!(
            "{} segment(s) recorded this session in {}",
            summary.segments_completed,
            folder.display()
        );
        reason = summary.reason;
    }

    Ok(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::testing::{FakeSource, target};
    use crate::recording::types::{SegmentResult, SegmentStatus};
    use chrono::Local;

    #[test]
    fn test_args_override_config() {
        let args = Args::try_parse_from([
            "screenrecorder",
            "--display",
            "1",
            "--duration",
            "30",
            "--max-recordings",
            "3",
            "--folder-name",
            "Recordings",
        ])
        .unwrap();
        let mut config = RecordingConfig::default();
        args.apply(&mut config);

        assert_eq!(config.display_index, 1);
        assert_eq!(config.segment_duration_seconds, 30);
        assert_eq!(config.max_recordings, 3);
        assert_eq!(config.folder_name, "Recordings");
        assert!(config.ffmpeg_path.is_none());
    }

    #[test]
    fn test_duration_bounds_enforced_by_parser() {
        assert!(Args::try_parse_from(["screenrecorder", "--duration", "0"]).is_err());
        assert!(Args::try_parse_from(["screenrecorder", "--duration", "3601"]).is_err());
        assert!(Args::try_parse_from(["screenrecorder", "--duration", "3600"]).is_ok());
    }

    #[test]
    fn test_invalid_display_creates_no_folder() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new(vec![target(0, 8, 6)]);
        let settings = RecordingConfig {
            display_index: 9,
            output_parent: Some(dir.path().to_path_buf()),
            ..Default::default()
        };

        let err = prepare_segment(&source, &settings).unwrap_err();

        assert!(matches!(
            err,
            ConfigError::InvalidDisplayIndex { index: 9, available: 1 }
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_invalid_retention_creates_no_folder() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new(vec![target(0, 8, 6)]);
        let settings = RecordingConfig {
            max_recordings: 0,
            output_parent: Some(dir.path().to_path_buf()),
            ..Default::default()
        };

        assert!(prepare_segment(&source, &settings).is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_prepare_segment_creates_unique_folder() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new(vec![target(0, 8, 6), target(1, 4, 4)]);
        let settings = RecordingConfig {
            display_index: 1,
            segment_duration_seconds: 30,
            output_parent: Some(dir.path().to_path_buf()),
            ..Default::default()
        };

        let first = prepare_segment(&source, &settings).unwrap();
        let second = prepare_segment(&source, &settings).unwrap();

        assert_eq!(first.target.id, 1);
        assert_eq!(first.duration_seconds(), 30);
        assert_eq!(first.folder, dir.path().join("Screen Recordings"));
        assert_eq!(second.folder, dir.path().join("Screen Recordings 1"));
    }

    #[test]
    fn test_describe_distinguishes_outcomes() {
        let now = Local::now();
        let completed = EngineEvent::SegmentCompleted(SegmentResult {
            file_name: "screen_recording_010125_000000.avi".to_string(),
            path: PathBuf::from("screen_recording_010125_000000.avi"),
            status: SegmentStatus::Elapsed,
            frame_count: 100,
            width: 8,
            height: 6,
            started_at: now,
            finished_at: now,
        });
        let aborted = EngineEvent::SegmentAborted {
            file_name: None,
            reason: "Display 0 is no longer available".to_string(),
        };

        assert_eq!(
            describe(&completed).unwrap(),
            "Recording completed: screen_recording_010125_000000.avi"
        );
        assert_eq!(
            describe(&aborted).unwrap(),
            "Segment aborted: Display 0 is no longer available"
        );
        assert_eq!(
            describe(&EngineEvent::Tick { seconds_remaining: 42 }).unwrap(),
            "Status: Recording (42 seconds left)"
        );
        assert_eq!(
            describe(&EngineEvent::SessionIdle { reason: IdleReason::Stopped }).unwrap(),
            STATUS_STOPPED
        );
        assert!(describe(&EngineEvent::SegmentStarted { file_name: "x".into() }).is_none());
    }

    #[test]
    fn test_describe_session_started() {
        let line = describe(&EngineEvent::SessionStarted {
            target: target(0, 1920, 1080),
            duration_seconds: 5,
            folder: PathBuf::from("/tmp/Screen Recordings"),
        })
        .unwrap();

        assert!(line.starts_with("Status: Recording (5 seconds)"));
        assert!(line.contains("1920x1080"));
    }
}
