/**
 * ============================================================================
 * SEGMENT WRITER MODULE
 * ============================================================================
 *
 * PURPOSE: Record exactly one segment file for one display
 *
 * The writer runs on a blocking thread until either the segment duration has
 * elapsed or the stop flag is raised (checked before every frame). Frames are
 * paced to FRAME_RATE; when a grab overruns its slot the previous frame is
 * repeated so the file plays back at wall-clock speed.
 *
 * Setup failures (display gone, encoder cannot start, first frame rejected
 * by the encoder) fail fast without leaving a file behind. Failures inside
 * the loop abort the segment but the output stream is still finalized.
 *
 * ============================================================================
 */

use crate::recording::capture::{DisplaySource, FrameGrabber};
use crate::recording::encoder::{EncoderFactory, FrameSink};
use crate::recording::error::CaptureError;
use crate::recording::storage;
use crate::recording::types::{FRAME_RATE, SegmentConfig, SegmentResult, SegmentStatus};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub struct SegmentWriter {
    source: Arc<dyn DisplaySource>,
    encoder: Arc<dyn EncoderFactory>,
    config: SegmentConfig,
}

impl SegmentWriter {
    pub fn new(
        source: Arc<dyn DisplaySource>,
        encoder: Arc<dyn EncoderFactory>,
        config: SegmentConfig,
    ) -> Self {
        Self {
            source,
            encoder,
            config,
        }
    }

    // Start time and output path for the next segment
    pub fn next_output(&self) -> (DateTime<Local>, PathBuf) {
        let started_at = Local::now();
        let path = storage::segment_path(&self.config.folder, &started_at);
        (started_at, path)
    }

    // Record one segment; blocks until it has finished and been finalized
    pub fn run(&self, stop: &AtomicBool) -> Result<SegmentResult, CaptureError> {
        let (started_at, path) = self.next_output();
        self.record(started_at, path, stop)
    }

    // Record into `path`, which must not exist yet
    pub fn record(
        &self,
        started_at: DateTime<Local>,
        path: PathBuf,
        stop: &AtomicBool,
    ) -> Result<SegmentResult, CaptureError> {
        if stop.load(Ordering::SeqCst) {
            return Err(CaptureError::Cancelled);
        }

        let target = &self.config.target;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| storage::segment_file_name(&started_at));

        log::info!(
            "Starting segment {} for display {} ({}s)",
            file_name,
            target.index,
            self.config.duration_seconds()
        );

        // Resolve the display and grab the first frame before any file exists
        let mut grabber = self.source.open(target)?;
        let first = grabber.grab()?;
        let (width, height) = (first.width, first.height);
        if width == 0 || height == 0 {
            return Err(CaptureError::FrameSize {
                expected_width: target.width,
                expected_height: target.height,
                width,
                height,
            });
        }
        if (width, height) != (target.width, target.height) {
            log::info!(
                "Display {}: capturing at {}x{} pixels (reported {}x{})",
                target.index, width, height, target.width, target.height
            );
        }

        let first = first.to_bgr()?;
        let mut sink = self.encoder.open(&path, width, height, FRAME_RATE)?;

        // An encoder that cannot write its output only shows it on the first frame
        let start = Instant::now();
        if let Err(e) = sink.append(&first) {
            return Err(abandon_output(sink, &path, e));
        }

        let mut frame_count: u64 = 1;
        let status = match self.capture_loop(
            grabber.as_mut(),
            sink.as_mut(),
            first,
            (width, height),
            stop,
            start,
            &mut frame_count,
        ) {
            Ok(status) => status,
            Err(e) => {
                log::error!("Display {}: segment {} aborted: {}", target.index, file_name, e);
                SegmentStatus::Aborted {
                    reason: e.to_string(),
                }
            }
        };

        // Always finalize, whatever ended the loop
        let status = match sink.finish() {
            Ok(()) => status,
            Err(e) => {
                log::error!("Failed to finalize {}: {}", file_name, e);
                match status {
                    SegmentStatus::Aborted { reason } => SegmentStatus::Aborted {
                        reason: format!("{}; {}", reason, e),
                    },
                    _ => SegmentStatus::Aborted {
                        reason: e.to_string(),
                    },
                }
            }
        };

        let elapsed = start.elapsed().as_secs_f64();
        let actual_fps = if elapsed > 0.0 {
            frame_count as f64 / elapsed
        } else {
            0.0
        };
        log::info!(
            "Segment {} finished ({:?}): {} frames in {:.1}s ({:.1} fps)",
            file_name, status, frame_count, elapsed, actual_fps
        );

        Ok(SegmentResult {
            file_name,
            path,
            status,
            frame_count,
            width,
            height,
            started_at,
            finished_at: Local::now(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn capture_loop(
        &self,
        grabber: &mut dyn FrameGrabber,
        sink: &mut dyn FrameSink,
        first: Vec<u8>,
        (width, height): (u32, u32),
        stop: &AtomicBool,
        start: Instant,
        frame_count: &mut u64,
    ) -> Result<SegmentStatus, CaptureError> {
        let interval = Duration::from_secs(1) / FRAME_RATE;
        let fps = FRAME_RATE as f64;
        let mut previous = first;

        loop {
            let next_slot = start + interval * (*frame_count as u32);
            if let Some(wait) = next_slot.checked_duration_since(Instant::now()) {
                std::thread::sleep(wait);
            }

            if stop.load(Ordering::SeqCst) {
                return Ok(SegmentStatus::Stopped);
            }
            if start.elapsed() >= self.config.duration {
                return Ok(SegmentStatus::Elapsed);
            }

            let frame = grabber.grab()?;
            if (frame.width, frame.height) != (width, height) {
                return Err(CaptureError::FrameSize {
                    expected_width: width,
                    expected_height: height,
                    width: frame.width,
                    height: frame.height,
                });
            }
            let bgr = frame.to_bgr()?;

            // Fill slots missed while grabbing with the previous frame
            let due_slot = (start.elapsed().as_secs_f64() * fps) as u64;
            while *frame_count < due_slot {
                sink.append(&previous)?;
                *frame_count += 1;
            }

            sink.append(&bgr)?;
            *frame_count += 1;
            previous = bgr;

            if *frame_count % (FRAME_RATE as u64 * 10) == 0 {
                log::info!(
                    "Display {}: captured {} frames ({:.1}s)",
                    self.config.target.index,
                    frame_count,
                    start.elapsed().as_secs_f32()
                );
            }
        }
    }
}

// Close an output that never took a frame and remove whatever it left behind
fn abandon_output(sink: Box<dyn FrameSink>, path: &Path, cause: CaptureError) -> CaptureError {
    let reason = match sink.finish() {
        Ok(()) => cause.to_string(),
        Err(e) => format!("{}; {}", cause, e),
    };

    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove unusable output {:?}: {}", path, e),
    }

    log::error!("Output {:?} could not be written: {}", path, reason);
    CaptureError::Output {
        path: path.to_path_buf(),
        reason,
    }
}
