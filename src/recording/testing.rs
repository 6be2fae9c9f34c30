// Test doubles for the capture and encoder seams.

use crate::recording::capture::{DisplaySource, Frame, FrameGrabber, PixelLayout};
use crate::recording::encoder::{EncoderFactory, FrameSink};
use crate::recording::error::CaptureError;
use crate::recording::types::DisplayTarget;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn target(id: u32, width: u32, height: u32) -> DisplayTarget {
    DisplayTarget {
        id,
        index: id as usize,
        name: format!("Fake {}", id),
        x: 0,
        y: 0,
        width,
        height,
        is_primary: id == 0,
    }
}

// =============================================================================
// Display Source
// =============================================================================

#[derive(Clone)]
pub struct FakeSource {
    targets: Arc<Mutex<Vec<DisplayTarget>>>,
    // Grabs succeed this many times, then fail
    fail_after: Option<u64>,
    // Each grab after the first takes this long
    grab_delay: Duration,
    pub grabs: Arc<AtomicU64>,
}

impl FakeSource {
    pub fn new(targets: Vec<DisplayTarget>) -> Self {
        Self {
            targets: Arc::new(Mutex::new(targets)),
            fail_after: None,
            grab_delay: Duration::ZERO,
            grabs: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn failing_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    pub fn with_grab_delay(mut self, delay: Duration) -> Self {
        self.grab_delay = delay;
        self
    }

    // Simulate unplugging every display
    pub fn disconnect_all(&self) {
        self.targets.lock().unwrap().clear();
    }
}

impl DisplaySource for FakeSource {
    fn list_targets(&self) -> Vec<DisplayTarget> {
        self.targets.lock().unwrap().clone()
    }

    fn open(&self, target: &DisplayTarget) -> Result<Box<dyn FrameGrabber>, CaptureError> {
        let present = self
            .targets
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.id == target.id);
        if !present {
            return Err(CaptureError::DisplayUnavailable { id: target.id });
        }

        Ok(Box::new(FakeGrabber {
            width: target.width,
            height: target.height,
            fail_after: self.fail_after,
            grab_delay: self.grab_delay,
            grabs: self.grabs.clone(),
        }))
    }
}

struct FakeGrabber {
    width: u32,
    height: u32,
    fail_after: Option<u64>,
    grab_delay: Duration,
    grabs: Arc<AtomicU64>,
}

impl FrameGrabber for FakeGrabber {
    fn grab(&mut self) -> Result<Frame, CaptureError> {
        let n = self.grabs.fetch_add(1, Ordering::SeqCst);
        if n > 0 && !self.grab_delay.is_zero() {
            std::thread::sleep(self.grab_delay);
        }
        if let Some(limit) = self.fail_after {
            if n >= limit {
                return Err(CaptureError::Grab("fake display went away".to_string()));
            }
        }

        Ok(Frame {
            width: self.width,
            height: self.height,
            layout: PixelLayout::Bgra,
            data: vec![(n % 256) as u8; self.width as usize * self.height as usize * 4],
        })
    }
}

// =============================================================================
// Encoder
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct SinkRecord {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub frames: u64,
    pub finalized: bool,
}

#[derive(Clone, Default)]
pub struct FakeEncoder {
    pub records: Arc<Mutex<Vec<SinkRecord>>>,
    active: Arc<AtomicUsize>,
    pub max_active: Arc<AtomicUsize>,
    // Frames appended after this flag is raised are counted here
    pub watch: Arc<AtomicBool>,
    pub frames_after_watch: Arc<AtomicU64>,
    // Every append fails and finishing reports an encoder exit error
    reject_frames: bool,
}

impl FakeEncoder {
    pub fn rejecting() -> Self {
        Self {
            reject_frames: true,
            ..Default::default()
        }
    }

    pub fn records(&self) -> Vec<SinkRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl EncoderFactory for FakeEncoder {
    fn check(&self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn open(
        &self,
        output_path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn FrameSink>, CaptureError> {
        let file = File::create(output_path).map_err(|e| CaptureError::Output {
            path: output_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let mut records = self.records.lock().unwrap();
        records.push(SinkRecord {
            path: output_path.to_path_buf(),
            width,
            height,
            fps,
            ..Default::default()
        });

        Ok(Box::new(FakeSink {
            slot: records.len() - 1,
            file: Some(file),
            frame_len: width as usize * height as usize * 3,
            encoder: self.clone(),
        }))
    }
}

struct FakeSink {
    slot: usize,
    file: Option<File>,
    frame_len: usize,
    encoder: FakeEncoder,
}

impl FakeSink {
    fn finalize(&mut self) {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
            self.encoder.records.lock().unwrap()[self.slot].finalized = true;
            self.encoder.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl FrameSink for FakeSink {
    fn append(&mut self, bgr: &[u8]) -> Result<(), CaptureError> {
        assert_eq!(bgr.len(), self.frame_len, "frame must be packed BGR24");
        if self.encoder.reject_frames {
            return Err(CaptureError::EncoderWrite(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "fake encoder closed its input",
            )));
        }
        let file = self.file.as_mut().expect("append after finish");
        file.write_all(&[0u8]).map_err(CaptureError::EncoderWrite)?;

        self.encoder.records.lock().unwrap()[self.slot].frames += 1;
        if self.encoder.watch.load(Ordering::SeqCst) {
            self.encoder.frames_after_watch.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<(), CaptureError> {
        self.finalize();
        if self.encoder.reject_frames {
            return Err(CaptureError::EncoderFinalize(
                "fake encoder could not open output".to_string(),
            ));
        }
        Ok(())
    }
}

impl Drop for FakeSink {
    fn drop(&mut self) {
        self.finalize();
    }
}
