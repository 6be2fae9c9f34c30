/**
 * ============================================================================
 * RECORDING CAPTURE MODULE
 * ============================================================================
 *
 * PURPOSE: Display enumeration and single-frame grabs
 *
 * FUNCTIONALITY:
 * - Enumerate displays with their bounding rectangle (re-queried every call)
 * - Open a frame grabber bound to one display
 * - Convert captured RGBA/BGRA frames to packed BGR24 for the encoder
 *
 * The DisplaySource / FrameGrabber traits are the seam between the segment
 * writer and the platform; XcapSource is the production implementation.
 *
 * ============================================================================
 */

use crate::recording::error::CaptureError;
use crate::recording::types::DisplayTarget;
use xcap::Monitor;

// =============================================================================
// Frames
// =============================================================================

// Byte order of a captured 4-byte pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Rgba,
    Bgra,
}

// One captured frame, tightly packed (stride == width * 4)
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub data: Vec<u8>,
}

impl Frame {
    // Convert to the encoder's packed BGR24 layout, dropping alpha
    pub fn to_bgr(&self) -> Result<Vec<u8>, CaptureError> {
        let pixels = self.width as usize * self.height as usize;
        let expected = pixels * 4;
        if self.data.len() != expected {
            return Err(CaptureError::FrameBuffer {
                expected,
                actual: self.data.len(),
            });
        }

        let mut bgr = Vec::with_capacity(pixels * 3);
        match self.layout {
            PixelLayout::Bgra => {
                for px in self.data.chunks_exact(4) {
                    bgr.extend_from_slice(&px[..3]);
                }
            }
            PixelLayout::Rgba => {
                for px in self.data.chunks_exact(4) {
                    bgr.extend_from_slice(&[px[2], px[1], px[0]]);
                }
            }
        }
        Ok(bgr)
    }
}

// =============================================================================
// Capture Seams
// =============================================================================

// Lists capture targets and opens grabbers for them
pub trait DisplaySource: Send + Sync {
    // Current displays, in enumeration order. Empty when none are detected.
    fn list_targets(&self) -> Vec<DisplayTarget>;

    // Bind a grabber to the display; fails if the display is gone
    fn open(&self, target: &DisplayTarget) -> Result<Box<dyn FrameGrabber>, CaptureError>;
}

// Produces frames of one display on demand
pub trait FrameGrabber {
    fn grab(&mut self) -> Result<Frame, CaptureError>;
}

// =============================================================================
// xcap Backend
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct XcapSource;

impl XcapSource {
    pub fn new() -> Self {
        Self
    }
}

impl DisplaySource for XcapSource {
    fn list_targets(&self) -> Vec<DisplayTarget> {
        let monitors = match Monitor::all() {
            Ok(monitors) => monitors,
            Err(e) => {
                log::error!("Failed to enumerate displays: {}", e);
                return Vec::new();
            }
        };

        let targets: Vec<DisplayTarget> = monitors
            .iter()
            .enumerate()
            .filter_map(|(index, monitor)| match describe_monitor(index, monitor) {
                Ok(target) => Some(target),
                Err(e) => {
                    log::warn!("Skipping display {}: {}", index, e);
                    None
                }
            })
            .collect();

        log::info!("Found {} display(s)", targets.len());
        for target in &targets {
            log::info!(
                "  Display {}: {} (primary: {})",
                target.index, target, target.is_primary
            );
        }

        targets
    }

    fn open(&self, target: &DisplayTarget) -> Result<Box<dyn FrameGrabber>, CaptureError> {
        let monitor = find_monitor(target.id)?;
        log::info!("Opened capture for display {} ({})", target.index, target);
        Ok(Box::new(XcapGrabber {
            id: target.id,
            monitor,
        }))
    }
}

fn describe_monitor(index: usize, monitor: &Monitor) -> Result<DisplayTarget, xcap::XCapError> {
    Ok(DisplayTarget {
        id: monitor.id()?,
        index,
        name: monitor
            .name()
            .unwrap_or_else(|_| format!("Display {}", index)),
        x: monitor.x()?,
        y: monitor.y()?,
        width: monitor.width()?,
        height: monitor.height()?,
        is_primary: monitor.is_primary().unwrap_or(index == 0),
    })
}

fn find_monitor(id: u32) -> Result<Monitor, CaptureError> {
    let monitors = Monitor::all().map_err(|e| CaptureError::Grab(e.to_string()))?;
    monitors
        .into_iter()
        .find(|m| m.id().map(|mid| mid == id).unwrap_or(false))
        .ok_or(CaptureError::DisplayUnavailable { id })
}

struct XcapGrabber {
    id: u32,
    monitor: Monitor,
}

impl FrameGrabber for XcapGrabber {
    fn grab(&mut self) -> Result<Frame, CaptureError> {
        let image = self.monitor.capture_image().map_err(|e| {
            // A failed grab on a vanished display is reported as such
            match find_monitor(self.id) {
                Err(CaptureError::DisplayUnavailable { id }) => {
                    CaptureError::DisplayUnavailable { id }
                }
                _ => CaptureError::Grab(e.to_string()),
            }
        })?;

        Ok(Frame {
            width: image.width(),
            height: image.height(),
            layout: PixelLayout::Rgba,
            data: image.into_raw(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
