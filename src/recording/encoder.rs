/**
 * ============================================================================
 * RECORDING ENCODER MODULE
 * ============================================================================
 *
 * PURPOSE: Turn a stream of raw BGR24 frames into one playable AVI file
 *
 * FUNCTIONALITY:
 * - Resolve and check the FFmpeg binary (configured path or PATH lookup)
 * - Spawn one FFmpeg process per segment reading rawvideo on stdin
 * - Finalize on finish() or on drop: close stdin (EOF) and wait for exit,
 *   so the container trailer is always written
 * - Collect FFmpeg's stderr so a failed encode reports why
 *
 * OUTPUT FORMAT:
 * - AVI container, MPEG-4 Part 2 video tagged XVID, fixed frame rate
 *
 * ============================================================================
 */

use crate::recording::error::CaptureError;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

// Extension of every segment file
pub const RECORDING_EXTENSION: &str = "avi";

// Opens one output stream per segment
pub trait EncoderFactory: Send + Sync {
    // Verify the encoder can be started at all
    fn check(&self) -> Result<(), CaptureError>;

    fn open(
        &self,
        output_path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn FrameSink>, CaptureError>;
}

// An open output stream. Dropping it without finish() still finalizes the file.
pub trait FrameSink {
    // Append one packed BGR24 frame
    fn append(&mut self, bgr: &[u8]) -> Result<(), CaptureError>;

    // Close the stream and wait until the file is complete
    fn finish(self: Box<Self>) -> Result<(), CaptureError>;
}

// =============================================================================
// FFmpeg Encoder
// =============================================================================

#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: PathBuf,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new(None)
    }
}

impl FfmpegEncoder {
    // Use the given binary, or `ffmpeg` from PATH
    pub fn new(program: Option<PathBuf>) -> Self {
        let program = program.unwrap_or_else(|| PathBuf::from(default_binary_name()));
        Self { program }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

fn default_binary_name() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        "ffmpeg.exe"
    }
    #[cfg(not(target_os = "windows"))]
    {
        "ffmpeg"
    }
}

// Arguments for a rawvideo BGR24 stdin -> XVID AVI encode
fn ffmpeg_args(width: u32, height: u32, fps: u32, output_path: &Path) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "bgr24".into(),
        "-s".into(),
        format!("{}x{}", width, height),
        "-r".into(),
        fps.to_string(),
        "-i".into(),
        "pipe:0".into(),
        "-c:v".into(),
        "mpeg4".into(),
        "-vtag".into(),
        "xvid".into(),
        "-q:v".into(),
        "5".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        output_path.to_string_lossy().into_owned(),
    ]
}

impl EncoderFactory for FfmpegEncoder {
    fn check(&self) -> Result<(), CaptureError> {
        let status = Command::new(&self.program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| CaptureError::EncoderUnavailable {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(CaptureError::EncoderFinalize(format!(
                "{:?} -version exited with {:?}",
                self.program,
                status.code()
            )));
        }

        log::info!("FFmpeg check passed: {:?}", self.program);
        Ok(())
    }

    fn open(
        &self,
        output_path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn FrameSink>, CaptureError> {
        let parent_ok = output_path.parent().map(Path::is_dir).unwrap_or(false);
        if !parent_ok {
            return Err(CaptureError::Output {
                path: output_path.to_path_buf(),
                reason: "destination folder does not exist".to_string(),
            });
        }

        log::info!(
            "Spawning FFmpeg: {}x{} @ {} fps -> {:?}",
            width, height, fps, output_path
        );

        let mut child = Command::new(&self.program)
            .args(ffmpeg_args(width, height, fps, output_path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CaptureError::EncoderUnavailable {
                program: self.program.clone(),
                source,
            })?;

        let stdin = match child.stdin.take() {
            Some(stdin) => stdin,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CaptureError::EncoderFinalize(
                    "FFmpeg stdin unavailable".to_string(),
                ));
            }
        };

        // Drained on its own thread so a chatty FFmpeg never blocks on a full pipe
        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        Ok(Box::new(FfmpegSink {
            child: Some(child),
            stdin: Some(stdin),
            stderr,
            frame_len: width as usize * height as usize * 3,
            output_path: output_path.to_path_buf(),
        }))
    }
}

struct FfmpegSink {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    frame_len: usize,
    output_path: PathBuf,
}

impl FfmpegSink {
    // Close stdin to signal EOF, then wait for FFmpeg to write the trailer
    fn finalize(&mut self) -> Result<(), CaptureError> {
        drop(self.stdin.take());

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = child
            .wait()
            .map_err(|e| CaptureError::EncoderFinalize(format!("failed to wait for FFmpeg: {}", e)))?;

        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            let detail = stderr.trim();
            return Err(CaptureError::EncoderFinalize(if detail.is_empty() {
                format!("FFmpeg exited with {:?} for {:?}", status.code(), self.output_path)
            } else {
                format!(
                    "FFmpeg exited with {:?} for {:?}: {}",
                    status.code(),
                    self.output_path,
                    detail
                )
            }));
        }
        Ok(())
    }
}

impl FrameSink for FfmpegSink {
    fn append(&mut self, bgr: &[u8]) -> Result<(), CaptureError> {
        if bgr.len() != self.frame_len {
            return Err(CaptureError::FrameBuffer {
                expected: self.frame_len,
                actual: bgr.len(),
            });
        }

        let stdin = self.stdin.as_mut().ok_or_else(|| {
            CaptureError::EncoderWrite(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "encoder input already closed",
            ))
        })?;
        stdin.write_all(bgr).map_err(CaptureError::EncoderWrite)
    }

    fn finish(mut self: Box<Self>) -> Result<(), CaptureError> {
        self.finalize()
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.child.is_some() {
            log::warn!("Encoder for {:?} dropped without finish, finalizing", self.output_path);
            if let Err(e) = self.finalize() {
                log::error!("{}", e);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
