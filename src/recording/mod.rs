/**
 * ============================================================================
 * RECORDING MODULE
 * ============================================================================
 *
 * PURPOSE: Continuous single-display screen recording into fixed-length segments
 *
 * SUBMODULES:
 * - capture: Display enumeration and per-frame grabs via xcap
 * - encoder: FFmpeg child process that turns raw BGR frames into an AVI file
 * - writer: One capture-and-encode loop for a single time-bounded segment
 * - manager: Recording engine (state machine, stop protocol, segment chaining)
 * - storage: Segment naming, unique folder creation, retention by file count
 * - config: Configuration persistence and validation
 * - error: Error taxonomy (configuration / capture / retention)
 * - types: Data structures and models
 *
 * ARCHITECTURE:
 * 1. start() validates the config and spawns one session task
 * 2. The session task runs one segment writer at a time on a blocking thread
 * 3. Writer grabs frames at 20 fps and pipes them to FFmpeg until the segment
 *    duration elapses or stop is requested
 * 4. On completion: retention pass, then chain into a new segment unless stopped
 * 5. request_stop() sets the stop flag and waits for the writer to finalize
 *
 * OUTPUT FORMAT:
 * - screen_recording_DDMMYY_HHMMSS.avi: MPEG-4 (XVID) at 20 fps, display resolution
 *
 * ============================================================================
 */

pub mod capture;
pub mod config;
pub mod encoder;
pub mod error;
pub mod manager;
pub mod storage;
pub mod types;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;
