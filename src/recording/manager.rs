/**
 * ============================================================================
 * RECORDING MANAGER MODULE
 * ============================================================================
 *
 * PURPOSE: Recording engine - segment lifecycle, stop protocol, chaining
 *
 * STATE MACHINE:
 *   Idle --start()--> Recording --request_stop()--> Stopping --> Idle
 *   Recording --capture failure--> Idle
 *
 * RECORDING FLOW:
 * 1. start() spawns one session task and returns immediately
 * 2. The session task runs a SegmentWriter on a blocking thread
 * 3. When the writer reports, the retention cap is enforced
 * 4. Unless stop was requested (or the segment aborted), the next segment
 *    starts immediately with the same config
 * 5. request_stop() raises the stop flag and awaits the session task, so the
 *    current file is finalized before it returns
 *
 * Status callbacks are delivered as EngineEvents on an mpsc channel.
 *
 * ============================================================================
 */

use crate::recording::capture::DisplaySource;
use crate::recording::encoder::EncoderFactory;
use crate::recording::error::{CaptureError, ConfigError, RecordingError, RetentionError};
use crate::recording::storage;
use crate::recording::types::*;
use crate::recording::writer::SegmentWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

// Interval between countdown ticks
const TICK_INTERVAL: Duration = Duration::from_secs(1);

// Deletes one recording file during a retention pass
pub type Remover = Arc<dyn Fn(&Path) -> std::io::Result<()> + Send + Sync>;

// What a finished session reports back to request_stop()
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub segments_completed: u64,
    pub last_segment: Option<SegmentResult>,
    pub reason: IdleReason,
}

// Engine state holder
enum StateHolder {
    Idle,
    Recording {
        generation: u64,
        stop: Arc<AtomicBool>,
        task: JoinHandle<SessionSummary>,
    },
    Stopping {
        generation: u64,
    },
}

impl std::fmt::Debug for StateHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateHolder::Idle => write!(f, "Idle"),
            StateHolder::Recording { generation, .. } => write!(f, "Recording(gen {})", generation),
            StateHolder::Stopping { generation } => write!(f, "Stopping(gen {})", generation),
        }
    }
}

#[derive(Debug, Default)]
struct SessionProgress {
    current_segment: Option<String>,
    segment_started: Option<Instant>,
    duration: Duration,
    segments_completed: u64,
}

struct EngineInner {
    source: Arc<dyn DisplaySource>,
    encoder: Arc<dyn EncoderFactory>,
    max_recordings: usize,
    remover: Remover,
    events: mpsc::UnboundedSender<EngineEvent>,
    state: Mutex<StateHolder>,
    progress: Mutex<SessionProgress>,
    // Incremented on each start so a finished session only resets its own state
    generation: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EngineInner {
    fn emit(&self, event: EngineEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    fn begin_segment(&self, file_name: &str, duration: Duration) {
        let mut progress = lock(&self.progress);
        progress.current_segment = Some(file_name.to_string());
        progress.segment_started = Some(Instant::now());
        progress.duration = duration;
    }

    fn end_segment(&self, completed: bool) {
        let mut progress = lock(&self.progress);
        progress.current_segment = None;
        progress.segment_started = None;
        if completed {
            progress.segments_completed += 1;
        }
    }

    async fn enforce_retention(&self, folder: PathBuf) {
        let max = self.max_recordings;
        let remover = self.remover.clone();
        let pass = move || storage::enforce_retention_with(&folder, max, |path| remover(path));
        let report = match tokio::task::spawn_blocking(pass).await {
            Ok(report) => report,
            Err(e) => {
                log::error!("Retention pass panicked: {}", e);
                return;
            }
        };

        for path in report.deleted {
            self.emit(EngineEvent::RetentionPruned { path });
        }
        for failure in report.failures {
            let path = match &failure {
                RetentionError::List { path, .. } | RetentionError::Delete { path, .. } => path.clone(),
            };
            self.emit(EngineEvent::RetentionFailed {
                path,
                reason: failure.to_string(),
            });
        }
    }
}

pub struct RecordingEngine {
    inner: Arc<EngineInner>,
}

impl RecordingEngine {
    // Create an engine; status callbacks arrive on the returned receiver
    pub fn new(
        source: Arc<dyn DisplaySource>,
        encoder: Arc<dyn EncoderFactory>,
        max_recordings: usize,
    ) -> Result<(Self, mpsc::UnboundedReceiver<EngineEvent>), ConfigError> {
        let remover: Remover = Arc::new(|path: &Path| std::fs::remove_file(path));
        Self::with_remover(source, encoder, max_recordings, remover)
    }

    // Create an engine whose retention passes delete files through `remover`
    pub fn with_remover(
        source: Arc<dyn DisplaySource>,
        encoder: Arc<dyn EncoderFactory>,
        max_recordings: usize,
        remover: Remover,
    ) -> Result<(Self, mpsc::UnboundedReceiver<EngineEvent>), ConfigError> {
        if max_recordings == 0 {
            return Err(ConfigError::InvalidRetention);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Self {
            inner: Arc::new(EngineInner {
                source,
                encoder,
                max_recordings,
                remover,
                events: tx,
                state: Mutex::new(StateHolder::Idle),
                progress: Mutex::new(SessionProgress::default()),
                generation: AtomicU64::new(0),
            }),
        };
        Ok((engine, rx))
    }

    pub fn list_targets(&self) -> Vec<DisplayTarget> {
        self.inner.source.list_targets()
    }

    pub fn display_source(&self) -> &dyn DisplaySource {
        self.inner.source.as_ref()
    }

    pub fn max_recordings(&self) -> usize {
        self.inner.max_recordings
    }

    // Start a session. Must be called from within a tokio runtime.
    pub fn start(&self, config: SegmentConfig) -> Result<(), RecordingError> {
        let mut state = lock(&self.inner.state);
        if !matches!(*state, StateHolder::Idle) {
            log::warn!("Start ignored, engine is {:?}", *state);
            return Err(RecordingError::AlreadyRecording);
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let stop = Arc::new(AtomicBool::new(false));

        log::info!(
            "Starting recording session (generation {}): display {}, {}s segments, folder {:?}",
            generation,
            config.target,
            config.duration_seconds(),
            config.folder
        );

        *lock(&self.inner.progress) = SessionProgress::default();
        self.inner.emit(EngineEvent::SessionStarted {
            target: config.target.clone(),
            duration_seconds: config.duration_seconds(),
            folder: config.folder.clone(),
        });

        let task = tokio::spawn(session_loop(
            self.inner.clone(),
            config,
            stop.clone(),
            generation,
        ));

        *state = StateHolder::Recording {
            generation,
            stop,
            task,
        };
        Ok(())
    }

    // Stop the session and wait until the current segment is finalized.
    // No-op (returns None) when not recording.
    pub async fn request_stop(&self) -> Option<SessionSummary> {
        let (generation, task) = {
            let mut state = lock(&self.inner.state);
            match std::mem::replace(&mut *state, StateHolder::Idle) {
                StateHolder::Recording {
                    generation,
                    stop,
                    task,
                } => {
                    stop.store(true, Ordering::SeqCst);
                    *state = StateHolder::Stopping { generation };
                    (generation, task)
                }
                other => {
                    *state = other;
                    return None;
                }
            }
        };

        log::info!("Stopping recording session (generation {})", generation);

        let summary = match task.await {
            Ok(summary) => Some(summary),
            Err(e) => {
                log::error!("Recording session task failed: {}", e);
                None
            }
        };

        {
            let mut state = lock(&self.inner.state);
            if matches!(*state, StateHolder::Stopping { generation: g } if g == generation) {
                *state = StateHolder::Idle;
            }
        }

        // A capture failure that raced the stop is still reported as a failure
        let reason = summary
            .as_ref()
            .map(|s| s.reason)
            .unwrap_or(IdleReason::Stopped);
        self.inner.emit(EngineEvent::SessionIdle { reason });
        log::info!("Screen recording stopped ({:?})", reason);
        summary
    }

    pub fn state(&self) -> EngineState {
        match *lock(&self.inner.state) {
            StateHolder::Idle => EngineState::Idle,
            StateHolder::Recording { .. } => EngineState::Recording,
            StateHolder::Stopping { .. } => EngineState::Stopping,
        }
    }

    pub fn status(&self) -> RecordingStatus {
        let state = self.state();
        let progress = lock(&self.inner.progress);

        let seconds_remaining = match (state, progress.segment_started) {
            (EngineState::Recording, Some(started)) => Some(
                progress
                    .duration
                    .as_secs()
                    .saturating_sub(started.elapsed().as_secs()),
            ),
            _ => None,
        };

        RecordingStatus {
            state,
            current_segment: if state == EngineState::Idle {
                None
            } else {
                progress.current_segment.clone()
            },
            seconds_remaining,
            segments_completed: progress.segments_completed,
        }
    }
}

impl Drop for RecordingEngine {
    fn drop(&mut self) {
        // Let an orphaned session wind down and finalize its file
        if let StateHolder::Recording { stop, .. } = &*lock(&self.inner.state) {
            log::warn!("Recording engine dropped while recording, signalling stop");
            stop.store(true, Ordering::SeqCst);
        }
    }
}

// One recording session: run segments back to back until stopped or failed
async fn session_loop(
    inner: Arc<EngineInner>,
    config: SegmentConfig,
    stop: Arc<AtomicBool>,
    generation: u64,
) -> SessionSummary {
    let mut segments_completed: u64 = 0;
    let mut last_segment: Option<SegmentResult> = None;
    let duration_secs = config.duration_seconds();

    let reason = loop {
        let writer = SegmentWriter::new(inner.source.clone(), inner.encoder.clone(), config.clone());
        let (started_at, path) = writer.next_output();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| storage::segment_file_name(&started_at));

        inner.begin_segment(&file_name, config.duration);
        inner.emit(EngineEvent::SegmentStarted {
            file_name: file_name.clone(),
        });

        let stop_flag = stop.clone();
        let mut handle =
            tokio::task::spawn_blocking(move || writer.record(started_at, path, &stop_flag));

        // Countdown ticks while the writer runs
        let segment_start = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval_at(segment_start + TICK_INTERVAL, TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let joined = loop {
            tokio::select! {
                joined = &mut handle => break joined,
                _ = ticker.tick() => {
                    let elapsed = segment_start.elapsed().as_secs();
                    inner.emit(EngineEvent::Tick {
                        seconds_remaining: duration_secs.saturating_sub(elapsed),
                    });
                }
            }
        };

        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Segment writer for {} panicked: {}", file_name, e);
                Err(CaptureError::WorkerPanicked)
            }
        };

        match outcome {
            Ok(result) => {
                let aborted = result.status.is_aborted();
                inner.end_segment(!aborted);

                if let SegmentStatus::Aborted { reason } = &result.status {
                    inner.emit(EngineEvent::SegmentAborted {
                        file_name: Some(result.file_name.clone()),
                        reason: reason.clone(),
                    });
                } else {
                    segments_completed += 1;
                    log::info!("Screen recording completed: {}", result.file_name);
                    inner.emit(EngineEvent::SegmentCompleted(result.clone()));
                }
                last_segment = Some(result);

                inner.enforce_retention(config.folder.clone()).await;

                if aborted {
                    break IdleReason::Failed;
                }
            }
            Err(CaptureError::Cancelled) => {
                // Stop landed between the chain decision and the writer starting
                inner.end_segment(false);
                break IdleReason::Stopped;
            }
            Err(e) => {
                inner.end_segment(false);
                log::error!("Segment {} failed to start: {}", file_name, e);
                inner.emit(EngineEvent::SegmentAborted {
                    file_name: None,
                    reason: e.to_string(),
                });
                inner.enforce_retention(config.folder.clone()).await;
                break IdleReason::Failed;
            }
        }

        // Stop always wins over chaining
        if stop.load(Ordering::SeqCst) {
            break IdleReason::Stopped;
        }

        log::info!("Segment elapsed, chaining into next segment (generation {})", generation);
    };

    // A concurrent request_stop() owns the transition (and the idle event) otherwise
    if reason == IdleReason::Failed {
        let reset = {
            let mut state = lock(&inner.state);
            if matches!(*state, StateHolder::Recording { generation: g, .. } if g == generation) {
                *state = StateHolder::Idle;
                true
            } else {
                false
            }
        };
        if reset {
            log::warn!("Recording session ended after a capture failure (generation {})", generation);
            inner.emit(EngineEvent::SessionIdle {
                reason: IdleReason::Failed,
            });
        }
    }

    SessionSummary {
        segments_completed,
        last_segment,
        reason,
    }
}
