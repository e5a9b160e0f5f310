//! # Detection Session Controller
//!
//! Orchestrates the per-frame pipeline at a fixed polling cadence and owns
//! the session state machine:
//!
//! ```text
//! Uninitialized -> Ready -> Listening <-> Paused -> Stopped
//!                    ^__________________________________|
//! ```
//!
//! `dispose()` absorbs every state. One session drives one frame source;
//! the detection loop runs on a dedicated worker thread (the audio stream
//! itself already lives on its own capture thread) and hands each
//! [`DetectionResult`] to the caller's sink strictly in capture order.
//! Configuration updates land under a mutex and are snapshotted whole at
//! the top of each frame, so a frame sees either the old or the new config
//! in full, never a partial merge.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{RecvTimeoutError, Sender};
use log::{debug, warn};
use serde::Serialize;

use crate::DetectionResult;
use crate::audio::{AudioInput, FrameSource};
use crate::chord::Chord;
use crate::config::{ConfigPatch, DetectionConfig};
use crate::detector;
use crate::error::{AudioError, SessionError};

/// Nominal frame-loop interval: ~30 Hz, the display cadence the UI polls
/// at. The configured `max_latency_ms` can only tighten it.
pub const FRAME_INTERVAL_MS: u64 = 33;

/// After this many consecutive frame failures the session gives up and
/// escalates to a device error. Transient single-frame noise never
/// surfaces.
const MAX_CONSECUTIVE_FRAME_FAILURES: u32 = 3;

/// Running-accuracy placeholder until enough history exists to compute a
/// real estimate.
const ACCURACY_ESTIMATE_PLACEHOLDER: f32 = 0.85;

/// Lifecycle state of a [`DetectionSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Listening,
    Paused,
    Stopped,
    Disposed,
}

/// Snapshot of the session's running performance counters. Non-blocking;
/// reads cached values only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceStats {
    /// Configured latency target in milliseconds.
    pub latency_ms: u64,
    /// Estimated delivery rate in frames per second (EMA).
    pub detection_rate_hz: f32,
    /// Placeholder accuracy figure; a real estimate needs result history,
    /// which the consumer owns.
    pub accuracy_estimate: f32,
    /// True while listening and not paused.
    pub is_active: bool,
}

#[derive(Default)]
struct RateEstimate {
    last_delivery: Option<Instant>,
    hz: f32,
}

/// State shared between the session handle and its worker thread.
struct Shared {
    config: Mutex<DetectionConfig>,
    running: AtomicBool,
    paused: AtomicBool,
    fault: Mutex<Option<AudioError>>,
    rate: Mutex<RateEstimate>,
}

struct Worker {
    shutdown_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// An explicitly constructed, owned detection session.
///
/// There is no global instance: consumers create a session, pass it around
/// by reference, and can run several independent sessions (each with its
/// own frame source) side by side.
pub struct DetectionSession {
    state: SessionState,
    source: Option<Arc<Mutex<Box<dyn FrameSource>>>>,
    shared: Arc<Shared>,
    worker: Option<Worker>,
}

impl DetectionSession {
    /// Creates an uninitialized session holding `config`.
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            state: SessionState::Uninitialized,
            source: None,
            shared: Arc::new(Shared {
                config: Mutex::new(config),
                running: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                fault: Mutex::new(None),
                rate: Mutex::new(RateEstimate::default()),
            }),
            worker: None,
        }
    }

    /// Acquires the default microphone and transitions to `Ready`.
    ///
    /// This is the only operation that may block (device setup, permission
    /// prompt). On failure the session remains `Uninitialized` and the
    /// error is returned, never retried automatically.
    pub fn initialize(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Disposed {
            return Err(SessionError::Disposed);
        }
        if self.state != SessionState::Uninitialized {
            return Ok(());
        }
        let input = AudioInput::open()?;
        self.source = Some(Arc::new(Mutex::new(Box::new(input))));
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Adopts an already-initialized frame source (a pre-opened adapter, a
    /// file player, a synthetic source in tests) and transitions to
    /// `Ready`. The session owns the handle from here on.
    pub fn initialize_with_source(
        &mut self,
        source: Box<dyn FrameSource>,
    ) -> Result<(), SessionError> {
        match self.effective_state() {
            SessionState::Disposed => Err(SessionError::Disposed),
            SessionState::Listening | SessionState::Paused => Err(SessionError::AlreadyActive),
            _ => {
                self.source = Some(Arc::new(Mutex::new(source)));
                self.state = SessionState::Ready;
                Ok(())
            }
        }
    }

    /// Starts the per-frame detection loop, delivering every result to
    /// `sink` in capture order.
    ///
    /// `expected` is the chord the learner is supposed to be playing; when
    /// absent, detection relies purely on blind chroma matching.
    pub fn start_detection<F>(
        &mut self,
        expected: Option<Chord>,
        sink: F,
    ) -> Result<(), SessionError>
    where
        F: FnMut(DetectionResult) + Send + 'static,
    {
        match self.effective_state() {
            SessionState::Disposed => return Err(SessionError::Disposed),
            SessionState::Uninitialized => return Err(SessionError::NotInitialized),
            SessionState::Listening | SessionState::Paused => {
                return Err(SessionError::AlreadyActive);
            }
            SessionState::Ready | SessionState::Stopped => {}
        }
        // Reap a worker left over from a fault-stopped or stopped run.
        if let Some(worker) = self.worker.take() {
            let _ = worker.handle.join();
        }

        let source = self
            .source
            .as_ref()
            .ok_or(SessionError::NotInitialized)?
            .clone();

        // A frame captured before this run started must not become the run's
        // first result.
        lock(&source).discard_pending();

        *lock(&self.shared.fault) = None;
        *lock(&self.shared.rate) = RateEstimate::default();
        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.paused.store(false, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let mut sink = sink;

        let handle = std::thread::spawn(move || {
            debug!("detection loop started");
            let sample_rate = lock(&source).sample_rate();
            let mut consecutive_failures = 0u32;
            let mut interval =
                frame_interval(lock(&shared.config).max_latency_ms);

            loop {
                match shutdown_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
                if !shared.running.load(Ordering::SeqCst) {
                    break;
                }

                // Whole-config snapshot: this frame sees one config.
                let config = lock(&shared.config).clone();
                interval = frame_interval(config.max_latency_ms);

                if shared.paused.load(Ordering::SeqCst) {
                    continue;
                }

                let outcome = match lock(&source).latest_frame() {
                    // Nothing captured yet; not a failure.
                    Ok(None) => continue,
                    Ok(Some(buffer)) => {
                        detector::analyze_frame(&buffer, &config, expected, sample_rate)
                            .map_err(|e| e.to_string())
                    }
                    Err(e) => Err(e.to_string()),
                };

                match outcome {
                    Ok(result) => {
                        consecutive_failures = 0;
                        note_delivery(&shared.rate);
                        // Re-check so nothing is delivered once a stop has
                        // been requested.
                        if shared.running.load(Ordering::SeqCst) {
                            sink(result);
                        }
                    }
                    Err(message) => {
                        consecutive_failures += 1;
                        warn!(
                            "analysis frame failed ({consecutive_failures}/{MAX_CONSECUTIVE_FRAME_FAILURES}): {message}"
                        );
                        if consecutive_failures >= MAX_CONSECUTIVE_FRAME_FAILURES {
                            *lock(&shared.fault) = Some(AudioError::DeviceUnavailable(format!(
                                "giving up after {MAX_CONSECUTIVE_FRAME_FAILURES} consecutive frame failures: {message}"
                            )));
                            shared.running.store(false, Ordering::SeqCst);
                            break;
                        }
                    }
                }
            }
            debug!("detection loop finished");
        });

        self.worker = Some(Worker { shutdown_tx, handle });
        self.state = SessionState::Listening;
        Ok(())
    }

    /// Stops the detection loop. Takes effect before the next scheduled
    /// frame; no result is delivered after this returns. Legal to call
    /// redundantly in any state.
    pub fn stop_detection(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.paused.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.shutdown_tx.send(());
            let _ = worker.handle.join();
        }
        if matches!(
            self.state,
            SessionState::Listening | SessionState::Paused | SessionState::Stopped
        ) {
            self.state = SessionState::Stopped;
        }
    }

    /// Suspends delivery without tearing the loop down. Idempotent.
    pub fn pause_detection(&mut self) -> Result<(), SessionError> {
        match self.effective_state() {
            SessionState::Disposed => Err(SessionError::Disposed),
            SessionState::Listening | SessionState::Paused => {
                self.shared.paused.store(true, Ordering::SeqCst);
                self.state = SessionState::Paused;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Resumes a paused session. Idempotent.
    pub fn resume_detection(&mut self) -> Result<(), SessionError> {
        match self.effective_state() {
            SessionState::Disposed => Err(SessionError::Disposed),
            SessionState::Paused => {
                // Feedback after the gap describes current audio, not the
                // last frame captured before the pause.
                if let Some(source) = &self.source {
                    lock(source).discard_pending();
                }
                self.shared.paused.store(false, Ordering::SeqCst);
                self.state = SessionState::Listening;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Merges `patch` into the current configuration. Allowed in any state
    /// except after `dispose()`; takes effect on the next frame.
    pub fn update_config(&self, patch: &ConfigPatch) -> Result<(), SessionError> {
        if self.state == SessionState::Disposed {
            return Err(SessionError::Disposed);
        }
        patch.apply(&mut lock(&self.shared.config));
        Ok(())
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> DetectionConfig {
        lock(&self.shared.config).clone()
    }

    /// Current performance counters; never blocks on the frame loop.
    pub fn performance_stats(&self) -> PerformanceStats {
        PerformanceStats {
            latency_ms: lock(&self.shared.config).max_latency_ms,
            detection_rate_hz: lock(&self.shared.rate).hz,
            accuracy_estimate: ACCURACY_ESTIMATE_PLACEHOLDER,
            is_active: self.is_active(),
        }
    }

    /// The device fault that stopped the session, if any.
    pub fn last_fault(&self) -> Option<AudioError> {
        lock(&self.shared.fault).clone()
    }

    /// True while the loop is running and not paused.
    pub fn is_active(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst) && !self.shared.paused.load(Ordering::SeqCst)
    }

    /// Current lifecycle state, accounting for a loop that stopped itself
    /// after repeated frame failures.
    pub fn state(&self) -> SessionState {
        self.effective_state()
    }

    fn effective_state(&self) -> SessionState {
        match self.state {
            SessionState::Listening | SessionState::Paused
                if !self.shared.running.load(Ordering::SeqCst) =>
            {
                SessionState::Stopped
            }
            other => other,
        }
    }

    /// Releases the frame source. Valid in any state; every subsequent
    /// operation except `stop_detection()` fails with
    /// [`SessionError::Disposed`].
    pub fn dispose(&mut self) {
        self.stop_detection();
        self.source = None;
        self.state = SessionState::Disposed;
    }
}

impl Drop for DetectionSession {
    fn drop(&mut self) {
        self.stop_detection();
    }
}

fn frame_interval(max_latency_ms: u64) -> std::time::Duration {
    std::time::Duration::from_millis(max_latency_ms.min(FRAME_INTERVAL_MS).max(1))
}

/// Lock that survives a poisoned mutex: a panicking sink must not take the
/// whole session down with it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn note_delivery(rate: &Mutex<RateEstimate>) {
    let mut rate = lock(rate);
    let now = Instant::now();
    if let Some(last) = rate.last_delivery {
        let dt = now.duration_since(last).as_secs_f32();
        if dt > 0.0 {
            let instantaneous = 1.0 / dt;
            rate.hz = if rate.hz == 0.0 {
                instantaneous
            } else {
                0.8 * rate.hz + 0.2 * instantaneous
            };
        }
    }
    rate.last_delivery = Some(now);
}
