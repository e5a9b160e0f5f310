//! # Error Taxonomy
//!
//! Typed errors for the detection engine. Audio-device failures are fatal for
//! the session and surfaced to the caller; per-frame analysis hiccups are
//! handled inside the frame loop and never appear here directly (three
//! consecutive failures escalate to [`AudioError::DeviceUnavailable`]).

use thiserror::Error;

/// Fatal audio-input failures. Never retried automatically; the caller
/// decides whether to re-initialize.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AudioError {
    /// Microphone access was refused. User-actionable.
    #[error("microphone access denied")]
    PermissionDenied,

    /// No compatible input device, or the device went away mid-session.
    #[error("audio input unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Errors returned by [`crate::session::DetectionSession`] operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Initialization or mid-session device failure.
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// A detection loop is already running on this session's device handle.
    /// Starting a second one is a programmer error, not an implicit takeover.
    #[error("detection already active on this session")]
    AlreadyActive,

    /// An operation that needs a device handle was called before
    /// `initialize()`.
    #[error("session not initialized; call initialize() first")]
    NotInitialized,

    /// The session was disposed; its device handle is gone for good.
    #[error("session already disposed")]
    Disposed,
}

/// A single analysis frame could not be processed. Swallowed by the frame
/// loop (the frame is skipped); only repeated failures escalate.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FrameError {
    /// The capture buffer did not have the expected number of samples.
    #[error("malformed analysis frame: expected {expected} samples, got {got}")]
    BadFrameLength { expected: usize, got: usize },
}
