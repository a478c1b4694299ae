//! # Playback Error Types
//!
//! Errors of the media-session core: open failures surfaced to the caller,
//! classified engine failures, and session lifecycle errors.

use bridge_traits::{BridgeError, EngineFailure, EngineKind, FailureCause};
use core_runtime::events::ErrorCategory;
use std::fmt;
use thiserror::Error;

/// Classified engine failure.
///
/// Before a source is ready, any `EngineError` makes the backend probe move
/// on to the next candidate. After it is ready, it is reported to the host
/// as an `Error` event.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Connection could not be established or was lost.
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with an error status.
    #[error("Source unreachable (HTTP {status}): {message}")]
    Unreachable { status: u16, message: String },

    /// The engine cannot handle this container or protocol.
    #[error("Incompatible source: {0}")]
    Incompatible(String),

    /// Decoder or internal engine failure.
    #[error("Player error: {0}")]
    Player(String),

    /// The engine does not support the requested operation.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl EngineError {
    /// Classify a raw host failure.
    pub fn classify(failure: &EngineFailure) -> Self {
        let message = failure.message.clone();

        if let Some(status) = failure.http_status.filter(|status| *status >= 400) {
            return EngineError::Unreachable { status, message };
        }

        if failure.message.to_lowercase().contains("unable to connect") {
            return EngineError::Network(message);
        }

        match failure.cause {
            FailureCause::Transport | FailureCause::Http => EngineError::Network(message),
            FailureCause::UnsupportedFormat => EngineError::Incompatible(message),
            FailureCause::Decoder | FailureCause::Other => EngineError::Player(message),
        }
    }

    /// Returns `true` if this error is due to network issues.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            EngineError::Network(_) | EngineError::Unreachable { .. }
        )
    }

    /// Returns `true` if a later attempt on the same source may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Network(_))
    }

    /// Category reported on the host-facing `Error` event.
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::Network(_) => ErrorCategory::Network,
            EngineError::Unreachable { .. } => ErrorCategory::Unreachable,
            EngineError::Incompatible(_) | EngineError::Player(_) | EngineError::Unsupported(_) => {
                ErrorCategory::Player
            }
        }
    }
}

impl From<BridgeError> for EngineError {
    fn from(error: BridgeError) -> Self {
        EngineError::Player(error.to_string())
    }
}

/// Outcome of one backend candidate during a probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeAttempt {
    pub kind: EngineKind,
    pub error: EngineError,
}

impl fmt::Display for ProbeAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.error)
    }
}

fn describe_attempts(attempts: &[ProbeAttempt]) -> String {
    if attempts.is_empty() {
        return "no compatible backend for this source".to_string();
    }
    attempts
        .iter()
        .map(ProbeAttempt::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Open Errors
    // ========================================================================
    /// Every compatible backend failed to open the source.
    #[error("No backend could open the source: {}", describe_attempts(.attempts))]
    NoBackendAvailable { attempts: Vec<ProbeAttempt> },

    /// The source was rejected before any backend was tried.
    #[error("Failed to open audio source: {0}")]
    Open(String),

    /// A later `open()` replaced this one before it resolved.
    #[error("Open superseded by a newer open")]
    OpenSuperseded,

    /// `stop()` was called before this open resolved.
    #[error("Open cancelled by stop")]
    OpenCancelled,

    // ========================================================================
    // Runtime Errors
    // ========================================================================
    /// Engine failure after the source became ready.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Reverse playback requested on a platform that cannot do it.
    #[error("Unsupported play speed {0}")]
    UnsupportedPlaySpeed(f64),

    /// Non-finite volume, speed or similar argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// The session task is gone (registry shut down).
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// No session exists for this id.
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

impl PlaybackError {
    /// Returns `true` for errors that end an `open()` call.
    pub fn is_open_failure(&self) -> bool {
        matches!(
            self,
            PlaybackError::NoBackendAvailable { .. }
                | PlaybackError::Open(_)
                | PlaybackError::OpenSuperseded
                | PlaybackError::OpenCancelled
        )
    }

    /// Returns `true` if this error is due to network issues.
    pub fn is_network_error(&self) -> bool {
        match self {
            PlaybackError::Engine(error) => error.is_network_error(),
            PlaybackError::NoBackendAvailable { attempts } => {
                !attempts.is_empty() && attempts.iter().all(|attempt| attempt.error.is_network_error())
            }
            _ => false,
        }
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
