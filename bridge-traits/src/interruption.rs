//! Interruption Sources
//!
//! Phone-call state and audio-focus changes reported by the OS. Both are
//! exposed as change streams; the core maps them to a single authorization
//! signal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Telephony call state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Idle,
    Ringing,
    /// A call is active or being dialed
    Offhook,
}

/// Audio focus (Android) or audio session interruption (Apple) change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusChange {
    Gain,
    /// Another app briefly needs audio and lets us keep playing quietly
    LossTransientCanDuck,
    LossTransient,
    Loss,
}

/// Telephony state source.
///
/// - **Android**: TelephonyManager / PhoneStateListener
/// - **Apple**: CXCallObserver
#[async_trait]
pub trait TelephonyMonitor: Send + Sync {
    /// Current call state
    async fn call_state(&self) -> Result<CallState>;

    /// Subscribe to call state transitions
    async fn subscribe_changes(&self) -> Result<Box<dyn CallStateStream>>;
}

/// Stream of call state transitions
#[async_trait]
pub trait CallStateStream: Send {
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<CallState>;
}

/// Audio focus manager.
///
/// - **Android**: AudioManager.requestAudioFocus
/// - **Apple**: AVAudioSession interruption notifications
#[async_trait]
pub trait AudioFocusManager: Send + Sync {
    /// Request focus for media playback and report the resulting state
    async fn request_focus(&self) -> Result<FocusChange>;

    async fn abandon_focus(&self) -> Result<()>;

    /// Subscribe to focus changes
    async fn subscribe_changes(&self) -> Result<Box<dyn FocusChangeStream>>;
}

/// Stream of focus changes
#[async_trait]
pub trait FocusChangeStream: Send {
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<FocusChange>;
}
