//! Device Audio Settings
//!
//! Ringer mode (Android silent switch) and the Apple audio session category.

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RingerMode {
    Normal,
    Silent,
    Vibrate,
}

impl RingerMode {
    /// Whether a session respecting silent mode must be muted.
    pub fn is_muted(&self) -> bool {
        matches!(self, RingerMode::Silent | RingerMode::Vibrate)
    }
}

/// Reads the device ringer mode. Called on every position tick.
pub trait RingerModeProvider: Send + Sync {
    fn ringer_mode(&self) -> RingerMode;
}

/// AVAudioSession category used for playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioSessionCategory {
    /// Plays with the silent switch on and in the background
    Playback,
    /// Silenced by the silent switch
    SoloAmbient,
}

impl AudioSessionCategory {
    pub fn select(show_notification: bool, respect_silent_mode: bool) -> Self {
        if !show_notification && respect_silent_mode {
            AudioSessionCategory::SoloAmbient
        } else {
            AudioSessionCategory::Playback
        }
    }
}

/// Apple audio session configuration.
pub trait AudioSessionConfigurator: Send + Sync {
    fn set_category(&self, category: AudioSessionCategory) -> Result<()>;

    fn set_active(&self, active: bool) -> Result<()>;
}
