//! Session-level request and state types.

use bridge_traits::{AudioMetas, MediaSource, NotificationSettings};
use serde::{Deserialize, Serialize};

use crate::interruption::AudioState;

fn default_auto_start() -> bool {
    true
}

/// Arguments of `open()`, already validated by the channel layer.
///
/// `volume` and `play_speed` fall back to the session's recorded targets
/// when absent, so values set before the open still apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRequest {
    pub source: MediaSource,
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub play_speed: Option<f64>,
    /// Initial position in milliseconds
    #[serde(default)]
    pub seek_ms: Option<i64>,
    #[serde(default)]
    pub respect_silent_mode: bool,
    #[serde(default)]
    pub display_notification: bool,
    #[serde(default)]
    pub notification_settings: NotificationSettings,
    #[serde(default)]
    pub metas: AudioMetas,
}

impl OpenRequest {
    pub fn new(source: MediaSource) -> Self {
        Self {
            source,
            auto_start: true,
            volume: None,
            play_speed: None,
            seek_ms: None,
            respect_silent_mode: false,
            display_notification: false,
            notification_settings: NotificationSettings::default(),
            metas: AudioMetas::default(),
        }
    }

    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn play_speed(mut self, speed: f64) -> Self {
        self.play_speed = Some(speed);
        self
    }

    pub fn seek(mut self, position_ms: i64) -> Self {
        self.seek_ms = Some(position_ms);
        self
    }

    pub fn respect_silent_mode(mut self, respect: bool) -> Self {
        self.respect_silent_mode = respect;
        self
    }

    pub fn with_notification(mut self, settings: NotificationSettings, metas: AudioMetas) -> Self {
        self.display_notification = true;
        self.notification_settings = settings;
        self.metas = metas;
        self
    }
}

/// Lifecycle state of a session.
///
/// `Error` is only reached from `Opening`; runtime errors after ready are
/// reported as events and leave the state untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    Idle,
    Opening,
    Ready,
    Playing,
    Paused,
    Ended,
    Stopped,
    Error,
}

/// Point-in-time view of a session, for queries and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub player_id: String,
    pub state: PlayerState,
    /// Live read of the engine; false without one
    pub is_playing: bool,
    pub buffering: bool,
    pub volume: f64,
    pub play_speed: f64,
    pub looping: bool,
    /// Active forward/rewind speed
    pub scrub_speed: Option<f64>,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub audio_state: AudioState,
    pub playing_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::AudioType;

    #[test]
    fn test_open_request_defaults_from_wire() {
        let request: OpenRequest = serde_json::from_str(
            r#"{"source": {"audio_type": "asset", "path": "assets/a.mp3", "package": null}}"#,
        )
        .unwrap();

        assert!(request.auto_start);
        assert!(!request.display_notification);
        assert!(!request.respect_silent_mode);
        assert_eq!(request.volume, None);
        assert_eq!(request.source.audio_type, AudioType::Asset);
        assert!(request.notification_settings.seek_bar_enabled);
    }

    #[test]
    fn test_open_request_builder() {
        let request = OpenRequest::new(MediaSource::new(AudioType::File, "/tmp/a.mp3"))
            .auto_start(false)
            .volume(0.5)
            .seek(-20);

        assert!(!request.auto_start);
        assert_eq!(request.volume, Some(0.5));
        assert_eq!(request.seek_ms, Some(-20));
    }
}
