//! Media Notification Surface
//!
//! The system notification / remote-control surface (Android media
//! notification + MediaSession, Apple now-playing center). Exactly one surface
//! exists per process; the core decides which session owns it and what it
//! shows, the host only renders.

use serde::{Deserialize, Serialize};

use crate::{error::Result, image::Artwork, media::AudioMetas};

/// Which controls a session exposes on the notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub next_enabled: bool,
    pub play_pause_enabled: bool,
    pub prev_enabled: bool,
    pub stop_enabled: bool,
    pub seek_bar_enabled: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            next_enabled: true,
            play_pause_enabled: true,
            prev_enabled: true,
            stop_enabled: true,
            seek_bar_enabled: true,
        }
    }
}

impl NotificationSettings {
    /// Enabled controls in display order.
    pub fn enabled_controls(&self) -> Vec<NotificationControl> {
        [
            (self.prev_enabled, NotificationControl::Prev),
            (self.play_pause_enabled, NotificationControl::PlayPause),
            (self.next_enabled, NotificationControl::Next),
            (self.stop_enabled, NotificationControl::Stop),
        ]
        .into_iter()
        .filter_map(|(enabled, control)| enabled.then_some(control))
        .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationControl {
    Prev,
    PlayPause,
    Next,
    Stop,
}

/// Maximum number of actions shown in the collapsed notification.
pub const COMPACT_ACTION_LIMIT: usize = 3;

/// Full description of what the surface should display.
///
/// Each `show` replaces the previous content entirely.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationContent {
    pub player_id: String,
    pub is_playing: bool,
    pub metas: AudioMetas,
    pub settings: NotificationSettings,
    /// `None` hides the seek bar (disabled, livestream or unknown duration)
    pub duration_ms: Option<u64>,
    pub playback_speed: f64,
    pub artwork: Option<Artwork>,
}

impl NotificationContent {
    pub fn compact_actions(&self) -> Vec<NotificationControl> {
        let mut controls = self.settings.enabled_controls();
        controls.truncate(COMPACT_ACTION_LIMIT);
        controls
    }
}

/// Live playhead update for the media session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackPosition {
    pub is_playing: bool,
    pub position_ms: u64,
    /// 0 while paused
    pub speed: f64,
}

/// User interaction on the notification itself, scoped to the player it shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RemoteAction {
    Toggle,
    Next,
    Prev,
    Stop,
    Select { track_id: Option<String> },
}

/// Hardware / headset / lock-screen media button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaButton {
    Play,
    Pause,
    PlayOrPause,
    Next,
    Prev,
    Stop,
}

/// Host renderer for the single notification slot.
pub trait NotificationSurface: Send + Sync {
    fn show(&self, content: &NotificationContent) -> Result<()>;

    fn update_position(&self, player_id: &str, position: &PlaybackPosition) -> Result<()>;

    fn hide(&self) -> Result<()>;
}
