//! Typed calls delivered by the host channel layer.

use bridge_traits::AudioMetas;
use core_playback::{OpenRequest, PlayerSnapshot};
use serde::{Deserialize, Serialize};

/// One validated method call addressed to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PlayerCall {
    Open(Box<OpenRequest>),
    Play,
    Pause,
    Toggle,
    Stop,
    Seek {
        to_ms: i64,
    },
    SeekBy {
        by_ms: i64,
    },
    Volume {
        volume: f64,
    },
    PlaySpeed {
        speed: f64,
    },
    ForwardRewind {
        speed: f64,
    },
    Loop {
        looping: bool,
    },
    OnAudioUpdated {
        path: String,
        #[serde(default)]
        metas: AudioMetas,
    },
    ShowNotification {
        show: bool,
    },
    Next,
    Prev,
    IsPlaying,
    Snapshot,
}

impl PlayerCall {
    pub fn method(&self) -> &'static str {
        match self {
            PlayerCall::Open(_) => "open",
            PlayerCall::Play => "play",
            PlayerCall::Pause => "pause",
            PlayerCall::Toggle => "toggle",
            PlayerCall::Stop => "stop",
            PlayerCall::Seek { .. } => "seek",
            PlayerCall::SeekBy { .. } => "seekBy",
            PlayerCall::Volume { .. } => "volume",
            PlayerCall::PlaySpeed { .. } => "playSpeed",
            PlayerCall::ForwardRewind { .. } => "forwardRewind",
            PlayerCall::Loop { .. } => "loop",
            PlayerCall::OnAudioUpdated { .. } => "onAudioUpdated",
            PlayerCall::ShowNotification { .. } => "showNotification",
            PlayerCall::Next => "next",
            PlayerCall::Prev => "prev",
            PlayerCall::IsPlaying => "isPlaying",
            PlayerCall::Snapshot => "snapshot",
        }
    }
}

/// Result handed back to the channel layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CallOutcome {
    Done,
    Opened { duration_ms: u64 },
    IsPlaying { playing: bool },
    Snapshot(Box<PlayerSnapshot>),
}
