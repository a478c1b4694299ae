//! # Interruption Policy
//!
//! Maps phone-call and audio-focus signals to one [`AudioState`] shared by
//! every session, and holds the per-session reaction rules.
//!
//! ## Mapping
//!
//! | Source | Signal | AudioState |
//! |--------|--------|------------|
//! | Call   | Idle | AuthorizedToPlay |
//! | Call   | Ringing | ReduceVolume |
//! | Call   | Offhook | Forbidden |
//! | Focus  | Gain | AuthorizedToPlay |
//! | Focus  | LossTransientCanDuck | ReduceVolume |
//! | Focus  | LossTransient / Loss | Forbidden |
//!
//! Both sources publish into the same broadcast; the latest transition wins.

use bridge_traits::{AudioFocusManager, CallState, FocusChange, TelephonyMonitor};
use core_runtime::config::InterruptionStrategy;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;

const TRANSITION_BUFFER: usize = 16;

/// Whether sessions may play, must duck, or must stay paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioState {
    AuthorizedToPlay,
    ReduceVolume,
    Forbidden,
}

impl From<CallState> for AudioState {
    fn from(state: CallState) -> Self {
        match state {
            CallState::Idle => AudioState::AuthorizedToPlay,
            CallState::Ringing => AudioState::ReduceVolume,
            CallState::Offhook => AudioState::Forbidden,
        }
    }
}

impl From<FocusChange> for AudioState {
    fn from(change: FocusChange) -> Self {
        match change {
            FocusChange::Gain => AudioState::AuthorizedToPlay,
            FocusChange::LossTransientCanDuck => AudioState::ReduceVolume,
            FocusChange::LossTransient | FocusChange::Loss => AudioState::Forbidden,
        }
    }
}

/// Process-wide interruption source, shared read-only by every session.
pub struct InterruptionPolicy {
    strategy: InterruptionStrategy,
    telephony: Option<Arc<dyn TelephonyMonitor>>,
    audio_focus: Option<Arc<dyn AudioFocusManager>>,
    current: RwLock<AudioState>,
    sender: broadcast::Sender<AudioState>,
    watchers: Mutex<Vec<JoinHandle<()>>>,
}

impl InterruptionPolicy {
    pub fn new(
        strategy: InterruptionStrategy,
        telephony: Option<Arc<dyn TelephonyMonitor>>,
        audio_focus: Option<Arc<dyn AudioFocusManager>>,
    ) -> Arc<Self> {
        let (sender, _) = broadcast::channel(TRANSITION_BUFFER);
        Arc::new(Self {
            strategy,
            telephony: telephony.filter(|_| strategy.uses_telephony()),
            audio_focus: audio_focus.filter(|_| strategy.uses_audio_focus()),
            current: RwLock::new(AudioState::AuthorizedToPlay),
            sender,
            watchers: Mutex::new(Vec::new()),
        })
    }

    /// Policy that never interrupts.
    pub fn disabled() -> Arc<Self> {
        Self::new(InterruptionStrategy::Disabled, None, None)
    }

    pub fn strategy(&self) -> InterruptionStrategy {
        self.strategy
    }

    /// Read the initial call state and start following the configured sources.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if let Some(telephony) = &self.telephony {
            let initial = telephony.call_state().await?;
            *self.current.write() = AudioState::from(initial);

            let mut stream = telephony.subscribe_changes().await?;
            let policy = Arc::downgrade(self);
            let watcher = tokio::spawn(async move {
                while let Some(state) = stream.next().await {
                    let Some(policy) = policy.upgrade() else { break };
                    debug!(?state, "Call state changed");
                    policy.publish(AudioState::from(state));
                }
            });
            self.watchers.lock().push(watcher);
        }

        if let Some(audio_focus) = &self.audio_focus {
            let mut stream = audio_focus.subscribe_changes().await?;
            let policy = Arc::downgrade(self);
            let watcher = tokio::spawn(async move {
                while let Some(change) = stream.next().await {
                    let Some(policy) = policy.upgrade() else { break };
                    debug!(?change, "Audio focus changed");
                    policy.publish(AudioState::from(change));
                }
            });
            self.watchers.lock().push(watcher);
        }

        info!(strategy = ?self.strategy, current = ?self.current(), "Interruption policy started");
        Ok(())
    }

    pub fn current(&self) -> AudioState {
        *self.current.read()
    }

    /// Receive every later transition.
    pub fn subscribe(&self) -> broadcast::Receiver<AudioState> {
        self.sender.subscribe()
    }

    /// Record and broadcast a transition.
    pub fn publish(&self, state: AudioState) {
        *self.current.write() = state;
        let _ = self.sender.send(state);
    }

    /// Ask the system for playback authorization again.
    ///
    /// A failing focus request is treated as `Forbidden`.
    pub async fn request_audio_focus(&self) -> AudioState {
        let state = if let Some(audio_focus) = &self.audio_focus {
            match audio_focus.request_focus().await {
                Ok(change) => AudioState::from(change),
                Err(err) => {
                    warn!(error = %err, "Audio focus request failed");
                    AudioState::Forbidden
                }
            }
        } else if let Some(telephony) = &self.telephony {
            match telephony.call_state().await {
                Ok(state) => AudioState::from(state),
                Err(err) => {
                    warn!(error = %err, "Reading call state failed");
                    AudioState::Forbidden
                }
            }
        } else {
            AudioState::AuthorizedToPlay
        };

        self.publish(state);
        state
    }

    /// Stop following the sources and give focus back.
    pub async fn shutdown(&self) {
        for watcher in self.watchers.lock().drain(..) {
            watcher.abort();
        }
        if let Some(audio_focus) = &self.audio_focus {
            if let Err(err) = audio_focus.abandon_focus().await {
                warn!(error = %err, "Abandoning audio focus failed");
            }
        }
    }
}

impl std::fmt::Debug for InterruptionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptionPolicy")
            .field("strategy", &self.strategy)
            .field("current", &self.current())
            .finish()
    }
}

/// What a session must do in response to a transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InterruptionAction {
    Pause,
    Resume,
    /// Re-apply the effective (ducked) volume
    Duck,
    /// Set the session volume back to the saved value
    RestoreVolume(f64),
}

/// Per-session reaction state.
///
/// Saved values are captured on the first restrictive transition only, so
/// `Ringing -> Offhook -> Idle` restores what was there before the ring.
#[derive(Debug, Clone, PartialEq)]
pub struct InterruptionGuard {
    play_pause_enabled: bool,
    volume_enabled: bool,
    was_playing: Option<bool>,
    saved_volume: Option<f64>,
    duck_base: Option<f64>,
}

impl Default for InterruptionGuard {
    fn default() -> Self {
        Self {
            play_pause_enabled: true,
            volume_enabled: true,
            was_playing: None,
            saved_volume: None,
            duck_base: None,
        }
    }
}

impl InterruptionGuard {
    pub fn play_pause_enabled(&self) -> bool {
        self.play_pause_enabled
    }

    pub fn volume_enabled(&self) -> bool {
        self.volume_enabled
    }

    pub fn audio_state(&self) -> AudioState {
        if !self.play_pause_enabled {
            AudioState::Forbidden
        } else if !self.volume_enabled {
            AudioState::ReduceVolume
        } else {
            AudioState::AuthorizedToPlay
        }
    }

    /// Volume to apply while ducked. Based on the volume at the time of the
    /// duck, not on volumes remembered since.
    pub fn ducked_volume(&self, volume: f64, fraction: f64) -> f64 {
        self.duck_base.unwrap_or(volume) * fraction
    }

    /// A play request arrived while forbidden; resume once authorized.
    pub fn defer_play(&mut self) {
        self.was_playing = Some(true);
    }

    /// A pause request arrived while forbidden; stay paused once authorized.
    pub fn cancel_deferred_play(&mut self) {
        if self.was_playing.is_some() {
            self.was_playing = Some(false);
        }
    }

    /// A volume change arrived while ducked; restore to it once authorized.
    pub fn remember_volume(&mut self, volume: f64) {
        self.saved_volume = Some(volume);
    }

    pub fn apply(&mut self, state: AudioState, is_playing: bool, volume: f64) -> Vec<InterruptionAction> {
        match state {
            AudioState::Forbidden => {
                if self.was_playing.is_none() {
                    self.was_playing = Some(is_playing);
                }
                self.play_pause_enabled = false;
                if is_playing {
                    vec![InterruptionAction::Pause]
                } else {
                    Vec::new()
                }
            }
            AudioState::ReduceVolume => {
                if self.saved_volume.is_none() {
                    self.saved_volume = Some(volume);
                }
                if self.duck_base.is_none() {
                    self.duck_base = Some(volume);
                }
                self.volume_enabled = false;
                vec![InterruptionAction::Duck]
            }
            AudioState::AuthorizedToPlay => {
                self.play_pause_enabled = true;
                self.volume_enabled = true;

                self.duck_base = None;
                let mut actions = Vec::new();
                if let Some(saved) = self.saved_volume.take() {
                    actions.push(InterruptionAction::RestoreVolume(saved));
                }
                if self.was_playing.take() == Some(true) {
                    actions.push(InterruptionAction::Resume);
                }
                actions
            }
        }
    }
}
