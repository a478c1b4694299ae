//! Desktop Device Sources
//!
//! Desktops have no telephony and no ringer switch. These implementations
//! report a fixed state by default and can be driven programmatically, which
//! is how tests and desktop hosts simulate calls and focus loss.

use async_trait::async_trait;
use bridge_traits::{
    error::Result, AudioFocusManager, CallState, CallStateStream, FocusChange,
    FocusChangeStream, RingerMode, RingerModeProvider, TelephonyMonitor,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

const CHANGE_BUFFER: usize = 16;

/// Ringer mode set by the host. Defaults to [`RingerMode::Normal`].
#[derive(Debug, Clone)]
pub struct FixedRingerMode {
    mode: Arc<RwLock<RingerMode>>,
}

impl FixedRingerMode {
    pub fn new(mode: RingerMode) -> Self {
        Self {
            mode: Arc::new(RwLock::new(mode)),
        }
    }

    pub fn normal() -> Self {
        Self::new(RingerMode::Normal)
    }

    /// Change the reported mode; clones observe the change.
    pub fn set(&self, mode: RingerMode) {
        *self.mode.write() = mode;
    }
}

impl Default for FixedRingerMode {
    fn default() -> Self {
        Self::normal()
    }
}

impl RingerModeProvider for FixedRingerMode {
    fn ringer_mode(&self) -> RingerMode {
        *self.mode.read()
    }
}

// ============================================================================
// Telephony
// ============================================================================

/// Telephony monitor fed through [`set_call_state`](Self::set_call_state).
#[derive(Clone)]
pub struct ChannelTelephonyMonitor {
    state: Arc<RwLock<CallState>>,
    sender: broadcast::Sender<CallState>,
}

impl ChannelTelephonyMonitor {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            state: Arc::new(RwLock::new(CallState::Idle)),
            sender,
        }
    }

    pub fn set_call_state(&self, state: CallState) {
        *self.state.write() = state;
        debug!(?state, "Simulated call state");
        let _ = self.sender.send(state);
    }
}

impl Default for ChannelTelephonyMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelephonyMonitor for ChannelTelephonyMonitor {
    async fn call_state(&self) -> Result<CallState> {
        Ok(*self.state.read())
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn CallStateStream>> {
        Ok(Box::new(BroadcastStream(self.sender.subscribe())))
    }
}

// ============================================================================
// Audio focus
// ============================================================================

/// Audio focus manager fed through [`push`](Self::push).
#[derive(Clone)]
pub struct ChannelAudioFocusManager {
    grant: Arc<RwLock<FocusChange>>,
    sender: broadcast::Sender<FocusChange>,
    requests: Arc<AtomicU32>,
}

impl ChannelAudioFocusManager {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            grant: Arc::new(RwLock::new(FocusChange::Gain)),
            sender,
            requests: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Report a focus change from the system.
    pub fn push(&self, change: FocusChange) {
        debug!(?change, "Simulated focus change");
        let _ = self.sender.send(change);
    }

    /// Answer later focus requests with `change`.
    pub fn grant_with(&self, change: FocusChange) {
        *self.grant.write() = change;
    }

    pub fn request_count(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Default for ChannelAudioFocusManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioFocusManager for ChannelAudioFocusManager {
    async fn request_focus(&self) -> Result<FocusChange> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(*self.grant.read())
    }

    async fn abandon_focus(&self) -> Result<()> {
        Ok(())
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn FocusChangeStream>> {
        Ok(Box::new(BroadcastStream(self.sender.subscribe())))
    }
}

// ============================================================================
// Streams
// ============================================================================

struct BroadcastStream<T>(broadcast::Receiver<T>);

impl<T: Clone> BroadcastStream<T> {
    async fn recv(&mut self) -> Option<T> {
        loop {
            match self.0.recv().await {
                Ok(value) => return Some(value),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[async_trait]
impl CallStateStream for BroadcastStream<CallState> {
    async fn next(&mut self) -> Option<CallState> {
        self.recv().await
    }
}

#[async_trait]
impl FocusChangeStream for BroadcastStream<FocusChange> {
    async fn next(&mut self) -> Option<FocusChange> {
        self.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ringer_mode_is_shared_between_clones() {
        let ringer = FixedRingerMode::normal();
        let observer = ringer.clone();
        ringer.set(RingerMode::Silent);
        assert_eq!(observer.ringer_mode(), RingerMode::Silent);
    }

    #[tokio::test]
    async fn test_telephony_stream_follows_call_state() {
        let telephony = ChannelTelephonyMonitor::new();
        let mut changes = telephony.subscribe_changes().await.unwrap();

        telephony.set_call_state(CallState::Ringing);
        telephony.set_call_state(CallState::Offhook);

        assert_eq!(changes.next().await, Some(CallState::Ringing));
        assert_eq!(changes.next().await, Some(CallState::Offhook));
        assert_eq!(telephony.call_state().await.unwrap(), CallState::Offhook);
    }

    #[tokio::test]
    async fn test_focus_requests_are_counted() {
        let focus = ChannelAudioFocusManager::new();
        focus.grant_with(FocusChange::LossTransient);

        assert_eq!(focus.request_focus().await.unwrap(), FocusChange::LossTransient);
        assert_eq!(focus.request_count(), 1);
    }
}
