//! # Engine Layer
//!
//! Backend candidates, the uniform engine adapter and the backend probe.
//!
//! ## Overview
//!
//! A platform offers several engines for the same source. Android tries the
//! streaming-protocol-aware ExoPlayer builds first, then the progressive
//! ExoPlayer build, then the legacy MediaPlayer. Apple tries AVPlayer, then
//! AVAudioPlayer for local files. [`PlayerFinder`] walks that list and hands
//! the first engine that opens to the session as an [`EngineAdapter`].
//!
//! Engine signals travel to the owning session through a [`SignalRoute`]:
//! every engine gets a listener tagged with its [`EngineId`] and the open
//! generation it was created for, so the session can drop signals from
//! engines it no longer owns.

mod adapter;
mod finder;

pub use adapter::{AdapterSignal, EngineAdapter};
pub use finder::{PlayerFinder, ProbeOutcome};

use bridge_traits::{AudioType, EngineKind, EngineListener, EngineSignal, Platform, StreamProtocol};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Ordered, stateless descriptor of one engine type.
#[derive(Clone, Copy)]
pub struct BackendCandidate {
    pub kind: EngineKind,
    accepts: fn(AudioType) -> bool,
}

impl BackendCandidate {
    pub const fn new(kind: EngineKind, accepts: fn(AudioType) -> bool) -> Self {
        Self { kind, accepts }
    }

    /// Candidate usable for every source type.
    pub const fn any_source(kind: EngineKind) -> Self {
        Self::new(kind, any_source)
    }

    pub fn accepts(&self, audio_type: AudioType) -> bool {
        (self.accepts)(audio_type)
    }
}

impl fmt::Debug for BackendCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendCandidate")
            .field("kind", &self.kind)
            .finish()
    }
}

fn any_source(_: AudioType) -> bool {
    true
}

/// Adaptive-streaming engines only make sense for remote sources.
fn remote_only(audio_type: AudioType) -> bool {
    audio_type.is_remote()
}

fn local_only(audio_type: AudioType) -> bool {
    matches!(audio_type, AudioType::File | AudioType::Asset)
}

const ANDROID_CANDIDATES: &[BackendCandidate] = &[
    BackendCandidate::new(EngineKind::ExoPlayer(StreamProtocol::Hls), remote_only),
    BackendCandidate::new(EngineKind::ExoPlayer(StreamProtocol::Dash), remote_only),
    BackendCandidate::new(EngineKind::ExoPlayer(StreamProtocol::SmoothStreaming), remote_only),
    BackendCandidate::new(EngineKind::ExoPlayer(StreamProtocol::Progressive), any_source),
    BackendCandidate::new(EngineKind::MediaPlayer, any_source),
];

const APPLE_CANDIDATES: &[BackendCandidate] = &[
    BackendCandidate::new(EngineKind::AvPlayer, any_source),
    BackendCandidate::new(EngineKind::AvAudioPlayer, local_only),
];

/// Candidate list of a platform, most specific first.
pub fn candidates_for(platform: Platform) -> &'static [BackendCandidate] {
    match platform {
        Platform::Android => ANDROID_CANDIDATES,
        Platform::Apple => APPLE_CANDIDATES,
    }
}

/// How forward/rewind is driven on a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrubStyle {
    /// Engine paused, playhead moved by a repeating seek
    Stepped,
    /// Signed playback rate on the engine
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilities {
    /// Engines accept a negative playback rate
    pub reverse_playback: bool,
    pub scrub: ScrubStyle,
}

impl PlatformCapabilities {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Android => Self {
                reverse_playback: false,
                scrub: ScrubStyle::Stepped,
            },
            Platform::Apple => Self {
                reverse_playback: true,
                scrub: ScrubStyle::Continuous,
            },
        }
    }
}

/// Identity of one constructed engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineId(pub(crate) u64);

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine-{}", self.0)
    }
}

/// Engine signal tagged with its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedSignal {
    pub engine_id: EngineId,
    pub generation: u64,
    pub signal: AdapterSignal,
}

/// Where the engines of one open attempt deliver their signals.
#[derive(Clone)]
pub struct SignalRoute {
    generation: u64,
    sender: mpsc::UnboundedSender<RoutedSignal>,
}

impl SignalRoute {
    pub fn new(generation: u64, sender: mpsc::UnboundedSender<RoutedSignal>) -> Self {
        Self { generation, sender }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn listener_for(&self, engine_id: EngineId) -> Arc<dyn EngineListener> {
        Arc::new(SignalForwarder {
            engine_id,
            generation: self.generation,
            sender: self.sender.clone(),
        })
    }
}

struct SignalForwarder {
    engine_id: EngineId,
    generation: u64,
    sender: mpsc::UnboundedSender<RoutedSignal>,
}

impl EngineListener for SignalForwarder {
    fn on_signal(&self, signal: EngineSignal) {
        let routed = RoutedSignal {
            engine_id: self.engine_id,
            generation: self.generation,
            signal: AdapterSignal::from(signal),
        };
        // The session is gone; nothing left to notify.
        let _ = self.sender.send(routed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{EngineFailure, FailureCause};

    #[test]
    fn test_android_candidates_for_local_sources_skip_streaming_engines() {
        let kinds: Vec<EngineKind> = candidates_for(Platform::Android)
            .iter()
            .filter(|candidate| candidate.accepts(AudioType::Asset))
            .map(|candidate| candidate.kind)
            .collect();

        assert_eq!(
            kinds,
            vec![
                EngineKind::ExoPlayer(StreamProtocol::Progressive),
                EngineKind::MediaPlayer
            ]
        );
    }

    #[test]
    fn test_android_candidates_for_network_sources_keep_order() {
        let kinds: Vec<EngineKind> = candidates_for(Platform::Android)
            .iter()
            .filter(|candidate| candidate.accepts(AudioType::LiveStream))
            .map(|candidate| candidate.kind)
            .collect();

        assert_eq!(kinds.len(), 5);
        assert_eq!(kinds[0], EngineKind::ExoPlayer(StreamProtocol::Hls));
        assert_eq!(kinds[4], EngineKind::MediaPlayer);
    }

    #[test]
    fn test_apple_audio_player_is_local_only() {
        let network: Vec<EngineKind> = candidates_for(Platform::Apple)
            .iter()
            .filter(|candidate| candidate.accepts(AudioType::Network))
            .map(|candidate| candidate.kind)
            .collect();
        assert_eq!(network, vec![EngineKind::AvPlayer]);
    }

    #[test]
    fn test_platform_capabilities() {
        let android = PlatformCapabilities::for_platform(Platform::Android);
        assert!(!android.reverse_playback);
        assert_eq!(android.scrub, ScrubStyle::Stepped);

        let apple = PlatformCapabilities::for_platform(Platform::Apple);
        assert!(apple.reverse_playback);
        assert_eq!(apple.scrub, ScrubStyle::Continuous);
    }

    #[tokio::test]
    async fn test_signal_route_tags_signals() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let route = SignalRoute::new(7, tx);
        let listener = route.listener_for(EngineId(3));

        listener.on_signal(EngineSignal::Buffering(true));
        listener.on_signal(EngineSignal::Failed(EngineFailure::new(
            FailureCause::Transport,
            "reset",
        )));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.engine_id, EngineId(3));
        assert_eq!(first.generation, 7);
        assert_eq!(first.signal, AdapterSignal::Buffering(true));

        let second = rx.recv().await.unwrap();
        assert!(matches!(second.signal, AdapterSignal::Error(_)));
    }
}
