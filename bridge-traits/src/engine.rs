//! Native Engine Contract
//!
//! A native engine is one concrete platform media backend (ExoPlayer,
//! MediaPlayer, AVPlayer, AVAudioPlayer). The core never touches those APIs
//! directly: the host constructs engines through an [`EngineFactory`] and the
//! core drives them through [`NativeEngine`].
//!
//! # Threading
//!
//! Engines are owned by exactly one session task and are only ever called
//! from it. Asynchronous engine callbacks are delivered through the
//! [`EngineListener`] given at construction; the core re-serializes them onto
//! the owning session before touching any state, so listeners may be invoked
//! from any host thread.
//!
//! # Example
//!
//! ```ignore
//! use bridge_traits::engine::{EngineFactory, EngineKind, EngineListener};
//!
//! fn build(factory: &dyn EngineFactory, listener: Arc<dyn EngineListener>) {
//!     let engine = factory.create(EngineKind::MediaPlayer, listener)?;
//!     // engine.prepare(&source).await ...
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::{error::Result, media::MediaSource};

/// Host platform family. Selects the backend candidates and scrub behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Android,
    Apple,
}

/// Streaming protocol an ExoPlayer media source is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamProtocol {
    Progressive,
    Hls,
    Dash,
    SmoothStreaming,
}

/// Concrete engine type a factory can construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    ExoPlayer(StreamProtocol),
    MediaPlayer,
    AvPlayer,
    AvAudioPlayer,
}

impl EngineKind {
    pub fn name(&self) -> &'static str {
        match self {
            EngineKind::ExoPlayer(StreamProtocol::Progressive) => "exoplayer-default",
            EngineKind::ExoPlayer(StreamProtocol::Hls) => "exoplayer-hls",
            EngineKind::ExoPlayer(StreamProtocol::Dash) => "exoplayer-dash",
            EngineKind::ExoPlayer(StreamProtocol::SmoothStreaming) => "exoplayer-smoothstreaming",
            EngineKind::MediaPlayer => "mediaplayer",
            EngineKind::AvPlayer => "avplayer",
            EngineKind::AvAudioPlayer => "avaudioplayer",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Broad cause reported by the host alongside an engine failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// Connection, DNS or socket level failure
    Transport,
    /// The server answered with an error status
    Http,
    /// The engine cannot handle this container or protocol
    UnsupportedFormat,
    /// The stream was reached but could not be decoded
    Decoder,
    Other,
}

/// Raw failure as reported by a native engine, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineFailure {
    pub cause: FailureCause,
    /// HTTP response code when the host could extract one
    pub http_status: Option<u16>,
    pub message: String,
}

impl EngineFailure {
    pub fn new(cause: FailureCause, message: impl Into<String>) -> Self {
        Self {
            cause,
            http_status: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }
}

impl fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.http_status {
            Some(status) => write!(f, "{:?} (HTTP {}): {}", self.cause, status, self.message),
            None => write!(f, "{:?}: {}", self.cause, self.message),
        }
    }
}

impl std::error::Error for EngineFailure {}

/// Asynchronous signal raised by an engine after construction.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineSignal {
    Buffering(bool),
    /// Playback reached the end of the source
    Completed,
    Failed(EngineFailure),
}

/// Receives engine signals. Registered once, when the engine is created.
pub trait EngineListener: Send + Sync {
    fn on_signal(&self, signal: EngineSignal);
}

/// A single platform media engine instance.
///
/// `release` must be safe to call after a failed `prepare`; the core calls
/// it exactly once for every engine it obtained from a factory.
#[async_trait]
pub trait NativeEngine: Send {
    fn kind(&self) -> EngineKind;

    /// Open `source` and resolve once the engine can report its duration
    /// and accept `play`. Returns the duration in milliseconds when known.
    ///
    /// No timeout is applied by the core; a source that never becomes
    /// ready keeps this future pending.
    async fn prepare(
        &mut self,
        source: &MediaSource,
    ) -> std::result::Result<Option<u64>, EngineFailure>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    fn seek_to(&mut self, position_ms: u64) -> Result<()>;

    /// Volume in `[0.0, 1.0]`
    fn set_volume(&mut self, volume: f64) -> Result<()>;

    /// Playback rate; negative values are only passed to engines whose
    /// platform supports reverse playback.
    fn set_rate(&mut self, rate: f64) -> Result<()>;

    fn set_looping(&mut self, looping: bool) -> Result<()>;

    /// Live read of the playhead.
    fn position_ms(&self) -> u64;

    /// Live read of the engine's playing flag.
    fn is_playing(&self) -> bool;

    fn release(&mut self);
}

/// Constructs engines of a given kind.
pub trait EngineFactory: Send + Sync {
    fn create(
        &self,
        kind: EngineKind,
        listener: Arc<dyn EngineListener>,
    ) -> Result<Box<dyn NativeEngine>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_kind_names() {
        assert_eq!(EngineKind::ExoPlayer(StreamProtocol::Hls).to_string(), "exoplayer-hls");
        assert_eq!(EngineKind::MediaPlayer.name(), "mediaplayer");
    }

    #[test]
    fn test_engine_failure_display() {
        let failure = EngineFailure::new(FailureCause::Http, "Response code: 404").with_status(404);
        assert_eq!(failure.to_string(), "Http (HTTP 404): Response code: 404");

        let failure = EngineFailure::new(FailureCause::Transport, "Unable to connect");
        assert_eq!(failure.http_status, None);
        assert!(failure.to_string().starts_with("Transport"));
    }
}
