//! # Media Session Core
//!
//! Per-id player sessions over platform media engines.
//!
//! ## Overview
//!
//! - [`engine`] - backend candidates, the [`EngineAdapter`] over a native
//!   engine, and the sequential backend probe ([`PlayerFinder`])
//! - [`player`] - the session task and its [`PlayerHandle`]
//! - [`interruption`] - phone-call / audio-focus policy and the per-session
//!   reaction rules
//! - [`notification`] - the single notification slot and artwork loading
//! - [`registry`] - lifecycle root mapping player ids to sessions
//!
//! ## Usage
//!
//! ```ignore
//! use core_playback::{OpenRequest, SessionRegistry};
//! use bridge_traits::{AudioType, MediaSource};
//!
//! let registry = SessionRegistry::bootstrap(&config).await?;
//! let player = registry.get_or_create("a");
//!
//! let request = OpenRequest::new(MediaSource::new(AudioType::Asset, "assets/song.mp3"))
//!     .volume(0.5);
//! let duration_ms = player.open(request).await?;
//! ```
//!
//! Session callbacks are published on the registry's
//! [`EventBus`](core_runtime::events::EventBus).

pub mod engine;
pub mod error;
pub mod interruption;
pub mod notification;
pub mod player;
pub mod registry;
pub mod types;

pub use engine::{
    candidates_for, BackendCandidate, EngineAdapter, PlatformCapabilities, PlayerFinder,
    ProbeOutcome, ScrubStyle,
};
pub use error::{EngineError, PlaybackError, ProbeAttempt, Result};
pub use interruption::{AudioState, InterruptionGuard, InterruptionPolicy};
pub use notification::{NotificationBridge, NotificationUpdate};
pub use player::{PlayerContext, PlayerHandle};
pub use registry::SessionRegistry;
pub use types::{OpenRequest, PlayerSnapshot, PlayerState};
