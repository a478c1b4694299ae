//! # Host Bridge Traits
//!
//! Contracts between the media-session core and the host platform.
//!
//! ## Overview
//!
//! The core owns session state, backend selection and interruption policy.
//! Everything that touches a platform API (media engines, the notification
//! surface, telephony, audio focus, image decoding) sits behind a trait in
//! this crate and is injected by the host at bootstrap.
//!
//! ## Traits
//!
//! ### Playback
//! - [`EngineFactory`](engine::EngineFactory) / [`NativeEngine`](engine::NativeEngine) - Platform media engines
//! - [`EngineListener`](engine::EngineListener) - Buffering/completion/failure signals
//!
//! ### Media Session
//! - [`NotificationSurface`](notification::NotificationSurface) - Media notification and remote controls
//! - [`ImageLoader`](image::ImageLoader) - Artwork for the notification
//!
//! ### Interruptions & Device State
//! - [`TelephonyMonitor`](interruption::TelephonyMonitor) - Phone call state
//! - [`AudioFocusManager`](interruption::AudioFocusManager) - Audio focus / session interruptions
//! - [`RingerModeProvider`](system::RingerModeProvider) - Silent switch
//! - [`AudioSessionConfigurator`](system::AudioSessionConfigurator) - Apple audio session category
//!
//! ### Utilities
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation | Status |
//! |----------|----------------|--------|
//! | Desktop  | `bridge-desktop` (simulated engine) | ✅ |
//! | Android  | Host glue (ExoPlayer, MediaPlayer) | 📋 Planned |
//! | Apple    | Host glue (AVPlayer, AVAudioPlayer) | 📋 Planned |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Engine open
//! failures use [`EngineFailure`](engine::EngineFailure) instead so the core
//! can classify them.
//!
//! ## Thread Safety
//!
//! Shared bridges require `Send + Sync`. Engines only require `Send`: each
//! one is owned by a single session task.

pub mod engine;
pub mod error;
pub mod image;
pub mod interruption;
pub mod logging;
pub mod media;
pub mod notification;
pub mod system;

pub use error::BridgeError;

// Re-export commonly used types
pub use engine::{
    EngineFactory, EngineFailure, EngineKind, EngineListener, EngineSignal, FailureCause,
    NativeEngine, Platform, StreamProtocol,
};
pub use image::{Artwork, ImageLoader};
pub use interruption::{AudioFocusManager, CallState, CallStateStream, FocusChange, FocusChangeStream, TelephonyMonitor};
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use media::{AudioMetas, AudioType, ImageRef, ImageType, MediaSource};
pub use notification::{
    MediaButton, NotificationContent, NotificationControl, NotificationSettings,
    NotificationSurface, PlaybackPosition, RemoteAction,
};
pub use system::{AudioSessionCategory, AudioSessionConfigurator, RingerMode, RingerModeProvider};
