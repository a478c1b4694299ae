//! # Desktop Bridge Implementations
//!
//! Bridge implementations for desktop and headless hosts (macOS, Windows,
//! Linux, CI).
//!
//! ## Overview
//!
//! - `ImageLoader` using `reqwest`, `tokio::fs` and the `image` crate
//! - `RingerModeProvider` with a host-settable mode (desktops have no
//!   silent switch)
//! - `TelephonyMonitor` / `AudioFocusManager` driven through channels, for
//!   hosts that simulate calls and focus loss
//! - `EngineFactory` producing simulated engines on the tokio clock, for
//!   hosts without a native media engine and for tests
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ChannelTelephonyMonitor, HttpImageLoader, SimulatedEngineFactory};
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .engine_factory(Arc::new(SimulatedEngineFactory::new()))
//!     .telephony(Arc::new(ChannelTelephonyMonitor::new()))
//!     .image_loader(Arc::new(HttpImageLoader::new()))
//!     .build()?;
//! ```

mod artwork;
mod simulated;
mod system;

pub use artwork::{decode_artwork, HttpImageLoader};
pub use simulated::{SimulatedEngineFactory, SimulatedEngineHandle, SimulatedOutcome};
pub use system::{ChannelAudioFocusManager, ChannelTelephonyMonitor, FixedRingerMode};
