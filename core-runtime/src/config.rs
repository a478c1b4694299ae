//! # Core Configuration Module
//!
//! Builder for [`CoreConfig`]: the host bridges plus playback tuning.
//!
//! ## Overview
//!
//! The builder enforces fail-fast validation so a host discovers a missing
//! bridge at bootstrap instead of at the first phone call.
//!
//! ## Required Dependencies
//!
//! - `EngineFactory` - constructs native media engines
//!
//! ## Optional Dependencies
//!
//! - `NotificationSurface` - media notification / remote controls
//! - `ImageLoader` - notification artwork (desktop default: `HttpImageLoader`)
//! - `TelephonyMonitor` - required by `InterruptionStrategy::PhoneState`/`Both`
//! - `AudioFocusManager` - required by `InterruptionStrategy::AudioFocus`/`Both`
//! - `RingerModeProvider` - silent-mode handling (desktop default: always normal)
//! - `AudioSessionConfigurator` - Apple audio session category
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, InterruptionStrategy};
//! use bridge_traits::Platform;
//!
//! let config = CoreConfig::builder()
//!     .platform(Platform::Android)
//!     .engine_factory(Arc::new(ExoEngineFactory::new(context)))
//!     .notification_surface(Arc::new(MediaNotification::new(context)))
//!     .telephony(Arc::new(PhoneStateMonitor::new(context)))
//!     .interruption_strategy(InterruptionStrategy::PhoneState)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    AudioFocusManager, AudioSessionConfigurator, EngineFactory, ImageLoader, NotificationSurface,
    Platform, RingerModeProvider, TelephonyMonitor,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Which system signals pause and duck playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionStrategy {
    /// Telephony call state only
    PhoneState,
    /// Audio focus / audio session interruptions only
    AudioFocus,
    /// Both sources; the latest transition wins
    Both,
    /// Sessions are always authorized to play
    Disabled,
}

impl Default for InterruptionStrategy {
    fn default() -> Self {
        InterruptionStrategy::PhoneState
    }
}

impl InterruptionStrategy {
    pub fn uses_telephony(&self) -> bool {
        matches!(self, InterruptionStrategy::PhoneState | InterruptionStrategy::Both)
    }

    pub fn uses_audio_focus(&self) -> bool {
        matches!(self, InterruptionStrategy::AudioFocus | InterruptionStrategy::Both)
    }
}

/// Timing and volume constants of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackTuning {
    /// Interval of the position tick while playing
    #[serde(default = "default_position_poll_interval_ms")]
    pub position_poll_interval_ms: u64,

    /// Interval of the stepped forward/rewind driver
    #[serde(default = "default_scrub_tick_ms")]
    pub scrub_tick_ms: u64,

    /// Fraction of the session volume applied while ducked
    #[serde(default = "default_reduced_volume_fraction")]
    pub reduced_volume_fraction: f64,
}

fn default_position_poll_interval_ms() -> u64 {
    300
}

fn default_scrub_tick_ms() -> u64 {
    300
}

fn default_reduced_volume_fraction() -> f64 {
    0.3
}

impl Default for PlaybackTuning {
    fn default() -> Self {
        Self {
            position_poll_interval_ms: default_position_poll_interval_ms(),
            scrub_tick_ms: default_scrub_tick_ms(),
            reduced_volume_fraction: default_reduced_volume_fraction(),
        }
    }
}

impl PlaybackTuning {
    pub fn position_poll_interval(&self) -> Duration {
        Duration::from_millis(self.position_poll_interval_ms)
    }

    pub fn scrub_tick(&self) -> Duration {
        Duration::from_millis(self.scrub_tick_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.position_poll_interval_ms == 0 {
            return Err(Error::Config(
                "Position poll interval must be greater than 0 ms".to_string(),
            ));
        }

        if self.scrub_tick_ms == 0 {
            return Err(Error::Config(
                "Scrub tick must be greater than 0 ms".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.reduced_volume_fraction) {
            return Err(Error::Config(format!(
                "Reduced volume fraction must be within [0, 1], got {}",
                self.reduced_volume_fraction
            )));
        }

        Ok(())
    }
}

/// Host bridges and settings for the media-session core.
#[derive(Clone)]
pub struct CoreConfig {
    pub platform: Platform,

    /// Native engine constructor (required)
    pub engine_factory: Arc<dyn EngineFactory>,

    pub notification_surface: Option<Arc<dyn NotificationSurface>>,

    pub image_loader: Option<Arc<dyn ImageLoader>>,

    pub telephony: Option<Arc<dyn TelephonyMonitor>>,

    pub audio_focus: Option<Arc<dyn AudioFocusManager>>,

    pub ringer: Option<Arc<dyn RingerModeProvider>>,

    pub audio_session: Option<Arc<dyn AudioSessionConfigurator>>,

    pub interruption_strategy: InterruptionStrategy,

    pub tuning: PlaybackTuning,

    /// Per-subscriber buffer of the event bus
    pub event_buffer: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("platform", &self.platform)
            .field("has_notification_surface", &self.notification_surface.is_some())
            .field("has_image_loader", &self.image_loader.is_some())
            .field("has_telephony", &self.telephony.is_some())
            .field("has_audio_focus", &self.audio_focus.is_some())
            .field("has_ringer", &self.ringer.is_some())
            .field("has_audio_session", &self.audio_session.is_some())
            .field("interruption_strategy", &self.interruption_strategy)
            .field("tuning", &self.tuning)
            .field("event_buffer", &self.event_buffer)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates tuning values and that the interruption strategy has the
    /// bridges it needs.
    pub fn validate(&self) -> Result<()> {
        self.tuning.validate()?;

        if self.event_buffer == 0 {
            return Err(Error::Config(
                "Event buffer must hold at least one event".to_string(),
            ));
        }

        if self.interruption_strategy.uses_telephony() && self.telephony.is_none() {
            return Err(capability_missing(
                "TelephonyMonitor",
                "The interruption strategy listens to call state but no TelephonyMonitor was provided. \
                 Android: inject a PhoneStateListener adapter. \
                 Otherwise select InterruptionStrategy::AudioFocus or Disabled.",
            ));
        }

        if self.interruption_strategy.uses_audio_focus() && self.audio_focus.is_none() {
            return Err(capability_missing(
                "AudioFocusManager",
                "The interruption strategy listens to audio focus but no AudioFocusManager was provided. \
                 Android: inject an AudioManager adapter. Apple: inject an AVAudioSession adapter.",
            ));
        }

        Ok(())
    }
}

fn capability_missing(capability: &str, message: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: message.to_string(),
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    platform: Option<Platform>,
    engine_factory: Option<Arc<dyn EngineFactory>>,
    notification_surface: Option<Arc<dyn NotificationSurface>>,
    image_loader: Option<Arc<dyn ImageLoader>>,
    telephony: Option<Arc<dyn TelephonyMonitor>>,
    audio_focus: Option<Arc<dyn AudioFocusManager>>,
    ringer: Option<Arc<dyn RingerModeProvider>>,
    audio_session: Option<Arc<dyn AudioSessionConfigurator>>,
    interruption_strategy: Option<InterruptionStrategy>,
    tuning: Option<PlaybackTuning>,
    event_buffer: Option<usize>,
}

impl CoreConfigBuilder {
    /// Host platform family (default: Android).
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn engine_factory(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.engine_factory = Some(factory);
        self
    }

    pub fn notification_surface(mut self, surface: Arc<dyn NotificationSurface>) -> Self {
        self.notification_surface = Some(surface);
        self
    }

    pub fn image_loader(mut self, loader: Arc<dyn ImageLoader>) -> Self {
        self.image_loader = Some(loader);
        self
    }

    pub fn telephony(mut self, telephony: Arc<dyn TelephonyMonitor>) -> Self {
        self.telephony = Some(telephony);
        self
    }

    pub fn audio_focus(mut self, audio_focus: Arc<dyn AudioFocusManager>) -> Self {
        self.audio_focus = Some(audio_focus);
        self
    }

    pub fn ringer(mut self, ringer: Arc<dyn RingerModeProvider>) -> Self {
        self.ringer = Some(ringer);
        self
    }

    pub fn audio_session(mut self, audio_session: Arc<dyn AudioSessionConfigurator>) -> Self {
        self.audio_session = Some(audio_session);
        self
    }

    /// Interruption sources (default: phone state).
    pub fn interruption_strategy(mut self, strategy: InterruptionStrategy) -> Self {
        self.interruption_strategy = Some(strategy);
        self
    }

    pub fn tuning(mut self, tuning: PlaybackTuning) -> Self {
        self.tuning = Some(tuning);
        self
    }

    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = Some(capacity);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when the engine factory, or a bridge
    ///   required by the interruption strategy, is absent
    /// - [`Error::Config`] for out-of-range tuning values
    pub fn build(self) -> Result<CoreConfig> {
        let engine_factory = self.engine_factory.ok_or_else(|| {
            capability_missing(
                "EngineFactory",
                "An EngineFactory is required to construct native engines. \
                 Android: inject the ExoPlayer/MediaPlayer factory. Apple: inject the AVPlayer factory. \
                 Headless: use bridge_desktop::SimulatedEngineFactory.",
            )
        })?;

        let config = CoreConfig {
            platform: self.platform.unwrap_or(Platform::Android),
            engine_factory,
            notification_surface: self.notification_surface,
            image_loader: self.image_loader.or_else(provide_default_image_loader),
            telephony: self.telephony,
            audio_focus: self.audio_focus,
            ringer: self.ringer.or_else(provide_default_ringer),
            audio_session: self.audio_session,
            interruption_strategy: self.interruption_strategy.unwrap_or_default(),
            tuning: self.tuning.unwrap_or_default(),
            event_buffer: self
                .event_buffer
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_image_loader() -> Option<Arc<dyn ImageLoader>> {
    let loader: Arc<dyn ImageLoader> = Arc::new(bridge_desktop::HttpImageLoader::new());
    Some(loader)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_image_loader() -> Option<Arc<dyn ImageLoader>> {
    None
}

#[cfg(feature = "desktop-shims")]
fn provide_default_ringer() -> Option<Arc<dyn RingerModeProvider>> {
    let ringer: Arc<dyn RingerModeProvider> = Arc::new(bridge_desktop::FixedRingerMode::normal());
    Some(ringer)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_ringer() -> Option<Arc<dyn RingerModeProvider>> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{CallState, CallStateStream, EngineKind, EngineListener, NativeEngine};
    use mockall::mock;

    mock! {
        Factory {}
        impl EngineFactory for Factory {
            fn create(
                &self,
                kind: EngineKind,
                listener: Arc<dyn EngineListener>,
            ) -> BridgeResult<Box<dyn NativeEngine>>;
        }
    }

    mock! {
        Telephony {}
        #[async_trait]
        impl TelephonyMonitor for Telephony {
            async fn call_state(&self) -> BridgeResult<CallState>;
            async fn subscribe_changes(&self) -> BridgeResult<Box<dyn CallStateStream>>;
        }
    }

    fn factory() -> Arc<dyn EngineFactory> {
        Arc::new(MockFactory::new())
    }

    #[test]
    fn test_builder_requires_engine_factory() {
        let result = CoreConfig::builder()
            .interruption_strategy(InterruptionStrategy::Disabled)
            .build();

        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "EngineFactory")
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_phone_state_strategy_requires_telephony() {
        let result = CoreConfig::builder().engine_factory(factory()).build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("TelephonyMonitor"));
    }

    #[test]
    fn test_audio_focus_strategy_requires_focus_manager() {
        let result = CoreConfig::builder()
            .engine_factory(factory())
            .telephony(Arc::new(MockTelephony::new()))
            .interruption_strategy(InterruptionStrategy::Both)
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("AudioFocusManager"));
    }

    #[test]
    fn test_build_with_defaults() {
        let config = CoreConfig::builder()
            .engine_factory(factory())
            .telephony(Arc::new(MockTelephony::new()))
            .build()
            .unwrap();

        assert_eq!(config.platform, Platform::Android);
        assert_eq!(config.interruption_strategy, InterruptionStrategy::PhoneState);
        assert_eq!(config.tuning.position_poll_interval(), Duration::from_millis(300));
        assert_eq!(config.tuning.scrub_tick(), Duration::from_millis(300));
        assert_eq!(config.tuning.reduced_volume_fraction, 0.3);
        assert_eq!(config.event_buffer, crate::events::DEFAULT_EVENT_BUFFER_SIZE);
    }

    #[test]
    fn test_invalid_tuning_is_rejected() {
        let tuning = PlaybackTuning {
            reduced_volume_fraction: 1.5,
            ..Default::default()
        };
        let result = CoreConfig::builder()
            .engine_factory(factory())
            .interruption_strategy(InterruptionStrategy::Disabled)
            .tuning(tuning)
            .build();

        assert!(matches!(result, Err(Error::Config(_))));

        let zero_poll = PlaybackTuning {
            position_poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(zero_poll.validate().is_err());
    }

    #[test]
    fn test_tuning_deserializes_with_defaults() {
        let tuning: PlaybackTuning = serde_json::from_str(r#"{"scrub_tick_ms": 100}"#).unwrap();
        assert_eq!(tuning.scrub_tick_ms, 100);
        assert_eq!(tuning.position_poll_interval_ms, 300);
    }

    #[test]
    fn test_strategy_sources() {
        assert!(InterruptionStrategy::Both.uses_telephony());
        assert!(InterruptionStrategy::Both.uses_audio_focus());
        assert!(!InterruptionStrategy::Disabled.uses_telephony());
        assert!(!InterruptionStrategy::PhoneState.uses_audio_focus());
    }
}
