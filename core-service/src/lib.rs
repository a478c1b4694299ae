//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridges into the media-session core and
//! exposes the typed call surface the host channel layer dispatches into.
//! Hosts without native engines (desktop tools, CI) enable the
//! `desktop-shims` feature, which depends on `bridge-desktop` and provides
//! [`bootstrap_headless`].

pub mod call;
pub mod error;

pub use call::{CallOutcome, PlayerCall};
pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{MediaButton, RemoteAction};
use core_playback::SessionRegistry;
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use tracing::{debug, info, instrument};

#[cfg(feature = "desktop-shims")]
use bridge_traits::Platform;
#[cfg(feature = "desktop-shims")]
use core_runtime::config::InterruptionStrategy;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    registry: Arc<SessionRegistry>,
}

impl CoreService {
    /// Start the core from a validated configuration.
    #[instrument(skip(config), fields(platform = ?config.platform))]
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        let registry = SessionRegistry::bootstrap(&config)
            .await
            .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;
        info!("Core service started");
        Ok(Self {
            registry: Arc::new(registry),
        })
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn event_bus(&self) -> &EventBus {
        self.registry.events()
    }

    /// New subscription to every session's events.
    pub fn events(&self) -> EventStream {
        EventStream::new(self.registry.events().subscribe())
    }

    /// Run `call` on the session `player_id`, creating the session on first use.
    #[instrument(skip(self, call), fields(method = call.method()))]
    pub async fn dispatch(&self, player_id: &str, call: PlayerCall) -> Result<CallOutcome> {
        let player = self.registry.get_or_create(player_id);
        debug!("Dispatching call");

        let outcome = match call {
            PlayerCall::Open(request) => CallOutcome::Opened {
                duration_ms: player.open(*request).await?,
            },
            PlayerCall::Play => {
                player.play().await?;
                CallOutcome::Done
            }
            PlayerCall::Pause => {
                player.pause().await?;
                CallOutcome::Done
            }
            PlayerCall::Toggle => {
                player.toggle().await?;
                CallOutcome::Done
            }
            PlayerCall::Stop => {
                player.stop().await?;
                CallOutcome::Done
            }
            PlayerCall::Seek { to_ms } => {
                player.seek(to_ms).await?;
                CallOutcome::Done
            }
            PlayerCall::SeekBy { by_ms } => {
                player.seek_by(by_ms).await?;
                CallOutcome::Done
            }
            PlayerCall::Volume { volume } => {
                player.set_volume(volume).await?;
                CallOutcome::Done
            }
            PlayerCall::PlaySpeed { speed } => {
                player.set_play_speed(speed).await?;
                CallOutcome::Done
            }
            PlayerCall::ForwardRewind { speed } => {
                player.forward_rewind(speed).await?;
                CallOutcome::Done
            }
            PlayerCall::Loop { looping } => {
                player.set_looping(looping).await?;
                CallOutcome::Done
            }
            PlayerCall::OnAudioUpdated { path, metas } => {
                player.on_audio_updated(path, metas).await?;
                CallOutcome::Done
            }
            PlayerCall::ShowNotification { show } => {
                player.show_notification(show).await?;
                CallOutcome::Done
            }
            PlayerCall::Next => {
                player.next().await?;
                CallOutcome::Done
            }
            PlayerCall::Prev => {
                player.prev().await?;
                CallOutcome::Done
            }
            PlayerCall::IsPlaying => CallOutcome::IsPlaying {
                playing: player.is_playing().await?,
            },
            PlayerCall::Snapshot => CallOutcome::Snapshot(Box::new(player.snapshot().await?)),
        };
        Ok(outcome)
    }

    /// Notification action reported by the host surface.
    pub async fn remote_action(&self, player_id: &str, action: RemoteAction) -> Result<()> {
        Ok(self.registry.handle_remote_action(player_id, action).await?)
    }

    /// Headset or lock-screen button; routed to the notification owner.
    pub async fn media_button(&self, button: MediaButton) -> Result<()> {
        Ok(self.registry.handle_media_button(button).await?)
    }

    /// Stop `player_id` silently and forget it.
    pub async fn release(&self, player_id: &str) -> Result<()> {
        Ok(self.registry.remove(player_id).await?)
    }

    /// Plugin teardown: hide the notification and stop every session.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("registry", &self.registry)
            .finish()
    }
}

/// Convenience bootstrapper for hosts without native engines.
///
/// Sessions play on simulated engines driven by the tokio clock and are never
/// interrupted.
///
/// ```
/// # #[cfg(feature = "desktop-shims")]
/// # async fn example() -> core_service::Result<()> {
/// use bridge_traits::Platform;
/// use core_service::{bootstrap_headless, PlayerCall};
///
/// let core = bootstrap_headless(Platform::Android).await?;
/// let playing = core.dispatch("main", PlayerCall::IsPlaying).await?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_headless(platform: Platform) -> Result<CoreService> {
    let config = CoreConfig::builder()
        .platform(platform)
        .engine_factory(Arc::new(bridge_desktop::SimulatedEngineFactory::new()))
        .interruption_strategy(InterruptionStrategy::Disabled)
        .build()?;
    CoreService::bootstrap(config).await
}
