//! # Session Registry
//!
//! Lifecycle root of all sessions. Owns the shared [`PlayerContext`], creates
//! a session on the first reference to an id, and routes notification and
//! media-button input to the session it belongs to.

use bridge_traits::{MediaButton, RemoteAction};
use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::engine::PlayerFinder;
use crate::error::{PlaybackError, Result};
use crate::interruption::InterruptionPolicy;
use crate::notification::NotificationBridge;
use crate::player::{PlayerContext, PlayerHandle};

/// Map of live sessions keyed by player id.
pub struct SessionRegistry {
    ctx: Arc<PlayerContext>,
    sessions: RwLock<HashMap<String, PlayerHandle>>,
}

impl SessionRegistry {
    /// Build the shared context from `config` and start the interruption
    /// policy.
    #[instrument(skip(config), fields(platform = ?config.platform, strategy = ?config.interruption_strategy))]
    pub async fn bootstrap(config: &CoreConfig) -> Result<Self> {
        let interruption = InterruptionPolicy::new(
            config.interruption_strategy,
            config.telephony.clone(),
            config.audio_focus.clone(),
        );
        interruption.start().await?;

        let ctx = PlayerContext {
            finder: Arc::new(PlayerFinder::new(
                Arc::clone(&config.engine_factory),
                config.platform,
            )),
            interruption,
            notifications: NotificationBridge::new(
                config.notification_surface.clone(),
                config.image_loader.clone(),
            ),
            ringer: config.ringer.clone(),
            audio_session: config.audio_session.clone(),
            events: EventBus::new(config.event_buffer),
            tuning: config.tuning.clone(),
            platform: config.platform,
        };

        info!("Session registry ready");
        Ok(Self::with_context(Arc::new(ctx)))
    }

    pub fn with_context(ctx: Arc<PlayerContext>) -> Self {
        Self {
            ctx,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &Arc<PlayerContext> {
        &self.ctx
    }

    pub fn events(&self) -> &EventBus {
        &self.ctx.events
    }

    /// Session for `player_id`, spawned on first use.
    pub fn get_or_create(&self, player_id: &str) -> PlayerHandle {
        if let Some(handle) = self.get(player_id) {
            return handle;
        }

        let mut sessions = self.sessions.write();
        match sessions.get(player_id) {
            Some(handle) if handle.is_alive() => handle.clone(),
            _ => {
                debug!(player_id, "Creating session");
                let handle = PlayerHandle::spawn(player_id, Arc::clone(&self.ctx));
                sessions.insert(player_id.to_string(), handle.clone());
                handle
            }
        }
    }

    pub fn get(&self, player_id: &str) -> Option<PlayerHandle> {
        self.sessions
            .read()
            .get(player_id)
            .filter(|handle| handle.is_alive())
            .cloned()
    }

    /// Stop the session silently and forget it.
    pub async fn remove(&self, player_id: &str) -> Result<()> {
        let handle = self
            .sessions
            .write()
            .remove(player_id)
            .ok_or_else(|| PlaybackError::UnknownSession(player_id.to_string()))?;
        handle.shutdown().await
    }

    pub fn player_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Route a notification action to the session that displayed it.
    pub async fn handle_remote_action(&self, player_id: &str, action: RemoteAction) -> Result<()> {
        let handle = self
            .get(player_id)
            .ok_or_else(|| PlaybackError::UnknownSession(player_id.to_string()))?;
        handle.remote_action(action).await
    }

    /// Route a media button to the session owning the notification.
    pub async fn handle_media_button(&self, button: MediaButton) -> Result<()> {
        let Some(owner) = self.ctx.notifications.owner() else {
            debug!(?button, "Media button without a notification owner");
            return Ok(());
        };
        let handle = self
            .get(&owner)
            .ok_or_else(|| PlaybackError::UnknownSession(owner.clone()))?;

        match button {
            MediaButton::Play | MediaButton::Pause | MediaButton::PlayOrPause => {
                handle.remote_action(RemoteAction::Toggle).await
            }
            MediaButton::Next => handle.next().await,
            MediaButton::Prev => handle.prev().await,
            MediaButton::Stop => handle.stop().await,
        }
    }

    /// Hide the notification, stop every session and the interruption policy.
    pub async fn shutdown(&self) {
        self.ctx.notifications.hide_all();

        let sessions: Vec<(String, PlayerHandle)> = self.sessions.write().drain().collect();
        let results = join_all(sessions.iter().map(|(_, handle)| handle.shutdown())).await;
        for ((player_id, _), result) in sessions.iter().zip(results) {
            if let Err(err) = result {
                warn!(player_id = %player_id, error = %err, "Session shutdown failed");
            }
        }

        self.ctx.interruption.shutdown().await;
        info!("Session registry shut down");
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.player_ids())
            .field("ctx", &self.ctx)
            .finish()
    }
}
