//! # Notification Bridge
//!
//! Owns the single notification slot of the process and decides which
//! session it shows.
//!
//! The last session to show wins the slot. Position updates and hides from
//! any other session are ignored, so a stale session can never clear or
//! overwrite what the owner displays.
//!
//! Artwork is loaded in the background. The surface is rendered at once
//! without artwork (or with the cached artwork of the same image) and
//! rendered again when the image arrives, provided the same image is still
//! displayed.

use bridge_traits::{
    Artwork, AudioMetas, ImageLoader, ImageRef, NotificationContent, NotificationSettings,
    NotificationSurface, PlaybackPosition,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a session wants the notification to display.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationUpdate {
    pub player_id: String,
    pub is_playing: bool,
    pub metas: AudioMetas,
    pub settings: NotificationSettings,
    pub duration_ms: u64,
    pub play_speed: f64,
}

impl NotificationUpdate {
    fn render(self, artwork: Option<Artwork>) -> NotificationContent {
        let duration_ms = (self.settings.seek_bar_enabled && self.duration_ms > 0)
            .then_some(self.duration_ms);
        NotificationContent {
            player_id: self.player_id,
            is_playing: self.is_playing,
            metas: self.metas,
            settings: self.settings,
            duration_ms,
            playback_speed: if self.is_playing { self.play_speed } else { 0.0 },
            artwork,
        }
    }
}

#[derive(Default)]
struct Slot {
    owner: Option<String>,
    shown: Option<NotificationContent>,
    artwork: Option<(ImageRef, Artwork)>,
    pending: Option<ImageRef>,
}

impl Slot {
    fn cached_artwork(&self, image: Option<&ImageRef>) -> Option<Artwork> {
        match (&self.artwork, image) {
            (Some((cached, artwork)), Some(image)) if cached == image => Some(artwork.clone()),
            _ => None,
        }
    }
}

struct Inner {
    surface: Option<Arc<dyn NotificationSurface>>,
    loader: Option<Arc<dyn ImageLoader>>,
    slot: Mutex<Slot>,
}

/// Shared handle to the notification slot. Clones share the slot.
#[derive(Clone)]
pub struct NotificationBridge {
    inner: Arc<Inner>,
}

impl NotificationBridge {
    pub fn new(
        surface: Option<Arc<dyn NotificationSurface>>,
        loader: Option<Arc<dyn ImageLoader>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                surface,
                loader,
                slot: Mutex::new(Slot::default()),
            }),
        }
    }

    /// Bridge without a surface; every call is a no-op.
    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.surface.is_some()
    }

    /// Session currently owning the slot.
    pub fn owner(&self) -> Option<String> {
        self.inner.slot.lock().owner.clone()
    }

    /// Show `update`, taking ownership of the slot.
    pub fn show(&self, update: NotificationUpdate) {
        let Some(surface) = &self.inner.surface else {
            return;
        };

        let image = update.metas.image.clone();
        let mut slot = self.inner.slot.lock();
        let artwork = slot.cached_artwork(image.as_ref());
        let needs_load = image.is_some() && artwork.is_none() && slot.pending != image;

        slot.owner = Some(update.player_id.clone());
        let content = update.render(artwork);
        // Rendered under the lock so concurrent shows cannot reorder.
        if let Err(err) = surface.show(&content) {
            warn!(player_id = %content.player_id, error = %err, "Notification show failed");
        }
        slot.shown = Some(content);

        if let (true, Some(image)) = (needs_load, image) {
            slot.pending = Some(image.clone());
            drop(slot);
            self.load_artwork(image);
        }
    }

    fn load_artwork(&self, image: ImageRef) {
        let Some(loader) = self.inner.loader.clone() else {
            self.inner.slot.lock().pending = None;
            return;
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = loader.get_bitmap(&image).await;

            let mut slot = inner.slot.lock();
            if slot.pending.as_ref() == Some(&image) {
                slot.pending = None;
            }

            let artwork = match result {
                Ok(artwork) => artwork,
                Err(err) => {
                    warn!(path = %image.path, error = %err, "Artwork load failed, showing no artwork");
                    return;
                }
            };
            slot.artwork = Some((image.clone(), artwork.clone()));

            let Some(shown) = slot.shown.as_mut() else {
                return;
            };
            if shown.metas.image.as_ref() != Some(&image) {
                debug!(path = %image.path, "Artwork arrived for an image no longer shown");
                return;
            }
            shown.artwork = Some(artwork);
            if let Some(surface) = &inner.surface {
                if let Err(err) = surface.show(shown) {
                    warn!(player_id = %shown.player_id, error = %err, "Notification show failed");
                }
            }
        });
    }

    /// Refresh the live position. Ignored unless `player_id` owns the slot.
    pub fn update_position(&self, player_id: &str, position: PlaybackPosition) {
        let Some(surface) = &self.inner.surface else {
            return;
        };
        let slot = self.inner.slot.lock();
        if slot.owner.as_deref() != Some(player_id) {
            return;
        }
        if let Err(err) = surface.update_position(player_id, &position) {
            warn!(player_id, error = %err, "Notification position update failed");
        }
    }

    /// Hide the notification if `player_id` owns it.
    pub fn hide(&self, player_id: &str) {
        let mut slot = self.inner.slot.lock();
        if slot.owner.as_deref() != Some(player_id) {
            return;
        }
        self.clear(&mut slot);
    }

    /// Hide regardless of the owner.
    pub fn hide_all(&self) {
        let mut slot = self.inner.slot.lock();
        self.clear(&mut slot);
    }

    fn clear(&self, slot: &mut Slot) {
        slot.owner = None;
        slot.shown = None;
        slot.pending = None;
        if let Some(surface) = &self.inner.surface {
            if let Err(err) = surface.hide() {
                warn!(error = %err, "Notification hide failed");
            }
        }
    }
}

impl std::fmt::Debug for NotificationBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBridge")
            .field("enabled", &self.is_enabled())
            .field("owner", &self.owner())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{BridgeError, ImageType};
    use bytes::Bytes;
    use mockall::{mock, predicate::*, Sequence};
    use std::time::Duration;

    mock! {
        Surface {}
        impl NotificationSurface for Surface {
            fn show(&self, content: &NotificationContent) -> BridgeResult<()>;
            fn update_position(&self, player_id: &str, position: &PlaybackPosition) -> BridgeResult<()>;
            fn hide(&self) -> BridgeResult<()>;
        }
    }

    mock! {
        Loader {}
        #[async_trait]
        impl ImageLoader for Loader {
            async fn get_bitmap(&self, image: &ImageRef) -> BridgeResult<Artwork>;
        }
    }

    fn update(player_id: &str) -> NotificationUpdate {
        NotificationUpdate {
            player_id: player_id.to_string(),
            is_playing: true,
            metas: AudioMetas {
                title: Some("Song".to_string()),
                ..Default::default()
            },
            settings: NotificationSettings::default(),
            duration_ms: 10_000,
            play_speed: 1.0,
        }
    }

    fn cover() -> ImageRef {
        ImageRef::new(ImageType::Network, "https://example.com/cover.png")
    }

    fn artwork() -> Artwork {
        Artwork {
            bytes: Bytes::from_static(b"png"),
            width: 2,
            height: 2,
            mime_type: Some("image/png".to_string()),
        }
    }

    #[test]
    fn test_render_hides_seek_bar_for_zero_duration() {
        let mut livestream = update("a");
        livestream.duration_ms = 0;
        assert_eq!(livestream.render(None).duration_ms, None);

        let mut disabled = update("a");
        disabled.settings.seek_bar_enabled = false;
        assert_eq!(disabled.render(None).duration_ms, None);

        assert_eq!(update("a").render(None).duration_ms, Some(10_000));
    }

    #[test]
    fn test_render_paused_speed_is_zero() {
        let mut paused = update("a");
        paused.is_playing = false;
        assert_eq!(paused.render(None).playback_speed, 0.0);
    }

    #[test]
    fn test_last_show_wins_and_hide_requires_ownership() {
        let mut surface = MockSurface::new();
        surface.expect_show().times(2).returning(|_| Ok(()));
        surface.expect_hide().times(1).returning(|| Ok(()));

        let bridge = NotificationBridge::new(Some(Arc::new(surface)), None);
        bridge.show(update("a"));
        bridge.show(update("b"));
        assert_eq!(bridge.owner().as_deref(), Some("b"));

        bridge.hide("a");
        assert_eq!(bridge.owner().as_deref(), Some("b"));

        bridge.hide("b");
        assert_eq!(bridge.owner(), None);
    }

    #[test]
    fn test_position_updates_only_from_owner() {
        let mut surface = MockSurface::new();
        surface.expect_show().returning(|_| Ok(()));
        surface
            .expect_update_position()
            .withf(|player_id, _| player_id == "a")
            .times(1)
            .returning(|_, _| Ok(()));

        let bridge = NotificationBridge::new(Some(Arc::new(surface)), None);
        bridge.show(update("a"));

        let position = PlaybackPosition {
            is_playing: true,
            position_ms: 300,
            speed: 1.0,
        };
        bridge.update_position("a", position);
        bridge.update_position("b", position);
    }

    #[test]
    fn test_surface_errors_are_absorbed() {
        let mut surface = MockSurface::new();
        surface
            .expect_show()
            .returning(|_| Err(BridgeError::OperationFailed("no channel".to_string())));
        surface
            .expect_hide()
            .returning(|| Err(BridgeError::OperationFailed("gone".to_string())));

        let bridge = NotificationBridge::new(Some(Arc::new(surface)), None);
        bridge.show(update("a"));
        bridge.hide_all();
        assert_eq!(bridge.owner(), None);
    }

    #[test]
    fn test_disabled_bridge_is_noop() {
        let bridge = NotificationBridge::disabled();
        bridge.show(update("a"));
        assert!(!bridge.is_enabled());
        assert_eq!(bridge.owner(), None);
    }

    #[tokio::test]
    async fn test_artwork_rerenders_when_loaded() {
        let mut surface = MockSurface::new();
        let mut seq = Sequence::new();
        surface
            .expect_show()
            .withf(|content| content.artwork.is_none())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        surface
            .expect_show()
            .withf(|content| content.artwork == Some(artwork()))
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut loader = MockLoader::new();
        loader
            .expect_get_bitmap()
            .with(eq(cover()))
            .times(1)
            .returning(|_| Ok(artwork()));

        let bridge = NotificationBridge::new(Some(Arc::new(surface)), Some(Arc::new(loader)));
        let mut with_cover = update("a");
        with_cover.metas.image = Some(cover());
        bridge.show(with_cover.clone());

        tokio::time::sleep(Duration::from_millis(10)).await;

        // Cached now: rendered with artwork at once, no second load.
        bridge.show(with_cover);
    }

    #[tokio::test]
    async fn test_artwork_failure_keeps_plain_notification() {
        let mut surface = MockSurface::new();
        surface
            .expect_show()
            .withf(|content| content.artwork.is_none())
            .times(1)
            .returning(|_| Ok(()));

        let mut loader = MockLoader::new();
        loader
            .expect_get_bitmap()
            .returning(|_| Err(BridgeError::OperationFailed("404".to_string())));

        let bridge = NotificationBridge::new(Some(Arc::new(surface)), Some(Arc::new(loader)));
        let mut with_cover = update("a");
        with_cover.metas.image = Some(cover());
        bridge.show(with_cover);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(bridge.owner().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_late_artwork_for_replaced_image_is_not_shown() {
        let mut surface = MockSurface::new();
        surface
            .expect_show()
            .withf(|content| content.artwork.is_none())
            .times(2)
            .returning(|_| Ok(()));

        let mut loader = MockLoader::new();
        loader.expect_get_bitmap().returning(|_| Ok(artwork()));

        let bridge = NotificationBridge::new(Some(Arc::new(surface)), Some(Arc::new(loader)));
        let mut with_cover = update("a");
        with_cover.metas.image = Some(cover());
        bridge.show(with_cover);
        bridge.show(update("b"));

        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
