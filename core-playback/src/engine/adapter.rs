//! Uniform operations over one native engine.

use bridge_traits::{AudioType, EngineKind, EngineSignal, MediaSource, NativeEngine};
use tracing::{debug, warn};

use super::EngineId;
use crate::error::EngineError;

/// The three signals a session reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterSignal {
    Buffering(bool),
    Finished,
    Error(EngineError),
}

impl From<EngineSignal> for AdapterSignal {
    fn from(signal: EngineSignal) -> Self {
        match signal {
            EngineSignal::Buffering(buffering) => AdapterSignal::Buffering(buffering),
            EngineSignal::Completed => AdapterSignal::Finished,
            EngineSignal::Failed(failure) => AdapterSignal::Error(EngineError::classify(&failure)),
        }
    }
}

/// Owns a native engine and gives it uniform semantics:
/// - livestream duration is 0
/// - seeks clamp to ≥ 0 but not to the duration
/// - volume clamps to `[0, 1]`
/// - negative rates are refused where reverse playback is unsupported
/// - the engine is released exactly once, at the latest on drop
pub struct EngineAdapter {
    id: EngineId,
    engine: Box<dyn NativeEngine>,
    reverse_playback: bool,
    released: bool,
}

impl EngineAdapter {
    pub(crate) fn new(id: EngineId, engine: Box<dyn NativeEngine>, reverse_playback: bool) -> Self {
        Self {
            id,
            engine,
            reverse_playback,
            released: false,
        }
    }

    pub fn id(&self) -> EngineId {
        self.id
    }

    pub fn kind(&self) -> EngineKind {
        self.engine.kind()
    }

    /// Open `source`, resolving with the duration in milliseconds.
    pub async fn open(&mut self, source: &MediaSource) -> Result<u64, EngineError> {
        let reported = self
            .engine
            .prepare(source)
            .await
            .map_err(|failure| EngineError::classify(&failure))?;

        if source.audio_type == AudioType::LiveStream {
            return Ok(0);
        }
        Ok(reported.unwrap_or(0))
    }

    pub fn play(&mut self) -> Result<(), EngineError> {
        Ok(self.engine.play()?)
    }

    pub fn pause(&mut self) -> Result<(), EngineError> {
        Ok(self.engine.pause()?)
    }

    /// Seek to `position_ms` clamped to ≥ 0; returns the applied position.
    pub fn seek_to(&mut self, position_ms: i64) -> Result<u64, EngineError> {
        let position = position_ms.max(0) as u64;
        self.engine.seek_to(position)?;
        Ok(position)
    }

    pub fn set_volume(&mut self, volume: f64) -> Result<(), EngineError> {
        Ok(self.engine.set_volume(volume.clamp(0.0, 1.0))?)
    }

    pub fn set_play_speed(&mut self, rate: f64) -> Result<(), EngineError> {
        if rate < 0.0 && !self.reverse_playback {
            return Err(EngineError::Unsupported(format!(
                "{} cannot play at negative rate {}",
                self.kind(),
                rate
            )));
        }
        Ok(self.engine.set_rate(rate)?)
    }

    pub fn set_looping(&mut self, looping: bool) -> Result<(), EngineError> {
        Ok(self.engine.set_looping(looping)?)
    }

    pub fn position_ms(&self) -> u64 {
        self.engine.position_ms()
    }

    pub fn is_playing(&self) -> bool {
        self.engine.is_playing()
    }

    /// Stop and release the engine. Later calls are no-ops.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Err(err) = self.engine.stop() {
            warn!(engine = %self.id, error = %err, "Engine stop failed during release");
        }
        self.engine.release();
        debug!(engine = %self.id, kind = %self.engine.kind(), "Engine released");
    }
}

impl Drop for EngineAdapter {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for EngineAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineAdapter")
            .field("id", &self.id)
            .field("kind", &self.engine.kind())
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{EngineFailure, FailureCause, StreamProtocol};
    use mockall::mock;
    use mockall::predicate::eq;

    mock! {
        Engine {}
        #[async_trait]
        impl NativeEngine for Engine {
            fn kind(&self) -> EngineKind;
            async fn prepare(
                &mut self,
                source: &MediaSource,
            ) -> std::result::Result<Option<u64>, EngineFailure>;
            fn play(&mut self) -> BridgeResult<()>;
            fn pause(&mut self) -> BridgeResult<()>;
            fn stop(&mut self) -> BridgeResult<()>;
            fn seek_to(&mut self, position_ms: u64) -> BridgeResult<()>;
            fn set_volume(&mut self, volume: f64) -> BridgeResult<()>;
            fn set_rate(&mut self, rate: f64) -> BridgeResult<()>;
            fn set_looping(&mut self, looping: bool) -> BridgeResult<()>;
            fn position_ms(&self) -> u64;
            fn is_playing(&self) -> bool;
            fn release(&mut self);
        }
    }

    fn engine_released_once() -> MockEngine {
        let mut engine = MockEngine::new();
        engine
            .expect_kind()
            .return_const(EngineKind::ExoPlayer(StreamProtocol::Progressive));
        engine.expect_stop().times(1).returning(|| Ok(()));
        engine.expect_release().times(1).return_const(());
        engine
    }

    #[tokio::test]
    async fn test_livestream_duration_is_zero() {
        let mut engine = engine_released_once();
        engine.expect_prepare().returning(|_| Ok(Some(123_000)));

        let mut adapter = EngineAdapter::new(EngineId(1), Box::new(engine), false);
        let source = MediaSource::new(AudioType::LiveStream, "https://radio.example.com/live");

        assert_eq!(adapter.open(&source).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_duration_defaults_to_zero() {
        let mut engine = engine_released_once();
        engine.expect_prepare().returning(|_| Ok(None));

        let mut adapter = EngineAdapter::new(EngineId(1), Box::new(engine), false);
        let source = MediaSource::new(AudioType::File, "/sdcard/a.mp3");

        assert_eq!(adapter.open(&source).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prepare_failure_is_classified() {
        let mut engine = engine_released_once();
        engine.expect_prepare().returning(|_| {
            Err(EngineFailure::new(FailureCause::Http, "Response code: 403").with_status(403))
        });

        let mut adapter = EngineAdapter::new(EngineId(1), Box::new(engine), false);
        let source = MediaSource::new(AudioType::Network, "https://example.com/a.mp3");

        assert!(matches!(
            adapter.open(&source).await,
            Err(EngineError::Unreachable { status: 403, .. })
        ));
    }

    #[test]
    fn test_seek_clamps_negative_positions() {
        let mut engine = engine_released_once();
        engine.expect_seek_to().with(eq(0)).times(1).returning(|_| Ok(()));
        engine.expect_seek_to().with(eq(50_000)).times(1).returning(|_| Ok(()));

        let mut adapter = EngineAdapter::new(EngineId(1), Box::new(engine), false);
        assert_eq!(adapter.seek_to(-500).unwrap(), 0);
        // Not clamped to the duration.
        assert_eq!(adapter.seek_to(50_000).unwrap(), 50_000);
    }

    #[test]
    fn test_negative_rate_rejected_without_reverse_playback() {
        let mut engine = engine_released_once();
        engine.expect_set_rate().never();

        let mut adapter = EngineAdapter::new(EngineId(1), Box::new(engine), false);
        assert!(matches!(
            adapter.set_play_speed(-2.0),
            Err(EngineError::Unsupported(_))
        ));
    }

    #[test]
    fn test_negative_rate_forwarded_with_reverse_playback() {
        let mut engine = engine_released_once();
        engine.expect_set_rate().with(eq(-2.0)).times(1).returning(|_| Ok(()));

        let mut adapter = EngineAdapter::new(EngineId(1), Box::new(engine), true);
        adapter.set_play_speed(-2.0).unwrap();
    }

    #[test]
    fn test_volume_is_clamped() {
        let mut engine = engine_released_once();
        engine.expect_set_volume().with(eq(1.0)).times(1).returning(|_| Ok(()));

        let mut adapter = EngineAdapter::new(EngineId(1), Box::new(engine), false);
        adapter.set_volume(1.7).unwrap();
    }

    #[test]
    fn test_release_is_idempotent_and_runs_on_drop() {
        let engine = engine_released_once();
        let mut adapter = EngineAdapter::new(EngineId(1), Box::new(engine), false);

        adapter.release();
        adapter.release();
        drop(adapter);
    }

    #[test]
    fn test_signal_translation() {
        assert_eq!(AdapterSignal::from(EngineSignal::Completed), AdapterSignal::Finished);
        assert_eq!(
            AdapterSignal::from(EngineSignal::Buffering(false)),
            AdapterSignal::Buffering(false)
        );
        let failed = EngineSignal::Failed(EngineFailure::new(FailureCause::Other, "unable to connect"));
        assert!(matches!(
            AdapterSignal::from(failed),
            AdapterSignal::Error(EngineError::Network(_))
        ));
    }
}
