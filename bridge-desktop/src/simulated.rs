//! Simulated Media Engine
//!
//! A native engine stand-in driven by the tokio clock. Hosts without a real
//! media engine (CLI tools, CI) and the test-suites use it to exercise the
//! whole session stack deterministically, including under
//! `tokio::time::pause()`.
//!
//! Each engine kind can be scripted to open after a delay, fail with a given
//! [`EngineFailure`], or never become ready. Every constructed engine stays
//! observable through a [`SimulatedEngineHandle`].

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    EngineFactory, EngineFailure, EngineKind, EngineListener, EngineSignal, MediaSource,
    NativeEngine,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// How a simulated engine answers `prepare`.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulatedOutcome {
    Ready {
        duration_ms: Option<u64>,
        delay: Duration,
    },
    Fail {
        failure: EngineFailure,
        delay: Duration,
    },
    /// Never resolves
    Hang,
}

impl SimulatedOutcome {
    pub fn ready(duration_ms: Option<u64>) -> Self {
        SimulatedOutcome::Ready {
            duration_ms,
            delay: Duration::ZERO,
        }
    }

    pub fn fail(failure: EngineFailure) -> Self {
        SimulatedOutcome::Fail {
            failure,
            delay: Duration::ZERO,
        }
    }

    pub fn hang() -> Self {
        SimulatedOutcome::Hang
    }

    /// Resolve only after `delay`.
    pub fn after(self, delay: Duration) -> Self {
        match self {
            SimulatedOutcome::Ready { duration_ms, .. } => {
                SimulatedOutcome::Ready { duration_ms, delay }
            }
            SimulatedOutcome::Fail { failure, .. } => SimulatedOutcome::Fail { failure, delay },
            SimulatedOutcome::Hang => SimulatedOutcome::Hang,
        }
    }
}

impl Default for SimulatedOutcome {
    fn default() -> Self {
        SimulatedOutcome::ready(Some(10_000))
    }
}

// ============================================================================
// Factory
// ============================================================================

#[derive(Default)]
struct FactoryState {
    default: SimulatedOutcome,
    scripts: HashMap<EngineKind, SimulatedOutcome>,
    unavailable: HashSet<EngineKind>,
    engines: Vec<SimulatedEngineHandle>,
}

/// [`EngineFactory`] producing [`SimulatedEngineHandle`]-observable engines.
///
/// Clones share scripts and the list of constructed engines.
#[derive(Clone, Default)]
pub struct SimulatedEngineFactory {
    state: Arc<Mutex<FactoryState>>,
}

impl SimulatedEngineFactory {
    /// Every engine opens with a 10 s duration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(outcome: SimulatedOutcome) -> Self {
        let factory = Self::default();
        factory.state.lock().default = outcome;
        factory
    }

    /// Answer every later `prepare` of `kind` with `outcome`.
    pub fn script(&self, kind: EngineKind, outcome: SimulatedOutcome) {
        self.state.lock().scripts.insert(kind, outcome);
    }

    /// Make `create` fail for `kind`, as for an engine missing on the device.
    pub fn mark_unavailable(&self, kind: EngineKind) {
        self.state.lock().unavailable.insert(kind);
    }

    /// Engines constructed so far, in construction order.
    pub fn engines(&self) -> Vec<SimulatedEngineHandle> {
        self.state.lock().engines.clone()
    }

    /// Most recently constructed engine.
    pub fn last_engine(&self) -> Option<SimulatedEngineHandle> {
        self.state.lock().engines.last().cloned()
    }
}

impl EngineFactory for SimulatedEngineFactory {
    fn create(
        &self,
        kind: EngineKind,
        listener: Arc<dyn EngineListener>,
    ) -> Result<Box<dyn NativeEngine>> {
        let mut state = self.state.lock();
        if state.unavailable.contains(&kind) {
            return Err(BridgeError::NotAvailable(format!("{kind} is not available")));
        }

        let outcome = state
            .scripts
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| state.default.clone());
        let handle = SimulatedEngineHandle::new(kind, listener);
        state.engines.push(handle.clone());
        debug!(%kind, index = state.engines.len() - 1, "Simulated engine created");

        Ok(Box::new(SimulatedEngine { handle, outcome }))
    }
}

impl std::fmt::Debug for SimulatedEngineFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimulatedEngineFactory")
            .field("default", &state.default)
            .field("scripts", &state.scripts)
            .field("engines", &state.engines.len())
            .finish()
    }
}

// ============================================================================
// Engine state
// ============================================================================

struct EngineState {
    source: Option<MediaSource>,
    duration_ms: Option<u64>,
    playing: bool,
    /// Rebuffering: reads as not playing and holds position
    stalled: bool,
    /// Position at `anchor`
    anchor_position_ms: f64,
    anchor: Instant,
    rate: f64,
    volume: f64,
    looping: bool,
    seeks: Vec<u64>,
    stop_count: u32,
    release_count: u32,
    completion: Option<JoinHandle<()>>,
}

impl EngineState {
    fn position_at(&self, now: Instant) -> f64 {
        let mut position = self.anchor_position_ms;
        if self.playing && !self.stalled {
            let elapsed = now.saturating_duration_since(self.anchor).as_secs_f64() * 1_000.0;
            position += elapsed * self.rate;
        }
        match self.duration_ms {
            Some(duration) if duration > 0 && self.looping && position >= duration as f64 => {
                position % duration as f64
            }
            Some(duration) => position.clamp(0.0, duration as f64),
            None => position.max(0.0),
        }
    }

    /// Freeze the current position as the new anchor.
    fn re_anchor(&mut self) {
        let now = Instant::now();
        self.anchor_position_ms = self.position_at(now);
        self.anchor = now;
    }

    fn cancel_completion(&mut self) {
        if let Some(completion) = self.completion.take() {
            completion.abort();
        }
    }
}

/// Observer of one simulated engine.
#[derive(Clone)]
pub struct SimulatedEngineHandle {
    kind: EngineKind,
    listener: Arc<dyn EngineListener>,
    state: Arc<Mutex<EngineState>>,
}

impl SimulatedEngineHandle {
    fn new(kind: EngineKind, listener: Arc<dyn EngineListener>) -> Self {
        Self {
            kind,
            listener,
            state: Arc::new(Mutex::new(EngineState {
                source: None,
                duration_ms: None,
                playing: false,
                stalled: false,
                anchor_position_ms: 0.0,
                anchor: Instant::now(),
                rate: 1.0,
                volume: 1.0,
                looping: false,
                seeks: Vec::new(),
                stop_count: 0,
                release_count: 0,
                completion: None,
            })),
        }
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn source(&self) -> Option<MediaSource> {
        self.state.lock().source.clone()
    }

    pub fn is_playing(&self) -> bool {
        let state = self.state.lock();
        state.playing && !state.stalled
    }

    pub fn position_ms(&self) -> u64 {
        self.state.lock().position_at(Instant::now()) as u64
    }

    pub fn volume(&self) -> f64 {
        self.state.lock().volume
    }

    pub fn rate(&self) -> f64 {
        self.state.lock().rate
    }

    pub fn looping(&self) -> bool {
        self.state.lock().looping
    }

    /// Every position passed to `seek_to`, in order.
    pub fn seeks(&self) -> Vec<u64> {
        self.state.lock().seeks.clone()
    }

    pub fn stop_count(&self) -> u32 {
        self.state.lock().stop_count
    }

    pub fn release_count(&self) -> u32 {
        self.state.lock().release_count
    }

    pub fn is_released(&self) -> bool {
        self.release_count() > 0
    }

    /// Deliver `signal` as if the native engine raised it.
    pub fn emit(&self, signal: EngineSignal) {
        self.listener.on_signal(signal);
    }

    /// Start or end a rebuffer and report it through `Buffering`. Like
    /// ExoPlayer, a stalled engine reports not playing until it recovers.
    pub fn set_stalled(&self, stalled: bool) {
        {
            let mut state = self.state.lock();
            state.re_anchor();
            state.stalled = stalled;
            self.schedule_completion(&mut state);
        }
        self.listener.on_signal(EngineSignal::Buffering(stalled));
    }

    /// Re-plan the completion signal after any change to position, rate or
    /// play state.
    fn schedule_completion(&self, state: &mut EngineState) {
        state.cancel_completion();

        let Some(duration) = state.duration_ms.filter(|duration| *duration > 0) else {
            return;
        };
        if !state.playing || state.stalled || state.looping || state.rate <= 0.0 {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let remaining_ms = (duration as f64 - state.position_at(Instant::now())).max(0.0);
        let wait = Duration::from_secs_f64(remaining_ms / state.rate / 1_000.0);
        let handle = self.clone();
        state.completion = Some(runtime.spawn(async move {
            tokio::time::sleep(wait).await;
            {
                let mut state = handle.state.lock();
                if !state.playing {
                    return;
                }
                state.playing = false;
                state.anchor_position_ms = duration as f64;
                state.anchor = Instant::now();
                state.completion = None;
            }
            debug!(kind = %handle.kind, "Simulated engine completed");
            handle.listener.on_signal(EngineSignal::Completed);
        }));
    }
}

impl std::fmt::Debug for SimulatedEngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimulatedEngineHandle")
            .field("kind", &self.kind)
            .field("playing", &state.playing)
            .field("rate", &state.rate)
            .field("volume", &state.volume)
            .field("release_count", &state.release_count)
            .finish()
    }
}

// ============================================================================
// Engine
// ============================================================================

struct SimulatedEngine {
    handle: SimulatedEngineHandle,
    outcome: SimulatedOutcome,
}

impl SimulatedEngine {
    fn ensure_alive(&self) -> Result<()> {
        if self.handle.state.lock().release_count > 0 {
            return Err(BridgeError::OperationFailed(format!(
                "{} used after release",
                self.handle.kind
            )));
        }
        Ok(())
    }

    fn update(&self, change: impl FnOnce(&mut EngineState)) -> Result<()> {
        self.ensure_alive()?;
        let mut state = self.handle.state.lock();
        state.re_anchor();
        change(&mut state);
        self.handle.schedule_completion(&mut state);
        Ok(())
    }
}

#[async_trait]
impl NativeEngine for SimulatedEngine {
    fn kind(&self) -> EngineKind {
        self.handle.kind
    }

    async fn prepare(
        &mut self,
        source: &MediaSource,
    ) -> std::result::Result<Option<u64>, EngineFailure> {
        self.handle.state.lock().source = Some(source.clone());

        match self.outcome.clone() {
            SimulatedOutcome::Ready { duration_ms, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                self.handle.state.lock().duration_ms = duration_ms;
                Ok(duration_ms)
            }
            SimulatedOutcome::Fail { failure, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Err(failure)
            }
            SimulatedOutcome::Hang => std::future::pending().await,
        }
    }

    fn play(&mut self) -> Result<()> {
        self.update(|state| state.playing = true)
    }

    fn pause(&mut self) -> Result<()> {
        self.update(|state| state.playing = false)
    }

    fn stop(&mut self) -> Result<()> {
        self.update(|state| {
            state.playing = false;
            state.anchor_position_ms = 0.0;
            state.stop_count += 1;
        })
    }

    fn seek_to(&mut self, position_ms: u64) -> Result<()> {
        self.update(|state| {
            let target = match state.duration_ms {
                Some(duration) => position_ms.min(duration),
                None => position_ms,
            };
            state.anchor_position_ms = target as f64;
            state.seeks.push(position_ms);
        })
    }

    fn set_volume(&mut self, volume: f64) -> Result<()> {
        self.update(|state| state.volume = volume)
    }

    fn set_rate(&mut self, rate: f64) -> Result<()> {
        self.update(|state| state.rate = rate)
    }

    fn set_looping(&mut self, looping: bool) -> Result<()> {
        self.update(|state| state.looping = looping)
    }

    fn position_ms(&self) -> u64 {
        self.handle.position_ms()
    }

    fn is_playing(&self) -> bool {
        self.handle.is_playing()
    }

    fn release(&mut self) {
        let mut state = self.handle.state.lock();
        state.cancel_completion();
        state.playing = false;
        state.release_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{AudioType, FailureCause, StreamProtocol};
    use tokio::time::advance;

    #[derive(Default)]
    struct RecordingListener {
        signals: Mutex<Vec<EngineSignal>>,
    }

    impl EngineListener for RecordingListener {
        fn on_signal(&self, signal: EngineSignal) {
            self.signals.lock().push(signal);
        }
    }

    fn source() -> MediaSource {
        MediaSource::new(AudioType::File, "/tmp/a.mp3")
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_follows_clock_and_rate() {
        let factory = SimulatedEngineFactory::new();
        let listener = Arc::new(RecordingListener::default());
        let mut engine = factory.create(EngineKind::MediaPlayer, listener).unwrap();
        engine.prepare(&source()).await.unwrap();

        engine.play().unwrap();
        advance(Duration::from_millis(1_000)).await;
        assert_eq!(engine.position_ms(), 1_000);

        engine.set_rate(2.0).unwrap();
        advance(Duration::from_millis(500)).await;
        assert_eq!(engine.position_ms(), 2_000);

        engine.pause().unwrap();
        advance(Duration::from_millis(500)).await;
        assert_eq!(engine.position_ms(), 2_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_signal_at_end() {
        let factory = SimulatedEngineFactory::with_default(SimulatedOutcome::ready(Some(1_000)));
        let listener = Arc::new(RecordingListener::default());
        let mut engine = factory
            .create(EngineKind::AvPlayer, listener.clone())
            .unwrap();
        engine.prepare(&source()).await.unwrap();
        engine.play().unwrap();

        tokio::time::sleep(Duration::from_millis(1_100)).await;

        assert!(!engine.is_playing());
        assert_eq!(engine.position_ms(), 1_000);
        assert_eq!(*listener.signals.lock(), vec![EngineSignal::Completed]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_holds_position_and_reports_buffering() {
        let factory = SimulatedEngineFactory::with_default(SimulatedOutcome::ready(Some(5_000)));
        let listener = Arc::new(RecordingListener::default());
        let mut engine = factory
            .create(EngineKind::ExoPlayer(StreamProtocol::Progressive), listener.clone())
            .unwrap();
        engine.prepare(&source()).await.unwrap();
        engine.play().unwrap();
        advance(Duration::from_millis(400)).await;

        let handle = factory.last_engine().unwrap();
        handle.set_stalled(true);
        advance(Duration::from_millis(1_000)).await;
        assert!(!engine.is_playing());
        assert_eq!(engine.position_ms(), 400);

        handle.set_stalled(false);
        advance(Duration::from_millis(100)).await;
        assert!(engine.is_playing());
        assert_eq!(engine.position_ms(), 500);
        assert_eq!(
            *listener.signals.lock(),
            vec![EngineSignal::Buffering(true), EngineSignal::Buffering(false)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_looping_never_completes() {
        let factory = SimulatedEngineFactory::with_default(SimulatedOutcome::ready(Some(1_000)));
        let listener = Arc::new(RecordingListener::default());
        let mut engine = factory
            .create(EngineKind::AvPlayer, listener.clone())
            .unwrap();
        engine.prepare(&source()).await.unwrap();
        engine.set_looping(true).unwrap();
        engine.play().unwrap();

        tokio::time::sleep(Duration::from_millis(2_500)).await;

        assert!(engine.is_playing());
        assert_eq!(engine.position_ms(), 500);
        assert!(listener.signals.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_failure_and_delay() {
        let factory = SimulatedEngineFactory::new();
        factory.script(
            EngineKind::ExoPlayer(StreamProtocol::Hls),
            SimulatedOutcome::fail(EngineFailure::new(FailureCause::UnsupportedFormat, "not hls"))
                .after(Duration::from_millis(200)),
        );
        let listener = Arc::new(RecordingListener::default());

        let mut hls = factory
            .create(EngineKind::ExoPlayer(StreamProtocol::Hls), listener.clone())
            .unwrap();
        let started = Instant::now();
        let failure = hls.prepare(&source()).await.unwrap_err();
        assert_eq!(failure.cause, FailureCause::UnsupportedFormat);
        assert!(started.elapsed() >= Duration::from_millis(200));

        let mut fallback = factory.create(EngineKind::MediaPlayer, listener).unwrap();
        assert_eq!(fallback.prepare(&source()).await.unwrap(), Some(10_000));
    }

    #[test]
    fn test_unavailable_kind_and_release_tracking() {
        let factory = SimulatedEngineFactory::new();
        factory.mark_unavailable(EngineKind::AvAudioPlayer);
        let listener: Arc<dyn EngineListener> = Arc::new(RecordingListener::default());

        assert!(matches!(
            factory.create(EngineKind::AvAudioPlayer, Arc::clone(&listener)),
            Err(BridgeError::NotAvailable(_))
        ));

        let mut engine = factory.create(EngineKind::AvPlayer, listener).unwrap();
        engine.release();
        assert!(engine.play().is_err());

        let engines = factory.engines();
        assert_eq!(engines.len(), 1);
        assert_eq!(engines[0].release_count(), 1);
    }
}
