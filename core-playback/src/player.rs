//! # Player Session
//!
//! One session per player id. Each session is a tokio task that owns its
//! engine and its state; the [`PlayerHandle`] talks to it over a command
//! channel.
//!
//! ## Serialization
//!
//! Commands, engine signals, probe results, interruption transitions and
//! timer ticks all arrive in the same `select!` loop, so session state is
//! never touched concurrently.
//!
//! ## Open generations
//!
//! Every `open()` and `stop()` bumps the session generation. The backend
//! probe runs in its own task and reports back tagged with the generation it
//! was started for; a result for an older generation is dropped, which
//! releases its engine. The caller of a superseded open is answered with
//! [`PlaybackError::OpenSuperseded`], the caller of an open interrupted by
//! `stop()` with [`PlaybackError::OpenCancelled`].
//!
//! ## State machine
//!
//! ```text
//! Idle -> Opening -> Ready -> Playing <-> Paused -> Ended | Stopped
//!            |
//!            +-> Error
//! ```

use bridge_traits::{
    AudioMetas, AudioSessionCategory, AudioSessionConfigurator, NotificationSettings,
    PlaybackPosition, Platform, RemoteAction, RingerMode, RingerModeProvider,
};
use core_runtime::config::PlaybackTuning;
use core_runtime::events::{EventBus, EventSeverity, PlayerEvent, RecvError, SessionEvent};
use core_runtime::logging::{redact_headers, strip_path};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use crate::engine::{
    AdapterSignal, EngineAdapter, PlatformCapabilities, PlayerFinder, ProbeOutcome, RoutedSignal,
    ScrubStyle, SignalRoute,
};
use crate::error::{PlaybackError, Result};
use crate::interruption::{AudioState, InterruptionAction, InterruptionGuard, InterruptionPolicy};
use crate::notification::{NotificationBridge, NotificationUpdate};
use crate::types::{OpenRequest, PlayerSnapshot, PlayerState};

const COMMAND_BUFFER: usize = 32;

/// Shared collaborators of every session.
pub struct PlayerContext {
    pub finder: Arc<PlayerFinder>,
    pub interruption: Arc<InterruptionPolicy>,
    pub notifications: NotificationBridge,
    pub ringer: Option<Arc<dyn RingerModeProvider>>,
    pub audio_session: Option<Arc<dyn AudioSessionConfigurator>>,
    pub events: EventBus,
    pub tuning: PlaybackTuning,
    pub platform: Platform,
}

impl PlayerContext {
    pub fn capabilities(&self) -> PlatformCapabilities {
        self.finder.capabilities()
    }
}

impl std::fmt::Debug for PlayerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerContext")
            .field("platform", &self.platform)
            .field("finder", &self.finder)
            .field("interruption", &self.interruption)
            .field("notifications", &self.notifications)
            .field("tuning", &self.tuning)
            .finish()
    }
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug)]
enum Operation {
    Play,
    Pause,
    Toggle,
    Stop,
    Seek(i64),
    SeekBy(i64),
    SetVolume(f64),
    SetPlaySpeed(f64),
    ForwardRewind(f64),
    SetLooping(bool),
    AudioUpdated { path: String, metas: AudioMetas },
    ShowNotification(bool),
    Remote(RemoteAction),
}

enum Command {
    Open {
        request: Box<OpenRequest>,
        reply: oneshot::Sender<Result<u64>>,
    },
    Run {
        operation: Operation,
        reply: oneshot::Sender<Result<()>>,
    },
    IsPlaying {
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<PlayerSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

struct ProbeResult {
    generation: u64,
    result: Result<ProbeOutcome>,
}

struct PendingOpen {
    generation: u64,
    request: Box<OpenRequest>,
    reply: oneshot::Sender<Result<u64>>,
    probe: JoinHandle<()>,
}

impl PendingOpen {
    /// Abort the probe (dropping its engine) and answer the caller.
    fn cancel(self, error: PlaybackError) {
        self.probe.abort();
        let _ = self.reply.send(Err(error));
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable handle to one session task.
#[derive(Clone)]
pub struct PlayerHandle {
    player_id: Arc<str>,
    commands: mpsc::Sender<Command>,
}

impl PlayerHandle {
    /// Spawn the session task for `player_id`.
    pub fn spawn(player_id: impl Into<String>, ctx: Arc<PlayerContext>) -> Self {
        let player_id: Arc<str> = Arc::from(player_id.into());
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (probe_tx, probe_rx) = mpsc::unbounded_channel();
        // Subscribe before the first read of the current state.
        let interruptions = ctx.interruption.subscribe();

        let session = Session::new(player_id.to_string(), ctx, signal_tx, probe_tx);
        let span = info_span!("session", player_id = %player_id);
        tokio::spawn(
            session
                .run(commands_rx, signal_rx, probe_rx, interruptions)
                .instrument(span),
        );

        Self {
            player_id,
            commands: commands_tx,
        }
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    /// Whether the session task still accepts commands.
    pub fn is_alive(&self) -> bool {
        !self.commands.is_closed()
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| PlaybackError::SessionClosed(self.player_id.to_string()))?;
        response
            .await
            .map_err(|_| PlaybackError::SessionClosed(self.player_id.to_string()))
    }

    async fn run(&self, operation: Operation) -> Result<()> {
        self.request(|reply| Command::Run { operation, reply })
            .await?
    }

    /// Open a source, resolving with its duration in milliseconds once an
    /// engine is ready.
    ///
    /// There is no timeout: a source that never becomes ready keeps this
    /// call pending until the next `open()` or `stop()`.
    #[instrument(
        skip(self, request),
        fields(player_id = %self.player_id, source = %strip_path(&request.source.path))
    )]
    pub async fn open(&self, request: OpenRequest) -> Result<u64> {
        let request = Box::new(request);
        self.request(|reply| Command::Open { request, reply })
            .await?
    }

    pub async fn play(&self) -> Result<()> {
        self.run(Operation::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.run(Operation::Pause).await
    }

    pub async fn toggle(&self) -> Result<()> {
        self.run(Operation::Toggle).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.run(Operation::Stop).await
    }

    pub async fn seek(&self, position_ms: i64) -> Result<()> {
        self.run(Operation::Seek(position_ms)).await
    }

    pub async fn seek_by(&self, delta_ms: i64) -> Result<()> {
        self.run(Operation::SeekBy(delta_ms)).await
    }

    pub async fn set_volume(&self, volume: f64) -> Result<()> {
        self.run(Operation::SetVolume(volume)).await
    }

    pub async fn set_play_speed(&self, speed: f64) -> Result<()> {
        self.run(Operation::SetPlaySpeed(speed)).await
    }

    /// Start scrubbing at `speed`; `0` stops it.
    pub async fn forward_rewind(&self, speed: f64) -> Result<()> {
        self.run(Operation::ForwardRewind(speed)).await
    }

    pub async fn set_looping(&self, looping: bool) -> Result<()> {
        self.run(Operation::SetLooping(looping)).await
    }

    pub async fn on_audio_updated(&self, path: impl Into<String>, metas: AudioMetas) -> Result<()> {
        self.run(Operation::AudioUpdated {
            path: path.into(),
            metas,
        })
        .await
    }

    pub async fn show_notification(&self, show: bool) -> Result<()> {
        self.run(Operation::ShowNotification(show)).await
    }

    /// Deliver a notification action to the session.
    pub async fn remote_action(&self, action: RemoteAction) -> Result<()> {
        self.run(Operation::Remote(action)).await
    }

    pub async fn next(&self) -> Result<()> {
        self.remote_action(RemoteAction::Next).await
    }

    pub async fn prev(&self) -> Result<()> {
        self.remote_action(RemoteAction::Prev).await
    }

    /// Live read of the engine.
    pub async fn is_playing(&self) -> Result<bool> {
        self.request(|reply| Command::IsPlaying { reply }).await
    }

    pub async fn snapshot(&self) -> Result<PlayerSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Stop silently and end the session task.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}

impl std::fmt::Debug for PlayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerHandle")
            .field("player_id", &self.player_id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

// ============================================================================
// Session task
// ============================================================================

struct Session {
    id: String,
    ctx: Arc<PlayerContext>,
    capabilities: PlatformCapabilities,

    engine: Option<EngineAdapter>,
    generation: u64,
    pending_open: Option<PendingOpen>,
    state: PlayerState,

    volume: f64,
    play_speed: f64,
    looping: bool,
    scrub: Option<f64>,
    reported_playing: bool,
    buffering: bool,
    position_ms: u64,
    duration_ms: u64,

    respect_silent_mode: bool,
    display_notification: bool,
    notification_settings: NotificationSettings,
    metas: AudioMetas,
    playing_path: Option<String>,
    last_opened_path: Option<String>,
    last_ringer: Option<RingerMode>,

    guard: InterruptionGuard,
    poll: Option<Interval>,
    scrub_timer: Option<Interval>,

    signal_tx: mpsc::UnboundedSender<RoutedSignal>,
    probe_tx: mpsc::UnboundedSender<ProbeResult>,
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl Session {
    fn new(
        id: String,
        ctx: Arc<PlayerContext>,
        signal_tx: mpsc::UnboundedSender<RoutedSignal>,
        probe_tx: mpsc::UnboundedSender<ProbeResult>,
    ) -> Self {
        let capabilities = ctx.capabilities();
        Self {
            id,
            ctx,
            capabilities,
            engine: None,
            generation: 0,
            pending_open: None,
            state: PlayerState::Idle,
            volume: 1.0,
            play_speed: 1.0,
            looping: false,
            scrub: None,
            reported_playing: false,
            buffering: false,
            position_ms: 0,
            duration_ms: 0,
            respect_silent_mode: false,
            display_notification: false,
            notification_settings: NotificationSettings::default(),
            metas: AudioMetas::default(),
            playing_path: None,
            last_opened_path: None,
            last_ringer: None,
            guard: InterruptionGuard::default(),
            poll: None,
            scrub_timer: None,
            signal_tx,
            probe_tx,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut signals: mpsc::UnboundedReceiver<RoutedSignal>,
        mut probes: mpsc::UnboundedReceiver<ProbeResult>,
        mut interruptions: broadcast::Receiver<AudioState>,
    ) {
        debug!("Session started");
        let initial = self.ctx.interruption.current();
        self.on_audio_state(initial);
        let mut interruptions_open = true;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.stop(false);
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        self.stop(false);
                        break;
                    }
                },
                Some(routed) = signals.recv() => self.on_engine_signal(routed),
                Some(probe) = probes.recv() => self.on_probe_result(probe),
                transition = interruptions.recv(), if interruptions_open => match transition {
                    Ok(state) => self.on_audio_state(state),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Missed interruption transitions, applying the current state");
                        let current = self.ctx.interruption.current();
                        self.on_audio_state(current);
                    }
                    Err(RecvError::Closed) => interruptions_open = false,
                },
                _ = tick(&mut self.poll) => self.on_position_tick(),
                _ = tick(&mut self.scrub_timer) => self.on_scrub_tick(),
            }
        }

        debug!("Session ended");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Open { request, reply } => self.open(request, reply),
            Command::Run { operation, reply } => {
                let result = self.run_operation(operation);
                if let Err(err) = &result {
                    debug!(error = %err, "Operation failed");
                }
                let _ = reply.send(result);
            }
            Command::IsPlaying { reply } => {
                let _ = reply.send(self.is_engine_playing());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            // Handled by the loop.
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn run_operation(&mut self, operation: Operation) -> Result<()> {
        match operation {
            Operation::Play => self.play(),
            Operation::Pause => self.pause(),
            Operation::Toggle => {
                if self.is_engine_playing() || self.scrub.is_some() {
                    self.pause()
                } else {
                    self.play()
                }
            }
            Operation::Stop => {
                self.stop(true);
                Ok(())
            }
            Operation::Seek(position_ms) => self.seek(position_ms),
            Operation::SeekBy(delta_ms) => self.seek_by(delta_ms),
            Operation::SetVolume(volume) => self.set_volume(volume),
            Operation::SetPlaySpeed(speed) => self.set_play_speed(speed),
            Operation::ForwardRewind(speed) => self.forward_rewind(speed),
            Operation::SetLooping(looping) => {
                self.looping = looping;
                if let Some(engine) = self.engine.as_mut() {
                    engine.set_looping(looping)?;
                }
                Ok(())
            }
            Operation::AudioUpdated { path, metas } => {
                self.on_audio_updated(path, metas);
                Ok(())
            }
            Operation::ShowNotification(show) => {
                self.display_notification = show;
                if show {
                    self.update_notification();
                } else {
                    self.ctx.notifications.hide(&self.id);
                }
                Ok(())
            }
            Operation::Remote(action) => {
                self.on_remote_action(action);
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------------
    // Open
    // ------------------------------------------------------------------------

    fn open(&mut self, request: Box<OpenRequest>, reply: oneshot::Sender<Result<u64>>) {
        if let Some(pending) = self.pending_open.take() {
            debug!(generation = pending.generation, "Superseding pending open");
            pending.cancel(PlaybackError::OpenSuperseded);
        }
        self.stop(false);

        if let Err(err) = self.validate_open(&request) {
            self.state = PlayerState::Error;
            let _ = reply.send(Err(err));
            return;
        }

        if let Some(volume) = request.volume {
            self.volume = volume.clamp(0.0, 1.0);
            if !self.guard.volume_enabled() {
                self.guard.remember_volume(self.volume);
            }
        }
        if let Some(speed) = request.play_speed {
            self.play_speed = speed;
        }
        self.respect_silent_mode = request.respect_silent_mode;
        self.display_notification = request.display_notification;
        self.notification_settings = request.notification_settings;
        self.metas = request.metas.clone();
        self.last_opened_path = Some(request.source.path.clone());
        self.state = PlayerState::Opening;
        self.configure_audio_session();

        let generation = self.generation;
        let finder = Arc::clone(&self.ctx.finder);
        let route = SignalRoute::new(generation, self.signal_tx.clone());
        let source = request.source.clone();
        let probe_tx = self.probe_tx.clone();
        let probe = tokio::spawn(
            async move {
                let result = finder.find_working_player(&source, &route).await;
                // The session is gone; dropping the outcome releases its engine.
                let _ = probe_tx.send(ProbeResult { generation, result });
            }
            .in_current_span(),
        );

        info!(
            generation,
            audio_type = %request.source.audio_type,
            source = %strip_path(&request.source.path),
            "Opening source"
        );
        if !request.source.headers.is_empty() {
            debug!(headers = %redact_headers(&request.source.headers), "Request headers");
        }
        self.pending_open = Some(PendingOpen {
            generation,
            request,
            reply,
            probe,
        });
    }

    fn validate_open(&self, request: &OpenRequest) -> Result<()> {
        if request.volume.is_some_and(|volume| !volume.is_finite()) {
            return Err(PlaybackError::InvalidArgument("volume must be finite".to_string()));
        }
        match request.play_speed {
            Some(speed) if !speed.is_finite() => Err(PlaybackError::InvalidArgument(
                "play speed must be finite".to_string(),
            )),
            Some(speed) if speed < 0.0 && !self.capabilities.reverse_playback => {
                Err(PlaybackError::UnsupportedPlaySpeed(speed))
            }
            _ => Ok(()),
        }
    }

    fn configure_audio_session(&self) {
        let Some(audio_session) = &self.ctx.audio_session else {
            return;
        };
        let category =
            AudioSessionCategory::select(self.display_notification, self.respect_silent_mode);
        let result = audio_session
            .set_category(category)
            .and_then(|_| audio_session.set_active(true));
        if let Err(err) = result {
            warn!(?category, error = %err, "Audio session configuration failed");
        }
    }

    fn on_probe_result(&mut self, probe: ProbeResult) {
        let current = matches!(&self.pending_open, Some(pending) if pending.generation == probe.generation);
        if !current {
            debug!(generation = probe.generation, "Discarding stale probe result");
            return;
        }
        let Some(pending) = self.pending_open.take() else {
            return;
        };

        match probe.result {
            Ok(outcome) => {
                let duration_ms = self.commit_open(outcome, &pending.request);
                let _ = pending.reply.send(Ok(duration_ms));
                self.update_notification();
            }
            Err(err) => {
                warn!(error = %err, "Open failed");
                self.state = PlayerState::Error;
                let _ = pending.reply.send(Err(err));
            }
        }
    }

    fn commit_open(&mut self, outcome: ProbeOutcome, request: &OpenRequest) -> u64 {
        let ProbeOutcome {
            mut engine,
            duration_ms,
            attempts,
        } = outcome;

        if let Err(err) = engine.set_play_speed(self.play_speed) {
            warn!(error = %err, "Applying play speed failed");
        }
        if let Err(err) = engine.set_looping(self.looping) {
            warn!(error = %err, "Applying looping failed");
        }
        if let Some(position_ms) = request.seek_ms {
            match engine.seek_to(position_ms) {
                Ok(position) => self.position_ms = position,
                Err(err) => warn!(error = %err, "Applying initial seek failed"),
            }
        }

        info!(
            kind = %engine.kind(),
            duration_ms,
            rejected = attempts.len(),
            "Source ready"
        );
        self.engine = Some(engine);
        self.duration_ms = duration_ms;
        self.playing_path = Some(request.source.path.clone());
        self.state = PlayerState::Ready;
        self.apply_volume();

        self.emit(PlayerEvent::ReadyToPlay { duration_ms });
        if request.auto_start {
            if let Err(err) = self.play() {
                warn!(error = %err, "Auto start failed");
            }
        }
        // While ducked the restore reports the volume.
        if self.guard.volume_enabled() {
            self.emit(PlayerEvent::VolumeChanged {
                volume: self.volume,
            });
        }
        self.emit(PlayerEvent::PlaySpeedChanged {
            speed: self.play_speed,
        });

        duration_ms
    }

    // ------------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------------

    fn play(&mut self) -> Result<()> {
        self.stop_scrub();
        if self.engine.is_none() {
            return Ok(());
        }

        if !self.guard.play_pause_enabled() {
            debug!("Play deferred until playback is authorized");
            self.guard.defer_play();
            let policy = Arc::clone(&self.ctx.interruption);
            tokio::spawn(
                async move {
                    policy.request_audio_focus().await;
                }
                .in_current_span(),
            );
            return Ok(());
        }

        let ended = self.state == PlayerState::Ended;
        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };
        if ended {
            engine.seek_to(0)?;
            self.position_ms = 0;
        }
        engine.play()?;

        self.state = PlayerState::Playing;
        self.report_playing(true);
        self.start_polling();
        self.update_notification();
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        if !self.guard.play_pause_enabled() {
            self.guard.cancel_deferred_play();
        }
        self.pause_playback()
    }

    fn pause_playback(&mut self) -> Result<()> {
        self.stop_scrub();
        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };
        engine.pause()?;

        if matches!(self.state, PlayerState::Playing | PlayerState::Ready) {
            self.state = PlayerState::Paused;
        }
        self.stop_polling();
        self.report_playing(false);
        self.update_notification();
        Ok(())
    }

    /// Tear down the current source. `notify` controls the `Stopped` event.
    fn stop(&mut self, notify: bool) {
        if let Some(pending) = self.pending_open.take() {
            debug!(generation = pending.generation, "Cancelling pending open");
            pending.cancel(PlaybackError::OpenCancelled);
        }
        self.generation += 1;

        let was_scrubbing = self.scrub.take().is_some();
        self.scrub_timer = None;
        self.stop_polling();

        if let Some(mut engine) = self.engine.take() {
            self.emit(PlayerEvent::PositionChanged { position_ms: 0 });
            engine.release();
        }
        self.position_ms = 0;
        self.duration_ms = 0;
        self.playing_path = None;
        self.buffering = false;

        self.report_playing(false);
        self.ctx.notifications.hide(&self.id);
        self.state = PlayerState::Stopped;

        if was_scrubbing {
            self.emit(PlayerEvent::ForwardRewindChanged { speed: 0.0 });
        }
        if notify {
            self.emit(PlayerEvent::Stopped);
        }
    }

    fn seek(&mut self, position_ms: i64) -> Result<()> {
        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };
        let position_ms = engine.seek_to(position_ms)?;
        self.position_ms = position_ms;
        if self.state == PlayerState::Ended {
            self.state = PlayerState::Paused;
        }
        self.emit(PlayerEvent::PositionChanged { position_ms });
        Ok(())
    }

    fn seek_by(&mut self, delta_ms: i64) -> Result<()> {
        let Some(engine) = self.engine.as_ref() else {
            return Ok(());
        };
        let target = (engine.position_ms() as i64).saturating_add(delta_ms);
        self.seek(target)
    }

    // ------------------------------------------------------------------------
    // Volume, speed, scrub
    // ------------------------------------------------------------------------

    fn set_volume(&mut self, volume: f64) -> Result<()> {
        if !volume.is_finite() {
            return Err(PlaybackError::InvalidArgument(format!(
                "volume must be finite, got {volume}"
            )));
        }
        let volume = volume.clamp(0.0, 1.0);
        self.volume = volume;

        if !self.guard.volume_enabled() {
            debug!(volume, "Volume change deferred while ducked");
            self.guard.remember_volume(volume);
            return Ok(());
        }

        if self.engine.is_some() {
            self.apply_volume();
            self.emit(PlayerEvent::VolumeChanged { volume });
        }
        Ok(())
    }

    /// Push the effective volume to the engine: the session volume, the
    /// ducked volume, or 0 when silent mode is respected and the ringer is
    /// muted.
    fn apply_volume(&mut self) {
        let ringer = self.ctx.ringer.as_ref().map(|ringer| ringer.ringer_mode());
        self.last_ringer = ringer;

        let muted = self.respect_silent_mode && ringer.is_some_and(|mode| mode.is_muted());
        let target = if muted {
            0.0
        } else if self.guard.volume_enabled() {
            self.volume
        } else {
            self.guard
                .ducked_volume(self.volume, self.ctx.tuning.reduced_volume_fraction)
        };

        if let Some(engine) = self.engine.as_mut() {
            if let Err(err) = engine.set_volume(target) {
                warn!(error = %err, "Applying volume failed");
            }
        }
    }

    fn set_play_speed(&mut self, speed: f64) -> Result<()> {
        if !speed.is_finite() {
            return Err(PlaybackError::InvalidArgument(format!(
                "play speed must be finite, got {speed}"
            )));
        }
        if speed < 0.0 && !self.capabilities.reverse_playback {
            return Err(PlaybackError::UnsupportedPlaySpeed(speed));
        }

        self.end_scrub()?;
        self.play_speed = speed;
        if let Some(engine) = self.engine.as_mut() {
            engine.set_play_speed(speed)?;
            self.emit(PlayerEvent::PlaySpeedChanged { speed });
        }
        Ok(())
    }

    fn forward_rewind(&mut self, speed: f64) -> Result<()> {
        if !speed.is_finite() {
            return Err(PlaybackError::InvalidArgument(format!(
                "scrub speed must be finite, got {speed}"
            )));
        }
        if speed == 0.0 {
            return self.end_scrub();
        }
        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };

        match self.capabilities.scrub {
            ScrubStyle::Stepped => {
                engine.pause()?;
                self.stop_polling();
                // First step is immediate.
                let mut timer = time::interval(self.ctx.tuning.scrub_tick());
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.scrub_timer = Some(timer);
            }
            ScrubStyle::Continuous => {
                engine.set_play_speed(speed)?;
                engine.play()?;
                self.state = PlayerState::Playing;
                self.report_playing(true);
                self.start_polling();
            }
        }

        debug!(speed, style = ?self.capabilities.scrub, "Scrub started");
        self.scrub = Some(speed);
        self.emit(PlayerEvent::ForwardRewindChanged { speed });
        if matches!(self.capabilities.scrub, ScrubStyle::Continuous) {
            self.update_notification();
        }
        Ok(())
    }

    /// End a scrub without a transport change: a stepped scrub resumes the
    /// engine it paused when the session was reported playing.
    fn end_scrub(&mut self) -> Result<()> {
        if !self.stop_scrub() {
            return Ok(());
        }
        match self.capabilities.scrub {
            ScrubStyle::Stepped if self.reported_playing => self.play(),
            _ => Ok(()),
        }
    }

    /// Stop an active scrub and restore the recorded play speed. Returns
    /// whether a scrub was active.
    fn stop_scrub(&mut self) -> bool {
        self.scrub_timer = None;
        if self.scrub.take().is_none() {
            return false;
        }

        if let Some(engine) = self.engine.as_mut() {
            if let Err(err) = engine.set_play_speed(self.play_speed) {
                warn!(error = %err, "Restoring play speed after scrub failed");
            }
        }
        debug!("Scrub stopped");
        self.emit(PlayerEvent::ForwardRewindChanged { speed: 0.0 });
        true
    }

    fn on_scrub_tick(&mut self) {
        let Some(speed) = self.scrub else {
            self.scrub_timer = None;
            return;
        };
        let step_ms = (speed * self.ctx.tuning.scrub_tick_ms as f64) as i64;
        if let Err(err) = self.seek_by(step_ms) {
            warn!(error = %err, "Scrub step failed");
        }
    }

    // ------------------------------------------------------------------------
    // Position polling
    // ------------------------------------------------------------------------

    fn start_polling(&mut self) {
        if self.poll.is_some() {
            return;
        }
        let period = self.ctx.tuning.position_poll_interval();
        let mut timer = time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.poll = Some(timer);
    }

    fn stop_polling(&mut self) {
        self.poll = None;
    }

    fn on_position_tick(&mut self) {
        let Some(engine) = self.engine.as_ref() else {
            self.stop_polling();
            return;
        };
        let position_ms = engine.position_ms();
        let playing = engine.is_playing();
        self.position_ms = position_ms;
        self.emit(PlayerEvent::PositionChanged { position_ms });

        let ringer = self.ctx.ringer.as_ref().map(|ringer| ringer.ringer_mode());
        if ringer != self.last_ringer {
            debug!(?ringer, "Ringer mode changed");
            self.apply_volume();
        }

        self.ctx.notifications.update_position(
            &self.id,
            PlaybackPosition {
                is_playing: playing,
                position_ms,
                speed: if playing { self.play_speed } else { 0.0 },
            },
        );

        if !playing {
            self.stop_polling();
        }
    }

    // ------------------------------------------------------------------------
    // Engine signals
    // ------------------------------------------------------------------------

    fn on_engine_signal(&mut self, routed: RoutedSignal) {
        let from_active = self.engine.as_ref().map(EngineAdapter::id) == Some(routed.engine_id);

        match routed.signal {
            AdapterSignal::Buffering(buffering) => {
                if !from_active && routed.generation != self.generation {
                    return;
                }
                if self.buffering != buffering {
                    self.buffering = buffering;
                    self.emit(PlayerEvent::BufferingChanged { buffering });
                }
                // A rebuffer reads as not playing and stops the poll.
                if from_active && !buffering && self.reported_playing && self.is_engine_playing() {
                    self.start_polling();
                }
            }
            AdapterSignal::Finished => {
                if from_active {
                    self.on_finished();
                }
            }
            AdapterSignal::Error(error) => {
                if !from_active {
                    debug!(engine = %routed.engine_id, error = %error, "Ignoring error from inactive engine");
                    return;
                }
                warn!(category = ?error.category(), error = %error, "Engine error after ready");
                self.emit(PlayerEvent::Error {
                    category: error.category(),
                    message: error.to_string(),
                });
            }
        }
    }

    fn on_finished(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            if let Err(err) = engine.pause() {
                warn!(error = %err, "Pausing finished engine failed");
            }
        }
        self.stop_polling();
        self.stop_scrub();
        self.state = PlayerState::Ended;

        info!("Playback finished");
        self.emit(PlayerEvent::Finished);
        self.report_playing(false);
        if self.buffering {
            self.buffering = false;
            self.emit(PlayerEvent::BufferingChanged { buffering: false });
        }
        self.update_notification();
    }

    // ------------------------------------------------------------------------
    // Interruptions
    // ------------------------------------------------------------------------

    fn on_audio_state(&mut self, state: AudioState) {
        let playing = self.is_engine_playing() || self.scrub.is_some();
        let actions = self.guard.apply(state, playing, self.volume);
        if !actions.is_empty() {
            info!(?state, ?actions, "Applying interruption");
        }

        for action in actions {
            let result = match action {
                InterruptionAction::Pause => self.pause_playback(),
                InterruptionAction::Resume => self.play(),
                InterruptionAction::Duck => {
                    self.apply_volume();
                    Ok(())
                }
                InterruptionAction::RestoreVolume(volume) => {
                    self.volume = volume;
                    self.apply_volume();
                    if self.engine.is_some() {
                        self.emit(PlayerEvent::VolumeChanged { volume });
                    }
                    Ok(())
                }
            };
            if let Err(err) = result {
                warn!(?action, error = %err, "Interruption action failed");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Notification
    // ------------------------------------------------------------------------

    fn on_audio_updated(&mut self, path: String, metas: AudioMetas) {
        let matches = match &self.playing_path {
            Some(playing) => *playing == path,
            None => self.last_opened_path.as_deref() == Some(path.as_str()),
        };
        if !matches {
            debug!(path = %strip_path(&path), "Ignoring metadata for a source no longer open");
            return;
        }
        self.metas = metas;
        self.update_notification();
    }

    fn on_remote_action(&mut self, action: RemoteAction) {
        let event = match action {
            RemoteAction::Toggle => PlayerEvent::NotificationPlayOrPauseRequested,
            RemoteAction::Next => PlayerEvent::Next,
            RemoteAction::Prev => PlayerEvent::Prev,
            RemoteAction::Stop => PlayerEvent::NotificationStopRequested,
            RemoteAction::Select { track_id } => PlayerEvent::NotificationSelected { track_id },
        };
        self.emit(event);
    }

    fn update_notification(&self) {
        if !self.display_notification || self.engine.is_none() {
            return;
        }
        self.ctx.notifications.show(NotificationUpdate {
            player_id: self.id.clone(),
            is_playing: self.is_engine_playing(),
            metas: self.metas.clone(),
            settings: self.notification_settings,
            duration_ms: self.duration_ms,
            play_speed: self.play_speed,
        });
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn is_engine_playing(&self) -> bool {
        self.engine.as_ref().is_some_and(EngineAdapter::is_playing)
    }

    fn report_playing(&mut self, playing: bool) {
        if self.reported_playing != playing {
            self.reported_playing = playing;
            self.emit(PlayerEvent::PlayingChanged { playing });
        }
    }

    fn emit(&self, event: PlayerEvent) {
        if event.severity() >= EventSeverity::Info {
            debug!(event = event.description(), "Session event");
        }
        // No subscriber is not an error for the session.
        let _ = self.ctx.events.emit(SessionEvent::new(self.id.clone(), event));
    }

    fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            player_id: self.id.clone(),
            state: self.state,
            is_playing: self.is_engine_playing(),
            buffering: self.buffering,
            volume: self.volume,
            play_speed: self.play_speed,
            looping: self.looping,
            scrub_speed: self.scrub,
            position_ms: self
                .engine
                .as_ref()
                .map_or(self.position_ms, EngineAdapter::position_ms),
            duration_ms: self.duration_ms,
            audio_state: self.guard.audio_state(),
            playing_path: self.playing_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::{SimulatedEngineFactory, SimulatedOutcome};
    use bridge_traits::{AudioType, MediaSource};
    use core_runtime::events::EventStream;
    use std::time::Duration;

    fn context(factory: &SimulatedEngineFactory, platform: Platform) -> Arc<PlayerContext> {
        Arc::new(PlayerContext {
            finder: Arc::new(PlayerFinder::new(Arc::new(factory.clone()), platform)),
            interruption: InterruptionPolicy::disabled(),
            notifications: NotificationBridge::disabled(),
            ringer: None,
            audio_session: None,
            events: EventBus::new(64),
            tuning: PlaybackTuning::default(),
            platform,
        })
    }

    fn asset() -> OpenRequest {
        OpenRequest::new(MediaSource::new(AudioType::Asset, "assets/clip.mp3")).auto_start(false)
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_logs_headers_with_secrets_redacted() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(logs.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let factory = SimulatedEngineFactory::new();
        let handle = PlayerHandle::spawn("a", context(&factory, Platform::Android));
        let source = MediaSource::new(AudioType::Network, "https://example.com/a.mp3")
            .with_header("Authorization", "Bearer secret-token")
            .with_header("X-Client", "demo");
        handle.open(OpenRequest::new(source).auto_start(false)).await.unwrap();

        let output = String::from_utf8(logs.0.lock().clone()).unwrap();
        assert!(output.contains("Request headers"));
        assert!(output.contains("X-Client=demo"));
        assert!(output.contains("Authorization=[REDACTED]"));
        assert!(!output.contains("secret-token"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_setters_before_open_apply_on_open() {
        let factory = SimulatedEngineFactory::new();
        let ctx = context(&factory, Platform::Android);
        let handle = PlayerHandle::spawn("a", Arc::clone(&ctx));

        handle.set_volume(0.4).await.unwrap();
        handle.set_play_speed(1.5).await.unwrap();
        handle.set_looping(true).await.unwrap();
        handle.open(asset()).await.unwrap();

        let engine = &factory.engines()[0];
        assert_eq!(engine.volume(), 0.4);
        assert_eq!(engine.rate(), 1.5);
        assert!(engine.looping());

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state, PlayerState::Ready);
        assert_eq!(snapshot.volume, 0.4);
        assert!(!snapshot.is_playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_speed_on_android_leaves_session_untouched() {
        let factory = SimulatedEngineFactory::new();
        let ctx = context(&factory, Platform::Android);
        let mut events = EventStream::new(ctx.events.subscribe()).for_player("a");
        let handle = PlayerHandle::spawn("a", ctx);

        handle.open(asset()).await.unwrap();
        events.drain();

        let err = handle.set_play_speed(-2.0).await.unwrap_err();
        assert!(matches!(err, PlaybackError::UnsupportedPlaySpeed(_)));
        assert_eq!(handle.snapshot().await.unwrap().play_speed, 1.0);
        assert!(events.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_reports_once_and_sets_error_state() {
        let factory = SimulatedEngineFactory::with_default(SimulatedOutcome::fail(
            bridge_traits::EngineFailure::new(bridge_traits::FailureCause::Decoder, "corrupt"),
        ));
        let ctx = context(&factory, Platform::Android);
        let mut events = EventStream::new(ctx.events.subscribe()).for_player("a");
        let handle = PlayerHandle::spawn("a", ctx);

        let err = handle.open(asset()).await.unwrap_err();
        assert!(matches!(err, PlaybackError::NoBackendAvailable { .. }));
        assert_eq!(handle.snapshot().await.unwrap().state, PlayerState::Error);
        assert!(!events
            .drain()
            .iter()
            .any(|event| matches!(event, PlayerEvent::ReadyToPlay { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_after_end_restarts_from_zero() {
        let factory = SimulatedEngineFactory::with_default(SimulatedOutcome::ready(Some(1_000)));
        let ctx = context(&factory, Platform::Android);
        let handle = PlayerHandle::spawn("a", ctx);

        handle.open(asset().auto_start(true)).await.unwrap();
        time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(handle.snapshot().await.unwrap().state, PlayerState::Ended);

        handle.play().await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state, PlayerState::Playing);
        assert!(snapshot.position_ms < 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_without_source_emits_stopped_only() {
        let factory = SimulatedEngineFactory::new();
        let ctx = context(&factory, Platform::Android);
        let mut events = EventStream::new(ctx.events.subscribe()).for_player("a");
        let handle = PlayerHandle::spawn("a", ctx);

        handle.stop().await.unwrap();
        assert_eq!(events.drain(), vec![PlayerEvent::Stopped]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_engine_and_closes_handle() {
        let factory = SimulatedEngineFactory::new();
        let ctx = context(&factory, Platform::Android);
        let handle = PlayerHandle::spawn("a", ctx);

        handle.open(asset()).await.unwrap();
        handle.shutdown().await.unwrap();

        assert_eq!(factory.engines()[0].release_count(), 1);
        assert!(matches!(
            handle.play().await,
            Err(PlaybackError::SessionClosed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_metadata_update_for_other_path_is_ignored() {
        let factory = SimulatedEngineFactory::new();
        let ctx = context(&factory, Platform::Android);
        let handle = PlayerHandle::spawn("a", ctx);
        handle.open(asset()).await.unwrap();

        let metas = AudioMetas {
            title: Some("Other".to_string()),
            ..Default::default()
        };
        // Accepted without error either way; only the matching path is applied.
        handle.on_audio_updated("assets/other.mp3", metas.clone()).await.unwrap();
        handle.on_audio_updated("assets/clip.mp3", metas).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_scrub_sets_signed_rate_on_apple() {
        let factory = SimulatedEngineFactory::new();
        let ctx = context(&factory, Platform::Apple);
        let mut events = EventStream::new(ctx.events.subscribe()).for_player("a");
        let handle = PlayerHandle::spawn("a", ctx);

        handle.open(asset().seek(5_000)).await.unwrap();
        events.drain();

        handle.forward_rewind(-2.0).await.unwrap();
        let engine = &factory.engines()[0];
        assert_eq!(engine.rate(), -2.0);
        assert!(engine.is_playing());

        handle.forward_rewind(0.0).await.unwrap();
        assert_eq!(engine.rate(), 1.0);

        let scrub_events: Vec<PlayerEvent> = events
            .drain()
            .into_iter()
            .filter(|event| matches!(event, PlayerEvent::ForwardRewindChanged { .. }))
            .collect();
        assert_eq!(
            scrub_events,
            vec![
                PlayerEvent::ForwardRewindChanged { speed: -2.0 },
                PlayerEvent::ForwardRewindChanged { speed: 0.0 }
            ]
        );
    }
}
