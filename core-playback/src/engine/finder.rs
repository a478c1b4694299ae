//! Sequential backend probe.

use bridge_traits::{EngineFactory, MediaSource, Platform};
use core_runtime::logging::strip_path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{candidates_for, BackendCandidate, EngineAdapter, EngineId, PlatformCapabilities, SignalRoute};
use crate::error::{EngineError, PlaybackError, ProbeAttempt, Result};

/// The engine that opened a source.
#[derive(Debug)]
pub struct ProbeOutcome {
    pub engine: EngineAdapter,
    pub duration_ms: u64,
    /// Candidates that failed before this one
    pub attempts: Vec<ProbeAttempt>,
}

/// Finds the first candidate engine able to open a source.
///
/// Candidates are tried one at a time, in order, each at most once per
/// call. Every engine constructed for a failed candidate is released before
/// the next candidate starts.
pub struct PlayerFinder {
    factory: Arc<dyn EngineFactory>,
    candidates: Vec<BackendCandidate>,
    capabilities: PlatformCapabilities,
    next_engine_id: AtomicU64,
}

impl PlayerFinder {
    pub fn new(factory: Arc<dyn EngineFactory>, platform: Platform) -> Self {
        Self::with_candidates(
            factory,
            candidates_for(platform).to_vec(),
            PlatformCapabilities::for_platform(platform),
        )
    }

    pub fn with_candidates(
        factory: Arc<dyn EngineFactory>,
        candidates: Vec<BackendCandidate>,
        capabilities: PlatformCapabilities,
    ) -> Self {
        Self {
            factory,
            candidates,
            capabilities,
            next_engine_id: AtomicU64::new(1),
        }
    }

    pub fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    fn allocate_id(&self) -> EngineId {
        EngineId(self.next_engine_id.fetch_add(1, Ordering::Relaxed))
    }

    #[instrument(
        skip(self, source, route),
        fields(source = %strip_path(&source.path), audio_type = %source.audio_type, generation = route.generation())
    )]
    pub async fn find_working_player(
        &self,
        source: &MediaSource,
        route: &SignalRoute,
    ) -> Result<ProbeOutcome> {
        let mut attempts = Vec::new();

        for candidate in self
            .candidates
            .iter()
            .filter(|candidate| candidate.accepts(source.audio_type))
        {
            let engine_id = self.allocate_id();
            let engine = match self.factory.create(candidate.kind, route.listener_for(engine_id)) {
                Ok(engine) => engine,
                Err(err) => {
                    debug!(kind = %candidate.kind, error = %err, "Backend unavailable");
                    attempts.push(ProbeAttempt {
                        kind: candidate.kind,
                        error: EngineError::Incompatible(err.to_string()),
                    });
                    continue;
                }
            };

            let mut adapter =
                EngineAdapter::new(engine_id, engine, self.capabilities.reverse_playback);
            match adapter.open(source).await {
                Ok(duration_ms) => {
                    info!(
                        kind = %candidate.kind,
                        engine = %engine_id,
                        duration_ms,
                        rejected = attempts.len(),
                        "Backend opened source"
                    );
                    return Ok(ProbeOutcome {
                        engine: adapter,
                        duration_ms,
                        attempts,
                    });
                }
                Err(error) => {
                    debug!(
                        kind = %candidate.kind,
                        engine = %engine_id,
                        transient = error.is_transient(),
                        error = %error,
                        "Backend failed to open source"
                    );
                    adapter.release();
                    attempts.push(ProbeAttempt {
                        kind: candidate.kind,
                        error,
                    });
                }
            }
        }

        warn!(attempts = attempts.len(), "No backend could open source");
        Err(PlaybackError::NoBackendAvailable { attempts })
    }
}

impl std::fmt::Debug for PlayerFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerFinder")
            .field("candidates", &self.candidates)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}
