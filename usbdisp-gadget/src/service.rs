//! Gadget service core logic.
//!
//! Builds the display pipeline, feeds it from the configured chunk
//! source until the source runs dry or the service is stopped, then
//! shuts the display worker down and reports what happened.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, info, warn};

use usbdisp_core::{
    ChunkOutcome, ChunkSource, DisplayError, Pipeline, ReplayChunkSource, StatsSnapshot, Surface, UdpChunkSource,
};

use crate::config::{GadgetConfig, TransportKind};

/// Summary printed when the service exits.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceReport {
    /// Where the chunks came from.
    pub source: String,
    pub stats: StatsSnapshot,
    /// BLAKE3 of the final surface, hex.
    pub surface_blake3: String,
}

// ── GadgetService ────────────────────────────────────────────────

pub struct GadgetService {
    config: GadgetConfig,
    running: Arc<AtomicBool>,
}

impl GadgetService {
    pub fn new(config: GadgetConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Obtain a handle that can be used to stop the service from
    /// another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run the service until the source is exhausted or it is stopped.
    ///
    /// 1. Validates the config and allocates the ring and surface.
    /// 2. Spawns the display worker.
    /// 3. Pushes every chunk from the source into the reassembler.
    /// 4. Stops the worker (which renders anything still pending).
    /// 5. Dumps the surface if asked to.
    ///
    /// The source is not paced against the display worker, so replay
    /// output is timing-dependent: the default overwrite ring can lose
    /// frames silently. With `[ring] backpressure = true` a frame that
    /// finds the ring full is dropped and counted in `ring_full_drops`
    /// instead, and older frames are never overwritten.
    pub async fn run(&self) -> Result<ServiceReport, DisplayError> {
        self.running.store(true, Ordering::SeqCst);

        let pipeline_cfg = self.config.to_pipeline_config()?;
        let surface = self.config.make_surface()?;
        info!(
            slots = pipeline_cfg.slots,
            slot_capacity = pipeline_cfg.slot_capacity,
            mode = ?pipeline_cfg.mode,
            "display pipeline ready"
        );

        let mut source = self.open_source().await?;
        let origin = source.describe();
        info!("reading chunks from {origin}");

        let (mut reassembler, worker, stats) = Pipeline::build(&pipeline_cfg, Some(surface))?.spawn();

        while self.running.load(Ordering::SeqCst) {
            let next = tokio::select! {
                r = source.next_chunk() => r,
                _ = Self::wait_for_stop(&self.running) => break,
            };

            let chunk = match next {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    info!("source exhausted");
                    break;
                }
                Err(e @ DisplayError::ChunkTooLarge { .. }) => {
                    warn!("corrupt chunk stream: {e}");
                    break;
                }
                Err(e) => {
                    self.running.store(false, Ordering::SeqCst);
                    return Err(e);
                }
            };

            // Errors are logged and counted by the reassembler.
            if let Ok(ChunkOutcome::Committed { .. }) = reassembler.push_chunk(&chunk) {
                // Give the display worker a turn.
                tokio::task::yield_now().await;
            }
        }

        reassembler.abandon();
        let compositor = worker.stop().await?;
        let surface = compositor
            .into_surface()
            .ok_or(DisplayError::NoSurface { pending: 0 })?;

        if let Some(path) = self.config.dump_path() {
            tokio::fs::write(&path, surface.pixels()).await?;
            info!("surface written to {}", path.display());
        }

        self.running.store(false, Ordering::SeqCst);
        let stats = stats.snapshot();
        debug!(?stats, "final counters");
        info!("gadget service stopped");

        Ok(ServiceReport {
            source: origin,
            stats,
            surface_blake3: surface.digest().to_hex().to_string(),
        })
    }

    /// Signal the service to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the service is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ── Internal ─────────────────────────────────────────────────

    async fn open_source(&self) -> Result<Box<dyn ChunkSource>, DisplayError> {
        Ok(match self.config.transport.kind {
            TransportKind::Udp => Box::new(UdpChunkSource::bind(self.config.listen_addr()?).await?),
            TransportKind::Replay => Box::new(ReplayChunkSource::open(&self.config.replay_path()).await?),
        })
    }

    /// Async helper: resolves when `running` becomes false.
    async fn wait_for_stop(running: &Arc<AtomicBool>) {
        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
