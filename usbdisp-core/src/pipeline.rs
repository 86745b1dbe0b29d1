//! Wires the ring, reassembler, compositor and signal together.

use std::sync::Arc;

use crate::compositor::Compositor;
use crate::error::DisplayError;
use crate::protocol::{ByteOrder, MAX_CHUNK};
use crate::reassembler::FrameReassembler;
use crate::ring::{self, RingMode};
use crate::scheduler::{ConsumerSignal, DisplayWorker};
use crate::slot::slot_capacity_for;
use crate::stats::PipelineStats;
use crate::surface::{BITS_PER_PIXEL, Surface};

/// Default panel the host driver assumes.
pub const DEFAULT_WIDTH: u32 = 800;
pub const DEFAULT_HEIGHT: u32 = 480;

/// Default number of ring slots.
pub const DEFAULT_SLOTS: usize = 2;

/// Ring and protocol parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub slots: usize,
    pub slot_capacity: usize,
    pub mode: RingMode,
    pub byte_order: ByteOrder,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            slots: DEFAULT_SLOTS,
            slot_capacity: slot_capacity_for(DEFAULT_WIDTH, DEFAULT_HEIGHT, BITS_PER_PIXEL),
            mode: RingMode::Overwrite,
            byte_order: ByteOrder::Native,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), DisplayError> {
        if self.slots < 2 {
            return Err(DisplayError::InvalidConfig(format!(
                "ring needs at least 2 slots, got {}",
                self.slots
            )));
        }
        if self.slot_capacity < MAX_CHUNK {
            return Err(DisplayError::InvalidConfig(format!(
                "slot capacity {} is below one chunk ({MAX_CHUNK})",
                self.slot_capacity
            )));
        }
        Ok(())
    }
}

/// Both halves of the pipeline plus the shared pieces.
pub struct Pipeline<S: Surface> {
    pub reassembler: FrameReassembler,
    pub compositor: Compositor<S>,
    pub signal: ConsumerSignal,
    pub stats: Arc<PipelineStats>,
}

impl<S: Surface> Pipeline<S> {
    /// Preallocate every slot and build both halves.
    pub fn build(config: &PipelineConfig, surface: Option<S>) -> Result<Self, DisplayError> {
        config.validate()?;
        let (producer, consumer) = ring::channel(config.slots, config.slot_capacity, config.mode)?;
        let signal = ConsumerSignal::new();
        let stats = Arc::new(PipelineStats::new());

        Ok(Self {
            reassembler: FrameReassembler::new(producer, signal.clone(), Arc::clone(&stats), config.byte_order),
            compositor: Compositor::new(consumer, surface, Arc::clone(&stats)),
            signal,
            stats,
        })
    }
}

impl<S: Surface + 'static> Pipeline<S> {
    /// Move the compositor onto a worker task, keeping the producer.
    pub fn spawn(self) -> (FrameReassembler, DisplayWorker<S>, Arc<PipelineStats>) {
        let worker = DisplayWorker::spawn(self.compositor, self.signal);
        (self.reassembler, worker, self.stats)
    }
}
