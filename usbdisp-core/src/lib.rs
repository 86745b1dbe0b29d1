//! # usbdisp-core
//!
//! Device-side display pipeline for a USB-gadget virtual monitor.
//!
//! The host streams bitmap updates as bulk packets of at most 512
//! bytes. This crate turns that packet stream back into blits:
//!
//! - **Protocol**: command byte, `BlitHeader`, host-side `packetize`
//! - **Reassembly**: `FrameReassembler` collects chunks into ring slots
//! - **Ring**: `SlotProducer` / `SlotConsumer`, a fixed-size SPSC slot ring
//! - **RLE**: the 16-bpp run-length codec
//! - **Compositor**: renders committed slots onto a `Surface`
//! - **Scheduler**: `ConsumerSignal` and the `DisplayWorker` task
//! - **Transport**: `ChunkSource` over UDP or a `ChunkCodec` replay file
//! - **Touch**: the 5-byte touch report side channel
//! - **Error**: `DisplayError`, a `thiserror`-based error enum

pub mod codec;
pub mod compositor;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod reassembler;
pub mod ring;
pub mod rle;
pub mod scheduler;
pub mod slot;
pub mod stats;
pub mod surface;
pub mod touch;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::ChunkCodec;
pub use compositor::{Compositor, DrainReport};
pub use error::DisplayError;
pub use pipeline::{Pipeline, PipelineConfig};
pub use protocol::{BlitHeader, BlitKind, ByteOrder, Command, CommandFlags, CommandKind, MAX_CHUNK, packetize};
pub use reassembler::{ChunkOutcome, FrameReassembler};
pub use ring::{RingMode, SlotConsumer, SlotProducer};
pub use scheduler::{ConsumerSignal, DisplayWorker};
pub use slot::{Slot, slot_capacity_for};
pub use stats::{PipelineStats, StatsSnapshot};
pub use surface::{MemorySurface, Surface};
pub use touch::{TouchReport, TouchReporter};
pub use transport::{ChunkSource, ReplayChunkSource, UdpChunkSource, write_replay};
