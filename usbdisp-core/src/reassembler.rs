//! Producer side: rebuilds update messages from transport chunks.
//!
//! [`FrameReassembler::push_chunk`] is called once per chunk from the
//! transport's completion path. It copies into the slot under `head`,
//! commits on the terminating short chunk and raises the consumer
//! signal. It never blocks and never allocates.

use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use crate::error::DisplayError;
use crate::protocol::{BlitHeader, ByteOrder, COMMAND_LEN, Command, MAX_CHUNK, START_HEADER_LEN};
use crate::ring::SlotProducer;
use crate::scheduler::ConsumerSignal;
use crate::stats::PipelineStats;

/// What a chunk did to the message in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Appended; the message continues. `length` is the payload so far.
    Accepted { length: usize },
    /// The message is complete and now pending for the consumer.
    Committed { slot: usize, length: usize },
    /// Part of a message already being dropped.
    Discarded,
    /// A zero-length chunk with nothing to terminate.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assembly {
    /// No message in progress.
    Idle,
    /// Filling the slot under `head`.
    Filling,
    /// Dropping the rest of a message until the next start chunk.
    Discarding,
}

/// Chunk-to-slot reassembler. Sole owner of the ring's `head`.
pub struct FrameReassembler {
    producer: SlotProducer,
    signal: ConsumerSignal,
    stats: Arc<PipelineStats>,
    byte_order: ByteOrder,
    state: Assembly,
}

impl FrameReassembler {
    pub fn new(
        producer: SlotProducer,
        signal: ConsumerSignal,
        stats: Arc<PipelineStats>,
        byte_order: ByteOrder,
    ) -> Self {
        Self {
            producer,
            signal,
            stats,
            byte_order,
            state: Assembly::Idle,
        }
    }

    /// Feed one transport chunk.
    ///
    /// Errors are already logged and counted when returned; none of
    /// them are fatal and the caller should keep feeding chunks.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<ChunkOutcome, DisplayError> {
        PipelineStats::bump(&self.stats.chunks);
        PipelineStats::add(&self.stats.chunk_bytes, chunk.len());

        if chunk.len() > MAX_CHUNK {
            PipelineStats::bump(&self.stats.malformed_chunks);
            warn!("chunk of {} bytes exceeds {MAX_CHUNK}", chunk.len());
            return Err(DisplayError::ChunkTooLarge {
                size: chunk.len(),
                max: MAX_CHUNK,
            });
        }

        let Some(&command_byte) = chunk.first() else {
            return self.terminate();
        };

        let command = match Command::parse(command_byte) {
            Ok(cmd) if cmd.kind.blit_kind().is_some() => cmd,
            Ok(cmd) => {
                PipelineStats::bump(&self.stats.unknown_commands);
                error!("ignoring chunk with unsupported command {:?}", cmd.kind);
                return Err(DisplayError::UnsupportedCommand(cmd.kind as u8));
            }
            Err(e) => {
                PipelineStats::bump(&self.stats.unknown_commands);
                error!("ignoring chunk: {e}");
                return Err(e);
            }
        };

        let is_short = chunk.len() < MAX_CHUNK;
        if command.is_start() {
            self.start(command, chunk, is_short)
        } else {
            self.continuation(&chunk[COMMAND_LEN..], is_short)
        }
    }

    fn start(&mut self, command: Command, chunk: &[u8], is_short: bool) -> Result<ChunkOutcome, DisplayError> {
        let header = match BlitHeader::decode(&chunk[COMMAND_LEN..], self.byte_order) {
            Ok(h) => h,
            Err(e) => {
                PipelineStats::bump(&self.stats.malformed_chunks);
                self.state = Assembly::Discarding;
                warn!("dropping start chunk of {} bytes: {e}", chunk.len());
                return Err(e);
            }
        };
        let Some(kind) = command.kind.blit_kind() else {
            return Err(DisplayError::UnsupportedCommand(command.kind as u8));
        };
        let data = &chunk[START_HEADER_LEN..];

        let appended = self.producer.with_head_slot(|slot| {
            slot.reset(kind, header);
            slot.append(data).map(|()| slot.len())
        });
        let length = match appended {
            Ok(Ok(length)) => length,
            Ok(Err(e)) => return Err(self.drop_oversize(e)),
            Err(e) => {
                PipelineStats::bump(&self.stats.overruns);
                self.state = Assembly::Discarding;
                error!("consumer overrun, dropping message: {e}");
                return Err(e);
            }
        };

        trace!(?kind, ?header, length, "start of message");
        self.state = Assembly::Filling;
        if is_short { self.commit(length) } else { Ok(ChunkOutcome::Accepted { length }) }
    }

    fn continuation(&mut self, data: &[u8], is_short: bool) -> Result<ChunkOutcome, DisplayError> {
        match self.state {
            Assembly::Idle => {
                PipelineStats::bump(&self.stats.orphan_chunks);
                warn!("continuation chunk with no message in progress");
                return Err(DisplayError::OrphanContinuation);
            }
            Assembly::Discarding => {
                if is_short {
                    self.state = Assembly::Idle;
                }
                return Ok(ChunkOutcome::Discarded);
            }
            Assembly::Filling => {}
        }

        let appended = self
            .producer
            .with_head_slot(|slot| slot.append(data).map(|()| slot.len()));
        let length = match appended {
            Ok(Ok(length)) => length,
            Ok(Err(e)) => return Err(self.drop_oversize(e)),
            Err(e) => {
                PipelineStats::bump(&self.stats.overruns);
                self.state = Assembly::Discarding;
                error!("consumer overrun, dropping message: {e}");
                return Err(e);
            }
        };

        if is_short { self.commit(length) } else { Ok(ChunkOutcome::Accepted { length }) }
    }

    /// Zero-length chunk: ends a message whose last chunk was full.
    fn terminate(&mut self) -> Result<ChunkOutcome, DisplayError> {
        match self.state {
            Assembly::Filling => {
                let length = self.producer.with_head_slot(|slot| slot.len())?;
                self.commit(length)
            }
            Assembly::Discarding => {
                self.state = Assembly::Idle;
                Ok(ChunkOutcome::Discarded)
            }
            Assembly::Idle => Ok(ChunkOutcome::Ignored),
        }
    }

    fn commit(&mut self, length: usize) -> Result<ChunkOutcome, DisplayError> {
        self.state = Assembly::Idle;
        match self.producer.commit() {
            Ok(slot) => {
                PipelineStats::bump(&self.stats.commits);
                debug!(slot, length, "message committed");
                self.signal.raise();
                PipelineStats::bump(&self.stats.signals);
                Ok(ChunkOutcome::Committed { slot, length })
            }
            Err(e) => {
                PipelineStats::bump(&self.stats.ring_full_drops);
                warn!("dropping complete message: {e}");
                Err(e)
            }
        }
    }

    fn drop_oversize(&mut self, e: DisplayError) -> DisplayError {
        PipelineStats::bump(&self.stats.oversize_drops);
        self.state = Assembly::Discarding;
        error!("dropping rest of message: {e}");
        e
    }

    /// Index the next message will be written to.
    pub fn head(&self) -> usize {
        self.producer.head()
    }

    /// Committed messages the consumer has not released yet.
    pub fn pending(&self) -> usize {
        self.producer.pending()
    }

    /// Whether a message is partially assembled.
    pub fn in_progress(&self) -> bool {
        self.state == Assembly::Filling
    }

    /// Forget any partial message, e.g. after the host disconnected.
    ///
    /// The half-filled slot is left as is; the next start chunk
    /// overwrites it.
    pub fn abandon(&mut self) {
        if self.state != Assembly::Idle {
            debug!("abandoning partial message");
        }
        self.state = Assembly::Idle;
    }
}

// ── Tests ────────────────────────────────────────────────────────
