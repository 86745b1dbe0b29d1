//! Domain-specific error types for the display pipeline.
//!
//! All fallible operations return `Result<T, DisplayError>`.
//! Per-message failures on the producer and consumer paths are
//! reported through these variants but never abort the stream: the
//! caller logs them and moves on to the next chunk or slot.

use thiserror::Error;

/// The canonical error type for the display pipeline.
#[derive(Debug, Error)]
pub enum DisplayError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// The command kind is defined by the protocol but not rendered here.
    #[error("unsupported command kind: {0}")]
    UnsupportedCommand(u8),

    /// A chunk was too short to carry the fields it announced.
    #[error("malformed chunk: {0}")]
    MalformedChunk(&'static str),

    /// The transport delivered more than one chunk's worth of bytes.
    #[error("chunk too large: {size} bytes (max {max})")]
    ChunkTooLarge { size: usize, max: usize },

    // ── Reassembly Errors ────────────────────────────────────────
    /// Appending a continuation would overflow the slot.
    #[error("message too big: {needed} bytes (slot capacity {capacity})")]
    Oversize { needed: usize, capacity: usize },

    /// A continuation chunk arrived with no message in progress.
    #[error("continuation chunk without a start-of-message")]
    OrphanContinuation,

    /// The producer's slot is still held by the consumer.
    #[error("slot {slot} is busy (consumer overrun)")]
    SlotBusy { slot: usize },

    /// Backpressure mode refused a commit because every slot is pending.
    #[error("ring full: all {slots} slots pending")]
    RingFull { slots: usize },

    // ── Compositing Errors ───────────────────────────────────────
    /// The consumer ran with no destination surface attached.
    #[error("no destination surface attached ({pending} slot(s) pending)")]
    NoSurface { pending: usize },

    /// A raw blit would write past the end of the surface.
    #[error("blit out of bounds: offset {offset} + {len} bytes > surface size {size}")]
    OutOfBounds { offset: usize, len: usize, size: usize },

    /// An RLE segment header announced more data than the payload holds.
    #[error("malformed RLE segment at payload offset {position}")]
    MalformedRle { position: usize },

    /// An RLE segment would write past the end of the surface.
    #[error("RLE overflow after {written} bytes: needs {needed} of {size}")]
    RleOverflow { written: usize, needed: usize, size: usize },

    // ── Transport Errors ─────────────────────────────────────────
    /// The socket or file layer reported an error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Configuration / Lifecycle Errors ─────────────────────────
    /// A configuration value is outside what the pipeline supports.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The consumer worker task panicked or was aborted.
    #[error("worker failed: {0}")]
    Worker(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<tokio::task::JoinError> for DisplayError {
    fn from(e: tokio::task::JoinError) -> Self {
        DisplayError::Worker(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = DisplayError::Oversize {
            needed: 771_500,
            capacity: 771_000,
        };
        assert!(e.to_string().contains("771500"));
        assert!(e.to_string().contains("771000"));

        let e = DisplayError::OutOfBounds {
            offset: 10,
            len: 20,
            size: 16,
        };
        assert!(e.to_string().contains("out of bounds"));
    }

    #[tokio::test]
    async fn from_join_error() {
        let handle = tokio::spawn(async { panic!("worker blew up") });
        let e: DisplayError = handle.await.unwrap_err().into();
        assert!(matches!(e, DisplayError::Worker(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: DisplayError = io_err.into();
        assert!(matches!(e, DisplayError::Io(_)));
    }
}
