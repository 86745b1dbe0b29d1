//! Consumer side: renders committed slots onto the surface.
//!
//! [`Compositor::drain`] walks the ring from `tail` to `head`, blits
//! each slot and releases it. A slot that fails to render is still
//! released; only a missing surface leaves slots pending.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::DisplayError;
use crate::protocol::BlitKind;
use crate::ring::SlotConsumer;
use crate::rle;
use crate::slot::Slot;
use crate::stats::PipelineStats;
use crate::surface::{Surface, blit_offset};

// ── DrainReport ──────────────────────────────────────────────────

/// Result of one consumer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Slots rendered successfully.
    pub rendered: usize,
    /// Slots released after a render error.
    pub failed: usize,
    /// Bytes written to the surface.
    pub bytes_written: usize,
}

// ── Compositor ───────────────────────────────────────────────────

/// Slot-to-surface renderer. Sole owner of the ring's `tail`.
pub struct Compositor<S: Surface> {
    consumer: SlotConsumer,
    surface: Option<S>,
    stats: Arc<PipelineStats>,
}

impl<S: Surface> Compositor<S> {
    pub fn new(consumer: SlotConsumer, surface: Option<S>, stats: Arc<PipelineStats>) -> Self {
        Self {
            consumer,
            surface,
            stats,
        }
    }

    /// Attach a destination surface, returning the previous one.
    pub fn attach(&mut self, surface: S) -> Option<S> {
        self.surface.replace(surface)
    }

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    /// Committed slots waiting to be rendered.
    pub fn pending(&self) -> usize {
        self.consumer.pending()
    }

    /// Render every committed slot.
    ///
    /// Without a surface this returns [`DisplayError::NoSurface`] and
    /// touches nothing, so the slots are still there once one is
    /// attached (unless the producer laps them first).
    pub fn drain(&mut self) -> Result<DrainReport, DisplayError> {
        PipelineStats::bump(&self.stats.consumer_runs);

        let Some(surface) = self.surface.as_mut() else {
            let pending = self.consumer.pending();
            PipelineStats::bump(&self.stats.missing_surface);
            error!("no surface attached, {pending} slot(s) left pending");
            return Err(DisplayError::NoSurface { pending });
        };

        let mut report = DrainReport::default();
        while let Some(rendered) = self
            .consumer
            .with_tail_slot(|slot| blit_slot(slot, surface, &self.stats))
        {
            match rendered {
                Ok(written) => {
                    report.rendered += 1;
                    report.bytes_written += written;
                }
                Err(_) => report.failed += 1,
            }
            self.consumer.release();
        }

        if report.rendered + report.failed > 0 {
            debug!(
                rendered = report.rendered,
                failed = report.failed,
                bytes = report.bytes_written,
                "consumer run"
            );
        }
        Ok(report)
    }

    /// Take the surface back, consuming the compositor.
    pub fn into_surface(self) -> Option<S> {
        self.surface
    }
}

/// Render one slot. Errors are logged and counted here.
fn blit_slot<S: Surface>(slot: &Slot, surface: &mut S, stats: &PipelineStats) -> Result<usize, DisplayError> {
    let header = slot.header();
    let offset = blit_offset(header.x, header.y, surface.bits_per_pixel(), surface.stride_bits());
    let payload = slot.payload();

    let written = match slot.kind() {
        BlitKind::Raw => {
            let size = surface.size();
            let end = offset.checked_add(payload.len()).filter(|&end| end <= size);
            let Some(end) = end else {
                PipelineStats::bump(&stats.bounds_errors);
                error!(?header, "raw blit of {} bytes at {offset} exceeds surface size {size}", payload.len());
                return Err(DisplayError::OutOfBounds {
                    offset,
                    len: payload.len(),
                    size,
                });
            };
            surface.pixels_mut()[offset..end].copy_from_slice(payload);
            PipelineStats::bump(&stats.raw_blits);
            payload.len()
        }
        BlitKind::Rle => match rle::decode_into(payload, surface.pixels_mut(), offset) {
            Ok(written) => {
                PipelineStats::bump(&stats.rle_blits);
                written
            }
            Err(e) => {
                match e {
                    DisplayError::RleOverflow { .. } => PipelineStats::bump(&stats.bounds_errors),
                    _ => PipelineStats::bump(&stats.malformed_rle),
                }
                warn!(?header, "RLE blit stopped: {e}");
                return Err(e);
            }
        },
    };

    PipelineStats::add(&stats.bytes_written, written);
    Ok(written)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::BlitHeader;
    use crate::ring::{self, RingMode, SlotProducer};
    use crate::surface::MemorySurface;

    fn setup(surface: Option<MemorySurface>) -> (SlotProducer, Compositor<MemorySurface>, Arc<PipelineStats>) {
        let (tx, rx) = ring::channel(4, 4096, RingMode::Overwrite).unwrap();
        let stats = Arc::new(PipelineStats::new());
        (tx, Compositor::new(rx, surface, Arc::clone(&stats)), stats)
    }

    fn commit(tx: &mut SlotProducer, kind: BlitKind, header: BlitHeader, payload: &[u8]) {
        tx.with_head_slot(|s| {
            s.reset(kind, header);
            s.append(payload).unwrap();
        })
        .unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn raw_blit_at_origin() {
        let (mut tx, mut comp, _) = setup(Some(MemorySurface::new(16, 4)));
        let payload: Vec<u8> = (1..=20).collect();
        commit(&mut tx, BlitKind::Raw, BlitHeader::new(0, 0, 10, 1), &payload);

        let report = comp.drain().unwrap();
        assert_eq!(report, DrainReport { rendered: 1, failed: 0, bytes_written: 20 });
        let px = comp.surface().unwrap().pixels();
        assert_eq!(&px[..20], payload.as_slice());
        assert!(px[20..].iter().all(|&b| b == 0));
    }

    #[test]
    fn raw_blit_uses_stride_offset() {
        let surface = MemorySurface::with_stride(8, 4, 20).unwrap();
        let (mut tx, mut comp, _) = setup(Some(surface));
        commit(&mut tx, BlitKind::Raw, BlitHeader::new(3, 2, 2, 1), &[0xAA, 0xBB, 0xCC, 0xDD]);
        comp.drain().unwrap();

        // (3*16 + 2*160) / 8 = 46
        let s = comp.surface().unwrap();
        assert_eq!(&s.pixels()[46..50], &[0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(s.pixel(3, 2), [0xAA, 0xBB]);
    }

    #[test]
    fn raw_blit_out_of_bounds_is_skipped_and_released() {
        let (mut tx, mut comp, stats) = setup(Some(MemorySurface::new(4, 2)));
        // Surface is 16 bytes; offset 14 + 4 overflows.
        commit(&mut tx, BlitKind::Raw, BlitHeader::new(3, 1, 2, 1), &[1, 2, 3, 4]);
        commit(&mut tx, BlitKind::Raw, BlitHeader::new(0, 0, 1, 1), &[7, 7]);

        let report = comp.drain().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.rendered, 1);
        assert_eq!(comp.pending(), 0);
        let px = comp.surface().unwrap().pixels();
        assert_eq!(&px[..2], &[7, 7]);
        assert!(px[2..].iter().all(|&b| b == 0));
        assert_eq!(stats.snapshot().bounds_errors, 1);
    }

    #[test]
    fn rle_repeat_segment_of_64_pixels() {
        let (mut tx, mut comp, stats) = setup(Some(MemorySurface::new(100, 2)));
        let pixel = 0xABCDu16.to_ne_bytes();
        let payload = [rle::REPEAT_FLAG | 63, pixel[0], pixel[1]];
        commit(&mut tx, BlitKind::Rle, BlitHeader::new(10, 1, 64, 1), &payload);

        let report = comp.drain().unwrap();
        assert_eq!(report.bytes_written, 128);
        let s = comp.surface().unwrap();
        let start = 200 + 20;
        assert!(s.pixels()[start..start + 128].chunks_exact(2).all(|p| p == pixel));
        assert_eq!(s.pixels()[start - 1], 0);
        assert_eq!(s.pixels()[start + 128], 0);
        assert_eq!(stats.snapshot().rle_blits, 1);
    }

    #[test]
    fn rle_overflow_keeps_leading_segments() {
        // Segments that would run past the end of the surface are cut
        // off; the bytes decoded before that point stay written.
        let (mut tx, mut comp, stats) = setup(Some(MemorySurface::new(4, 1)));
        let payload = [rle::REPEAT_FLAG | 1, 0x11, 0x22, rle::REPEAT_FLAG | 9, 0x33, 0x44];
        commit(&mut tx, BlitKind::Rle, BlitHeader::new(1, 0, 12, 1), &payload);

        let report = comp.drain().unwrap();
        assert_eq!(report.failed, 1);
        let px = comp.surface().unwrap().pixels();
        assert_eq!(px, &[0, 0, 0x11, 0x22, 0x11, 0x22, 0, 0]);
        assert_eq!(stats.snapshot().bounds_errors, 1);
    }

    #[test]
    fn drains_all_pending_slots_in_order() {
        let (mut tx, mut comp, _) = setup(Some(MemorySurface::new(4, 1)));
        commit(&mut tx, BlitKind::Raw, BlitHeader::new(0, 0, 4, 1), &[1; 8]);
        commit(&mut tx, BlitKind::Raw, BlitHeader::new(0, 0, 2, 1), &[2; 4]);
        commit(&mut tx, BlitKind::Raw, BlitHeader::new(1, 0, 1, 1), &[3; 2]);

        let report = comp.drain().unwrap();
        assert_eq!(report.rendered, 3);
        assert_eq!(comp.surface().unwrap().pixels(), &[2, 2, 3, 3, 1, 1, 1, 1]);
        assert_eq!(comp.drain().unwrap(), DrainReport::default());
    }

    /// Commits one more message the first time pixels are written.
    struct CommitOnWrite {
        inner: MemorySurface,
        producer: SlotProducer,
        next: Option<Vec<u8>>,
    }

    impl Surface for CommitOnWrite {
        fn bits_per_pixel(&self) -> u32 {
            self.inner.bits_per_pixel()
        }

        fn stride_bits(&self) -> u64 {
            self.inner.stride_bits()
        }

        fn pixels(&self) -> &[u8] {
            self.inner.pixels()
        }

        fn pixels_mut(&mut self) -> &mut [u8] {
            if let Some(payload) = self.next.take() {
                commit(&mut self.producer, BlitKind::Raw, BlitHeader::new(2, 0, 2, 1), &payload);
            }
            self.inner.pixels_mut()
        }
    }

    #[test]
    fn message_committed_mid_render_is_drawn_next() {
        let (mut tx, rx) = ring::channel(2, 4096, RingMode::Overwrite).unwrap();
        commit(&mut tx, BlitKind::Raw, BlitHeader::new(0, 0, 2, 1), &[1; 4]);
        let surface = CommitOnWrite {
            inner: MemorySurface::new(4, 1),
            producer: tx,
            next: Some(vec![2; 4]),
        };
        let mut comp = Compositor::new(rx, Some(surface), Arc::new(PipelineStats::new()));

        let report = comp.drain().unwrap();
        assert_eq!(report.rendered, 2);
        assert_eq!(comp.pending(), 0);
        assert_eq!(comp.surface().unwrap().pixels(), &[1, 1, 1, 1, 2, 2, 2, 2]);
    }

    #[test]
    fn missing_surface_leaves_slots_pending() {
        let (mut tx, mut comp, stats) = setup(None);
        commit(&mut tx, BlitKind::Raw, BlitHeader::new(0, 0, 1, 1), &[5, 5]);

        assert!(matches!(comp.drain(), Err(DisplayError::NoSurface { pending: 1 })));
        assert_eq!(comp.pending(), 1);
        assert_eq!(stats.snapshot().missing_surface, 1);

        comp.attach(MemorySurface::new(2, 1));
        assert_eq!(comp.drain().unwrap().rendered, 1);
        assert_eq!(comp.surface().unwrap().pixels(), &[5, 5, 0, 0]);
    }
}
