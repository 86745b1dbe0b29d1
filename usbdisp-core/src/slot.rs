//! Fixed-capacity message slot.

use crate::error::DisplayError;
use crate::protocol::{BlitHeader, BlitKind};

/// Capacity needed to hold one full-screen update of the given size.
///
/// Covers the raw frame plus one RLE header byte per 128 bytes of
/// pixels, so a worst-case literal-only RLE frame also fits.
pub fn slot_capacity_for(width: u32, height: u32, bits_per_pixel: u32) -> usize {
    let frame = width as usize * height as usize * bits_per_pixel as usize / 8;
    frame + (((frame >> 1) + 0x7f) >> 7)
}

/// One in-progress or committed update message.
///
/// The payload buffer is allocated once and reused for every message
/// written into this slot.
#[derive(Debug)]
pub struct Slot {
    kind: BlitKind,
    header: BlitHeader,
    payload: Box<[u8]>,
    length: usize,
}

impl Slot {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            kind: BlitKind::Raw,
            header: BlitHeader::default(),
            payload: vec![0u8; capacity].into_boxed_slice(),
            length: 0,
        }
    }

    /// Start a new message, discarding whatever the slot held.
    pub fn reset(&mut self, kind: BlitKind, header: BlitHeader) {
        self.kind = kind;
        self.header = header;
        self.length = 0;
    }

    /// Append payload bytes; on overflow the slot is left unchanged.
    pub fn append(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        let end = self.length + data.len();
        if end > self.payload.len() {
            return Err(DisplayError::Oversize {
                needed: end,
                capacity: self.payload.len(),
            });
        }
        self.payload[self.length..end].copy_from_slice(data);
        self.length = end;
        Ok(())
    }

    pub fn kind(&self) -> BlitKind {
        self.kind
    }

    pub fn header(&self) -> BlitHeader {
        self.header
    }

    /// The filled part of the payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.length]
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn capacity(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capacity_matches_800x480() {
        // 768000 frame bytes + 3000 segment headers.
        assert_eq!(slot_capacity_for(800, 480, 16), 771_000);
    }

    #[test]
    fn append_and_reset() {
        let mut slot = Slot::with_capacity(8);
        slot.reset(BlitKind::Rle, BlitHeader::new(1, 2, 3, 4));
        slot.append(&[1, 2, 3]).unwrap();
        slot.append(&[4, 5]).unwrap();
        assert_eq!(slot.payload(), &[1, 2, 3, 4, 5]);
        assert_eq!(slot.kind(), BlitKind::Rle);
        assert_eq!(slot.header().y, 2);

        slot.reset(BlitKind::Raw, BlitHeader::default());
        assert!(slot.is_empty());
        assert_eq!(slot.capacity(), 8);
    }

    #[test]
    fn append_overflow_leaves_slot_untouched() {
        let mut slot = Slot::with_capacity(4);
        slot.append(&[9, 9, 9]).unwrap();
        let err = slot.append(&[1, 1]).unwrap_err();
        assert!(matches!(err, DisplayError::Oversize { needed: 5, capacity: 4 }));
        assert_eq!(slot.payload(), &[9, 9, 9]);
    }
}
