//! Test-pattern generator for replay files.
//!
//! Draws a shaded checkerboard one row per message, alternating RLE and
//! raw rows, so a replay exercises both blit paths.

use std::path::Path;

use bytes::Bytes;

use usbdisp_core::{BlitHeader, BlitKind, ByteOrder, DisplayError, packetize, rle, write_replay};

/// Square size of the checkerboard, in pixels.
const CELL: u32 = 16;

/// The RGB565 value of pixel `(x, y)` in the pattern.
pub fn pattern_pixel(x: u32, y: u32) -> u16 {
    let shade = ((x + y) % 32) as u16;
    if (x / CELL + y / CELL) % 2 == 0 { shade << 11 } else { shade << 6 | 0x001F }
}

pub fn pattern_row(y: u32, width: u32) -> Vec<u16> {
    (0..width).map(|x| pattern_pixel(x, y)).collect()
}

/// Every chunk needed to draw the full pattern.
pub fn pattern_chunks(width: u32, height: u32, order: ByteOrder) -> Vec<Bytes> {
    let mut chunks = Vec::new();
    for y in 0..height {
        let row = pattern_row(y, width);
        let header = BlitHeader::new(0, y as u16, width as u16, 1);
        if y % 2 == 0 {
            chunks.extend(packetize(BlitKind::Rle, &header, &rle::encode(&row), order));
        } else {
            let raw: Vec<u8> = row.iter().flat_map(|p| p.to_ne_bytes()).collect();
            chunks.extend(packetize(BlitKind::Raw, &header, &raw, order));
        }
    }
    chunks
}

/// Write the pattern as a replay file. Returns the number of chunks.
pub async fn write_pattern(path: &Path, width: u32, height: u32, order: ByteOrder) -> Result<usize, DisplayError> {
    write_replay(path, pattern_chunks(width, height, order)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkerboard_cells_alternate() {
        assert_eq!(pattern_pixel(0, 0), 0);
        assert_eq!(pattern_pixel(1, 0), 1 << 11);
        assert_eq!(pattern_pixel(16, 0), 16 << 6 | 0x1F);
        assert_eq!(pattern_pixel(16, 16), 0);
    }

    #[test]
    fn one_message_per_row() {
        let chunks = pattern_chunks(32, 4, ByteOrder::Little);
        let starts = chunks.iter().filter(|c| c.first().is_some_and(|b| b & 0x80 != 0)).count();
        assert_eq!(starts, 4);
        assert_eq!(chunks[0][0], 0x85);
        assert_eq!(chunks[1][0], 0x82);
    }
}
