//! Destination pixel surfaces.
//!
//! The compositor writes into anything implementing [`Surface`]: a
//! linear byte buffer with a fixed pixel depth and a row stride.
//! Acquiring a real framebuffer device is the embedder's business;
//! [`MemorySurface`] is the heap-backed implementation used by the
//! gadget service and the tests.

use crate::error::DisplayError;

/// The one pixel depth the pipeline renders.
pub const BITS_PER_PIXEL: u32 = 16;

/// A writable framebuffer.
pub trait Surface: Send {
    /// Bits per pixel.
    fn bits_per_pixel(&self) -> u32;

    /// Length of one row, in bits.
    fn stride_bits(&self) -> u64;

    /// The whole pixel buffer.
    fn pixels(&self) -> &[u8];

    fn pixels_mut(&mut self) -> &mut [u8];

    /// Total size in bytes.
    fn size(&self) -> usize {
        self.pixels().len()
    }
}

/// Byte offset of pixel `(x, y)` on a surface.
pub fn blit_offset(x: u16, y: u16, bits_per_pixel: u32, stride_bits: u64) -> usize {
    ((x as u64 * bits_per_pixel as u64 + y as u64 * stride_bits) / 8) as usize
}

// ── MemorySurface ────────────────────────────────────────────────

/// A 16-bpp surface backed by a `Vec<u8>`.
#[derive(Debug, Clone)]
pub struct MemorySurface {
    width: u32,
    height: u32,
    /// Row pitch in **bytes** (may exceed `width * 2`).
    stride: u32,
    data: Vec<u8>,
}

impl MemorySurface {
    /// Tightly packed surface of `width × height` pixels.
    pub fn new(width: u32, height: u32) -> Self {
        let stride = width * BITS_PER_PIXEL / 8;
        Self {
            width,
            height,
            stride,
            data: vec![0u8; stride as usize * height as usize],
        }
    }

    /// Surface with padded rows.
    pub fn with_stride(width: u32, height: u32, stride: u32) -> Result<Self, DisplayError> {
        if stride < width * BITS_PER_PIXEL / 8 {
            return Err(DisplayError::InvalidConfig(format!(
                "stride {stride} too small for {width} pixels"
            )));
        }
        Ok(Self {
            width,
            height,
            stride,
            data: vec![0u8; stride as usize * height as usize],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row pitch in bytes.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// The two bytes of pixel `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 2] {
        let offset = y as usize * self.stride as usize + x as usize * 2;
        [self.data[offset], self.data[offset + 1]]
    }

    /// BLAKE3 digest of the pixel buffer.
    pub fn digest(&self) -> blake3::Hash {
        blake3::hash(&self.data)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl Surface for MemorySurface {
    fn bits_per_pixel(&self) -> u32 {
        BITS_PER_PIXEL
    }

    fn stride_bits(&self) -> u64 {
        self.stride as u64 * 8
    }

    fn pixels(&self) -> &[u8] {
        &self.data
    }

    fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_formula() {
        // 800-pixel rows, 16 bpp: stride 1600 bytes = 12800 bits.
        assert_eq!(blit_offset(0, 0, 16, 12_800), 0);
        assert_eq!(blit_offset(10, 0, 16, 12_800), 20);
        assert_eq!(blit_offset(0, 1, 16, 12_800), 1600);
        assert_eq!(blit_offset(799, 479, 16, 12_800), 479 * 1600 + 799 * 2);
    }

    #[test]
    fn padded_stride() {
        let s = MemorySurface::with_stride(10, 4, 32).unwrap();
        assert_eq!(s.size(), 128);
        assert_eq!(s.stride_bits(), 256);
        assert!(MemorySurface::with_stride(10, 4, 19).is_err());
    }

    #[test]
    fn digest_changes_with_content() {
        let mut s = MemorySurface::new(4, 4);
        let before = s.digest();
        s.pixels_mut()[0] = 1;
        assert_ne!(before, s.digest());
    }
}
