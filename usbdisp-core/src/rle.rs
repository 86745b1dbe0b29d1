//! Run-length encoding for 16-bit pixel data.
//!
//! A payload is a sequence of segments. Each segment starts with one
//! header byte:
//!
//! ```text
//! bit 7     repeat flag
//! bits 0-6  pixel_count - 1
//! ```
//!
//! A repeat segment carries one 2-byte pixel to be stored
//! `pixel_count` times. A literal segment carries `pixel_count * 2`
//! bytes copied verbatim. Encoders keep segments at or below
//! [`MAX_SEGMENT_PIXELS`] (128 decoded bytes).

use crate::error::DisplayError;

/// Header bits holding `pixel_count - 1`.
pub const SIZE_MASK: u8 = 0x7F;

/// Header bit marking a repeat segment.
pub const REPEAT_FLAG: u8 = 0x80;

/// Largest segment an encoder emits.
pub const MAX_SEGMENT_PIXELS: usize = 64;

/// The only pixel depth this format supports.
pub const BYTES_PER_PIXEL: usize = 2;

// ── Segment ──────────────────────────────────────────────────────

/// One decoded segment header plus its source bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Repeat { count: usize, pixel: [u8; 2] },
    Literal { data: &'a [u8] },
}

impl Segment<'_> {
    /// Bytes this segment expands to on the surface.
    pub fn decoded_len(&self) -> usize {
        match self {
            Segment::Repeat { count, .. } => count * BYTES_PER_PIXEL,
            Segment::Literal { data } => data.len(),
        }
    }
}

/// Iterator over the segments of an RLE payload.
///
/// Yields an error and stops when a segment header announces more
/// bytes than remain in the payload.
pub struct Segments<'a> {
    payload: &'a [u8],
    cursor: usize,
}

pub fn segments(payload: &[u8]) -> Segments<'_> {
    Segments { payload, cursor: 0 }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Result<Segment<'a>, DisplayError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.payload.len() {
            return None;
        }
        let position = self.cursor;
        let head = self.payload[position];
        let count = (head & SIZE_MASK) as usize + 1;
        let body = position + 1;

        let (segment, end) = if head & REPEAT_FLAG != 0 {
            let end = body + BYTES_PER_PIXEL;
            match self.payload.get(body..end) {
                Some(px) => (Segment::Repeat { count, pixel: [px[0], px[1]] }, end),
                None => {
                    self.cursor = self.payload.len();
                    return Some(Err(DisplayError::MalformedRle { position }));
                }
            }
        } else {
            let end = body + count * BYTES_PER_PIXEL;
            match self.payload.get(body..end) {
                Some(data) => (Segment::Literal { data }, end),
                None => {
                    self.cursor = self.payload.len();
                    return Some(Err(DisplayError::MalformedRle { position }));
                }
            }
        };

        self.cursor = end;
        Some(Ok(segment))
    }
}

// ── Decoding ─────────────────────────────────────────────────────

/// Expand `payload` into `dest` starting at byte `offset`.
///
/// Returns the number of bytes written. Segments are applied in order,
/// so on error every segment before the failing one is already on the
/// surface.
pub fn decode_into(payload: &[u8], dest: &mut [u8], offset: usize) -> Result<usize, DisplayError> {
    let mut cursor = offset;
    for segment in segments(payload) {
        let segment = segment?;
        let len = segment.decoded_len();
        let end = cursor + len;
        if end > dest.len() {
            return Err(DisplayError::RleOverflow {
                written: cursor.saturating_sub(offset),
                needed: end,
                size: dest.len(),
            });
        }

        match segment {
            Segment::Repeat { pixel, .. } => {
                for px in dest[cursor..end].chunks_exact_mut(BYTES_PER_PIXEL) {
                    px.copy_from_slice(&pixel);
                }
            }
            Segment::Literal { data } => dest[cursor..end].copy_from_slice(data),
        }
        cursor = end;
    }
    Ok(cursor - offset)
}

/// Total decoded size of a payload, or the first malformed segment.
pub fn decoded_len(payload: &[u8]) -> Result<usize, DisplayError> {
    segments(payload).try_fold(0, |acc, seg| Ok(acc + seg?.decoded_len()))
}

// ── Encoding (host side) ─────────────────────────────────────────

/// Encode a row of pixels, stored in host-native byte order.
///
/// Runs of two or more identical pixels become repeat segments; the
/// remainder is grouped into literal segments.
pub fn encode(pixels: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() * BYTES_PER_PIXEL + pixels.len() / MAX_SEGMENT_PIXELS + 1);
    let mut i = 0;

    while i < pixels.len() {
        let run = run_length(&pixels[i..], MAX_SEGMENT_PIXELS);
        if run >= 2 {
            out.push(REPEAT_FLAG | (run - 1) as u8);
            out.extend_from_slice(&pixels[i].to_ne_bytes());
            i += run;
            continue;
        }

        let start = i;
        i += 1;
        while i < pixels.len() && i - start < MAX_SEGMENT_PIXELS && run_length(&pixels[i..], 2) < 2 {
            i += 1;
        }
        out.push((i - start - 1) as u8);
        for px in &pixels[start..i] {
            out.extend_from_slice(&px.to_ne_bytes());
        }
    }
    out
}

fn run_length(pixels: &[u16], limit: usize) -> usize {
    match pixels.first() {
        Some(first) => pixels.iter().take(limit).take_while(|p| *p == first).count(),
        None => 0,
    }
}

// ── Tests ────────────────────────────────────────────────────────
