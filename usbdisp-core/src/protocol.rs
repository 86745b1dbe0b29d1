//! Wire protocol spoken by the host display driver.
//!
//! Updates arrive on a bulk OUT endpoint as a sequence of chunks of at
//! most [`MAX_CHUNK`] bytes. A chunk shorter than [`MAX_CHUNK`] ends
//! the current message.
//!
//! ## Wire format
//!
//! **Start chunk** (command byte has [`CommandFlags::START`] set):
//! ```text
//! command:  u8   (1)   kind | flags
//! x:        u16  (2)
//! y:        u16  (2)
//! width:    u16  (2)
//! height:   u16  (2)
//! payload:  [u8] (≤ 503)
//! ```
//!
//! **Continuation chunk**:
//! ```text
//! command:  u8   (1)   kind, START clear
//! payload:  [u8] (≤ 511)
//! ```
//!
//! The header fields are read in host-native byte order unless
//! configured otherwise (see [`ByteOrder`]).

use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::DisplayError;

// ── Constants ────────────────────────────────────────────────────

/// Bulk endpoint packet size; every chunk is at most this long.
pub const MAX_CHUNK: usize = 512;

/// Size of the command byte leading every chunk.
pub const COMMAND_LEN: usize = 1;

/// Size of the `{x, y, width, height}` header.
pub const BLIT_HEADER_LEN: usize = 8;

/// Bytes consumed before the payload on a start chunk.
pub const START_HEADER_LEN: usize = COMMAND_LEN + BLIT_HEADER_LEN;

/// Command byte bits selecting the [`CommandKind`].
pub const KIND_MASK: u8 = 0x3F;

bitflags! {
    /// Flag bits carried above [`KIND_MASK`] in the command byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CommandFlags: u8 {
        /// Host asks the device to clear its dirty state. Ignored.
        const CLEAR_DIRTY = 0x40;
        /// First chunk of a message; a blit header follows.
        const START = 0x80;
    }
}

// ── CommandKind ──────────────────────────────────────────────────

/// Command kinds defined by the host driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandKind {
    Nope = 0,
    Fill = 1,
    Bitblt = 2,
    Rect = 3,
    CopyArea = 4,
    BitbltRle = 5,
}

impl CommandKind {
    /// The blit encoding for kinds this device renders.
    pub fn blit_kind(self) -> Option<BlitKind> {
        match self {
            CommandKind::Bitblt => Some(BlitKind::Raw),
            CommandKind::BitbltRle => Some(BlitKind::Rle),
            _ => None,
        }
    }
}

impl TryFrom<u8> for CommandKind {
    type Error = DisplayError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CommandKind::Nope),
            1 => Ok(CommandKind::Fill),
            2 => Ok(CommandKind::Bitblt),
            3 => Ok(CommandKind::Rect),
            4 => Ok(CommandKind::CopyArea),
            5 => Ok(CommandKind::BitbltRle),
            other => Err(DisplayError::UnknownVariant {
                type_name: "CommandKind",
                value: other as u64,
            }),
        }
    }
}

/// Pixel encoding of a blit payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlitKind {
    /// `RAW_BLT`: uncompressed 16-bit pixels.
    Raw,
    /// `RLE_BLT`: literal/repeat segments (see [`crate::rle`]).
    Rle,
}

impl BlitKind {
    pub fn command_kind(self) -> CommandKind {
        match self {
            BlitKind::Raw => CommandKind::Bitblt,
            BlitKind::Rle => CommandKind::BitbltRle,
        }
    }
}

// ── Command ──────────────────────────────────────────────────────

/// A decoded command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub flags: CommandFlags,
}

impl Command {
    /// Command byte opening a new message of `kind`.
    pub fn start(kind: BlitKind) -> Self {
        Self {
            kind: kind.command_kind(),
            flags: CommandFlags::START,
        }
    }

    /// Command byte for the continuation chunks of a `kind` message.
    pub fn continuation(kind: BlitKind) -> Self {
        Self {
            kind: kind.command_kind(),
            flags: CommandFlags::empty(),
        }
    }

    pub fn parse(byte: u8) -> Result<Self, DisplayError> {
        Ok(Self {
            kind: CommandKind::try_from(byte & KIND_MASK)?,
            flags: CommandFlags::from_bits_truncate(byte),
        })
    }

    pub fn to_byte(self) -> u8 {
        self.kind as u8 | self.flags.bits()
    }

    pub fn is_start(self) -> bool {
        self.flags.contains(CommandFlags::START)
    }
}

// ── ByteOrder ────────────────────────────────────────────────────

/// Byte order of the multi-byte header fields on the wire.
///
/// The host driver writes its native order and the device firmware
/// reads it back without conversion, so `Native` only works when both
/// ends agree. `Little`/`Big` pin the order explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Native,
    Little,
    Big,
}

impl ByteOrder {
    fn read_u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::Native => u16::from_ne_bytes(bytes),
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        }
    }

    fn write_u16(self, value: u16) -> [u8; 2] {
        match self {
            ByteOrder::Native => value.to_ne_bytes(),
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        }
    }
}

// ── BlitHeader ───────────────────────────────────────────────────

/// Destination rectangle of a blit, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlitHeader {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl BlitHeader {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self { x, y, width, height }
    }

    /// Decode the four header fields from the start of `data`.
    pub fn decode(data: &[u8], order: ByteOrder) -> Result<Self, DisplayError> {
        if data.len() < BLIT_HEADER_LEN {
            return Err(DisplayError::MalformedChunk("start chunk shorter than blit header"));
        }
        let field = |i: usize| order.read_u16([data[i], data[i + 1]]);
        Ok(Self {
            x: field(0),
            y: field(2),
            width: field(4),
            height: field(6),
        })
    }

    pub fn encode(&self, order: ByteOrder) -> [u8; BLIT_HEADER_LEN] {
        let mut buf = [0u8; BLIT_HEADER_LEN];
        buf[0..2].copy_from_slice(&order.write_u16(self.x));
        buf[2..4].copy_from_slice(&order.write_u16(self.y));
        buf[4..6].copy_from_slice(&order.write_u16(self.width));
        buf[6..8].copy_from_slice(&order.write_u16(self.height));
        buf
    }
}

// ── Packetizer (host side) ───────────────────────────────────────

/// Split one update message into wire chunks, the way the host sends it.
///
/// When the final chunk comes out exactly [`MAX_CHUNK`] bytes long a
/// zero-length chunk is appended so the device still sees a short
/// terminator.
pub fn packetize(kind: BlitKind, header: &BlitHeader, payload: &[u8], order: ByteOrder) -> Vec<Bytes> {
    let first_room = MAX_CHUNK - START_HEADER_LEN;
    let (first, mut rest) = payload.split_at(payload.len().min(first_room));

    let mut chunks = Vec::with_capacity(1 + rest.len() / (MAX_CHUNK - COMMAND_LEN) + 1);
    let mut buf = BytesMut::with_capacity(MAX_CHUNK);
    buf.put_u8(Command::start(kind).to_byte());
    buf.put_slice(&header.encode(order));
    buf.put_slice(first);
    let mut last_len = buf.len();
    chunks.push(buf.freeze());

    let continuation = Command::continuation(kind).to_byte();
    while !rest.is_empty() {
        let take = rest.len().min(MAX_CHUNK - COMMAND_LEN);
        let (body, tail) = rest.split_at(take);
        let mut buf = BytesMut::with_capacity(COMMAND_LEN + take);
        buf.put_u8(continuation);
        buf.put_slice(body);
        last_len = buf.len();
        chunks.push(buf.freeze());
        rest = tail;
    }

    if last_len == MAX_CHUNK {
        chunks.push(Bytes::new());
    }
    chunks
}

// ── Tests ────────────────────────────────────────────────────────
