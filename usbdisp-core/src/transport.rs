//! Chunk sources feeding the reassembler.
//!
//! The gadget only ever sees a stream of bulk-OUT packets of at most
//! [`MAX_CHUNK`] bytes. [`ChunkSource`] abstracts where they come from:
//!
//! - [`UdpChunkSource`]: one datagram is one chunk (a host-side relay
//!   or test harness sends them).
//! - [`ReplayChunkSource`]: a recorded stream framed by [`ChunkCodec`].

use std::net::SocketAddr;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::fs::File;
use tokio::net::UdpSocket;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::warn;

use crate::codec::ChunkCodec;
use crate::error::DisplayError;
use crate::protocol::MAX_CHUNK;

/// A stream of wire chunks. `Ok(None)` means the source is exhausted.
#[async_trait]
pub trait ChunkSource: Send {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, DisplayError>;

    /// Human-readable origin, for logs.
    fn describe(&self) -> String;
}

// ── UdpChunkSource ───────────────────────────────────────────────

pub struct UdpChunkSource {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl UdpChunkSource {
    pub async fn bind(addr: SocketAddr) -> Result<Self, DisplayError> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::new(socket))
    }

    /// Wrap an already-bound socket.
    pub fn new(socket: UdpSocket) -> Self {
        // One spare byte so oversized datagrams can be told apart.
        Self {
            socket,
            buf: vec![0u8; MAX_CHUNK + 1],
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DisplayError> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl ChunkSource for UdpChunkSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, DisplayError> {
        loop {
            let (len, peer) = self.socket.recv_from(&mut self.buf).await?;
            if len > MAX_CHUNK {
                warn!("dropping oversized datagram from {peer}");
                continue;
            }
            return Ok(Some(Bytes::copy_from_slice(&self.buf[..len])));
        }
    }

    fn describe(&self) -> String {
        match self.socket.local_addr() {
            Ok(addr) => format!("udp://{addr}"),
            Err(_) => "udp://?".into(),
        }
    }
}

// ── ReplayChunkSource ────────────────────────────────────────────

pub struct ReplayChunkSource {
    frames: FramedRead<File, ChunkCodec>,
    origin: String,
}

impl ReplayChunkSource {
    pub async fn open(path: &Path) -> Result<Self, DisplayError> {
        let file = File::open(path).await?;
        Ok(Self {
            frames: FramedRead::new(file, ChunkCodec),
            origin: path.display().to_string(),
        })
    }
}

#[async_trait]
impl ChunkSource for ReplayChunkSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, DisplayError> {
        self.frames.next().await.transpose()
    }

    fn describe(&self) -> String {
        format!("replay:{}", self.origin)
    }
}

/// Record `chunks` to a replay file, replacing any existing one.
pub async fn write_replay<I>(path: &Path, chunks: I) -> Result<usize, DisplayError>
where
    I: IntoIterator<Item = Bytes>,
{
    let file = File::create(path).await?;
    let mut sink = FramedWrite::new(file, ChunkCodec);
    let mut count = 0;
    for chunk in chunks {
        sink.feed(chunk).await?;
        count += 1;
    }
    sink.flush().await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn udp_datagrams_are_chunks() {
        let mut source = UdpChunkSource::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let target = source.local_addr().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        sender.send_to(&[0u8; 600], target).await.unwrap();
        sender.send_to(&[0x82, 1, 2, 3], target).await.unwrap();
        sender.send_to(&[], target).await.unwrap();

        // The oversized datagram is skipped.
        let first = source.next_chunk().await.unwrap().unwrap();
        assert_eq!(first.as_ref(), &[0x82, 1, 2, 3]);
        let second = source.next_chunk().await.unwrap().unwrap();
        assert!(second.is_empty());
        assert!(source.describe().starts_with("udp://127.0.0.1:"));
    }

    #[tokio::test]
    async fn replay_file_roundtrip() {
        let path = std::env::temp_dir().join(format!("usbdisp-replay-{}.bin", std::process::id()));
        let chunks = vec![
            Bytes::from_static(&[0x82, 0, 0, 0, 0, 1, 0, 1, 0, 0xAA, 0xBB]),
            Bytes::new(),
            Bytes::from(vec![0x02; MAX_CHUNK]),
        ];
        assert_eq!(write_replay(&path, chunks.clone()).await.unwrap(), 3);

        let mut source = ReplayChunkSource::open(&path).await.unwrap();
        let mut read = Vec::new();
        while let Some(chunk) = source.next_chunk().await.unwrap() {
            read.push(chunk);
        }
        assert_eq!(read, chunks);
        assert!(source.describe().starts_with("replay:"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_replay_file_is_io_error() {
        let path = std::env::temp_dir().join("usbdisp-does-not-exist.bin");
        assert!(matches!(
            ReplayChunkSource::open(&path).await,
            Err(DisplayError::Io(_))
        ));
    }
}
