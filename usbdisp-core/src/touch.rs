//! Touch report side channel.
//!
//! Reports travel on their own interrupt endpoint, independent of the
//! display pipeline. Each one is five bytes:
//!
//! ```text
//! pressed: u8   (0 = released, 1 = touching)
//! x:       u16  (little-endian)
//! y:       u16  (little-endian)
//! ```
//!
//! Delivery is best effort: when the queue is full the report is dropped
//! and counted, the caller never waits.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::trace;

use crate::error::DisplayError;

/// Encoded size of one report.
pub const TOUCH_REPORT_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchReport {
    pub pressed: bool,
    pub x: u16,
    pub y: u16,
}

impl TouchReport {
    pub fn press(x: u16, y: u16) -> Self {
        Self { pressed: true, x, y }
    }

    pub fn release(x: u16, y: u16) -> Self {
        Self { pressed: false, x, y }
    }

    pub fn to_bytes(&self) -> [u8; TOUCH_REPORT_LEN] {
        let x = self.x.to_le_bytes();
        let y = self.y.to_le_bytes();
        [self.pressed as u8, x[0], x[1], y[0], y[1]]
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, DisplayError> {
        if data.len() < TOUCH_REPORT_LEN {
            return Err(DisplayError::MalformedChunk("touch report shorter than 5 bytes"));
        }
        Ok(Self {
            pressed: data[0] != 0,
            x: u16::from_le_bytes([data[1], data[2]]),
            y: u16::from_le_bytes([data[3], data[4]]),
        })
    }
}

// ── TouchReporter ────────────────────────────────────────────────

/// Sending half of the report queue.
#[derive(Debug, Clone)]
pub struct TouchReporter {
    tx: mpsc::Sender<[u8; TOUCH_REPORT_LEN]>,
    dropped: Arc<AtomicU64>,
}

/// Create a report queue holding at most `depth` pending reports.
pub fn channel(depth: usize) -> (TouchReporter, mpsc::Receiver<[u8; TOUCH_REPORT_LEN]>) {
    let (tx, rx) = mpsc::channel(depth.max(1));
    (
        TouchReporter {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

impl TouchReporter {
    /// Queue a report. Returns `false` if it was dropped.
    pub fn report(&self, report: TouchReport) -> bool {
        match self.tx.try_send(report.to_bytes()) {
            Ok(()) => true,
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(?report, "touch report dropped: {e}");
                false
            }
        }
    }

    /// Reports lost to a full or closed queue.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_layout() {
        let r = TouchReport::press(0x0123, 0x01DF);
        assert_eq!(r.to_bytes(), [1, 0x23, 0x01, 0xDF, 0x01]);
        assert_eq!(TouchReport::release(0, 0).to_bytes(), [0; 5]);
        assert_eq!(TouchReport::from_bytes(&r.to_bytes()).unwrap(), r);
        assert!(TouchReport::from_bytes(&[1, 2]).is_err());
    }

    #[tokio::test]
    async fn full_queue_drops() {
        let (reporter, mut rx) = channel(1);
        assert!(reporter.report(TouchReport::press(1, 2)));
        assert!(!reporter.report(TouchReport::press(3, 4)));
        assert_eq!(reporter.dropped(), 1);

        assert_eq!(rx.recv().await.unwrap(), [1, 1, 0, 2, 0]);
        assert!(reporter.report(TouchReport::release(3, 4)));
    }

    #[test]
    fn closed_queue_drops() {
        let (reporter, rx) = channel(4);
        drop(rx);
        assert!(!reporter.report(TouchReport::press(0, 0)));
        assert_eq!(reporter.dropped(), 1);
    }
}
