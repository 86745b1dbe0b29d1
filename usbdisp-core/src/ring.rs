//! Fixed ring of message slots shared by one producer and one consumer.
//!
//! [`channel`] preallocates every slot and splits the ring into a
//! [`SlotProducer`] and a [`SlotConsumer`]. Neither half is `Clone`, so
//! `head` has exactly one writer (the producer) and `tail` has exactly
//! one writer (the consumer).
//!
//! ```text
//!         tail              head
//!          │                 │
//!   ┌──────▼─────┬───────────▼┬────────────┐
//!   │ committed  │ committed  │ filling    │  ...
//!   └────────────┴────────────┴────────────┘
//! ```
//!
//! `head == tail` means empty. In [`RingMode::Overwrite`] (the default)
//! the producer never looks at `tail`: a consumer that falls `N`
//! commits behind sees `head` wrap onto `tail` and those messages are
//! lost, and the slot under `tail` may be refilled before it is read.
//! [`RingMode::Backpressure`] instead refuses the commit that would
//! make `head` catch up with `tail`.
//!
//! Each slot sits behind its own mutex that acts purely as an ownership
//! latch. The producer only ever `try_lock`s, so the chunk path never
//! blocks; it finds the latch held only when the consumer is still
//! reading a slot the producer has wrapped onto.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use serde::{Deserialize, Serialize};

use crate::error::DisplayError;
use crate::slot::Slot;

/// Whether the producer may lap the consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RingMode {
    /// Commit unconditionally; a lagging consumer loses messages.
    #[default]
    Overwrite,
    /// Drop the newest message when every other slot is still pending.
    Backpressure,
}

struct Shared {
    slots: Box<[Mutex<Slot>]>,
    head: AtomicUsize,
    tail: AtomicUsize,
    mode: RingMode,
}

impl Shared {
    #[inline]
    fn bump(&self, index: usize) -> usize {
        let next = index + 1;
        if next == self.slots.len() { 0 } else { next }
    }

    fn pending(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head + self.slots.len() - tail) % self.slots.len()
    }
}

/// Build a ring of `slots` slots of `capacity` bytes each.
pub fn channel(slots: usize, capacity: usize, mode: RingMode) -> Result<(SlotProducer, SlotConsumer), DisplayError> {
    if slots < 2 {
        return Err(DisplayError::InvalidConfig(format!(
            "ring needs at least 2 slots, got {slots}"
        )));
    }
    let shared = Arc::new(Shared {
        slots: (0..slots).map(|_| Mutex::new(Slot::with_capacity(capacity))).collect(),
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
        mode,
    });
    Ok((
        SlotProducer { shared: Arc::clone(&shared) },
        SlotConsumer { shared, reading: None },
    ))
}

// ── SlotProducer ─────────────────────────────────────────────────

/// Writing half of the ring. Owns `head`.
pub struct SlotProducer {
    shared: Arc<Shared>,
}

impl SlotProducer {
    /// Run `f` against the slot under `head` without blocking.
    pub fn with_head_slot<R>(&mut self, f: impl FnOnce(&mut Slot) -> R) -> Result<R, DisplayError> {
        let index = self.shared.head.load(Ordering::Relaxed);
        let mut slot = match self.shared.slots[index].try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(DisplayError::SlotBusy { slot: index }),
        };
        Ok(f(&mut slot))
    }

    /// Publish the slot under `head` to the consumer.
    ///
    /// Returns the index of the committed slot.
    pub fn commit(&mut self) -> Result<usize, DisplayError> {
        let head = self.shared.head.load(Ordering::Relaxed);
        let next = self.shared.bump(head);
        if self.shared.mode == RingMode::Backpressure && next == self.shared.tail.load(Ordering::Acquire) {
            return Err(DisplayError::RingFull {
                slots: self.shared.slots.len(),
            });
        }
        self.shared.head.store(next, Ordering::Release);
        Ok(head)
    }

    pub fn head(&self) -> usize {
        self.shared.head.load(Ordering::Relaxed)
    }

    /// Committed slots not yet released by the consumer.
    pub fn pending(&self) -> usize {
        self.shared.pending()
    }

    pub fn slot_count(&self) -> usize {
        self.shared.slots.len()
    }

    pub fn mode(&self) -> RingMode {
        self.shared.mode
    }
}

// ── SlotConsumer ─────────────────────────────────────────────────

/// Reading half of the ring. Owns `tail`.
pub struct SlotConsumer {
    shared: Arc<Shared>,
    /// Slot handed out by the last `with_tail_slot`, not yet released.
    reading: Option<usize>,
}

impl SlotConsumer {
    /// Index of the oldest committed slot, if any.
    pub fn peek(&self) -> Option<usize> {
        let tail = self.shared.tail.load(Ordering::Relaxed);
        (tail != self.shared.head.load(Ordering::Acquire)).then_some(tail)
    }

    /// Run `f` against the oldest committed slot.
    ///
    /// The slot stays claimed until [`release`](Self::release), even if
    /// the producer wraps `head` onto it in the meantime.
    pub fn with_tail_slot<R>(&mut self, f: impl FnOnce(&Slot) -> R) -> Option<R> {
        let index = self.peek()?;
        self.reading = Some(index);
        let slot = lock(&self.shared.slots[index]);
        Some(f(&slot))
    }

    /// Hand the slot under `tail` back to the producer.
    ///
    /// After a read, `tail` always moves past the slot that was read. A
    /// commit that landed meanwhile and wrapped `head` onto that slot
    /// is therefore still pending afterwards. Without a prior read this
    /// skips the oldest pending slot and is a no-op on an empty ring.
    pub fn release(&mut self) {
        let index = match self.reading.take() {
            Some(index) => index,
            None => {
                let tail = self.shared.tail.load(Ordering::Relaxed);
                if tail == self.shared.head.load(Ordering::Acquire) {
                    return;
                }
                tail
            }
        };
        self.shared.tail.store(self.shared.bump(index), Ordering::Release);
    }

    pub fn tail(&self) -> usize {
        self.shared.tail.load(Ordering::Relaxed)
    }

    pub fn pending(&self) -> usize {
        self.shared.pending()
    }
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{BlitHeader, BlitKind};

    fn fill(producer: &mut SlotProducer, tag: u8) {
        producer
            .with_head_slot(|slot| {
                slot.reset(BlitKind::Raw, BlitHeader::default());
                slot.append(&[tag]).unwrap();
            })
            .unwrap();
    }

    #[test]
    fn rejects_single_slot_ring() {
        assert!(channel(1, 16, RingMode::Overwrite).is_err());
    }

    #[test]
    fn fifo_order() {
        let (mut tx, mut rx) = channel(3, 16, RingMode::Overwrite).unwrap();
        assert_eq!(rx.peek(), None);

        fill(&mut tx, 1);
        assert_eq!(tx.commit().unwrap(), 0);
        fill(&mut tx, 2);
        assert_eq!(tx.commit().unwrap(), 1);
        assert_eq!(rx.pending(), 2);

        assert_eq!(rx.with_tail_slot(|s| s.payload()[0]), Some(1));
        rx.release();
        assert_eq!(rx.with_tail_slot(|s| s.payload()[0]), Some(2));
        rx.release();
        assert_eq!(rx.peek(), None);

        // Releasing an empty ring is a no-op.
        rx.release();
        assert_eq!(rx.tail(), 2);
    }

    #[test]
    fn overwrite_mode_laps_lagging_consumer() {
        let (mut tx, rx) = channel(2, 16, RingMode::Overwrite).unwrap();
        fill(&mut tx, 1);
        tx.commit().unwrap();
        fill(&mut tx, 2);
        tx.commit().unwrap();

        // head wrapped back onto tail: both messages are invisible.
        assert_eq!(tx.head(), 0);
        assert_eq!(rx.peek(), None);
    }

    #[test]
    fn backpressure_mode_refuses_full_ring() {
        let (mut tx, mut rx) = channel(2, 16, RingMode::Backpressure).unwrap();
        fill(&mut tx, 1);
        tx.commit().unwrap();
        fill(&mut tx, 2);
        assert!(matches!(tx.commit(), Err(DisplayError::RingFull { slots: 2 })));
        assert_eq!(tx.head(), 1);

        assert_eq!(rx.with_tail_slot(|s| s.payload()[0]), Some(1));
        rx.release();
        assert_eq!(tx.commit().unwrap(), 1);
    }

    #[test]
    fn commit_during_read_stays_pending() {
        let (mut tx, mut rx) = channel(2, 16, RingMode::Overwrite).unwrap();
        fill(&mut tx, 1);
        tx.commit().unwrap();

        // The next message is committed while slot 0 is being read,
        // which wraps head back onto the slot under tail.
        let first = rx.with_tail_slot(|s| {
            fill(&mut tx, 2);
            tx.commit().unwrap();
            s.payload()[0]
        });
        assert_eq!(first, Some(1));
        assert_eq!(tx.head(), 0);

        rx.release();
        assert_eq!(rx.tail(), 1);
        assert_eq!(rx.peek(), Some(1));
        assert_eq!(rx.with_tail_slot(|s| s.payload()[0]), Some(2));
        rx.release();
        assert_eq!(rx.peek(), None);
    }

    #[test]
    fn producer_sees_busy_slot_while_consumer_reads() {
        let (mut tx, rx) = channel(2, 16, RingMode::Overwrite).unwrap();
        fill(&mut tx, 1);
        tx.commit().unwrap();
        fill(&mut tx, 2);
        tx.commit().unwrap();
        fill(&mut tx, 3);
        tx.commit().unwrap();
        // head = 1, tail = 0: slot 0 is pending and the producer is on slot 1.
        assert_eq!(rx.peek(), Some(0));

        let busy = std::sync::Arc::clone(&rx.shared);
        let _guard = busy.slots[1].lock().unwrap();
        assert!(matches!(
            tx.with_head_slot(|_| ()),
            Err(DisplayError::SlotBusy { slot: 1 })
        ));
    }
}
