//! Single-producer single-consumer lossy diode.
//!
//! A diode moves data one way, from a fast, latency-sensitive producer
//! to a slower consumer, without ever blocking the producer. When the
//! consumer falls behind, the producer overwrites the oldest unread
//! slots and the consumer's next read fast-forwards past the gap,
//! reporting the number of shed values through the [`Alerter`].
//!
//! The halves are move-only and take `&mut self`, so the
//! single-writer/single-reader contract is enforced at compile time
//! rather than by documentation.
//!
//! # Example
//!
//! ```
//! use diode_ring::spsc;
//!
//! let (mut tx, mut rx) = spsc::diode::<u64>(4);
//!
//! tx.set(1);
//! tx.set(2);
//!
//! assert_eq!(rx.try_next(), Some(1));
//! assert_eq!(rx.try_next(), Some(2));
//!
//! // Nothing pending.
//! assert_eq!(rx.try_next(), None);
//! ```
//!
//! # Shedding
//!
//! ```
//! use diode_ring::spsc;
//!
//! let (mut tx, mut rx) = spsc::diode_with_alerter(2, |missed: u64| {
//!     assert_eq!(missed, 2);
//! });
//!
//! // Two laps: sequences 2 and 3 overwrite 0 and 1.
//! for i in 0..4u64 {
//!     tx.set(i);
//! }
//!
//! // The reader lands on sequence 2, shedding the two lost values.
//! assert_eq!(rx.try_next(), Some(2));
//! assert_eq!(rx.try_next(), Some(3));
//! ```

use std::fmt;
use std::sync::Arc;

use crate::alert::{Alerter, LogAlerter};
use crate::slot::{ReadCursor, Slot};
use crate::{Consume, Produce};

/// Shared state between producer and consumer: the slot array itself.
struct Shared<T> {
    slots: Box<[Slot<T>]>,
}

/// The writing half of an SPSC diode.
pub struct Producer<T> {
    write_seq: u64,
    shared: Arc<Shared<T>>,
}

/// The reading half of an SPSC diode.
pub struct Consumer<T> {
    cursor: ReadCursor,
    shared: Arc<Shared<T>>,
}

/// Creates an SPSC diode with the given capacity.
///
/// Returns a `(Producer, Consumer)` pair. Overwrites are reported through
/// the default [`LogAlerter`]; use [`diode_with_alerter`] to supply your
/// own.
///
/// # Panics
///
/// Panics if `capacity` is 0.
pub fn diode<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    diode_with_alerter(capacity, LogAlerter)
}

/// Creates an SPSC diode that reports overwrites to `alerter`.
///
/// The alerter runs synchronously on the consumer's thread, inside
/// [`Consumer::try_next`], whenever a read discovers that unread data
/// was overwritten.
///
/// # Panics
///
/// Panics if `capacity` is 0.
pub fn diode_with_alerter<T>(
    capacity: usize,
    alerter: impl Alerter + 'static,
) -> (Producer<T>, Consumer<T>) {
    assert!(capacity > 0, "capacity must be non-zero");

    let slots = (0..capacity).map(|_| Slot::new()).collect::<Vec<_>>();
    let shared = Arc::new(Shared {
        slots: slots.into_boxed_slice(),
    });

    (
        Producer {
            write_seq: 0,
            shared: Arc::clone(&shared),
        },
        Consumer {
            cursor: ReadCursor::new(Box::new(alerter)),
            shared,
        },
    )
}

impl<T> Producer<T> {
    /// Writes a value, unconditionally displacing any unread occupant of
    /// the target slot.
    ///
    /// Never blocks and never fails. The value belongs to the diode from
    /// here on; it is either delivered by a later
    /// [`try_next`](Consumer::try_next) or dropped by a later overwrite.
    #[inline]
    pub fn set(&mut self, value: T) {
        let idx = (self.write_seq % self.shared.slots.len() as u64) as usize;
        self.shared.slots[idx].publish(self.write_seq, value);
        self.write_seq += 1;
    }

    /// Returns the capacity of the diode.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }

    /// Returns `true` if the consumer has been dropped.
    #[inline]
    pub fn is_disconnected(&self) -> bool {
        Arc::strong_count(&self.shared) == 1
    }
}

impl<T> Produce for Producer<T> {
    type Item = T;

    #[inline]
    fn set(&mut self, value: T) {
        Producer::set(self, value);
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("write_seq", &self.write_seq)
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

impl<T> Consumer<T> {
    /// Attempts to claim the next value without blocking.
    ///
    /// Returns `None` when nothing is currently deliverable: the next
    /// slot is empty, mid-write, or holds a leftover from before an
    /// earlier fast-forward (which is shed by the claim). `None` never
    /// moves the read position.
    ///
    /// When the producer has lapped the reader, the configured
    /// [`Alerter`] hears the gap size before the newest claimed value is
    /// returned.
    #[inline]
    pub fn try_next(&mut self) -> Option<T> {
        self.cursor.next_from(&self.shared.slots)
    }

    /// Returns the capacity of the diode.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }

    /// Returns `true` if the producer has been dropped.
    ///
    /// Values already written remain claimable after disconnection.
    #[inline]
    pub fn is_disconnected(&self) -> bool {
        Arc::strong_count(&self.shared) == 1
    }
}

impl<T> Consume for Consumer<T> {
    type Item = T;

    #[inline]
    fn try_next(&mut self) -> Option<T> {
        Consumer::try_next(self)
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("read_seq", &self.cursor.position())
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}
