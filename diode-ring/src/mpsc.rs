//! Multi-producer single-consumer lossy diode.
//!
//! Any number of producers write concurrently through cloned [`Sender`]
//! handles; a single move-only [`Receiver`] reads. Producers claim a
//! unique sequence number from a shared counter with a fetch-and-add,
//! then install their value into the target slot with a compare-and-swap.
//! A lost race or a stale claim is a *collision*: the producer simply
//! retries with a fresh sequence number, so a write never fails and
//! never blocks on the consumer.
//!
//! Collisions are reported through the injectable [`CollisionSink`];
//! frequent collisions mean the capacity is too small for the aggregate
//! write rate. The retry loop has no bound and no backoff: each retry
//! claims a strictly larger sequence number, which guarantees forward
//! progress under bounded concurrency.
//!
//! Reading is the identical algorithm to the SPSC diode: delivery,
//! fast-forward, and shedding depend only on sequence numbers, never on
//! writer identity.
//!
//! # Example
//!
//! ```
//! use diode_ring::mpsc;
//! use std::thread;
//!
//! let (tx, mut rx) = mpsc::diode::<u64>(1024);
//! let tx2 = tx.clone();
//!
//! let h1 = thread::spawn(move || {
//!     for i in 0..100 {
//!         tx.set(i);
//!     }
//! });
//! let h2 = thread::spawn(move || {
//!     for i in 100..200 {
//!         tx2.set(i);
//!     }
//! });
//!
//! h1.join().unwrap();
//! h2.join().unwrap();
//!
//! let mut delivered = 0;
//! while rx.try_next().is_some() {
//!     delivered += 1;
//! }
//! assert_eq!(delivered, 200);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

use crate::alert::{Alerter, CollisionSink, LogAlerter, LogCollisions};
use crate::slot::{ReadCursor, Slot};
use crate::{Consume, Produce};

/// Shared state between all senders and the receiver.
struct Shared<T> {
    /// Next sequence number to claim. Padded so producer traffic does
    /// not share a cache line with the slots.
    write_seq: CachePadded<AtomicU64>,
    slots: Box<[Slot<T>]>,
    collisions: Box<dyn CollisionSink>,
    /// Number of senders alive.
    sender_count: AtomicUsize,
    /// Set when the receiver is dropped.
    receiver_disconnected: AtomicBool,
}

/// The sending half of an MPSC diode.
///
/// Clone it to add producers; all clones share the same slot array and
/// sequence counter.
pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

/// The receiving half of an MPSC diode. There is only one.
pub struct Receiver<T> {
    cursor: ReadCursor,
    shared: Arc<Shared<T>>,
}

/// Creates an MPSC diode with the given capacity.
///
/// Overwrites are reported through the default [`LogAlerter`] and
/// collisions through the default [`LogCollisions`]; use
/// [`diode_with_config`] to supply your own.
///
/// # Panics
///
/// Panics if `capacity` is 0.
pub fn diode<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    diode_with_config(capacity, LogAlerter, LogCollisions)
}

/// Creates an MPSC diode that reports overwrites to `alerter`.
///
/// # Panics
///
/// Panics if `capacity` is 0.
pub fn diode_with_alerter<T>(
    capacity: usize,
    alerter: impl Alerter + 'static,
) -> (Sender<T>, Receiver<T>) {
    diode_with_config(capacity, alerter, LogCollisions)
}

/// Creates an MPSC diode with explicit diagnostics: overwrites go to
/// `alerter` on the consumer's thread, collisions go to `collisions` on
/// whichever producer thread lost the race.
///
/// # Panics
///
/// Panics if `capacity` is 0.
pub fn diode_with_config<T>(
    capacity: usize,
    alerter: impl Alerter + 'static,
    collisions: impl CollisionSink + 'static,
) -> (Sender<T>, Receiver<T>) {
    assert!(capacity > 0, "capacity must be non-zero");

    let slots = (0..capacity).map(|_| Slot::new()).collect::<Vec<_>>();
    let shared = Arc::new(Shared {
        write_seq: CachePadded::new(AtomicU64::new(0)),
        slots: slots.into_boxed_slice(),
        collisions: Box::new(collisions),
        sender_count: AtomicUsize::new(1),
        receiver_disconnected: AtomicBool::new(false),
    });

    (
        Sender {
            shared: Arc::clone(&shared),
        },
        Receiver {
            cursor: ReadCursor::new(Box::new(alerter)),
            shared,
        },
    )
}

impl<T> Sender<T> {
    /// Writes a value, displacing older unread data if the diode is
    /// lapped.
    ///
    /// Never blocks on the consumer and never fails. Contention with
    /// other producers only causes internal retries, each under a fresh
    /// sequence number; the retry loop has no bound or backoff, so under
    /// pathological contention this spins rather than erroring.
    pub fn set(&self, value: T) {
        let capacity = self.shared.slots.len() as u64;
        let mut value = value;

        loop {
            let seq = self.shared.write_seq.fetch_add(1, Ordering::Relaxed);
            let idx = (seq % capacity) as usize;

            match self.shared.slots[idx].try_publish(seq, seq.wrapping_sub(capacity), value) {
                Ok(()) => return,
                Err(v) => {
                    self.shared.collisions.collision(seq);
                    value = v;
                }
            }
        }
    }

    /// Returns the capacity of the diode.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }

    /// Returns `true` if the receiver has been dropped.
    ///
    /// A disconnected diode still accepts writes; they are simply never
    /// delivered.
    #[inline]
    pub fn is_disconnected(&self) -> bool {
        self.shared.receiver_disconnected.load(Ordering::Relaxed)
    }
}

impl<T> Produce for Sender<T> {
    type Item = T;

    #[inline]
    fn set(&mut self, value: T) {
        Sender::set(self, value);
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.shared.sender_count.fetch_add(1, Ordering::Relaxed);
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        self.shared.sender_count.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("capacity", &self.capacity())
            .field("disconnected", &self.is_disconnected())
            .finish_non_exhaustive()
    }
}

impl<T> Receiver<T> {
    /// Attempts to claim the next value without blocking.
    ///
    /// Identical semantics to the SPSC
    /// [`Consumer::try_next`](crate::spsc::Consumer::try_next): `None`
    /// when nothing is deliverable, fast-forward with an [`Alerter`]
    /// callback when producers have lapped the reader.
    #[inline]
    pub fn try_next(&mut self) -> Option<T> {
        self.cursor.next_from(&self.shared.slots)
    }

    /// Returns the capacity of the diode.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }

    /// Returns `true` if every sender has been dropped.
    ///
    /// Values already written remain claimable after disconnection.
    #[inline]
    pub fn is_disconnected(&self) -> bool {
        self.shared.sender_count.load(Ordering::Acquire) == 0
    }
}

impl<T> Consume for Receiver<T> {
    type Item = T;

    #[inline]
    fn try_next(&mut self) -> Option<T> {
        Receiver::try_next(self)
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.shared
            .receiver_disconnected
            .store(true, Ordering::Release);
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("read_seq", &self.cursor.position())
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicU64;
    use std::thread;

    fn counting_diode<T>(capacity: usize) -> (Sender<T>, Receiver<T>, Arc<AtomicU64>) {
        let missed = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&missed);
        let (tx, rx) = diode_with_alerter(capacity, move |m: u64| {
            sink.fetch_add(m, Ordering::Relaxed);
        });
        (tx, rx, missed)
    }

    // ========================================================================
    // Delivery
    // ========================================================================

    #[test]
    fn single_producer_round_trip() {
        let (tx, mut rx) = diode::<u64>(4);

        tx.set(1);
        tx.set(2);

        assert_eq!(rx.try_next(), Some(1));
        assert_eq!(rx.try_next(), Some(2));
        assert_eq!(rx.try_next(), None);
    }

    #[test]
    fn sequential_writes_never_collide() {
        let collisions = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&collisions);
        let (tx, mut rx) = diode_with_config(
            1,
            LogAlerter,
            move |_seq: u64| {
                sink.fetch_add(1, Ordering::Relaxed);
            },
        );

        for i in 0..100u64 {
            tx.set(i);
        }

        assert_eq!(rx.try_next(), Some(99));
        assert_eq!(collisions.load(Ordering::Relaxed), 0);
    }

    // ========================================================================
    // Shedding
    // ========================================================================

    #[test]
    fn burst_accounts_for_every_write() {
        let (tx, mut rx, missed) = counting_diode(4);

        // A single burst of two laps: sequences 4-7 displace 0-3.
        for i in 0..8u64 {
            tx.set(i);
        }

        let mut delivered = Vec::new();
        while let Some(v) = rx.try_next() {
            delivered.push(v);
        }

        assert_eq!(delivered, vec![4, 5, 6, 7]);
        assert_eq!(missed.load(Ordering::Relaxed), 4);

        // Delivered plus shed covers the whole burst.
        assert_eq!(
            delivered.len() as u64 + missed.load(Ordering::Relaxed),
            8
        );
    }

    // ========================================================================
    // Total Accounting
    // ========================================================================

    #[test]
    fn producers_account_for_every_sequence() {
        const PRODUCERS: u64 = 4;
        const WRITES: u64 = 250;

        // Capacity exceeds the total write count, so nothing is shed,
        // no claim ever collides, and the counter is exact.
        let (tx, mut rx, missed) = counting_diode(2048);

        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let tx = tx.clone();
                thread::spawn(move || {
                    for i in 0..WRITES {
                        tx.set(p * WRITES + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        drop(tx);

        assert_eq!(
            rx.shared.write_seq.load(Ordering::Relaxed),
            PRODUCERS * WRITES
        );

        let mut delivered = HashSet::new();
        while let Some(v) = rx.try_next() {
            assert!(delivered.insert(v), "double delivery of {v}");
        }

        assert_eq!(delivered.len() as u64, PRODUCERS * WRITES);
        assert_eq!(missed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn contended_writes_preserve_per_producer_order() {
        const PRODUCERS: u64 = 4;
        const WRITES: u64 = 5_000;

        let collisions = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&collisions);
        let (tx, mut rx) = diode_with_config(
            8,
            |_missed: u64| {},
            move |_seq: u64| {
                sink.fetch_add(1, Ordering::Relaxed);
            },
        );

        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let tx = tx.clone();
                thread::spawn(move || {
                    for i in 0..WRITES {
                        tx.set((p << 32) | i);
                    }
                })
            })
            .collect();
        drop(tx);

        let reader = thread::spawn(move || {
            let mut last = [None::<u64>; PRODUCERS as usize];
            let mut delivered = 0u64;

            loop {
                match rx.try_next() {
                    Some(v) => {
                        let p = (v >> 32) as usize;
                        let i = v & 0xffff_ffff;
                        if let Some(prev) = last[p] {
                            assert!(i > prev, "producer {p} reordered: {i} after {prev}");
                        }
                        last[p] = Some(i);
                        delivered += 1;
                    }
                    None => {
                        if rx.is_disconnected() {
                            while let Some(v) = rx.try_next() {
                                delivered += 1;
                                let _ = v;
                            }
                            break;
                        }
                        std::hint::spin_loop();
                    }
                }
            }
            delivered
        });

        for h in handles {
            h.join().unwrap();
        }
        let delivered = reader.join().unwrap();
        assert!(delivered >= 1);
        assert!(delivered <= PRODUCERS * WRITES);
    }

    // ========================================================================
    // Ownership
    // ========================================================================

    #[test]
    fn displaced_and_pending_values_are_dropped() {
        let marker = Arc::new(());
        let (tx, rx) = diode::<Arc<()>>(2);

        for _ in 0..4 {
            tx.set(Arc::clone(&marker));
        }
        // Two laps: the first two clones were displaced and dropped.
        assert_eq!(Arc::strong_count(&marker), 3);

        drop(tx);
        drop(rx);
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    // ========================================================================
    // Disconnection
    // ========================================================================

    #[test]
    fn receiver_sees_all_senders_gone() {
        let (tx, rx) = diode::<u64>(4);
        let tx2 = tx.clone();

        assert!(!rx.is_disconnected());
        drop(tx);
        assert!(!rx.is_disconnected());
        drop(tx2);
        assert!(rx.is_disconnected());
    }

    #[test]
    fn sender_sees_receiver_gone() {
        let (tx, rx) = diode::<u64>(4);

        assert!(!tx.is_disconnected());
        drop(rx);
        assert!(tx.is_disconnected());

        // Writes still succeed; they are just never delivered.
        tx.set(1);
    }

    // ========================================================================
    // Construction
    // ========================================================================

    #[test]
    #[should_panic(expected = "capacity must be non-zero")]
    fn zero_capacity_panics() {
        let _ = diode::<u64>(0);
    }
}
