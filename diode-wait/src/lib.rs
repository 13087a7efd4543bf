//! Blocking, cancellable adapters over `diode-ring`'s non-blocking reads.
//!
//! The core diodes never block: `try_next` returns `None` when nothing
//! is deliverable and the caller decides what to do with the gap. These
//! adapters package the two standard answers:
//!
//! - [`Poller`]: re-try `try_next` at a fixed interval. Cheapest to set
//!   up, wakes within one interval of new data or of shutdown.
//! - [`wait_pair`]: wrap *both* halves so every `set` broadcasts on a
//!   condition variable. Wakes on the next scheduler tick after a `set`,
//!   with no polling tax while idle.
//!
//! Both report "no value" the same way the core does - `None` - which is
//! also what a blocked `next` returns once a shutdown handle fires. The
//! producers stay exactly as cheap as the underlying diode: a poller
//! does not touch the write path at all, and a waiter adds one flag
//! check plus a broadcast.
//!
//! # Waking without losing wakeups
//!
//! `WaitProducer::set` publishes through the inner diode first, then
//! acquires the mutex and broadcasts. A consumer that just saw the diode
//! empty still holds the mutex until it is parked inside `wait`, so the
//! broadcast cannot slip into that window:
//!
//! ```text
//! Consumer:                         Producer:
//! ─────────────────────             ─────────────────────
//! lock
//! try_next() -> None                set() -> published
//! wait(lock)   [unlocks]            lock   [blocks until consumer waits]
//!                                   unlock
//!                                   notify_all()
//! re-check try_next() -> value
//! ```
//!
//! # Example
//!
//! ```
//! use diode_ring::spsc;
//! use diode_wait::wait_pair;
//! use std::thread;
//!
//! let (tx, rx) = spsc::diode::<u64>(1024);
//! let (mut tx, mut rx) = wait_pair(tx, rx);
//! let shutdown = rx.shutdown_handle();
//!
//! let reader = thread::spawn(move || {
//!     let mut sum = 0;
//!     // Blocks between values; returns None once shut down and drained.
//!     while let Some(v) = rx.next() {
//!         sum += v;
//!     }
//!     sum
//! });
//!
//! for i in 1..=10 {
//!     tx.set(i);
//! }
//! shutdown.shutdown();
//!
//! assert_eq!(reader.join().unwrap(), 55);
//! ```
//!
//! # Shutdown
//!
//! Cancellation is a clonable handle, not a token threaded through every
//! call: [`PollShutdown`] flips a flag the poll loop observes within one
//! interval; [`WaitShutdown`] flips the flag and broadcasts once, so
//! every blocked `next` returns `None` immediately. Pending values are
//! still drained first - `next` always tries the diode before it checks
//! the flag.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use diode_ring::{Consume, Produce};

/// Default re-try interval for [`Poller`].
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Poller
// ============================================================================

/// A blocking reader that re-tries the wrapped consumer at a fixed
/// interval.
///
/// The write side needs no wrapping: producers keep calling `set` on
/// their own half and the poller notices on its next tick.
pub struct Poller<C> {
    consumer: C,
    interval: Duration,
    stopped: Arc<AtomicBool>,
}

/// Creates a [`Poller`] with the default 10ms interval.
pub fn poller<C>(consumer: C) -> Poller<C> {
    poller_with_interval(consumer, DEFAULT_POLL_INTERVAL)
}

/// Creates a [`Poller`] that sleeps `interval` between empty reads.
///
/// The interval bounds both wake-up latencies: a pending `next` observes
/// new data, or a shutdown, within roughly one interval.
pub fn poller_with_interval<C>(consumer: C, interval: Duration) -> Poller<C> {
    Poller {
        consumer,
        interval,
        stopped: Arc::new(AtomicBool::new(false)),
    }
}

impl<C: Consume> Poller<C> {
    /// Claims the next value, sleeping between empty reads.
    ///
    /// Returns `None` only after a [`PollShutdown`] has fired; pending
    /// values are always drained before the flag is honored.
    pub fn next(&mut self) -> Option<C::Item> {
        loop {
            if let Some(v) = self.consumer.try_next() {
                return Some(v);
            }
            if self.stopped.load(Ordering::Acquire) {
                return None;
            }
            thread::sleep(self.interval);
        }
    }

    /// Non-blocking pass-through to the wrapped consumer.
    #[inline]
    pub fn try_next(&mut self) -> Option<C::Item> {
        self.consumer.try_next()
    }
}

impl<C> Poller<C> {
    /// Returns the configured re-try interval.
    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns a clonable handle that cancels pending and future
    /// [`next`](Poller::next) calls.
    pub fn shutdown_handle(&self) -> PollShutdown {
        PollShutdown {
            stopped: Arc::clone(&self.stopped),
        }
    }
}

impl<C: Consume> Consume for Poller<C> {
    type Item = C::Item;

    #[inline]
    fn try_next(&mut self) -> Option<C::Item> {
        Poller::try_next(self)
    }
}

impl<C> fmt::Debug for Poller<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("interval", &self.interval)
            .field("stopped", &self.stopped.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Cancels a [`Poller`].
///
/// Cloneable; any clone may fire. A pending `next` observes the flag
/// within one poll interval and returns `None`.
#[derive(Clone)]
pub struct PollShutdown {
    stopped: Arc<AtomicBool>,
}

impl PollShutdown {
    /// Signals the poller to stop. Idempotent.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        tracing::debug!("poller shutdown signaled");
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has fired.
    #[inline]
    pub fn is_shut_down(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl fmt::Debug for PollShutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollShutdown")
            .field("stopped", &self.is_shut_down())
            .finish()
    }
}

// ============================================================================
// Waiter
// ============================================================================

/// Shared state between the waiting halves.
struct WaitShared {
    lock: Mutex<()>,
    available: Condvar,
    stopped: AtomicBool,
}

impl WaitShared {
    /// Broadcasts to every blocked consumer. The empty critical section
    /// orders the broadcast after any consumer that is between its empty
    /// read and its `wait`.
    fn broadcast(&self) {
        drop(self.lock.lock());
        self.available.notify_all();
    }
}

/// The writing half of a waiting diode: publishes through the wrapped
/// producer, then wakes blocked readers.
pub struct WaitProducer<P> {
    producer: P,
    shared: Arc<WaitShared>,
}

/// The reading half of a waiting diode: blocks on a condition variable
/// between values.
pub struct WaitConsumer<C> {
    consumer: C,
    shared: Arc<WaitShared>,
}

/// Wraps both halves of a diode with condition-variable waking.
///
/// Works with any diode flavor: pass the halves of an
/// [`spsc`](diode_ring::spsc) or [`mpsc`](diode_ring::mpsc) diode, or
/// anything else implementing [`Produce`] and [`Consume`].
pub fn wait_pair<P, C>(producer: P, consumer: C) -> (WaitProducer<P>, WaitConsumer<C>) {
    let shared = Arc::new(WaitShared {
        lock: Mutex::new(()),
        available: Condvar::new(),
        stopped: AtomicBool::new(false),
    });

    (
        WaitProducer {
            producer,
            shared: Arc::clone(&shared),
        },
        WaitConsumer { consumer, shared },
    )
}

impl<P: Produce> WaitProducer<P> {
    /// Writes a value through the wrapped producer, then wakes every
    /// blocked [`WaitConsumer::next`].
    ///
    /// Retains the wrapped producer's contract: never blocks on the
    /// consumer, never fails, may displace unread data.
    pub fn set(&mut self, value: P::Item) {
        self.producer.set(value);
        self.shared.broadcast();
    }
}

impl<P> WaitProducer<P> {
    /// Returns a clonable handle that wakes and cancels blocked readers.
    pub fn shutdown_handle(&self) -> WaitShutdown {
        WaitShutdown {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P: Produce> Produce for WaitProducer<P> {
    type Item = P::Item;

    #[inline]
    fn set(&mut self, value: P::Item) {
        WaitProducer::set(self, value);
    }
}

impl<P: Clone> Clone for WaitProducer<P> {
    fn clone(&self) -> Self {
        Self {
            producer: self.producer.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P> fmt::Debug for WaitProducer<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitProducer")
            .field("stopped", &self.shared.stopped.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<C: Consume> WaitConsumer<C> {
    /// Claims the next value, blocking on the condition variable until a
    /// `set` or a shutdown wakes it.
    ///
    /// Returns `None` only after a [`WaitShutdown`] has fired; pending
    /// values are always drained before the flag is honored.
    pub fn next(&mut self) -> Option<C::Item> {
        // Fast path: no lock traffic while data is flowing.
        if let Some(v) = self.consumer.try_next() {
            return Some(v);
        }

        let mut guard = self.shared.lock.lock();
        loop {
            if let Some(v) = self.consumer.try_next() {
                return Some(v);
            }
            if self.shared.stopped.load(Ordering::Acquire) {
                return None;
            }
            self.shared.available.wait(&mut guard);
        }
    }

    /// Non-blocking pass-through to the wrapped consumer.
    #[inline]
    pub fn try_next(&mut self) -> Option<C::Item> {
        self.consumer.try_next()
    }
}

impl<C> WaitConsumer<C> {
    /// Returns a clonable handle that wakes and cancels blocked readers.
    pub fn shutdown_handle(&self) -> WaitShutdown {
        WaitShutdown {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Consume> Consume for WaitConsumer<C> {
    type Item = C::Item;

    #[inline]
    fn try_next(&mut self) -> Option<C::Item> {
        WaitConsumer::try_next(self)
    }
}

impl<C> fmt::Debug for WaitConsumer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitConsumer")
            .field("stopped", &self.shared.stopped.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Cancels a waiting diode.
///
/// Cloneable; any clone may fire. Firing broadcasts once, so every
/// blocked [`WaitConsumer::next`] wakes immediately and returns `None`
/// once the diode is drained. This is the deterministic teardown path
/// for shutting a consumer thread down.
#[derive(Clone)]
pub struct WaitShutdown {
    shared: Arc<WaitShared>,
}

impl WaitShutdown {
    /// Signals shutdown and wakes every blocked reader. Idempotent.
    pub fn shutdown(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        tracing::debug!("waiter shutdown signaled; waking blocked readers");
        self.shared.broadcast();
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has fired.
    #[inline]
    pub fn is_shut_down(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }
}

impl fmt::Debug for WaitShutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitShutdown")
            .field("stopped", &self.is_shut_down())
            .finish()
    }
}
