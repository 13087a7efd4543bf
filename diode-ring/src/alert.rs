//! Diagnostics hooks: drop alerts and write-collision reporting.
//!
//! A diode sheds data instead of blocking, so data loss is an expected,
//! countable event rather than an error. Loss is surfaced through an
//! [`Alerter`] supplied at construction and invoked synchronously on the
//! consumer's thread. Multi-producer write collisions are likewise
//! reported through an injectable [`CollisionSink`] rather than a global
//! logger, so the diode carries no hidden diagnostic dependency.
//!
//! Closures work directly:
//!
//! ```
//! use diode_ring::spsc;
//!
//! let (mut tx, mut rx) =
//!     spsc::diode_with_alerter(4, |missed: u64| eprintln!("shed {missed} values"));
//!
//! for i in 0..8u64 {
//!     tx.set(i);
//! }
//! // The first read discovers the overwrite, fires the alerter with the
//! // gap size (4), and lands on the oldest surviving value.
//! assert_eq!(rx.try_next(), Some(4));
//! ```

/// Receives the count of unread values lost to an overwrite.
///
/// Invoked synchronously from `try_next` on the consumer's thread of
/// control, so implementations may hold consumer-local state without
/// synchronization.
pub trait Alerter: Send {
    /// Reports that `missed` unread values were overwritten since the
    /// last delivery.
    fn alert(&mut self, missed: u64);
}

impl<F: FnMut(u64) + Send> Alerter for F {
    fn alert(&mut self, missed: u64) {
        self(missed);
    }
}

/// The default alerter: a structured `tracing` warning per fast-forward.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlerter;

impl Alerter for LogAlerter {
    fn alert(&mut self, missed: u64) {
        tracing::warn!(missed, "dropped unread values; consumer is falling behind");
    }
}

/// Receives multi-producer write collisions.
///
/// A collision is a liveness detail, not a failure: the producer retries
/// with a fresh sequence number and always makes progress. Frequent
/// collisions mean the diode's capacity is too small for the write rate.
///
/// Invoked from the colliding producer's thread, so implementations must
/// be shareable across producers.
pub trait CollisionSink: Send + Sync {
    /// Reports that the write claimed at `seq` collided and will retry.
    fn collision(&self, seq: u64);
}

impl<F: Fn(u64) + Send + Sync> CollisionSink for F {
    fn collision(&self, seq: u64) {
        self(seq);
    }
}

/// The default collision sink: a `tracing` trace event per retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogCollisions;

impl CollisionSink for LogCollisions {
    fn collision(&self, seq: u64) {
        tracing::trace!(seq, "write collision; consider a larger capacity");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_alerters() {
        let mut total: u64 = 0;
        {
            let mut alerter = |missed: u64| total += missed;
            alerter.alert(3);
            alerter.alert(4);
        }
        assert_eq!(total, 7);
    }

    #[test]
    fn closures_are_collision_sinks() {
        use std::sync::atomic::{AtomicU64, Ordering};

        let count = AtomicU64::new(0);
        let sink = |_seq: u64| {
            count.fetch_add(1, Ordering::Relaxed);
        };
        sink.collision(1);
        sink.collision(9);
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }
}
