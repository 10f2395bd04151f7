//! Per-actor message queue.
//!
//! A mailbox is a closeable FIFO of envelopes guarded by a mutex and a
//! condvar, plus one atomic bit used by the pool scheduler to guarantee
//! that a mailbox appears on the ready-queue at most once.

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, Ordering},
};

use parking_lot::{Condvar, Mutex};

use crate::{
    actor::{ActorName, MessageKind, Payload},
    error::{Delivery, SendError},
    message::Envelope,
};

#[derive(Debug)]
struct Inner<N, K, P> {
    queue: VecDeque<Envelope<N, K, P>>,
    closed: bool,
}

#[derive(Debug)]
pub(crate) struct Mailbox<N: ActorName, K: MessageKind, P: Payload> {
    id: N,
    /// Advisory backlog threshold; 0 disables the overhead signal.
    overhead: usize,
    /// Set while this mailbox is on the ready-queue or being drained by a
    /// pool worker. See `try_schedule`/`finish_batch`.
    scheduled: AtomicBool,
    inner: Mutex<Inner<N, K, P>>,
    available: Condvar,
}

impl<N: ActorName, K: MessageKind, P: Payload> Mailbox<N, K, P> {
    pub(crate) fn new(id: N, overhead: usize) -> Self {
        Mailbox {
            id,
            overhead,
            scheduled: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Id of the owning actor, used by pool workers to look the cell back up.
    pub(crate) fn id(&self) -> &N {
        &self.id
    }

    /// Appends an envelope and wakes at most one waiter.
    ///
    /// `Delivery::Overhead` means the envelope was queued but the backlog
    /// exceeds the advisory threshold. Failures return the envelope.
    pub(crate) fn push(
        &self,
        envelope: Envelope<N, K, P>,
    ) -> Result<Delivery, SendError<Envelope<N, K, P>>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(SendError::Closed(envelope));
        }
        if inner.queue.try_reserve(1).is_err() {
            return Err(SendError::OutOfMemory(envelope));
        }
        inner.queue.push_back(envelope);
        let len = inner.queue.len();
        drop(inner);
        self.available.notify_one();
        if self.overhead > 0 && len > self.overhead {
            Ok(Delivery::Overhead)
        } else {
            Ok(Delivery::Queued)
        }
    }

    /// Blocks until an envelope is available or the mailbox is closed.
    /// Returns `None` only when the mailbox is closed *and* empty.
    pub(crate) fn pop(&self) -> Option<Envelope<N, K, P>> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(envelope) = inner.queue.pop_front() {
                return Some(envelope);
            }
            if inner.closed {
                return None;
            }
            self.available.wait(&mut inner);
        }
    }

    /// Non-blocking take.
    pub(crate) fn try_pop(&self) -> Option<Envelope<N, K, P>> {
        self.inner.lock().queue.pop_front()
    }

    /// Idempotent; wakes all waiters. Envelopes already queued remain
    /// poppable until the queue runs dry.
    pub(crate) fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        drop(inner);
        self.available.notify_all();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Atomic test-and-set of the scheduled flag. `true` iff the flag
    /// transitioned clear → set, in which case the caller owns putting this
    /// mailbox on the ready-queue.
    pub(crate) fn try_schedule(&self) -> bool {
        !self.scheduled.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn clear_scheduled(&self) {
        self.scheduled.store(false, Ordering::Release);
    }

    /// End-of-batch handoff for pool workers. Returns `true` and clears the
    /// scheduled flag iff the queue is empty; otherwise the flag stays set
    /// and the caller must re-enqueue the mailbox.
    ///
    /// The emptiness check and the clear happen under the queue lock: a
    /// sender's push completes either before the check (the worker sees the
    /// envelope and re-enqueues) or after the clear (the sender wins
    /// `try_schedule` and enqueues). Clearing outside the lock would let an
    /// envelope land between check and clear with nobody scheduling it.
    pub(crate) fn finish_batch(&self) -> bool {
        let inner = self.inner.lock();
        if inner.queue.is_empty() {
            self.scheduled.store(false, Ordering::Release);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use super::*;

    fn mailbox(overhead: usize) -> Mailbox<String, String, u32> {
        Mailbox::new("test".to_string(), overhead)
    }

    fn envelope(payload: u32) -> Envelope<String, String, u32> {
        Envelope::new("src".to_string(), "kind".to_string(), payload)
    }

    #[test]
    fn push_pop_is_fifo() {
        let mb = mailbox(0);
        for i in 0..5 {
            assert_eq!(mb.push(envelope(i)).unwrap(), Delivery::Queued);
        }
        for i in 0..5 {
            assert_eq!(mb.try_pop().unwrap().payload, i);
        }
        assert!(mb.try_pop().is_none());
    }

    #[test]
    fn overhead_is_advisory() {
        let mb = mailbox(2);
        assert_eq!(mb.push(envelope(0)).unwrap(), Delivery::Queued);
        assert_eq!(mb.push(envelope(1)).unwrap(), Delivery::Queued);
        assert_eq!(mb.push(envelope(2)).unwrap(), Delivery::Overhead);
        // Nothing was dropped.
        assert_eq!(mb.len(), 3);
    }

    #[test]
    fn zero_overhead_disables_the_signal() {
        let mb = mailbox(0);
        for i in 0..100 {
            assert_eq!(mb.push(envelope(i)).unwrap(), Delivery::Queued);
        }
    }

    #[test]
    fn closed_mailbox_rejects_push_but_drains() {
        let mb = mailbox(0);
        mb.push(envelope(1)).unwrap();
        mb.close();
        mb.close(); // idempotent
        let err = mb.push(envelope(2)).unwrap_err();
        assert!(matches!(err, SendError::Closed(env) if env.payload == 2));
        assert_eq!(mb.pop().unwrap().payload, 1);
        assert!(mb.pop().is_none());
    }

    #[test]
    fn blocking_pop_wakes_on_push() {
        let mb = Arc::new(mailbox(0));
        let popper = {
            let mb = Arc::clone(&mb);
            thread::spawn(move || mb.pop().map(|env| env.payload))
        };
        thread::sleep(Duration::from_millis(20));
        mb.push(envelope(42)).unwrap();
        assert_eq!(popper.join().unwrap(), Some(42));
    }

    #[test]
    fn blocking_pop_wakes_on_close() {
        let mb = Arc::new(mailbox(0));
        let popper = {
            let mb = Arc::clone(&mb);
            thread::spawn(move || mb.pop())
        };
        thread::sleep(Duration::from_millis(20));
        mb.close();
        assert!(popper.join().unwrap().is_none());
    }

    #[test]
    fn schedule_flag_is_won_once() {
        let mb = Arc::new(mailbox(0));
        let winners: usize = (0..8)
            .map(|_| {
                let mb = Arc::clone(&mb);
                thread::spawn(move || mb.try_schedule() as usize)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .sum();
        assert_eq!(winners, 1);
        mb.clear_scheduled();
        assert!(mb.try_schedule());
    }

    #[test]
    fn finish_batch_clears_only_when_empty() {
        let mb = mailbox(0);
        assert!(mb.try_schedule());
        mb.push(envelope(1)).unwrap();
        assert!(!mb.finish_batch());
        // Flag still held: a concurrent sender must not win it.
        assert!(!mb.try_schedule());
        mb.try_pop().unwrap();
        assert!(mb.finish_batch());
        assert!(mb.try_schedule());
    }
}
