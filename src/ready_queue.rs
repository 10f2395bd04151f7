//! Pool-mode FIFO of mailboxes awaiting a worker.

use std::{collections::VecDeque, sync::Arc};

use parking_lot::{Condvar, Mutex};

use crate::{
    actor::{ActorName, MessageKind, Payload},
    mailbox::Mailbox,
};

struct Inner<N: ActorName, K: MessageKind, P: Payload> {
    queue: VecDeque<Arc<Mailbox<N, K, P>>>,
    closed: bool,
}

/// Entries are pushed by whichever thread wins a mailbox's scheduled flag
/// and popped by pool workers. Closing the queue unblocks every worker;
/// entries still queued at close time are abandoned here and drained by the
/// shutdown teardown instead.
pub(crate) struct ReadyQueue<N: ActorName, K: MessageKind, P: Payload> {
    inner: Mutex<Inner<N, K, P>>,
    available: Condvar,
}

impl<N: ActorName, K: MessageKind, P: Payload> ReadyQueue<N, K, P> {
    pub(crate) fn new() -> Self {
        ReadyQueue {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Enqueues a mailbox for dispatch. Fails once the queue is closed,
    /// handing the mailbox back so the caller can clear its scheduled flag.
    pub(crate) fn push(
        &self,
        mailbox: Arc<Mailbox<N, K, P>>,
    ) -> Result<(), Arc<Mailbox<N, K, P>>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(mailbox);
        }
        inner.queue.push_back(mailbox);
        drop(inner);
        self.available.notify_one();
        Ok(())
    }

    /// Blocks until a mailbox is available or the queue is closed. `None`
    /// means closed: workers treat it as the shutdown signal.
    pub(crate) fn pop(&self) -> Option<Arc<Mailbox<N, K, P>>> {
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return None;
            }
            if let Some(mailbox) = inner.queue.pop_front() {
                return Some(mailbox);
            }
            self.available.wait(&mut inner);
        }
    }

    /// Idempotent; wakes every blocked worker.
    pub(crate) fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        drop(inner);
        self.available.notify_all();
    }
}
