//! The runtime itself: registration, dispatch, and both execution
//! strategies.
//!
//! A system is constructed in exactly one of two modes:
//!
//! - **dedicated**: every registered actor owns a thread running its
//!   mailbox loop;
//! - **pool**: a fixed set of workers shares a ready-queue of mailboxes,
//!   draining each in bounded batches.
//!
//! In both modes a given actor's hooks and handler run on at most one
//! thread at a time, and messages from the same sender arrive in order.

use std::{
    fmt, io,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread,
};

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::{
    actor::{Actor, ActorName, ActorSlot, MessageKind, Payload},
    error::{panic_message, panic_to_box_error, BoxError, Delivery, RegisterError, SendError},
    mailbox::Mailbox,
    message::{Context, Envelope},
    ready_queue::ReadyQueue,
    registry::{ActorCell, CellState, Phase, Registry},
    worker_group::WorkerGroup,
};

/// Default worker count for pool-mode systems.
pub const DEFAULT_WORKERS: usize = 4;

/// Default batch bound: the number of envelopes a pool worker drains from
/// one mailbox per visit. Small values favour fairness across actors, large
/// values amortise the ready-queue handoff.
pub const DEFAULT_BATCH: usize = 20;

/// Default advisory mailbox backlog threshold.
pub const DEFAULT_OVERHEAD: usize = 1024;

/// State shared between the public handle, pool workers, dedicated actor
/// threads, and handler contexts.
pub(crate) struct SystemCore<N: ActorName, K: MessageKind, P: Payload> {
    registry: Registry<N, K, P>,
    /// `Some` iff the system runs in pool mode.
    ready: Option<ReadyQueue<N, K, P>>,
    exiting: AtomicBool,
    batch: usize,
}

impl<N: ActorName, K: MessageKind, P: Payload> SystemCore<N, K, P> {
    /// Registry path shared by the public API and bound handler contexts.
    pub(crate) fn send(
        &self,
        source: N,
        target: &N,
        kind: K,
        payload: P,
    ) -> Result<Delivery, SendError<P>> {
        let Some(cell) = self.registry.get(target) else {
            return Err(SendError::NotFound(payload));
        };
        let delivery = cell
            .mailbox
            .push(Envelope::new(source, kind, payload))
            .map_err(|err| err.map_msg(|env| env.payload))?;
        self.schedule(&cell.mailbox);
        Ok(delivery)
    }

    /// Puts a mailbox on the ready-queue if this thread wins its scheduled
    /// flag. Must only be called after the envelope is visible in the
    /// mailbox. A push rejected by a closed queue clears the flag again;
    /// the envelope stays queued for the shutdown drain.
    pub(crate) fn schedule(&self, mailbox: &Arc<Mailbox<N, K, P>>) {
        let Some(ready) = &self.ready else {
            return;
        };
        if mailbox.try_schedule() {
            match ready.push(Arc::clone(mailbox)) {
                Ok(()) => trace!(id = ?mailbox.id(), "mailbox scheduled"),
                Err(back) => {
                    back.clear_scheduled();
                    warn!(id = ?back.id(), "ready-queue closed; scheduled flag cleared");
                }
            }
        }
    }
}

/// An actor runtime instance.
///
/// Generic over the actor name, message kind, and payload types; all three
/// default to `String`. Dropping the system shuts it down.
///
/// # Example
///
/// ```
/// use std::sync::{
///     atomic::{AtomicUsize, Ordering},
///     Arc,
/// };
/// use troupe::{Actor, ActorSystem, Context, Envelope};
///
/// struct Counter(Arc<AtomicUsize>);
///
/// impl Actor<String, String, u32> for Counter {
///     fn on_message(
///         &mut self,
///         envelope: Envelope<String, String, u32>,
///         _ctx: &Context<'_, String, String, u32>,
///     ) {
///         self.0.fetch_add(envelope.payload as usize, Ordering::SeqCst);
///     }
/// }
///
/// let seen = Arc::new(AtomicUsize::new(0));
/// let system: ActorSystem<String, String, u32> = ActorSystem::pool(2).unwrap();
/// system.register("adder".to_string(), Counter(Arc::clone(&seen))).unwrap();
/// system.send("main".to_string(), &"adder".to_string(), "add".to_string(), 3).unwrap();
/// system.shutdown();
/// assert_eq!(seen.load(Ordering::SeqCst), 3);
/// ```
pub struct ActorSystem<N: ActorName = String, K: MessageKind = String, P: Payload = String> {
    core: Arc<SystemCore<N, K, P>>,
    /// Pool mode only; joined during shutdown.
    pool: Option<Mutex<WorkerGroup>>,
}

impl<N: ActorName, K: MessageKind, P: Payload> ActorSystem<N, K, P> {
    /// Creates a system where every registered actor owns a dedicated
    /// thread.
    pub fn dedicated() -> Self {
        ActorSystem {
            core: Arc::new(SystemCore {
                registry: Registry::new(),
                ready: None,
                exiting: AtomicBool::new(false),
                batch: DEFAULT_BATCH,
            }),
            pool: None,
        }
    }

    /// Creates a system backed by a shared pool of `workers` threads with
    /// the default batch bound.
    pub fn pool(workers: usize) -> io::Result<Self> {
        Self::pool_with_batch(workers, DEFAULT_BATCH)
    }

    /// Creates a pool system with an explicit batch bound. `workers` and
    /// `batch` are clamped to at least 1.
    pub fn pool_with_batch(workers: usize, batch: usize) -> io::Result<Self> {
        let core = Arc::new(SystemCore {
            registry: Registry::new(),
            ready: Some(ReadyQueue::new()),
            exiting: AtomicBool::new(false),
            batch: batch.max(1),
        });
        let mut group = WorkerGroup::new("troupe");
        for i in 0..workers.max(1) {
            let worker_core = Arc::clone(&core);
            let attached = group.attach(&format!("worker-{i:04}"), move |done| {
                done.done();
                pool_worker(worker_core);
            });
            if let Err(err) = attached {
                if let Some(ready) = &core.ready {
                    ready.close();
                }
                group.join();
                return Err(err);
            }
        }
        if !group.wait_init() {
            if let Some(ready) = &core.ready {
                ready.close();
            }
            group.join();
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "worker initialisation failed",
            ));
        }
        debug!(workers = workers.max(1), batch = batch.max(1), "pool started");
        Ok(ActorSystem {
            core,
            pool: Some(Mutex::new(group)),
        })
    }

    /// Registers an actor under `name`, transferring ownership to the
    /// runtime. The enter hook runs to completion before this returns; on
    /// hook failure nothing is registered and the exit hook will not run.
    pub fn register<A>(&self, name: N, actor: A) -> Result<(), RegisterError>
    where
        A: Actor<N, K, P>,
    {
        self.register_with_overhead(name, actor, DEFAULT_OVERHEAD)
    }

    /// [`register`](Self::register) with an explicit advisory mailbox
    /// threshold; `0` disables the overhead signal.
    pub fn register_with_overhead<A>(
        &self,
        name: N,
        actor: A,
        overhead: usize,
    ) -> Result<(), RegisterError>
    where
        A: Actor<N, K, P>,
    {
        self.register_slot(name, ActorSlot::Owned(Box::new(actor)), overhead)
    }

    /// Registers a shared actor: the runtime holds one clone and the caller
    /// keeps the other, so the object outlives
    /// [`release`](Self::release).
    pub fn register_shared<A>(&self, name: N, actor: Arc<Mutex<A>>) -> Result<(), RegisterError>
    where
        A: Actor<N, K, P>,
    {
        self.register_shared_with_overhead(name, actor, DEFAULT_OVERHEAD)
    }

    /// [`register_shared`](Self::register_shared) with an explicit advisory
    /// mailbox threshold.
    pub fn register_shared_with_overhead<A>(
        &self,
        name: N,
        actor: Arc<Mutex<A>>,
        overhead: usize,
    ) -> Result<(), RegisterError>
    where
        A: Actor<N, K, P>,
    {
        self.register_slot(name, ActorSlot::Shared(actor), overhead)
    }

    /// Whether an actor is currently registered under `name`.
    pub fn contains(&self, name: &N) -> bool {
        self.core.registry.contains(name)
    }

    /// Sends a message to the actor registered under `target`.
    ///
    /// `source` names the sender; it is delivered verbatim and need not be
    /// a registered actor. On failure the payload comes back inside the
    /// error. Senders never block: [`Delivery::Overhead`] is advisory.
    pub fn send(&self, source: N, target: &N, kind: K, payload: P) -> Result<Delivery, SendError<P>> {
        self.core.send(source, target, kind, payload)
    }

    /// Removes the actor registered under `name` and tears it down: no new
    /// messages are accepted, envelopes already queued are delivered, then
    /// the exit hook runs. No effect if the name is absent; safe to call
    /// twice.
    pub fn release(&self, name: &N) {
        let Some(cell) = self.core.registry.remove(name) else {
            return;
        };
        debug!(id = ?cell.id, "actor released");
        teardown(&cell);
    }

    /// Stops all workers and releases every actor, draining in-flight
    /// messages. Idempotent; also runs on drop. After shutdown every send
    /// fails with [`SendError::NotFound`].
    pub fn shutdown(&self) {
        let already = self.core.exiting.swap(true, Ordering::AcqRel);
        if !already {
            debug!("runtime shutting down");
        }
        if let Some(ready) = &self.core.ready {
            ready.close();
        }
        if let Some(pool) = &self.pool {
            pool.lock().join();
        }
        for cell in self.core.registry.drain() {
            teardown(&cell);
        }
    }

    fn register_slot(
        &self,
        name: N,
        slot: ActorSlot<N, K, P>,
        overhead: usize,
    ) -> Result<(), RegisterError> {
        if self.core.exiting.load(Ordering::Acquire) {
            return Err(RegisterError::ShuttingDown);
        }
        let cell = ActorCell::new(name, slot, overhead);
        if self.core.ready.is_some() {
            self.register_pooled(cell)
        } else {
            self.register_dedicated(cell)
        }
    }

    /// Pool mode: the enter hook runs on the registering thread, under the
    /// cell lock so that workers picking up early messages wait for it.
    fn register_pooled(&self, cell: Arc<ActorCell<N, K, P>>) -> Result<(), RegisterError> {
        let mut state = cell.state.lock();
        self.core.registry.insert(Arc::clone(&cell))?;
        let outcome = catch_unwind(AssertUnwindSafe(|| state.slot.on_start()));
        let err = match outcome {
            Ok(Ok(())) => {
                state.phase = Phase::Running;
                drop(state);
                debug!(id = ?cell.id, "actor registered");
                return Ok(());
            }
            Ok(Err(err)) => err,
            Err(payload) => panic_to_box_error(payload),
        };
        self.core.registry.remove(&cell.id);
        cell.mailbox.close();
        while cell.mailbox.try_pop().is_some() {}
        state.phase = Phase::Terminated;
        Err(RegisterError::InitFailed(err))
    }

    /// Dedicated mode: the enter hook runs on the actor's own thread; the
    /// registering thread blocks until the hook reports its outcome.
    fn register_dedicated(&self, cell: Arc<ActorCell<N, K, P>>) -> Result<(), RegisterError> {
        self.core.registry.insert(Arc::clone(&cell))?;
        let (init_tx, init_rx) = mpsc::channel();
        let spawned = {
            let core = Arc::clone(&self.core);
            let cell = Arc::clone(&cell);
            thread::Builder::new()
                .name(format!("actor-{:?}", cell.id))
                .spawn(move || dedicated_loop(core, cell, init_tx))
        };
        match spawned {
            Ok(handle) => *cell.thread.lock() = Some(handle),
            Err(err) => {
                self.core.registry.remove(&cell.id);
                cell.mailbox.close();
                return Err(RegisterError::Spawn(err));
            }
        }
        match init_rx.recv() {
            Ok(Ok(())) => {
                debug!(id = ?cell.id, "actor registered");
                Ok(())
            }
            Ok(Err(err)) => {
                self.discard_failed(&cell);
                Err(RegisterError::InitFailed(err))
            }
            // The thread died without reporting; treat as a failed enter.
            Err(_) => {
                self.discard_failed(&cell);
                Err(RegisterError::InitFailed(
                    "actor thread exited before start completed".into(),
                ))
            }
        }
    }

    fn discard_failed(&self, cell: &Arc<ActorCell<N, K, P>>) {
        self.core.registry.remove(&cell.id);
        cell.mailbox.close();
        if let Some(handle) = cell.thread.lock().take() {
            let _ = handle.join();
        }
        while cell.mailbox.try_pop().is_some() {}
        cell.state.lock().phase = Phase::Terminated;
    }
}

impl<N: ActorName, K: MessageKind, P: Payload> Drop for ActorSystem<N, K, P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<N: ActorName, K: MessageKind, P: Payload> fmt::Debug for ActorSystem<N, K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSystem")
            .field(
                "mode",
                &if self.pool.is_some() { "pool" } else { "dedicated" },
            )
            .finish_non_exhaustive()
    }
}

/// Invokes the handler for one envelope, containing any panic.
fn deliver<N: ActorName, K: MessageKind, P: Payload>(
    state: &mut CellState<N, K, P>,
    envelope: Envelope<N, K, P>,
    ctx: &Context<'_, N, K, P>,
) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| state.slot.on_message(envelope, ctx))) {
        error!(
            id = ?ctx.id(),
            cause = panic_message(payload.as_ref()),
            "actor panicked handling a message"
        );
    }
}

/// Thread body for a dedicated-mode actor.
fn dedicated_loop<N: ActorName, K: MessageKind, P: Payload>(
    core: Arc<SystemCore<N, K, P>>,
    cell: Arc<ActorCell<N, K, P>>,
    init_tx: mpsc::Sender<Result<(), BoxError>>,
) {
    let entered = {
        let mut state = cell.state.lock();
        match catch_unwind(AssertUnwindSafe(|| state.slot.on_start())) {
            Ok(Ok(())) => {
                state.phase = Phase::Running;
                true
            }
            Ok(Err(err)) => {
                let _ = init_tx.send(Err(err));
                false
            }
            Err(payload) => {
                let _ = init_tx.send(Err(panic_to_box_error(payload)));
                false
            }
        }
    };
    if !entered {
        return;
    }
    let _ = init_tx.send(Ok(()));
    let ctx = Context::bound(&cell.id, &cell.mailbox, &core);
    loop {
        if cell.exit.load(Ordering::Acquire) {
            break;
        }
        let Some(envelope) = cell.mailbox.pop() else {
            break;
        };
        let mut state = cell.state.lock();
        deliver(&mut state, envelope, &ctx);
    }
}

/// Worker body for a pool-mode system.
fn pool_worker<N: ActorName, K: MessageKind, P: Payload>(core: Arc<SystemCore<N, K, P>>) {
    let Some(ready) = core.ready.as_ref() else {
        return;
    };
    while let Some(mailbox) = ready.pop() {
        let Some(cell) = core.registry.get(mailbox.id()) else {
            // Released between scheduling and dispatch.
            mailbox.clear_scheduled();
            continue;
        };
        {
            let mut state = cell.state.lock();
            let ctx = Context::bound(&cell.id, &cell.mailbox, &core);
            let mut drained = 0;
            while drained < core.batch && !core.exiting.load(Ordering::Acquire) {
                let Some(envelope) = mailbox.try_pop() else {
                    break;
                };
                deliver(&mut state, envelope, &ctx);
                drained += 1;
            }
        }
        if !mailbox.finish_batch() {
            // Still backlogged; hand it to the next worker. A closed queue
            // means shutdown: the flag is cleared and the backlog is
            // delivered by the teardown drain.
            if let Err(back) = ready.push(mailbox) {
                back.clear_scheduled();
            }
        }
    }
}

/// Drain-then-exit protocol shared by `release` and `shutdown`.
///
/// The cell has already left the registry, so no new envelope can reach the
/// mailbox through it. Residual envelopes are delivered on the calling
/// thread with an unbound context: sends from these deliveries fail with
/// `NotRegistered`.
fn teardown<N: ActorName, K: MessageKind, P: Payload>(cell: &Arc<ActorCell<N, K, P>>) {
    cell.exit.store(true, Ordering::Release);
    cell.mailbox.close();
    if let Some(handle) = cell.thread.lock().take() {
        let _ = handle.join();
    }
    let mut state = cell.state.lock();
    match state.phase {
        Phase::Terminated => return,
        // The enter hook never succeeded; discard without the exit hook.
        Phase::Entering => {
            while cell.mailbox.try_pop().is_some() {}
            state.phase = Phase::Terminated;
            return;
        }
        Phase::Running | Phase::Exiting => {}
    }
    state.phase = Phase::Exiting;
    let ctx = Context::unbound(&cell.id, &cell.mailbox);
    while let Some(envelope) = cell.mailbox.try_pop() {
        deliver(&mut state, envelope, &ctx);
    }
    // Closed and drained: the exit hook runs after the last delivery.
    debug_assert!(cell.mailbox.is_empty());
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| state.slot.on_stop())) {
        error!(
            id = ?cell.id,
            cause = panic_message(payload.as_ref()),
            "actor panicked in exit hook"
        );
    }
    state.phase = Phase::Terminated;
    trace!(id = ?cell.id, "actor terminated");
}
