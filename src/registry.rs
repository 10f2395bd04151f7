//! Name → actor-cell mapping and the cell itself.

use std::{
    collections::HashMap,
    sync::{atomic::AtomicBool, Arc},
    thread::JoinHandle,
};

use parking_lot::{Mutex, RwLock};

use crate::{
    actor::{ActorName, ActorSlot, MessageKind, Payload},
    error::RegisterError,
    mailbox::Mailbox,
};

/// Lifecycle phase of a registered actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Enter hook not yet completed; messages may queue but are not
    /// delivered.
    Entering,
    Running,
    /// Teardown in progress: residual drain and exit hook.
    Exiting,
    /// Exit hook returned; the slot will never be touched again.
    Terminated,
}

/// The actor object together with its lifecycle phase, under one lock.
///
/// This mutex is the serialisation point for the actor. Whoever holds it
/// (the dedicated thread, a pool worker mid-batch, or the releasing thread
/// running the residual drain) is the single thread allowed to invoke the
/// actor's hooks and handler.
pub(crate) struct CellState<N: ActorName, K: MessageKind, P: Payload> {
    pub(crate) slot: ActorSlot<N, K, P>,
    pub(crate) phase: Phase,
}

pub(crate) struct ActorCell<N: ActorName, K: MessageKind, P: Payload> {
    pub(crate) id: N,
    pub(crate) mailbox: Arc<Mailbox<N, K, P>>,
    pub(crate) state: Mutex<CellState<N, K, P>>,
    /// Early-stop signal for the dedicated thread and for pool batches.
    pub(crate) exit: AtomicBool,
    /// Dedicated mode only; taken and joined during teardown.
    pub(crate) thread: Mutex<Option<JoinHandle<()>>>,
}

impl<N: ActorName, K: MessageKind, P: Payload> ActorCell<N, K, P> {
    pub(crate) fn new(id: N, slot: ActorSlot<N, K, P>, overhead: usize) -> Arc<Self> {
        let mailbox = Arc::new(Mailbox::new(id.clone(), overhead));
        Arc::new(ActorCell {
            id,
            mailbox,
            state: Mutex::new(CellState {
                slot,
                phase: Phase::Entering,
            }),
            exit: AtomicBool::new(false),
            thread: Mutex::new(None),
        })
    }
}

/// Thread-safe name → cell mapping.
///
/// Lookups clone the `Arc` out under the read lock, so delivery proceeds on
/// a pinned handle regardless of concurrent `remove` calls; the cell is
/// freed when the last clone drops.
pub(crate) struct Registry<N: ActorName, K: MessageKind, P: Payload> {
    actors: RwLock<HashMap<N, Arc<ActorCell<N, K, P>>>>,
}

impl<N: ActorName, K: MessageKind, P: Payload> Registry<N, K, P> {
    pub(crate) fn new() -> Self {
        Registry {
            actors: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn get(&self, name: &N) -> Option<Arc<ActorCell<N, K, P>>> {
        self.actors.read().get(name).cloned()
    }

    pub(crate) fn contains(&self, name: &N) -> bool {
        self.actors.read().contains_key(name)
    }

    /// Rejects a second registration under an occupied name.
    pub(crate) fn insert(&self, cell: Arc<ActorCell<N, K, P>>) -> Result<(), RegisterError> {
        let mut actors = self.actors.write();
        if actors.contains_key(&cell.id) {
            return Err(RegisterError::AlreadyRegistered);
        }
        actors.insert(cell.id.clone(), cell);
        Ok(())
    }

    pub(crate) fn remove(&self, name: &N) -> Option<Arc<ActorCell<N, K, P>>> {
        self.actors.write().remove(name)
    }

    /// Swaps the whole map out, leaving the registry empty. Used by
    /// shutdown so every subsequent lookup fails `NotFound`.
    pub(crate) fn drain(&self) -> Vec<Arc<ActorCell<N, K, P>>> {
        let mut actors = self.actors.write();
        actors.drain().map(|(_, cell)| cell).collect()
    }
}
