//! The actor contract and the bounds on a runtime's key types.
//!
//! An actor is a named, single-threaded message-handling unit with private
//! state. Users implement [`Actor`] and hand the object to
//! [`ActorSystem::register`](crate::ActorSystem::register) (the runtime
//! takes ownership) or
//! [`ActorSystem::register_shared`](crate::ActorSystem::register_shared)
//! (the caller keeps a handle that outlives release). The runtime holds the
//! actor behind a trait object and guarantees that at most one thread runs
//! its hooks or handler at any time.

use std::{fmt, hash::Hash, sync::Arc};

use parking_lot::Mutex;

use crate::{
    error::BoxError,
    message::{Context, Envelope},
};

/// Key type identifying actors within a runtime.
///
/// Names are cloned into envelopes and mailbox handles, compared on every
/// lookup, and used as hash-map keys; `String` is the expected default.
pub trait ActorName:
    Clone + Eq + Ord + Hash + fmt::Debug + Send + Sync + 'static
{
}

impl<T> ActorName for T where T: Clone + Eq + Ord + Hash + fmt::Debug + Send + Sync + 'static {}

/// Label naming the kind of a message. Not unique; `String` by default.
pub trait MessageKind: Eq + fmt::Debug + Send + 'static {}

impl<T> MessageKind for T where T: Eq + fmt::Debug + Send + 'static {}

/// Caller-supplied message payload. Ownership transfers to the runtime on
/// send and to the receiving actor on delivery.
pub trait Payload: Send + 'static {}

impl<T> Payload for T where T: Send + 'static {}

/// Functionality for an actor, including its lifecycle hooks.
///
/// Hooks run serially with the message handler; the runtime never invokes
/// two of them concurrently for the same actor.
///
/// # Example
///
/// ```
/// use troupe::{Actor, ActorSystem, Context, Envelope};
///
/// struct Echo;
///
/// impl Actor for Echo {
///     fn on_message(
///         &mut self,
///         envelope: Envelope,
///         ctx: &Context<'_>,
///     ) {
///         let Envelope { source, kind, payload } = envelope;
///         let _ = ctx.send(&source, kind, payload);
///     }
/// }
///
/// let system: ActorSystem = ActorSystem::dedicated();
/// system.register("echo".to_string(), Echo).unwrap();
/// system.shutdown();
/// ```
pub trait Actor<N: ActorName = String, K: MessageKind = String, P: Payload = String>:
    Send + 'static
{
    /// Hook invoked once before the actor receives any message.
    ///
    /// Returning an error (or panicking) aborts registration: the actor is
    /// discarded, no messages are delivered, and [`on_stop`](Actor::on_stop)
    /// is not called.
    fn on_start(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Handler invoked once per delivered envelope.
    ///
    /// The envelope is passed by value; payload ownership transfers to the
    /// actor. `ctx` carries the actor's own id and the send capability.
    fn on_message(&mut self, envelope: Envelope<N, K, P>, ctx: &Context<'_, N, K, P>);

    /// Hook invoked once after the actor's last message, during release or
    /// runtime shutdown. All envelopes accepted before the mailbox closed
    /// have been delivered by the time this runs.
    fn on_stop(&mut self) {}
}

/// Storage for a registered actor object.
///
/// `Owned` slots drop the actor when the cell is torn down; `Shared` slots
/// drop only the runtime's clone, so the caller's handle keeps the object
/// alive past release.
pub(crate) enum ActorSlot<N: ActorName, K: MessageKind, P: Payload> {
    Owned(Box<dyn Actor<N, K, P>>),
    Shared(Arc<Mutex<dyn Actor<N, K, P>>>),
}

impl<N: ActorName, K: MessageKind, P: Payload> ActorSlot<N, K, P> {
    pub(crate) fn on_start(&mut self) -> Result<(), BoxError> {
        match self {
            ActorSlot::Owned(actor) => actor.on_start(),
            ActorSlot::Shared(actor) => actor.lock().on_start(),
        }
    }

    pub(crate) fn on_message(&mut self, envelope: Envelope<N, K, P>, ctx: &Context<'_, N, K, P>) {
        match self {
            ActorSlot::Owned(actor) => actor.on_message(envelope, ctx),
            ActorSlot::Shared(actor) => actor.lock().on_message(envelope, ctx),
        }
    }

    pub(crate) fn on_stop(&mut self) {
        match self {
            ActorSlot::Owned(actor) => actor.on_stop(),
            ActorSlot::Shared(actor) => actor.lock().on_stop(),
        }
    }
}

impl<N: ActorName, K: MessageKind, P: Payload> fmt::Debug for ActorSlot<N, K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorSlot::Owned(_) => f.write_str("ActorSlot::Owned"),
            ActorSlot::Shared(_) => f.write_str("ActorSlot::Shared"),
        }
    }
}
