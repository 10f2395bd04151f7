//! Envelopes and the handler-side send capability.

use std::{fmt, sync::Arc};

use crate::{
    actor::{ActorName, MessageKind, Payload},
    error::{Delivery, SendError},
    mailbox::Mailbox,
    system::SystemCore,
};

/// A message in flight: the sender's id, the kind label, and the payload.
///
/// Envelopes are immutable after creation and are handed to the receiving
/// actor by value, so handlers typically destructure them:
///
/// ```ignore
/// let Envelope { source, kind, payload } = envelope;
/// ```
pub struct Envelope<N = String, K = String, P = String> {
    /// Id of the sending actor (or the external source name).
    pub source: N,
    /// Label naming the kind of this message.
    pub kind: K,
    /// The caller-supplied value; ownership lies with the receiver.
    pub payload: P,
}

impl<N, K, P> Envelope<N, K, P> {
    /// Creates a new envelope.
    pub fn new(source: N, kind: K, payload: P) -> Self {
        Envelope {
            source,
            kind,
            payload,
        }
    }
}

impl<N: fmt::Debug, K: fmt::Debug, P> fmt::Debug for Envelope<N, K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("source", &self.source)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Handler-side view of the runtime, passed to
/// [`Actor::on_message`](crate::Actor::on_message).
///
/// The context names the running actor and forwards sends to the owning
/// runtime with the actor's own id as source. A send to the actor's own
/// name bypasses the registry and goes straight into the current mailbox;
/// handlers routinely self-schedule continuations this way.
pub struct Context<'a, N: ActorName = String, K: MessageKind = String, P: Payload = String> {
    id: &'a N,
    mailbox: &'a Arc<Mailbox<N, K, P>>,
    core: Option<&'a Arc<SystemCore<N, K, P>>>,
}

impl<'a, N: ActorName, K: MessageKind, P: Payload> Context<'a, N, K, P> {
    pub(crate) fn bound(
        id: &'a N,
        mailbox: &'a Arc<Mailbox<N, K, P>>,
        core: &'a Arc<SystemCore<N, K, P>>,
    ) -> Self {
        Context {
            id,
            mailbox,
            core: Some(core),
        }
    }

    /// Context for the residual drain that runs after an actor left the
    /// registry; sends fail with `NotRegistered`.
    pub(crate) fn unbound(id: &'a N, mailbox: &'a Arc<Mailbox<N, K, P>>) -> Self {
        Context {
            id,
            mailbox,
            core: None,
        }
    }

    /// The id this actor is registered under.
    pub fn id(&self) -> &N {
        self.id
    }

    /// Sends a message to `target`, with this actor as the source.
    ///
    /// Failures return the payload to the caller inside the error. During
    /// the residual drain after release or shutdown the actor no longer has
    /// a runtime binding and every send fails with
    /// [`SendError::NotRegistered`].
    pub fn send(&self, target: &N, kind: K, payload: P) -> Result<Delivery, SendError<P>> {
        let Some(core) = self.core else {
            return Err(SendError::NotRegistered(payload));
        };
        if target == self.id {
            let delivery = self
                .mailbox
                .push(Envelope::new(self.id.clone(), kind, payload))
                .map_err(|err| err.map_msg(|env| env.payload))?;
            core.schedule(self.mailbox);
            Ok(delivery)
        } else {
            core.send(self.id.clone(), target, kind, payload)
        }
    }
}

impl<N: ActorName, K: MessageKind, P: Payload> fmt::Debug for Context<'_, N, K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", self.id)
            .field("bound", &self.core.is_some())
            .finish()
    }
}
