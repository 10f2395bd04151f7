//! Error and outcome types for the runtime.
//!
//! All runtime APIs report through return values. Panics raised by user
//! hooks and handlers are caught at the handler boundary and logged; they
//! never unwind through the runtime.

use std::{any::Any, error, fmt, io};

use thiserror::Error;

/// A boxed dyn error, used by the fallible actor hooks.
pub type BoxError = Box<dyn error::Error + Send + Sync + 'static>;

/// Outcome of a successful enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The envelope was queued below the mailbox's advisory threshold.
    Queued,
    /// The envelope was queued, but the mailbox backlog now exceeds its
    /// overhead threshold. Purely advisory; nothing was dropped.
    Overhead,
}

impl Delivery {
    /// Whether the mailbox reported backpressure for this enqueue.
    pub fn is_overhead(self) -> bool {
        matches!(self, Delivery::Overhead)
    }
}

/// Error returned when a message could not be enqueued.
///
/// Every variant hands the undelivered value back to the caller. At the
/// public API surface `M` is the payload; internally the mailbox returns the
/// whole envelope and the runtime maps it down with [`SendError::map_msg`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum SendError<M = ()> {
    /// No actor with the target name is registered.
    NotFound(M),
    /// The target's mailbox is closed; the actor is shutting down.
    Closed(M),
    /// The sending actor has no runtime binding. Produced by `Context::send`
    /// while residual envelopes are drained after release or shutdown.
    NotRegistered(M),
    /// Growing the mailbox queue failed.
    OutOfMemory(M),
}

impl<M> SendError<M> {
    /// Maps the carried message to another type.
    pub fn map_msg<N, F>(self, f: F) -> SendError<N>
    where
        F: FnOnce(M) -> N,
    {
        match self {
            SendError::NotFound(msg) => SendError::NotFound(f(msg)),
            SendError::Closed(msg) => SendError::Closed(f(msg)),
            SendError::NotRegistered(msg) => SendError::NotRegistered(f(msg)),
            SendError::OutOfMemory(msg) => SendError::OutOfMemory(f(msg)),
        }
    }

    /// Returns the undelivered message, consuming the error.
    pub fn into_msg(self) -> M {
        match self {
            SendError::NotFound(msg)
            | SendError::Closed(msg)
            | SendError::NotRegistered(msg)
            | SendError::OutOfMemory(msg) => msg,
        }
    }

    fn variant_name(&self) -> &'static str {
        match self {
            SendError::NotFound(_) => "NotFound",
            SendError::Closed(_) => "Closed",
            SendError::NotRegistered(_) => "NotRegistered",
            SendError::OutOfMemory(_) => "OutOfMemory",
        }
    }
}

// Manual impls: the carried message type stays unconstrained.
impl<M> fmt::Debug for SendError<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SendError::{}(..)", self.variant_name())
    }
}

impl<M> fmt::Display for SendError<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::NotFound(_) => write!(f, "no actor registered under the target name"),
            SendError::Closed(_) => write!(f, "target mailbox is closed"),
            SendError::NotRegistered(_) => write!(f, "sending actor has no runtime binding"),
            SendError::OutOfMemory(_) => write!(f, "mailbox allocation failed"),
        }
    }
}

impl<M> error::Error for SendError<M> {}

/// Error returned by the `register` family of calls.
#[derive(Debug, Error)]
pub enum RegisterError {
    /// An actor is already registered under this name.
    #[error("an actor is already registered under this name")]
    AlreadyRegistered,
    /// The actor's enter hook returned an error or panicked. The actor was
    /// not registered and its exit hook will not run.
    #[error("actor enter hook failed: {0}")]
    InitFailed(BoxError),
    /// The runtime is shutting down and accepts no new actors.
    #[error("runtime is shutting down")]
    ShuttingDown,
    /// Spawning the actor's dedicated thread failed.
    #[error("failed to spawn actor thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Best-effort extraction of a panic payload for logging.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

pub(crate) fn panic_to_box_error(payload: Box<dyn Any + Send>) -> BoxError {
    format!("panic: {}", panic_message(payload.as_ref())).into()
}
