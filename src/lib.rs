#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(rust_2018_idioms)]
#![warn(missing_debug_implementations)]
#![deny(unused_must_use)]

pub mod actor;
pub mod error;
pub mod message;
pub mod system;

mod mailbox;
mod ready_queue;
mod registry;
mod worker_group;

pub use actor::{Actor, ActorName, MessageKind, Payload};
pub use error::{BoxError, Delivery, RegisterError, SendError};
pub use message::{Context, Envelope};
pub use system::{ActorSystem, DEFAULT_BATCH, DEFAULT_OVERHEAD, DEFAULT_WORKERS};
