//! In-process duplex message ports and a broadcast environment.
//!
//! This is the lowest layer of portrpc. It provides the two primitives the
//! correlation core consumes:
//! - [`MessagePort`]: an entangled, asynchronous duplex endpoint
//! - [`Environment`]: a process-wide broadcast bus used only to hand a
//!   dedicated port from one side to the other
//!
//! Everything else builds on top of these types.

pub mod environment;
pub mod error;
pub mod port;

pub use environment::{
    Envelope, EnvelopeKind, Environment, PortTransfer, Subscription, PROVIDER_REQUEST,
    PROVIDER_SUCCESS,
};
pub use error::{ChannelError, Result};
pub use port::{MessagePort, PortReader, PortWriter};
