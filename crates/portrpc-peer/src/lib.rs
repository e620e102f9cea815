//! JSON-RPC call correlation over a negotiated message port.
//!
//! A client negotiates a dedicated [`MessagePort`](portrpc_channel::MessagePort)
//! with a provider through a one-shot discovery handshake, then matches
//! responses to the requests that caused them. Messages without an id whose
//! method carries the subscription marker are fanned out to listeners.

pub mod config;
pub mod connector;
pub mod correlator;
pub mod error;
pub mod listener;
pub mod message;
pub mod negotiator;

pub use config::{CorrelatorConfig, CorrelatorOptions, DEFAULT_HANDSHAKE_TIMEOUT};
pub use connector::{connect, connect_with_config};
pub use correlator::{Correlator, NotificationListener, ResponseCallback, DATA_EVENT};
pub use error::{Result, RpcError};
pub use listener::{serve_with, Incoming, ProviderListener, Reply, INVALID_REQUEST};
pub use message::{
    request_ids, response_error, response_result, subscription_notification, Request, RequestId,
    JSONRPC_VERSION, SUBSCRIPTION_MARKER,
};
pub use negotiator::{
    BroadcastDiscovery, ConnectionState, DisconnectReason, Discovery, Negotiation, Negotiator,
};
