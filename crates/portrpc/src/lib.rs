//! JSON-RPC request/response correlation over negotiated message ports.
//!
//! portrpc lets a client find a provider through a one-shot broadcast
//! handshake, obtain a dedicated duplex port, and issue JSON-RPC calls over
//! it with per-request timeouts, batches and subscription notifications.
//!
//! # Crate Structure
//!
//! - [`channel`]: message ports and the broadcast environment used for discovery
//! - [`peer`]: channel negotiation, call correlation and the provider host

/// Re-export channel types.
pub mod channel {
    pub use portrpc_channel::*;
}

/// Re-export peer types.
pub mod peer {
    pub use portrpc_peer::*;
}

pub use portrpc_peer::{connect, connect_with_config, Correlator, CorrelatorConfig, RpcError};
