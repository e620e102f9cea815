//! In-process provider host used by `call` and `batch`.

use portrpc_channel::{Environment, PortWriter};
use portrpc_peer::{
    connect_with_config, serve_with, CorrelatorConfig, Incoming, ProviderListener, Reply, RpcError,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::cmd::ConnectArgs;

/// Origin shared by the host and the client.
pub const HOST_ORIGIN: &str = "https://portrpc.local";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostMode {
    /// Answer every request with its method and params.
    Echo,
    /// Accept the handshake, never answer.
    Silent,
    /// No provider at all.
    Absent,
}

impl HostMode {
    pub fn from_args(args: &ConnectArgs) -> Self {
        if args.no_host {
            HostMode::Absent
        } else if args.silent_host {
            HostMode::Silent
        } else {
            HostMode::Echo
        }
    }
}

/// Connect through a fresh environment and exchange one payload.
pub async fn exchange<P>(payload: &P, config: CorrelatorConfig, mode: HostMode) -> Result<Value, RpcError>
where
    P: Serialize + ?Sized,
{
    let env = Environment::new(HOST_ORIGIN);
    if mode != HostMode::Absent {
        // Bound before the client announces itself.
        let listener = ProviderListener::bind(&env);
        tokio::spawn(provide(listener, mode));
    }

    let correlator = connect_with_config(&env, config);
    correlator.ready().await?;
    tracing::debug!(state = correlator.state().as_str(), "client connected");
    correlator.request(payload).await
}

async fn provide(mut listener: ProviderListener, mode: HostMode) {
    let port = match listener.accept().await {
        Ok(port) => port,
        Err(err) => {
            tracing::warn!(error = %err, "provider host stopped before accepting");
            return;
        }
    };

    let answered = serve_with(port, move |call: Incoming<'_>, _: &PortWriter| match mode {
        HostMode::Silent => Reply::Ignore,
        _ => Reply::Result(json!({"method": call.method, "params": call.params})),
    })
    .await;
    tracing::debug!(answered, "provider host finished");
}
