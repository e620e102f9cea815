use portrpc_channel::Environment;

use crate::config::CorrelatorConfig;
use crate::correlator::Correlator;
use crate::negotiator::BroadcastDiscovery;

/// Connect to a provider in `env` with default configuration.
///
/// Returns immediately; the handshake runs in the background. Use
/// [`Correlator::ready`] to wait for it.
pub fn connect(env: &Environment) -> Correlator {
    connect_with_config(env, CorrelatorConfig::default())
}

/// Connect with explicit configuration.
pub fn connect_with_config(env: &Environment, config: CorrelatorConfig) -> Correlator {
    Correlator::connect(BroadcastDiscovery::new(env.clone()), config)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::error::RpcError;
    use crate::listener::{serve_with, Incoming, ProviderListener, Reply};
    use crate::negotiator::ConnectionState;

    const ORIGIN: &str = "https://dapp.example";

    #[tokio::test(start_paused = true)]
    async fn connect_convenience() {
        let env = Environment::new(ORIGIN);
        let mut listener = ProviderListener::bind(&env);
        let server = tokio::spawn(async move {
            let port = listener.accept().await.expect("listener should accept");
            serve_with(port, |call: Incoming<'_>, _: &_| {
                Reply::Result(json!(format!("{}:{}", call.method, call.id)))
            })
            .await
        });

        let client = connect(&env);
        let response = client
            .request(&json!({"id": 7, "method": "eth_blockNumber"}))
            .await
            .expect("request should succeed");
        assert_eq!(response["result"], json!("eth_blockNumber:7"));
        assert_eq!(client.state(), ConnectionState::Connected);

        drop(client);
        assert_eq!(server.await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_without_provider_times_out() {
        let env = Environment::new(ORIGIN);
        let config = CorrelatorConfig::default().with_handshake_timeout(Duration::from_millis(75));

        let client = connect_with_config(&env, config);
        assert!(matches!(
            client.ready().await,
            Err(RpcError::HandshakeTimeout(t)) if t == Duration::from_millis(75)
        ));
        assert!(matches!(
            client.request(&json!({"id": 1, "method": "x"})).await,
            Err(RpcError::ConnectionNotOpen)
        ));
    }
}
