//! One-time discovery handshake that yields a dedicated message port.
//!
//! The client announces itself, then waits a bounded time for exactly one
//! acceptance carrying a port. The outcome is never an error: a failed or
//! timed-out handshake simply ends in [`ConnectionState::Disconnected`].

use std::future::Future;
use std::time::Duration;

use portrpc_channel::{ChannelError, Envelope, EnvelopeKind, Environment, MessagePort, Subscription};

/// Connection lifecycle of a correlator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        }
    }
}

/// Why a negotiation ended without a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// No acceptance arrived within the handshake timeout.
    HandshakeTimeout(Duration),
    /// The discovery substrate failed.
    DiscoveryFailed(String),
}

/// Terminal result of a negotiation.
#[derive(Debug)]
pub enum Negotiation {
    Connected(MessagePort),
    Disconnected(DisconnectReason),
}

impl Negotiation {
    pub fn state(&self) -> ConnectionState {
        match self {
            Negotiation::Connected(_) => ConnectionState::Connected,
            Negotiation::Disconnected(_) => ConnectionState::Disconnected,
        }
    }
}

/// Discovery substrate used to find a provider and receive its port.
pub trait Discovery: Send + 'static {
    /// Announce that a client is looking for a provider.
    fn announce(&mut self) -> Result<(), ChannelError>;

    /// Wait up to `timeout` for an acceptance.
    ///
    /// Resolves to `Ok(None)` when the deadline elapses. Implementations
    /// must stop listening before resolving.
    fn await_acceptance(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<MessagePort>, ChannelError>> + Send;
}

/// Drives a [`Discovery`] to a terminal [`Negotiation`].
pub struct Negotiator<D> {
    discovery: D,
    timeout: Duration,
}

impl<D: Discovery> Negotiator<D> {
    pub fn new(discovery: D, timeout: Duration) -> Self {
        Self { discovery, timeout }
    }

    pub async fn negotiate(mut self) -> Negotiation {
        if let Err(err) = self.discovery.announce() {
            tracing::warn!(error = %err, "discovery announce failed");
            return Negotiation::Disconnected(DisconnectReason::DiscoveryFailed(err.to_string()));
        }

        match self.discovery.await_acceptance(self.timeout).await {
            Ok(Some(port)) => {
                tracing::debug!("message port negotiated");
                Negotiation::Connected(port)
            }
            Ok(None) => {
                tracing::debug!(timeout = ?self.timeout, "handshake timed out");
                Negotiation::Disconnected(DisconnectReason::HandshakeTimeout(self.timeout))
            }
            Err(err) => {
                tracing::warn!(error = %err, "discovery failed while awaiting acceptance");
                Negotiation::Disconnected(DisconnectReason::DiscoveryFailed(err.to_string()))
            }
        }
    }
}

/// [`Discovery`] over a broadcast [`Environment`].
///
/// Only acceptances whose origin equals the trusted origin are considered;
/// everything else is ignored without affecting the negotiation.
pub struct BroadcastDiscovery {
    env: Environment,
    trusted_origin: String,
    subscription: Option<Subscription>,
}

impl BroadcastDiscovery {
    /// Trust peers in the environment's own origin.
    pub fn new(env: Environment) -> Self {
        let trusted_origin = env.origin().to_string();
        Self {
            env,
            trusted_origin,
            subscription: None,
        }
    }

    /// Override the trusted origin.
    pub fn with_trusted_origin(mut self, origin: impl Into<String>) -> Self {
        self.trusted_origin = origin.into();
        self
    }
}

impl Discovery for BroadcastDiscovery {
    fn announce(&mut self) -> Result<(), ChannelError> {
        let trusted = self.trusted_origin.clone();
        // Listen before announcing so a synchronous reply is not lost.
        self.subscription = Some(self.env.subscribe(move |envelope| {
            envelope.kind == EnvelopeKind::ProviderSuccess && envelope.origin == trusted
        }));

        let delivered = self
            .env
            .broadcast(Envelope::provider_request(self.env.origin()));
        tracing::debug!(delivered, "provider request announced");
        Ok(())
    }

    async fn await_acceptance(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<MessagePort>, ChannelError> {
        let Some(mut subscription) = self.subscription.take() else {
            return Err(ChannelError::EnvironmentClosed);
        };

        let accepted = tokio::time::timeout(timeout, async {
            loop {
                let Some(envelope) = subscription.recv().await else {
                    return Err(ChannelError::EnvironmentClosed);
                };
                match envelope.take_port() {
                    Ok(port) => return Ok(port),
                    Err(err) => tracing::trace!(error = %err, "acceptance without usable port"),
                }
            }
        })
        .await;
        subscription.unsubscribe();

        match accepted {
            Ok(Ok(port)) => Ok(Some(port)),
            Ok(Err(err)) => Err(err),
            Err(_elapsed) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const ORIGIN: &str = "https://wallet.example";

    /// Answer the next provider request on `env` with a port, sending the
    /// acceptance from `reply_origin`.
    fn spawn_provider(
        env: &Environment,
        reply_origin: &'static str,
    ) -> tokio::task::JoinHandle<MessagePort> {
        let mut requests = env.subscribe(|e| e.kind == EnvelopeKind::ProviderRequest);
        let env = env.clone();
        tokio::spawn(async move {
            let request = requests.recv().await.expect("request should arrive");
            assert_eq!(request.origin, ORIGIN);
            let (local, remote) = MessagePort::pair();
            env.broadcast(Envelope::provider_success(reply_origin, remote));
            local
        })
    }

    #[tokio::test(start_paused = true)]
    async fn negotiation_yields_port() {
        let env = Environment::new(ORIGIN);
        let provider = spawn_provider(&env, ORIGIN);

        let discovery = BroadcastDiscovery::new(env.clone());
        let outcome = Negotiator::new(discovery, Duration::from_millis(50))
            .negotiate()
            .await;
        let provider_port = provider.await.unwrap();

        let mut port = match outcome {
            Negotiation::Connected(port) => port,
            other => panic!("expected connected outcome, got {other:?}"),
        };
        provider_port.write(json!({"ping": true})).unwrap();
        assert_eq!(port.recv().await, Some(json!({"ping": true})));
        assert_eq!(env.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn negotiation_times_out_without_provider() {
        let env = Environment::new(ORIGIN);
        let started = tokio::time::Instant::now();

        let discovery = BroadcastDiscovery::new(env.clone());
        let outcome = Negotiator::new(discovery, Duration::from_millis(50))
            .negotiate()
            .await;

        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(outcome.state(), ConnectionState::Disconnected);
        assert!(matches!(
            outcome,
            Negotiation::Disconnected(DisconnectReason::HandshakeTimeout(t)) if t == Duration::from_millis(50)
        ));
        assert_eq!(env.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_origin_acceptance_is_ignored() {
        let env = Environment::new(ORIGIN);
        let provider = spawn_provider(&env, "https://evil.example");

        let discovery = BroadcastDiscovery::new(env.clone());
        let outcome = Negotiator::new(discovery, Duration::from_millis(50))
            .negotiate()
            .await;
        provider.await.unwrap();

        assert_eq!(outcome.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn later_acceptances_find_no_listener() {
        let env = Environment::new(ORIGIN);
        let provider = spawn_provider(&env, ORIGIN);

        let discovery = BroadcastDiscovery::new(env.clone());
        let outcome = Negotiator::new(discovery, Duration::from_millis(50))
            .negotiate()
            .await;
        provider.await.unwrap();
        assert_eq!(outcome.state(), ConnectionState::Connected);

        let (_local, remote) = MessagePort::pair();
        assert_eq!(env.broadcast(Envelope::provider_success(ORIGIN, remote)), 0);
    }

    struct BrokenDiscovery;

    impl Discovery for BrokenDiscovery {
        fn announce(&mut self) -> Result<(), ChannelError> {
            Err(ChannelError::EnvironmentClosed)
        }

        async fn await_acceptance(
            &mut self,
            _timeout: Duration,
        ) -> Result<Option<MessagePort>, ChannelError> {
            unreachable!("announce failed")
        }
    }

    #[tokio::test]
    async fn announce_failure_ends_disconnected() {
        let outcome = Negotiator::new(BrokenDiscovery, Duration::from_millis(50))
            .negotiate()
            .await;
        assert!(matches!(
            outcome,
            Negotiation::Disconnected(DisconnectReason::DiscoveryFailed(_))
        ));
    }
}
