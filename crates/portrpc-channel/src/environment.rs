//! Process-wide broadcast bus.
//!
//! The environment stands in for the embedding page: any party can
//! broadcast an [`Envelope`] and every live [`Subscription`] whose
//! predicate accepts it receives a copy. A port attached to an envelope is
//! transferred to whichever receiver claims it first.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;

use crate::error::{ChannelError, Result};
use crate::port::MessagePort;

/// Envelope type announcing that a client wants a dedicated port.
pub const PROVIDER_REQUEST: &str = "ETHEREUM_PROVIDER_REQUEST";
/// Envelope type handing a dedicated port back to the client.
pub const PROVIDER_SUCCESS: &str = "ETHEREUM_PROVIDER_SUCCESS";

/// Discriminates broadcast envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeKind {
    ProviderRequest,
    ProviderSuccess,
    Other(String),
}

impl EnvelopeKind {
    pub fn parse(kind: &str) -> Self {
        match kind {
            PROVIDER_REQUEST => Self::ProviderRequest,
            PROVIDER_SUCCESS => Self::ProviderSuccess,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ProviderRequest => PROVIDER_REQUEST,
            Self::ProviderSuccess => PROVIDER_SUCCESS,
            Self::Other(other) => other,
        }
    }
}

/// A port in transit. Every clone refers to the same slot, so the port can
/// be taken exactly once.
#[derive(Clone)]
pub struct PortTransfer {
    slot: Arc<Mutex<Option<MessagePort>>>,
}

impl PortTransfer {
    pub fn new(port: MessagePort) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(port))),
        }
    }

    /// Claim the transferred port.
    pub fn take(&self) -> Result<MessagePort> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ChannelError::AlreadyTransferred)
    }
}

impl fmt::Debug for PortTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let claimed = self
            .slot
            .lock()
            .map(|slot| slot.is_none())
            .unwrap_or(true);
        f.debug_struct("PortTransfer")
            .field("claimed", &claimed)
            .finish()
    }
}

/// A message broadcast through the [`Environment`].
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Origin of the sender.
    pub origin: String,
    /// Envelope type.
    pub kind: EnvelopeKind,
    /// Optional port transferred with the envelope.
    pub port: Option<PortTransfer>,
}

impl Envelope {
    pub fn new(origin: impl Into<String>, kind: EnvelopeKind) -> Self {
        Self {
            origin: origin.into(),
            kind,
            port: None,
        }
    }

    /// Discovery request sent by a client looking for a provider.
    pub fn provider_request(origin: impl Into<String>) -> Self {
        Self::new(origin, EnvelopeKind::ProviderRequest)
    }

    /// Acceptance sent by a provider, carrying the client's end of the port.
    pub fn provider_success(origin: impl Into<String>, port: MessagePort) -> Self {
        Self {
            origin: origin.into(),
            kind: EnvelopeKind::ProviderSuccess,
            port: Some(PortTransfer::new(port)),
        }
    }

    /// Claim the attached port, if any.
    pub fn take_port(&self) -> Result<MessagePort> {
        match &self.port {
            Some(transfer) => transfer.take(),
            None => Err(ChannelError::AlreadyTransferred),
        }
    }
}

type Predicate = Box<dyn Fn(&Envelope) -> bool + Send + Sync>;

struct Subscriber {
    id: u64,
    predicate: Predicate,
    tx: mpsc::UnboundedSender<Envelope>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

/// Broadcast bus shared by every party in one origin.
#[derive(Clone)]
pub struct Environment {
    origin: Arc<str>,
    registry: Arc<Mutex<Registry>>,
}

impl Environment {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: Arc::from(origin.into()),
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Origin of this environment. Peers treat it as the trust boundary.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Deliver an envelope to every subscriber that accepts it.
    ///
    /// Returns the number of subscribers the envelope was delivered to.
    pub fn broadcast(&self, envelope: Envelope) -> usize {
        let mut registry = self.lock();
        registry.subscribers.retain(|sub| !sub.tx.is_closed());

        let mut delivered = 0;
        for sub in &registry.subscribers {
            if (sub.predicate)(&envelope) && sub.tx.send(envelope.clone()).is_ok() {
                delivered += 1;
            }
        }

        tracing::trace!(
            kind = envelope.kind.as_str(),
            origin = %envelope.origin,
            delivered,
            "envelope broadcast"
        );
        delivered
    }

    /// Register interest in envelopes accepted by `predicate`.
    pub fn subscribe<F>(&self, predicate: F) -> Subscription
    where
        F: Fn(&Envelope) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.subscribers.push(Subscriber {
            id,
            predicate: Box::new(predicate),
            tx,
        });

        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut registry = self.lock();
        registry.subscribers.retain(|sub| !sub.tx.is_closed());
        registry.subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("origin", &self.origin)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Receiving side of [`Environment::subscribe`]. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Envelope>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Wait for the next accepted envelope.
    ///
    /// Returns `None` once every environment handle has been dropped.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Stop receiving envelopes.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.subscribers.retain(|sub| sub.id != self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
