//! Provider side of the discovery handshake.

use std::sync::atomic::{AtomicU64, Ordering};

use portrpc_channel::{
    ChannelError, Envelope, EnvelopeKind, Environment, MessagePort, PortWriter, Subscription,
};
use serde_json::Value;

use crate::error::Result;
use crate::message::{self, RequestId};

/// JSON-RPC "invalid request" error code.
pub const INVALID_REQUEST: i64 = -32600;

/// Answers discovery requests with a dedicated message port.
pub struct ProviderListener {
    env: Environment,
    requests: Subscription,
    trusted_origin: String,
    reply_origin: String,
    accepted: AtomicU64,
}

impl ProviderListener {
    /// Start listening for discovery requests on `env`.
    ///
    /// Requests are trusted and answered in the environment's own origin.
    pub fn bind(env: &Environment) -> Self {
        let requests = env.subscribe(|envelope| envelope.kind == EnvelopeKind::ProviderRequest);
        Self {
            env: env.clone(),
            requests,
            trusted_origin: env.origin().to_string(),
            reply_origin: env.origin().to_string(),
            accepted: AtomicU64::new(0),
        }
    }

    /// Override the origin requests must come from.
    pub fn with_trusted_origin(mut self, origin: impl Into<String>) -> Self {
        self.trusted_origin = origin.into();
        self
    }

    /// Override the origin acceptances are sent from.
    pub fn with_reply_origin(mut self, origin: impl Into<String>) -> Self {
        self.reply_origin = origin.into();
        self
    }

    /// Wait for the next trusted discovery request and hand back the
    /// provider's end of a fresh port.
    pub async fn accept(&mut self) -> Result<MessagePort> {
        loop {
            let Some(request) = self.requests.recv().await else {
                return Err(ChannelError::EnvironmentClosed.into());
            };
            if request.origin != self.trusted_origin {
                tracing::debug!(origin = %request.origin, "discovery request from untrusted origin ignored");
                continue;
            }

            let (local, remote) = MessagePort::pair();
            let delivered = self
                .env
                .broadcast(Envelope::provider_success(self.reply_origin.as_str(), remote));
            let count = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::debug!(accepted = count, delivered, "discovery request accepted");
            return Ok(local);
        }
    }

    /// Number of requests accepted so far.
    pub fn accepted_count(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }
}

/// One request handed to a [`serve_with`] handler.
#[derive(Debug)]
pub struct Incoming<'a> {
    pub id: RequestId,
    pub method: &'a str,
    pub params: &'a Value,
}

/// Handler decision for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Result(Value),
    Error { code: i64, message: String },
    /// Leave the request unanswered.
    Ignore,
}

/// Answer requests arriving on `port` until the client end goes away.
///
/// Batches are answered with a batch holding one response per answered
/// element. Messages without an identifier are not answered. The handler
/// also gets the port's writer, so it can push notifications.
///
/// Returns the number of requests answered.
pub async fn serve_with<H>(port: MessagePort, mut handler: H) -> usize
where
    H: FnMut(Incoming<'_>, &PortWriter) -> Reply,
{
    let (writer, mut reader) = port.into_split();
    let mut answered = 0usize;

    while let Some(inbound) = reader.recv().await {
        let response = match &inbound {
            Value::Array(batch) => {
                let responses: Vec<Value> = batch
                    .iter()
                    .filter_map(|element| answer(element, &writer, &mut handler))
                    .collect();
                answered += responses.len();
                (!responses.is_empty()).then_some(Value::Array(responses))
            }
            Value::Object(_) => {
                let response = answer(&inbound, &writer, &mut handler);
                answered += usize::from(response.is_some());
                response
            }
            _ => {
                tracing::trace!("non-request message ignored");
                None
            }
        };

        if let Some(response) = response {
            if let Err(err) = writer.write(response) {
                tracing::debug!(error = %err, "client end closed before response");
                break;
            }
        }
    }

    tracing::debug!(answered, "provider port closed");
    answered
}

fn answer<H>(request: &Value, writer: &PortWriter, handler: &mut H) -> Option<Value>
where
    H: FnMut(Incoming<'_>, &PortWriter) -> Reply,
{
    let id = message::message_id(request)?;
    let Some(method) = message::method_name(request) else {
        return Some(message::response_error(&id, INVALID_REQUEST, "missing method"));
    };
    let params = request.get("params").unwrap_or(&Value::Null);

    match handler(Incoming { id: id.clone(), method, params }, writer) {
        Reply::Result(result) => Some(message::response_result(&id, result)),
        Reply::Error { code, message } => Some(message::response_error(&id, code, &message)),
        Reply::Ignore => None,
    }
}
