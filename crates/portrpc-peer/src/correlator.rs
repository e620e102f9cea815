//! Request/response correlation over a negotiated message port.
//!
//! A [`Correlator`] turns the unordered, asynchronous port into a
//! call/response API. Each written request registers one pending entry per
//! identifier; inbound messages are routed either to the matching entry or,
//! when they carry no identifier and a subscription method, to every
//! notification listener.
//!
//! All bookkeeping lives behind one mutex that is never held while user
//! callbacks run, so callbacks may freely call back into the correlator.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use portrpc_channel::{MessagePort, PortReader, PortWriter};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::config::CorrelatorConfig;
use crate::error::{Result, RpcError};
use crate::message::{self, RequestId};
use crate::negotiator::{ConnectionState, DisconnectReason, Discovery, Negotiation, Negotiator};

/// Event name for notification listeners.
pub const DATA_EVENT: &str = "data";

/// Completion callback for one `send` call.
pub type ResponseCallback = Box<dyn FnOnce(Result<Value>) + Send>;

/// Listener for unsolicited notifications. Identity (the `Arc` pointer) is
/// what [`Correlator::remove_listener`] matches on.
pub type NotificationListener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Single-shot completion shared by every identifier of one `send`.
struct Completion {
    method: Option<String>,
    callback: Mutex<Option<ResponseCallback>>,
}

impl Completion {
    fn new(callback: ResponseCallback, method: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            method,
            callback: Mutex::new(Some(callback)),
        })
    }

    /// Fire the callback unless it was already claimed. Returns whether it
    /// fired.
    fn complete(&self, result: Result<Value>) -> bool {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match callback {
            Some(callback) => {
                callback(result);
                true
            }
            None => false,
        }
    }
}

struct PendingRequest {
    completion: Arc<Completion>,
    timer: Option<CancellationToken>,
}

impl PendingRequest {
    fn cancel_timer(&self) {
        if let Some(timer) = &self.timer {
            timer.cancel();
        }
    }
}

/// A send waiting for the connection to settle.
struct QueuedSend {
    payload: Value,
    ids: Vec<RequestId>,
    completion: Arc<Completion>,
}

/// A completion to fail once the state lock is released.
type Failure = (Arc<Completion>, RpcError);

struct Shared {
    state: ConnectionState,
    disconnect_reason: Option<DisconnectReason>,
    writer: Option<PortWriter>,
    pending: HashMap<RequestId, PendingRequest>,
    queued: Vec<QueuedSend>,
    listeners: Vec<NotificationListener>,
}

struct Inner {
    config: CorrelatorConfig,
    shared: Mutex<Shared>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
}

/// JSON-RPC call correlator bound to one message port.
///
/// Cloning yields another handle to the same correlator. Background tasks
/// (negotiation, delivery, timers) stop once the last handle is dropped.
#[derive(Clone)]
pub struct Correlator {
    inner: Arc<Inner>,
}

impl Correlator {
    /// Start negotiating a port through `discovery` and return immediately
    /// in the `Connecting` state.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect<D: Discovery>(discovery: D, config: CorrelatorConfig) -> Self {
        let negotiator = Negotiator::new(discovery, config.handshake_timeout);
        let correlator = Self::new(config);

        let weak = Arc::downgrade(&correlator.inner);
        let shutdown = correlator.inner.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                outcome = negotiator.negotiate() => {
                    if let Some(inner) = weak.upgrade() {
                        inner.finish_negotiation(outcome);
                    }
                }
            }
        });

        correlator
    }

    /// Wrap a port that is already established.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_port(port: MessagePort, config: CorrelatorConfig) -> Self {
        let correlator = Self::new(config);
        correlator
            .inner
            .finish_negotiation(Negotiation::Connected(port));
        correlator
    }

    fn new(config: CorrelatorConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        Self {
            inner: Arc::new(Inner {
                config,
                shared: Mutex::new(Shared {
                    state: ConnectionState::Connecting,
                    disconnect_reason: None,
                    writer: None,
                    pending: HashMap::new(),
                    queued: Vec::new(),
                    listeners: Vec::new(),
                }),
                state_tx,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Send a request object or a batch of them.
    ///
    /// `callback` runs exactly once: with the raw response message, or
    /// with the error that settled the request. Error paths that need no
    /// I/O (disconnected, serialization, missing identifiers) run it before
    /// `send` returns. A disconnected correlator always reports
    /// [`RpcError::ConnectionNotOpen`], whatever the payload.
    ///
    /// The payload is serialized immediately, so the caller may reuse or
    /// mutate its original afterwards.
    pub fn send<P, F>(&self, payload: &P, callback: F)
    where
        P: Serialize + ?Sized,
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        // Disconnected is terminal; no payload inspection once there.
        if self.state() == ConnectionState::Disconnected {
            return callback(Err(RpcError::ConnectionNotOpen));
        }

        let payload = match serde_json::to_value(payload) {
            Ok(payload) => payload,
            Err(err) => return callback(Err(err.into())),
        };
        let ids = match message::request_ids(&payload) {
            Ok(ids) => ids,
            Err(err) => return callback(Err(err)),
        };
        let method = first_method(&payload);
        let op = QueuedSend {
            payload,
            ids,
            completion: Completion::new(Box::new(callback), method),
        };

        let failure = {
            let mut shared = self.inner.lock();
            match shared.state {
                ConnectionState::Connecting => {
                    tracing::trace!(ids = op.ids.len(), "send queued until connection settles");
                    shared.queued.push(op);
                    None
                }
                ConnectionState::Disconnected => Some((op.completion, RpcError::ConnectionNotOpen)),
                ConnectionState::Connected => self.inner.write_and_register(&mut shared, op).err(),
            }
        };

        if let Some((completion, err)) = failure {
            completion.complete(Err(err));
        }
    }

    /// Send and await the response.
    pub async fn request<P>(&self, payload: &P) -> Result<Value>
    where
        P: Serialize + ?Sized,
    {
        let (tx, rx) = oneshot::channel();
        self.send(payload, move |result| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or_else(|_| Err(RpcError::Abandoned))
    }

    /// Register a listener for `event`. Only [`DATA_EVENT`] is wired; other
    /// event names are accepted and ignored.
    pub fn on(&self, event: &str, listener: NotificationListener) {
        if event != DATA_EVENT {
            tracing::trace!(event, "listener for unsupported event ignored");
            return;
        }
        self.inner.lock().listeners.push(listener);
    }

    /// Remove the first registration of `listener` for `event`.
    pub fn remove_listener(&self, event: &str, listener: &NotificationListener) {
        if event != DATA_EVENT {
            return;
        }
        let mut shared = self.inner.lock();
        if let Some(index) = shared
            .listeners
            .iter()
            .position(|registered| Arc::ptr_eq(registered, listener))
        {
            shared.listeners.remove(index);
        }
    }

    /// Remove every listener registered for `event`.
    pub fn remove_all_listeners(&self, event: &str) {
        if event == DATA_EVENT {
            self.inner.lock().listeners.clear();
        }
    }

    /// Fail every outstanding and queued request with
    /// [`RpcError::ConnectionReset`] and drop all listeners.
    ///
    /// The connection state is left as is.
    pub fn reset(&self) {
        let (pending, queued) = {
            let mut shared = self.inner.lock();
            shared.listeners.clear();
            (
                std::mem::take(&mut shared.pending),
                std::mem::take(&mut shared.queued),
            )
        };

        let mut failed = 0usize;
        for (_, entry) in pending {
            entry.cancel_timer();
            if entry.completion.complete(Err(RpcError::ConnectionReset)) {
                failed += 1;
            }
        }
        for op in queued {
            if op.completion.complete(Err(RpcError::ConnectionReset)) {
                failed += 1;
            }
        }
        tracing::debug!(failed, "correlator reset");
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Wait until the connection leaves `Connecting`.
    ///
    /// Resolves to an error describing the failure when the negotiation
    /// ended disconnected.
    pub async fn ready(&self) -> Result<()> {
        let mut state_rx = self.inner.state_tx.subscribe();
        let state = *state_rx
            .wait_for(|state| *state != ConnectionState::Connecting)
            .await
            .map_err(|_| RpcError::ConnectionNotOpen)?;

        match state {
            ConnectionState::Connected => Ok(()),
            _ => Err(match self.inner.lock().disconnect_reason {
                Some(DisconnectReason::HandshakeTimeout(timeout)) => {
                    RpcError::HandshakeTimeout(timeout)
                }
                _ => RpcError::ConnectionNotOpen,
            }),
        }
    }

    /// Number of identifiers awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Returns true if `id` awaits a response.
    pub fn is_pending(&self, id: &RequestId) -> bool {
        self.inner.lock().pending.contains_key(id)
    }

    /// Number of sends waiting for the connection to settle.
    pub fn queued_count(&self) -> usize {
        self.inner.lock().queued.len()
    }

    /// Number of registered notification listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    /// Active configuration.
    pub fn config(&self) -> &CorrelatorConfig {
        &self.inner.config
    }
}

impl fmt::Debug for Correlator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.inner.lock();
        f.debug_struct("Correlator")
            .field("state", &shared.state)
            .field("pending", &shared.pending.len())
            .field("queued", &shared.queued.len())
            .field("listeners", &shared.listeners.len())
            .finish()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Leave `Connecting` and flush the queue exactly once.
    fn finish_negotiation(self: &Arc<Self>, outcome: Negotiation) {
        let mut failures = Vec::new();
        let (state, reader) = {
            let mut shared = self.lock();
            if shared.state != ConnectionState::Connecting {
                return;
            }

            let reader = match outcome {
                Negotiation::Connected(port) => {
                    let (writer, reader) = port.into_split();
                    shared.writer = Some(writer);
                    shared.state = ConnectionState::Connected;
                    Some(reader)
                }
                Negotiation::Disconnected(reason) => {
                    shared.state = ConnectionState::Disconnected;
                    shared.disconnect_reason = Some(reason);
                    None
                }
            };

            let queued = std::mem::take(&mut shared.queued);
            for op in queued {
                let flushed = match shared.state {
                    ConnectionState::Connected => self.write_and_register(&mut shared, op),
                    _ => Err((op.completion, RpcError::ConnectionNotOpen)),
                };
                if let Err(failure) = flushed {
                    failures.push(failure);
                }
            }
            (shared.state, reader)
        };

        tracing::debug!(state = state.as_str(), "connection settled");
        self.state_tx.send_replace(state);
        if let Some(reader) = reader {
            self.spawn_delivery(reader);
        }
        for (completion, err) in failures {
            completion.complete(Err(err));
        }
    }

    /// Write a request and register its identifiers. Must be called with the
    /// state lock held and the connection established.
    fn write_and_register(
        self: &Arc<Self>,
        shared: &mut Shared,
        op: QueuedSend,
    ) -> std::result::Result<(), Failure> {
        let Some(writer) = shared.writer.as_ref() else {
            return Err((op.completion, RpcError::ConnectionNotOpen));
        };
        if let Err(err) = writer.write(op.payload) {
            tracing::warn!(error = %err, "failed to write request to port");
            return Err((op.completion, err.into()));
        }

        for id in op.ids {
            let timer = self
                .config
                .request_timeout
                .map(|timeout| self.schedule_timeout(id.clone(), Arc::clone(&op.completion), timeout));
            let entry = PendingRequest {
                completion: Arc::clone(&op.completion),
                timer,
            };
            if let Some(previous) = shared.pending.insert(id.clone(), entry) {
                previous.cancel_timer();
                tracing::debug!(id = %id, "request id reused; earlier request superseded");
            }
        }
        Ok(())
    }

    fn schedule_timeout(
        self: &Arc<Self>,
        id: RequestId,
        completion: Arc<Completion>,
        timeout: Duration,
    ) -> CancellationToken {
        let token = self.shutdown.child_token();
        let cancelled = token.clone();
        let weak = Arc::downgrade(self);

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if let Some(inner) = weak.upgrade() {
                        inner.expire(&id, &completion, timeout);
                    }
                }
            }
        });

        token
    }

    fn expire(&self, id: &RequestId, completion: &Arc<Completion>, timeout: Duration) {
        let removed = {
            let mut shared = self.lock();
            let owned = shared
                .pending
                .get(id)
                .is_some_and(|entry| Arc::ptr_eq(&entry.completion, completion));
            owned && shared.pending.remove(id).is_some()
        };

        if removed && completion.complete(Err(RpcError::RequestTimeout(timeout))) {
            tracing::debug!(
                id = %id,
                method = completion.method.as_deref().unwrap_or("<none>"),
                ?timeout,
                "request timed out"
            );
        }
    }

    fn spawn_delivery(self: &Arc<Self>, mut reader: PortReader) {
        let weak: Weak<Inner> = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    message = reader.recv() => message,
                };
                let Some(message) = message else {
                    tracing::debug!("message port closed by peer");
                    break;
                };
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.dispatch(message);
            }
        });
    }

    /// Route one inbound message.
    fn dispatch(&self, message: Value) {
        let mut settled = None;
        let listeners = {
            let mut shared = self.lock();
            let id = match &message {
                Value::Array(batch) => batch
                    .iter()
                    .filter_map(message::message_id)
                    .find(|id| shared.pending.contains_key(id)),
                _ => message::message_id(&message),
            };

            match id {
                None if message::has_marker(&message, &self.config.notification_marker) => {
                    Some(shared.listeners.clone())
                }
                Some(id) => {
                    match shared.pending.remove(&id) {
                        Some(entry) => {
                            entry.cancel_timer();
                            if let Value::Array(batch) = &message {
                                settle_siblings(&mut shared, batch, &entry.completion);
                            }
                            settled = Some((id, entry.completion));
                        }
                        None => tracing::trace!(id = %id, "response for unknown request dropped"),
                    }
                    None
                }
                None => {
                    tracing::trace!("unroutable message dropped");
                    None
                }
            }
        };

        if let Some(listeners) = listeners {
            tracing::trace!(listeners = listeners.len(), "notification delivered");
            for listener in &listeners {
                listener(&message);
            }
        }

        if let Some((id, completion)) = settled {
            if !completion.complete(Ok(message)) {
                tracing::trace!(id = %id, "late response dropped");
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Remove the other entries of a batch response that belong to the same
/// `send` as the resolved one.
fn settle_siblings(shared: &mut Shared, batch: &[Value], completion: &Arc<Completion>) {
    for id in batch.iter().filter_map(message::message_id) {
        let same_send = shared
            .pending
            .get(&id)
            .is_some_and(|entry| Arc::ptr_eq(&entry.completion, completion));
        if same_send {
            if let Some(entry) = shared.pending.remove(&id) {
                entry.cancel_timer();
            }
        }
    }
}

fn first_method(payload: &Value) -> Option<String> {
    let first = match payload {
        Value::Array(batch) => batch.first()?,
        other => other,
    };
    message::method_name(first).map(str::to_string)
}
