//! RPC endpoint over a [`Transport`].
//!
//! Named services, callbacks correlated by call id, per-peer auth tokens and
//! a default handler for unknown services.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{CallId, PeerId};
use crate::protocol::rpc::{ACK_SERVICE, CALLBACK_SERVICE, DEFAULT_SERVICE, RpcPacket};
use crate::transport::{Role, Transport};

use super::context::RpcContext;

// ============================================================================
// Types
// ============================================================================

/// Service implementation. Returning `Some` answers the caller immediately.
pub type ServiceHandler = Arc<dyn Fn(&RpcContext, Vec<Value>) -> Option<Value> + Send + Sync>;

/// One-shot handler for a call's result.
pub type CallbackHandler = Box<dyn FnOnce(Value) + Send>;

// ============================================================================
// EndpointInner
// ============================================================================

pub(crate) struct EndpointInner {
    transport: Transport,
    services: RwLock<FxHashMap<String, ServiceHandler>>,
    default_service: RwLock<Option<ServiceHandler>>,
    callbacks: Mutex<FxHashMap<CallId, CallbackHandler>>,
    next_call: AtomicU64,
    auth_tokens: RwLock<FxHashMap<PeerId, String>>,
}

// ============================================================================
// RpcEndpoint
// ============================================================================

/// Service registry and caller on top of one transport.
///
/// Installs itself as the transport's message handler. Cheap to clone.
///
/// # Example
///
/// ```ignore
/// let rpc = RpcEndpoint::new(transport);
/// rpc.register("ping", |_ctx, _args| Some(serde_json::json!("pong")))?;
/// rpc.call(PeerId::parent(), "resize", vec![json!(300)], None)?;
/// ```
#[derive(Clone)]
pub struct RpcEndpoint {
    inner: Arc<EndpointInner>,
}

impl RpcEndpoint {
    /// Wraps `transport`, taking over its message callback.
    #[must_use]
    pub fn new(transport: Transport) -> Self {
        let inner = Arc::new(EndpointInner {
            transport: transport.clone(),
            services: RwLock::new(FxHashMap::default()),
            default_service: RwLock::new(None),
            callbacks: Mutex::new(FxHashMap::default()),
            next_call: AtomicU64::new(0),
            auth_tokens: RwLock::new(FxHashMap::default()),
        });

        let weak = Arc::downgrade(&inner);
        transport.on_message(move |peer_id, message| {
            if let Some(inner) = weak.upgrade() {
                EndpointInner::dispatch(&inner, peer_id, message);
            }
        });

        Self { inner }
    }

    /// Returns the underlying transport.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.inner.transport
    }
}

// ============================================================================
// RpcEndpoint - Registration
// ============================================================================

impl RpcEndpoint {
    /// Registers `handler` for `service`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReservedService`] for names the RPC layer uses.
    pub fn register<F>(&self, service: impl Into<String>, handler: F) -> Result<()>
    where
        F: Fn(&RpcContext, Vec<Value>) -> Option<Value> + Send + Sync + 'static,
    {
        let service = service.into();
        if is_reserved(&service) {
            return Err(Error::reserved_service(service));
        }

        debug!(service = %service, "RPC service registered");
        self.inner.services.write().insert(service, Arc::new(handler));
        Ok(())
    }

    /// Removes the handler for `service`. Returns `true` if one existed.
    pub fn unregister(&self, service: &str) -> bool {
        self.inner.services.write().remove(service).is_some()
    }

    /// Registers the handler for services with no handler of their own.
    pub fn register_default<F>(&self, handler: F)
    where
        F: Fn(&RpcContext, Vec<Value>) -> Option<Value> + Send + Sync + 'static,
    {
        *self.inner.default_service.write() = Some(Arc::new(handler));
    }

    /// Removes the default handler.
    pub fn unregister_default(&self) {
        *self.inner.default_service.write() = None;
    }

    /// Sets the token exchanged with `peer_id`.
    ///
    /// Outbound packets to the peer carry it; inbound packets from the peer
    /// must carry it or are dropped.
    pub fn set_auth_token(&self, peer_id: impl Into<PeerId>, token: impl Into<String>) {
        self.inner
            .auth_tokens
            .write()
            .insert(peer_id.into(), token.into());
    }
}

// ============================================================================
// RpcEndpoint - Calls
// ============================================================================

impl RpcEndpoint {
    /// Calls `service` on `target` with `args`.
    ///
    /// `callback` runs once with the result, if the remote service answers.
    ///
    /// # Errors
    ///
    /// - [`Error::ReservedService`] for reserved service names
    /// - any [`Transport::send`] error
    pub fn call(
        &self,
        target: impl Into<PeerId>,
        service: impl Into<String>,
        args: Vec<Value>,
        callback: Option<CallbackHandler>,
    ) -> Result<CallId> {
        let target = target.into();
        let service = service.into();
        if is_reserved(&service) {
            return Err(Error::reserved_service(service));
        }

        let call_id = match callback {
            Some(callback) => {
                let id = CallId::new(self.inner.next_call.fetch_add(1, Ordering::Relaxed) + 1);
                self.inner.callbacks.lock().insert(id, callback);
                id
            }
            None => CallId::NONE,
        };

        let result = self.inner.send_packet(&target, &service, call_id, args);
        if result.is_err() && call_id.is_some() {
            self.inner.callbacks.lock().remove(&call_id);
        }
        result?;

        trace!(peer = %target, service = %service, call = call_id.as_u64(), "RPC call sent");
        Ok(call_id)
    }

    /// Returns the number of calls still waiting for a result.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.inner.callbacks.lock().len()
    }
}

impl fmt::Debug for RpcEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcEndpoint")
            .field("transport", &self.inner.transport)
            .field("services", &self.inner.services.read().len())
            .field("pending_calls", &self.pending_calls())
            .finish()
    }
}

// ============================================================================
// EndpointInner - Send
// ============================================================================

impl EndpointInner {
    fn send_packet(
        &self,
        target: &PeerId,
        service: &str,
        callback: CallId,
        args: Vec<Value>,
    ) -> Result<()> {
        let role = Role::for_peer(target, self.transport.options().self_id.as_ref())?;
        let token = self.auth_tokens.read().get(target).cloned();

        let packet = RpcPacket::new(service, role.sender_name(), callback, args).with_token(token);
        self.transport.send(target.clone(), serde_json::to_value(&packet)?)
    }

    /// Answers call `call_id` from `peer_id` with `result`.
    pub(crate) fn send_callback(&self, peer_id: &PeerId, call_id: CallId, result: Value) -> Result<()> {
        let args = vec![Value::from(call_id.as_u64()), result];
        self.send_packet(peer_id, CALLBACK_SERVICE, CallId::NONE, args)
    }
}

// ============================================================================
// EndpointInner - Dispatch
// ============================================================================

impl EndpointInner {
    fn dispatch(inner: &Arc<Self>, peer_id: &PeerId, message: Value) {
        let packet: RpcPacket = match serde_json::from_value(message) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(peer = %peer_id, error = %e, "Dropping message that is not an RPC packet");
                return;
            }
        };

        if let Err(e) = inner.verify_token(peer_id, &packet) {
            warn!(peer = %peer_id, service = %packet.service, error = %e, "Dropping RPC packet");
            return;
        }

        if packet.is_callback() {
            inner.complete_call(peer_id, packet.args);
            return;
        }

        if packet.service == ACK_SERVICE {
            trace!(peer = %peer_id, "RPC readiness acknowledgement");
            return;
        }

        let handler = inner
            .services
            .read()
            .get(&packet.service)
            .cloned()
            .or_else(|| inner.default_service.read().clone());

        let Some(handler) = handler else {
            warn!(peer = %peer_id, service = %packet.service, "No handler for RPC service");
            return;
        };

        let context = RpcContext::new(
            peer_id.clone(),
            packet.from,
            packet.service,
            packet.callback,
            Arc::downgrade(inner),
        );

        if let Some(result) = handler(&context, packet.args)
            && let Err(e) = context.reply(result)
        {
            warn!(peer = %peer_id, service = %context.service(), error = %e, "Failed to send RPC reply");
        }
    }

    fn verify_token(&self, peer_id: &PeerId, packet: &RpcPacket) -> Result<()> {
        let tokens = self.auth_tokens.read();
        match tokens.get(peer_id) {
            Some(expected) if packet.token.as_deref() != Some(expected.as_str()) => {
                Err(Error::invalid_auth_token(peer_id.clone()))
            }
            _ => Ok(()),
        }
    }

    fn complete_call(&self, peer_id: &PeerId, args: Vec<Value>) {
        let mut args = args.into_iter();
        let Some(call_id) = args.next().and_then(|id| id.as_u64()).map(CallId::new) else {
            warn!(peer = %peer_id, "Callback packet without call id");
            return;
        };
        let result = args.next().unwrap_or(Value::Null);

        let callback = self.callbacks.lock().remove(&call_id);
        match callback {
            Some(callback) => callback(result),
            None => debug!(peer = %peer_id, call = call_id.as_u64(), "Callback for unknown call"),
        }
    }
}

/// Returns `true` for service names the RPC layer reserves.
#[inline]
#[must_use]
fn is_reserved(service: &str) -> bool {
    matches!(service, DEFAULT_SERVICE | CALLBACK_SERVICE | ACK_SERVICE)
}

// ============================================================================
// Tests
// ============================================================================
