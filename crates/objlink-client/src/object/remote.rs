use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tokio::task::JoinHandle;

use objlink_core::error::{ObjLinkError, Result};
use objlink_core::protocol::envelope::{Envelope, EventKind};

use crate::config::{ObjectsSection, PropertyEquality};
use crate::obs::{Anomaly, AnomalyHooks, LinkMetrics};
use crate::transport::{InboundMessage, SubscriptionId, TransportPtr};

use super::dispatch::run_dispatch;
use super::listeners::{ListenerId, ListenerSet};

/// Async method handler: receives the invoke `data`, returns the reply `data`.
pub type MethodHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Per-object settings, normally derived from the connection config.
#[derive(Clone)]
pub struct ObjectOptions {
    pub request_timeout: Duration,
    pub equality: PropertyEquality,
    pub metrics: Arc<LinkMetrics>,
    /// Connection-wide hooks, notified after the object's own hooks.
    pub shared_hooks: Option<Arc<AnomalyHooks>>,
}

impl Default for ObjectOptions {
    fn default() -> Self {
        Self::from_section(&ObjectsSection::default())
    }
}

impl ObjectOptions {
    pub fn from_section(section: &ObjectsSection) -> Self {
        Self {
            request_timeout: section.request_timeout(),
            equality: section.property_equality,
            metrics: Arc::new(LinkMetrics::default()),
            shared_hooks: None,
        }
    }
}

struct ActiveSubscription {
    id: SubscriptionId,
    task: JoinHandle<()>,
}

/// Local view of one distributed object, addressed by topic = `id`.
pub struct RemoteObject {
    id: String,
    transport: TransportPtr,
    methods: DashMap<String, MethodHandler>,
    state: Mutex<HashMap<String, Value>>,
    signals: ListenerSet<Value>,
    properties: ListenerSet<Value>,
    subscription: tokio::sync::Mutex<Option<ActiveSubscription>>,
    request_timeout_ms: AtomicU64,
    equality: PropertyEquality,
    hooks: AnomalyHooks,
    shared_hooks: Option<Arc<AnomalyHooks>>,
    metrics: Arc<LinkMetrics>,
}

impl RemoteObject {
    pub fn new(transport: TransportPtr, id: impl Into<String>) -> Self {
        Self::with_options(transport, id, ObjectOptions::default())
    }

    pub fn with_options(transport: TransportPtr, id: impl Into<String>, opts: ObjectOptions) -> Self {
        let id = id.into();
        tracing::debug!(object = %id, "new object");
        Self {
            id,
            transport,
            methods: DashMap::new(),
            state: Mutex::new(HashMap::new()),
            signals: ListenerSet::new(),
            properties: ListenerSet::new(),
            subscription: tokio::sync::Mutex::new(None),
            request_timeout_ms: AtomicU64::new(duration_ms(opts.request_timeout)),
            equality: opts.equality,
            hooks: AnomalyHooks::new(),
            shared_hooks: opts.shared_hooks,
            metrics: opts.metrics,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn equality(&self) -> PropertyEquality {
        self.equality
    }

    pub fn metrics(&self) -> &LinkMetrics {
        &self.metrics
    }

    // --------------------
    // Subscription
    // --------------------

    /// Start receiving traffic on topic = id. No-op when already subscribed.
    pub async fn subscribe(self: &Arc<Self>) -> Result<()> {
        let mut slot = self.subscription.lock().await;
        if slot.is_some() {
            if !self.transport.is_closed() {
                tracing::debug!(object = %self.id, "already subscribed");
                return Ok(());
            }
            // The handle was closed under us; the broker already dropped the queue.
            self.release(&mut slot);
        }

        let sub = self.transport.subscribe(&self.id).await?;
        let task = tokio::spawn(run_dispatch(Arc::downgrade(self), sub.deliveries));
        *slot = Some(ActiveSubscription { id: sub.id, task });
        self.metrics.subscriptions_active.inc();

        tracing::info!(object = %self.id, "subscribed");
        Ok(())
    }

    /// Stop receiving traffic. No-op when not subscribed.
    pub async fn unsubscribe(&self) -> Result<()> {
        let Some(active) = self.subscription.lock().await.take() else {
            return Ok(());
        };
        let res = self.transport.unsubscribe(active.id).await;
        active.task.abort();
        self.metrics.subscriptions_active.dec();

        tracing::info!(object = %self.id, "unsubscribed");
        res
    }

    /// False once the underlying handle is closed, whatever the local state.
    pub async fn is_subscribed(&self) -> bool {
        let mut slot = self.subscription.lock().await;
        if slot.is_some() && self.transport.is_closed() {
            self.release(&mut slot);
        }
        slot.is_some()
    }

    fn release(&self, slot: &mut Option<ActiveSubscription>) {
        if let Some(active) = slot.take() {
            active.task.abort();
            self.metrics.subscriptions_active.dec();
            tracing::debug!(object = %self.id, "subscription released after close");
        }
    }

    // --------------------
    // Methods
    // --------------------

    /// Register (or replace) the handler for `name`. Handlers only run for
    /// inbound invoke envelopes, never for local `request_method` calls.
    pub fn register_method<F, Fut>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let handler: MethodHandler = Arc::new(move |args| f(args).boxed());
        self.methods.insert(name.into(), handler);
    }

    pub fn unregister_method(&self, name: &str) -> bool {
        self.methods.remove(name).is_some()
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub(super) fn method(&self, name: &str) -> Option<MethodHandler> {
        self.methods.get(name).map(|h| Arc::clone(h.value()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.load(Ordering::Relaxed))
    }

    pub fn set_request_timeout(&self, timeout: Duration) {
        self.request_timeout_ms
            .store(duration_ms(timeout), Ordering::Relaxed);
    }

    /// Invoke `method` on whichever peer serves this object and return its result.
    /// Fails with `Timeout` when no reply arrives (unknown method, failing
    /// handler, or nobody subscribed all look the same).
    pub async fn request_method(&self, method: &str, args: Value) -> Result<Value> {
        self.request_method_with_timeout(method, args, self.request_timeout())
            .await
    }

    pub async fn request_method_with_timeout(
        &self,
        method: &str,
        args: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let payload = Envelope::invoke(self.id.as_str(), method, args).encode()?;
        tracing::debug!(object = %self.id, member = method, "request");

        let started = Instant::now();
        let outcome = self.transport.request(&self.id, payload, timeout).await;
        self.metrics.request_duration.observe(&[], started.elapsed());

        let raw = match outcome {
            Ok(raw) => raw,
            Err(ObjLinkError::Timeout { topic, .. }) => {
                self.metrics.requests.inc(&[("outcome", "timeout")]);
                tracing::warn!(object = %self.id, member = method, "request timed out");
                return Err(ObjLinkError::Timeout {
                    topic,
                    member: method.to_string(),
                });
            }
            Err(e) => {
                self.metrics.requests.inc(&[("outcome", "error")]);
                return Err(e);
            }
        };

        let reply = Envelope::decode(&raw).map_err(|e| {
            self.metrics.requests.inc(&[("outcome", "error")]);
            e
        })?;
        if reply.kind != EventKind::Invoke {
            self.metrics.requests.inc(&[("outcome", "error")]);
            return Err(ObjLinkError::Decode(format!(
                "unexpected reply type: {}",
                reply.kind.as_str()
            )));
        }

        self.metrics.requests.inc(&[("outcome", "ok")]);
        Ok(reply.data)
    }

    // --------------------
    // Signals
    // --------------------

    /// Fire-and-forget signal to every subscriber of this object.
    pub async fn publish_signal(&self, signal: &str, args: Value) -> Result<()> {
        self.publish_event(Envelope::signal(self.id.as_str(), signal, args))
            .await
    }

    pub fn on_signal<F>(&self, signal: &str, f: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.signals.on(signal, f)
    }

    pub fn off_signal(&self, signal: &str, id: ListenerId) -> bool {
        self.signals.off(signal, id)
    }

    /// Notify local signal listeners; returns how many ran.
    pub fn emit_signal(&self, signal: &str, args: &Value) -> usize {
        self.signals.emit(signal, args)
    }

    // --------------------
    // Properties
    // --------------------

    /// Publish a property value to every subscriber. Local state is untouched.
    pub async fn publish_property(&self, property: &str, value: Value) -> Result<()> {
        self.publish_event(Envelope::property(self.id.as_str(), property, value))
            .await
    }

    /// `set_property` followed by `publish_property`.
    pub async fn push_property(&self, property: &str, value: Value) -> Result<()> {
        self.set_property(property, value.clone());
        self.publish_property(property, value).await
    }

    pub fn on_property<F>(&self, property: &str, f: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.properties.on(property, f)
    }

    pub fn off_property(&self, property: &str, id: ListenerId) -> bool {
        self.properties.off(property, id)
    }

    /// Notify local property listeners regardless of the cached value.
    pub fn emit_property(&self, property: &str, value: &Value) -> usize {
        self.properties.emit(property, value)
    }

    /// Update the local cache; listeners fire only when the value changed
    /// under the configured equality. Never publishes. Returns whether it changed.
    pub fn set_property(&self, property: &str, value: Value) -> bool {
        {
            let mut state = self.state();
            if let Some(cached) = state.get(property) {
                if self.equality.same(cached, &value) {
                    return false;
                }
            }
            state.insert(property.to_string(), value.clone());
        }
        self.properties.emit(property, &value);
        true
    }

    pub fn get_property(&self, property: &str) -> Option<Value> {
        self.state().get(property).cloned()
    }

    /// Snapshot of all cached properties.
    pub fn get_properties(&self) -> HashMap<String, Value> {
        self.state().clone()
    }

    // --------------------
    // Anomaly hooks
    // --------------------

    pub fn on_anomaly<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&Anomaly) + Send + Sync + 'static,
    {
        self.hooks.add(f)
    }

    pub fn off_anomaly(&self, id: ListenerId) -> bool {
        self.hooks.remove(id)
    }

    /// Log, count, and fan out an absorbed failure.
    pub(super) fn report(&self, anomaly: Anomaly) {
        match &anomaly {
            Anomaly::UnknownMethod { member, .. } => {
                tracing::warn!(object = %self.id, member = %member, "unknown method; no reply sent");
            }
            Anomaly::DecodeFailed { error, .. } | Anomaly::DeliveryFailed { error, .. } => {
                tracing::warn!(object = %self.id, kind = anomaly.kind(), error = %error, "inbound message dropped");
            }
            Anomaly::HandlerFailed { member, error, .. } | Anomaly::ReplyFailed { member, error, .. } => {
                tracing::error!(object = %self.id, member = %member, kind = anomaly.kind(), error = %error, "invoke not answered");
            }
        }
        self.metrics.anomalies.inc(&[("kind", anomaly.kind())]);
        self.hooks.notify(&anomaly);
        if let Some(shared) = &self.shared_hooks {
            shared.notify(&anomaly);
        }
    }

    pub(super) async fn respond_invoke(&self, member: &str, result: Value, msg: &InboundMessage) -> Result<()> {
        let reply = Envelope::invoke(self.id.as_str(), member, result).encode()?;
        msg.respond(reply).await
    }

    async fn publish_event(&self, env: Envelope) -> Result<()> {
        let payload = env.encode()?;
        self.transport.publish(&self.id, payload).await
    }

    fn state(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RemoteObject {
    fn drop(&mut self) {
        if let Some(active) = self.subscription.get_mut().take() {
            active.task.abort();
            self.metrics.subscriptions_active.dec();
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
