use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use serde_json::Value;

use objlink_core::error::{ObjLinkError, Result};

use crate::config::ClientConfig;
use crate::object::{ListenerId, ObjectOptions, RemoteObject};
use crate::obs::{Anomaly, AnomalyHooks, LinkMetrics};
use crate::transport::{Connector, TransportPtr};

/// Transport handle plus the `object id -> RemoteObject` registry.
///
/// Created unconnected. After `close()` every object handed out so far is
/// inert: its publishes and requests fail with `TransportUnavailable`.
pub struct Connection {
    cfg: ClientConfig,
    connector: Arc<dyn Connector>,
    transport: RwLock<Option<TransportPtr>>,
    objects: DashMap<String, Arc<RemoteObject>>,
    hooks: Arc<AnomalyHooks>,
    metrics: Arc<LinkMetrics>,
}

impl Connection {
    pub fn new(address: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        Self::with_config(ClientConfig::with_address(address), connector)
    }

    pub fn with_config(cfg: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            cfg,
            connector,
            transport: RwLock::new(None),
            objects: DashMap::new(),
            hooks: Arc::new(AnomalyHooks::new()),
            metrics: Arc::new(LinkMetrics::default()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.cfg
    }

    pub fn metrics(&self) -> &LinkMetrics {
        &self.metrics
    }

    // --------------------
    // Lifecycle
    // --------------------

    /// Establish the transport handle. No-op when already connected.
    /// Fails with `BadConfig` before touching the broker when the config is invalid.
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.cfg.validate()?;
        let transport = self.connector.connect(&self.cfg.broker).await.map_err(|e| {
            tracing::error!(address = %self.cfg.broker.address, error = %e, "connect failed");
            e
        })?;
        *self.transport.write().unwrap_or_else(PoisonError::into_inner) = Some(transport);
        tracing::info!(address = %self.cfg.broker.address, "connected");
        Ok(())
    }

    /// Unsubscribe every registered object, forget them, and release the handle.
    pub async fn close(&self) {
        let objects: Vec<Arc<RemoteObject>> =
            self.objects.iter().map(|e| Arc::clone(e.value())).collect();
        for obj in objects {
            if let Err(e) = obj.unsubscribe().await {
                tracing::warn!(object = %obj.id(), error = %e, "unsubscribe on close failed");
            }
        }
        self.objects.clear();

        let transport = self
            .transport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(transport) = transport {
            transport.close().await;
            tracing::info!(address = %transport.address(), "connection closed");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_closed())
    }

    pub fn connected_address(&self) -> Option<String> {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|t| t.address().to_string())
    }

    fn transport(&self) -> Result<TransportPtr> {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ObjLinkError::NotConnected)
    }

    // --------------------
    // Registry
    // --------------------

    fn build_object(&self, transport: TransportPtr, id: &str) -> RemoteObject {
        let opts = ObjectOptions {
            metrics: Arc::clone(&self.metrics),
            shared_hooks: Some(Arc::clone(&self.hooks)),
            ..ObjectOptions::from_section(&self.cfg.objects)
        };
        RemoteObject::with_options(transport, id, opts)
    }

    /// Fresh object outside the registry, bound to the live handle.
    pub fn new_object(&self, id: &str) -> Result<Arc<RemoteObject>> {
        let transport = self.transport()?;
        Ok(Arc::new(self.build_object(transport, id)))
    }

    /// The single registered object for `id`, created on first access.
    pub fn ensure_object(&self, id: &str) -> Result<Arc<RemoteObject>> {
        if let Some(obj) = self.objects.get(id) {
            return Ok(Arc::clone(obj.value()));
        }
        let transport = self.transport()?;
        let obj = self
            .objects
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(self.build_object(transport, id)));
        Ok(Arc::clone(obj.value()))
    }

    /// Registered object for `id`, without creating one.
    pub fn object(&self, id: &str) -> Option<Arc<RemoteObject>> {
        self.objects.get(id).map(|o| Arc::clone(o.value()))
    }

    /// Registered object ids, sorted.
    pub fn object_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.objects.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Remove `id` from the registry, unsubscribing it first.
    pub async fn unregister_object(&self, id: &str) -> Result<bool> {
        let Some((_, obj)) = self.objects.remove(id) else {
            return Ok(false);
        };
        obj.unsubscribe().await?;
        Ok(true)
    }

    // --------------------
    // Anomaly hooks (attached to every object this connection creates)
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

    // --------------------
    // Delegations
    // --------------------

    pub async fn subscribe(&self, id: &str) -> Result<()> {
        self.ensure_object(id)?.subscribe().await
    }

    pub async fn unsubscribe(&self, id: &str) -> Result<()> {
        self.ensure_object(id)?.unsubscribe().await
    }

    pub async fn request_method(&self, id: &str, method: &str, args: Value) -> Result<Value> {
        self.ensure_object(id)?.request_method(method, args).await
    }

    pub fn register_method<F, Fut>(&self, id: &str, method: &str, f: F) -> Result<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.ensure_object(id)?.register_method(method, f);
        Ok(())
    }

    pub fn methods(&self, id: &str) -> Result<Vec<String>> {
        Ok(self.ensure_object(id)?.methods())
    }

    pub async fn publish_signal(&self, id: &str, signal: &str, args: Value) -> Result<()> {
        self.ensure_object(id)?.publish_signal(signal, args).await
    }

    pub fn on_signal<F>(&self, id: &str, signal: &str, f: F) -> Result<ListenerId>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Ok(self.ensure_object(id)?.on_signal(signal, f))
    }

    pub fn off_signal(&self, id: &str, signal: &str, listener: ListenerId) -> Result<bool> {
        Ok(self.ensure_object(id)?.off_signal(signal, listener))
    }

    pub fn emit_signal(&self, id: &str, signal: &str, args: &Value) -> Result<usize> {
        Ok(self.ensure_object(id)?.emit_signal(signal, args))
    }

    pub async fn publish_property(&self, id: &str, property: &str, value: Value) -> Result<()> {
        self.ensure_object(id)?.publish_property(property, value).await
    }

    pub async fn push_property(&self, id: &str, property: &str, value: Value) -> Result<()> {
        self.ensure_object(id)?.push_property(property, value).await
    }

    pub fn on_property<F>(&self, id: &str, property: &str, f: F) -> Result<ListenerId>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Ok(self.ensure_object(id)?.on_property(property, f))
    }

    pub fn off_property(&self, id: &str, property: &str, listener: ListenerId) -> Result<bool> {
        Ok(self.ensure_object(id)?.off_property(property, listener))
    }

    pub fn emit_property(&self, id: &str, property: &str, value: &Value) -> Result<usize> {
        Ok(self.ensure_object(id)?.emit_property(property, value))
    }

    pub fn set_property(&self, id: &str, property: &str, value: Value) -> Result<bool> {
        Ok(self.ensure_object(id)?.set_property(property, value))
    }

    pub fn get_property(&self, id: &str, property: &str) -> Result<Option<Value>> {
        Ok(self.ensure_object(id)?.get_property(property))
    }

    pub fn get_properties(&self, id: &str) -> Result<HashMap<String, Value>> {
        Ok(self.ensure_object(id)?.get_properties())
    }
}
