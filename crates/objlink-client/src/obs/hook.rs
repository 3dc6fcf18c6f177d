use std::sync::{Arc, Mutex, PoisonError};

use objlink_core::error::ObjLinkError;

use crate::object::ListenerId;

/// Something the dispatcher absorbed instead of propagating.
#[derive(Debug, Clone)]
pub enum Anomaly {
    /// Inbound payload was not a valid envelope.
    DecodeFailed { object: String, error: ObjLinkError },
    /// The transport reported a delivery problem on the subscription.
    DeliveryFailed { object: String, error: ObjLinkError },
    /// Invoke for a method that is not registered; the caller will time out.
    UnknownMethod { object: String, member: String },
    /// Handler returned an error or panicked; no reply is sent.
    HandlerFailed { object: String, member: String, error: ObjLinkError },
    /// Reply could not be built or delivered.
    ReplyFailed { object: String, member: String, error: ObjLinkError },
}

impl Anomaly {
    /// Metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Anomaly::DecodeFailed { .. } => "decode_failed",
            Anomaly::DeliveryFailed { .. } => "delivery_failed",
            Anomaly::UnknownMethod { .. } => "unknown_method",
            Anomaly::HandlerFailed { .. } => "handler_failed",
            Anomaly::ReplyFailed { .. } => "reply_failed",
        }
    }

    pub fn object(&self) -> &str {
        match self {
            Anomaly::DecodeFailed { object, .. }
            | Anomaly::DeliveryFailed { object, .. }
            | Anomaly::UnknownMethod { object, .. }
            | Anomaly::HandlerFailed { object, .. }
            | Anomaly::ReplyFailed { object, .. } => object,
        }
    }
}

type Hook = Arc<dyn Fn(&Anomaly) + Send + Sync>;

/// Registered anomaly hooks.
#[derive(Default)]
pub struct AnomalyHooks {
    hooks: Mutex<Vec<(ListenerId, Hook)>>,
}

impl AnomalyHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&Anomaly) + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        self.lock().push((id, Arc::new(f)));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut hooks = self.lock();
        let before = hooks.len();
        hooks.retain(|(hid, _)| *hid != id);
        hooks.len() != before
    }

    pub fn notify(&self, anomaly: &Anomaly) {
        let hooks: Vec<Hook> = self.lock().iter().map(|(_, h)| Arc::clone(h)).collect();
        for h in hooks {
            h(anomaly);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Hook)>> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
