//! Inbound routing for a subscribed object.
//!
//! Property and signal envelopes are applied in arrival order on the
//! subscription's dispatch task. Invokes run on their own task so a slow
//! handler never stalls the stream; the reply is sent once the handler
//! completes. Nothing in here propagates errors: every failure becomes an
//! `Anomaly`.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures_util::FutureExt;
use tokio::sync::mpsc;

use objlink_core::error::ObjLinkError;
use objlink_core::protocol::envelope::{Envelope, EventKind};

use crate::obs::Anomaly;
use crate::transport::{Delivery, InboundMessage};

use super::remote::RemoteObject;

/// Drain one subscription until it is cancelled or the object is dropped.
pub(super) async fn run_dispatch(obj: Weak<RemoteObject>, mut deliveries: mpsc::Receiver<Delivery>) {
    while let Some(delivery) = deliveries.recv().await {
        let Some(target) = obj.upgrade() else { break };
        match delivery {
            Ok(msg) => target.handle_message(msg),
            Err(error) => target.report(Anomaly::DeliveryFailed {
                object: target.id().to_string(),
                error,
            }),
        }
    }
}

impl RemoteObject {
    /// Route one inbound message. Invokes are answered asynchronously, so
    /// this must be called from within a Tokio runtime.
    pub fn handle_message(self: &Arc<Self>, msg: InboundMessage) {
        let env = match Envelope::decode(&msg.payload) {
            Ok(env) => env,
            Err(error) => {
                self.report(Anomaly::DecodeFailed {
                    object: self.id().to_string(),
                    error,
                });
                return;
            }
        };

        self.metrics()
            .messages_dispatched
            .inc(&[("kind", env.kind.as_str())]);
        tracing::trace!(object = %self.id(), kind = env.kind.as_str(), member = %env.member, "dispatch");

        match env.kind {
            EventKind::Property => {
                self.set_property(&env.member, env.data);
            }
            EventKind::Signal => {
                self.emit_signal(&env.member, &env.data);
            }
            EventKind::Invoke => {
                let obj = Arc::clone(self);
                tokio::spawn(async move { obj.handle_invoke(env, msg).await });
            }
        }
    }

    async fn handle_invoke(&self, env: Envelope, msg: InboundMessage) {
        let Envelope { member, data, .. } = env;

        if !msg.has_reply() {
            self.report(Anomaly::ReplyFailed {
                object: self.id().to_string(),
                member,
                error: ObjLinkError::NoReplyChannel,
            });
            return;
        }

        let Some(handler) = self.method(&member) else {
            self.report(Anomaly::UnknownMethod {
                object: self.id().to_string(),
                member,
            });
            return;
        };

        // The handler call itself happens inside the guarded future so a
        // panic while building it is caught too.
        let outcome = AssertUnwindSafe(async move { handler(data).await })
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(error)) => {
                self.report(Anomaly::HandlerFailed {
                    object: self.id().to_string(),
                    member,
                    error,
                });
                return;
            }
            Err(panic) => {
                self.report(Anomaly::HandlerFailed {
                    object: self.id().to_string(),
                    member,
                    error: ObjLinkError::Handler(panic_message(panic.as_ref())),
                });
                return;
            }
        };

        if let Err(error) = self.respond_invoke(&member, result, &msg).await {
            self.report(Anomaly::ReplyFailed {
                object: self.id().to_string(),
                member,
                error,
            });
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".into()
    }
}
