#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use objlink_client::config::ClientConfig;
use objlink_client::{Connection, MemoryBroker};
use objlink_core::error::ErrorCode;

async fn connected(broker: &MemoryBroker) -> Connection {
    let conn = Connection::new("memory://test", Arc::new(broker.clone()));
    conn.connect().await.unwrap();
    conn
}

#[tokio::test]
async fn ensure_object_is_memoized() {
    let broker = MemoryBroker::new();
    let conn = connected(&broker).await;

    let a = conn.ensure_object("demo.calc").unwrap();
    let b = conn.ensure_object("demo.calc").unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let looked_up = conn.object("demo.calc").expect("registered");
    assert!(Arc::ptr_eq(&a, &looked_up));
}

#[tokio::test]
async fn new_object_is_always_fresh_and_unregistered() {
    let broker = MemoryBroker::new();
    let conn = connected(&broker).await;

    let a = conn.new_object("demo.calc").unwrap();
    let b = conn.new_object("demo.calc").unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert!(conn.object("demo.calc").is_none());
    assert!(conn.object_ids().is_empty());
}

#[tokio::test]
async fn object_does_not_create() {
    let broker = MemoryBroker::new();
    let conn = connected(&broker).await;
    assert!(conn.object("demo.calc").is_none());

    conn.ensure_object("b").unwrap();
    conn.ensure_object("a").unwrap();
    assert_eq!(conn.object_ids(), vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn delegations_share_one_instance() {
    let broker = MemoryBroker::new();
    let conn = connected(&broker).await;

    conn.register_method("demo.calc", "add", |args| async move {
        Ok(json!(args[0].as_i64().unwrap_or(0) + args[1].as_i64().unwrap_or(0)))
    })
    .unwrap();
    conn.subscribe("demo.calc").await.unwrap();
    assert_eq!(conn.methods("demo.calc").unwrap(), vec!["add".to_string()]);

    assert!(conn.set_property("demo.calc", "total", json!(1)).unwrap());
    assert!(!conn.set_property("demo.calc", "total", json!(1)).unwrap());
    assert_eq!(conn.get_property("demo.calc", "total").unwrap(), Some(json!(1)));
    assert_eq!(conn.get_properties("demo.calc").unwrap().len(), 1);

    let result = conn
        .request_method("demo.calc", "add", json!([1, 2]))
        .await
        .unwrap();
    assert_eq!(result, json!(3));

    let id = conn.on_signal("demo.calc", "cleared", |_| {}).unwrap();
    assert_eq!(conn.emit_signal("demo.calc", "cleared", &json!(null)).unwrap(), 1);
    assert!(conn.off_signal("demo.calc", "cleared", id).unwrap());

    let id = conn.on_property("demo.calc", "total", |_| {}).unwrap();
    assert_eq!(conn.emit_property("demo.calc", "total", &json!(2)).unwrap(), 1);
    assert!(conn.off_property("demo.calc", "total", id).unwrap());

    assert_eq!(conn.object_ids(), vec!["demo.calc".to_string()]);
    conn.unsubscribe("demo.calc").await.unwrap();
}

#[tokio::test]
async fn push_property_reaches_other_connections() {
    let broker = MemoryBroker::new();
    let server = connected(&broker).await;
    let client = connected(&broker).await;
    client.subscribe("demo.calc").await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    client
        .on_property("demo.calc", "total", move |v| {
            let _ = tx.send(v.clone());
        })
        .unwrap();

    server.push_property("demo.calc", "total", json!(7)).await.unwrap();
    assert_eq!(server.get_property("demo.calc", "total").unwrap(), Some(json!(7)));

    let seen = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen, json!(7));
    assert_eq!(client.get_property("demo.calc", "total").unwrap(), Some(json!(7)));
}

#[tokio::test]
async fn operations_before_connect_fail() {
    let broker = MemoryBroker::new();
    let conn = Connection::new("memory://test", Arc::new(broker));
    assert!(!conn.is_connected());
    assert!(conn.connected_address().is_none());

    let err = conn.ensure_object("demo.calc").err().expect("not connected");
    assert_eq!(err.code(), ErrorCode::NotConnected);
    let err = conn.new_object("demo.calc").err().expect("not connected");
    assert_eq!(err.code(), ErrorCode::NotConnected);
    let err = conn
        .publish_signal("demo.calc", "cleared", json!(null))
        .await
        .expect_err("not connected");
    assert_eq!(err.code(), ErrorCode::NotConnected);
}

#[tokio::test]
async fn connect_is_idempotent_and_reports_address() {
    let broker = MemoryBroker::new();
    let conn = connected(&broker).await;
    conn.connect().await.unwrap();
    assert!(conn.is_connected());
    assert_eq!(conn.connected_address().as_deref(), Some("memory://test"));
}

#[tokio::test]
async fn connect_to_foreign_scheme_fails() {
    let broker = MemoryBroker::new();
    let conn = Connection::new("nats://localhost:4222", Arc::new(broker));
    let err = conn.connect().await.expect_err("unsupported scheme");
    assert_eq!(err.code(), ErrorCode::TransportUnavailable);
    assert!(!conn.is_connected());
}

#[tokio::test]
async fn close_makes_objects_inert() {
    let broker = MemoryBroker::new();
    let conn = connected(&broker).await;
    let registered = conn.ensure_object("demo.calc").unwrap();
    registered.subscribe().await.unwrap();
    let loose = conn.new_object("demo.loose").unwrap();
    loose.subscribe().await.unwrap();

    conn.close().await;
    assert!(!conn.is_connected());
    assert!(conn.object_ids().is_empty());
    assert!(!registered.is_subscribed().await);
    assert_eq!(broker.subscriber_count("demo.calc"), 0);
    assert_eq!(broker.subscriber_count("demo.loose"), 0);

    let err = registered
        .publish_signal("cleared", json!(null))
        .await
        .expect_err("closed");
    assert_eq!(err.code(), ErrorCode::TransportUnavailable);
    let err = loose
        .request_method("add", json!([1, 2]))
        .await
        .expect_err("closed");
    assert_eq!(err.code(), ErrorCode::TransportUnavailable);

    // Local state still works on an inert object.
    assert!(registered.set_property("total", json!(1)));

    // Objects outside the registry are inert too.
    assert!(!loose.is_subscribed().await);
    let err = loose.subscribe().await.expect_err("closed");
    assert_eq!(err.code(), ErrorCode::TransportUnavailable);
    assert_eq!(conn.metrics().subscriptions_active.get(), 0);
}

#[tokio::test]
async fn resubscribe_after_close_fails() {
    let broker = MemoryBroker::new();
    let conn = connected(&broker).await;
    let loose = conn.new_object("demo.loose").unwrap();
    loose.subscribe().await.unwrap();
    assert_eq!(conn.metrics().subscriptions_active.get(), 1);

    conn.close().await;
    let err = loose.subscribe().await.expect_err("closed");
    assert_eq!(err.code(), ErrorCode::TransportUnavailable);
    assert!(!loose.is_subscribed().await);
    assert_eq!(broker.subscriber_count("demo.loose"), 0);
    assert_eq!(conn.metrics().subscriptions_active.get(), 0);
}

#[tokio::test]
async fn connect_rejects_invalid_config() {
    let broker = MemoryBroker::new();
    let mut cfg = ClientConfig::with_address("memory://test");
    cfg.objects.request_timeout_ms = 0;
    let conn = Connection::with_config(cfg, Arc::new(broker));

    let err = conn.connect().await.expect_err("invalid config");
    assert_eq!(err.code(), ErrorCode::BadConfig);
    assert!(!conn.is_connected());
}

#[tokio::test]
async fn reconnect_after_close_builds_fresh_objects() {
    let broker = MemoryBroker::new();
    let conn = connected(&broker).await;
    let before = conn.ensure_object("demo.calc").unwrap();
    conn.close().await;

    conn.connect().await.unwrap();
    let after = conn.ensure_object("demo.calc").unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    after.publish_signal("cleared", json!(null)).await.unwrap();
}

#[tokio::test]
async fn unregister_object_unsubscribes() {
    let broker = MemoryBroker::new();
    let conn = connected(&broker).await;
    conn.subscribe("demo.calc").await.unwrap();
    assert_eq!(broker.subscriber_count("demo.calc"), 1);

    assert!(conn.unregister_object("demo.calc").await.unwrap());
    assert!(!conn.unregister_object("demo.calc").await.unwrap());
    assert_eq!(broker.subscriber_count("demo.calc"), 0);
    assert!(conn.object("demo.calc").is_none());
}

#[tokio::test]
async fn metrics_render_after_traffic() {
    let broker = MemoryBroker::new();
    let conn = connected(&broker).await;
    conn.subscribe("demo.calc").await.unwrap();
    conn.register_method("demo.calc", "ping", |_| async { Ok(json!("pong")) })
        .unwrap();
    conn.request_method("demo.calc", "ping", json!(null)).await.unwrap();

    let text = conn.metrics().render();
    assert!(text.contains("objlink_messages_dispatched_total{kind=\"inv\"} 1"));
    assert!(text.contains("objlink_requests_total{outcome=\"ok\"} 1"));
    assert!(text.contains("objlink_subscriptions_active 1"));
}
