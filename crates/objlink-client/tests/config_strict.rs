#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use objlink_client::config::{self, PropertyEquality};

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
broker:
  address: "memory://local"
objects:
  request_timout_ms: 500 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "BAD_CONFIG");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.broker.address, "memory://local");
    assert_eq!(cfg.broker.subscription_capacity, 256);
    assert_eq!(cfg.objects.request_timeout(), Duration::from_millis(1000));
    assert_eq!(cfg.objects.property_equality, PropertyEquality::Structural);
}

#[test]
fn ok_full_config() {
    let ok = r#"
version: 1
broker:
  address: "memory://bench"
  subscription_capacity: 8
objects:
  request_timeout_ms: 250
  property_equality: identity
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.broker.address, "memory://bench");
    assert_eq!(cfg.broker.subscription_capacity, 8);
    assert_eq!(cfg.objects.request_timeout_ms, 250);
    assert_eq!(cfg.objects.property_equality, PropertyEquality::Identity);
}

#[test]
fn rejects_unsupported_version() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.code().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn rejects_out_of_range_values() {
    let cases = [
        "version: 1\nobjects:\n  request_timeout_ms: 0\n",
        "version: 1\nbroker:\n  subscription_capacity: 0\n",
        "version: 1\nbroker:\n  address: \"nats://localhost:4222\"\n",
        "version: 1\nobjects:\n  property_equality: deep\n",
    ];
    for case in cases {
        let err = config::load_from_str(case).expect_err(case);
        assert_eq!(err.code().as_str(), "BAD_CONFIG", "case={case}");
    }
}

#[test]
fn missing_file_is_internal_error() {
    let err = config::load_from_file("does/not/exist.yaml").expect_err("must fail");
    assert_eq!(err.code().as_str(), "INTERNAL");
}
