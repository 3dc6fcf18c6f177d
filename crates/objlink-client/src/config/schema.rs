use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use objlink_core::error::{ObjLinkError, Result};

/// Scheme accepted by the in-process broker.
pub const MEMORY_SCHEME: &str = "memory://";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub version: u32,

    #[serde(default)]
    pub broker: BrokerSection,

    #[serde(default)]
    pub objects: ObjectsSection,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: 1,
            broker: BrokerSection::default(),
            objects: ObjectsSection::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults with a custom broker address.
    pub fn with_address(address: impl Into<String>) -> Self {
        let mut cfg = Self::default();
        cfg.broker.address = address.into();
        cfg
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(ObjLinkError::UnsupportedVersion);
        }

        self.broker.validate()?;
        self.objects.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerSection {
    #[serde(default = "default_address")]
    pub address: String,

    /// Per-subscription queue depth before the broker starts dropping.
    #[serde(default = "default_subscription_capacity")]
    pub subscription_capacity: usize,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            address: default_address(),
            subscription_capacity: default_subscription_capacity(),
        }
    }
}

impl BrokerSection {
    pub fn validate(&self) -> Result<()> {
        if !self.address.starts_with(MEMORY_SCHEME) {
            return Err(ObjLinkError::BadConfig(format!(
                "broker.address must start with {MEMORY_SCHEME}"
            )));
        }
        if !(1..=65536).contains(&self.subscription_capacity) {
            return Err(ObjLinkError::BadConfig(
                "broker.subscription_capacity must be between 1 and 65536".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectsSection {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default)]
    pub property_equality: PropertyEquality,
}

impl Default for ObjectsSection {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            property_equality: PropertyEquality::default(),
        }
    }
}

impl ObjectsSection {
    pub fn validate(&self) -> Result<()> {
        if !(10..=60000).contains(&self.request_timeout_ms) {
            return Err(ObjLinkError::BadConfig(
                "objects.request_timeout_ms must be between 10 and 60000".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// How `set_property` decides whether a write changes the cached value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyEquality {
    /// Deep comparison of JSON values. Numbers compare by numeric value, so
    /// `1` and `1.0` are the same.
    #[default]
    Structural,
    /// Scalars compare by value; arrays and objects always count as changed.
    Identity,
}

impl PropertyEquality {
    pub fn same(self, cached: &Value, incoming: &Value) -> bool {
        match self {
            PropertyEquality::Structural => json_eq(cached, incoming),
            PropertyEquality::Identity => match (cached, incoming) {
                (Value::Array(_), _) | (Value::Object(_), _) => false,
                _ => cached == incoming,
            },
        }
    }
}

fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x == y || matches!((x.as_f64(), y.as_f64()), (Some(x), Some(y)) if x == y)
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| json_eq(v, w)))
        }
        _ => a == b,
    }
}

fn default_address() -> String {
    "memory://local".into()
}
fn default_subscription_capacity() -> usize {
    256
}
fn default_request_timeout_ms() -> u64 {
    1000
}
