//! Attribute access for a single resource instance
//!
//! The host engine owns schema, diffing and state persistence. Providers only
//! see a resource through [`ResourceData`]: read an attribute, compare its prior
//! and desired values, write observed values back, and flag the instance as
//! tainted or gone.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Host-side view of one resource instance
pub trait ResourceData: Send + Sync {
    /// Remote identifier; empty while the resource does not exist
    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    /// Current (desired, or observed after a `set`) value of an attribute
    fn get(&self, key: &str) -> Option<&Value>;

    /// Prior and current value of an attribute
    fn get_change(&self, key: &str) -> (Option<&Value>, Option<&Value>);

    fn set(&mut self, key: &str, value: Value);

    /// Mark the instance for replacement on the next run
    fn taint(&mut self);

    fn is_tainted(&self) -> bool;

    /// Forget the remote object; the host drops it from state
    fn mark_deleted(&mut self) {
        self.set_id(String::new());
    }

    fn has_change(&self, key: &str) -> bool {
        let (prior, current) = self.get_change(key);
        match (normalize(prior), normalize(current)) {
            (None, None) => false,
            (Some(prior), Some(current)) => !same_value(prior, current),
            _ => true,
        }
    }

    fn has_changes(&self, keys: &[&str]) -> bool {
        keys.iter().any(|key| self.has_change(key))
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// String attribute, empty when unset
    fn get_string(&self, key: &str) -> String {
        self.get_str(key).unwrap_or_default().to_string()
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    fn get_list(&self, key: &str) -> Option<&Vec<Value>> {
        self.get(key).and_then(Value::as_array)
    }
}

fn normalize(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// Structural equality where `1024` and `1024.0` are the same number
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| same_value(a, b))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, a)| b.get(key).is_some_and(|b| same_value(a, b)))
        }
        _ => a == b,
    }
}

/// In-memory [`ResourceData`] holding prior and current attribute maps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryResourceData {
    id: String,
    prior: Map<String, Value>,
    current: Map<String, Value>,
    tainted: bool,
}

impl MemoryResourceData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instance about to be created: nothing prior, `desired` current
    pub fn from_desired(desired: Map<String, Value>) -> Self {
        Self {
            current: desired,
            ..Self::default()
        }
    }

    /// Existing instance moving from `prior` to `desired`
    pub fn from_change(
        id: impl Into<String>,
        prior: Map<String, Value>,
        desired: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            prior,
            current: desired,
            tainted: false,
        }
    }

    /// Instance known only by id (import, or read of an untracked object)
    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.current.insert(key.into(), value);
        self
    }

    pub fn with_prior_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.prior.insert(key.into(), value);
        self
    }

    /// Accept the current values as the new prior state
    pub fn commit(&mut self) {
        self.prior = self.current.clone();
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.current
    }

    pub fn prior_attributes(&self) -> &Map<String, Value> {
        &self.prior
    }
}

impl ResourceData for MemoryResourceData {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.current.get(key)
    }

    fn get_change(&self, key: &str) -> (Option<&Value>, Option<&Value>) {
        (self.prior.get(key), self.current.get(key))
    }

    fn set(&mut self, key: &str, value: Value) {
        tracing::trace!(key, "set attribute");
        self.current.insert(key.to_string(), value);
    }

    fn taint(&mut self) {
        self.tainted = true;
    }

    fn is_tainted(&self) -> bool {
        self.tainted
    }
}
