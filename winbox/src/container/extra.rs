//! Typed key/value bag for forward-compatible settings.
//!
//! Values are one of string, bool or integer. Anything else found in a
//! stored document (floats, arrays, nested objects) is kept untouched and
//! written back on save, so newer writers do not lose data through older
//! readers.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraValue {
    String(String),
    Bool(bool),
    Int(i64),
}

impl ExtraValue {
    /// String form, as a settings reader expects it.
    pub fn to_string_value(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::from(s.as_str()),
            Self::Bool(b) => Value::from(*b),
            Self::Int(i) => Value::from(*i),
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n.as_i64().map(Self::Int),
            _ => None,
        }
    }
}

impl From<&str> for ExtraValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ExtraValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for ExtraValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ExtraValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraData {
    values: BTreeMap<String, ExtraValue>,
    passthrough: Map<String, Value>,
}

impl ExtraData {
    pub fn from_json(object: &Map<String, Value>) -> Self {
        let mut data = Self::default();
        for (key, value) in object {
            match ExtraValue::from_json(value) {
                Some(v) => {
                    data.values.insert(key.clone(), v);
                }
                None => {
                    data.passthrough.insert(key.clone(), value.clone());
                }
            }
        }
        data
    }

    pub fn to_json(&self) -> Map<String, Value> {
        let mut object = self.passthrough.clone();
        for (key, value) in &self.values {
            object.insert(key.clone(), value.to_json());
        }
        object
    }

    pub fn get(&self, name: &str) -> Option<&ExtraValue> {
        self.values.get(name)
    }

    pub fn get_string(&self, name: &str) -> Option<String> {
        self.values.get(name).map(ExtraValue::to_string_value)
    }

    pub fn insert(&mut self, name: &str, value: ExtraValue) {
        self.passthrough.remove(name);
        self.values.insert(name.to_string(), value);
    }

    pub fn remove(&mut self, name: &str) {
        self.values.remove(name);
        self.passthrough.remove(name);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.passthrough.is_empty()
    }
}
