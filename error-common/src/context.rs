use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::types::{Categorized, ErrorCategory};

/// Error context information
///
/// Collected where a failure is observed and flattened into the structured
/// metadata of the audit entry that records it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    pub category: Option<ErrorCategory>,
    pub code: Option<String>,
    pub request_id: Option<String>,
    pub order_id: Option<String>,
    pub carrier: Option<String>,
    pub additional: BTreeMap<String, String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the context from a categorized error
    pub fn from_error<E: Categorized>(error: &E) -> Self {
        Self {
            category: Some(error.category()),
            code: Some(error.code().to_string()),
            ..Self::default()
        }
    }

    pub fn with_request_id(mut self, request_id: impl ToString) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }

    pub fn with_order_id(mut self, order_id: impl ToString) -> Self {
        self.order_id = Some(order_id.to_string());
        self
    }

    pub fn with_carrier(mut self, carrier: impl Into<String>) -> Self {
        self.carrier = Some(carrier.into());
        self
    }

    pub fn add_context<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.additional.insert(key.into(), value.into());
        self
    }

    /// Flatten into a JSON object, omitting unset fields
    pub fn to_metadata(&self) -> Value {
        let mut map = Map::new();
        if let Some(category) = self.category {
            map.insert("error_category".into(), Value::String(category.as_str().into()));
        }
        if let Some(code) = &self.code {
            map.insert("error_code".into(), Value::String(code.clone()));
        }
        if let Some(request_id) = &self.request_id {
            map.insert("request_id".into(), Value::String(request_id.clone()));
        }
        if let Some(order_id) = &self.order_id {
            map.insert("order_id".into(), Value::String(order_id.clone()));
        }
        if let Some(carrier) = &self.carrier {
            map.insert("carrier".into(), Value::String(carrier.clone()));
        }
        for (key, value) in &self.additional {
            map.insert(key.clone(), Value::String(value.clone()));
        }
        Value::Object(map)
    }
}
