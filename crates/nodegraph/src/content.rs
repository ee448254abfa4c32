//! Node content payloads.
//!
//! The diff engine never looks inside content: it is serialized as one
//! opaque value and compared for equality as a whole.

use crate::error::Result;
use serde_json::Value;

/// User-editable payload carried by a node.
pub trait NodeContent: std::fmt::Debug {
    /// Short tag naming the content flavour, used by factories and renderers.
    fn kind(&self) -> &str {
        "json"
    }

    fn serialize(&self) -> Value;

    fn deserialize(&mut self, doc: &Value) -> Result<()>;
}

/// Default content: an arbitrary JSON value stored verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonContent {
    value: Value,
}

impl JsonContent {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Default for JsonContent {
    fn default() -> Self {
        Self {
            value: Value::Object(Default::default()),
        }
    }
}

impl NodeContent for JsonContent {
    fn serialize(&self) -> Value {
        self.value.clone()
    }

    fn deserialize(&mut self, doc: &Value) -> Result<()> {
        self.value = doc.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_content_roundtrip() {
        let mut c = JsonContent::default();
        assert_eq!(c.serialize(), json!({}));
        c.deserialize(&json!({"text": "Foo bar"})).unwrap();
        assert_eq!(c.serialize()["text"], "Foo bar");
        assert_eq!(c.kind(), "json");
    }
}
