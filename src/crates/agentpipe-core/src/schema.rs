//! Runtime message schema validation
//!
//! Messages are open JSON values; a [`MessageSchema`] is a compiled JSON
//! Schema that a port or agent can declare to reject malformed shapes at
//! step time. Ports without a schema accept anything.

use std::fmt;
use std::sync::Arc;

use jsonschema::JSONSchema;
use serde_json::Value;

use crate::error::{PipelineError, Result};

/// A compiled JSON Schema together with its source document
///
/// Cloning is cheap; the compiled validator is shared.
#[derive(Clone)]
pub struct MessageSchema {
    raw: Arc<Value>,
    compiled: Arc<JSONSchema>,
}

impl MessageSchema {
    /// Compile a schema document
    ///
    /// Returns [`PipelineError::InvalidSchema`] when the document itself is
    /// not a valid JSON Schema.
    pub fn compile(raw: Value) -> Result<Self> {
        let compiled = JSONSchema::compile(&raw)
            .map_err(|e| PipelineError::InvalidSchema(e.to_string()))?;
        Ok(Self {
            raw: Arc::new(raw),
            compiled: Arc::new(compiled),
        })
    }

    /// The source schema document
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Validate an instance, returning joined validator diagnostics on
    /// failure
    pub fn check(&self, instance: &Value) -> std::result::Result<(), String> {
        match self.compiled.validate(instance) {
            Ok(()) => Ok(()),
            Err(errors) => {
                let detail = errors
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(detail)
            }
        }
    }

    /// Whether an instance conforms to the schema
    pub fn is_valid(&self, instance: &Value) -> bool {
        self.compiled.is_valid(instance)
    }
}

impl fmt::Debug for MessageSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageSchema").field("raw", &self.raw).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepts_conforming_instance() {
        let schema = MessageSchema::compile(json!({"type": "integer"})).unwrap();
        assert!(schema.check(&json!(3)).is_ok());
        assert!(schema.is_valid(&json!(3)));
    }

    #[test]
    fn test_rejects_with_diagnostics() {
        let schema = MessageSchema::compile(json!({
            "type": "object",
            "required": ["text"],
            "properties": {"text": {"type": "string"}}
        }))
        .unwrap();

        let err = schema.check(&json!({"text": 7})).unwrap_err();
        assert!(!err.is_empty());
        assert!(!schema.is_valid(&json!({})));
    }

    #[test]
    fn test_invalid_schema_document() {
        let err = MessageSchema::compile(json!({"type": "not-a-type"})).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidSchema(_)));
    }
}
