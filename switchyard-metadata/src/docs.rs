//! Documentation lookup for reflected entities.
//!
//! A [`DocumentationIndex`] maps stable entity ids to human-written text,
//! typically extracted from doc comments at build time and shipped as JSON:
//!
//! | Entity    | Id                                   |
//! |-----------|--------------------------------------|
//! | type      | `T:app::models::Customer`            |
//! | operation | `M:GetCustomer(i64,Option<bool>)`    |
//! | field     | `F:app::models::Customer.name`       |
//! | parameter | `P:GetCustomer.id`                   |

use crate::error::{MetadataError, Result};
use std::collections::HashMap;
use std::path::Path;
use switchyard_core::{OperationDescriptor, ParameterDescriptor};

#[derive(Debug, Clone, Default)]
pub struct DocumentationIndex {
    entries: HashMap<String, String>,
}

impl DocumentationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object of id to text.
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: HashMap<String, String> = serde_json::from_str(json)
            .map_err(|e| MetadataError::InvalidDocumentation(e.to_string()))?;
        Ok(Self { entries })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn insert(&mut self, id: impl Into<String>, text: impl Into<String>) {
        self.entries.insert(id.into(), text.into());
    }

    pub fn with(mut self, id: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(id, text);
        self
    }

    /// Trimmed text for `id`; blank entries count as missing.
    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries
            .get(id)
            .map(|text| text.trim())
            .filter(|text| !text.is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn type_doc(&self, qualified_name: &str) -> Option<&str> {
        self.get(&format!("T:{}", qualified_name))
    }

    pub fn field_doc(&self, qualified_name: &str, field: &str) -> Option<&str> {
        self.get(&format!("F:{}.{}", qualified_name, field))
    }

    pub fn operation_doc(&self, operation: &OperationDescriptor) -> Option<&str> {
        self.get(&format!("M:{}", operation.signature()))
    }

    pub fn parameter_doc(&self, operation: &OperationDescriptor, param: &ParameterDescriptor) -> Option<&str> {
        self.get(&format!("P:{}.{}", operation.name, param.name))
    }
}

impl FromIterator<(String, String)> for DocumentationIndex {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let docs = DocumentationIndex::from_json(
            r#"{"T:app::Customer": "  A customer  ", "P:GetCustomer.id": ""}"#,
        )
        .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs.type_doc("app::Customer"), Some("A customer"));
        assert_eq!(docs.get("P:GetCustomer.id"), None);
        assert_eq!(docs.get("T:app::Order"), None);
    }

    #[test]
    fn test_invalid_json() {
        let err = DocumentationIndex::from_json("[1, 2]").unwrap_err();
        assert!(matches!(err, MetadataError::InvalidDocumentation(_)));
    }

    #[test]
    fn test_operation_ids() {
        let op = OperationDescriptor::builder("GetCustomer")
            .param::<i64>("id")
            .build()
            .unwrap();
        let docs = DocumentationIndex::new()
            .with("M:GetCustomer(i64)", "Fetch one customer")
            .with("P:GetCustomer.id", "Customer id");

        assert_eq!(docs.operation_doc(&op), Some("Fetch one customer"));
        assert_eq!(docs.parameter_doc(&op, &op.parameters[0]), Some("Customer id"));
    }
}
