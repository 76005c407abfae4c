//! Metadata model types

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Self-description of a set of operations and the models they reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiMetadata {
    #[serde(default)]
    pub operations: Vec<OperationEntry>,
    /// Keyed by qualified type name (`module::Type`), in discovery order
    #[serde(default)]
    pub models: IndexMap<String, ModelEntry>,
}

impl ApiMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `other` into `self`. Operations are appended; a model already
    /// present keeps its first description.
    pub fn merge(&mut self, other: ApiMetadata) {
        self.operations.extend(other.operations);
        for (key, model) in other.models {
            self.models.entry(key).or_insert(model);
        }
    }

    /// Find an operation by name, ignoring case.
    pub fn operation(&self, name: &str) -> Option<&OperationEntry> {
        self.operations
            .iter()
            .find(|op| op.name.eq_ignore_ascii_case(name))
    }

    /// Find a model by qualified or simple name, ignoring case.
    ///
    /// A simple name only resolves when exactly one module declares it; use
    /// the qualified `module::Type` key or [`models_named`](Self::models_named)
    /// when several do.
    pub fn model(&self, name: &str) -> Option<&ModelEntry> {
        if let Some(model) = self
            .models
            .iter()
            .find_map(|(key, model)| key.eq_ignore_ascii_case(name).then_some(model))
        {
            return Some(model);
        }

        let mut candidates = self.models_named(name);
        let first = candidates.next()?;
        candidates.next().is_none().then_some(first)
    }

    /// Every model whose simple name matches `name`, ignoring case.
    pub fn models_named<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a ModelEntry> + use<'a, 'n> {
        self.models
            .values()
            .filter(move |model| model.name.eq_ignore_ascii_case(name))
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.models.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

/// One operation's signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Route path the operation is mounted at, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterEntry>,
    /// Result type label; absent for operations without a result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
}

/// An input parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub type_label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub optional: bool,
}

/// A user-defined aggregate or enumeration reachable from a signature.
///
/// `name` alone is not unique: equally named types from different modules
/// get separate entries, told apart by `namespace`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelEntry {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyEntry>,
    /// Member names, for enumerations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl ModelEntry {
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.namespace, self.name)
    }

    pub fn property(&self, name: &str) -> Option<&PropertyEntry> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

/// A public field of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub type_label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(namespace: &str, name: &str, description: &str) -> ModelEntry {
        ModelEntry {
            name: name.to_string(),
            namespace: namespace.to_string(),
            description: description.to_string(),
            properties: Vec::new(),
            values: Vec::new(),
        }
    }

    #[test]
    fn test_merge_keeps_first_model() {
        let mut left = ApiMetadata::new();
        left.models.insert("app::Customer".into(), model("app", "Customer", "first"));

        let mut right = ApiMetadata::new();
        right.models.insert("app::Customer".into(), model("app", "Customer", "second"));
        right.models.insert("app::Order".into(), model("app", "Order", ""));
        right.operations.push(OperationEntry {
            name: "GetOrder".into(),
            description: String::new(),
            path: None,
            parameters: Vec::new(),
            returns: Some("Order".into()),
        });

        left.merge(right);
        assert_eq!(left.models.len(), 2);
        assert_eq!(left.model("customer").unwrap().description, "first");
        assert_eq!(left.model("APP::ORDER").unwrap().name, "Order");
        assert!(left.operation("getorder").is_some());
    }

    #[test]
    fn test_simple_name_lookup_requires_a_unique_match() {
        let mut metadata = ApiMetadata::new();
        metadata.models.insert("billing::Account".into(), model("billing", "Account", "ledger"));
        metadata.models.insert("auth::Account".into(), model("auth", "Account", "login"));
        metadata.models.insert("auth::Session".into(), model("auth", "Session", ""));

        assert!(metadata.model("account").is_none());
        assert_eq!(metadata.models_named("ACCOUNT").count(), 2);
        assert_eq!(metadata.model("auth::account").unwrap().description, "login");
        assert_eq!(metadata.model("Billing::Account").unwrap().description, "ledger");
        assert_eq!(metadata.model("session").unwrap().namespace, "auth");
        assert!(metadata.model("Missing").is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let entry = ParameterEntry {
            name: "id".into(),
            type_label: "i64".into(),
            description: String::new(),
            optional: false,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json, serde_json::json!({"name": "id", "type": "i64", "optional": false}));
    }
}
