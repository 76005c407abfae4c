//! Metadata generation from operation descriptors.
//!
//! The generator walks operation signatures and every user-defined type they
//! reach. A type's model entry is inserted before its fields are expanded,
//! so a type that refers back to itself or an ancestor is found already
//! present and expansion stops there.

use crate::docs::DocumentationIndex;
use crate::model::{ApiMetadata, ModelEntry, OperationEntry, ParameterEntry, PropertyEntry};
use indexmap::IndexMap;
use switchyard_core::{OperationDescriptor, Router, TypeInfo};
use tracing::{debug, trace};

/// Namespaces whose types are never reported as models.
const BUILTIN_NAMESPACES: &[&str] = &[
    "std",
    "core",
    "alloc",
    "chrono",
    "uuid",
    "serde_json",
    "switchyard_core",
];

/// Produces [`ApiMetadata`] for operations and types.
///
/// Generation has no side effects, so one generator can be shared and
/// called concurrently.
///
/// ```
/// use switchyard_core::{OperationDescriptor, reflect_object};
/// use switchyard_metadata::MetadataGenerator;
///
/// struct Customer { id: i64, tags: Vec<String> }
/// reflect_object!(Customer "A customer" { id: i64, tags: Vec<String> });
///
/// let op = OperationDescriptor::builder("ListCustomers")
///     .returns::<Vec<Customer>>()
///     .build()
///     .unwrap();
///
/// let metadata = MetadataGenerator::new().describe_operation(&op);
/// assert_eq!(metadata.operations[0].returns.as_deref(), Some("Vec<Customer>"));
/// assert_eq!(metadata.model("Customer").unwrap().properties.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetadataGenerator {
    docs: DocumentationIndex,
    excluded: Vec<String>,
}

impl MetadataGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fall back to `docs` where no explicit description is declared.
    pub fn with_docs(mut self, docs: DocumentationIndex) -> Self {
        self.docs = docs;
        self
    }

    /// Treat types under `namespace` as framework types.
    pub fn exclude_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.excluded.push(namespace.into());
        self
    }

    pub fn docs(&self) -> &DocumentationIndex {
        &self.docs
    }

    /// Whether `ty`, after unwrapping containers, is a declared type outside
    /// the built-in and excluded namespaces.
    pub fn is_user_defined(&self, ty: &TypeInfo) -> bool {
        let Some(module) = ty.element_type().module() else {
            return false;
        };
        let root = module.split("::").next().unwrap_or(module);
        let builtin = BUILTIN_NAMESPACES.contains(&root);
        let excluded = self
            .excluded
            .iter()
            .any(|ns| module == ns || module.starts_with(&format!("{}::", ns)));
        !(builtin || excluded)
    }

    /// Metadata for one operation and every model its signature reaches.
    pub fn describe_operation(&self, operation: &OperationDescriptor) -> ApiMetadata {
        let mut models = IndexMap::new();
        let entry = self.operation_entry(operation, &mut models);
        debug!(operation = %operation.name, models = models.len(), "Generated operation metadata");
        ApiMetadata {
            operations: vec![entry],
            models,
        }
    }

    /// Models reachable from `ty`, without any operation entry.
    pub fn describe_type(&self, ty: &TypeInfo) -> ApiMetadata {
        let mut models = IndexMap::new();
        self.expand(ty, &mut models);
        ApiMetadata {
            operations: Vec::new(),
            models,
        }
    }

    /// Metadata for every operation mounted in `router`, with route paths.
    pub fn describe_router(&self, router: &Router) -> ApiMetadata {
        let mut models = IndexMap::new();
        let mut operations = Vec::new();
        for route in router.routes() {
            let Some(operation) = route.handler().operation() else {
                continue;
            };
            let mut entry = self.operation_entry(operation, &mut models);
            entry.path = Some(route.path().to_string());
            operations.push(entry);
        }
        debug!(operations = operations.len(), models = models.len(), "Generated router metadata");
        ApiMetadata { operations, models }
    }

    fn operation_entry(
        &self,
        operation: &OperationDescriptor,
        models: &mut IndexMap<String, ModelEntry>,
    ) -> OperationEntry {
        let mut parameters = Vec::new();
        for param in operation.parameters.iter().filter(|p| !p.is_context()) {
            let description = param
                .description
                .as_deref()
                .or_else(|| self.docs.parameter_doc(operation, param))
                .unwrap_or_default();
            parameters.push(ParameterEntry {
                name: param.name.clone(),
                type_label: param.ty.name(),
                description: description.to_string(),
                optional: param.optional,
            });
            self.expand(&param.ty, models);
        }

        let returns = match &operation.returns {
            TypeInfo::Unit => None,
            ty => {
                self.expand(ty, models);
                Some(ty.name())
            }
        };

        let description = operation
            .description
            .as_deref()
            .or_else(|| self.docs.operation_doc(operation))
            .unwrap_or_default();

        OperationEntry {
            name: operation.name.clone(),
            description: description.to_string(),
            path: None,
            parameters,
            returns,
        }
    }

    fn expand(&self, ty: &TypeInfo, models: &mut IndexMap<String, ModelEntry>) {
        if !self.is_user_defined(ty) {
            return;
        }

        let ty = ty.element_type();
        let (name, namespace) = match ty {
            TypeInfo::Object(info) => (&info.name, &info.module),
            TypeInfo::Enum(info) => (&info.name, &info.module),
            _ => return,
        };
        let key = format!("{}::{}", namespace, name);
        if models.contains_key(&key) {
            return;
        }

        let description = ty
            .description()
            .or_else(|| self.docs.type_doc(&key))
            .unwrap_or_default()
            .to_string();

        match ty {
            TypeInfo::Enum(info) => {
                trace!(model = %key, "Expanding enumeration");
                models.insert(
                    key,
                    ModelEntry {
                        name: name.clone(),
                        namespace: namespace.clone(),
                        description,
                        properties: Vec::new(),
                        values: info.variants.clone(),
                    },
                );
            }
            TypeInfo::Object(info) => {
                trace!(model = %key, fields = info.fields.len(), "Expanding model");
                let field_types: Vec<TypeInfo> = info.fields.iter().map(|f| f.ty.resolve()).collect();
                let properties = info
                    .fields
                    .iter()
                    .zip(&field_types)
                    .map(|(field, field_ty)| PropertyEntry {
                        name: field.name.clone(),
                        type_label: field_ty.name(),
                        description: field
                            .description
                            .as_deref()
                            .or_else(|| self.docs.field_doc(&key, &field.name))
                            .unwrap_or_default()
                            .to_string(),
                    })
                    .collect();

                models.insert(
                    key,
                    ModelEntry {
                        name: name.clone(),
                        namespace: namespace.clone(),
                        description,
                        properties,
                        values: Vec::new(),
                    },
                );

                for field_ty in &field_types {
                    self.expand(field_ty, models);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::{Reflect, RequestContext, reflect_enum, reflect_object};

    #[allow(dead_code)]
    enum Status {
        Active,
        Suspended,
    }
    reflect_enum!(Status { Active, Suspended });

    #[allow(dead_code)]
    struct Address {
        street: String,
    }
    reflect_object!(Address { street: String });

    #[allow(dead_code)]
    struct Customer {
        id: i64,
        status: Status,
        addresses: Vec<Address>,
        manager: Option<Box<Customer>>,
    }
    reflect_object!(Customer "A customer account" {
        id: i64,
        status: Status,
        addresses: Vec<Address>,
        manager: Option<Box<Customer>>,
    });

    fn save_customer() -> OperationDescriptor {
        OperationDescriptor::builder("SaveCustomer")
            .context_param("context")
            .param::<Customer>("customer")
            .optional_param::<bool>("notify")
            .describe_param("notify", "Send a confirmation")
            .build()
            .unwrap()
    }

    #[test]
    fn test_builtin_types_are_not_models() {
        let generator = MetadataGenerator::new();
        assert!(!generator.is_user_defined(&i64::type_info()));
        assert!(!generator.is_user_defined(&Vec::<String>::type_info()));
        assert!(!generator.is_user_defined(&RequestContext::type_info()));
        assert!(!generator.is_user_defined(&serde_json::Value::type_info()));
        assert!(generator.is_user_defined(&Vec::<Customer>::type_info()));
    }

    #[test]
    fn test_excluded_namespace() {
        let generator = MetadataGenerator::new().exclude_namespace(module_path!());
        assert!(!generator.is_user_defined(&Customer::type_info()));
    }

    #[test]
    fn test_operation_entry() {
        let metadata = MetadataGenerator::new().describe_operation(&save_customer());
        let op = &metadata.operations[0];

        assert_eq!(op.name, "SaveCustomer");
        assert_eq!(op.returns, None);
        let names: Vec<&str> = op.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["customer", "notify"]);
        assert_eq!(op.parameters[1].description, "Send a confirmation");
        assert!(op.parameters[1].optional);
    }

    #[test]
    fn test_models_expand_recursively_once() {
        let metadata = MetadataGenerator::new().describe_operation(&save_customer());
        let keys: Vec<&str> = metadata.models.values().map(|m| m.name.as_str()).collect();
        assert_eq!(keys, vec!["Customer", "Status", "Address"]);

        let customer = metadata.model("Customer").unwrap();
        assert_eq!(customer.description, "A customer account");
        assert_eq!(customer.property("addresses").unwrap().type_label, "Vec<Address>");
        assert_eq!(customer.property("manager").unwrap().type_label, "Option<Customer>");

        let status = metadata.model("Status").unwrap();
        assert_eq!(status.values, vec!["Active", "Suspended"]);
    }

    #[test]
    fn test_documentation_fallback() {
        let key = format!("{}::Address", module_path!());
        let docs = DocumentationIndex::new()
            .with(format!("T:{}", key), "Postal address")
            .with(format!("F:{}.street", key), "Street and number")
            .with(format!("T:{}::Customer", module_path!()), "ignored, annotation wins")
            .with("M:SaveCustomer(RequestContext,Customer,bool)", "Create or update a customer");

        let metadata = MetadataGenerator::new()
            .with_docs(docs)
            .describe_operation(&save_customer());

        assert_eq!(metadata.operations[0].description, "Create or update a customer");
        let address = metadata.model("Address").unwrap();
        assert_eq!(address.description, "Postal address");
        assert_eq!(address.properties[0].description, "Street and number");
        assert_eq!(metadata.model("Customer").unwrap().description, "A customer account");
    }

    #[test]
    fn test_describe_type() {
        let metadata = MetadataGenerator::new().describe_type(&Option::<Vec<Address>>::type_info());
        assert!(metadata.operations.is_empty());
        assert_eq!(metadata.models.len(), 1);
        assert!(MetadataGenerator::new().describe_type(&u8::type_info()).is_empty());
    }
}
