//! Self-describing metadata for Switchyard operations.
//!
//! Walks operation descriptors and the user-defined types reachable from
//! their signatures, producing an [`ApiMetadata`] document: one entry per
//! operation and one [`ModelEntry`] per aggregate or enumeration.
//!
//! ## Features
//!
//! - **Cycle-safe expansion** - self- and mutually-referencing types appear once
//! - **Documentation fallback** - explicit descriptions first, then a [`DocumentationIndex`]
//! - **Self-hosting** - [`MetadataHandler`] serves the metadata of its own dispatcher
//!
//! ## Quick Start
//!
//! ```
//! use switchyard_core::{OperationDescriptor, reflect_object};
//! use switchyard_metadata::{DocumentationIndex, MetadataGenerator};
//!
//! struct Order { id: i64 }
//! reflect_object!(Order { id: i64 });
//!
//! let op = OperationDescriptor::builder("GetOrder")
//!     .param::<i64>("id")
//!     .returns::<Option<Order>>()
//!     .build()
//!     .unwrap();
//!
//! let docs = DocumentationIndex::new().with("P:GetOrder.id", "Order number");
//! let metadata = MetadataGenerator::new().with_docs(docs).describe_operation(&op);
//!
//! assert_eq!(metadata.operations[0].parameters[0].description, "Order number");
//! assert!(metadata.model("Order").is_some());
//! ```

pub mod docs;
pub mod error;
pub mod generator;
pub mod handler;
pub mod model;

pub use docs::DocumentationIndex;
pub use error::{MetadataError, Result};
pub use generator::MetadataGenerator;
pub use handler::MetadataHandler;
pub use model::*;
