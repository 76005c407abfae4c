// Core library for the Switchyard request dispatcher
// Routing, parameter binding, type conversion and the handler lifecycle

pub mod bag;
pub mod binder;
pub mod context;
pub mod convert;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod http;
pub mod lifecycle;
pub mod logging;
pub mod routing;
pub mod serialization;
pub mod types;

// Re-export commonly used types
pub use bag::*;
pub use binder::*;
pub use context::*;
pub use convert::*;
pub use descriptor::*;
pub use dispatcher::*;
pub use error::*;
pub use handler::*;
pub use http::*;
pub use lifecycle::*;
pub use routing::{Route, Router};
pub use serialization::*;
pub use types::*;

pub use async_trait::async_trait;
