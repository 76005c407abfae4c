// Switchyard - request dispatch for Rust
//
// Maps requests to registered operations by URL prefix, binds their
// parameters from loosely-typed request data, and runs them inside a
// pre/post/error hook lifecycle.

// Re-export core functionality
pub use switchyard_core::*;

// Re-export optional crates
#[cfg(feature = "metadata")]
pub use switchyard_metadata;

#[cfg(feature = "config")]
pub use switchyard_config;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Arguments,
        BagValue,
        Dispatch,
        Dispatcher,
        DispatcherConfig,
        Error,
        EventHandlers,
        FnOperation,
        HttpRequest,
        HttpResponse,
        Operation,
        OperationDescriptor,
        PropertyBag,
        Reflect,
        Reply,
        RequestContext,
        RequestHandler,
        SyncOperation,
        async_trait,
        reflect_enum,
        reflect_object,
    };

    #[cfg(feature = "metadata")]
    pub use switchyard_metadata::{ApiMetadata, MetadataGenerator, MetadataHandler};

    #[cfg(feature = "config")]
    pub use switchyard_config::{ConfigManager, Settings};
}
