// Route handler that serves the dispatcher's own metadata

use crate::error::MetadataError;
use crate::generator::MetadataGenerator;
use crate::model::ApiMetadata;
use async_trait::async_trait;
use std::sync::OnceLock;
use switchyard_core::{Error, RequestContext, RequestHandler, Router};
use tracing::{debug, warn};

/// Serves [`ApiMetadata`] for every operation route of the router it is
/// mounted in. Metadata is generated once, when the route table is frozen.
///
/// ```
/// use switchyard_core::{Dispatcher, HttpRequest, OperationDescriptor, Reply, SyncOperation};
/// use switchyard_metadata::{ApiMetadata, MetadataHandler};
///
/// # tokio_test::block_on(async {
/// let ping = OperationDescriptor::builder("Ping").build()?;
/// let dispatcher = Dispatcher::builder()
///     .operation("/api/ping", SyncOperation::new(ping, |_ctx, _args| Ok(Reply::Empty)))
///     .route("/api/$metadata", MetadataHandler::new())
///     .build();
///
/// let response = dispatcher
///     .dispatch(HttpRequest::new("GET", "/api/$metadata"))
///     .await?
///     .into_response();
/// let metadata: ApiMetadata = response.json()?;
/// assert_eq!(metadata.operations[0].path.as_deref(), Some("/api/ping"));
/// # Ok::<(), switchyard_core::Error>(())
/// # }).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct MetadataHandler {
    generator: MetadataGenerator,
    metadata: OnceLock<ApiMetadata>,
}

impl MetadataHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_generator(generator: MetadataGenerator) -> Self {
        Self {
            generator,
            metadata: OnceLock::new(),
        }
    }

    /// Generated metadata, once attached.
    pub fn metadata(&self) -> Option<&ApiMetadata> {
        self.metadata.get()
    }
}

#[async_trait]
impl RequestHandler for MetadataHandler {
    async fn handle_request(&self, ctx: &mut RequestContext) -> Result<(), Error> {
        let metadata = self.metadata.get().ok_or(MetadataError::NotAttached)?;
        let body = metadata
            .to_json()
            .map_err(|e| Error::Serialization(e.to_string()))?;
        ctx.respond_with(body);
        Ok(())
    }

    fn attach(&self, router: &Router) {
        let metadata = self.generator.describe_router(router);
        debug!(operations = metadata.operations.len(), "Metadata handler attached");
        if self.metadata.set(metadata).is_err() {
            warn!("Metadata handler attached twice, keeping the first router");
        }
    }

    fn kind(&self) -> &'static str {
        "metadata"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::HttpRequest;

    #[tokio::test]
    async fn test_unattached_handler_fails() {
        let handler = MetadataHandler::new();
        let mut ctx = RequestContext::new(HttpRequest::new("GET", "/$metadata"));
        let err = handler.handle_request(&mut ctx).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_attached_to_empty_router() {
        let handler = MetadataHandler::new();
        handler.attach(&Router::new());
        assert!(handler.metadata().unwrap().is_empty());

        let mut ctx = RequestContext::new(HttpRequest::new("GET", "/$metadata"));
        handler.handle_request(&mut ctx).await.unwrap();
        assert_eq!(handler.kind(), "metadata");
    }
}
