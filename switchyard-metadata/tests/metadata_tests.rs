use std::sync::Arc;
use std::thread;
use switchyard_core::{
    Dispatcher, HttpRequest, Operation, OperationDescriptor, Reflect, Reply, SyncOperation,
    reflect_object,
};
use switchyard_metadata::{ApiMetadata, MetadataGenerator, MetadataHandler};

#[allow(dead_code)]
struct Author {
    name: String,
    books: Vec<Book>,
}

#[allow(dead_code)]
struct Book {
    title: String,
    author: Author,
}

reflect_object!(Author { name: String, books: Vec<Book> });
reflect_object!(Book { title: String, author: Author });

fn operation(name: &str) -> Arc<dyn Operation> {
    let descriptor = OperationDescriptor::builder(name)
        .context_param("context")
        .param::<Author>("author")
        .returns::<Vec<Book>>()
        .build()
        .unwrap();
    Arc::new(SyncOperation::new(descriptor, |_ctx, _args| Ok(Reply::Empty)))
}

#[test]
fn test_mutual_recursion_yields_one_model_each() {
    let generator = MetadataGenerator::new();

    for ty in [Author::type_info(), Book::type_info()] {
        let metadata = generator.describe_type(&ty);
        assert_eq!(metadata.models.len(), 2);
        assert!(metadata.model("Author").is_some());
        assert!(metadata.model("Book").is_some());
    }

    let metadata = generator.describe_operation(operation("Publish").descriptor());
    assert_eq!(metadata.models.len(), 2);
    assert_eq!(metadata.model("Book").unwrap().property("author").unwrap().type_label, "Author");
}

#[test]
fn test_context_parameter_is_not_listed() {
    let metadata = MetadataGenerator::new().describe_operation(operation("Publish").descriptor());
    let op = metadata.operation("publish").unwrap();
    assert_eq!(op.parameters.len(), 1);
    assert_eq!(op.parameters[0].type_label, "Author");
    assert_eq!(op.returns.as_deref(), Some("Vec<Book>"));
}

#[test]
fn test_generation_is_repeatable_across_threads() {
    let generator = Arc::new(MetadataGenerator::new());
    let expected = generator.describe_operation(operation("Publish").descriptor());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let generator = generator.clone();
            thread::spawn(move || generator.describe_operation(operation("Publish").descriptor()))
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

#[tokio::test]
async fn test_metadata_route_serves_all_operations() {
    let dispatcher = Dispatcher::builder()
        .service("/api/library", vec![operation("Publish"), operation("Retract")])
        .route("/api/$metadata", MetadataHandler::new())
        .build();

    let response = dispatcher
        .dispatch(HttpRequest::new("GET", "/API/$Metadata"))
        .await
        .unwrap()
        .into_response();
    assert_eq!(response.status, 200);
    assert_eq!(response.header("content-type"), Some("application/json"));

    let metadata: ApiMetadata = response.json().unwrap();
    let paths: Vec<_> = metadata
        .operations
        .iter()
        .map(|op| op.path.clone().unwrap_or_default())
        .collect();
    assert_eq!(paths, vec!["/api/library/publish", "/api/library/retract"]);
    assert_eq!(metadata.models.len(), 2);
}

#[test]
fn test_merge_across_services() {
    let generator = MetadataGenerator::new();
    let mut combined = generator.describe_operation(operation("Publish").descriptor());
    combined.merge(generator.describe_operation(operation("Retract").descriptor()));

    assert_eq!(combined.operations.len(), 2);
    assert_eq!(combined.models.len(), 2);
}
