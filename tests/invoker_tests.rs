mod common;

use common::{client, client_with, json_response, widgets_resource, RecordingTransport, BASE_URI};
use restwire::model::{
    BeanDescriptor, ClientHeaderParam, DefaultOperation, OperationDescriptor, ParamKind,
    ParameterBinding, ResourceDescriptor, ReturnType,
};
use restwire::{
    CallContext, Capability, ClientConfig, ClientProxy, ClientRuntime, Error, InvocationResult,
    MultiMap,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize, PartialEq)]
struct Widget {
    id: u64,
}

#[tokio::test]
async fn test_widget_lookup_scenario() {
    let transport = RecordingTransport::new();
    transport.respond(json_response(200, r#"{"id":42}"#));
    let client = client(widgets_resource(), &transport);

    let widget: Widget = client
        .invoke("get_widget", vec![json!(42), json!(true)])
        .await
        .unwrap()
        .into_entity()
        .unwrap();

    assert_eq!(widget, Widget { id: 42 });
    let request = transport.last_request();
    assert_eq!(request.method, "GET");
    assert_eq!(request.uri, format!("{BASE_URI}/widgets/42?verbose=true"));
    assert_eq!(request.headers.get_first("Accept"), Some("application/json"));
    assert_eq!(client.last_response().unwrap().status, 200);
    assert_eq!(client.templates()["id"], "42");
}

#[tokio::test]
async fn test_last_response_reset_per_call() {
    let transport = RecordingTransport::new();
    transport.respond(json_response(200, r#"{"id":1}"#));
    let client = client(widgets_resource(), &transport);
    client
        .invoke("get_widget", vec![json!(1), Value::Null])
        .await
        .unwrap();
    assert!(client.last_response().is_some());

    let missing = client.invoke("get_widget", vec![Value::Null, Value::Null]).await;
    assert!(matches!(missing, Err(Error::MissingPathValue { ref variable, .. }) if variable == "id"));
    assert!(client.last_response().is_none());
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn test_unknown_operation_is_invalid() {
    let transport = RecordingTransport::new();
    let client = client(widgets_resource(), &transport);
    let result = client.invoke("delete_widget", vec![]).await;
    assert!(matches!(result, Err(Error::InvalidOperation { ref operation, .. }) if operation == "delete_widget"));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_too_few_arguments_is_invalid() {
    let transport = RecordingTransport::new();
    let client = client(widgets_resource(), &transport);
    let result = client.invoke("get_widget", vec![json!(1)]).await;
    assert!(matches!(result, Err(Error::InvalidOperation { .. })));
}

#[tokio::test]
async fn test_default_operation_runs_locally() {
    let transport = RecordingTransport::new();
    let resource = widgets_resource().with_default_operation(
        "describe",
        DefaultOperation::new(|client: &ClientProxy, args: &[Value]| {
            Ok(InvocationResult::Entity(json!({
                "resource": client.resource().name,
                "args": args.len(),
            })))
        }),
    );
    let client = client(resource, &transport);
    let result = client.invoke("describe", vec![json!(1)]).await.unwrap();
    assert_eq!(result.entity(), Some(&json!({"resource": "Widgets", "args": 1})));
    assert_eq!(transport.request_count(), 0);
}

#[test]
fn test_body_and_form_rejected_at_construction() {
    let built = OperationDescriptor::builder("submit", "POST", "/forms")
        .param(ParameterBinding::body(0))
        .param(ParameterBinding::form("name", 1))
        .build();
    assert!(matches!(built, Err(Error::InvalidOperation { .. })));
}

#[test]
fn test_two_bodies_rejected_at_client_construction() {
    let mut operation = OperationDescriptor::builder("upload", "POST", "/files")
        .param(ParameterBinding::body(0))
        .build()
        .unwrap();
    operation.parameters.push(ParameterBinding::body(1));
    let resource = ResourceDescriptor::new("Files", "/").with_operation(operation);

    let transport = RecordingTransport::new();
    let result = ClientProxy::new(BASE_URI, resource, Arc::new(ClientRuntime::new(transport.clone())), &[]);
    assert!(matches!(result, Err(Error::InvalidOperation { .. })));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_repeated_values_keep_argument_order() {
    let transport = RecordingTransport::new();
    let resource = ResourceDescriptor::new("Search", "/").with_operation(
        OperationDescriptor::builder("search", "GET", "/search")
            .param(ParameterBinding::query("tag", 0))
            .param(ParameterBinding::header("X-Tag", 1))
            .param(ParameterBinding::cookie("pref", 2))
            .build()
            .unwrap(),
    );
    let client = client(resource, &transport);
    client
        .invoke(
            "search",
            vec![json!(["b", "a", "c"]), json!(["two", "one"]), json!(["x", "y"])],
        )
        .await
        .unwrap();

    let request = transport.last_request();
    assert_eq!(request.uri, format!("{BASE_URI}/search?tag=b&tag=a&tag=c"));
    assert_eq!(request.headers.get("X-Tag").unwrap(), ["two", "one"]);
    assert_eq!(request.headers.get("Cookie").unwrap(), ["pref=x", "pref=y"]);
}

#[tokio::test]
async fn test_form_parameters_become_form_body() {
    let transport = RecordingTransport::new();
    let resource = ResourceDescriptor::new("Login", "/").with_operation(
        OperationDescriptor::builder("login", "POST", "/login")
            .param(ParameterBinding::form("user", 0))
            .param(ParameterBinding::form("scope", 1))
            .build()
            .unwrap(),
    );
    let client = client(resource, &transport);
    client
        .invoke("login", vec![json!("ann lee"), json!(["read", "write"])])
        .await
        .unwrap();

    let request = transport.last_request();
    assert_eq!(
        request.headers.get_first("Content-Type"),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(
        String::from_utf8(request.body.unwrap()).unwrap(),
        "user=ann%20lee&scope=read&scope=write"
    );
}

#[tokio::test]
async fn test_bag_form_values_become_form_body() {
    let transport = RecordingTransport::new();
    let credentials = BeanDescriptor::new("Credentials")
        .bind("user", ParamKind::Form, "user")
        .bind("tenant", ParamKind::Header, "X-Tenant");
    let resource = ResourceDescriptor::new("Login", "/").with_operation(
        OperationDescriptor::builder("login", "POST", "/login")
            .param(ParameterBinding::bean(0, credentials))
            .build()
            .unwrap(),
    );
    let client = client(resource, &transport);
    client
        .invoke("login", vec![json!({"user": "ann lee", "tenant": "t1"})])
        .await
        .unwrap();

    let request = transport.last_request();
    assert_eq!(
        request.headers.get_first("Content-Type"),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(request.headers.get_first("X-Tenant"), Some("t1"));
    assert_eq!(String::from_utf8(request.body.unwrap()).unwrap(), "user=ann%20lee");
}

#[tokio::test]
async fn test_multipart_parts_become_multipart_body() {
    let transport = RecordingTransport::new();
    let resource = ResourceDescriptor::new("Uploads", "/").with_operation(
        OperationDescriptor::builder("upload", "POST", "/uploads")
            .param(ParameterBinding::part(0, "meta", "application/json"))
            .param(ParameterBinding::part(1, "note", "text/plain"))
            .param(ParameterBinding::part(2, "extra", "text/plain"))
            .build()
            .unwrap(),
    );
    let client = client(resource, &transport);
    client
        .invoke(
            "upload",
            vec![json!({"size": 3}), json!("hello"), Value::Null],
        )
        .await
        .unwrap();

    let request = transport.last_request();
    let content_type = request.headers.get_first("Content-Type").unwrap().to_string();
    let boundary = content_type
        .strip_prefix("multipart/form-data; boundary=")
        .unwrap();
    let body = String::from_utf8(request.body.unwrap()).unwrap();
    assert!(body.starts_with(&format!("--{boundary}\r\n")));
    assert!(body.ends_with(&format!("--{boundary}--\r\n")));
    let meta = body.find("name=\"meta\"").unwrap();
    let note = body.find("name=\"note\"").unwrap();
    assert!(meta < note);
    assert!(body.contains("{\"size\":3}"));
    assert!(body.contains("\r\n\r\nhello\r\n"));
    assert!(!body.contains("name=\"extra\""));
}

#[tokio::test]
async fn test_form_map_body_overrides_declared_media_type() {
    let transport = RecordingTransport::new();
    let resource = ResourceDescriptor::new("Forms", "/").with_operation(
        OperationDescriptor::builder("submit", "POST", "/forms")
            .param(ParameterBinding::form_map_body(0))
            .consumes("application/json")
            .build()
            .unwrap(),
    );
    let client = client(resource, &transport);
    client
        .invoke("submit", vec![json!({"a": [1, 2]})])
        .await
        .unwrap();

    let request = transport.last_request();
    assert_eq!(
        request.headers.get_first("Content-Type"),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(String::from_utf8(request.body.unwrap()).unwrap(), "a=1&a=2");
}

#[tokio::test]
async fn test_explicit_body_encoded_as_json() {
    let transport = RecordingTransport::new();
    transport.respond(json_response(201, r#"{"id":9}"#));
    let resource = ResourceDescriptor::new("Widgets", "/").with_operation(
        OperationDescriptor::builder("create", "POST", "/widgets")
            .param(ParameterBinding::body(0))
            .consumes("application/json")
            .returns(ReturnType::entity("Widget"))
            .build()
            .unwrap(),
    );
    let client = client(resource, &transport);
    let created: Widget = client
        .invoke("create", vec![json!({"name": "gear"})])
        .await
        .unwrap()
        .into_entity()
        .unwrap();
    assert_eq!(created.id, 9);

    let request = transport.last_request();
    assert_eq!(request.headers.get_first("Content-Type"), Some("application/json"));
    let sent: Value = serde_json::from_slice(&request.body.unwrap()).unwrap();
    assert_eq!(sent, json!({"name": "gear"}));
}

#[tokio::test]
async fn test_path_variable_from_body_property() {
    let transport = RecordingTransport::new();
    let resource = ResourceDescriptor::new("Widgets", "/").with_operation(
        OperationDescriptor::builder("update", "PUT", "/widgets/{id}")
            .param(ParameterBinding::body(0))
            .build()
            .unwrap(),
    );
    let client = client(resource, &transport);
    client
        .invoke("update", vec![json!({"id": 5, "name": "cog"})])
        .await
        .unwrap();
    assert_eq!(transport.last_request().uri, format!("{BASE_URI}/widgets/5"));
}

#[tokio::test]
async fn test_parameter_bag_binds_nested_locations() {
    let transport = RecordingTransport::new();
    let paging = BeanDescriptor::new("Paging")
        .bind("page", ParamKind::Query, "page")
        .bind("size", ParamKind::Query, "size");
    let filter = BeanDescriptor::new("Filter")
        .bind("owner", ParamKind::Path, "owner")
        .bind("trace", ParamKind::Header, "X-Trace")
        .nested("paging", paging);
    let resource = ResourceDescriptor::new("Widgets", "/").with_operation(
        OperationDescriptor::builder("list", "GET", "/owners/{owner}/widgets")
            .param(ParameterBinding::bean(0, filter))
            .build()
            .unwrap(),
    );
    let client = client(resource, &transport);
    client
        .invoke(
            "list",
            vec![json!({
                "owner": "acme",
                "trace": "t-1",
                "paging": {"page": 2, "size": null}
            })],
        )
        .await
        .unwrap();

    let request = transport.last_request();
    assert_eq!(request.uri, format!("{BASE_URI}/owners/acme/widgets?page=2"));
    assert_eq!(request.headers.get_first("X-Trace"), Some("t-1"));
}

#[tokio::test]
async fn test_class_template_values_persist_on_root() {
    let transport = RecordingTransport::new();
    let resource = ResourceDescriptor::new("Tenants", "/tenants/{tenant}").with_operation(
        OperationDescriptor::builder("list", "GET", "/widgets")
            .build()
            .unwrap(),
    );
    let runtime = Arc::new(ClientRuntime::new(transport.clone()));
    let client = ClientProxy::new(BASE_URI, resource, runtime, &[json!("acme")]).unwrap();
    client.invoke("list", vec![]).await.unwrap();
    client.invoke("list", vec![]).await.unwrap();
    let requests = transport.requests();
    assert_eq!(requests[0].uri, format!("{BASE_URI}/tenants/acme/widgets"));
    assert_eq!(requests[1].uri, requests[0].uri);
}

fn catalog_resource() -> ResourceDescriptor {
    let item = ResourceDescriptor::new("Item", "/").with_operation(
        OperationDescriptor::builder("get", "GET", "/")
            .returns(ReturnType::entity("Item"))
            .build()
            .unwrap(),
    );
    ResourceDescriptor::new("Catalog", "/catalog")
        .with_sub_resource(item)
        .with_operation(
            OperationDescriptor::builder("item", "", "/items/{id}")
                .param(ParameterBinding::path("id", 0))
                .param(ParameterBinding::header("X-Scope", 1))
                .sub_resource("Item")
                .build()
                .unwrap(),
        )
}

#[tokio::test]
async fn test_sub_resource_handles_are_isolated() {
    let transport = RecordingTransport::new();
    transport
        .respond(json_response(200, r#"{"n":1}"#))
        .respond(json_response(200, r#"{"n":2}"#));
    let root = client(catalog_resource(), &transport);
    root.header("X-Root", "r");

    let first = root
        .invoke("item", vec![json!(1), json!("a")])
        .await
        .unwrap()
        .into_sub_resource()
        .unwrap();
    let second = root
        .invoke("item", vec![json!(2), json!("b")])
        .await
        .unwrap()
        .into_sub_resource()
        .unwrap();
    assert_eq!(transport.request_count(), 0);
    assert!(!first.is_root());
    assert_eq!(first.base_uri(), format!("{BASE_URI}/catalog/items/1"));
    assert_eq!(first.templates()["id"], "1");
    assert_eq!(second.templates()["id"], "2");
    assert!(root.templates().is_empty());

    first.header("X-Only-First", "1");
    assert!(second.headers().get("X-Only-First").is_none());
    assert!(root.headers().get("X-Only-First").is_none());
    assert!(first.headers().get("X-Root").is_none());

    first.invoke("get", vec![]).await.unwrap();
    second.invoke("get", vec![]).await.unwrap();
    let requests = transport.requests();
    assert_eq!(requests[0].uri, format!("{BASE_URI}/catalog/items/1"));
    assert_eq!(requests[0].headers.get_first("X-Scope"), Some("a"));
    assert_eq!(requests[1].uri, format!("{BASE_URI}/catalog/items/2"));
    assert_eq!(requests[1].headers.get_first("X-Scope"), Some("b"));
    assert_eq!(first.last_response().unwrap().body, br#"{"n":1}"#.to_vec());
    assert!(root.last_response().is_none());
}

#[tokio::test]
async fn test_sub_resource_inherits_headers_when_configured() {
    let transport = RecordingTransport::new();
    let config = ClientConfig {
        inherit_headers: true,
        ..ClientConfig::default()
    };
    let root = client_with(
        catalog_resource(),
        ClientRuntime::new(transport.clone()).with_config(config),
    );
    root.header("X-Root", "r");
    let item = root
        .invoke("item", vec![json!(3), Value::Null])
        .await
        .unwrap()
        .into_sub_resource()
        .unwrap();
    assert_eq!(item.headers().get_first("X-Root"), Some("r"));
}

struct Item(ClientProxy);

impl Capability for Item {
    fn from_client(client: ClientProxy) -> Self {
        Self(client)
    }
}

#[tokio::test]
async fn test_typed_sub_resource() {
    let transport = RecordingTransport::new();
    let root = client(catalog_resource(), &transport);
    let item: Item = root.sub_resource("item", vec![json!(8), Value::Null]).await.unwrap();
    assert_eq!(item.0.resource().name, "Item");
}

#[tokio::test]
async fn test_declared_headers_do_not_override_parameters() {
    let transport = RecordingTransport::new();
    let resource = ResourceDescriptor::new("Widgets", "/")
        .with_client_header(ClientHeaderParam::fixed("X-Client", &["resource"]))
        .with_client_header(ClientHeaderParam::computed("X-Token", "token", true))
        .with_operation(
            OperationDescriptor::builder("ping", "GET", "/ping")
                .param(ParameterBinding::header("X-Client", 0))
                .client_header(ClientHeaderParam::fixed("X-Version", &["1", "2"]))
                .build()
                .unwrap(),
        );
    let runtime = ClientRuntime::new(transport.clone()).with_header_compute(
        "token",
        Arc::new(|name: &str| -> anyhow::Result<Option<Vec<String>>> {
            Ok(Some(vec![format!("{name}-value")]))
        }),
    );
    let client = client_with(resource, runtime);
    client.invoke("ping", vec![json!("param")]).await.unwrap();

    let headers = transport.last_request().headers;
    assert_eq!(headers.get_first("X-Client"), Some("param"));
    assert_eq!(headers.get_first("X-Version"), Some("1,2"));
    assert_eq!(headers.get_first("X-Token"), Some("X-Token-value"));
}

#[tokio::test]
async fn test_required_computed_header_failure_propagates() {
    let transport = RecordingTransport::new();
    let resource = ResourceDescriptor::new("Widgets", "/")
        .with_client_header(ClientHeaderParam::computed("X-Token", "token", true))
        .with_operation(
            OperationDescriptor::builder("ping", "GET", "/ping")
                .build()
                .unwrap(),
        );
    let runtime = ClientRuntime::new(transport.clone()).with_header_compute(
        "token",
        Arc::new(|_: &str| -> anyhow::Result<Option<Vec<String>>> {
            anyhow::bail!("vault sealed")
        }),
    );
    let client = client_with(resource, runtime);
    let result = client.invoke("ping", vec![]).await;
    assert!(matches!(result, Err(Error::HeaderCompute { ref header, .. }) if header == "X-Token"));
    assert_eq!(transport.request_count(), 0);
}

struct Propagate;

impl restwire::headers::ClientHeadersFactory for Propagate {
    fn update(
        &self,
        incoming: &MultiMap,
        _outgoing: &MultiMap,
    ) -> Result<MultiMap, restwire::error::BoxError> {
        let mut headers = MultiMap::new();
        if let Some(auth) = incoming.get_first("Authorization") {
            headers.add("Authorization", auth);
        }
        Ok(headers)
    }
}

#[tokio::test]
async fn test_header_factory_sees_incoming_headers() {
    let transport = RecordingTransport::new();
    let resource = ResourceDescriptor::new("Widgets", "/")
        .with_headers_factory("propagate")
        .with_operation(
            OperationDescriptor::builder("ping", "GET", "/ping")
                .build()
                .unwrap(),
        );
    let runtime =
        ClientRuntime::new(transport.clone()).with_header_factory_instance("propagate", Arc::new(Propagate));
    let client = client_with(resource, runtime);
    let incoming: MultiMap = [("Authorization", "Bearer abc")].into_iter().collect();
    client
        .invoke_with("ping", vec![], CallContext::default().with_incoming_headers(incoming))
        .await
        .unwrap();
    assert_eq!(
        transport.last_request().headers.get_first("Authorization"),
        Some("Bearer abc")
    );
}

#[tokio::test]
async fn test_retry_invoke_targets_new_uri() {
    let transport = RecordingTransport::new();
    transport
        .respond(json_response(200, r#"{"id":1}"#))
        .respond(json_response(200, r#"{"id":2}"#));
    let client = client(widgets_resource(), &transport);
    client
        .invoke("get_widget", vec![json!(1), Value::Null])
        .await
        .unwrap();

    let operation = client.resource().operation("get_widget").unwrap().clone();
    let ctx = restwire::pipeline::exchange::InvocationContext::new(
        operation,
        vec![json!(1), Value::Null],
        transport.last_request(),
        None,
    );
    let retried: Widget = client
        .retry_invoke(&ctx, "http://mirror.test/api/widgets/1")
        .await
        .unwrap()
        .into_entity()
        .unwrap();
    assert_eq!(retried.id, 2);
    assert_eq!(transport.last_request().uri, "http://mirror.test/api/widgets/1");
}
