use restwire::model::{OperationDescriptor, ParameterBinding, ResourceDescriptor, ReturnType};
use restwire::resilience::RetryConfig;
use restwire::{ClientConfig, ClientProxy, ClientRuntime, Error};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http_client(server: &MockServer, resource: ResourceDescriptor, config: ClientConfig) -> ClientProxy {
    let runtime = ClientRuntime::http(config).unwrap();
    ClientProxy::new(&server.uri(), resource, Arc::new(runtime), &[]).unwrap()
}

fn orders_resource() -> ResourceDescriptor {
    ResourceDescriptor::new("Orders", "/orders")
        .with_operation(
            OperationDescriptor::builder("find", "GET", "/{id}")
                .param(ParameterBinding::path("id", 0))
                .param(ParameterBinding::query("expand", 1))
                .param(ParameterBinding::header("X-Request-Id", 2))
                .param(ParameterBinding::cookie("session", 3))
                .produces("application/json")
                .returns(ReturnType::entity("Order"))
                .build()
                .unwrap(),
        )
        .with_operation(
            OperationDescriptor::builder("note", "POST", "/{id}/notes")
                .param(ParameterBinding::path("id", 0))
                .param(ParameterBinding::form("text", 1))
                .build()
                .unwrap(),
        )
}

#[tokio::test]
async fn test_get_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders/o-1"))
        .and(query_param("expand", "lines"))
        .and(header("X-Request-Id", "r-9"))
        .and(header("Cookie", "session=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "o-1", "lines": 2})))
        .expect(1)
        .mount(&server)
        .await;

    let client = http_client(&server, orders_resource(), ClientConfig::default());
    let result = client
        .invoke(
            "find",
            vec![json!("o-1"), json!("lines"), json!("r-9"), json!("abc")],
        )
        .await
        .unwrap();
    assert_eq!(result.entity(), Some(&json!({"id": "o-1", "lines": 2})));
    assert_eq!(client.last_response().unwrap().status, 200);
}

#[tokio::test]
async fn test_form_post_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders/o-2/notes"))
        .and(header("Content-Type", "application/x-www-form-urlencoded"))
        .and(body_string("text=rush%20order"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = http_client(&server, orders_resource(), ClientConfig::default());
    client
        .invoke("note", vec![json!("o-2"), json!("rush order")])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_remote_failure_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such order"))
        .mount(&server)
        .await;

    let client = http_client(&server, orders_resource(), ClientConfig::default());
    let error = client
        .invoke("find", vec![json!("missing"), json!(null), json!(null), json!(null)])
        .await
        .unwrap_err();
    assert_eq!(error.status(), Some(404));
    assert_eq!(error.response().unwrap().text(), "no such order");
}

#[tokio::test]
async fn test_redirects_not_followed_by_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/orders/new"))
        .mount(&server)
        .await;

    let client = http_client(&server, orders_resource(), ClientConfig::default());
    let error = client
        .invoke("find", vec![json!("old"), json!(null), json!(null), json!(null)])
        .await
        .unwrap_err();
    assert!(matches!(error, Error::RemoteInvocation { status: 301, .. }));
}

#[tokio::test]
async fn test_redirect_followed_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/orders/new"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders/new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "new"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = ClientConfig {
        max_redirects: 2,
        ..ClientConfig::default()
    };
    let client = http_client(&server, orders_resource(), config);
    let result = client
        .invoke("find", vec![json!("old"), json!(null), json!(null), json!(null)])
        .await
        .unwrap();
    assert_eq!(result.entity(), Some(&json!({"id": "new"})));
}

#[tokio::test]
async fn test_retrying_transport_recovers_from_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders/o-3"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders/o-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "o-3"})))
        .mount(&server)
        .await;

    let config = ClientConfig {
        retry: Some(RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            jitter: false,
            retry_on_status: true,
            ..RetryConfig::default()
        }),
        ..ClientConfig::default()
    };
    let client = http_client(&server, orders_resource(), config);
    let result = client
        .invoke("find", vec![json!("o-3"), json!(null), json!(null), json!(null)])
        .await
        .unwrap();
    assert_eq!(result.entity(), Some(&json!({"id": "o-3"})));
}
